//! Allocator configuration.
//!
//! Defaults can be overridden from the environment:
//! - `SEGALLOC_CHUNK_SIZE`: minimum number of bytes requested from the heap
//!   source per extension (non-zero multiple of 16, default 4096).
//! - `SEGALLOC_CHECK_HEAP`: run the consistency checker after every mutating
//!   call (`1`/`true`/`on`). Only honoured in debug builds.

use log::warn;

use crate::{ALIGNMENT, error::ConfigError};

/// Default heap growth granule.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
  /// Minimum extension handed to the heap source.
  pub chunk_size: usize,
  /// Verify the whole heap after every malloc/free (debug builds only).
  pub check_heap: bool,
}

impl AllocatorConfig {
  pub const CHUNK_SIZE_ENV: &'static str = "SEGALLOC_CHUNK_SIZE";
  pub const CHECK_HEAP_ENV: &'static str = "SEGALLOC_CHECK_HEAP";

  pub const DEFAULT: Self = Self {
    chunk_size: DEFAULT_CHUNK_SIZE,
    check_heap: false,
  };

  pub const fn new() -> Self {
    Self::DEFAULT
  }

  #[must_use]
  pub const fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  #[must_use]
  pub const fn with_check_heap(
    mut self,
    check_heap: bool,
  ) -> Self {
    self.check_heap = check_heap;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.chunk_size == 0 || !self.chunk_size.is_multiple_of(ALIGNMENT) {
      return Err(ConfigError::InvalidChunkSize(self.chunk_size));
    }
    Ok(())
  }

  /// Reads overrides from the process environment. Malformed values are
  /// logged and ignored.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::DEFAULT;

    if let Some(raw) = lookup(Self::CHUNK_SIZE_ENV) {
      match raw.trim().parse::<usize>() {
        Ok(chunk_size) if config.with_chunk_size(chunk_size).validate().is_ok() => {
          config.chunk_size = chunk_size;
        }
        _ => warn!(
          "ignoring {}={raw:?}: expected a non-zero multiple of {ALIGNMENT}",
          Self::CHUNK_SIZE_ENV
        ),
      }
    }

    if let Some(raw) = lookup(Self::CHECK_HEAP_ENV) {
      match parse_flag(&raw) {
        Some(check_heap) => config.check_heap = check_heap,
        None => warn!("ignoring {}={raw:?}: expected a boolean", Self::CHECK_HEAP_ENV),
      }
    }

    config
  }
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

fn parse_flag(raw: &str) -> Option<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" | "" => Some(false),
    _ => None,
  }
}
