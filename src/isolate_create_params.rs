// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::array_buffer::Allocator as ArrayBufferAllocator;
use crate::support::SharedRef;

/// Initial configuration parameters for a new Isolate.
#[must_use]
#[derive(Debug, Default)]
pub struct CreateParams {
  pub(crate) heap_limits: Option<(usize, usize)>,
  pub(crate) array_buffer_allocator: Option<SharedRef<ArrayBufferAllocator>>,
}

impl CreateParams {
  /// The ArrayBuffer::ArrayBufferAllocator to use for allocating and freeing
  /// the backing store of ArrayBuffers.
  pub fn array_buffer_allocator(
    mut self,
    array_buffer_allocator: impl Into<SharedRef<ArrayBufferAllocator>>,
  ) -> Self {
    self.array_buffer_allocator = Some(array_buffer_allocator.into());
    self
  }

  /// Check if `array_buffer_allocator` has already been called. Useful to some
  /// embedders that might want to set an allocator but not overwrite if one
  /// was already set by a user.
  pub fn has_set_array_buffer_allocator(&self) -> bool {
    self.array_buffer_allocator.is_some()
  }

  /// Configures the constraints on the heap.
  ///
  /// The heap starts out sized for `initial` bytes and collects whenever it
  /// grows past twice its live size. When the heap size approaches `max`,
  /// collections run on every safe point and a warning is logged once the
  /// limit is exceeded.
  ///
  /// # Arguments
  ///
  /// * `initial` - The initial heap size or zero in bytes
  /// * `max` - The hard limit for the heap size in bytes
  pub fn heap_limits(mut self, initial: usize, max: usize) -> Self {
    self.heap_limits = Some((initial, max));
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::new_default_allocator;

  #[test]
  fn builder() {
    let params = CreateParams::default();
    assert!(!params.has_set_array_buffer_allocator());
    let params = params
      .array_buffer_allocator(new_default_allocator())
      .heap_limits(0, 1 << 20);
    assert!(params.has_set_array_buffer_allocator());
    assert_eq!(params.heap_limits, Some((0, 1 << 20)));
  }
}
