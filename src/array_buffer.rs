// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use std::ffi::c_void;
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::engine::builtins::buffer;
use crate::engine::object::ObjectClass;
use crate::support::SharedRef;
use crate::support::UniqueRef;
use crate::ArrayBuffer;
use crate::HandleScope;
use crate::Isolate;
use crate::Local;

/// A thread-safe allocator that the isolate uses to allocate the memory of
/// `ArrayBuffer`s created through the API. It has to be set via
/// `CreateParams::array_buffer_allocator()`; every isolate gets a default
/// one otherwise.
///
/// The allocator keeps count of the bytes it handed out that are still
/// alive, which is what `HeapStatistics::external_memory()` reports.
///
/// Exported at the top level as `Allocator` rather than nested under an
/// `array_buffer` module that would hold nothing else.
#[derive(Default)]
pub struct Allocator {
  allocated: AtomicUsize,
}

impl Allocator {
  /// Bytes held by live backing stores allocated through this allocator.
  pub fn allocated_bytes(&self) -> usize {
    self.allocated.load(Ordering::Relaxed)
  }

  fn allocate(allocator: &SharedRef<Self>, byte_length: usize) -> BackingStore {
    allocator.allocated.fetch_add(byte_length, Ordering::Relaxed);
    let mut store = BackingStore::new(byte_length);
    store.allocator = Some(allocator.clone());
    store
  }
}

impl Debug for Allocator {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Allocator")
      .field("allocated", &self.allocated_bytes())
      .finish()
  }
}

/// Zero-initializing, heap based convenience allocator.
pub fn new_default_allocator() -> UniqueRef<Allocator> {
  UniqueRef::new(Allocator::default())
}

#[test]
fn test_default_allocator() {
  new_default_allocator();
}

/// A wrapper around the backing store (i.e. the raw memory) of an array
/// buffer.
///
/// Backing stores are reference counted through [`SharedRef`] and may be
/// attached to array buffers in several isolates at once, on several
/// threads. The bytes are atomics so that concurrent readers and writers
/// never race.
pub struct BackingStore {
  data: Box<[AtomicU8]>,
  allocator: Option<SharedRef<Allocator>>,
}

impl BackingStore {
  pub(crate) fn new(byte_length: usize) -> Self {
    Self {
      data: (0..byte_length).map(|_| AtomicU8::new(0)).collect(),
      allocator: None,
    }
  }

  fn from_bytes(bytes: &[u8]) -> Self {
    Self {
      data: bytes.iter().map(|&b| AtomicU8::new(b)).collect(),
      allocator: None,
    }
  }

  /// Return a pointer to the beginning of the memory block for this backing
  /// store. The pointer is only valid as long as this backing store object
  /// lives.
  pub fn data(&self) -> *mut c_void {
    self.data.as_ptr() as *mut c_void
  }

  /// The length (in bytes) of this backing store.
  pub fn byte_length(&self) -> usize {
    self.data.len()
  }

  /// Indicates whether the backing store was created for an ArrayBuffer or
  /// a SharedArrayBuffer. Only the former exist here.
  pub fn is_shared(&self) -> bool {
    false
  }

  pub(crate) fn get(&self, index: usize) -> Option<u8> {
    self.data.get(index).map(|b| b.load(Ordering::Relaxed))
  }

  pub(crate) fn set(&self, index: usize, byte: u8) {
    if let Some(b) = self.data.get(index) {
      b.store(byte, Ordering::Relaxed);
    }
  }

  /// Copies the bytes out.
  pub fn to_vec(&self) -> Vec<u8> {
    self.data.iter().map(|b| b.load(Ordering::Relaxed)).collect()
  }
}

impl Deref for BackingStore {
  type Target = [AtomicU8];

  fn deref(&self) -> &[AtomicU8] {
    &self.data
  }
}

impl Drop for BackingStore {
  fn drop(&mut self) {
    if let Some(allocator) = &self.allocator {
      allocator
        .allocated
        .fetch_sub(self.data.len(), Ordering::Relaxed);
    }
  }
}

impl Debug for BackingStore {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("BackingStore")
      .field("byte_length", &self.byte_length())
      .finish()
  }
}

impl ArrayBuffer {
  /// Create a new ArrayBuffer. Allocate |byte_length| bytes.
  /// Allocated memory will be owned by a created ArrayBuffer and
  /// will be deallocated when it is garbage-collected.
  pub fn new<'s>(
    scope: &mut HandleScope<'s>,
    byte_length: usize,
  ) -> Local<'s, ArrayBuffer> {
    let store = Self::new_backing_store(scope, byte_length).make_shared();
    Self::with_backing_store(scope, &store)
  }

  pub fn with_backing_store<'s>(
    scope: &mut HandleScope<'s>,
    backing_store: &SharedRef<BackingStore>,
  ) -> Local<'s, ArrayBuffer> {
    let id = buffer::new_array_buffer(scope, backing_store.clone(), None);
    scope.new_object_local(id)
  }

  /// Data length in bytes.
  pub fn byte_length(&self) -> usize {
    self.get_backing_store().byte_length()
  }

  /// Get a shared pointer to the backing store of this array buffer. This
  /// pointer coordinates the lifetime management of the internal storage
  /// with any live ArrayBuffers on the heap, even across isolates.
  pub fn get_backing_store(&self) -> SharedRef<BackingStore> {
    let isolate = self.host_isolate();
    match &isolate.vm.heap.object(self.obj()).class {
      ObjectClass::ArrayBuffer(store) => store.clone(),
      _ => unreachable!("ArrayBuffer handle without a backing store"),
    }
  }

  /// Returns a new standalone BackingStore that is allocated using the array
  /// buffer allocator of the isolate. The result can be later passed to
  /// ArrayBuffer::with_backing_store.
  pub fn new_backing_store(
    isolate: &mut Isolate,
    byte_length: usize,
  ) -> UniqueRef<BackingStore> {
    UniqueRef::new(Allocator::allocate(
      isolate.array_buffer_allocator(),
      byte_length,
    ))
  }

  /// Returns a new standalone BackingStore that takes over the contents of
  /// the given buffer.
  pub fn new_backing_store_from_boxed_slice(
    data: Box<[u8]>,
  ) -> UniqueRef<BackingStore> {
    UniqueRef::new(BackingStore::from_bytes(&data))
  }

  /// Same as `new_backing_store_from_boxed_slice`, for vectors.
  pub fn new_backing_store_from_vec(data: Vec<u8>) -> UniqueRef<BackingStore> {
    Self::new_backing_store_from_boxed_slice(data.into_boxed_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backing_store_bytes() {
    let store = BackingStore::from_bytes(&[1, 2, 3]);
    assert_eq!(store.byte_length(), 3);
    store.set(1, 42);
    store.set(10, 1);
    assert_eq!(store.get(1), Some(42));
    assert_eq!(store.get(3), None);
    assert_eq!(store.to_vec(), vec![1, 42, 3]);
    assert_eq!(store[2].load(Ordering::Relaxed), 3);
    assert!(!store.is_shared());
  }

  #[test]
  fn allocator_accounting() {
    let allocator = new_default_allocator().make_shared();
    let store = Allocator::allocate(&allocator, 16);
    assert_eq!(allocator.allocated_bytes(), 16);
    drop(store);
    assert_eq!(allocator.allocated_bytes(), 0);
  }
}
