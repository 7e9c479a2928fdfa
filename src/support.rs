// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Ownership wrappers shared by the platform, the backing stores and the
//! rest of the public API.

use std::borrow::Borrow;
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

/// An owned, heap allocated object with exactly one owner. Values of this
/// type are handed out by constructors such as `new_default_platform()` and
/// can be turned into a reference counted [`SharedRef`] with
/// [`make_shared()`](UniqueRef::make_shared).
pub struct UniqueRef<T: ?Sized>(Box<T>);

impl<T> UniqueRef<T> {
  pub(crate) fn new(value: T) -> Self {
    Self(Box::new(value))
  }
}

impl<T: ?Sized> UniqueRef<T> {
  pub(crate) fn from_box(value: Box<T>) -> Self {
    Self(value)
  }

  pub fn make_shared(self) -> SharedRef<T> {
    SharedRef(Arc::from(self.0))
  }
}

impl<T: ?Sized> Deref for UniqueRef<T> {
  type Target = T;
  fn deref(&self) -> &T {
    &self.0
  }
}

impl<T: ?Sized> DerefMut for UniqueRef<T> {
  fn deref_mut(&mut self) -> &mut T {
    &mut self.0
  }
}

impl<T: ?Sized> Borrow<T> for UniqueRef<T> {
  fn borrow(&self) -> &T {
    &self.0
  }
}

impl<T: Debug + ?Sized> Debug for UniqueRef<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_tuple("UniqueRef").field(&&*self.0).finish()
  }
}

/// A thread safe, reference counted pointer. Backing stores and the platform
/// are shared this way so they can outlive the isolate that created them and
/// be used from several isolates at once.
pub struct SharedRef<T: ?Sized>(Arc<T>);

impl<T> SharedRef<T> {
  pub(crate) fn new(value: T) -> Self {
    Self(Arc::new(value))
  }
}

impl<T: ?Sized> SharedRef<T> {
  /// Number of `SharedRef`s pointing at the same allocation.
  pub fn use_count(that: &Self) -> usize {
    Arc::strong_count(&that.0)
  }

  pub fn ptr_eq(a: &Self, b: &Self) -> bool {
    Arc::ptr_eq(&a.0, &b.0)
  }
}

impl<T: ?Sized> Clone for SharedRef<T> {
  fn clone(&self) -> Self {
    Self(self.0.clone())
  }
}

impl<T: ?Sized> Deref for SharedRef<T> {
  type Target = T;
  fn deref(&self) -> &T {
    &self.0
  }
}

impl<T: ?Sized> Borrow<T> for SharedRef<T> {
  fn borrow(&self) -> &T {
    &self.0
  }
}

impl<T: ?Sized> From<UniqueRef<T>> for SharedRef<T> {
  fn from(unique: UniqueRef<T>) -> Self {
    unique.make_shared()
  }
}

impl<T: Debug + ?Sized> Debug for SharedRef<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_tuple("SharedRef").field(&&*self.0).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unique_ref_becomes_shared() {
    let unique = UniqueRef::new(vec![1u8, 2, 3]);
    assert_eq!(unique.len(), 3);
    let shared = unique.make_shared();
    let other = shared.clone();
    assert_eq!(SharedRef::use_count(&shared), 2);
    assert!(SharedRef::ptr_eq(&shared, &other));
    drop(other);
    assert_eq!(SharedRef::use_count(&shared), 1);
  }
}
