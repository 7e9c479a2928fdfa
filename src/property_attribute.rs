// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::object::Attributes;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PropertyAttribute(u32);

impl PropertyAttribute {
  /// No property attributes.
  pub const NONE: Self = Self(0);

  /// Not writable. Corresponds to
  /// `Object.defineProperty(o, "p", { writable: false })`.
  pub const READ_ONLY: Self = Self(1 << 0);

  /// Not enumerable. Corresponds to
  /// `Object.defineProperty(o, "p", { enumerable: false })`.
  pub const DONT_ENUM: Self = Self(1 << 1);

  /// Not configurable. Corresponds to
  /// `Object.defineProperty(o, "p", { configurable: false })`.
  pub const DONT_DELETE: Self = Self(1 << 2);

  /// Test if no property attributes are set.
  #[inline(always)]
  pub fn is_none(&self) -> bool {
    *self == PropertyAttribute::NONE
  }

  /// Test if the read-only property attribute is set.
  #[inline(always)]
  pub fn is_read_only(&self) -> bool {
    self.has(Self::READ_ONLY)
  }

  /// Test if the non-enumerable property attribute is set.
  #[inline(always)]
  pub fn is_dont_enum(&self) -> bool {
    self.has(Self::DONT_ENUM)
  }

  /// Test if the non-configurable property attribute is set.
  #[inline(always)]
  pub fn is_dont_delete(&self) -> bool {
    self.has(Self::DONT_DELETE)
  }

  #[inline(always)]
  fn has(&self, that: Self) -> bool {
    let Self(lhs) = self;
    let Self(rhs) = that;
    0 != lhs & rhs
  }

  /// The engine's writable/enumerable/configurable triple.
  pub(crate) fn to_attributes(self) -> Attributes {
    Attributes {
      writable: !self.is_read_only(),
      enumerable: !self.is_dont_enum(),
      configurable: !self.is_dont_delete(),
    }
  }

  pub(crate) fn from_attributes(attrs: Attributes) -> Self {
    let mut attr = Self::NONE;
    if !attrs.writable {
      attr = attr | Self::READ_ONLY;
    }
    if !attrs.enumerable {
      attr = attr | Self::DONT_ENUM;
    }
    if !attrs.configurable {
      attr = attr | Self::DONT_DELETE;
    }
    attr
  }
}

impl Default for PropertyAttribute {
  fn default() -> Self {
    Self::NONE
  }
}

impl std::ops::BitOr for PropertyAttribute {
  type Output = Self;

  fn bitor(self, Self(rhs): Self) -> Self {
    let Self(lhs) = self;
    Self(lhs | rhs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn attribute_predicates() {
    assert!(PropertyAttribute::NONE.is_none());
    assert!(!PropertyAttribute::NONE.is_read_only());
    assert!(PropertyAttribute::READ_ONLY.is_read_only());
    assert!(!PropertyAttribute::READ_ONLY.is_dont_enum());
    assert!(PropertyAttribute::DONT_ENUM.is_dont_enum());
    assert!(PropertyAttribute::DONT_DELETE.is_dont_delete());
    assert_eq!(PropertyAttribute::NONE, Default::default());

    let attr = PropertyAttribute::READ_ONLY
      | PropertyAttribute::READ_ONLY
      | PropertyAttribute::DONT_ENUM;
    assert!(!attr.is_none());
    assert!(attr.is_read_only());
    assert!(attr.is_dont_enum());
    assert!(!attr.is_dont_delete());
  }

  #[test]
  fn maps_onto_descriptor_flags() {
    let attrs = PropertyAttribute::NONE.to_attributes();
    assert!(attrs.writable && attrs.enumerable && attrs.configurable);

    let attrs =
      (PropertyAttribute::READ_ONLY | PropertyAttribute::DONT_DELETE)
        .to_attributes();
    assert!(!attrs.writable);
    assert!(attrs.enumerable);
    assert!(!attrs.configurable);

    let attr = PropertyAttribute::DONT_ENUM | PropertyAttribute::DONT_DELETE;
    assert_eq!(PropertyAttribute::from_attributes(attr.to_attributes()), attr);
  }
}
