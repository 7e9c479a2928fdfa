// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::engine::heap::HeapId;

pub(crate) type ObjRef = HeapId;
pub(crate) type EnvRef = HeapId;
pub(crate) type JsStr = Rc<str>;

/// A JavaScript value as the engine sees it. Objects live on the heap and are
/// referenced by id; everything else is stored inline.
#[derive(Clone, Debug, Default)]
pub(crate) enum JsValue {
  #[default]
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  String(JsStr),
  Symbol(SymbolRef),
  BigInt(Rc<BigInt>),
  Object(ObjRef),
}

impl JsValue {
  pub fn str(s: &str) -> Self {
    JsValue::String(s.into())
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, JsValue::Undefined)
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, JsValue::Undefined | JsValue::Null)
  }

  pub fn as_object(&self) -> Option<ObjRef> {
    match self {
      JsValue::Object(o) => Some(*o),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      JsValue::String(s) => Some(s),
      _ => None,
    }
  }

  /// The `typeof` tag of a primitive. Objects are classified by the caller
  /// since callability needs the heap.
  pub fn primitive_type_of(&self) -> &'static str {
    match self {
      JsValue::Undefined => "undefined",
      JsValue::Null => "object",
      JsValue::Bool(_) => "boolean",
      JsValue::Number(_) => "number",
      JsValue::String(_) => "string",
      JsValue::Symbol(_) => "symbol",
      JsValue::BigInt(_) => "bigint",
      JsValue::Object(_) => "object",
    }
  }

  /// ToBoolean. Never runs user code.
  pub fn truthy(&self) -> bool {
    match self {
      JsValue::Undefined | JsValue::Null => false,
      JsValue::Bool(b) => *b,
      JsValue::Number(n) => !(n.is_nan() || *n == 0.0),
      JsValue::String(s) => !s.is_empty(),
      JsValue::Symbol(_) => true,
      JsValue::BigInt(b) => **b != BigInt::default(),
      JsValue::Object(_) => true,
    }
  }

  /// The `===` operator.
  pub fn strict_equals(&self, other: &JsValue) -> bool {
    match (self, other) {
      (JsValue::Undefined, JsValue::Undefined) => true,
      (JsValue::Null, JsValue::Null) => true,
      (JsValue::Bool(a), JsValue::Bool(b)) => a == b,
      (JsValue::Number(a), JsValue::Number(b)) => a == b,
      (JsValue::String(a), JsValue::String(b)) => a == b,
      (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
      (JsValue::BigInt(a), JsValue::BigInt(b)) => a == b,
      (JsValue::Object(a), JsValue::Object(b)) => a == b,
      _ => false,
    }
  }

  /// The SameValue algorithm (`Object.is`).
  pub fn same_value(&self, other: &JsValue) -> bool {
    match (self, other) {
      (JsValue::Number(a), JsValue::Number(b)) => {
        if a.is_nan() && b.is_nan() {
          true
        } else {
          a == b && a.is_sign_negative() == b.is_sign_negative()
        }
      }
      _ => self.strict_equals(other),
    }
  }

  /// SameValueZero, used by `includes`.
  pub fn same_value_zero(&self, other: &JsValue) -> bool {
    match (self, other) {
      (JsValue::Number(a), JsValue::Number(b)) if a.is_nan() && b.is_nan() => {
        true
      }
      _ => self.strict_equals(other),
    }
  }
}

pub(crate) struct SymbolData {
  pub description: Option<JsStr>,
}

/// Symbols compare by identity.
#[derive(Clone)]
pub(crate) struct SymbolRef(pub Rc<SymbolData>);

impl SymbolRef {
  pub fn new(description: Option<JsStr>) -> Self {
    Self(Rc::new(SymbolData { description }))
  }

  pub fn description(&self) -> Option<&JsStr> {
    self.0.description.as_ref()
  }

  /// `Symbol(desc).toString()`.
  pub fn descriptive_string(&self) -> String {
    format!("Symbol({})", self.description().map(|d| &**d).unwrap_or(""))
  }
}

impl PartialEq for SymbolRef {
  fn eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for SymbolRef {}

impl Hash for SymbolRef {
  fn hash<H: Hasher>(&self, state: &mut H) {
    (Rc::as_ptr(&self.0) as usize).hash(state)
  }
}

impl fmt::Debug for SymbolRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.descriptive_string())
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PropertyKey {
  String(JsStr),
  Symbol(SymbolRef),
}

impl PropertyKey {
  pub fn str(s: &str) -> Self {
    PropertyKey::String(s.into())
  }

  pub fn index(i: usize) -> Self {
    PropertyKey::String(i.to_string().into())
  }

  /// Returns the array index this key denotes, if it is a canonical numeric
  /// string below 2^32 - 1.
  pub fn as_index(&self) -> Option<usize> {
    match self {
      PropertyKey::String(s) => parse_array_index(s),
      PropertyKey::Symbol(_) => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      PropertyKey::String(s) => Some(s),
      PropertyKey::Symbol(_) => None,
    }
  }

  pub fn to_value(&self) -> JsValue {
    match self {
      PropertyKey::String(s) => JsValue::String(s.clone()),
      PropertyKey::Symbol(s) => JsValue::Symbol(s.clone()),
    }
  }

  /// The name used for functions installed under this key.
  pub fn function_name(&self) -> JsStr {
    match self {
      PropertyKey::String(s) => s.clone(),
      PropertyKey::Symbol(s) => match s.description() {
        Some(d) => format!("[{d}]").into(),
        None => "".into(),
      },
    }
  }
}

impl fmt::Display for PropertyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PropertyKey::String(s) => f.write_str(s),
      PropertyKey::Symbol(s) => f.write_str(&s.descriptive_string()),
    }
  }
}

pub(crate) fn parse_array_index(s: &str) -> Option<usize> {
  if s.is_empty() || s.len() > 10 {
    return None;
  }
  if s.len() > 1 && s.starts_with('0') {
    return None;
  }
  if !s.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let n: u64 = s.parse().ok()?;
  if n < u32::MAX as u64 {
    Some(n as usize)
  } else {
    None
  }
}

/// String length in UTF-16 code units, the unit JavaScript indexes by.
pub(crate) fn utf16_len(s: &str) -> usize {
  if s.is_ascii() {
    s.len()
  } else {
    s.encode_utf16().count()
  }
}

pub(crate) fn utf16_unit_at(s: &str, index: usize) -> Option<u16> {
  if s.is_ascii() {
    s.as_bytes().get(index).map(|&b| b as u16)
  } else {
    s.encode_utf16().nth(index)
  }
}

/// The substring between two UTF-16 indices. Halves of a split surrogate
/// pair come out as U+FFFD.
pub(crate) fn utf16_slice(s: &str, start: usize, end: usize) -> String {
  if end <= start {
    return String::new();
  }
  if s.is_ascii() {
    let end = end.min(s.len());
    return s.get(start.min(end)..end).unwrap_or("").to_string();
  }
  let units: Vec<u16> = s.encode_utf16().skip(start).take(
    end - start,
  ).collect();
  String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn array_index_keys() {
    assert_eq!(parse_array_index("0"), Some(0));
    assert_eq!(parse_array_index("42"), Some(42));
    assert_eq!(parse_array_index("007"), None);
    assert_eq!(parse_array_index("-1"), None);
    assert_eq!(parse_array_index("4294967295"), None);
    assert_eq!(parse_array_index("1.5"), None);
  }

  #[test]
  fn same_value_distinguishes_zeroes() {
    let pos = JsValue::Number(0.0);
    let neg = JsValue::Number(-0.0);
    assert!(pos.strict_equals(&neg));
    assert!(!pos.same_value(&neg));
    assert!(JsValue::Number(f64::NAN).same_value(&JsValue::Number(f64::NAN)));
    assert!(!JsValue::Number(f64::NAN).strict_equals(&JsValue::Number(
      f64::NAN,
    )));
  }

  #[test]
  fn symbols_compare_by_identity() {
    let a = SymbolRef::new(Some("x".into()));
    let b = SymbolRef::new(Some("x".into()));
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
  }
}
