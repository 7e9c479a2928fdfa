// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::rc::Rc;

use num_bigint::BigInt as Int;
use num_bigint::BigUint;
use num_bigint::Sign;
use num_traits::ToPrimitive;

use crate::engine::value::JsValue;
use crate::BigInt;
use crate::HandleScope;
use crate::Local;

/// Largest BigInt, in 64-bit words, that `new_from_words` accepts.
const MAX_WORDS: usize = 1 << 24;

impl BigInt {
  fn int(&self) -> Rc<Int> {
    match self.js_value() {
      JsValue::BigInt(value) => value,
      _ => unreachable!("not a bigint"),
    }
  }

  fn from_int<'s>(scope: &mut HandleScope<'s, ()>, value: Int) -> Local<'s, BigInt> {
    scope.value_local(JsValue::BigInt(Rc::new(value)))
  }

  pub fn new_from_i64<'s>(
    scope: &mut HandleScope<'s, ()>,
    value: i64,
  ) -> Local<'s, BigInt> {
    Self::from_int(scope, Int::from(value))
  }

  pub fn new_from_u64<'s>(
    scope: &mut HandleScope<'s, ()>,
    value: u64,
  ) -> Local<'s, BigInt> {
    Self::from_int(scope, Int::from(value))
  }

  /// Creates a new BigInt object using a specified sign bit and a
  /// specified list of digits/words.
  /// The resulting number is calculated as:
  ///
  /// (-1)^sign_bit * (words[0] * (2^64)^0 + words[1] * (2^64)^1 + ...)
  pub fn new_from_words<'s>(
    scope: &mut HandleScope<'s, ()>,
    sign_bit: bool,
    words: &[u64],
  ) -> Option<Local<'s, BigInt>> {
    if words.len() > MAX_WORDS {
      return None;
    }
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let magnitude = BigUint::from_bytes_le(&bytes);
    let sign = if sign_bit { Sign::Minus } else { Sign::Plus };
    Some(Self::from_int(scope, Int::from_biguint(sign, magnitude)))
  }

  /// Returns the value of this BigInt as an unsigned 64-bit integer, and a
  /// `bool` indicating whether the return value was truncated was truncated or
  /// wrapped around. In particular, it will be `false` if this BigInt is
  /// negative.
  pub fn u64_value(&self) -> (u64, bool) {
    let value = self.int();
    let (sign, digits) = value.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    match sign {
      Sign::Minus => (low.wrapping_neg(), false),
      _ => (low, digits.len() <= 1),
    }
  }

  /// Returns the value of this BigInt as a signed 64-bit integer, and a `bool`
  /// indicating whether this BigInt was truncated or not.
  pub fn i64_value(&self) -> (i64, bool) {
    let value = self.int();
    if let Some(exact) = value.to_i64() {
      return (exact, true);
    }
    let (sign, digits) = value.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    let wrapped = match sign {
      Sign::Minus => low.wrapping_neg(),
      _ => low,
    };
    (wrapped as i64, false)
  }

  /// Returns the number of 64-bit words needed to store the result of
  /// `to_words_array`.
  pub fn word_count(&self) -> usize {
    self.int().magnitude().bits().div_ceil(64) as usize
  }

  /// Converts this BigInt to a (sign_bit, words) pair. `sign_bit` will be true
  /// if this BigInt is negative. If `words` has too few elements, the result will
  /// be truncated to fit.
  pub fn to_words_array<'a>(
    &self,
    words: &'a mut [u64],
  ) -> (bool, &'a mut [u64]) {
    let value = self.int();
    let (sign, digits) = value.to_u64_digits();
    let written = digits.len().min(words.len());
    words[..written].copy_from_slice(&digits[..written]);
    (sign == Sign::Minus, &mut words[..written])
  }
}
