// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::value::JsValue;
use crate::HandleScope;
use crate::Int32;
use crate::Integer;
use crate::Local;
use crate::Number;
use crate::Uint32;

fn number_of(value: JsValue) -> f64 {
  match value {
    JsValue::Number(n) => n,
    _ => unreachable!("not a number"),
  }
}

impl Number {
  pub fn new<'s>(scope: &mut HandleScope<'s, ()>, value: f64) -> Local<'s, Number> {
    scope.value_local(JsValue::Number(value))
  }

  pub fn value(&self) -> f64 {
    number_of(self.js_value())
  }
}

impl Integer {
  pub fn new<'s>(scope: &mut HandleScope<'s, ()>, value: i32) -> Local<'s, Integer> {
    scope.value_local(JsValue::Number(value as f64))
  }

  pub fn new_from_unsigned<'s>(
    scope: &mut HandleScope<'s, ()>,
    value: u32,
  ) -> Local<'s, Integer> {
    scope.value_local(JsValue::Number(value as f64))
  }

  /// The value as an `i64`. Integers produced by `Value::to_integer` may
  /// be infinite; those saturate.
  pub fn value(&self) -> i64 {
    number_of(self.js_value()) as i64
  }
}

impl Uint32 {
  pub fn value(&self) -> u32 {
    number_of(self.js_value()) as u32
  }
}

impl Int32 {
  pub fn value(&self) -> i32 {
    number_of(self.js_value()) as i32
  }
}

#[cfg(test)]
mod tests {
  use super::number_of;
  use crate::engine::value::JsValue;

  #[test]
  fn saturating_integer_value() {
    assert_eq!(number_of(JsValue::Number(f64::INFINITY)) as i64, i64::MAX);
    assert_eq!(number_of(JsValue::Number(-3.0)) as i64, -3);
  }
}
