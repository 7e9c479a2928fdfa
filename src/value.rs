// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::num::NonZeroI32;

use paste::paste;

use crate::data::Tag;
use crate::engine::builtins::number::to_bigint;
use crate::engine::error;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::JsResult;
use crate::isolate::Isolate;
use crate::object::identity_hash;
use crate::BigInt;
use crate::Boolean;
use crate::HandleScope;
use crate::Int32;
use crate::Integer;
use crate::Local;
use crate::Number;
use crate::Object;
use crate::String;
use crate::Uint32;
use crate::Value;

macro_rules! tag_predicate {
  ($(#[$doc:meta])* $name:ident => $tag:ident) => {
    paste! {
      $(#[$doc])*
      #[inline(always)]
      pub fn [<is_ $name>](&self) -> bool {
        self.tag().contains(Tag::$tag)
      }
    }
  };
}

impl Value {
  tag_predicate!(
    /// Returns true if this value is the undefined value.  See ECMA-262 4.3.10.
    undefined => UNDEFINED
  );
  tag_predicate!(
    /// Returns true if this value is the null value.  See ECMA-262 4.3.11.
    null => NULL
  );

  /// Returns true if this value is either the null or the undefined value.
  /// See ECMA-262 4.3.11. and 4.3.12
  #[inline(always)]
  pub fn is_null_or_undefined(&self) -> bool {
    self.tag().intersects(Tag::NULL | Tag::UNDEFINED)
  }

  /// Returns true if this value is true.
  /// This is not the same as `boolean_value()`. The latter performs a
  /// conversion to boolean, i.e. the result of `Boolean(value)` in JS,
  /// whereas this checks `value === true`.
  #[inline(always)]
  pub fn is_true(&self) -> bool {
    self.tag().contains(Tag::TRUE)
  }

  /// Returns true if this value is false.
  #[inline(always)]
  pub fn is_false(&self) -> bool {
    self.tag().contains(Tag::FALSE)
  }

  tag_predicate!(
    /// Returns true if this value is a symbol or a string.
    /// This is equivalent to
    /// `typeof value === 'string' || typeof value === 'symbol'` in JS.
    name => NAME
  );
  tag_predicate!(
    /// Returns true if this value is an instance of the String type.
    /// See ECMA-262 8.4.
    string => STRING
  );
  tag_predicate!(
    /// Returns true if this value is a symbol.
    symbol => SYMBOL
  );
  tag_predicate!(
    /// Returns true if this value is a function.
    function => FUNCTION
  );
  tag_predicate!(
    /// Returns true if this value is an array. Note that it will return false
    /// for a Proxy for an array.
    array => ARRAY
  );
  tag_predicate!(
    /// Returns true if this value is an object.
    object => OBJECT
  );
  tag_predicate!(
    /// Returns true if this value is a bigint.
    /// This is equivalent to `typeof value === 'bigint'` in JS.
    big_int => BIGINT
  );
  tag_predicate!(
    /// Returns true if this value is boolean.
    /// This is equivalent to `typeof value === 'boolean'` in JS.
    boolean => BOOLEAN
  );
  tag_predicate!(
    /// Returns true if this value is a number.
    number => NUMBER
  );
  tag_predicate!(
    /// Returns true if this value is an `External` object.
    external => EXTERNAL
  );
  tag_predicate!(
    /// Returns true if this value is a 32-bit signed integer.
    int32 => INT32
  );
  tag_predicate!(
    /// Returns true if this value is a 32-bit unsigned integer.
    uint32 => UINT32
  );
  tag_predicate!(
    /// Returns true if this value is an Arguments object.
    arguments_object => ARGUMENTS
  );
  tag_predicate!(big_int_object => BIGINT_OBJECT);
  tag_predicate!(
    /// Returns true if this value is a Boolean object.
    boolean_object => BOOLEAN_OBJECT
  );
  tag_predicate!(
    /// Returns true if this value is a Number object.
    number_object => NUMBER_OBJECT
  );
  tag_predicate!(
    /// Returns true if this value is a String object.
    string_object => STRING_OBJECT
  );
  tag_predicate!(
    /// Returns true if this value is a Symbol object.
    symbol_object => SYMBOL_OBJECT
  );
  tag_predicate!(
    /// Returns true if this value is a NativeError.
    native_error => NATIVE_ERROR
  );
  tag_predicate!(
    /// Returns true if this value is a Promise.
    promise => PROMISE
  );
  tag_predicate!(
    /// Returns true if this value is an ArrayBuffer.
    array_buffer => ARRAY_BUFFER
  );
  tag_predicate!(
    /// Returns true if this value is an ArrayBufferView.
    array_buffer_view => ARRAY_BUFFER_VIEW
  );
  tag_predicate!(
    /// Returns true if this value is one of TypedArrays.
    typed_array => TYPED_ARRAY
  );
  tag_predicate!(
    /// Returns true if this value is an Uint8Array.
    uint8_array => UINT8_ARRAY
  );
  tag_predicate!(
    /// Returns true if the value is a Module Namespace Object.
    module_namespace_object => MODULE_NAMESPACE
  );

  pub fn strict_equals(&self, that: Local<Value>) -> bool {
    self.js_value().strict_equals(&that.js_value())
  }

  pub fn same_value(&self, that: Local<Value>) -> bool {
    self.js_value().same_value(&that.js_value())
  }

  /// Implements the the abstract operation `SameValueZero`, which is defined in
  /// ECMA-262 6th edition § 7.2.10.
  ///
  /// This operation is used to compare values for the purpose of insertion into
  /// a `Set`, or determining whether `Map` keys are equivalent. Its semantics
  /// are almost the same as `strict_equals()` and `same_value()`, with the
  /// following important distinctions:
  ///   - It considers `NaN` equal to `NaN` (unlike `strict_equals()`).
  ///   - It considers `-0` equal to `0` (unlike `same_value()`).
  pub fn same_value_zero(&self, that: Local<Value>) -> bool {
    self.js_value().same_value_zero(&that.js_value())
  }

  /// Runs a conversion that may call into script and wraps the result.
  fn convert<'s, T, R>(
    &self,
    scope: &mut HandleScope<'s>,
    f: impl FnOnce(&mut Isolate, &JsValue) -> JsResult<R>,
    wrap: impl FnOnce(R) -> JsValue,
  ) -> Option<Local<'s, T>> {
    let value = self.js_value();
    let result = scope.run_js(|cx, _| f(cx, &value))?;
    Some(scope.value_local(wrap(result)))
  }

  pub fn to_big_int<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, BigInt>> {
    self.convert(scope, to_bigint, JsValue::BigInt)
  }

  pub fn to_number<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Number>> {
    self.convert(scope, ops::to_number, JsValue::Number)
  }

  pub fn to_string<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, String>> {
    self.convert(scope, ops::to_string, JsValue::String)
  }

  /// Convenience function not present in the original V8 API.
  pub fn to_rust_string_lossy(
    &self,
    scope: &mut HandleScope,
  ) -> std::string::String {
    self
      .to_string(scope)
      .map_or_else(std::string::String::new, |s| s.to_rust_string_lossy(scope))
  }

  /// A description of the value for diagnostics. Never calls into script
  /// and never throws.
  pub fn to_detail_string<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, String>> {
    let isolate: &Isolate = scope.as_ref();
    let detail = error::detail_string(&isolate.vm, &self.js_value());
    Some(scope.value_local(JsValue::String(detail.into())))
  }

  pub fn to_object<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Object>> {
    self.convert(scope, ops::to_object, JsValue::Object)
  }

  /// ToIntegerOrInfinity. The result may be infinite.
  pub fn to_integer<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Integer>> {
    self.convert(scope, ops::to_integer_or_infinity, JsValue::Number)
  }

  pub fn to_uint32<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Uint32>> {
    self.convert(scope, ops::to_uint32, |n| JsValue::Number(n as f64))
  }

  pub fn to_int32<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Int32>> {
    self.convert(scope, ops::to_int32, |n| JsValue::Number(n as f64))
  }

  /// Perform the equivalent of `Boolean(value)` in JS. This can never fail.
  pub fn to_boolean<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Boolean> {
    scope.value_local(JsValue::Bool(self.js_value().truthy()))
  }

  /// The `instanceof` operator, including `Symbol.hasInstance`-free
  /// prototype chain walks and bound functions.
  pub fn instance_of(
    &self,
    scope: &mut HandleScope,
    object: Local<Object>,
  ) -> Option<bool> {
    let value = self.js_value();
    let target = object.js_value();
    scope.run_js(|cx, _| ops::instance_of(cx, &value, &target))
  }

  pub fn number_value(&self, scope: &mut HandleScope) -> Option<f64> {
    let value = self.js_value();
    scope.run_js(|cx, _| ops::to_number(cx, &value))
  }

  /// ToIntegerOrInfinity, saturated to the `i64` range.
  pub fn integer_value(&self, scope: &mut HandleScope) -> Option<i64> {
    let value = self.js_value();
    let n = scope.run_js(|cx, _| ops::to_integer_or_infinity(cx, &value))?;
    Some(n as i64)
  }

  pub fn uint32_value(&self, scope: &mut HandleScope) -> Option<u32> {
    let value = self.js_value();
    scope.run_js(|cx, _| ops::to_uint32(cx, &value))
  }

  pub fn int32_value(&self, scope: &mut HandleScope) -> Option<i32> {
    let value = self.js_value();
    scope.run_js(|cx, _| ops::to_int32(cx, &value))
  }

  pub fn boolean_value(&self, _scope: &mut HandleScope<'_, ()>) -> bool {
    self.js_value().truthy()
  }

  /// Returns the hash value for this value. Objects get an identity hash
  /// that is stable for their lifetime; primitives hash their contents.
  ///
  /// The return value will never be 0. Also, it is not guaranteed to be
  /// unique.
  pub fn get_hash(&self) -> NonZeroI32 {
    fn content_hash(value: impl Hash) -> i32 {
      let mut hasher = DefaultHasher::new();
      value.hash(&mut hasher);
      ((hasher.finish() >> 33) as i32 & 0x7fff_ffff).max(1)
    }
    let hash = match self.js_value() {
      JsValue::Object(id) => return identity_hash(self.host_isolate(), id),
      JsValue::Undefined => 1,
      JsValue::Null => 2,
      JsValue::Bool(b) => content_hash(b),
      JsValue::Number(n) => content_hash(n.to_bits()),
      JsValue::String(s) => content_hash(&*s),
      JsValue::Symbol(s) => content_hash(s),
      JsValue::BigInt(b) => content_hash(&*b),
    };
    match NonZeroI32::new(hash) {
      Some(hash) => hash,
      None => unreachable!("content hashes are never zero"),
    }
  }

  /// The `typeof` operator.
  pub fn type_of<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, String> {
    let isolate: &Isolate = scope.as_ref();
    let name = ops::type_of(isolate, &self.js_value());
    scope.value_local(JsValue::str(name))
  }

  /// Utility method that returns human readable representation of the
  /// underlying value.
  pub fn type_repr(&self) -> &'static str {
    if self.is_module_namespace_object() {
      "Module"
    } else if self.is_uint8_array() {
      "Uint8Array"
    } else if self.is_array_buffer() {
      "ArrayBuffer"
    } else if self.is_promise() {
      "Promise"
    } else if self.is_native_error() {
      "Error"
    } else if self.is_external() {
      "External"
    } else if self.is_number() {
      "Number"
    } else if self.is_boolean() {
      "Boolean"
    } else if self.is_big_int() {
      "bigint"
    } else if self.is_array() {
      "array"
    } else if self.is_function() {
      "function"
    } else if self.is_symbol() {
      "symbol"
    } else if self.is_string() {
      "string"
    } else if self.is_null() {
      "null"
    } else if self.is_undefined() {
      "undefined"
    } else if self.is_object() {
      "object"
    } else {
      "unknown"
    }
  }
}
