// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `Number`, `Boolean`, `Symbol` and `BigInt`.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::One;
use num_traits::Signed;
use num_traits::Zero;

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::conversion::number_to_radix_string;
use crate::engine::conversion::number_to_string;
use crate::engine::conversion::parse_float_prefix;
use crate::engine::conversion::parse_int;
use crate::engine::error;
use crate::engine::error::ErrorKind;
use crate::engine::object::Attributes;
use crate::engine::object::BuiltinFn;
use crate::engine::object::CallInfo;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::SymbolRef;
use crate::isolate::Isolate;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Wraps `value` for `new X(...)`, honoring a subclass prototype.
fn construct_wrapper(
  cx: &mut Isolate,
  new_target: ObjRef,
  value: JsValue,
  fallback: ObjRef,
) -> JsResult<JsValue> {
  let proto = ops::prototype_from_constructor(cx, new_target, fallback)?;
  let wrapper = ops::wrap_primitive(cx, value);
  cx.vm.heap.object_mut(wrapper).proto = Some(proto);
  Ok(JsValue::Object(wrapper))
}

/// The primitive behind `this` for `Number.prototype` style methods.
fn this_primitive(
  cx: &mut Isolate,
  this: &JsValue,
  accept: fn(&JsValue) -> bool,
  message: &str,
) -> JsResult<JsValue> {
  if accept(this) {
    return Ok(this.clone());
  }
  if let JsValue::Object(id) = this {
    if let ObjectClass::Primitive(inner) = &cx.vm.heap.object(*id).class {
      if accept(inner) {
        return Ok(inner.clone());
      }
    }
  }
  Err(error::type_error(cx, message))
}

// Number

fn this_number(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<f64> {
  let message = format!(
    "Number.prototype.{method} requires that 'this' be a Number",
  );
  match this_primitive(
    cx,
    &info.this,
    |v| matches!(v, JsValue::Number(_)),
    &message,
  )? {
    JsValue::Number(n) => Ok(n),
    _ => Ok(f64::NAN),
  }
}

fn number_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let n = match info.args.first() {
    None => 0.0,
    Some(value) => match ops::to_numeric(cx, value)? {
      JsValue::BigInt(b) => ops::bigint_to_f64(&b),
      JsValue::Number(n) => n,
      _ => f64::NAN,
    },
  };
  match info.new_target {
    None => Ok(JsValue::Number(n)),
    Some(new_target) => {
      let fallback = ops::intrinsics(cx).number_prototype;
      construct_wrapper(cx, new_target, JsValue::Number(n), fallback)
    }
  }
}

fn is_integer(_cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(matches!(
    info.arg(0),
    JsValue::Number(n) if n.is_finite() && n.trunc() == n
  )))
}

fn is_safe_integer(
  _cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Ok(JsValue::Bool(matches!(
    info.arg(0),
    JsValue::Number(
      n,
    ) if n.is_finite() && n.trunc() == n && n.abs() <= MAX_SAFE_INTEGER
  )))
}

fn number_is_finite(
  _cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Ok(JsValue::Bool(matches!(info.arg(0), JsValue::Number(n) if n.is_finite())))
}

fn number_is_nan(_cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(matches!(info.arg(0), JsValue::Number(n) if n.is_nan())))
}

pub(crate) fn parse_float_builtin(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let s = ops::to_string(cx, &info.arg(0))?;
  Ok(JsValue::Number(parse_float_prefix(&s)))
}

pub(crate) fn parse_int_builtin(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let s = ops::to_string(cx, &info.arg(0))?;
  let radix = ops::to_int32(cx, &info.arg(1))?;
  Ok(JsValue::Number(parse_int(&s, radix)))
}

fn number_to_string_method(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let n = this_number(cx, info, "toString")?;
  let radix = match info.arg(0) {
    JsValue::Undefined => 10.0,
    value => ops::to_integer_or_infinity(cx, &value)?,
  };
  if !(2.0..=36.0).contains(&radix) {
    return Err(error::range_error(
      cx,
      "toString() radix must be between 2 and 36",
    ));
  }
  let s = if radix == 10.0 {
    number_to_string(n)
  } else {
    number_to_radix_string(n, radix as u32)
  };
  Ok(JsValue::String(s.into()))
}

/// Adds one unit in the last place of a plain decimal string.
fn increment_decimal(digits: &str) -> String {
  let mut bytes = digits.as_bytes().to_vec();
  let mut i = bytes.len();
  loop {
    if i == 0 {
      bytes.insert(0, b'1');
      break;
    }
    i -= 1;
    match bytes[i] {
      b'.' => continue,
      b'9' => bytes[i] = b'0',
      d => {
        bytes[i] = d + 1;
        break;
      }
    }
  }
  String::from_utf8(bytes).unwrap_or_default()
}

/// `x.toFixed(digits)` for finite `0 <= x < 1e21`. Ties round up, unlike
/// Rust's formatter which rounds to even.
fn to_fixed_positive(x: f64, digits: usize) -> String {
  let extended = format!("{x:.*}", digits + 30);
  let cut = extended.len() - 30;
  let tail = &extended[cut..];
  let is_tie = tail.starts_with('5') && tail[1..].bytes().all(|b| b == b'0');
  if !is_tie {
    return format!("{x:.digits$}");
  }
  let kept = extended[..cut].trim_end_matches('.');
  increment_decimal(kept)
}

fn to_fixed(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let n = this_number(cx, info, "toFixed")?;
  let digits = ops::to_integer_or_infinity(cx, &info.arg(0))?;
  if !(0.0..=100.0).contains(&digits) {
    return Err(error::range_error(
      cx,
      "toFixed() digits argument must be between 0 and 100",
    ));
  }
  if !n.is_finite() || n.abs() >= 1e21 {
    return Ok(JsValue::String(number_to_string(n).into()));
  }
  let body = to_fixed_positive(n.abs(), digits as usize);
  let sign = if n < 0.0 { "-" } else { "" };
  Ok(JsValue::String(format!("{sign}{body}").into()))
}

fn number_value_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Number(this_number(cx, info, "valueOf")?))
}

fn number_to_locale_string(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let n = this_number(cx, info, "toLocaleString")?;
  Ok(JsValue::String(number_to_string(n).into()))
}

// Boolean

fn boolean_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let value = JsValue::Bool(info.arg(0).truthy());
  match info.new_target {
    None => Ok(value),
    Some(new_target) => {
      let fallback = ops::intrinsics(cx).boolean_prototype;
      construct_wrapper(cx, new_target, value, fallback)
    }
  }
}

fn this_boolean(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<bool> {
  let message = format!(
    "Boolean.prototype.{method} requires that 'this' be a Boolean",
  );
  Ok(matches!(
    this_primitive(
      cx,
      &info.this,
      |v| matches!(v, JsValue::Bool(_)),
      &message,
    )?,
    JsValue::Bool(true)
  ))
}

fn boolean_to_string(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let b = this_boolean(cx, info, "toString")?;
  Ok(JsValue::str(if b { "true" } else { "false" }))
}

fn boolean_value_of(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Ok(JsValue::Bool(this_boolean(cx, info, "valueOf")?))
}

// Symbol

fn symbol_function(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let description = match info.arg(0) {
    JsValue::Undefined => None,
    value => Some(ops::to_string(cx, &value)?),
  };
  Ok(JsValue::Symbol(SymbolRef::new(description)))
}

fn this_symbol(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<SymbolRef> {
  let message = format!(
    "Symbol.prototype.{method} requires that 'this' be a Symbol",
  );
  match this_primitive(
    cx,
    &info.this,
    |v| matches!(v, JsValue::Symbol(_)),
    &message,
  )? {
    JsValue::Symbol(s) => Ok(s),
    _ => Err(error::type_error(cx, message)),
  }
}

fn symbol_to_string(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let symbol = this_symbol(cx, info, "toString")?;
  Ok(JsValue::String(symbol.descriptive_string().into()))
}

fn symbol_value_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Symbol(this_symbol(cx, info, "valueOf")?))
}

fn symbol_description(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let symbol = this_symbol(cx, info, "description")?;
  Ok(symbol.description().cloned().map_or(JsValue::Undefined, JsValue::String))
}

// BigInt

/// ToBigInt.
pub(crate) fn to_bigint(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<Rc<BigInt>> {
  let primitive = ops::to_primitive(cx, value, ops::Hint::Number)?;
  match &primitive {
    JsValue::BigInt(b) => Ok(b.clone()),
    JsValue::Bool(b) => {
      Ok(Rc::new(if *b { BigInt::one() } else { BigInt::zero() }))
    }
    JsValue::String(s) => match ops::string_to_bigint(s) {
      Some(b) => Ok(Rc::new(b)),
      None => Err(error::throw_error(
        cx,
        ErrorKind::SyntaxError,
        &format!("Cannot convert {s} to a BigInt"),
      )),
    },
    _ => {
      let detail = error::detail_string(&cx.vm, &primitive);
      Err(error::type_error(cx, format!("Cannot convert {detail} to a BigInt")))
    }
  }
}

fn bigint_function(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let primitive = ops::to_primitive(cx, &info.arg(0), ops::Hint::Number)?;
  if let JsValue::Number(n) = primitive {
    return Ok(JsValue::BigInt(ops::number_to_bigint(cx, n)?));
  }
  Ok(JsValue::BigInt(to_bigint(cx, &primitive)?))
}

fn bits_arg(cx: &mut Isolate, value: &JsValue) -> JsResult<u64> {
  let n = ops::to_integer_or_infinity(cx, value)?;
  if !(0.0..=MAX_SAFE_INTEGER).contains(&n) {
    return Err(error::range_error(
      cx,
      "Invalid value: not (convertible to) a safe integer",
    ));
  }
  Ok(n as u64)
}

fn as_uint_n(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let bits = bits_arg(cx, &info.arg(0))?;
  let value = to_bigint(cx, &info.arg(1))?;
  let modulus = BigInt::one() << bits;
  let mut result = value.as_ref() % &modulus;
  if result.is_negative() {
    result += &modulus;
  }
  Ok(JsValue::BigInt(Rc::new(result)))
}

fn as_int_n(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let bits = bits_arg(cx, &info.arg(0))?;
  let value = to_bigint(cx, &info.arg(1))?;
  if bits == 0 {
    return Ok(JsValue::BigInt(Rc::new(BigInt::zero())));
  }
  let modulus = BigInt::one() << bits;
  let mut result = value.as_ref() % &modulus;
  if result.is_negative() {
    result += &modulus;
  }
  if result >= BigInt::one() << (bits - 1) {
    result -= &modulus;
  }
  Ok(JsValue::BigInt(Rc::new(result)))
}

fn this_bigint(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<Rc<BigInt>> {
  let message = format!(
    "BigInt.prototype.{method} requires that 'this' be a BigInt",
  );
  match this_primitive(
    cx,
    &info.this,
    |v| matches!(v, JsValue::BigInt(_)),
    &message,
  )? {
    JsValue::BigInt(b) => Ok(b),
    _ => Err(error::type_error(cx, message)),
  }
}

fn bigint_to_string(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let value = this_bigint(cx, info, "toString")?;
  let radix = match info.arg(0) {
    JsValue::Undefined => 10.0,
    radix => ops::to_integer_or_infinity(cx, &radix)?,
  };
  if !(2.0..=36.0).contains(&radix) {
    return Err(error::range_error(
      cx,
      "toString() radix must be between 2 and 36",
    ));
  }
  Ok(JsValue::String(value.to_str_radix(radix as u32).into()))
}

fn bigint_value_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::BigInt(this_bigint(cx, info, "valueOf")?))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let intrinsics = &cx.vm.realm(realm).intrinsics;
  let number_prototype = intrinsics.number_prototype;
  let boolean_prototype = intrinsics.boolean_prototype;
  let symbol_prototype = intrinsics.symbol_prototype;
  let bigint_prototype = intrinsics.bigint_prototype;

  let number = builtins::constructor(
    cx,
    realm,
    "Number",
    1,
    number_constructor,
    number_prototype,
  );
  let statics: [(&str, u32, BuiltinFn); 6] = [
    ("isInteger", 1, is_integer),
    ("isSafeInteger", 1, is_safe_integer),
    ("isFinite", 1, number_is_finite),
    ("isNaN", 1, number_is_nan),
    ("parseFloat", 1, parse_float_builtin),
    ("parseInt", 2, parse_int_builtin),
  ];
  for (name, length, f) in statics {
    builtins::method(cx, realm, number, name, length, f);
  }
  let constants = [
    ("MAX_SAFE_INTEGER", MAX_SAFE_INTEGER),
    ("MIN_SAFE_INTEGER", -MAX_SAFE_INTEGER),
    ("EPSILON", f64::EPSILON),
    ("MAX_VALUE", f64::MAX),
    ("MIN_VALUE", 5e-324),
    ("NaN", f64::NAN),
    ("POSITIVE_INFINITY", f64::INFINITY),
    ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
  ];
  for (name, value) in constants {
    ops::define_value(
      cx,
      number,
      name,
      JsValue::Number(value),
      Attributes::FROZEN,
    );
  }
  builtins::method(
    cx,
    realm,
    number_prototype,
    "toString",
    1,
    number_to_string_method,
  );
  builtins::method(cx, realm, number_prototype, "toFixed", 1, to_fixed);
  builtins::method(cx, realm, number_prototype, "valueOf", 0, number_value_of);
  builtins::method(
    cx,
    realm,
    number_prototype,
    "toLocaleString",
    0,
    number_to_locale_string,
  );

  builtins::constructor(
    cx,
    realm,
    "Boolean",
    1,
    boolean_constructor,
    boolean_prototype,
  );
  builtins::method(
    cx,
    realm,
    boolean_prototype,
    "toString",
    0,
    boolean_to_string,
  );
  builtins::method(
    cx,
    realm,
    boolean_prototype,
    "valueOf",
    0,
    boolean_value_of,
  );

  let symbol = builtins::constructor(
    cx,
    realm,
    "Symbol",
    0,
    symbol_function,
    symbol_prototype,
  );
  builtins::forbid_new(cx, symbol);
  builtins::method(
    cx,
    realm,
    symbol_prototype,
    "toString",
    0,
    symbol_to_string,
  );
  builtins::method(cx, realm, symbol_prototype, "valueOf", 0, symbol_value_of);
  builtins::getter(
    cx,
    realm,
    symbol_prototype,
    "description",
    symbol_description,
  );

  let bigint = builtins::constructor(
    cx,
    realm,
    "BigInt",
    1,
    bigint_function,
    bigint_prototype,
  );
  builtins::forbid_new(cx, bigint);
  builtins::method(cx, realm, bigint, "asUintN", 2, as_uint_n);
  builtins::method(cx, realm, bigint, "asIntN", 2, as_int_n);
  builtins::method(
    cx,
    realm,
    bigint_prototype,
    "toString",
    0,
    bigint_to_string,
  );
  builtins::method(cx, realm, bigint_prototype, "valueOf", 0, bigint_value_of);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn to_fixed_rounds_ties_up() {
    assert_eq!(to_fixed_positive(0.5, 0), "1");
    assert_eq!(to_fixed_positive(2.5, 0), "3");
    assert_eq!(to_fixed_positive(1.005, 2), "1.00");
    assert_eq!(to_fixed_positive(1.25, 1), "1.3");
    assert_eq!(to_fixed_positive(9.95, 1), "9.9");
    assert_eq!(to_fixed_positive(99.5, 0), "100");
    assert_eq!(to_fixed_positive(3.14159, 3), "3.142");
  }
}
