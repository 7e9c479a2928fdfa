// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::object::Attributes;
use crate::engine::object::BuiltinFn;
use crate::engine::object::CallInfo;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::isolate::Isolate;

fn number_arg(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  i: usize,
) -> JsResult<f64> {
  ops::to_number(cx, &info.arg(i))
}

macro_rules! unary {
  ($($name:ident => $f:expr),* $(,)?) => {
    $(
      fn $name(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
        let x = number_arg(cx, info, 0)?;
        let f: fn(f64) -> f64 = $f;
        Ok(JsValue::Number(f(x)))
      }
    )*
  };
}

/// Math.round: halves go towards +Infinity, and -0 survives.
fn js_round(x: f64) -> f64 {
  if !x.is_finite() || x == 0.0 {
    return x;
  }
  if x > 0.0 && x < 0.5 {
    return 0.0;
  }
  if x < 0.0 && x >= -0.5 {
    return -0.0;
  }
  (x + 0.5).floor()
}

unary! {
  abs => f64::abs,
  floor => f64::floor,
  ceil => f64::ceil,
  round => js_round,
  trunc => f64::trunc,
  sqrt => f64::sqrt,
  cbrt => f64::cbrt,
  exp => f64::exp,
  expm1 => f64::exp_m1,
  log => f64::ln,
  log2 => f64::log2,
  log10 => f64::log10,
  log1p => f64::ln_1p,
  sin => f64::sin,
  cos => f64::cos,
  tan => f64::tan,
  asin => f64::asin,
  acos => f64::acos,
  atan => f64::atan,
  sinh => f64::sinh,
  cosh => f64::cosh,
  tanh => f64::tanh,
  asinh => f64::asinh,
  acosh => f64::acosh,
  atanh => f64::atanh,
  fround => |x| x as f32 as f64,
  sign => |x: f64| if x.is_nan() || x == 0.0 { x } else { x.signum() },
}

fn atan2(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let y = number_arg(cx, info, 0)?;
  let x = number_arg(cx, info, 1)?;
  Ok(JsValue::Number(y.atan2(x)))
}

fn pow(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let base = number_arg(cx, info, 0)?;
  let exponent = number_arg(cx, info, 1)?;
  let result = if exponent.is_nan() || (
    base.abs() == 1.0 && exponent.is_infinite()
  ) {
    f64::NAN
  } else {
    base.powf(exponent)
  };
  Ok(JsValue::Number(result))
}

fn extremum(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  is_max: bool,
) -> JsResult<JsValue> {
  let mut result = if is_max { f64::NEG_INFINITY } else { f64::INFINITY };
  // Every argument is converted even after a NaN shows up.
  let mut saw_nan = false;
  for arg in info.args {
    let n = ops::to_number(cx, arg)?;
    if n.is_nan() {
      saw_nan = true;
      continue;
    }
    let replace = if is_max {
      n > result || (n == 0.0 && result == 0.0 && result.is_sign_negative())
    } else {
      n < result || (n == 0.0 && result == 0.0 && n.is_sign_negative())
    };
    if replace {
      result = n;
    }
  }
  Ok(JsValue::Number(if saw_nan { f64::NAN } else { result }))
}

fn max(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  extremum(cx, info, true)
}

fn min(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  extremum(cx, info, false)
}

fn hypot(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let mut values = Vec::with_capacity(info.args.len());
  for arg in info.args {
    values.push(ops::to_number(cx, arg)?);
  }
  if values.iter().any(|v| v.is_infinite()) {
    return Ok(JsValue::Number(f64::INFINITY));
  }
  Ok(JsValue::Number(values.iter().map(|v| v * v).sum::<f64>().sqrt()))
}

fn random(cx: &mut Isolate, _info: &CallInfo<'_>) -> JsResult<JsValue> {
  // 53 random bits scaled into [0, 1).
  let bits = cx.vm.next_random() >> 11;
  Ok(JsValue::Number(bits as f64 / (1u64 << 53) as f64))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let math = builtins::namespace(cx, realm, "Math");
  let constants = [
    ("E", std::f64::consts::E),
    ("LN10", std::f64::consts::LN_10),
    ("LN2", std::f64::consts::LN_2),
    ("LOG10E", std::f64::consts::LOG10_E),
    ("LOG2E", std::f64::consts::LOG2_E),
    ("PI", std::f64::consts::PI),
    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ("SQRT2", std::f64::consts::SQRT_2),
  ];
  for (name, value) in constants {
    ops::define_value(
      cx,
      math,
      name,
      JsValue::Number(value),
      Attributes::FROZEN,
    );
  }
  let functions: [(&str, u32, BuiltinFn); 34] = [
    ("abs", 1, abs),
    ("floor", 1, floor),
    ("ceil", 1, ceil),
    ("round", 1, round),
    ("trunc", 1, trunc),
    ("sign", 1, sign),
    ("sqrt", 1, sqrt),
    ("cbrt", 1, cbrt),
    ("exp", 1, exp),
    ("expm1", 1, expm1),
    ("log", 1, log),
    ("log2", 1, log2),
    ("log10", 1, log10),
    ("log1p", 1, log1p),
    ("sin", 1, sin),
    ("cos", 1, cos),
    ("tan", 1, tan),
    ("asin", 1, asin),
    ("acos", 1, acos),
    ("atan", 1, atan),
    ("sinh", 1, sinh),
    ("cosh", 1, cosh),
    ("tanh", 1, tanh),
    ("asinh", 1, asinh),
    ("acosh", 1, acosh),
    ("atanh", 1, atanh),
    ("fround", 1, fround),
    ("atan2", 2, atan2),
    ("pow", 2, pow),
    ("max", 2, max),
    ("min", 2, min),
    ("hypot", 2, hypot),
    ("random", 0, random),
    ("clz32", 1, clz32),
  ];
  for (name, length, f) in functions {
    builtins::method(cx, realm, math, name, length, f);
  }
}

fn clz32(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let n = ops::to_uint32(cx, &info.arg(0))?;
  Ok(JsValue::Number(n.leading_zeros() as f64))
}

#[cfg(test)]
mod tests {
  use super::js_round;

  #[test]
  fn rounding_follows_the_language() {
    assert_eq!(js_round(2.5), 3.0);
    assert_eq!(js_round(-2.5), -2.0);
    assert_eq!(js_round(0.49999999999999994), 0.0);
    assert!(js_round(-0.2).is_sign_negative());
    assert!(js_round(f64::NAN).is_nan());
  }
}
