// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `String` and `String.prototype`. Positions are UTF-16 code unit
//! offsets, like everywhere else in the language.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::conversion::trim_js_whitespace;
use crate::engine::conversion::trim_js_whitespace_end;
use crate::engine::conversion::trim_js_whitespace_start;
use crate::engine::error;
use crate::engine::object::BuiltinFn;
use crate::engine::object::CallInfo;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::utf16_len;
use crate::engine::value::utf16_slice;
use crate::engine::value::utf16_unit_at;
use crate::isolate::Isolate;

fn this_string(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<JsStr> {
  if info.this.is_nullish() {
    return Err(error::type_error(
      cx,
      format!("String.prototype.{method} called on null or undefined"),
    ));
  }
  ops::to_string(cx, &info.this)
}

fn units(s: &str) -> Vec<u16> {
  s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> JsValue {
  JsValue::String(String::from_utf16_lossy(units).into())
}

fn find(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
  if needle.is_empty() {
    return (from <= haystack.len()).then_some(from);
  }
  let last = haystack.len().checked_sub(needle.len())?;
  (from..=last).find(|&i| haystack[i..].starts_with(needle))
}

fn rfind(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
  let last = haystack.len().checked_sub(needle.len())?;
  (0..=from.min(last)).rev().find(|&i| haystack[i..].starts_with(needle))
}

fn string_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let value = match info.args.first() {
    None => JsValue::str(""),
    Some(JsValue::Symbol(symbol)) if info.new_target.is_none() => {
      JsValue::String(symbol.descriptive_string().into())
    }
    Some(value) => JsValue::String(ops::to_string(cx, value)?),
  };
  match info.new_target {
    None => Ok(value),
    Some(new_target) => {
      let fallback = ops::intrinsics(cx).string_prototype;
      let proto = ops::prototype_from_constructor(cx, new_target, fallback)?;
      let wrapper = ops::wrap_primitive(cx, value);
      cx.vm.heap.object_mut(wrapper).proto = Some(proto);
      Ok(JsValue::Object(wrapper))
    }
  }
}

fn from_char_code(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let mut code_units = Vec::with_capacity(info.args.len());
  for arg in info.args {
    code_units.push(ops::to_uint32(cx, arg)? as u16);
  }
  Ok(from_units(&code_units))
}

fn this_string_value(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<JsValue> {
  match &info.this {
    JsValue::String(_) => return Ok(info.this.clone()),
    JsValue::Object(id) => {
      if let ObjectClass::Primitive(value @ JsValue::String(_)) =
        &cx.vm.heap.object(*id).class
      {
        return Ok(value.clone());
      }
    }
    _ => {}
  }
  Err(error::type_error(
    cx,
    format!("String.prototype.{method} requires that 'this' be a String"),
  ))
}

fn to_string(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  this_string_value(cx, info, "toString")
}

fn value_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  this_string_value(cx, info, "valueOf")
}

fn position(cx: &mut Isolate, value: &JsValue) -> JsResult<f64> {
  ops::to_integer_or_infinity(cx, value)
}

fn char_at(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "charAt")?;
  let pos = position(cx, &info.arg(0))?;
  if pos < 0.0 || pos >= utf16_len(&s) as f64 {
    return Ok(JsValue::str(""));
  }
  Ok(JsValue::String(utf16_slice(&s, pos as usize, pos as usize + 1).into()))
}

fn char_code_at(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "charCodeAt")?;
  let pos = position(cx, &info.arg(0))?;
  if pos < 0.0 {
    return Ok(JsValue::Number(f64::NAN));
  }
  Ok(JsValue::Number(
    utf16_unit_at(&s, pos as usize).map_or(f64::NAN, f64::from),
  ))
}

fn code_point_at(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "codePointAt")?;
  let pos = position(cx, &info.arg(0))?;
  let code_units = units(&s);
  if pos < 0.0 || pos >= code_units.len() as f64 {
    return Ok(JsValue::Undefined);
  }
  let at = pos as usize;
  let point = char::decode_utf16(code_units[at..].iter().copied())
    .next()
    .map(|c| match c {
      Ok(c) => c as u32,
      Err(e) => e.unpaired_surrogate() as u32,
    })
    .unwrap_or(0);
  Ok(JsValue::Number(point as f64))
}

fn at(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "at")?;
  let length = utf16_len(&s) as f64;
  let n = position(cx, &info.arg(0))?;
  let index = if n < 0.0 { length + n } else { n };
  if index < 0.0 || index >= length {
    return Ok(JsValue::Undefined);
  }
  Ok(JsValue::String(
    utf16_slice(&s, index as usize, index as usize + 1).into(),
  ))
}

fn index_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "indexOf")?;
  let needle = ops::to_string(cx, &info.arg(0))?;
  let haystack = units(&s);
  let from = position(cx, &info.arg(1))?.clamp(
    0.0,
    haystack.len() as f64,
  ) as usize;
  Ok(JsValue::Number(
    find(&haystack, &units(&needle), from).map_or(-1.0, |i| i as f64),
  ))
}

fn last_index_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "lastIndexOf")?;
  let needle = ops::to_string(cx, &info.arg(0))?;
  let haystack = units(&s);
  let n = ops::to_number(cx, &info.arg(1))?;
  let from = if n.is_nan() {
    haystack.len()
  } else {
    n.clamp(0.0, haystack.len() as f64) as usize
  };
  Ok(JsValue::Number(
    rfind(&haystack, &units(&needle), from).map_or(-1.0, |i| i as f64),
  ))
}

fn includes(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "includes")?;
  let needle = ops::to_string(cx, &info.arg(0))?;
  let haystack = units(&s);
  let from = position(cx, &info.arg(1))?.clamp(
    0.0,
    haystack.len() as f64,
  ) as usize;
  Ok(JsValue::Bool(find(&haystack, &units(&needle), from).is_some()))
}

fn starts_with(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "startsWith")?;
  let needle = ops::to_string(cx, &info.arg(0))?;
  let haystack = units(&s);
  let start = position(cx, &info.arg(1))?.clamp(
    0.0,
    haystack.len() as f64,
  ) as usize;
  Ok(JsValue::Bool(haystack[start..].starts_with(&units(&needle))))
}

fn ends_with(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "endsWith")?;
  let needle = ops::to_string(cx, &info.arg(0))?;
  let haystack = units(&s);
  let end = match info.arg(1) {
    JsValue::Undefined => haystack.len(),
    value => position(cx, &value)?.clamp(0.0, haystack.len() as f64) as usize,
  };
  Ok(JsValue::Bool(haystack[..end].ends_with(&units(&needle))))
}

fn slice(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "slice")?;
  let length = utf16_len(&s) as u64;
  let start = ops::relative_index(cx, &info.arg(0), length, 0)? as usize;
  let end = ops::relative_index(cx, &info.arg(1), length, length)? as usize;
  if start >= end {
    return Ok(JsValue::str(""));
  }
  Ok(JsValue::String(utf16_slice(&s, start, end).into()))
}

fn substring(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "substring")?;
  let length = utf16_len(&s) as f64;
  let start = position(cx, &info.arg(0))?.clamp(0.0, length) as usize;
  let end = match info.arg(1) {
    JsValue::Undefined => length as usize,
    value => position(cx, &value)?.clamp(0.0, length) as usize,
  };
  let (from, to) = (start.min(end), start.max(end));
  Ok(JsValue::String(utf16_slice(&s, from, to).into()))
}

fn substr(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "substr")?;
  let length = utf16_len(&s) as u64;
  let start = ops::relative_index(cx, &info.arg(0), length, 0)?;
  let count = match info.arg(1) {
    JsValue::Undefined => length - start,
    value => position(cx, &value)?.clamp(0.0, (length - start) as f64) as u64,
  };
  Ok(JsValue::String(
    utf16_slice(&s, start as usize, (start + count) as usize).into(),
  ))
}

fn to_upper_case(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "toUpperCase")?;
  Ok(JsValue::String(s.to_uppercase().into()))
}

fn to_lower_case(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "toLowerCase")?;
  Ok(JsValue::String(s.to_lowercase().into()))
}

fn trim(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "trim")?;
  Ok(JsValue::str(trim_js_whitespace(&s)))
}

fn trim_start(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "trimStart")?;
  Ok(JsValue::str(trim_js_whitespace_start(&s)))
}

fn trim_end(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "trimEnd")?;
  Ok(JsValue::str(trim_js_whitespace_end(&s)))
}

fn split(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "split")?;
  let limit = match info.arg(1) {
    JsValue::Undefined => u32::MAX,
    value => ops::to_uint32(cx, &value)?,
  } as usize;
  let separator = info.arg(0);
  let parts: Vec<JsValue> = if limit == 0 {
    Vec::new()
  } else if separator.is_undefined() {
    vec![JsValue::String(s)]
  } else {
    let separator = ops::to_string(cx, &separator)?;
    let haystack = units(&s);
    if separator.is_empty() {
      haystack.chunks(1).take(limit).map(from_units).collect()
    } else {
      let needle = units(&separator);
      let mut parts = Vec::new();
      let mut start = 0;
      while parts.len() < limit {
        match find(&haystack, &needle, start) {
          Some(at) => {
            parts.push(from_units(&haystack[start..at]));
            start = at + needle.len();
          }
          None => {
            parts.push(from_units(&haystack[start..]));
            break;
          }
        }
      }
      parts
    }
  };
  Ok(JsValue::Object(ops::new_array(cx, parts)))
}

fn repeat(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "repeat")?;
  let count = position(cx, &info.arg(0))?;
  if count < 0.0 || count.is_infinite() {
    let detail = crate::engine::conversion::number_to_string(count);
    return Err(error::range_error(
      cx,
      format!("Invalid count value: {detail}"),
    ));
  }
  if s.len() as f64 * count > (1u64 << 29) as f64 {
    return Err(error::range_error(cx, "Invalid string length"));
  }
  Ok(JsValue::String(s.repeat(count as usize).into()))
}

fn pad(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
  at_start: bool,
) -> JsResult<JsValue> {
  let s = this_string(cx, info, method)?;
  let target = ops::to_length(cx, &info.arg(0))? as usize;
  let filler = match info.arg(1) {
    JsValue::Undefined => " ".into(),
    value => ops::to_string(cx, &value)?,
  };
  let current = utf16_len(&s);
  if target <= current || filler.is_empty() {
    return Ok(JsValue::String(s));
  }
  let filler_units = units(&filler);
  let padding: Vec<u16> = filler_units.iter().copied().cycle().take(
    target - current,
  ).collect();
  let padding = String::from_utf16_lossy(&padding);
  Ok(JsValue::String(if at_start {
    format!("{padding}{s}").into()
  } else {
    format!("{s}{padding}").into()
  }))
}

fn pad_start(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  pad(cx, info, "padStart", true)
}

fn pad_end(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  pad(cx, info, "padEnd", false)
}

fn concat(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "concat")?;
  let mut out = s.to_string();
  for arg in info.args {
    out.push_str(&ops::to_string(cx, arg)?);
  }
  Ok(JsValue::String(out.into()))
}

/// Expands `$$`, `$&`, `` $` `` and `$'` in a replacement template.
fn expand_replacement(
  template: &str,
  matched: &str,
  before: &str,
  after: &str,
) -> String {
  let mut out = String::with_capacity(template.len());
  let mut chars = template.chars().peekable();
  while let Some(c) = chars.next() {
    if c != '$' {
      out.push(c);
      continue;
    }
    match chars.peek() {
      Some('$') => out.push('$'),
      Some('&') => out.push_str(matched),
      Some('`') => out.push_str(before),
      Some('\'') => out.push_str(after),
      _ => {
        out.push('$');
        continue;
      }
    }
    chars.next();
  }
  out
}

enum Replacement {
  Function(crate::engine::value::ObjRef),
  Template(JsStr),
}

fn replace_impl(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
  all: bool,
) -> JsResult<JsValue> {
  let s = this_string(cx, info, method)?;
  let pattern = ops::to_string(cx, &info.arg(0))?;
  let replacer = match info.arg(1) {
    JsValue::Object(f) if cx.vm.heap.object(f).is_callable() => {
      Replacement::Function(f)
    }
    value => Replacement::Template(ops::to_string(cx, &value)?),
  };
  let haystack = units(&s);
  let needle = units(&pattern);
  let mut positions = Vec::new();
  let mut from = 0;
  while let Some(at) = find(&haystack, &needle, from) {
    positions.push(at);
    if !all {
      break;
    }
    from = at + needle.len().max(1);
    if from > haystack.len() {
      break;
    }
  }
  let mut out = String::new();
  let mut last = 0;
  for at in positions {
    out.push_str(&String::from_utf16_lossy(&haystack[last..at]));
    let replacement = match &replacer {
      Replacement::Function(f) => {
        let args = [
          JsValue::String(pattern.clone()),
          JsValue::Number(at as f64),
          JsValue::String(s.clone()),
        ];
        let result = ops::call_function(cx, *f, JsValue::Undefined, &args)?;
        ops::to_string(cx, &result)?.to_string()
      }
      Replacement::Template(template) => expand_replacement(
        template,
        &pattern,
        &String::from_utf16_lossy(&haystack[..at]),
        &String::from_utf16_lossy(&haystack[at + needle.len()..]),
      ),
    };
    out.push_str(&replacement);
    last = at + needle.len();
  }
  out.push_str(&String::from_utf16_lossy(&haystack[last..]));
  Ok(JsValue::String(out.into()))
}

fn replace(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  replace_impl(cx, info, "replace", false)
}

fn replace_all(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  replace_impl(cx, info, "replaceAll", true)
}

fn locale_compare(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let s = this_string(cx, info, "localeCompare")?;
  let other = ops::to_string(cx, &info.arg(0))?;
  Ok(JsValue::Number(match s.cmp(&other) {
    std::cmp::Ordering::Less => -1.0,
    std::cmp::Ordering::Equal => 0.0,
    std::cmp::Ordering::Greater => 1.0,
  }))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let prototype = cx.vm.realm(realm).intrinsics.string_prototype;
  let ctor = builtins::constructor(
    cx,
    realm,
    "String",
    1,
    string_constructor,
    prototype,
  );
  builtins::method(cx, realm, ctor, "fromCharCode", 1, from_char_code);

  let methods: [(&str, u32, BuiltinFn); 31] = [
    ("toString", 0, to_string),
    ("valueOf", 0, value_of),
    ("charAt", 1, char_at),
    ("charCodeAt", 1, char_code_at),
    ("codePointAt", 1, code_point_at),
    ("at", 1, at),
    ("indexOf", 1, index_of),
    ("lastIndexOf", 1, last_index_of),
    ("includes", 1, includes),
    ("startsWith", 1, starts_with),
    ("endsWith", 1, ends_with),
    ("slice", 2, slice),
    ("substring", 2, substring),
    ("substr", 2, substr),
    ("toUpperCase", 0, to_upper_case),
    ("toLowerCase", 0, to_lower_case),
    ("toLocaleUpperCase", 0, to_upper_case),
    ("toLocaleLowerCase", 0, to_lower_case),
    ("trim", 0, trim),
    ("trimStart", 0, trim_start),
    ("trimEnd", 0, trim_end),
    ("split", 2, split),
    ("repeat", 1, repeat),
    ("padStart", 2, pad_start),
    ("padEnd", 2, pad_end),
    ("concat", 1, concat),
    ("replace", 2, replace),
    ("replaceAll", 2, replace_all),
    ("localeCompare", 1, locale_compare),
    ("toWellFormed", 0, to_well_formed),
    ("isWellFormed", 0, is_well_formed),
  ];
  for (name, length, f) in methods {
    builtins::method(cx, realm, prototype, name, length, f);
  }
}

/// Strings are stored as UTF-8 and so never contain lone surrogates.
fn to_well_formed(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::String(this_string(cx, info, "toWellFormed")?))
}

fn is_well_formed(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  this_string(cx, info, "isWellFormed")?;
  Ok(JsValue::Bool(true))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn replacement_patterns() {
    assert_eq!(expand_replacement("[$&]", "b", "a", "c"), "[b]");
    assert_eq!(expand_replacement("$`|$'", "b", "a", "c"), "a|c");
    assert_eq!(expand_replacement("$$ $1", "b", "a", "c"), "$ $1");
  }

  #[test]
  fn utf16_search() {
    let hay = units("a😀b😀");
    let needle = units("😀");
    assert_eq!(find(&hay, &needle, 0), Some(1));
    assert_eq!(find(&hay, &needle, 2), Some(4));
    assert_eq!(rfind(&hay, &needle, hay.len()), Some(4));
    assert_eq!(find(&hay, &[], 6), Some(6));
    assert_eq!(find(&hay, &[], 7), None);
  }
}
