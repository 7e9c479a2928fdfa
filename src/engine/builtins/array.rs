// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `Array` and `Array.prototype`. The methods are generic: they work on any
//! array-like receiver through `length` and indexed properties.

use std::cmp::Ordering;

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::conversion::f64_to_uint32;
use crate::engine::error;
use crate::engine::object::BuiltinFn;
use crate::engine::object::CallInfo;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

fn key(index: u64) -> PropertyKey {
  PropertyKey::index(index as usize)
}

fn receiver(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<(ObjRef, u64)> {
  let id = builtins::this_object(
    cx,
    &info.this,
    &format!("Array.prototype.{method}"),
  )?;
  let length = ops::length_of_array_like(cx, id)?;
  Ok((id, length))
}

fn set_length(cx: &mut Isolate, id: ObjRef, length: u64) -> JsResult<()> {
  ops::put(
    cx,
    id,
    PropertyKey::str("length"),
    JsValue::Number(length as f64),
    true,
  )
}

fn array_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  if let [JsValue::Number(n)] = info.args {
    let length = f64_to_uint32(*n);
    if length as f64 != *n {
      return Err(error::range_error(cx, "Invalid array length"));
    }
    let array = ops::new_array(cx, Vec::new());
    set_length(cx, array, length as u64)?;
    return Ok(JsValue::Object(array));
  }
  Ok(JsValue::Object(ops::new_array(cx, info.args.to_vec())))
}

fn is_array(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(ops::is_array(cx, &info.arg(0))))
}

fn of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Object(ops::new_array(cx, info.args.to_vec())))
}

fn from(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let source = info.arg(0);
  if source.is_nullish() {
    let detail = error::detail_string(&cx.vm, &source);
    return Err(error::type_error(cx, format!("{detail} is not iterable")));
  }
  let map = match info.arg(1) {
    JsValue::Undefined => None,
    f => Some(builtins::callable_arg(cx, &f)?),
  };
  let mut values = match &source {
    JsValue::Object(_) | JsValue::String(_) => {
      ops::iterable_to_list(cx, &source)?
    }
    _ => Vec::new(),
  };
  if let Some(map) = map {
    for (index, value) in values.iter_mut().enumerate() {
      let args = [value.clone(), JsValue::Number(index as f64)];
      *value = ops::call_function(cx, map, info.arg(2), &args)?;
    }
  }
  Ok(JsValue::Object(ops::new_array(cx, values)))
}

fn push(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, mut length) = receiver(cx, info, "push")?;
  for value in info.args {
    ops::put(cx, id, key(length), value.clone(), true)?;
    length += 1;
  }
  set_length(cx, id, length)?;
  Ok(JsValue::Number(length as f64))
}

fn pop(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "pop")?;
  if length == 0 {
    set_length(cx, id, 0)?;
    return Ok(JsValue::Undefined);
  }
  let last = key(length - 1);
  let value = ops::get(cx, id, &last)?;
  ops::delete_property(cx, id, &last)?;
  set_length(cx, id, length - 1)?;
  Ok(value)
}

/// Moves `count` elements starting at `from` to start at `to`, preserving
/// holes.
fn move_elements(
  cx: &mut Isolate,
  id: ObjRef,
  from: u64,
  to: u64,
  count: u64,
) -> JsResult<()> {
  let indices: Box<dyn Iterator<Item = u64>> = if to > from {
    Box::new((0..count).rev())
  } else {
    Box::new(0..count)
  };
  for i in indices {
    let source = key(from + i);
    let target = key(to + i);
    if ops::has_property(cx, id, &source)? {
      let value = ops::get(cx, id, &source)?;
      ops::put(cx, id, target, value, true)?;
    } else if !ops::delete_property(cx, id, &target)? {
      return Err(error::type_error(
        cx,
        format!("Cannot delete property '{target}'"),
      ));
    }
  }
  Ok(())
}

fn shift(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "shift")?;
  if length == 0 {
    set_length(cx, id, 0)?;
    return Ok(JsValue::Undefined);
  }
  let first = ops::get(cx, id, &key(0))?;
  move_elements(cx, id, 1, 0, length - 1)?;
  ops::delete_property(cx, id, &key(length - 1))?;
  set_length(cx, id, length - 1)?;
  Ok(first)
}

fn unshift(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "unshift")?;
  let count = info.args.len() as u64;
  if count > 0 {
    move_elements(cx, id, 0, count, length)?;
    for (i, value) in info.args.iter().enumerate() {
      ops::put(cx, id, key(i as u64), value.clone(), true)?;
    }
  }
  set_length(cx, id, length + count)?;
  Ok(JsValue::Number((length + count) as f64))
}

fn slice(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "slice")?;
  let start = ops::relative_index(cx, &info.arg(0), length, 0)?;
  let end = ops::relative_index(cx, &info.arg(1), length, length)?;
  let result = ops::new_array(cx, Vec::new());
  let mut n = 0;
  for index in start..end.max(start) {
    let k = key(index);
    if ops::has_property(cx, id, &k)? {
      let value = ops::get(cx, id, &k)?;
      ops::create_data_property(cx, result, key(n), value)?;
    }
    n += 1;
  }
  set_length(cx, result, n)?;
  Ok(JsValue::Object(result))
}

fn splice(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "splice")?;
  let start = ops::relative_index(cx, &info.arg(0), length, 0)?;
  let delete_count = match info.args.len() {
    0 => 0,
    1 => length - start,
    _ => {
      let n = ops::to_integer_or_infinity(cx, &info.arg(1))?;
      n.clamp(0.0, (length - start) as f64) as u64
    }
  };
  let items = info.args.get(2..).unwrap_or_default();
  let removed = ops::new_array(cx, Vec::new());
  for i in 0..delete_count {
    let k = key(start + i);
    if ops::has_property(cx, id, &k)? {
      let value = ops::get(cx, id, &k)?;
      ops::create_data_property(cx, removed, key(i), value)?;
    }
  }
  set_length(cx, removed, delete_count)?;

  let item_count = items.len() as u64;
  let tail = length - start - delete_count;
  if item_count < delete_count {
    move_elements(cx, id, start + delete_count, start + item_count, tail)?;
    for index in (length - delete_count + item_count..length).rev() {
      ops::delete_property(cx, id, &key(index))?;
    }
  } else if item_count > delete_count {
    move_elements(cx, id, start + delete_count, start + item_count, tail)?;
  }
  for (i, item) in items.iter().enumerate() {
    ops::put(cx, id, key(start + i as u64), item.clone(), true)?;
  }
  set_length(cx, id, length - delete_count + item_count)?;
  Ok(JsValue::Object(removed))
}

fn concat(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let this = builtins::this_object(cx, &info.this, "Array.prototype.concat")?;
  let result = ops::new_array(cx, Vec::new());
  let mut n = 0;
  let items = std::iter::once(JsValue::Object(this)).chain(
    info.args.iter().cloned(),
  );
  for item in items {
    match item {
      JsValue::Object(array) if ops::is_array(cx, &item) => {
        let length = ops::length_of_array_like(cx, array)?;
        for index in 0..length {
          let k = key(index);
          if ops::has_property(cx, array, &k)? {
            let value = ops::get(cx, array, &k)?;
            ops::create_data_property(cx, result, key(n), value)?;
          }
          n += 1;
        }
      }
      other => {
        ops::create_data_property(cx, result, key(n), other)?;
        n += 1;
      }
    }
  }
  set_length(cx, result, n)?;
  Ok(JsValue::Object(result))
}

fn join(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "join")?;
  let separator = match info.arg(0) {
    JsValue::Undefined => ",".into(),
    other => ops::to_string(cx, &other)?,
  };
  let mut out = String::new();
  for index in 0..length {
    if index > 0 {
      out.push_str(&separator);
    }
    let element = ops::get(cx, id, &key(index))?;
    if !element.is_nullish() {
      out.push_str(&ops::to_string(cx, &element)?);
    }
  }
  Ok(JsValue::String(out.into()))
}

fn to_string(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = builtins::this_object(cx, &info.this, "Array.prototype.toString")?;
  let join = ops::get_str(cx, id, "join")?;
  if ops::is_callable(cx, &join) {
    return ops::call(cx, &join, JsValue::Object(id), &[]);
  }
  Ok(JsValue::String(ops::to_string_tag(cx, &JsValue::Object(id)).into()))
}

fn index_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "indexOf")?;
  let target = info.arg(0);
  let start = ops::relative_index(cx, &info.arg(1), length, 0)?;
  for index in start..length {
    let k = key(index);
    if ops::has_property(cx, id, &k)?
      && ops::get(cx, id, &k)?.strict_equals(&target)
    {
      return Ok(JsValue::Number(index as f64));
    }
  }
  Ok(JsValue::Number(-1.0))
}

fn last_index_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "lastIndexOf")?;
  if length == 0 {
    return Ok(JsValue::Number(-1.0));
  }
  let target = info.arg(0);
  let from = if info.args.len() > 1 {
    let n = ops::to_integer_or_infinity(cx, &info.arg(1))?;
    if n < 0.0 { length as f64 + n } else { n.min(length as f64 - 1.0) }
  } else {
    length as f64 - 1.0
  };
  if from < 0.0 {
    return Ok(JsValue::Number(-1.0));
  }
  for index in (0..=from as u64).rev() {
    let k = key(index);
    if ops::has_property(cx, id, &k)?
      && ops::get(cx, id, &k)?.strict_equals(&target)
    {
      return Ok(JsValue::Number(index as f64));
    }
  }
  Ok(JsValue::Number(-1.0))
}

fn includes(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "includes")?;
  let target = info.arg(0);
  let start = ops::relative_index(cx, &info.arg(1), length, 0)?;
  for index in start..length {
    if ops::get(cx, id, &key(index))?.same_value_zero(&target) {
      return Ok(JsValue::Bool(true));
    }
  }
  Ok(JsValue::Bool(false))
}

fn at(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "at")?;
  let n = ops::to_integer_or_infinity(cx, &info.arg(0))?;
  let index = if n < 0.0 { length as f64 + n } else { n };
  if index < 0.0 || index >= length as f64 {
    return Ok(JsValue::Undefined);
  }
  ops::get(cx, id, &key(index as u64))
}

/// What an iteration callback's result means to the calling method.
enum Visit {
  Continue,
  Stop(JsValue),
}

/// Runs `callback(element, index, array)` over the present elements.
fn each(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
  skip_holes: bool,
  mut visit: impl FnMut(&mut Isolate, u64, JsValue, JsValue) -> JsResult<Visit>,
) -> JsResult<Option<JsValue>> {
  let (id, length) = receiver(cx, info, method)?;
  let callback = builtins::callable_arg(cx, &info.arg(0))?;
  let this_arg = info.arg(1);
  for index in 0..length {
    let k = key(index);
    if skip_holes && !ops::has_property(cx, id, &k)? {
      continue;
    }
    let element = ops::get(cx, id, &k)?;
    let args = [
      element.clone(),
      JsValue::Number(index as f64),
      JsValue::Object(id),
    ];
    let result = ops::call_function(cx, callback, this_arg.clone(), &args)?;
    if let Visit::Stop(value) = visit(cx, index, element, result)? {
      return Ok(Some(value));
    }
  }
  Ok(None)
}

fn for_each(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  each(cx, info, "forEach", true, |_, _, _, _| Ok(Visit::Continue))?;
  Ok(JsValue::Undefined)
}

fn map(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (_, length) = receiver(cx, info, "map")?;
  let result = ops::new_array(cx, Vec::new());
  set_length(cx, result, length)?;
  each(cx, info, "map", true, |cx, index, _, value| {
    ops::create_data_property(cx, result, key(index), value)?;
    Ok(Visit::Continue)
  })?;
  Ok(JsValue::Object(result))
}

fn filter(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let mut kept = Vec::new();
  each(cx, info, "filter", true, |_, _, element, selected| {
    if selected.truthy() {
      kept.push(element);
    }
    Ok(Visit::Continue)
  })?;
  Ok(JsValue::Object(ops::new_array(cx, kept)))
}

fn some(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let found = each(cx, info, "some", true, |_, _, _, result| {
    Ok(if result.truthy() {
      Visit::Stop(JsValue::Bool(true))
    } else {
      Visit::Continue
    })
  })?;
  Ok(found.unwrap_or(JsValue::Bool(false)))
}

fn every(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let found = each(cx, info, "every", true, |_, _, _, result| {
    Ok(if result.truthy() {
      Visit::Continue
    } else {
      Visit::Stop(JsValue::Bool(false))
    })
  })?;
  Ok(found.unwrap_or(JsValue::Bool(true)))
}

fn find(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let found = each(cx, info, "find", false, |_, _, element, result| {
    Ok(if result.truthy() { Visit::Stop(element) } else { Visit::Continue })
  })?;
  Ok(found.unwrap_or_default())
}

fn find_index(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let found = each(cx, info, "findIndex", false, |_, index, _, result| {
    Ok(if result.truthy() {
      Visit::Stop(JsValue::Number(index as f64))
    } else {
      Visit::Continue
    })
  })?;
  Ok(found.unwrap_or(JsValue::Number(-1.0)))
}

fn reduce_impl(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
  from_end: bool,
) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, method)?;
  let callback = builtins::callable_arg(cx, &info.arg(0))?;
  let indices: Vec<u64> = if from_end {
    (0..length).rev().collect()
  } else {
    (0..length).collect()
  };
  let mut indices = indices.into_iter();
  let mut accumulator = if info.args.len() > 1 {
    info.arg(1)
  } else {
    loop {
      let Some(index) = indices.next() else {
        return Err(error::type_error(
          cx,
          "Reduce of empty array with no initial value",
        ));
      };
      let k = key(index);
      if ops::has_property(cx, id, &k)? {
        break ops::get(cx, id, &k)?;
      }
    }
  };
  for index in indices {
    let k = key(index);
    if !ops::has_property(cx, id, &k)? {
      continue;
    }
    let element = ops::get(cx, id, &k)?;
    let args = [
      accumulator,
      element,
      JsValue::Number(index as f64),
      JsValue::Object(id),
    ];
    accumulator = ops::call_function(cx, callback, JsValue::Undefined, &args)?;
  }
  Ok(accumulator)
}

fn reduce(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  reduce_impl(cx, info, "reduce", false)
}

fn reduce_right(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  reduce_impl(cx, info, "reduceRight", true)
}

fn reverse(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "reverse")?;
  let mut lower = 0;
  while length > 1 && lower < length / 2 {
    let upper = length - 1 - lower;
    let (lk, uk) = (key(lower), key(upper));
    let lower_exists = ops::has_property(cx, id, &lk)?;
    let upper_exists = ops::has_property(cx, id, &uk)?;
    let lower_value = ops::get(cx, id, &lk)?;
    let upper_value = ops::get(cx, id, &uk)?;
    if upper_exists {
      ops::put(cx, id, lk.clone(), upper_value, true)?;
    } else {
      ops::delete_property(cx, id, &lk)?;
    }
    if lower_exists {
      ops::put(cx, id, uk, lower_value, true)?;
    } else {
      ops::delete_property(cx, id, &uk)?;
    }
    lower += 1;
  }
  Ok(JsValue::Object(id))
}

fn fill(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (id, length) = receiver(cx, info, "fill")?;
  let start = ops::relative_index(cx, &info.arg(1), length, 0)?;
  let end = ops::relative_index(cx, &info.arg(2), length, length)?;
  for index in start..end.max(start) {
    ops::put(cx, id, key(index), info.arg(0), true)?;
  }
  Ok(JsValue::Object(id))
}

fn compare(
  cx: &mut Isolate,
  comparator: Option<ObjRef>,
  a: &JsValue,
  b: &JsValue,
) -> JsResult<Ordering> {
  match (a, b) {
    (JsValue::Undefined, JsValue::Undefined) => return Ok(Ordering::Equal),
    (JsValue::Undefined, _) => return Ok(Ordering::Greater),
    (_, JsValue::Undefined) => return Ok(Ordering::Less),
    _ => {}
  }
  if let Some(comparator) = comparator {
    let result = ops::call_function(
      cx,
      comparator,
      JsValue::Undefined,
      &[a.clone(), b.clone()],
    )?;
    let n = ops::to_number(cx, &result)?;
    return Ok(n.partial_cmp(&0.0).unwrap_or(Ordering::Equal));
  }
  let x = ops::to_string(cx, a)?;
  let y = ops::to_string(cx, b)?;
  Ok(x.encode_utf16().cmp(y.encode_utf16()))
}

/// Stable merge sort with a comparator that may throw.
fn merge_sort(
  cx: &mut Isolate,
  values: Vec<JsValue>,
  comparator: Option<ObjRef>,
) -> JsResult<Vec<JsValue>> {
  if values.len() <= 1 {
    return Ok(values);
  }
  let mut left = values;
  let right = left.split_off(left.len() / 2);
  let left = merge_sort(cx, left, comparator)?;
  let right = merge_sort(cx, right, comparator)?;
  let mut merged = Vec::with_capacity(left.len() + right.len());
  let mut left = left.into_iter().peekable();
  let mut right = right.into_iter().peekable();
  while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
    if compare(cx, comparator, a, b)? == Ordering::Greater {
      merged.extend(right.next());
    } else {
      merged.extend(left.next());
    }
  }
  merged.extend(left);
  merged.extend(right);
  Ok(merged)
}

fn sort(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let comparator = match info.arg(0) {
    JsValue::Undefined => None,
    JsValue::Object(f) if cx.vm.heap.object(f).is_callable() => Some(f),
    _ => {
      return Err(error::type_error(
        cx,
        "The comparison function must be either a function or undefined",
      ));
    }
  };
  let (id, length) = receiver(cx, info, "sort")?;
  let mut values = Vec::new();
  for index in 0..length {
    let k = key(index);
    if ops::has_property(cx, id, &k)? {
      values.push(ops::get(cx, id, &k)?);
    }
  }
  let present = values.len() as u64;
  let sorted = merge_sort(cx, values, comparator)?;
  for (index, value) in sorted.into_iter().enumerate() {
    ops::put(cx, id, key(index as u64), value, true)?;
  }
  for index in present..length {
    ops::delete_property(cx, id, &key(index))?;
  }
  Ok(JsValue::Object(id))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let prototype = cx.vm.realm(realm).intrinsics.array_prototype;
  let ctor = builtins::constructor(
    cx,
    realm,
    "Array",
    1,
    array_constructor,
    prototype,
  );
  cx.vm.realm_mut(realm).intrinsics.array_constructor = Some(ctor);
  builtins::method(cx, realm, ctor, "isArray", 1, is_array);
  builtins::method(cx, realm, ctor, "of", 0, of);
  builtins::method(cx, realm, ctor, "from", 1, from);

  let methods: [(&str, u32, BuiltinFn); 27] = [
    ("at", 1, at),
    ("push", 1, push),
    ("pop", 0, pop),
    ("shift", 0, shift),
    ("unshift", 1, unshift),
    ("slice", 2, slice),
    ("splice", 2, splice),
    ("concat", 1, concat),
    ("join", 1, join),
    ("toString", 0, to_string),
    ("indexOf", 1, index_of),
    ("lastIndexOf", 1, last_index_of),
    ("includes", 1, includes),
    ("forEach", 1, for_each),
    ("map", 1, map),
    ("filter", 1, filter),
    ("some", 1, some),
    ("every", 1, every),
    ("find", 1, find),
    ("findIndex", 1, find_index),
    ("reduce", 1, reduce),
    ("reduceRight", 1, reduce_right),
    ("reverse", 0, reverse),
    ("fill", 1, fill),
    ("sort", 1, sort),
    ("flat", 0, flat),
    ("keys", 0, keys),
  ];
  for (name, length, f) in methods {
    builtins::method(cx, realm, prototype, name, length, f);
  }
}

fn flatten_into(
  cx: &mut Isolate,
  out: &mut Vec<JsValue>,
  source: ObjRef,
  depth: f64,
) -> JsResult<()> {
  let length = ops::length_of_array_like(cx, source)?;
  for index in 0..length {
    let k = key(index);
    if !ops::has_property(cx, source, &k)? {
      continue;
    }
    let element = ops::get(cx, source, &k)?;
    match element {
      JsValue::Object(inner) if depth > 0.0 && ops::is_array(cx, &element) => {
        flatten_into(cx, out, inner, depth - 1.0)?;
      }
      _ => out.push(element),
    }
  }
  Ok(())
}

fn flat(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = builtins::this_object(cx, &info.this, "Array.prototype.flat")?;
  let depth = match info.arg(0) {
    JsValue::Undefined => 1.0,
    other => ops::to_integer_or_infinity(cx, &other)?,
  };
  let mut out = Vec::new();
  flatten_into(cx, &mut out, id, depth)?;
  Ok(JsValue::Object(ops::new_array(cx, out)))
}

/// Materialized index list; iterator objects are not modelled.
fn keys(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (_, length) = receiver(cx, info, "keys")?;
  let keys = (0..length).map(|i| JsValue::Number(i as f64)).collect();
  Ok(JsValue::Object(ops::new_array(cx, keys)))
}
