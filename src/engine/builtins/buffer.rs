// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `ArrayBuffer` and `Uint8Array`.

use crate::array_buffer::BackingStore;
use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::error as errors;
use crate::engine::object::BuiltinFn;
use crate::engine::object::CallInfo;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::isolate::Isolate;
use crate::support::SharedRef;

/// Largest buffer script may allocate in one go.
const MAX_BYTE_LENGTH: f64 = (1u64 << 32) as f64;

pub(crate) fn new_array_buffer(
  cx: &mut Isolate,
  store: SharedRef<BackingStore>,
  proto: Option<ObjRef>,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  let proto = proto.unwrap_or(
    cx.vm.realm(realm).intrinsics.array_buffer_prototype,
  );
  ops::alloc(
    cx,
    JsObject::with_class(Some(proto), realm, ObjectClass::ArrayBuffer(store)),
  )
}

pub(crate) fn new_uint8_array(
  cx: &mut Isolate,
  buffer: ObjRef,
  offset: usize,
  length: usize,
  proto: Option<ObjRef>,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  let proto = proto.unwrap_or(
    cx.vm.realm(realm).intrinsics.uint8_array_prototype,
  );
  ops::alloc(
    cx,
    JsObject::with_class(
      Some(proto),
      realm,
      ObjectClass::Uint8Array {
        buffer,
        offset,
        length,
      },
    ),
  )
}

pub(crate) fn backing_store(
  cx: &Isolate,
  buffer: ObjRef,
) -> Option<SharedRef<BackingStore>> {
  match &cx.vm.heap.object(buffer).class {
    ObjectClass::ArrayBuffer(store) => Some(store.clone()),
    _ => None,
  }
}

/// ToIndex, raising a RangeError with `message` when out of range.
fn to_index(
  cx: &mut Isolate,
  value: &JsValue,
  message: &str,
) -> JsResult<usize> {
  if value.is_undefined() {
    return Ok(0);
  }
  let n = ops::to_integer_or_infinity(cx, value)?;
  if !(0.0..=MAX_BYTE_LENGTH).contains(&n) {
    return Err(errors::range_error(cx, message));
  }
  Ok(n as usize)
}

fn this_array_buffer(
  cx: &mut Isolate,
  this: &JsValue,
  method: &str,
) -> JsResult<(ObjRef, SharedRef<BackingStore>)> {
  if let Some(id) = this.as_object() {
    if let Some(store) = backing_store(cx, id) {
      return Ok((id, store));
    }
  }
  let detail = errors::detail_string(&cx.vm, this);
  Err(errors::type_error(
    cx,
    format!(
      "Method ArrayBuffer.prototype.{method} called on incompatible receiver {detail}",
    ),
  ))
}

fn array_buffer_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let Some(new_target) = info.new_target else {
    return Err(errors::type_error(
      cx,
      "Constructor ArrayBuffer requires 'new'",
    ));
  };
  let byte_length = to_index(cx, &info.arg(0), "Invalid array buffer length")?;
  let fallback = ops::intrinsics(cx).array_buffer_prototype;
  let proto = ops::prototype_from_constructor(cx, new_target, fallback)?;
  let store = SharedRef::new(BackingStore::new(byte_length));
  Ok(JsValue::Object(new_array_buffer(cx, store, Some(proto))))
}

fn is_view(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let is_view = info
    .arg(0)
    .as_object()
    .is_some_and(|id| matches!(
      cx.vm.heap.object(id).class,
      ObjectClass::Uint8Array { .. },
    ));
  Ok(JsValue::Bool(is_view))
}

fn byte_length(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let (_, store) = this_array_buffer(cx, &info.this, "byteLength")?;
  Ok(JsValue::Number(store.byte_length() as f64))
}

/// Resolves a `(start, end)` pair of relative indices against `len`.
fn relative_range(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  len: usize,
) -> JsResult<(usize, usize)> {
  let len = len as u64;
  let start = ops::relative_index(cx, &info.arg(0), len, 0)?;
  let end = ops::relative_index(cx, &info.arg(1), len, len)?;
  Ok((start as usize, end.max(start) as usize))
}

fn array_buffer_slice(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let (_, store) = this_array_buffer(cx, &info.this, "slice")?;
  let (start, end) = relative_range(cx, info, store.byte_length())?;
  let copy = BackingStore::new(end - start);
  for (to, from) in (start..end).enumerate() {
    copy.set(to, store.get(from).unwrap_or(0));
  }
  Ok(JsValue::Object(new_array_buffer(cx, SharedRef::new(copy), None)))
}

struct View {
  id: ObjRef,
  buffer: ObjRef,
  offset: usize,
  length: usize,
}

fn this_view(cx: &mut Isolate, this: &JsValue, method: &str) -> JsResult<View> {
  if let Some(id) = this.as_object() {
    if let ObjectClass::Uint8Array {
      buffer,
      offset,
      length,
    } = cx.vm.heap.object(id).class
    {
      return Ok(View {
        id,
        buffer,
        offset,
        length,
      });
    }
  }
  let detail = errors::detail_string(&cx.vm, this);
  Err(errors::type_error(
    cx,
    format!(
      "Method %TypedArray%.prototype.{method} called on incompatible receiver {detail}",
    ),
  ))
}

impl View {
  fn bytes(&self, cx: &Isolate) -> Vec<u8> {
    match backing_store(cx, self.buffer) {
      Some(store) => (0..self.length)
        .map(|i| store.get(self.offset + i).unwrap_or(0))
        .collect(),
      None => Vec::new(),
    }
  }

  fn write(&self, cx: &Isolate, index: usize, byte: u8) {
    if let Some(store) = backing_store(cx, self.buffer) {
      if index < self.length {
        store.set(self.offset + index, byte);
      }
    }
  }
}

fn to_byte(cx: &mut Isolate, value: &JsValue) -> JsResult<u8> {
  Ok(ops::to_uint32(cx, value)? as u8)
}

fn uint8_array_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let Some(new_target) = info.new_target else {
    return Err(errors::type_error(
      cx,
      "Constructor Uint8Array requires 'new'",
    ));
  };
  let fallback = ops::intrinsics(cx).uint8_array_prototype;
  let proto = ops::prototype_from_constructor(cx, new_target, fallback)?;
  let first = info.arg(0);
  let source = match first.as_object() {
    Some(id) => id,
    None => {
      let length = to_index(cx, &first, "Invalid typed array length")?;
      let store = SharedRef::new(BackingStore::new(length));
      let buffer = new_array_buffer(cx, store, None);
      return Ok(JsValue::Object(new_uint8_array(
        cx,
        buffer,
        0,
        length,
        Some(proto),
      )));
    }
  };
  if let Some(store) = backing_store(cx, source) {
    let offset = to_index(
      cx,
      &info.arg(1),
      "Start offset is outside the bounds of the buffer",
    )?;
    let available = store.byte_length();
    if offset > available {
      return Err(errors::range_error(
        cx,
        format!("Start offset {offset} is outside the bounds of the buffer"),
      ));
    }
    let length = match info.arg(2) {
      JsValue::Undefined => available - offset,
      length => {
        let length = to_index(cx, &length, "Invalid typed array length")?;
        if offset + length > available {
          return Err(errors::range_error(
            cx,
            format!("Invalid typed array length: {length}"),
          ));
        }
        length
      }
    };
    return Ok(JsValue::Object(new_uint8_array(
      cx,
      source,
      offset,
      length,
      Some(proto),
    )));
  }
  // Array-likes and typed arrays are copied element by element.
  let values = ops::array_like_to_list(cx, source)?;
  let store = BackingStore::new(values.len());
  for (i, value) in values.iter().enumerate() {
    store.set(i, to_byte(cx, value)?);
  }
  let length = values.len();
  let buffer = new_array_buffer(cx, SharedRef::new(store), None);
  Ok(JsValue::Object(new_uint8_array(cx, buffer, 0, length, Some(proto))))
}

fn view_buffer(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Object(this_view(cx, &info.this, "buffer")?.buffer))
}

fn view_byte_offset(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Ok(JsValue::Number(this_view(cx, &info.this, "byteOffset")?.offset as f64))
}

fn view_length(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Number(this_view(cx, &info.this, "length")?.length as f64))
}

fn view_byte_length(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Ok(JsValue::Number(this_view(cx, &info.this, "byteLength")?.length as f64))
}

fn subarray(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let view = this_view(cx, &info.this, "subarray")?;
  let (start, end) = relative_range(cx, info, view.length)?;
  let array = new_uint8_array(
    cx,
    view.buffer,
    view.offset + start,
    end - start,
    None,
  );
  Ok(JsValue::Object(array))
}

fn view_slice(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let view = this_view(cx, &info.this, "slice")?;
  let (start, end) = relative_range(cx, info, view.length)?;
  let bytes = view.bytes(cx);
  let store = BackingStore::new(end - start);
  for (to, byte) in bytes[start..end].iter().enumerate() {
    store.set(to, *byte);
  }
  let buffer = new_array_buffer(cx, SharedRef::new(store), None);
  Ok(JsValue::Object(new_uint8_array(cx, buffer, 0, end - start, None)))
}

fn set(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let view = this_view(cx, &info.this, "set")?;
  let source = ops::to_object(cx, &info.arg(0))?;
  let offset = to_index(cx, &info.arg(1), "offset is out of bounds")?;
  // Read everything first so overlapping views copy correctly.
  let values = ops::array_like_to_list(cx, source)?;
  if offset + values.len() > view.length {
    return Err(errors::range_error(cx, "offset is out of bounds"));
  }
  let mut bytes = Vec::with_capacity(values.len());
  for value in &values {
    bytes.push(to_byte(cx, value)?);
  }
  for (i, byte) in bytes.into_iter().enumerate() {
    view.write(cx, offset + i, byte);
  }
  Ok(JsValue::Undefined)
}

fn fill(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let view = this_view(cx, &info.this, "fill")?;
  let byte = to_byte(cx, &info.arg(0))?;
  let len = view.length as u64;
  let start = ops::relative_index(cx, &info.arg(1), len, 0)? as usize;
  let end = ops::relative_index(cx, &info.arg(2), len, len)? as usize;
  for i in start..end {
    view.write(cx, i, byte);
  }
  Ok(JsValue::Object(view.id))
}

fn index_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let view = this_view(cx, &info.this, "indexOf")?;
  let start = ops::relative_index(
    cx,
    &info.arg(1),
    view.length as u64,
    0,
  )? as usize;
  let found = match info.arg(0) {
    JsValue::Number(n) if (0.0..=255.0).contains(&n) && n.fract() == 0.0 => view
      .bytes(cx)
      .iter()
      .skip(start)
      .position(|b| *b as f64 == n)
      .map(|i| (i + start) as f64),
    _ => None,
  };
  Ok(JsValue::Number(found.unwrap_or(-1.0)))
}

fn includes(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  match index_of(cx, info)? {
    JsValue::Number(n) => Ok(JsValue::Bool(n >= 0.0)),
    _ => Ok(JsValue::Bool(false)),
  }
}

fn join(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let view = this_view(cx, &info.this, "join")?;
  let separator = match info.arg(0) {
    JsValue::Undefined => ",".into(),
    separator => ops::to_string(cx, &separator)?,
  };
  let parts: Vec<String> = view.bytes(cx).iter().map(u8::to_string).collect();
  Ok(JsValue::str(&parts.join(&separator)))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let intrinsics = &cx.vm.realm(realm).intrinsics;
  let (buffer_prototype, view_prototype) =
    (intrinsics.array_buffer_prototype, intrinsics.uint8_array_prototype);

  let array_buffer = builtins::constructor(
    cx,
    realm,
    "ArrayBuffer",
    1,
    array_buffer_constructor,
    buffer_prototype,
  );
  builtins::method(cx, realm, array_buffer, "isView", 1, is_view);
  builtins::getter(cx, realm, buffer_prototype, "byteLength", byte_length);
  builtins::method(cx, realm, buffer_prototype, "slice", 2, array_buffer_slice);

  builtins::constructor(
    cx,
    realm,
    "Uint8Array",
    3,
    uint8_array_constructor,
    view_prototype,
  );
  let getters: [(&str, BuiltinFn); 4] = [
    ("buffer", view_buffer),
    ("byteOffset", view_byte_offset),
    ("byteLength", view_byte_length),
    ("length", view_length),
  ];
  for (name, f) in getters {
    builtins::getter(cx, realm, view_prototype, name, f);
  }
  let methods: [(&str, u32, BuiltinFn); 7] = [
    ("subarray", 2, subarray),
    ("slice", 2, view_slice),
    ("set", 1, set),
    ("fill", 1, fill),
    ("indexOf", 1, index_of),
    ("includes", 1, includes),
    ("join", 1, join),
  ];
  for (name, length, f) in methods {
    builtins::method(cx, realm, view_prototype, name, length, f);
  }
}
