// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::builtins::buffer;
use crate::ArrayBuffer;
use crate::HandleScope;
use crate::Local;
use crate::Uint8Array;

impl Uint8Array {
  /// A view of `length` bytes of `buf` starting at `byte_offset`. Returns
  /// `None` if the range does not fit inside the buffer.
  pub fn new<'s>(
    scope: &mut HandleScope<'s>,
    buf: Local<ArrayBuffer>,
    byte_offset: usize,
    length: usize,
  ) -> Option<Local<'s, Uint8Array>> {
    let end = byte_offset.checked_add(length)?;
    if end > buf.byte_length() {
      return None;
    }
    let buffer = buf.obj();
    let id = scope.run_js(|cx, _| {
      Ok(buffer::new_uint8_array(cx, buffer, byte_offset, length, None))
    })?;
    Some(scope.new_object_local(id))
  }
}
