// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::object::ObjectClass;
use crate::engine::value::ObjRef;
use crate::ArrayBuffer;
use crate::ArrayBufferView;
use crate::HandleScope;
use crate::Local;
use crate::TypedArray;

impl ArrayBufferView {
  /// (buffer, byte offset, byte length) of the view.
  fn view(&self) -> (ObjRef, usize, usize) {
    match self.host_isolate().vm.heap.object(self.obj()).class {
      ObjectClass::Uint8Array {
        buffer,
        offset,
        length,
      } => (buffer, offset, length),
      _ => unreachable!("not an array buffer view"),
    }
  }

  /// Returns underlying ArrayBuffer.
  pub fn buffer<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, ArrayBuffer>> {
    let (buffer, _, _) = self.view();
    Some(scope.new_object_local(buffer))
  }

  /// Size of a view in bytes.
  pub fn byte_length(&self) -> usize {
    self.view().2
  }

  /// Byte offset in |Buffer|.
  pub fn byte_offset(&self) -> usize {
    self.view().1
  }

  /// Copy the contents of the ArrayBufferView's buffer to an embedder defined
  /// memory without additional overhead that calling ArrayBufferView::Buffer
  /// might incur.
  /// Returns the number of bytes actually written.
  pub fn copy_contents(&self, dest: &mut [u8]) -> usize {
    let (buffer, offset, length) = self.view();
    let store = match &self.host_isolate().vm.heap.object(buffer).class {
      ObjectClass::ArrayBuffer(store) => store.clone(),
      _ => unreachable!("view over something other than an ArrayBuffer"),
    };
    let count = length.min(dest.len());
    for (i, byte) in dest.iter_mut().take(count).enumerate() {
      *byte = store.get(offset + i).unwrap_or(0);
    }
    count
  }
}

impl TypedArray {
  /// Number of elements in this typed array
  /// (e.g. for Int16Array, |ByteLength|/2).
  pub fn length(&self) -> usize {
    self.byte_length()
  }
}
