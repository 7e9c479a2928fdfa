// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use std::ffi::c_void;

use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::ContextId;
use crate::isolate::Isolate;
use crate::External;
use crate::HandleScope;
use crate::Local;

impl External {
  /// Wraps a raw pointer in a value script can pass around but not look
  /// into. The pointer is never dereferenced by the engine.
  #[inline(always)]
  #[allow(clippy::not_unsafe_ptr_arg_deref)]
  pub fn new<'s>(
    scope: &mut HandleScope<'s, ()>,
    value: *mut c_void,
  ) -> Local<'s, Self> {
    let isolate: &mut Isolate = scope.as_mut();
    // Externals belong to no realm in particular.
    let realm = isolate.entered_context_id().unwrap_or(ContextId(0));
    let object = JsObject::with_class(None, realm, ObjectClass::External(value));
    let id = ops::alloc(isolate, object);
    scope.new_object_local(id)
  }

  #[inline(always)]
  pub fn value(&self) -> *mut c_void {
    match self.host_isolate().vm.heap.object(self.obj()).class {
      ObjectClass::External(value) => value,
      _ => unreachable!("not an external"),
    }
  }
}
