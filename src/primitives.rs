// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::value::JsValue;
use crate::Boolean;
use crate::HandleScope;
use crate::Local;
use crate::Primitive;

#[inline(always)]
pub fn null<'s>(scope: &mut HandleScope<'s, ()>) -> Local<'s, Primitive> {
  scope.value_local(JsValue::Null)
}

#[inline(always)]
pub fn undefined<'s>(scope: &mut HandleScope<'s, ()>) -> Local<'s, Primitive> {
  scope.value_local(JsValue::Undefined)
}

impl Boolean {
  #[inline(always)]
  pub fn new<'s>(scope: &mut HandleScope<'s, ()>, value: bool) -> Local<'s, Boolean> {
    scope.value_local(JsValue::Bool(value))
  }

  pub fn is_true(&self) -> bool {
    matches!(self.js_value(), JsValue::Bool(true))
  }
}
