// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::rc::Rc;

use crate::engine::error;
use crate::engine::error::ErrorKind;
use crate::engine::error::FrameInfo;
use crate::engine::error::MessageData;
use crate::engine::object::ObjectClass;
use crate::engine::value::JsValue;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::script::string_text;
use crate::HandleScope;
use crate::Local;
use crate::Message;
use crate::ScriptOrigin;
use crate::StackFrame;
use crate::StackTrace;
use crate::String;
use crate::Value;

impl StackTrace {
  /// Grab a snapshot of the current JavaScript execution stack.
  pub fn current_stack_trace<'s>(
    scope: &mut HandleScope<'s, ()>,
    frame_limit: usize,
  ) -> Option<Local<'s, StackTrace>> {
    let isolate: &Isolate = scope.as_ref();
    let frames = error::capture_frames(&isolate.vm, frame_limit);
    Some(scope.new_local(Handled::StackTrace(Rc::new(frames))))
  }

  fn frames(&self) -> Rc<Vec<FrameInfo>> {
    match self.handled() {
      Handled::StackTrace(frames) => frames,
      _ => unreachable!("not a stack trace"),
    }
  }

  /// Returns the number of StackFrames.
  pub fn get_frame_count(&self) -> usize {
    self.frames().len()
  }

  /// Returns a StackFrame at a particular index.
  pub fn get_frame<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
    index: usize,
  ) -> Option<Local<'s, StackFrame>> {
    let frames = self.frames();
    if index >= frames.len() {
      return None;
    }
    Some(scope.new_local(Handled::StackFrame { frames, index }))
  }
}

impl StackFrame {
  fn with_frame<R>(&self, f: impl FnOnce(&FrameInfo) -> R) -> R {
    match self.handled() {
      Handled::StackFrame { frames, index } => f(&frames[index]),
      _ => unreachable!("not a stack frame"),
    }
  }

  /// Returns the number, 1-based, of the line for the associate function call.
  /// This method will return Message::kNoLineNumberInfo if it is unable to
  /// retrieve the line number, or if kLineNumber was not passed as an option
  /// when capturing the StackTrace.
  pub fn get_line_number(&self) -> usize {
    self.with_frame(|frame| frame.line.max(0) as usize)
  }

  /// Returns the 1-based column offset on the line for the associated function
  /// call.
  pub fn get_column(&self) -> usize {
    self.with_frame(|frame| frame.column.max(0) as usize)
  }

  /// Returns the id of the script for the function for this StackFrame.
  pub fn get_script_id(&self) -> usize {
    self.with_frame(|frame| frame.script_id.max(0) as usize)
  }

  /// Returns the name of the resource that contains the script for the
  /// function for this StackFrame.
  pub fn get_script_name<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, String>> {
    match self.with_frame(|frame| frame.script_name.clone()) {
      name @ JsValue::String(_) => Some(scope.value_local(name)),
      _ => None,
    }
  }

  /// Returns the name of the resource that contains the script for the
  /// function for this StackFrame or sourceURL value if the script name
  /// is undefined and its source ends with //# sourceURL=... string or
  /// deprecated //@ sourceURL=... string.
  pub fn get_script_name_or_source_url<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, String>> {
    self.get_script_name(scope)
  }

  /// Returns the name of the function associated with this stack frame.
  pub fn get_function_name<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, String>> {
    let name = self.with_frame(|frame| frame.function_name.clone());
    if name.is_empty() {
      return None;
    }
    Some(scope.value_local(JsValue::String(name)))
  }

  /// Returns whether or not the associated function is compiled via a call to
  /// eval().
  pub fn is_eval(&self) -> bool {
    false
  }

  /// Returns whether or not the associated function is called as a
  /// constructor via "new".
  pub fn is_constructor(&self) -> bool {
    self.with_frame(|frame| frame.is_constructor)
  }

  /// Returns whether or not the associated functions is defined in wasm.
  pub fn is_wasm(&self) -> bool {
    false
  }

  /// Returns whether or not the associated function is defined by the user.
  pub fn is_user_javascript(&self) -> bool {
    self.with_frame(|frame| frame.is_user_javascript)
  }
}

/// The error message of an exception, with the script position it was
/// thrown from.
impl Message {
  fn data(&self) -> Rc<MessageData> {
    match self.handled() {
      Handled::Message(data) => data,
      _ => unreachable!("not a message"),
    }
  }

  /// The message text, e.g. "Uncaught TypeError: x is not a function".
  pub fn get<'s>(&self, scope: &mut HandleScope<'s, ()>) -> Local<'s, String> {
    let text = self.data().text.clone();
    scope.value_local(JsValue::String(text))
  }

  /// Returns the line of source the exception was thrown on.
  pub fn get_source_line<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, String>> {
    let data = self.data();
    let source = data.source.as_ref()?;
    let line = source.source_line(data.span.start);
    Some(scope.value_local(JsValue::str(line)))
  }

  /// Returns the resource name for the script from where the function causing
  /// the error originates.
  pub fn get_script_resource_name<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, Value>> {
    let name = self.data().source.as_ref()?.resource_name.clone();
    Some(scope.value_local(name))
  }

  /// Returns the origin for the script from where the function causing the
  /// error originates.
  pub fn get_script_origin<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<ScriptOrigin<'s>> {
    let data = self.data();
    let source = data.source.as_ref()?;
    Some(ScriptOrigin::from_source_info(scope, source))
  }

  /// Returns the number, 1-based, of the line where the error occurred.
  pub fn get_line_number(&self, _scope: &mut HandleScope<'_, ()>) -> Option<usize> {
    let data = self.data();
    let source = data.source.as_ref()?;
    let location = source.location(data.span.start);
    Some((location.line + 1).max(0) as usize)
  }

  /// Returns the index within the script of the first character where
  /// the error occurred.
  pub fn get_start_position(&self) -> i32 {
    self.data().span.start as i32
  }

  /// Returns the index within the script of the last character where
  /// the error occurred.
  pub fn get_end_position(&self) -> i32 {
    self.data().span.end as i32
  }

  /// Returns the index within the line of the first character where
  /// the error occurred.
  pub fn get_start_column(&self) -> usize {
    let data = self.data();
    match &data.source {
      Some(source) => source.location(data.span.start).column.max(0) as usize,
      None => 0,
    }
  }

  /// Returns the index within the line of the last character where
  /// the error occurred. Errors spanning lines end at the end of the first
  /// one.
  pub fn get_end_column(&self) -> usize {
    let data = self.data();
    let Some(source) = &data.source else {
      return 0;
    };
    let start = source.location(data.span.start);
    let end = source.location(data.span.end.max(data.span.start));
    if end.line == start.line {
      end.column.max(0) as usize
    } else {
      let line = source.source_line(data.span.start);
      start.column.max(0) as usize + line.encode_utf16().count()
    }
  }

  /// The stack trace captured when the exception was thrown. Only recorded
  /// when `Isolate::set_capture_stack_trace_for_uncaught_exceptions` is on.
  pub fn get_stack_trace<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, StackTrace>> {
    let isolate: &Isolate = scope.as_ref();
    let limit = isolate.capture_stack_trace?;
    let data = self.data();
    let frames: Vec<FrameInfo> =
      data.frames.iter().take(limit).cloned().collect();
    Some(scope.new_local(Handled::StackTrace(Rc::new(frames))))
  }

  /// Returns true if the script the error came from was marked opaque.
  pub fn is_opaque(&self) -> bool {
    self.data().source.as_ref().is_some_and(|source| source.opaque)
  }

  pub fn is_shared_cross_origin(&self) -> bool {
    self
      .data()
      .source
      .as_ref()
      .is_some_and(|source| source.shared_cross_origin)
  }
}

/// Create new error objects by calling the corresponding error object
/// constructor with the message.
pub struct Exception;

impl Exception {
  pub fn error<'s>(
    scope: &mut HandleScope<'s>,
    message: Local<String>,
  ) -> Local<'s, Value> {
    Self::new_error(scope, ErrorKind::Error, message)
  }

  pub fn range_error<'s>(
    scope: &mut HandleScope<'s>,
    message: Local<String>,
  ) -> Local<'s, Value> {
    Self::new_error(scope, ErrorKind::RangeError, message)
  }

  pub fn reference_error<'s>(
    scope: &mut HandleScope<'s>,
    message: Local<String>,
  ) -> Local<'s, Value> {
    Self::new_error(scope, ErrorKind::ReferenceError, message)
  }

  pub fn syntax_error<'s>(
    scope: &mut HandleScope<'s>,
    message: Local<String>,
  ) -> Local<'s, Value> {
    Self::new_error(scope, ErrorKind::SyntaxError, message)
  }

  pub fn type_error<'s>(
    scope: &mut HandleScope<'s>,
    message: Local<String>,
  ) -> Local<'s, Value> {
    Self::new_error(scope, ErrorKind::TypeError, message)
  }

  fn new_error<'s>(
    scope: &mut HandleScope<'s>,
    kind: ErrorKind,
    message: Local<String>,
  ) -> Local<'s, Value> {
    let realm = scope.context_id();
    let message = string_text(&message);
    let isolate: &mut Isolate = scope.as_mut();
    let error = error::create_error_in(isolate, realm, kind, &message);
    scope.new_object_local(error)
  }

  /// Creates an error message for the given exception.
  /// Will try to reconstruct the original stack trace from the exception value,
  /// or capture the current stack trace if not available.
  pub fn create_message<'s>(
    scope: &mut HandleScope<'s, ()>,
    exception: Local<Value>,
  ) -> Local<'s, Message> {
    let isolate: &Isolate = scope.as_ref();
    let message = error::message_for(isolate, &exception.js_value());
    scope.new_local(Handled::Message(Rc::new(message)))
  }

  /// Returns the original stack trace that was captured at the creation time
  /// of a given exception, or an empty handle if not available.
  pub fn get_stack_trace<'s>(
    scope: &mut HandleScope<'s, ()>,
    exception: Local<Value>,
  ) -> Option<Local<'s, StackTrace>> {
    let JsValue::Object(id) = exception.js_value() else {
      return None;
    };
    let isolate: &Isolate = scope.as_ref();
    let frames = match &isolate.vm.heap.object(id).class {
      ObjectClass::Error(frames) => frames.clone(),
      _ => return None,
    };
    Some(scope.new_local(Handled::StackTrace(frames)))
  }
}
