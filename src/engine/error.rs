// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Error objects, captured stack frames and message metadata.

use std::rc::Rc;

use crate::engine::Abrupt;
use crate::engine::ContextId;
use crate::engine::Vm;
use crate::engine::ast::Span;
use crate::engine::conversion::number_to_string;
use crate::engine::heap::Cell;
use crate::engine::lexer::ParseError;
use crate::engine::object::Attributes;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::object::PropSlot;
use crate::engine::object::Property;
use crate::engine::ops;
use crate::engine::source::SourceInfo;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

/// Frames captured into an `Error.stack` and message stack traces.
pub(crate) const STACK_TRACE_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorKind {
  Error,
  TypeError,
  RangeError,
  SyntaxError,
  ReferenceError,
  EvalError,
  UriError,
}

impl ErrorKind {
  pub const ALL: [ErrorKind; 7] = [
    ErrorKind::Error,
    ErrorKind::TypeError,
    ErrorKind::RangeError,
    ErrorKind::SyntaxError,
    ErrorKind::ReferenceError,
    ErrorKind::EvalError,
    ErrorKind::UriError,
  ];

  pub fn name(self) -> &'static str {
    match self {
      ErrorKind::Error => "Error",
      ErrorKind::TypeError => "TypeError",
      ErrorKind::RangeError => "RangeError",
      ErrorKind::SyntaxError => "SyntaxError",
      ErrorKind::ReferenceError => "ReferenceError",
      ErrorKind::EvalError => "EvalError",
      ErrorKind::UriError => "URIError",
    }
  }

  pub fn index(self) -> usize {
    self as usize
  }
}

/// A stack frame snapshot. Lines and columns are 1-based.
#[derive(Clone, Debug)]
pub(crate) struct FrameInfo {
  pub function_name: JsStr,
  pub script_name: JsValue,
  pub script_id: i32,
  pub line: i32,
  pub column: i32,
  pub is_constructor: bool,
  pub is_user_javascript: bool,
}

impl FrameInfo {
  fn location_string(&self) -> String {
    let name = match &self.script_name {
      JsValue::String(s) if !s.is_empty() => s.to_string(),
      _ => "<anonymous>".to_string(),
    };
    format!("{name}:{}:{}", self.line, self.column)
  }

  /// One `    at ...` line of `Error.stack`.
  pub fn to_stack_line(&self) -> String {
    let location = self.location_string();
    let new = if self.is_constructor { "new " } else { "" };
    if self.function_name.is_empty() {
      if self.is_constructor {
        format!("    at new <anonymous> ({location})")
      } else {
        format!("    at {location}")
      }
    } else {
      format!("    at {new}{} ({location})", self.function_name)
    }
  }
}

/// Everything a `Message` handle exposes about a thrown exception.
pub(crate) struct MessageData {
  /// "Uncaught TypeError: ..."
  pub text: JsStr,
  pub source: Option<Rc<SourceInfo>>,
  pub span: Span,
  pub frames: Rc<Vec<FrameInfo>>,
}

impl MessageData {
  pub fn trace_values(&self) -> impl Iterator<Item = &JsValue> {
    self
      .source
      .iter()
      .map(|s| &s.resource_name)
      .chain(self.frames.iter().map(|f| &f.script_name))
  }
}

/// Snapshot of the script frames on the stack, innermost first.
pub(crate) fn capture_frames(vm: &Vm, limit: usize) -> Vec<FrameInfo> {
  vm.frames
    .iter()
    .rev()
    .filter_map(|frame| {
      let source = frame.source.as_ref()?;
      let location = source.location(frame.span.start);
      Some(FrameInfo {
        function_name: frame.name.clone(),
        script_name: source.resource_name.clone(),
        script_id: source.script_id,
        line: location.line + 1,
        column: location.column + 1,
        is_constructor: frame.is_constructor,
        is_user_javascript: true,
      })
    })
    .take(limit)
    .collect()
}

/// Reads a data property along the prototype chain without running
/// getters.
fn peek_data(vm: &Vm, object: ObjRef, key: &str) -> Option<JsValue> {
  let key = PropertyKey::str(key);
  let mut current = Some(object);
  while let Some(id) = current {
    let obj = vm.heap.object(id);
    if let Some(prop) = obj.props.get(&key) {
      return match &prop.slot {
        PropSlot::Data(value) => Some(value.clone()),
        _ => None,
      };
    }
    current = obj.proto;
  }
  None
}

fn peek_string(vm: &Vm, object: ObjRef, key: &str) -> Option<JsStr> {
  match peek_data(vm, object, key)? {
    JsValue::String(s) => Some(s),
    JsValue::Undefined => None,
    other => Some(detail_string(vm, &other).into()),
  }
}

/// `Error.prototype.toString` restricted to data properties.
pub(crate) fn error_summary(vm: &Vm, object: ObjRef) -> String {
  let name = peek_string(vm, object, "name").unwrap_or_else(|| "Error".into());
  let message = peek_string(vm, object, "message").unwrap_or_else(|| "".into());
  match (name.is_empty(), message.is_empty()) {
    (true, _) => message.to_string(),
    (false, true) => name.to_string(),
    (false, false) => format!("{name}: {message}"),
  }
}

pub(crate) fn is_error_like(vm: &Vm, value: &JsValue) -> bool {
  let Some(mut id) = value.as_object() else {
    return false;
  };
  loop {
    let object = vm.heap.object(id);
    if matches!(object.class, ObjectClass::Error(_)) {
      return true;
    }
    match object.proto {
      Some(proto) => id = proto,
      None => return false,
    }
  }
}

/// A string for diagnostics that never runs script.
pub(crate) fn detail_string(vm: &Vm, value: &JsValue) -> String {
  match value {
    JsValue::Undefined => "undefined".into(),
    JsValue::Null => "null".into(),
    JsValue::Bool(b) => b.to_string(),
    JsValue::Number(n) => number_to_string(*n),
    JsValue::String(s) => s.to_string(),
    JsValue::Symbol(s) => s.descriptive_string(),
    JsValue::BigInt(b) => b.to_string(),
    JsValue::Object(id) => {
      if is_error_like(vm, value) {
        return error_summary(vm, *id);
      }
      let object = vm.heap.object(*id);
      match &object.class {
        ObjectClass::Function(_) => {
          let name = crate::engine::object::function_name(&vm.heap, *id);
          format!("function {name}() {{ [native code] }}")
        }
        ObjectClass::Primitive(inner) => detail_string(vm, inner),
        _ => format!("#<{}>", constructor_name(vm, *id)),
      }
    }
  }
}

/// The `name` of the object's constructor, looked up without side effects.
pub(crate) fn constructor_name(vm: &Vm, id: ObjRef) -> JsStr {
  if let Some(JsValue::Object(ctor)) = peek_data(vm, id, "constructor") {
    let name = crate::engine::object::function_name(&vm.heap, ctor);
    if !name.is_empty() {
      return name;
    }
  }
  crate::engine::object::builtin_tag(vm.heap.object(id)).into()
}

pub(crate) fn stack_string(summary: &str, frames: &[FrameInfo]) -> String {
  let mut stack = summary.to_string();
  for frame in frames {
    stack.push('\n');
    stack.push_str(&frame.to_stack_line());
  }
  stack
}

/// Turns a freshly allocated object into an error instance: captures the
/// stack and installs the `stack` property.
pub(crate) fn install_stack(cx: &mut Isolate, object: ObjRef) {
  let frames = capture_frames(&cx.vm, STACK_TRACE_LIMIT);
  let summary = error_summary(&cx.vm, object);
  let stack = stack_string(&summary, &frames);
  let obj = cx.vm.heap.object_mut(object);
  obj.class = ObjectClass::Error(Rc::new(frames));
  obj.props.insert(
    PropertyKey::str("stack"),
    Property::data(JsValue::String(stack.into()), Attributes::HIDDEN),
  );
}

/// Creates an error of the given kind in `realm` with the current stack.
pub(crate) fn create_error_in(
  cx: &mut Isolate,
  realm: ContextId,
  kind: ErrorKind,
  message: &str,
) -> ObjRef {
  let proto = cx.vm.realm(realm).intrinsics.error_prototypes[kind.index()];
  let mut object = JsObject::ordinary(Some(proto), realm);
  if !message.is_empty() {
    object.insert(
      PropertyKey::str("message"),
      JsValue::str(message),
      Attributes::HIDDEN,
    );
  }
  let id = cx.vm.heap.alloc(Cell::Object(object));
  install_stack(cx, id);
  id
}

pub(crate) fn create_error(
  cx: &mut Isolate,
  kind: ErrorKind,
  message: &str,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  create_error_in(cx, realm, kind, message)
}

/// Builds message metadata for `exception` at the innermost script frame.
pub(crate) fn message_for(cx: &Isolate, exception: &JsValue) -> MessageData {
  let vm = &cx.vm;
  let frame = vm.frames.iter().rev().find(|f| f.source.is_some());
  let frames = match exception.as_object().map(|id| &vm.heap.object(id).class) {
    Some(ObjectClass::Error(frames)) if vm.frames.is_empty() => frames.clone(),
    _ => Rc::new(capture_frames(vm, STACK_TRACE_LIMIT)),
  };
  MessageData {
    text: format!("Uncaught {}", detail_string(vm, exception)).into(),
    source: frame.and_then(|f| f.source.clone()),
    span: frame.map(|f| f.span).unwrap_or_default(),
    frames,
  }
}

/// Throws `value` from the current position, recording where it happened.
pub(crate) fn throw_value(cx: &mut Isolate, value: JsValue) -> Abrupt {
  let message = message_for(cx, &value);
  cx.vm.pending_message = Some(Rc::new(message));
  Abrupt::Throw(value)
}

pub(crate) fn throw_error(
  cx: &mut Isolate,
  kind: ErrorKind,
  message: &str,
) -> Abrupt {
  let error = create_error(cx, kind, message);
  throw_value(cx, JsValue::Object(error))
}

pub(crate) fn type_error(cx: &mut Isolate, message: impl AsRef<str>) -> Abrupt {
  throw_error(cx, ErrorKind::TypeError, message.as_ref())
}

pub(crate) fn range_error(
  cx: &mut Isolate,
  message: impl AsRef<str>,
) -> Abrupt {
  throw_error(cx, ErrorKind::RangeError, message.as_ref())
}

pub(crate) fn reference_error(
  cx: &mut Isolate,
  message: impl AsRef<str>,
) -> Abrupt {
  throw_error(cx, ErrorKind::ReferenceError, message.as_ref())
}

/// Converts a parse failure into a thrown SyntaxError whose message points
/// at the offending source position.
pub(crate) fn throw_syntax_error(
  cx: &mut Isolate,
  error: &ParseError,
  source: &Rc<SourceInfo>,
) -> Abrupt {
  let object = create_error(cx, error.kind, &error.message);
  let value = JsValue::Object(object);
  let text = format!("Uncaught {}", detail_string(&cx.vm, &value));
  let start = error.position.min(source.text.len() as u32);
  cx.vm.pending_message = Some(Rc::new(MessageData {
    text: text.into(),
    source: Some(source.clone()),
    span: Span::new(start, start + 1),
    frames: Rc::new(Vec::new()),
  }));
  Abrupt::Throw(value)
}
