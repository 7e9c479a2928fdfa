// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use jsembed as v8;

use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Once;

fn setup() {
  static START: Once = Once::new();
  START.call_once(|| {
    v8::V8::set_flags_from_string("--expose_gc");
    v8::V8::initialize_platform(
      v8::new_default_platform(0, false).make_shared(),
    );
    v8::V8::initialize();
  });
}

fn eval<'s>(
  scope: &mut v8::HandleScope<'s>,
  code: &str,
) -> Option<v8::Local<'s, v8::Value>> {
  let scope = &mut v8::EscapableHandleScope::new(scope);
  let source = v8::String::new(scope, code).unwrap();
  let script = v8::Script::compile(scope, source, None)?;
  let result = script.run(scope);
  result.map(|value| scope.escape(value))
}

fn set_global(
  scope: &mut v8::HandleScope,
  name: &str,
  value: v8::Local<v8::Value>,
) {
  let context = scope.get_current_context();
  let global = context.global(scope);
  let key = v8::String::new(scope, name).unwrap();
  assert_eq!(global.set(scope, key.into(), value), Some(true));
}

fn install_function(
  scope: &mut v8::HandleScope,
  name: &str,
  callback: v8::FunctionCallback,
) {
  let function = v8::Function::new(scope, callback).unwrap();
  set_global(scope, name, function.into());
}

#[test]
fn handle_scope_nested() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  {
    let scope1 = &mut v8::HandleScope::new(isolate);
    {
      let _scope2 = &mut v8::HandleScope::new(scope1);
    }
  }
}

#[test]
#[allow(clippy::float_cmp)]
fn handle_scope_numbers() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  {
    let scope1 = &mut v8::HandleScope::new(isolate);
    let l1 = v8::Integer::new(scope1, -123);
    let l2 = v8::Integer::new_from_unsigned(scope1, 456);
    {
      let scope2 = &mut v8::HandleScope::new(scope1);
      let l3 = v8::Number::new(scope2, 78.9);
      assert_eq!(l1.value(), -123);
      assert_eq!(l2.value(), 456);
      assert_eq!(l3.value(), 78.9);
      assert_eq!(v8::Number::value(&l1), -123f64);
      assert_eq!(v8::Number::value(&l2), 456f64);
    }
  }
}

#[test]
fn escapable_handle_scope() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let escaped = {
    let inner = &mut v8::EscapableHandleScope::new(scope);
    let value = v8::String::new(inner, "escaped").unwrap();
    inner.escape(value)
  };
  assert_eq!(escaped.to_rust_string_lossy(scope), "escaped");
}

#[test]
fn global_handles_survive_scopes() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let mut context_global;
  let mut object_global;
  {
    let scope = &mut v8::HandleScope::new(isolate);
    let context = v8::Context::new(scope);
    context_global = v8::Global::new(scope, context);
    let scope = &mut v8::ContextScope::new(scope, context);
    let object = eval(scope, "({ answer: 42 })").unwrap();
    object_global = v8::Global::new(scope, object);
    assert!(object_global == object);
  }

  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);

  {
    let scope = &mut v8::HandleScope::with_context(isolate, &context_global);
    let object = v8::Local::new(scope, &object_global);
    let object = v8::Local::<v8::Object>::try_from(object).unwrap();
    let key = v8::String::new(scope, "answer").unwrap();
    let answer = object.get(scope, key.into()).unwrap();
    assert_eq!(answer.int32_value(scope), Some(42));
  }

  assert!(object_global.open(isolate).is_object());
  let copy = object_global.clone();
  assert!(copy == object_global);
  drop(copy);

  object_global.reset();
  assert!(object_global.is_empty());
  context_global.reset();
  assert!(context_global.is_empty());
}

#[test]
fn isolate_slots_and_version() {
  setup();
  assert!(!v8::V8::get_version().is_empty());
  let isolate = &mut v8::Isolate::new(Default::default());
  assert!(isolate.set_slot(7u32));
  assert_eq!(isolate.get_slot::<u32>(), Some(&7));
  *isolate.get_slot_mut::<u32>().unwrap() += 1;
  assert_eq!(isolate.remove_slot::<u32>(), Some(8));
  assert!(isolate.get_slot::<u32>().is_none());
}

#[test]
fn script_evaluates_to_number() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let result = eval(scope, "1+1").unwrap();
  assert!(!result.is_object());
  assert!(result.is_number());
  assert!(result.is_int32());
  assert_eq!(result.number_value(scope), Some(2.0));
}

#[test]
fn script_origin_and_unbound_script() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let name = v8::String::new(scope, "origin.js").unwrap();
  let origin = v8::ScriptOrigin::new(
    name.into(),
    0,
    0,
    false,
    0,
    None,
    false,
    false,
    false,
    None,
  );
  let code = v8::String::new(scope, "6 * 7").unwrap();
  let source = v8::script_compiler::Source::new(code, Some(&origin));
  let unbound = v8::script_compiler::compile_unbound_script(
    scope,
    source,
    v8::script_compiler::CompileOptions::NoCompileOptions,
  )
  .unwrap();
  assert!(unbound.get_id() > 0);
  let script_name = unbound.get_script_name(scope);
  assert_eq!(script_name.to_rust_string_lossy(scope), "origin.js");

  let script = unbound.bind_to_current_context(scope);
  let result = script.run(scope).unwrap();
  assert_eq!(result.int32_value(scope), Some(42));
  // Running the same script twice evaluates it twice.
  let result = script.run(scope).unwrap();
  assert_eq!(result.int32_value(scope), Some(42));
}

#[test]
fn syntax_error_is_caught() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let tc = &mut v8::TryCatch::new(scope);

  let source = v8::String::new(tc, "var = ;").unwrap();
  assert!(v8::Script::compile(tc, source, None).is_none());
  assert!(tc.has_caught());
  let exception = tc.exception().unwrap();
  let exception = v8::Local::<v8::Object>::try_from(exception).unwrap();
  assert_eq!(exception.get_constructor_name(tc).to_rust_string_lossy(tc), "SyntaxError");
}

#[test]
fn try_catch_catches_type_error() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  {
    let tc = &mut v8::TryCatch::new(scope);
    assert!(!tc.has_caught());
    let result = eval(tc, "throw new TypeError('x')");
    assert!(result.is_none());
    assert!(tc.has_caught());
    assert!(tc.can_continue());
    assert!(!tc.has_terminated());
    let exception = tc.exception().unwrap();
    assert!(exception.is_native_error());
    assert_eq!(exception.to_rust_string_lossy(tc), "TypeError: x");

    let message = tc.message().unwrap();
    assert_eq!(message.get(tc).to_rust_string_lossy(tc), "Uncaught TypeError: x");

    tc.reset();
    assert!(!tc.has_caught());
    assert!(tc.exception().is_none());
  }
  // The context is still usable after the exception.
  let result = eval(scope, "'still ' + 'alive'").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "still alive");
}

#[test]
fn try_catch_nested_rethrow() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let outer = &mut v8::TryCatch::new(scope);
  {
    let inner = &mut v8::TryCatch::new(outer);
    assert!(eval(inner, "throw 'first'").is_none());
    assert!(inner.has_caught());
    assert!(inner.rethrow().is_some());
  }
  assert!(outer.has_caught());
  let exception = outer.exception().unwrap();
  assert_eq!(exception.to_rust_string_lossy(outer), "first");
}

#[test]
fn message_location_and_stack() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let tc = &mut v8::TryCatch::new(scope);

  let name = v8::String::new(tc, "foo.js").unwrap();
  let origin = v8::ScriptOrigin::new(
    name.into(),
    0,
    0,
    false,
    0,
    None,
    false,
    false,
    false,
    None,
  );
  let code = "function f() {\n  throw new Error('boom');\n}\nf();\n";
  let code = v8::String::new(tc, code).unwrap();
  let script = v8::Script::compile(tc, code, Some(&origin)).unwrap();
  assert!(script.run(tc).is_none());
  assert!(tc.has_caught());

  let message = tc.message().unwrap();
  assert_eq!(message.get_line_number(tc), Some(2));
  let resource = message.get_script_resource_name(tc).unwrap();
  assert_eq!(resource.to_rust_string_lossy(tc), "foo.js");
  let line = message.get_source_line(tc).unwrap();
  assert_eq!(line.to_rust_string_lossy(tc), "  throw new Error('boom');");
  assert!(message.get_start_column() < message.get_end_column());

  let stack = tc.stack_trace().unwrap();
  let stack = stack.to_rust_string_lossy(tc);
  assert!(stack.starts_with("Error: boom"));
  assert!(stack.contains("at f (foo.js:2:"));

  let exception = tc.exception().unwrap();
  let trace = v8::Exception::get_stack_trace(tc, exception).unwrap();
  assert!(trace.get_frame_count() >= 2);
  let frame = trace.get_frame(tc, 0).unwrap();
  assert_eq!(frame.get_line_number(), 2);
  let function_name = frame.get_function_name(tc).unwrap();
  assert_eq!(function_name.to_rust_string_lossy(tc), "f");
  let script_name = frame.get_script_name(tc).unwrap();
  assert_eq!(script_name.to_rust_string_lossy(tc), "foo.js");
  assert!(!frame.is_eval());
  assert!(!frame.is_constructor());
  assert!(frame.is_user_javascript());
}

#[test]
fn current_stack_trace_from_callback() {
  fn capture_line<'s>(
    scope: &mut v8::HandleScope<'s>,
    _args: v8::FunctionCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    let trace = v8::StackTrace::current_stack_trace(scope, 10).unwrap();
    let frame = trace.get_frame(scope, 0).unwrap();
    rv.set_uint32(frame.get_line_number() as u32);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  install_function(scope, "captureLine", capture_line);

  let result =
    eval(scope, "function outer() {\n  return captureLine();\n}\nouter();")
      .unwrap();
  assert_eq!(result.uint32_value(scope), Some(2));
}

#[test]
fn exception_factories() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let message = v8::String::new(scope, "out of range").unwrap();
  let error = v8::Exception::range_error(scope, message);
  assert!(error.is_native_error());
  assert_eq!(error.to_rust_string_lossy(scope), "RangeError: out of range");

  let message = v8::Exception::create_message(scope, error);
  assert_eq!(
    message.get(scope).to_rust_string_lossy(scope),
    "Uncaught RangeError: out of range"
  );

  let message = v8::String::new(scope, "plain").unwrap();
  let error = v8::Exception::error(scope, message);
  let error = v8::Local::<v8::Object>::try_from(error).unwrap();
  let key = v8::String::new(scope, "message").unwrap();
  let value = error.get(scope, key.into()).unwrap();
  assert_eq!(value.to_rust_string_lossy(scope), "plain");
}

#[test]
fn callback_throws_exception() {
  fn thrower<'s>(
    scope: &mut v8::HandleScope<'s>,
    _args: v8::FunctionCallbackArguments<'s>,
    _rv: v8::ReturnValue<'s>,
  ) {
    let message = v8::String::new(scope, "nope").unwrap();
    let exception = v8::Exception::range_error(scope, message);
    scope.throw_exception(exception);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  install_function(scope, "thrower", thrower);

  let result = eval(
    scope,
    "try { thrower(); 'no' } catch (e) { e.name + ':' + e.message }",
  )
  .unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "RangeError:nope");

  let tc = &mut v8::TryCatch::new(scope);
  assert!(eval(tc, "thrower()").is_none());
  assert!(tc.has_caught());
}

#[test]
fn terminate_execution() {
  fn terminate<'s>(
    scope: &mut v8::HandleScope<'s>,
    _args: v8::FunctionCallbackArguments<'s>,
    _rv: v8::ReturnValue<'s>,
  ) {
    assert!(scope.terminate_execution());
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  install_function(scope, "terminate", terminate);

  {
    let tc = &mut v8::TryCatch::new(scope);
    assert!(eval(tc, "terminate(); while (true) {}").is_none());
    assert!(tc.has_caught());
    assert!(tc.has_terminated());
    assert!(!tc.can_continue());
  }
  assert!(!scope.is_execution_terminating());
  let result = eval(scope, "'after'").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "after");
}

#[test]
fn thread_safe_handle_terminates_from_another_thread() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let handle = isolate.thread_safe_handle();
  std::thread::spawn(move || {
    assert!(handle.terminate_execution());
  })
  .join()
  .unwrap();
  assert!(isolate.is_execution_terminating());
  assert!(isolate.cancel_terminate_execution());
  assert!(!isolate.is_execution_terminating());
}

#[test]
fn module_without_imports() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let tc = &mut v8::TryCatch::new(scope);

  let code = v8::String::new(tc, "export const x = 1;").unwrap();
  let source = v8::script_compiler::Source::new(code, None);
  let module = v8::script_compiler::compile_module(tc, source).unwrap();
  assert_eq!(module.get_status(), v8::ModuleStatus::Uninstantiated);
  assert!(module.is_source_text_module());
  assert!(!module.is_synthetic_module());
  assert_eq!(module.get_module_requests(tc).length(), 0);

  let mut resolver_calls = 0;
  let result = module.instantiate_module(tc, |_, _, _, _| {
    resolver_calls += 1;
    None
  });
  assert_eq!(result, Some(true));
  assert_eq!(resolver_calls, 0);
  assert_eq!(module.get_status(), v8::ModuleStatus::Instantiated);

  let result = module.evaluate(tc).unwrap();
  assert!(result.is_promise());
  assert!(!tc.has_caught());
  assert_eq!(module.get_status(), v8::ModuleStatus::Evaluated);

  let namespace = module.get_module_namespace(tc);
  assert!(namespace.is_module_namespace_object());
  let namespace = v8::Local::<v8::Object>::try_from(namespace).unwrap();
  let key = v8::String::new(tc, "x").unwrap();
  let x = namespace.get(tc, key.into()).unwrap();
  assert_eq!(x.int32_value(tc), Some(1));

  // Instantiating again is a no-op that does not call the resolver.
  let result = module.instantiate_module(tc, |_, _, _, _| {
    resolver_calls += 1;
    None
  });
  assert_eq!(result, Some(true));
  assert_eq!(resolver_calls, 0);
  assert_eq!(module.get_status(), v8::ModuleStatus::Evaluated);
}

#[test]
fn module_with_import() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let code = v8::String::new(scope, "export const y = 21;").unwrap();
  let source = v8::script_compiler::Source::new(code, None);
  let dep = v8::script_compiler::compile_module(scope, source).unwrap();
  let dep = v8::Global::new(scope, dep);

  let code = "import { y } from './dep.js';\nexport const z = y * 2;";
  let code = v8::String::new(scope, code).unwrap();
  let source = v8::script_compiler::Source::new(code, None);
  let main = v8::script_compiler::compile_module(scope, source).unwrap();

  let requests = main.get_module_requests(scope);
  assert_eq!(requests.length(), 1);
  let request = requests.get(scope, 0).unwrap();
  let request = v8::Local::<v8::ModuleRequest>::try_from(request).unwrap();
  let specifier = request.get_specifier(scope);
  assert_eq!(specifier.to_rust_string_lossy(scope), "./dep.js");
  let location = main.source_offset_to_location(request.get_source_offset());
  assert_eq!(location.get_line_number(), 0);
  assert_eq!(request.get_import_attributes(scope).length(), 0);

  let mut resolved = Vec::new();
  let result =
    main.instantiate_module(scope, |context, specifier, _attributes, _referrer| {
      let scope = &mut unsafe { v8::CallbackScope::new(context) };
      resolved.push(specifier.to_rust_string_lossy(scope));
      Some(v8::Local::new(scope, &dep))
    });
  assert_eq!(result, Some(true));
  assert_eq!(resolved, vec!["./dep.js".to_string()]);

  assert!(main.evaluate(scope).is_some());
  assert_eq!(main.get_status(), v8::ModuleStatus::Evaluated);
  assert_eq!(dep.open(scope).get_status(), v8::ModuleStatus::Evaluated);

  let namespace = main.get_module_namespace(scope);
  let namespace = v8::Local::<v8::Object>::try_from(namespace).unwrap();
  let key = v8::String::new(scope, "z").unwrap();
  let z = namespace.get(scope, key.into()).unwrap();
  assert_eq!(z.int32_value(scope), Some(42));
}

#[test]
fn module_resolution_failure() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let tc = &mut v8::TryCatch::new(scope);

  let code = v8::String::new(tc, "import './missing.js';").unwrap();
  let source = v8::script_compiler::Source::new(code, None);
  let module = v8::script_compiler::compile_module(tc, source).unwrap();
  let result = module.instantiate_module(tc, |_, _, _, _| None);
  assert!(result.is_none());
  assert!(tc.has_caught());
  let exception = tc.exception().unwrap();
  assert!(exception.is_native_error());
  assert_eq!(module.get_status(), v8::ModuleStatus::Errored);
  assert!(module.get_exception(tc) == exception);
}

#[test]
fn module_evaluation_error() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let tc = &mut v8::TryCatch::new(scope);

  let code = v8::String::new(tc, "throw new Error('module failed');").unwrap();
  let source = v8::script_compiler::Source::new(code, None);
  let module = v8::script_compiler::compile_module(tc, source).unwrap();
  assert_eq!(module.instantiate_module(tc, |_, _, _, _| None), Some(true));
  assert!(module.evaluate(tc).is_none());
  assert!(tc.has_caught());
  assert_eq!(module.get_status(), v8::ModuleStatus::Errored);
  let exception = module.get_exception(tc);
  assert_eq!(exception.to_rust_string_lossy(tc), "Error: module failed");
}

#[test]
fn synthetic_module() {
  fn evaluation_steps<'s>(
    context: v8::Local<'s, v8::Context>,
    module: v8::Local<'s, v8::Module>,
  ) -> Option<v8::Local<'s, v8::Value>> {
    let scope = &mut unsafe { v8::CallbackScope::new(context) };
    let name = v8::String::new(scope, "answer").unwrap();
    let value = v8::Integer::new(scope, 42);
    module.set_synthetic_module_export(scope, name, value.into())?;
    Some(v8::undefined(scope).into())
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let module_name = v8::String::new(scope, "synthetic").unwrap();
  let export = v8::String::new(scope, "answer").unwrap();
  let module = v8::Module::create_synthetic_module(
    scope,
    module_name,
    &[export],
    evaluation_steps,
  );
  assert!(module.is_synthetic_module());
  assert_eq!(module.script_id(), None);
  assert_eq!(module.instantiate_module(scope, |_, _, _, _| None), Some(true));
  assert!(module.evaluate(scope).is_some());
  assert_eq!(module.get_status(), v8::ModuleStatus::Evaluated);

  let namespace = module.get_module_namespace(scope);
  let namespace = v8::Local::<v8::Object>::try_from(namespace).unwrap();
  let answer = namespace.get(scope, export.into()).unwrap();
  assert_eq!(answer.int32_value(scope), Some(42));
}

#[test]
fn object_template_internal_fields() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let template = v8::ObjectTemplate::new(scope);
  assert!(template.set_internal_field_count(1));
  assert_eq!(template.internal_field_count(), 1);

  let a = template.new_instance(scope).unwrap();
  let b = template.new_instance(scope).unwrap();
  assert_eq!(a.internal_field_count(), 1);
  assert_eq!(b.internal_field_count(), 1);

  for object in [a, b] {
    let field = object.get_internal_field(scope, 0).unwrap();
    let field = v8::Local::<v8::Value>::try_from(field).unwrap();
    assert!(field.is_undefined());
  }
  assert!(a.get_internal_field(scope, 1).is_none());

  let value = v8::Integer::new(scope, 42);
  assert!(a.set_internal_field(0, value.into()));
  let field = a.get_internal_field(scope, 0).unwrap();
  let field = v8::Local::<v8::Value>::try_from(field).unwrap();
  assert_eq!(field.int32_value(scope), Some(42));

  let field = b.get_internal_field(scope, 0).unwrap();
  let field = v8::Local::<v8::Value>::try_from(field).unwrap();
  assert!(field.is_undefined());
}

#[test]
fn aligned_pointer_internal_fields() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let template = v8::ObjectTemplate::new(scope);
  template.set_internal_field_count(2);
  let object = template.new_instance(scope).unwrap();

  let mut payload = 7u64;
  let pointer = &mut payload as *mut u64 as *mut c_void;
  object.set_aligned_pointer_in_internal_field(1, pointer);
  let read = unsafe { object.get_aligned_pointer_from_internal_field(1) };
  assert_eq!(read, pointer);
  assert_eq!(unsafe { *(read as *mut u64) }, 7);
  assert!(object.get_internal_field(scope, 1).is_none());
}

#[test]
fn object_template_accessors() {
  fn getter<'s>(
    _scope: &mut v8::HandleScope<'s>,
    _key: v8::Local<'s, v8::Name>,
    _args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    rv.set_int32(42);
  }

  fn setter<'s>(
    scope: &mut v8::HandleScope<'s>,
    _key: v8::Local<'s, v8::Name>,
    value: v8::Local<'s, v8::Value>,
    args: v8::PropertyCallbackArguments<'s>,
  ) {
    let this = args.this();
    let key = v8::String::new(scope, "seen").unwrap();
    this.set(scope, key.into(), value);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let template = v8::ObjectTemplate::new(scope);
  let key = v8::String::new(scope, "value").unwrap();
  template.set_accessor_with_setter(key.into(), getter, setter);
  let object = template.new_instance(scope).unwrap();
  set_global(scope, "obj", object.into());

  let result = eval(scope, "obj.value").unwrap();
  assert_eq!(result.int32_value(scope), Some(42));
  let result = eval(scope, "obj.value = 7; obj.seen").unwrap();
  assert_eq!(result.int32_value(scope), Some(7));
}

#[test]
fn object_set_accessor() {
  fn getter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    let data = args.data();
    let name = key.to_rust_string_lossy(scope);
    let text = format!("{name}:{}", data.to_rust_string_lossy(scope));
    let text = v8::String::new(scope, &text).unwrap();
    rv.set(text.into());
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let object = v8::Object::new(scope);
  let key = v8::String::new(scope, "greeting").unwrap();
  let data = v8::String::new(scope, "hi").unwrap();
  let configuration =
    v8::AccessorConfiguration::new(getter).data(data.into());
  assert_eq!(
    object.set_accessor_with_configuration(scope, key.into(), configuration),
    Some(true)
  );
  let value = object.get(scope, key.into()).unwrap();
  assert_eq!(value.to_rust_string_lossy(scope), "greeting:hi");

  // A non-configurable property cannot be replaced by an accessor.
  let frozen = v8::String::new(scope, "frozen").unwrap();
  let one = v8::Integer::new(scope, 1);
  object.define_own_property(
    scope,
    frozen.into(),
    one.into(),
    v8::PropertyAttribute::DONT_DELETE,
  );
  assert_eq!(object.set_accessor(scope, frozen.into(), getter), Some(false));
}

#[test]
fn function_template_constructor() {
  fn point<'s>(
    scope: &mut v8::HandleScope<'s>,
    args: v8::FunctionCallbackArguments<'s>,
    _rv: v8::ReturnValue<'s>,
  ) {
    let this = args.this();
    let x = args.get(0);
    assert!(this.set_internal_field(0, x.into()));
    let key = v8::String::new(scope, "constructed").unwrap();
    let flag = v8::Boolean::new(scope, args.is_construct_call());
    this.set(scope, key.into(), flag.into());
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let template = v8::FunctionTemplate::new(scope, point);
  let class_name = v8::String::new(scope, "Point").unwrap();
  template.set_class_name(class_name);
  template.instance_template(scope).set_internal_field_count(1);
  let method_name = v8::String::new(scope, "kind").unwrap();
  let kind = v8::String::new(scope, "point").unwrap();
  template
    .prototype_template(scope)
    .set(method_name.into(), kind.into());

  let constructor = template.get_function(scope).unwrap();
  // The same template yields the same function within a context.
  let again = template.get_function(scope).unwrap();
  assert!(constructor == again);
  set_global(scope, "Point", constructor.into());

  let result = eval(scope, "new Point(3)").unwrap();
  let object = v8::Local::<v8::Object>::try_from(result).unwrap();
  assert!(template.has_instance(object.into()));
  assert_eq!(
    object.get_constructor_name(scope).to_rust_string_lossy(scope),
    "Point"
  );
  let field = object.get_internal_field(scope, 0).unwrap();
  let field = v8::Local::<v8::Value>::try_from(field).unwrap();
  assert_eq!(field.int32_value(scope), Some(3));

  let result = eval(scope, "var p = new Point(1); p.constructed && p.kind").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "point");

  let plain = v8::Object::new(scope);
  assert!(!template.has_instance(plain.into()));
}

#[test]
fn function_template_inherit() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let base = v8::FunctionTemplate::new(scope, |_, _, _| {});
  let derived = v8::FunctionTemplate::new(scope, |_, _, _| {});
  derived.inherit(base);

  let derived_fn = derived.get_function(scope).unwrap();
  let instance = derived_fn.new_instance(scope, &[]).unwrap();
  assert!(derived.has_instance(instance.into()));
  assert!(base.has_instance(instance.into()));

  let base_fn = base.get_function(scope).unwrap();
  let instance = base_fn.new_instance(scope, &[]).unwrap();
  assert!(!derived.has_instance(instance.into()));
}

#[test]
fn function_call_and_data() {
  fn sum<'s>(
    scope: &mut v8::HandleScope<'s>,
    args: v8::FunctionCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    let mut total = args.data().number_value(scope).unwrap_or(0.0);
    for i in 0..args.length() {
      total += args.get(i).number_value(scope).unwrap_or(f64::NAN);
    }
    rv.set_double(total);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let offset = v8::Number::new(scope, 100.0);
  let function = v8::Function::builder(sum)
    .data(offset.into())
    .length(2)
    .build(scope)
    .unwrap();
  let name = v8::String::new(scope, "sum").unwrap();
  function.set_name(name);
  assert_eq!(function.get_name(scope).to_rust_string_lossy(scope), "sum");
  assert_eq!(function.script_id(), 0);
  assert!(function.get_script_line_number().is_none());

  let recv = v8::undefined(scope).into();
  let a = v8::Integer::new(scope, 1).into();
  let b = v8::Number::new(scope, 2.5).into();
  let result = function.call(scope, recv, &[a, b]).unwrap();
  assert_eq!(result.number_value(scope), Some(103.5));

  set_global(scope, "sum", function.into());
  let result = eval(scope, "sum.length + ':' + sum(1, 2, 3)").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "2:106");
}

#[test]
fn function_script_position() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let result = eval(scope, "\n\n  (function named(a, b) { return a * b; })").unwrap();
  let function = v8::Local::<v8::Function>::try_from(result).unwrap();
  assert_eq!(function.get_name(scope).to_rust_string_lossy(scope), "named");
  assert_eq!(function.get_script_line_number(), Some(2));
  assert!(function.script_id() > 0);

  let recv = v8::undefined(scope).into();
  let six = v8::Integer::new(scope, 6).into();
  let seven = v8::Integer::new(scope, 7).into();
  let result = function.call(scope, recv, &[six, seven]).unwrap();
  assert_eq!(result.int32_value(scope), Some(42));
}

#[test]
fn constructor_behavior_throw() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let function = v8::Function::builder(|_, _, _| {})
    .constructor_behavior(v8::ConstructorBehavior::Throw)
    .build(scope)
    .unwrap();
  let tc = &mut v8::TryCatch::new(scope);
  assert!(function.new_instance(tc, &[]).is_none());
  assert!(tc.has_caught());
  assert!(tc.exception().unwrap().is_native_error());
}

#[test]
fn return_value_setters() {
  fn returns_null<'s>(
    _scope: &mut v8::HandleScope<'s>,
    _args: v8::FunctionCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    rv.set_bool(true);
    rv.set_null();
  }

  fn returns_empty<'s>(
    scope: &mut v8::HandleScope<'s>,
    _args: v8::FunctionCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    rv.set_empty_string();
    assert!(rv.get(scope).is_string());
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  install_function(scope, "returnsNull", returns_null);
  install_function(scope, "returnsEmpty", returns_empty);
  install_function(scope, "returnsNothing", |_, _, _| {});

  let result = eval(
    scope,
    "[returnsNull() === null, returnsEmpty() === '', returnsNothing() === undefined].join()",
  )
  .unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "true,true,true");
}

#[test]
fn values_and_predicates() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let undefined = v8::undefined(scope);
  assert!(undefined.is_undefined());
  assert!(undefined.is_null_or_undefined());
  let null = v8::null(scope);
  assert!(null.is_null());
  assert!(!null.is_undefined());

  let yes = v8::Boolean::new(scope, true);
  assert!(yes.is_true());
  assert!(yes.is_boolean());
  assert!(!yes.is_false());

  let negative = v8::Integer::new(scope, -1);
  assert!(negative.is_int32());
  assert!(!negative.is_uint32());

  let array = eval(scope, "[1, 2]").unwrap();
  assert!(array.is_array());
  assert!(array.is_object());
  let function = eval(scope, "(function () {})").unwrap();
  assert!(function.is_function());
  assert_eq!(function.type_of(scope).to_rust_string_lossy(scope), "function");

  let boxed = eval(scope, "new Number(5)").unwrap();
  assert!(boxed.is_number_object());
  assert!(!boxed.is_number());

  let promise = eval(scope, "Promise.resolve(1)").unwrap();
  assert!(promise.is_promise());
  assert!(v8::Local::<v8::PromiseResolver>::try_from(promise).is_err());

  let err = v8::Local::<v8::Function>::try_from(array).unwrap_err();
  assert!(matches!(err, v8::DataError::BadType { .. }));

  let one = v8::Number::new(scope, 1.0);
  let one_int = v8::Integer::new(scope, 1);
  assert!(one.strict_equals(one_int.into()));
  let nan = v8::Number::new(scope, f64::NAN);
  assert!(!nan.strict_equals(nan.into()));
  assert!(nan.same_value(nan.into()));
  let zero = v8::Number::new(scope, 0.0);
  let negative_zero = v8::Number::new(scope, -0.0);
  assert!(!zero.same_value(negative_zero.into()));
  assert!(zero.same_value_zero(negative_zero.into()));
}

#[test]
fn value_conversions() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let number = v8::Number::new(scope, 3.14);
  let text = number.to_string(scope).unwrap();
  assert_eq!(text.to_rust_string_lossy(scope), "3.14");

  let text = v8::String::new(scope, "  42.9 ").unwrap();
  assert_eq!(text.number_value(scope), Some(42.9));
  assert_eq!(text.integer_value(scope), Some(42));
  assert_eq!(text.int32_value(scope), Some(42));
  let int = text.to_integer(scope).unwrap();
  assert_eq!(int.value(), 42);

  let big = v8::Number::new(scope, 4294967297.0);
  assert_eq!(big.uint32_value(scope), Some(1));
  let negative = v8::Number::new(scope, -1.0);
  assert_eq!(negative.to_uint32(scope).unwrap().value(), u32::MAX);
  assert_eq!(negative.to_int32(scope).unwrap().value(), -1);

  let empty = v8::String::empty(scope);
  assert!(!empty.boolean_value(scope));
  assert!(!empty.to_boolean(scope).is_true());

  let object = number.to_object(scope).unwrap();
  assert!(object.is_number_object());

  let undefined = v8::undefined(scope);
  let tc = &mut v8::TryCatch::new(scope);
  assert!(undefined.to_object(tc).is_none());
  assert!(tc.has_caught());

  let valued = eval(tc, "({ valueOf() { return 7; } })").unwrap();
  assert_eq!(valued.number_value(tc), Some(7.0));
  let detail = eval(tc, "({})").unwrap().to_detail_string(tc).unwrap();
  assert_eq!(detail.to_rust_string_lossy(tc), "#<Object>");
}

#[test]
fn instance_of() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let array = eval(scope, "[]").unwrap();
  let array_ctor = eval(scope, "Array").unwrap();
  let array_ctor = v8::Local::<v8::Object>::try_from(array_ctor).unwrap();
  assert_eq!(array.instance_of(scope, array_ctor), Some(true));
  let object_ctor = eval(scope, "Object").unwrap();
  let object_ctor = v8::Local::<v8::Object>::try_from(object_ctor).unwrap();
  assert_eq!(array.instance_of(scope, object_ctor), Some(true));
  let number = v8::Number::new(scope, 1.0);
  assert_eq!(number.instance_of(scope, object_ctor), Some(false));
}

#[test]
fn strings() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);

  let text = v8::String::new(scope, "héllo").unwrap();
  assert_eq!(text.length(), 5);
  assert_eq!(text.utf8_length(scope), 6);
  assert!(text.contains_only_onebyte());
  assert_eq!(text.to_rust_string_lossy(scope), "héllo");

  let latin1 = v8::String::new_from_one_byte(
    scope,
    &[0x63, 0x61, 0x66, 0xe9],
    v8::NewStringType::Normal,
  )
  .unwrap();
  assert_eq!(latin1.to_rust_string_lossy(scope), "café");

  let utf16: Vec<u16> = "日本".encode_utf16().collect();
  let wide =
    v8::String::new_from_two_byte(scope, &utf16, v8::NewStringType::Normal)
      .unwrap();
  assert_eq!(wide.length(), 2);
  assert!(!wide.contains_only_onebyte());

  let invalid = v8::String::new_from_utf8(
    scope,
    &[0x61, 0xff, 0x62],
    v8::NewStringType::Normal,
  )
  .unwrap();
  assert_eq!(invalid.to_rust_string_lossy(scope), "a\u{fffd}b");

  let joined = v8::String::concat(scope, latin1, wide).unwrap();
  assert_eq!(joined.to_rust_string_lossy(scope), "café日本");

  let empty = v8::String::empty(scope);
  assert_eq!(empty.length(), 0);
}

#[test]
fn write_utf8() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);

  let text = v8::String::new(scope, "abc").unwrap();
  let mut buffer = [0u8; 8];
  let mut nchars = 0;
  let written = text.write_utf8(
    scope,
    &mut buffer,
    Some(&mut nchars),
    v8::WriteOptions::NO_NULL_TERMINATION,
  );
  assert_eq!(written, 3);
  assert_eq!(nchars, 3);
  assert_eq!(&buffer[..3], b"abc");
}

#[test]
fn symbols() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let description = v8::String::new(scope, "tag").unwrap();
  let a = v8::Symbol::new(scope, Some(description));
  let b = v8::Symbol::new(scope, Some(description));
  assert!(a.is_symbol());
  assert!(a.is_name());
  assert!(!a.strict_equals(b.into()));
  assert_eq!(a.description(scope).to_rust_string_lossy(scope), "tag");

  let anonymous = v8::Symbol::new(scope, None);
  assert!(anonymous.description(scope).is_undefined());

  let key = v8::String::new(scope, "app.key").unwrap();
  let first = v8::Symbol::for_global(scope, key);
  let second = v8::Symbol::for_global(scope, key);
  assert!(first.strict_equals(second.into()));

  let object = v8::Object::new(scope);
  let value = v8::Integer::new(scope, 5);
  assert_eq!(object.set(scope, a.into(), value.into()), Some(true));
  assert_eq!(object.has(scope, a.into()), Some(true));
  assert_eq!(object.has(scope, b.into()), Some(false));
}

#[test]
fn bigints() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let max = v8::BigInt::new_from_u64(scope, u64::MAX);
  assert_eq!(max.u64_value(), (u64::MAX, true));
  assert_eq!(max.i64_value(), (-1, false));

  let negative = v8::BigInt::new_from_i64(scope, -5);
  assert_eq!(negative.i64_value(), (-5, true));
  assert!(!negative.u64_value().1);

  let words = v8::BigInt::new_from_words(scope, true, &[1, 1]).unwrap();
  assert_eq!(words.word_count(), 2);
  let mut out = [0u64; 2];
  let (sign, digits) = words.to_words_array(&mut out);
  assert!(sign);
  assert_eq!(digits, &[1, 1]);

  let mut short = [0u64; 1];
  let (_, digits) = words.to_words_array(&mut short);
  assert_eq!(digits.len(), 1);

  let computed = eval(scope, "2n ** 64n + 1n").unwrap();
  assert!(computed.is_big_int());
  let computed = computed.to_big_int(scope).unwrap();
  assert_eq!(computed.word_count(), 2);
  assert_eq!(computed.type_of(scope).to_rust_string_lossy(scope), "bigint");
}

#[test]
fn json_round_trip() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let text = r#"{"a":[1,2,{"b":null}],"c":"d","e":true}"#;
  let source = v8::String::new(scope, text).unwrap();
  let parsed = v8::json::parse(scope, source).unwrap();
  assert!(parsed.is_object());
  let stringified = v8::json::stringify(scope, parsed).unwrap();
  assert_eq!(stringified.to_rust_string_lossy(scope), text);

  let undefined = v8::undefined(scope).into();
  assert!(v8::json::stringify(scope, undefined).is_none());

  let tc = &mut v8::TryCatch::new(scope);
  let malformed = v8::String::new(tc, "{oops").unwrap();
  assert!(v8::json::parse(tc, malformed).is_none());
  assert!(tc.has_caught());
  let exception = tc.exception().unwrap();
  let exception = v8::Local::<v8::Object>::try_from(exception).unwrap();
  assert_eq!(
    exception.get_constructor_name(tc).to_rust_string_lossy(tc),
    "SyntaxError"
  );
}

#[test]
fn json_parse_accepts_javascript_json() {
  fn round_trip(scope: &mut v8::HandleScope, text: &str) -> String {
    let source = v8::String::new(scope, text).unwrap();
    let parsed = v8::json::parse(scope, source).unwrap();
    let stringified = v8::json::stringify(scope, parsed).unwrap();
    stringified.to_rust_string_lossy(scope)
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let source = v8::String::new(scope, "1e400").unwrap();
  let parsed = v8::json::parse(scope, source).unwrap();
  assert_eq!(parsed.number_value(scope), Some(f64::INFINITY));
  assert_eq!(round_trip(scope, "[1e400,-1e400,1e-400]"), "[null,null,0]");

  let deep = format!("{}{}", "[".repeat(200), "]".repeat(200));
  assert_eq!(round_trip(scope, &deep), deep);

  let very_deep = format!("{}{}", "[".repeat(100_000), "]".repeat(100_000));
  let source = v8::String::new(scope, &very_deep).unwrap();
  assert!(v8::json::parse(scope, source).unwrap().is_array());

  let once = round_trip(scope, r#"["\ud800","\ud83d\ude00"]"#);
  assert_eq!(once, "[\"\u{fffd}\",\"\u{1f600}\"]");
  assert_eq!(round_trip(scope, &once), once);

  assert_eq!(
    round_trip(scope, r#" {"a" : 1, "b":[ ], "a":3} "#),
    r#"{"a":3,"b":[]}"#
  );
}

#[test]
fn object_properties() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let object = v8::Object::new(scope);
  let key = v8::String::new(scope, "b").unwrap();
  let value = v8::Integer::new(scope, 1);
  assert_eq!(object.set(scope, key.into(), value.into()), Some(true));
  let key_a = v8::String::new(scope, "a").unwrap();
  let value = v8::Integer::new(scope, 2);
  assert_eq!(
    object.create_data_property(scope, key_a.into(), value.into()),
    Some(true)
  );
  assert_eq!(object.has_own_property(scope, key.into()), Some(true));
  assert_eq!(object.get(scope, key_a.into()).unwrap().int32_value(scope), Some(2));

  let names = object.get_own_property_names(scope).unwrap();
  assert_eq!(names.length(), 2);
  let first = names.get_index(scope, 0).unwrap();
  assert_eq!(first.to_rust_string_lossy(scope), "b");
  let second = names.get_index(scope, 1).unwrap();
  assert_eq!(second.to_rust_string_lossy(scope), "a");

  assert_eq!(object.delete(scope, key.into()), Some(true));
  assert_eq!(object.has(scope, key.into()), Some(false));
  assert!(object.get(scope, key.into()).unwrap().is_undefined());

  let value = v8::String::new(scope, "x").unwrap();
  assert_eq!(object.set_index(scope, 3, value.into()), Some(true));
  assert_eq!(object.has_index(scope, 3), Some(true));
  let item = object.get_index(scope, 3).unwrap();
  assert_eq!(item.to_rust_string_lossy(scope), "x");
  assert_eq!(object.delete_index(scope, 3), Some(true));
  assert_eq!(object.has_index(scope, 3), Some(false));

  let fixed = v8::String::new(scope, "fixed").unwrap();
  let one = v8::Integer::new(scope, 1);
  let attributes =
    v8::PropertyAttribute::READ_ONLY | v8::PropertyAttribute::DONT_ENUM;
  assert_eq!(
    object.define_own_property(scope, fixed.into(), one.into(), attributes),
    Some(true)
  );
  let two = v8::Integer::new(scope, 2);
  assert_eq!(object.set(scope, fixed.into(), two.into()), Some(false));
  assert_eq!(object.get(scope, fixed.into()).unwrap().int32_value(scope), Some(1));
  // DONT_ENUM keeps it out of the key list.
  assert_eq!(object.get_own_property_names(scope).unwrap().length(), 1);

  let hash = object.get_identity_hash();
  assert_eq!(hash, object.get_identity_hash());
  assert!(object.get_creation_context(scope).unwrap() == context);
}

#[test]
fn object_prototypes() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let object = eval(
    scope,
    "var proto = { inherited: 1 }; var o = Object.create(proto); o.own = 2; o",
  )
  .unwrap();
  let object = v8::Local::<v8::Object>::try_from(object).unwrap();
  let own = object.get_own_property_names(scope).unwrap();
  assert_eq!(own.length(), 1);
  let all = object.get_property_names(scope).unwrap();
  assert_eq!(all.length(), 2);
  let inherited = all.get_index(scope, 1).unwrap();
  assert_eq!(inherited.to_rust_string_lossy(scope), "inherited");

  let proto = eval(scope, "proto").unwrap();
  assert!(object.get_prototype(scope).unwrap() == proto);

  let null = v8::null(scope);
  let key = v8::String::new(scope, "k").unwrap();
  let value = v8::Integer::new(scope, 9);
  let bare = v8::Object::with_prototype_and_properties(
    scope,
    null.into(),
    &[key.into()],
    &[value.into()],
  );
  assert!(bare.get_prototype(scope).unwrap().is_null());
  assert_eq!(bare.get(scope, key.into()).unwrap().int32_value(scope), Some(9));

  let number = v8::Integer::new(scope, 3);
  assert_eq!(bare.set_prototype(scope, number.into()), Some(false));
  assert_eq!(bare.set_prototype(scope, proto), Some(true));
  let inherited_key = v8::String::new(scope, "inherited").unwrap();
  assert_eq!(bare.has(scope, inherited_key.into()), Some(true));
}

#[test]
fn arrays() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let empty = v8::Array::new(scope, -1);
  assert_eq!(empty.length(), 0);
  let sized = v8::Array::new(scope, 4);
  assert_eq!(sized.length(), 4);

  let a = v8::String::new(scope, "a").unwrap();
  let b = v8::Integer::new(scope, 2);
  let array = v8::Array::new_with_elements(scope, &[a.into(), b.into()]);
  assert_eq!(array.length(), 2);
  assert_eq!(array.get_index(scope, 1).unwrap().int32_value(scope), Some(2));

  set_global(scope, "arr", array.into());
  let result = eval(scope, "arr.push(3); arr.join('-')").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "a-2-3");
  assert_eq!(array.length(), 3);
}

#[test]
fn context_embedder_data_and_global() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let other = v8::Context::new(scope);

  let value = v8::String::new(scope, "data").unwrap();
  context.set_embedder_data(1, value.into());
  let read = context.get_embedder_data(scope, 1).unwrap();
  let read = v8::Local::<v8::String>::try_from(read).unwrap();
  assert_eq!(read.to_rust_string_lossy(scope), "data");
  assert!(context.get_embedder_data(scope, 0).unwrap().is_undefined());
  assert!(context.get_embedder_data(scope, 5).unwrap().is_undefined());
  assert!(context.get_embedder_data(scope, -1).is_none());

  {
    let scope = &mut v8::ContextScope::new(scope, context);
    eval(scope, "var shared = 'first'").unwrap();
    assert!(scope.get_current_context() == context);
  }
  {
    let scope = &mut v8::ContextScope::new(scope, other);
    let result = eval(scope, "typeof shared").unwrap();
    assert_eq!(result.to_rust_string_lossy(scope), "undefined");
  }

  let global = context.global(scope);
  let key = v8::String::new(scope, "shared").unwrap();
  let scope = &mut v8::ContextScope::new(scope, context);
  let shared = global.get(scope, key.into()).unwrap();
  assert_eq!(shared.to_rust_string_lossy(scope), "first");
}

#[test]
fn context_from_global_template() {
  fn hello<'s>(
    scope: &mut v8::HandleScope<'s>,
    _args: v8::FunctionCallbackArguments<'s>,
    mut rv: v8::ReturnValue<'s>,
  ) {
    let text = v8::String::new(scope, "hello from host").unwrap();
    rv.set(text.into());
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);

  let global_template = v8::ObjectTemplate::new(scope);
  let name = v8::String::new(scope, "hello").unwrap();
  let function = v8::FunctionTemplate::new(scope, hello);
  global_template.set(name.into(), function.into());
  let context = v8::Context::new_from_template(scope, global_template);
  let scope = &mut v8::ContextScope::new(scope, context);

  let result = eval(scope, "hello()").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "hello from host");

  let global = context.global(scope);
  assert!(global.get_creation_context(scope).unwrap() == context);
  let name = v8::String::new(scope, "hello").unwrap();
  let hello = global.get(scope, name.into()).unwrap();
  let hello = v8::Local::<v8::Object>::try_from(hello).unwrap();
  assert!(hello.get_creation_context(scope).unwrap() == context);
}

#[test]
fn promise_resolver() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let resolver = v8::PromiseResolver::new(scope).unwrap();
  let promise = resolver.get_promise(scope);
  assert_eq!(promise.state(), v8::PromiseState::Pending);
  assert!(promise.result(scope).is_undefined());
  assert!(!promise.has_handler());

  let value = v8::Integer::new(scope, 42);
  assert_eq!(resolver.resolve(scope, value.into()), Some(true));
  assert_eq!(promise.state(), v8::PromiseState::Fulfilled);
  assert_eq!(promise.result(scope).int32_value(scope), Some(42));

  // A settled promise stays settled.
  let reason = v8::Integer::new(scope, 0);
  let _ = resolver.reject(scope, reason.into());
  assert_eq!(promise.state(), v8::PromiseState::Fulfilled);
  assert_eq!(promise.result(scope).int32_value(scope), Some(42));

  let resolver = v8::PromiseResolver::new(scope).unwrap();
  let promise = resolver.get_promise(scope);
  promise.mark_as_handled();
  let reason = v8::String::new(scope, "bad").unwrap();
  assert_eq!(resolver.reject(scope, reason.into()), Some(true));
  assert_eq!(promise.state(), v8::PromiseState::Rejected);
  assert_eq!(promise.result(scope).to_rust_string_lossy(scope), "bad");
}

#[test]
fn promise_then_and_microtasks() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  assert_eq!(scope.get_microtasks_policy(), v8::MicrotasksPolicy::Explicit);

  let resolver = v8::PromiseResolver::new(scope).unwrap();
  let promise = resolver.get_promise(scope);
  let handler = eval(scope, "(v) => { globalThis.seen = v * 2; return 'done'; }")
    .unwrap();
  let handler = v8::Local::<v8::Function>::try_from(handler).unwrap();
  let derived = promise.then(scope, handler).unwrap();
  assert!(promise.has_handler());

  let value = v8::Integer::new(scope, 21);
  resolver.resolve(scope, value.into()).unwrap();
  // Reactions run only at a checkpoint.
  assert!(eval(scope, "globalThis.seen").unwrap().is_undefined());
  assert_eq!(derived.state(), v8::PromiseState::Pending);

  scope.perform_microtask_checkpoint();
  assert_eq!(eval(scope, "seen").unwrap().int32_value(scope), Some(42));
  assert_eq!(derived.state(), v8::PromiseState::Fulfilled);
  assert_eq!(derived.result(scope).to_rust_string_lossy(scope), "done");
}

#[test]
fn promise_catch_and_then2() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let on_fulfilled = eval(scope, "() => 'fulfilled'").unwrap();
  let on_fulfilled = v8::Local::<v8::Function>::try_from(on_fulfilled).unwrap();
  let on_rejected = eval(scope, "(e) => 'caught ' + e").unwrap();
  let on_rejected = v8::Local::<v8::Function>::try_from(on_rejected).unwrap();

  let rejected = eval(scope, "Promise.reject('boom')").unwrap();
  let rejected = v8::Local::<v8::Promise>::try_from(rejected).unwrap();
  let caught = rejected.catch(scope, on_rejected).unwrap();
  let both = rejected.then2(scope, on_fulfilled, on_rejected).unwrap();

  scope.perform_microtask_checkpoint();
  assert_eq!(caught.state(), v8::PromiseState::Fulfilled);
  assert_eq!(caught.result(scope).to_rust_string_lossy(scope), "caught boom");
  assert_eq!(both.result(scope).to_rust_string_lossy(scope), "caught boom");
}

#[test]
fn enqueue_microtask() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let task = eval(scope, "globalThis.ticks = 0; () => { ticks++; }").unwrap();
  let task = v8::Local::<v8::Function>::try_from(task).unwrap();
  scope.enqueue_microtask(task);
  scope.enqueue_microtask(task);
  assert_eq!(eval(scope, "ticks").unwrap().int32_value(scope), Some(0));
  scope.perform_microtask_checkpoint();
  assert_eq!(eval(scope, "ticks").unwrap().int32_value(scope), Some(2));
}

#[test]
fn promise_combinators_count_down_elements() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  eval(
    scope,
    "var later = Promise.resolve(3).then((v) => v);\n\
     Promise.all([1, Promise.resolve(2), later])\n\
       .then((v) => { globalThis.all = v.join(); });\n\
     Promise.all([]).then((v) => { globalThis.empty = v.length; });\n\
     Promise.allSettled([Promise.reject(4), 5]).then((r) => {\n\
       globalThis.settled = r.map((e) => e.status).join();\n\
     });\n\
     Promise.all([later, Promise.reject(6)])\n\
       .catch((e) => { globalThis.failed = e; });\n\
     Promise.race([later, 7]).then((v) => { globalThis.race = v; });",
  )
  .unwrap();
  assert!(eval(scope, "globalThis.all").unwrap().is_undefined());

  fn result(scope: &mut v8::HandleScope, name: &str) -> String {
    eval(scope, name).unwrap().to_rust_string_lossy(scope)
  }

  scope.perform_microtask_checkpoint();
  assert_eq!(result(scope, "all"), "1,2,3");
  assert_eq!(result(scope, "empty"), "0");
  assert_eq!(result(scope, "settled"), "rejected,fulfilled");
  assert_eq!(result(scope, "failed"), "6");
  assert_eq!(result(scope, "race"), "7");
}

static REJECTIONS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn promise_reject_callback() {
  fn on_reject(message: v8::PromiseRejectMessage) {
    assert_eq!(
      message.get_event(),
      v8::PromiseRejectEvent::PromiseRejectWithNoHandler
    );
    assert!(message.get_value().is_some());
    assert_eq!(message.get_promise().state(), v8::PromiseState::Rejected);
    REJECTIONS.fetch_add(1, Ordering::SeqCst);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  isolate.set_promise_reject_callback(on_reject);
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  eval(scope, "Promise.reject(new Error('unhandled'))").unwrap();
  assert_eq!(REJECTIONS.load(Ordering::SeqCst), 1);
}

type RejectEvent = (v8::PromiseRejectEvent, Option<i64>);

thread_local! {
  static REJECT_EVENTS: std::cell::RefCell<Vec<RejectEvent>> =
    const { std::cell::RefCell::new(Vec::new()) };
}

fn record_reject_event(message: v8::PromiseRejectMessage) {
  let value = message
    .get_value()
    .and_then(|value| v8::Local::<v8::Integer>::try_from(value).ok())
    .map(|value| value.value());
  REJECT_EVENTS
    .with(|events| events.borrow_mut().push((message.get_event(), value)));
}

fn take_reject_events() -> Vec<RejectEvent> {
  REJECT_EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

#[test]
fn promise_reject_callback_settles_only_once() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  isolate.set_promise_reject_callback(record_reject_event);
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  take_reject_events();
  let promise = eval(scope, "new Promise((a, b) => { a(1); b(2); a(3); })")
    .unwrap();
  let promise = v8::Local::<v8::Promise>::try_from(promise).unwrap();
  assert_eq!(promise.state(), v8::PromiseState::Fulfilled);
  assert_eq!(
    take_reject_events(),
    [
      (v8::PromiseRejectEvent::PromiseRejectAfterResolved, Some(2)),
      (v8::PromiseRejectEvent::PromiseResolveAfterResolved, Some(3)),
    ]
  );

  // A rejected promise ignores later settlements too.
  eval(scope, "new Promise((a, b) => { b(4); a(5); })").unwrap();
  assert_eq!(
    take_reject_events(),
    [
      (v8::PromiseRejectEvent::PromiseRejectWithNoHandler, Some(4)),
      (v8::PromiseRejectEvent::PromiseResolveAfterResolved, Some(5)),
    ]
  );
}

#[test]
fn promise_reject_callback_handler_added_after_reject() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  isolate.set_promise_reject_callback(record_reject_event);
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  take_reject_events();
  eval(scope, "var p = Promise.reject(7); p.catch(() => {}); p.catch(() => {})")
    .unwrap();
  // Only the first handler on an unhandled rejection is reported, and it
  // carries no value.
  assert_eq!(
    take_reject_events(),
    [
      (v8::PromiseRejectEvent::PromiseRejectWithNoHandler, Some(7)),
      (v8::PromiseRejectEvent::PromiseHandlerAddedAfterReject, None),
    ]
  );

  // A handler attached before rejecting suppresses both events.
  eval(
    scope,
    "var q = new Promise((_, b) => { globalThis.rejectQ = b; });\n\
     q.catch(() => {}); rejectQ(8);",
  )
  .unwrap();
  assert!(take_reject_events().is_empty());
}

static LISTENER_CALLS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn message_listener_and_verbose_try_catch() {
  fn listener(message: v8::Local<v8::Message>, _exception: v8::Local<v8::Value>) {
    assert!(message.get_start_position() >= 0);
    LISTENER_CALLS.fetch_add(1, Ordering::SeqCst);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  assert!(isolate.add_message_listener(listener));
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  {
    let tc = &mut v8::TryCatch::new(scope);
    assert!(!tc.is_verbose());
    assert!(eval(tc, "throw 1").is_none());
  }
  assert_eq!(LISTENER_CALLS.load(Ordering::SeqCst), 0);

  {
    let tc = &mut v8::TryCatch::new(scope);
    tc.set_verbose(true);
    assert!(tc.is_verbose());
    assert!(eval(tc, "throw 2").is_none());
    assert!(tc.has_caught());
  }
  assert_eq!(LISTENER_CALLS.load(Ordering::SeqCst), 1);

  // Uncaught exceptions reach the listener too.
  assert!(eval(scope, "throw 3").is_none());
  assert_eq!(LISTENER_CALLS.load(Ordering::SeqCst), 2);
}

#[test]
fn captured_stack_trace_for_uncaught_exceptions() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  {
    let tc = &mut v8::TryCatch::new(scope);
    assert!(eval(tc, "function g() { throw new Error('e'); } g()").is_none());
    let message = tc.message().unwrap();
    assert!(message.get_stack_trace(tc).is_none());
  }

  scope.set_capture_stack_trace_for_uncaught_exceptions(true, 5);
  let tc = &mut v8::TryCatch::new(scope);
  assert!(eval(tc, "g()").is_none());
  let message = tc.message().unwrap();
  let trace = message.get_stack_trace(tc).unwrap();
  assert!(trace.get_frame_count() >= 1);
  let frame = trace.get_frame(tc, 0).unwrap();
  assert_eq!(frame.get_function_name(tc).unwrap().to_rust_string_lossy(tc), "g");
}

#[test]
fn externals() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let mut payload = 99i32;
  let pointer = &mut payload as *mut i32 as *mut c_void;
  let external = v8::External::new(scope, pointer);
  assert!(external.is_external());
  assert!(!external.is_object());
  assert_eq!(external.value(), pointer);
  assert_eq!(unsafe { *(external.value() as *mut i32) }, 99);

  // Script can hold and pass an external without looking inside.
  set_global(scope, "ext", external.into());
  let back = eval(scope, "[ext][0]").unwrap();
  let back = v8::Local::<v8::External>::try_from(back).unwrap();
  assert_eq!(back.value(), pointer);
}

#[test]
fn array_buffers_and_views() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let store = v8::ArrayBuffer::new_backing_store_from_vec(vec![1, 2, 3, 4, 5])
    .make_shared();
  assert_eq!(store.byte_length(), 5);
  assert!(!store.is_shared());
  let buffer = v8::ArrayBuffer::with_backing_store(scope, &store);
  assert_eq!(buffer.byte_length(), 5);

  let view = v8::Uint8Array::new(scope, buffer, 1, 3).unwrap();
  assert_eq!(view.byte_offset(), 1);
  assert_eq!(view.byte_length(), 3);
  assert_eq!(view.length(), 3);
  let mut out = [0u8; 3];
  assert_eq!(view.copy_contents(&mut out), 3);
  assert_eq!(out, [2, 3, 4]);
  assert!(view.buffer(scope).unwrap() == buffer);
  assert!(v8::Uint8Array::new(scope, buffer, 4, 2).is_none());

  set_global(scope, "view", view.into());
  eval(scope, "view[0] = 200").unwrap();
  assert_eq!(buffer.get_backing_store().to_vec(), vec![1, 200, 3, 4, 5]);

  let fresh = v8::ArrayBuffer::new(scope, 8);
  assert_eq!(fresh.byte_length(), 8);
  assert!(fresh.get_backing_store().to_vec().iter().all(|b| *b == 0));
}

#[test]
fn weak_handle_with_finalizer() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let finalized = Rc::new(Cell::new(0));

  let weak = {
    let scope = &mut v8::HandleScope::new(isolate);
    let context = v8::Context::new(scope);
    let scope = &mut v8::ContextScope::new(scope, context);
    let object = v8::Object::new(scope);
    let finalized = finalized.clone();
    let weak = v8::Weak::with_finalizer(
      scope,
      object,
      Box::new(move |_| finalized.set(finalized.get() + 1)),
    );
    assert!(!weak.is_empty());
    assert!(weak.to_local(scope).unwrap() == object);
    weak
  };

  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert_eq!(finalized.get(), 1);
  assert!(weak.is_empty());
  assert!(weak.to_global(isolate).is_none());

  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert_eq!(finalized.get(), 1);
}

static PARAMETER_FINALIZER_CALLS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn weak_handle_with_parameter() {
  fn finalizer(info: &v8::WeakCallbackInfo) {
    let parameter = info.get_parameter() as *const u32;
    assert_eq!(unsafe { *parameter }, 0xCAFE);
    assert!(!info.get_isolate_ptr().is_null());
    PARAMETER_FINALIZER_CALLS.fetch_add(1, Ordering::SeqCst);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let parameter = Box::into_raw(Box::new(0xCAFEu32));

  let weak = {
    let scope = &mut v8::HandleScope::new(isolate);
    let context = v8::Context::new(scope);
    let scope = &mut v8::ContextScope::new(scope, context);
    let object = v8::Object::new(scope);
    v8::Weak::with_parameter(
      scope,
      object,
      parameter as *mut c_void,
      finalizer,
      v8::WeakCallbackType::Parameter,
    )
  };

  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert_eq!(PARAMETER_FINALIZER_CALLS.load(Ordering::SeqCst), 1);
  assert!(weak.is_empty());
  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Minor);
  assert_eq!(PARAMETER_FINALIZER_CALLS.load(Ordering::SeqCst), 1);

  drop(unsafe { Box::from_raw(parameter) });
}

#[test]
fn weak_handle_kept_alive_by_global() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let finalized = Rc::new(Cell::new(false));

  let (mut global, weak) = {
    let scope = &mut v8::HandleScope::new(isolate);
    let context = v8::Context::new(scope);
    let scope = &mut v8::ContextScope::new(scope, context);
    let object = v8::Object::new(scope);
    let finalized = finalized.clone();
    let weak = v8::Weak::with_finalizer(
      scope,
      object,
      Box::new(move |_| finalized.set(true)),
    );
    (v8::Global::new(scope, object), weak)
  };

  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert!(!finalized.get());
  assert!(!weak.is_empty());
  let promoted = weak.to_global(isolate).unwrap();
  assert!(promoted == global);
  drop(promoted);

  global.reset();
  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert!(finalized.get());
  assert!(weak.is_empty());
}

#[test]
fn weak_reset_skips_finalizer() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let finalized = Rc::new(Cell::new(false));

  let mut weak = {
    let scope = &mut v8::HandleScope::new(isolate);
    let context = v8::Context::new(scope);
    let scope = &mut v8::ContextScope::new(scope, context);
    let object = v8::Object::new(scope);
    let finalized = finalized.clone();
    v8::Weak::with_finalizer(scope, object, Box::new(move |_| finalized.set(true)))
  };
  weak.reset();
  assert!(weak.is_empty());
  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert!(!finalized.get());

  let empty = v8::Weak::<v8::Object>::empty(isolate);
  assert!(empty.is_empty());
}

#[test]
fn guaranteed_finalizer_runs_on_dispose() {
  setup();
  let finalized = Rc::new(Cell::new(0));
  let mut isolate = v8::Isolate::new(Default::default());
  let mut global;
  let weak = {
    let scope = &mut v8::HandleScope::new(&mut isolate);
    let context = v8::Context::new(scope);
    let scope = &mut v8::ContextScope::new(scope, context);
    let object = v8::Object::new(scope);
    global = v8::Global::new(scope, object);
    let finalized = finalized.clone();
    v8::Weak::with_guaranteed_finalizer(
      scope,
      object,
      Box::new(move || finalized.set(finalized.get() + 1)),
    )
  };
  global.reset();
  assert_eq!(finalized.get(), 0);
  // The referent is only reachable through a Global, so the isolate going
  // away is what runs the finalizer.
  drop(isolate);
  assert_eq!(finalized.get(), 1);
  assert!(weak.is_empty());
}

#[test]
fn gc_callbacks_and_heap_statistics() {
  fn count(
    _isolate: &mut v8::Isolate,
    _type: v8::GCType,
    _flags: v8::GCCallbackFlags,
    data: *mut c_void,
  ) {
    let counter = unsafe { &*(data as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::SeqCst);
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let prologue = AtomicUsize::new(0);
  let epilogue = AtomicUsize::new(0);
  let prologue_ptr = &prologue as *const AtomicUsize as *mut c_void;
  let epilogue_ptr = &epilogue as *const AtomicUsize as *mut c_void;
  isolate.add_gc_prologue_callback(count, prologue_ptr, v8::GCType::ALL);
  isolate.add_gc_epilogue_callback(count, epilogue_ptr, v8::GCType::ALL);

  let mut before = v8::HeapStatistics::default();
  isolate.get_heap_statistics(&mut before);

  isolate.request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert_eq!(prologue.load(Ordering::SeqCst), 1);
  assert_eq!(epilogue.load(Ordering::SeqCst), 1);

  let mut after = v8::HeapStatistics::default();
  isolate.get_heap_statistics(&mut after);
  assert!(after.gc_count() > before.gc_count());
  assert!(after.heap_size_limit() >= after.used_heap_size());

  isolate.remove_gc_prologue_callback(count, prologue_ptr);
  isolate.remove_gc_epilogue_callback(count, epilogue_ptr);
  isolate.low_memory_notification();
  assert_eq!(prologue.load(Ordering::SeqCst), 1);
  assert_eq!(epilogue.load(Ordering::SeqCst), 1);
}

#[test]
fn gc_from_script() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let result = eval(scope, "typeof gc").unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "function");
  let result = eval(scope, "var kept = { a: [1, 2, 3] }; gc(); kept.a.length").unwrap();
  assert_eq!(result.int32_value(scope), Some(3));
}

#[test]
fn posted_tasks_run_when_pumped() {
  setup();
  let platform = v8::V8::get_current_platform();
  let isolate = &mut v8::Isolate::new(Default::default());
  let handle = isolate.thread_safe_handle();
  let ran = std::sync::Arc::new(AtomicUsize::new(0));

  let counter = ran.clone();
  std::thread::spawn(move || {
    assert!(v8::post_task(&handle, move |isolate: &mut v8::Isolate| {
      assert!(isolate.get_slot::<u8>().is_none());
      counter.fetch_add(1, Ordering::SeqCst);
    }));
  })
  .join()
  .unwrap();

  assert!(v8::pump_message_loop(&platform, isolate, false));
  assert_eq!(ran.load(Ordering::SeqCst), 1);
  assert!(!v8::pump_message_loop(&platform, isolate, false));
}

#[test]
fn heap_limits() {
  setup();
  let params = v8::CreateParams::default().heap_limits(0, 64 * 1024 * 1024);
  let isolate = &mut v8::Isolate::new(params);
  let mut stats = v8::HeapStatistics::default();
  isolate.get_heap_statistics(&mut stats);
  assert!(stats.heap_size_limit() > 0);
  assert!(stats.heap_size_limit() <= 64 * 1024 * 1024);
}

#[test]
fn stack_overflow_is_range_error() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let result = eval(
    scope,
    "function f() { return f(); } try { f() } catch (e) { e instanceof RangeError }",
  )
  .unwrap();
  assert!(result.is_true());
}

#[test]
fn deeply_nested_source_is_range_error() {
  fn assert_range_error(tc: &mut v8::TryCatch<v8::HandleScope>) {
    assert!(tc.has_caught());
    let exception = tc.exception().unwrap();
    let exception = v8::Local::<v8::Object>::try_from(exception).unwrap();
    assert_eq!(
      exception.get_constructor_name(tc).to_rust_string_lossy(tc),
      "RangeError"
    );
    assert_eq!(
      exception.to_rust_string_lossy(tc),
      "RangeError: Maximum call stack size exceeded"
    );
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let nested = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
  {
    let tc = &mut v8::TryCatch::new(scope);
    let source = v8::String::new(tc, &nested).unwrap();
    assert!(v8::Script::compile(tc, source, None).is_none());
    assert_range_error(tc);
  }
  {
    let tc = &mut v8::TryCatch::new(scope);
    let code = format!("export default {};", nested);
    let code = v8::String::new(tc, &code).unwrap();
    let source = v8::script_compiler::Source::new(code, None);
    assert!(v8::script_compiler::compile_module(tc, source).is_none());
    assert_range_error(tc);
  }

  let result = eval(scope, "[[[1]]][0][0][0] + 1").unwrap();
  assert_eq!(result.int32_value(scope), Some(2));
}
