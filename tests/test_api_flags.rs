// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
// Tests from the same file run in a single process. That's why this test
// is in its own file, because changing flags affects the whole process.

use jsembed as v8;

#[test]
fn set_flags_from_string() {
  v8::V8::set_flags_from_string("--use_strict --expose_gc");
  v8::V8::initialize_platform(v8::new_default_platform(0, false).make_shared());
  v8::V8::initialize();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  let source = "(function() { return this })()";
  let source = v8::String::new(scope, source).unwrap();
  let script = v8::Script::compile(scope, source, None).unwrap();
  let result = script.run(scope).unwrap();
  assert!(result.is_undefined()); // Because of --use_strict.

  let source = v8::String::new(scope, "typeof gc").unwrap();
  let script = v8::Script::compile(scope, source, None).unwrap();
  let result = script.run(scope).unwrap();
  assert_eq!(result.to_rust_string_lossy(scope), "function");
}

#[test]
fn set_flags_from_command_line_returns_unknown_flags() {
  let args = vec![
    "binary".to_string(),
    "--harmony".to_string(),
    "--no-such-flag".to_string(),
    "script.js".to_string(),
  ];
  let rest = v8::V8::set_flags_from_command_line(args);
  assert_eq!(rest, vec!["binary", "--no-such-flag", "script.js"]);
}
