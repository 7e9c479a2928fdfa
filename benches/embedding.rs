use std::hint::black_box;
use std::sync::Once;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use criterion::Throughput;
use jsembed as v8;

const CALLS_PER_RUN: u64 = 1_000;

fn setup() {
  static START: Once = Once::new();
  START.call_once(|| {
    let platform = v8::new_default_platform(0, false).make_shared();
    v8::V8::initialize_platform(platform);
    v8::V8::initialize();
  });
}

fn add(
  scope: &mut v8::HandleScope,
  args: v8::FunctionCallbackArguments,
  mut rv: v8::ReturnValue,
) {
  let a = args.get(0).number_value(scope).unwrap_or(f64::NAN);
  let b = args.get(1).number_value(scope).unwrap_or(f64::NAN);
  rv.set(v8::Number::new(scope, a + b).into());
}

fn scale(
  scope: &mut v8::HandleScope,
  args: v8::FunctionCallbackArguments,
  mut rv: v8::ReturnValue,
) {
  let factor = args.data().number_value(scope).unwrap_or(1.0);
  let value = args.get(0).number_value(scope).unwrap_or(f64::NAN);
  rv.set(v8::Number::new(scope, value * factor).into());
}

fn point_x(
  scope: &mut v8::HandleScope,
  _: v8::Local<v8::Name>,
  args: v8::PropertyCallbackArguments,
  mut rv: v8::ReturnValue,
) {
  let field = args.holder().get_internal_field(scope, 0).unwrap();
  rv.set(v8::Local::<v8::Value>::try_from(field).unwrap());
}

fn set_global(
  scope: &mut v8::HandleScope,
  name: &str,
  value: v8::Local<v8::Value>,
) {
  let global = scope.get_current_context().global(scope);
  let key = v8::String::new(scope, name).unwrap();
  global.set(scope, key.into(), value).unwrap();
}

/// Installs the host functions and objects the benchmark scripts call into.
fn install_host_api(scope: &mut v8::HandleScope) {
  let add = v8::Function::new(scope, add).unwrap();
  set_global(scope, "add", add.into());

  let factor = v8::Number::new(scope, 2.0);
  let scale = v8::FunctionTemplate::builder(scale)
    .data(factor.into())
    .build(scope)
    .get_function(scope)
    .unwrap();
  set_global(scope, "scale", scale.into());

  let template = v8::ObjectTemplate::new(scope);
  template.set_internal_field_count(1);
  let x = v8::String::new(scope, "x").unwrap();
  template.set_accessor(x.into(), point_x);
  let point = template.new_instance(scope).unwrap();
  let three = v8::Number::new(scope, 3.0);
  point.set_internal_field(0, three.into());
  set_global(scope, "point", point.into());
}

fn compile<'s>(
  scope: &mut v8::HandleScope<'s>,
  code: &str,
) -> v8::Local<'s, v8::Script> {
  let source = v8::String::new(scope, code).unwrap();
  v8::Script::compile(scope, source, None).unwrap()
}

fn sample_document() -> String {
  let records: Vec<String> = (0..100)
    .map(|i| {
      format!(
        r#"{{"id":{i},"name":"user {i}","tags":["a","b"],"score":{}.5,"active":{}}}"#,
        i * 3,
        i % 2 == 0
      )
    })
    .collect();
  format!("[{}]", records.join(","))
}

fn calls_from_script(c: &mut Criterion) {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);
  install_host_api(scope);
  compile(scope, "function js_add(a, b) { return a + b; }")
    .run(scope)
    .unwrap();

  let mut group = c.benchmark_group("calls_from_script");
  group.throughput(Throughput::Elements(CALLS_PER_RUN));
  for (name, call) in [
    ("js_function", "js_add(i, 1)"),
    ("host_function", "add(i, 1)"),
    ("host_function_with_data", "scale(i)"),
    ("accessor_internal_field", "point.x"),
  ] {
    let code = format!("for (var i = 0; i < {CALLS_PER_RUN}; i++) {call};");
    let script = compile(scope, &code);
    group.bench_function(name, |b| {
      b.iter(|| {
        let scope = &mut v8::HandleScope::new(scope);
        black_box(script.run(scope));
      })
    });
  }
  group.finish();
}

fn host_entry_points(c: &mut Criterion) {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  let scope = &mut v8::ContextScope::new(scope, context);

  let document = sample_document();
  let text = v8::String::new(scope, &document).unwrap();
  let parsed = v8::json::parse(scope, text).unwrap();

  let mut group = c.benchmark_group("host_entry_points");
  group.throughput(Throughput::Bytes(document.len() as u64));
  group.bench_function("json_parse", |b| {
    b.iter(|| {
      let scope = &mut v8::HandleScope::new(scope);
      black_box(v8::json::parse(scope, text));
    })
  });
  group.bench_function("json_stringify", |b| {
    b.iter(|| {
      let scope = &mut v8::HandleScope::new(scope);
      black_box(v8::json::stringify(scope, parsed));
    })
  });
  group.finish();

  let source = "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }\n\
     class Point { constructor(x, y) { this.x = x; this.y = y; }\n\
       get length() { return Math.sqrt(this.x * this.x + this.y * this.y); } }\n\
     const points = [1, 2, 3].map((n) => new Point(n, fib(n)));\n\
     JSON.stringify(points.map((p) => p.length));";
  c.bench_function("compile_script", |b| {
    b.iter(|| {
      let scope = &mut v8::HandleScope::new(scope);
      black_box(compile(scope, source));
    })
  });
}

criterion_group!(benches, calls_from_script, host_entry_points);
criterion_main!(benches);
