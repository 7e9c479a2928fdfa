// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

// Embedder state kept in isolate and context slots.

use jsembed as v8;

use std::cell::Cell;
use std::rc::Rc;
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

/// Counts how often values holding it were dropped.
#[derive(Clone, Default)]
struct Drops(Rc<Cell<usize>>);

impl Drops {
  fn count(&self) -> usize {
    self.0.get()
  }
}

/// Host state a script appends to through the `record` function.
struct Journal {
  entries: Vec<String>,
  drops: Drops,
}

impl Drop for Journal {
  fn drop(&mut self) {
    self.drops.0.set(self.drops.0.get() + 1);
  }
}

fn record(
  scope: &mut v8::HandleScope,
  args: v8::FunctionCallbackArguments,
  mut rv: v8::ReturnValue,
) {
  let entry = args.get(0).to_rust_string_lossy(scope);
  let journal = scope.get_slot_mut::<Journal>().unwrap();
  journal.entries.push(entry);
  rv.set_uint32(journal.entries.len() as u32);
}

fn run(isolate: &mut v8::Isolate, code: &str) -> Option<u32> {
  let scope = &mut v8::HandleScope::new(isolate);
  let global = v8::ObjectTemplate::new(scope);
  let name = v8::String::new(scope, "record").unwrap();
  global.set(name.into(), v8::FunctionTemplate::new(scope, record).into());
  let context = v8::Context::new_from_template(scope, global);
  let scope = &mut v8::ContextScope::new(scope, context);
  let source = v8::String::new(scope, code).unwrap();
  let script = v8::Script::compile(scope, source, None)?;
  script.run(scope)?.uint32_value(scope)
}

#[test]
fn isolate_slot_is_shared_with_callbacks() {
  setup();
  let drops = Drops::default();
  let mut isolate = v8::Isolate::new(Default::default());
  let handle = isolate.thread_safe_handle();
  assert!(isolate.set_slot(Journal {
    entries: Vec::new(),
    drops: drops.clone(),
  }));

  assert_eq!(run(&mut isolate, "record('a'); record('b')"), Some(2));
  assert_eq!(run(&mut isolate, "record(1 + 2)"), Some(3));
  assert_eq!(isolate.get_slot::<Journal>().unwrap().entries, ["a", "b", "3"]);

  // A handle outliving the isolate does not keep slots alive.
  assert_eq!(drops.count(), 0);
  drop(isolate);
  assert_eq!(drops.count(), 1);
  drop(handle);
}

#[test]
fn set_slot_drops_the_replaced_value() {
  setup();
  let drops = Drops::default();
  let mut isolate = v8::Isolate::new(Default::default());
  let journal = |entry: &str| Journal {
    entries: vec![entry.to_string()],
    drops: drops.clone(),
  };

  assert!(isolate.set_slot(journal("first")));
  assert!(!isolate.set_slot(journal("second")));
  assert_eq!(drops.count(), 1);
  assert_eq!(isolate.get_slot::<Journal>().unwrap().entries, ["second"]);

  drop(isolate);
  assert_eq!(drops.count(), 2);
}

#[test]
fn remove_slot_transfers_ownership() {
  setup();
  let drops = Drops::default();
  let mut isolate = v8::Isolate::new(Default::default());
  isolate.set_slot(Journal {
    entries: Vec::new(),
    drops: drops.clone(),
  });

  let journal = isolate.remove_slot::<Journal>().unwrap();
  assert!(isolate.get_slot::<Journal>().is_none());
  assert!(isolate.remove_slot::<Journal>().is_none());
  drop(isolate);
  assert_eq!(drops.count(), 0);

  drop(journal);
  assert_eq!(drops.count(), 1);
}

#[test]
fn slots_are_keyed_by_type() {
  setup();
  let mut isolate = v8::Isolate::new(Default::default());

  // Too large to be stored inline.
  let wide = [7u64; 8];
  assert!(isolate.set_slot(1u32));
  assert!(isolate.set_slot(Box::new(2u32)));
  assert!(isolate.set_slot(wide));

  *isolate.get_slot_mut::<u32>().unwrap() += 10;
  assert_eq!(isolate.get_slot::<u32>(), Some(&11));
  assert_eq!(isolate.remove_slot::<Box<u32>>(), Some(Box::new(2)));
  assert_eq!(isolate.get_slot::<[u64; 8]>(), Some(&wide));
  assert_eq!(isolate.remove_slot::<[u64; 8]>(), Some(wide));
  assert_eq!(isolate.get_slot::<u32>(), Some(&11));
}

/// Per-context state: the name a context was registered under.
struct Realm(&'static str);

#[test]
fn context_slots_are_per_context() {
  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let main = v8::Context::new(scope);
  let worker = v8::Context::new(scope);

  assert!(main.set_slot(scope, Realm("main")));
  assert!(worker.get_slot::<Realm>(scope).is_none());
  assert!(worker.set_slot(scope, Realm("worker")));
  assert!(!worker.set_slot(scope, Realm("worker-2")));

  assert_eq!(main.get_slot::<Realm>(scope).unwrap().0, "main");
  assert_eq!(worker.get_slot::<Realm>(scope).unwrap().0, "worker-2");

  main.get_slot_mut::<Realm>(scope).unwrap().0 = "renamed";
  let removed = main.remove_slot::<Realm>(scope).unwrap();
  assert_eq!(removed.0, "renamed");
  assert!(main.remove_slot::<Realm>(scope).is_none());
  assert_eq!(worker.get_slot::<Realm>(scope).unwrap().0, "worker-2");
}

#[test]
fn context_slot_read_from_callback() {
  fn realm_name(
    scope: &mut v8::HandleScope,
    _: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
  ) {
    let context = scope.get_current_context();
    let name = context.get_slot::<Realm>(scope).map_or("none", |r| r.0);
    let name = v8::String::new(scope, name).unwrap();
    rv.set(name.into());
  }

  setup();
  let isolate = &mut v8::Isolate::new(Default::default());
  let scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(scope);
  context.set_slot(scope, Realm("sandbox"));
  let scope = &mut v8::ContextScope::new(scope, context);

  let function = v8::Function::new(scope, realm_name).unwrap();
  let receiver = v8::undefined(scope).into();
  let name = function.call(scope, receiver, &[]).unwrap();
  assert_eq!(name.to_rust_string_lossy(scope), "sandbox");
}

#[test]
fn context_slots_live_until_isolate_drop() {
  struct Marker(Drops);
  impl Drop for Marker {
    fn drop(&mut self) {
      (self.0).0.set((self.0).0.get() + 1);
    }
  }

  setup();
  let drops = Drops::default();
  let mut isolate = v8::Isolate::new(Default::default());
  {
    let scope = &mut v8::HandleScope::new(&mut isolate);
    let context = v8::Context::new(scope);
    context.set_slot(scope, Marker(drops.clone()));
  }

  // Nothing references the context any more, but contexts live as long as
  // their isolate.
  isolate
    .request_garbage_collection_for_testing(v8::GarbageCollectionType::Full);
  assert_eq!(drops.count(), 0);
  drop(isolate);
  assert_eq!(drops.count(), 1);
}
