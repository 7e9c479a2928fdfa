// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! # Example
//!
//! ```rust
//! use jsembed as v8;
//!
//! let platform = v8::new_default_platform(0, false).make_shared();
//! v8::V8::initialize_platform(platform);
//! v8::V8::initialize();
//!
//! let isolate = &mut v8::Isolate::new(Default::default());
//!
//! let scope = &mut v8::HandleScope::new(isolate);
//! let context = v8::Context::new(scope);
//! let scope = &mut v8::ContextScope::new(scope, context);
//!
//! let code = v8::String::new(scope, "'Hello' + ' World!'").unwrap();
//! println!("javascript code: {}", code.to_rust_string_lossy(scope));
//!
//! let script = v8::Script::compile(scope, code, None).unwrap();
//! let result = script.run(scope).unwrap();
//! let result = result.to_string(scope).unwrap();
//! println!("result: {}", result.to_rust_string_lossy(scope));
//! ```
//!
//! # Design
//!
//! The crate exposes the embedding surface of a small JavaScript engine that
//! lives in the private `engine` module: a tree-walking interpreter, a
//! mark-and-sweep heap, realms with their built-ins, promise jobs and ES
//! modules. Embedders never see engine types. They hold `Local` handles
//! that live as long as the `HandleScope` that created them, and `Global`
//! or `Weak` handles that outlive scopes.
//!
//! Every value handle is tagged when it is created, so `Value::is_*`
//! checks and the `TryFrom` casts between handle types are cheap.
//!
//! Operations that may run script take a scope and return `Option`. `None`
//! means an exception was thrown (or execution was terminated); a `TryCatch`
//! scope observes it.

#![allow(clippy::missing_safety_doc)]

#[macro_use]
extern crate lazy_static;

mod array_buffer;
mod array_buffer_view;
mod bigint;
mod context;
mod data;
mod engine;
mod exception;
mod external;
mod fixed_array;
mod function;
mod gc;
mod handle;
mod isolate;
mod isolate_create_params;
mod module;
mod number;
mod object;
mod platform;
mod primitives;
mod promise;
mod property_attribute;
mod scope;
mod script;
mod string;
mod support;
mod symbol;
mod template;
mod uint8_array;
mod unbound_script;
mod value;

pub mod json;
pub mod script_compiler;
// This module is intentionally named "V8" rather than "v8" to match the
// C++ namespace "v8::V8".
#[allow(non_snake_case)]
pub mod V8;

pub use array_buffer::*;
pub use context::ContextOptions;
pub use data::*;
pub use exception::*;
pub use function::*;
pub use gc::*;
pub use handle::Global;
pub use handle::Handle;
pub use handle::Local;
pub use handle::Weak;
pub use handle::WeakCallback;
pub use handle::WeakCallbackInfo;
pub use handle::WeakCallbackType;
pub use isolate::GarbageCollectionType;
pub use isolate::GcCallbackWithData;
pub use isolate::HeapStatistics;
pub use isolate::Isolate;
pub use isolate::IsolateHandle;
pub use isolate::MessageCallback;
pub use isolate::MicrotasksPolicy;
pub use isolate::OwnedIsolate;
pub use isolate::PromiseRejectCallback;
pub use isolate_create_params::CreateParams;
pub use module::*;
pub use platform::new_default_platform;
pub use platform::new_single_threaded_default_platform;
pub use platform::post_task;
pub use platform::pump_message_loop;
pub use platform::Platform;
pub use platform::Task;
pub use primitives::*;
pub use promise::PromiseRejectEvent;
pub use promise::PromiseRejectMessage;
pub use promise::PromiseState;
pub use property_attribute::*;
pub use scope::CallbackScope;
pub use scope::ContextScope;
pub use scope::EscapableHandleScope;
pub use scope::HandleScope;
pub use scope::TryCatch;
pub use script::ScriptOrigin;
pub use string::NewStringType;
pub use string::WriteOptions;
pub use support::SharedRef;
pub use support::UniqueRef;
pub use template::*;
