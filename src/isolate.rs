// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::array_buffer::Allocator;
use crate::engine::error;
use crate::engine::error::MessageData;
use crate::engine::heap::Tracer;
use crate::engine::heap::CELL_SIZE;
use crate::engine::promise;
use crate::engine::promise::Job;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::SymbolRef;
use crate::engine::Abrupt;
use crate::engine::ContextId;
use crate::engine::EngineConfig;
use crate::engine::JsResult;
use crate::engine::Vm;
use crate::gc::GCCallbackFlags;
use crate::gc::GCType;
use crate::handle::HandleArena;
use crate::handle::Handled;
use crate::handle::PendingFinalizer;
use crate::handle::PersistentTable;
use crate::isolate_create_params::CreateParams;
use crate::platform::Task;
use crate::promise::PromiseRejectEvent;
use crate::promise::PromiseRejectMessage;
use crate::scope::data::ScopeData;
use crate::support::SharedRef;
use crate::template::FunctionTemplateData;
use crate::template::ObjectTemplateData;
use crate::CallbackScope;
use crate::Function;
use crate::HandleScope;
use crate::Local;
use crate::Message;
use crate::Value;

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::fmt::{self, Debug, Formatter};
use std::hash::BuildHasher;
use std::hash::Hasher;
use std::mem::align_of;
use std::mem::forget;
use std::mem::needs_drop;
use std::mem::size_of;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::ops::DerefMut;
use std::ptr;
use std::ptr::drop_in_place;
use std::ptr::null_mut;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;

use log::debug;
use log::info;
use log::trace;
use log::warn;

/// Policy for running microtasks:
///   - explicit: microtasks are invoked with the
///               Isolate::perform_microtask_checkpoint() method;
///   - auto: microtasks are invoked when the script call depth decrements
///           to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrotasksPolicy {
  Explicit = 0,
  // Scoped = 1 (RAII) is omitted for now, doesn't quite map to idiomatic Rust.
  Auto = 2,
}

/// Types of garbage collections that can be requested via
/// [`Isolate::request_garbage_collection_for_testing`]. The collector has a
/// single generation, so both kinds run a full mark and sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarbageCollectionType {
  Full,
  Minor,
}

/// Called for every exception that no `TryCatch` handled, and for caught
/// ones when the `TryCatch` is verbose.
pub type MessageCallback = for<'s> fn(Local<'s, Message>, Local<'s, Value>);

pub type PromiseRejectCallback = for<'s> fn(PromiseRejectMessage<'s>);

/// Invoked before and after each collection with the data pointer given at
/// registration.
pub type GcCallbackWithData =
  fn(isolate: &mut Isolate, r#type: GCType, flags: GCCallbackFlags, data: *mut c_void);

/// Collection statistics, filled in by [`Isolate::get_heap_statistics`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStatistics {
  total_heap_size: usize,
  total_physical_size: usize,
  total_available_size: usize,
  used_heap_size: usize,
  heap_size_limit: usize,
  malloced_memory: usize,
  external_memory: usize,
  peak_malloced_memory: usize,
  number_of_native_contexts: usize,
  total_global_handles_size: usize,
  used_global_handles_size: usize,
  gc_count: u64,
}

/// Bookkeeping for one live `TryCatch`. Records form a stack; an exception
/// goes to the innermost record opened at the current engine depth.
pub(crate) struct TryCatchRecord {
  pub depth: u32,
  pub exception: Option<JsValue>,
  pub message: Option<Rc<MessageData>>,
  pub verbose: bool,
  pub capture_message: bool,
  pub terminated: bool,
}

impl TryCatchRecord {
  pub(crate) fn new(depth: u32) -> Self {
    Self {
      depth,
      exception: None,
      message: None,
      verbose: false,
      capture_message: true,
      terminated: false,
    }
  }

  pub(crate) fn has_caught(&self) -> bool {
    self.exception.is_some() || self.terminated
  }

  pub(crate) fn reset(&mut self) {
    self.exception = None;
    self.message = None;
    self.terminated = false;
  }
}

thread_local! {
  static ENTERED_ISOLATES: RefCell<Vec<*mut Isolate>> =
    const { RefCell::new(Vec::new()) };
}

/// Isolate represents an isolated instance of the engine. Isolates have
/// completely separate states. Objects from one isolate must not be used in
/// other isolates. An isolate is entered on the thread that created it and
/// can only be used from that thread.
pub struct Isolate {
  pub(crate) vm: Vm,
  pub(crate) arena: HandleArena,
  pub(crate) entered_contexts: Vec<ContextId>,
  current_scope_data: Option<NonNull<ScopeData>>,
  pub(crate) try_catches: Vec<TryCatchRecord>,
  /// An exception thrown inside a host callback with no `TryCatch` of its
  /// own. It is rethrown into script when the callback returns.
  pub(crate) scheduled_exception: Option<JsValue>,
  persistents: Rc<RefCell<PersistentTable>>,
  pub(crate) function_templates: Vec<FunctionTemplateData>,
  pub(crate) object_templates: Vec<ObjectTemplateData>,
  annex: Arc<IsolateAnnex>,
  slots: HashMap<TypeId, RawSlot, BuildTypeIdHasher>,
  message_listeners: Vec<MessageCallback>,
  promise_reject_callback: Option<PromiseRejectCallback>,
  gc_prologue_callbacks: Vec<(GcCallbackWithData, *mut c_void, GCType)>,
  gc_epilogue_callbacks: Vec<(GcCallbackWithData, *mut c_void, GCType)>,
  microtasks_policy: MicrotasksPolicy,
  running_microtasks: bool,
  pub(crate) capture_stack_trace: Option<usize>,
  /// Symbols created through `Symbol::for_global`, keyed by description.
  pub(crate) symbol_registry: HashMap<JsStr, SymbolRef>,
  gc_requested: bool,
  pending_finalizers: VecDeque<PendingFinalizer>,
  array_buffer_allocator: SharedRef<Allocator>,
  peak_external_memory: usize,
}

impl Isolate {
  /// Creates a new isolate. The isolate is entered on the current thread
  /// until it is dropped.
  ///
  /// V8::initialize() must have run prior to this.
  #[allow(clippy::new_ret_no_self)]
  pub fn new(params: CreateParams) -> OwnedIsolate {
    crate::V8::assert_initialized();
    let flags = crate::V8::engine_flags();
    let (initial_heap, max_heap) = params
      .heap_limits
      .unwrap_or((0, flags.max_heap_size_mb * 1024 * 1024));
    let config = EngineConfig {
      strict: flags.use_strict,
      expose_gc: flags.expose_gc,
      stack_limit: flags.stack_size_kb * 1024,
    };
    let array_buffer_allocator = params
      .array_buffer_allocator
      .unwrap_or_else(|| crate::new_default_allocator().make_shared());
    let isolate = Box::new(Self {
      vm: Vm::new(config, initial_heap, max_heap),
      arena: HandleArena::new(),
      entered_contexts: Vec::new(),
      current_scope_data: None,
      try_catches: Vec::new(),
      scheduled_exception: None,
      persistents: Rc::new(RefCell::new(PersistentTable::new(null_mut()))),
      function_templates: Vec::new(),
      object_templates: Vec::new(),
      annex: Arc::new(IsolateAnnex::new(null_mut())),
      slots: HashMap::default(),
      message_listeners: Vec::new(),
      promise_reject_callback: None,
      gc_prologue_callbacks: Vec::new(),
      gc_epilogue_callbacks: Vec::new(),
      microtasks_policy: MicrotasksPolicy::Explicit,
      running_microtasks: false,
      capture_stack_trace: None,
      symbol_registry: HashMap::new(),
      gc_requested: false,
      pending_finalizers: VecDeque::new(),
      array_buffer_allocator,
      peak_external_memory: 0,
    });
    let isolate_ptr = Box::into_raw(isolate);
    let mut owned_isolate = OwnedIsolate::new(isolate_ptr);
    owned_isolate.persistents =
      Rc::new(RefCell::new(PersistentTable::new(isolate_ptr)));
    owned_isolate.annex = Arc::new(IsolateAnnex::new(isolate_ptr));
    ScopeData::new_root(&mut owned_isolate);
    unsafe {
      owned_isolate.enter();
    }
    debug!("created isolate {isolate_ptr:p}");
    owned_isolate
  }

  /// Initial configuration parameters for a new Isolate.
  #[inline(always)]
  pub fn create_params() -> CreateParams {
    CreateParams::default()
  }

  #[inline(always)]
  pub fn thread_safe_handle(&self) -> IsolateHandle {
    IsolateHandle(self.annex.clone())
  }

  /// See [`IsolateHandle::terminate_execution`]
  #[inline(always)]
  pub fn terminate_execution(&self) -> bool {
    self.thread_safe_handle().terminate_execution()
  }

  /// See [`IsolateHandle::cancel_terminate_execution`]
  #[inline(always)]
  pub fn cancel_terminate_execution(&self) -> bool {
    self.thread_safe_handle().cancel_terminate_execution()
  }

  /// See [`IsolateHandle::is_execution_terminating`]
  #[inline(always)]
  pub fn is_execution_terminating(&self) -> bool {
    self.thread_safe_handle().is_execution_terminating()
  }

  pub(crate) fn as_ptr(&self) -> *mut Isolate {
    self as *const Self as *mut Self
  }

  pub(crate) fn persistents(&self) -> Rc<RefCell<PersistentTable>> {
    self.persistents.clone()
  }

  pub(crate) fn annex(&self) -> &Arc<IsolateAnnex> {
    &self.annex
  }

  pub(crate) fn array_buffer_allocator(&self) -> &SharedRef<Allocator> {
    &self.array_buffer_allocator
  }

  /// Returns a pointer to the `ScopeData` struct for the current scope.
  #[inline(always)]
  pub(crate) fn get_current_scope_data(&self) -> Option<NonNull<ScopeData>> {
    self.current_scope_data
  }

  /// Updates the slot that stores a `ScopeData` pointer for the current scope.
  #[inline(always)]
  pub(crate) fn set_current_scope_data(
    &mut self,
    scope_data: Option<NonNull<ScopeData>>,
  ) {
    self.current_scope_data = scope_data;
  }

  /// The innermost context entered with a `ContextScope`.
  pub(crate) fn entered_context_id(&self) -> Option<ContextId> {
    self.entered_contexts.last().copied()
  }

  pub(crate) fn is_terminating(&self) -> bool {
    self.annex.terminating.load(Ordering::SeqCst)
  }

  /// Asks for a collection at the next safe point.
  pub(crate) fn schedule_collection(&mut self) {
    self.gc_requested = true;
  }

  /// Returns true if this isolate has a current context.
  pub fn in_context(&self) -> bool {
    !self.vm.frames.is_empty() || !self.entered_contexts.is_empty()
  }

  /// Get a reference to embedder data added with `set_slot()`.
  #[inline(always)]
  pub fn get_slot<T: 'static>(&self) -> Option<&T> {
    self
      .slots
      .get(&TypeId::of::<T>())
      .map(|slot| unsafe { slot.borrow::<T>() })
  }

  /// Get a mutable reference to embedder data added with `set_slot()`.
  #[inline(always)]
  pub fn get_slot_mut<T: 'static>(&mut self) -> Option<&mut T> {
    self
      .slots
      .get_mut(&TypeId::of::<T>())
      .map(|slot| unsafe { slot.borrow_mut::<T>() })
  }

  /// Use with Isolate::get_slot and Isolate::get_slot_mut to associate state
  /// with an Isolate.
  ///
  /// This method gives ownership of value to the Isolate. Exactly one object of
  /// each type can be associated with an Isolate. If called more than once with
  /// an object of the same type, the earlier version will be dropped and
  /// replaced.
  ///
  /// Returns true if value was set without replacing an existing value.
  ///
  /// The value will be dropped when the isolate is dropped.
  #[inline(always)]
  pub fn set_slot<T: 'static>(&mut self, value: T) -> bool {
    self
      .slots
      .insert(TypeId::of::<T>(), RawSlot::new(value))
      .is_none()
  }

  /// Removes the embedder data added with `set_slot()` and returns it if it exists.
  #[inline(always)]
  pub fn remove_slot<T: 'static>(&mut self) -> Option<T> {
    self
      .slots
      .remove(&TypeId::of::<T>())
      .map(|slot| unsafe { slot.into_inner::<T>() })
  }

  /// Sets this isolate as the entered one for the current thread.
  /// Re-entering an isolate is allowed.
  ///
  /// Note: the isolate is entered when it is constructed and exited when
  /// dropped.
  #[inline(always)]
  pub unsafe fn enter(&mut self) {
    let isolate = self.as_ptr();
    ENTERED_ISOLATES.with(|entered| entered.borrow_mut().push(isolate));
  }

  /// Exits this isolate, restoring the previously entered one on the current
  /// thread.
  ///
  /// Note: the isolate is entered when it is constructed and exited when
  /// dropped.
  #[inline(always)]
  pub unsafe fn exit(&mut self) {
    let isolate = self.as_ptr();
    ENTERED_ISOLATES.with(|entered| {
      let mut entered = entered.borrow_mut();
      match entered.iter().rposition(|&p| p == isolate) {
        Some(index) => {
          entered.remove(index);
        }
        None => panic!("Isolate::exit() called on an isolate that was not entered"),
      }
    })
  }

  /// Optional notification that the system is running low on memory.
  /// Collects right away when no script is running; otherwise the
  /// collection happens when the outermost script returns.
  #[inline(always)]
  pub fn low_memory_notification(&mut self) {
    self.collect_now_or_later(GCCallbackFlags::COLLECT_ALL_AVAILABLE_GARBAGE);
  }

  /// Get statistics about the heap memory usage.
  pub fn get_heap_statistics(&mut self, s: &mut HeapStatistics) {
    let heap = &self.vm.heap;
    let external = self.array_buffer_allocator.allocated_bytes();
    self.peak_external_memory = self.peak_external_memory.max(external);
    let globals = self.persistents.borrow().live_strong_count()
      * size_of::<crate::handle::Slot>();
    *s = HeapStatistics {
      total_heap_size: heap.capacity_cells() * CELL_SIZE,
      total_physical_size: heap.capacity_cells() * CELL_SIZE,
      total_available_size: heap
        .max_cells()
        .saturating_sub(heap.live_cells())
        * CELL_SIZE,
      used_heap_size: heap.live_cells() * CELL_SIZE,
      heap_size_limit: heap.max_cells() * CELL_SIZE,
      malloced_memory: self.arena.len() * size_of::<crate::handle::Slot>(),
      external_memory: external,
      peak_malloced_memory: self.peak_external_memory,
      number_of_native_contexts: self.vm.realms.len(),
      total_global_handles_size: globals,
      used_global_handles_size: globals,
      gc_count: heap.gc_runs(),
    };
  }

  /// Tells the engine to capture current stack trace when uncaught exception
  /// occurs and report it to the message listeners. The option is off by
  /// default.
  #[inline(always)]
  pub fn set_capture_stack_trace_for_uncaught_exceptions(
    &mut self,
    capture: bool,
    frame_limit: i32,
  ) {
    self.capture_stack_trace = if capture {
      Some(frame_limit.max(0) as usize)
    } else {
      None
    };
  }

  /// Adds a message listener (errors only).
  ///
  /// The same message listener can be added more than once and in that
  /// case it will be called more than once for each message.
  ///
  /// The exception object will be passed to the callback.
  #[inline(always)]
  pub fn add_message_listener(&mut self, callback: MessageCallback) -> bool {
    self.message_listeners.push(callback);
    true
  }

  /// Set callback to notify about promise reject with no handler, or
  /// revocation of such a previous notification once the handler is added.
  #[inline(always)]
  pub fn set_promise_reject_callback(
    &mut self,
    callback: PromiseRejectCallback,
  ) {
    self.promise_reject_callback = Some(callback);
  }

  /// Enables the host application to receive a notification before a
  /// garbage collection.
  #[allow(clippy::not_unsafe_ptr_arg_deref)]
  #[inline(always)]
  pub fn add_gc_prologue_callback(
    &mut self,
    callback: GcCallbackWithData,
    data: *mut c_void,
    gc_type_filter: GCType,
  ) {
    self
      .gc_prologue_callbacks
      .push((callback, data, gc_type_filter));
  }

  /// This function removes a callback which was added by
  /// `add_gc_prologue_callback`.
  #[allow(clippy::not_unsafe_ptr_arg_deref)]
  #[inline(always)]
  pub fn remove_gc_prologue_callback(
    &mut self,
    callback: GcCallbackWithData,
    data: *mut c_void,
  ) {
    self.gc_prologue_callbacks.retain(|(cb, d, _)| {
      !(std::ptr::fn_addr_eq(*cb, callback) && *d == data)
    });
  }

  /// Enables the host application to receive a notification after a
  /// garbage collection.
  #[allow(clippy::not_unsafe_ptr_arg_deref)]
  #[inline(always)]
  pub fn add_gc_epilogue_callback(
    &mut self,
    callback: GcCallbackWithData,
    data: *mut c_void,
    gc_type_filter: GCType,
  ) {
    self
      .gc_epilogue_callbacks
      .push((callback, data, gc_type_filter));
  }

  /// This function removes a callback which was added by
  /// `add_gc_epilogue_callback`.
  #[allow(clippy::not_unsafe_ptr_arg_deref)]
  #[inline(always)]
  pub fn remove_gc_epilogue_callback(
    &mut self,
    callback: GcCallbackWithData,
    data: *mut c_void,
  ) {
    self.gc_epilogue_callbacks.retain(|(cb, d, _)| {
      !(std::ptr::fn_addr_eq(*cb, callback) && *d == data)
    });
  }

  /// Returns the policy controlling how Microtasks are invoked.
  #[inline(always)]
  pub fn get_microtasks_policy(&self) -> MicrotasksPolicy {
    self.microtasks_policy
  }

  /// Sets the policy controlling how Microtasks are invoked.
  #[inline(always)]
  pub fn set_microtasks_policy(&mut self, policy: MicrotasksPolicy) {
    self.microtasks_policy = policy;
  }

  /// Runs the default MicrotaskQueue until it gets empty. Any exceptions
  /// thrown by microtask callbacks are reported to the message listeners
  /// and otherwise swallowed.
  pub fn perform_microtask_checkpoint(&mut self) {
    if self.vm.depth == 0 {
      self.collect_if_needed();
      self.drain_finalizers();
    }
    self.run_microtasks();
  }

  /// Enqueues the callback to the default MicrotaskQueue
  #[inline(always)]
  pub fn enqueue_microtask(&mut self, microtask: Local<Function>) {
    let function = microtask.obj();
    self.vm.jobs.push_back(Job::Callback(function));
  }

  /// Request garbage collection in this Isolate. It is only valid to call this
  /// function if --expose_gc was specified.
  ///
  /// This should only be used for testing purposes and not to enforce a garbage
  /// collection schedule. Weak finalizers of collected objects have run by
  /// the time this returns, unless script is on the stack.
  #[inline(always)]
  pub fn request_garbage_collection_for_testing(
    &mut self,
    r#type: GarbageCollectionType,
  ) {
    let _ = r#type;
    self.collect_now_or_later(GCCallbackFlags::FORCED);
  }

  fn collect_now_or_later(&mut self, flags: GCCallbackFlags) {
    if self.vm.depth == 0 {
      self.collect_garbage(flags);
      self.drain_finalizers();
    } else {
      self.gc_requested = true;
    }
  }

  /// Runs `f` against the engine. Exceptions are routed to the innermost
  /// `TryCatch` (or reported, or scheduled for the calling script) and turn
  /// into `None`.
  pub(crate) fn run_js<T>(
    &mut self,
    f: impl FnOnce(&mut Isolate) -> JsResult<T>,
  ) -> Option<T> {
    let outermost = self.vm.depth == 0;
    if outermost {
      self.collect_if_needed();
      self.drain_finalizers();
    } else if self.scheduled_exception.is_some() {
      return None;
    }
    let marker = 0u8;
    self.vm.depth += 1;
    if outermost {
      self.vm.stack_base = &marker as *const u8 as usize;
    }
    let result = f(self);
    self.vm.depth -= 1;
    if outermost {
      self.vm.stack_base = 0;
    }
    let result = match result {
      Ok(value) => Some(value),
      Err(abrupt) => {
        self.route_abrupt(abrupt, None);
        None
      }
    };
    if outermost
      && self.microtasks_policy == MicrotasksPolicy::Auto
      && !self.is_terminating()
    {
      self.run_microtasks();
    }
    result
  }

  /// Sends an exception to whoever is responsible for it at the current
  /// depth. `skip` excludes the `TryCatch` records at and above that index.
  pub(crate) fn route_abrupt(&mut self, abrupt: Abrupt, skip: Option<usize>) {
    let depth = self.vm.depth;
    let limit = skip.unwrap_or(self.try_catches.len());
    let catcher = self.try_catches[..limit]
      .iter()
      .rposition(|record| record.depth == depth);
    match abrupt {
      Abrupt::Terminate => {
        if let Some(index) = catcher {
          let record = &mut self.try_catches[index];
          record.terminated = true;
          record.exception = Some(JsValue::Null);
          record.message = None;
        }
        if depth == 0 {
          self.annex.terminating.store(false, Ordering::SeqCst);
        }
      }
      Abrupt::Throw(exception) => match catcher {
        Some(index) => {
          let message = self.take_message(&exception);
          let record = &mut self.try_catches[index];
          record.exception = Some(exception.clone());
          record.terminated = false;
          if record.capture_message {
            record.message = Some(message.clone());
          }
          if record.verbose {
            self.report_message(message, exception);
          }
        }
        None if depth > 0 => {
          self.scheduled_exception = Some(exception);
        }
        None => {
          let message = self.take_message(&exception);
          self.report_message(message, exception);
        }
      },
    }
  }

  fn take_message(&mut self, exception: &JsValue) -> Rc<MessageData> {
    match self.vm.pending_message.take() {
      Some(message) => message,
      None => Rc::new(error::message_for(self, exception)),
    }
  }

  /// Hands an uncaught exception to the message listeners.
  pub(crate) fn report_message(
    &mut self,
    message: Rc<MessageData>,
    exception: JsValue,
  ) {
    if self.message_listeners.is_empty() {
      warn!("{}", message.text);
      return;
    }
    let listeners = self.message_listeners.clone();
    let scope = &mut unsafe { CallbackScope::new(&mut *self) };
    let scope = &mut HandleScope::new(scope);
    let message = scope.new_local::<Message>(Handled::Message(message));
    let exception = scope.value_local::<Value>(exception);
    for listener in listeners {
      listener(message, exception);
    }
  }

  fn run_microtasks(&mut self) {
    if self.running_microtasks {
      return;
    }
    self.running_microtasks = true;
    let outermost = self.vm.depth == 0;
    let marker = 0u8;
    self.vm.depth += 1;
    if outermost {
      self.vm.stack_base = &marker as *const u8 as usize;
    }
    let mut count = 0usize;
    let mut terminated = false;
    while let Some(job) = self.vm.jobs.pop_front() {
      count += 1;
      let realm = job_realm(&self.vm, &job);
      if let Some(realm) = realm {
        self.entered_contexts.push(realm);
      }
      let result = promise::run_job(self, job);
      if realm.is_some() {
        self.entered_contexts.pop();
      }
      match result {
        Ok(()) => {}
        Err(Abrupt::Throw(exception)) => {
          let message = self.take_message(&exception);
          self.report_message(message, exception);
        }
        Err(Abrupt::Terminate) => {
          terminated = true;
          break;
        }
      }
    }
    self.vm.depth -= 1;
    if outermost {
      self.vm.stack_base = 0;
    }
    self.running_microtasks = false;
    trace!("microtask checkpoint ran {count} jobs");
    if terminated {
      self.route_abrupt(Abrupt::Terminate, None);
    }
  }

  fn collect_if_needed(&mut self) {
    if self.gc_requested || self.vm.heap.wants_collection() {
      self.gc_requested = false;
      self.collect_garbage(GCCallbackFlags::NO_FLAGS);
    }
  }

  fn collect_garbage(&mut self, flags: GCCallbackFlags) {
    debug_assert_eq!(self.vm.depth, 0);
    // Locals of dropped scopes are not roots.
    ScopeData::exit_zombie_scopes(self);
    let gc_type = GCType::MARK_SWEEP_COMPACT;
    let prologue = self.gc_prologue_callbacks.clone();
    for (callback, data, filter) in prologue {
      if filter.intersects(gc_type) {
        callback(self, gc_type, flags, data);
      }
    }

    let mut tracer = Tracer::default();
    self.vm.trace_roots(&mut tracer);
    if let Some(message) = &self.vm.pending_message {
      tracer.visit_all(message.trace_values());
    }
    self.arena.trace(&mut tracer);
    self.persistents.borrow().trace_strong(&mut tracer);
    for template in &self.function_templates {
      template.trace(&mut tracer);
    }
    for template in &self.object_templates {
      template.trace(&mut tracer);
    }
    for record in &self.try_catches {
      tracer.visit_all(record.exception.iter());
      if let Some(message) = &record.message {
        tracer.visit_all(message.trace_values());
      }
    }
    tracer.visit_all(self.scheduled_exception.iter());
    self.vm.heap.mark(tracer);

    let dead = self
      .persistents
      .borrow_mut()
      .clear_unmarked(&self.vm.heap);
    self.pending_finalizers.extend(dead);
    let stats = self.vm.heap.sweep();
    debug!(
      "gc #{}: freed {} cells, {} live",
      self.vm.heap.gc_runs(),
      stats.freed,
      stats.live
    );

    let epilogue = self.gc_epilogue_callbacks.clone();
    for (callback, data, filter) in epilogue {
      if filter.intersects(gc_type) {
        callback(self, gc_type, flags, data);
      }
    }
    if self.vm.heap.over_limit() {
      warn!(
        "heap limit exceeded: {} live cells, limit {}",
        self.vm.heap.live_cells(),
        self.vm.heap.max_cells()
      );
    }
  }

  fn drain_finalizers(&mut self) {
    if self.pending_finalizers.is_empty() {
      return;
    }
    trace!("running {} weak finalizers", self.pending_finalizers.len());
    while let Some(finalizer) = self.pending_finalizers.pop_front() {
      finalizer.run(self);
    }
  }

  /// Runs the next foreground task posted through an `IsolateHandle`.
  pub(crate) fn run_posted_task(&mut self, wait_for_work: bool) -> bool {
    let task = {
      let annex = self.annex.clone();
      let mut tasks = match annex.tasks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
      };
      if wait_for_work {
        while tasks.is_empty() {
          tasks = match annex.task_ready.wait(tasks) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
          };
        }
      }
      tasks.pop_front()
    };
    match task {
      Some(task) => {
        trace!("running foreground task");
        task.run(self);
        true
      }
      None => false,
    }
  }

  /// Disposes the isolate. The isolate must not be entered by any
  /// thread to be disposable.
  unsafe fn dispose(&mut self) {
    // Drop the scope stack.
    ScopeData::drop_root(self);

    self.slots.clear();
    for realm in &mut self.vm.realms {
      realm.slots.clear();
    }
    debug_assert_eq!(
      self.persistents.borrow().live_strong_count(),
      0,
      "isolate disposed while Global handles are still alive"
    );

    // Set the `isolate` pointer inside the annex struct to null, so any
    // IsolateHandle that outlives the isolate will know that it can't call
    // methods on the isolate.
    {
      let _lock = match self.annex.isolate_mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
      };
      self.annex.isolate.store(null_mut(), Ordering::SeqCst);
    }

    // Run through any remaining guaranteed finalizers.
    let guaranteed = self.persistents.borrow_mut().dispose();
    for finalizer in guaranteed {
      finalizer();
    }
    debug!("disposed isolate {:p}", self.as_ptr());
  }
}

impl Debug for Isolate {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Isolate")
      .field("contexts", &self.vm.realms.len())
      .field("depth", &self.vm.depth)
      .finish()
  }
}

/// The realm a queued job runs in.
fn job_realm(vm: &Vm, job: &Job) -> Option<ContextId> {
  let function: ObjRef = match job {
    Job::Reaction { reaction, .. } => reaction.handler.or(reaction.derived)?,
    Job::ResolveThenable { then, .. } => *then,
    Job::Callback(function) => *function,
  };
  Some(vm.heap.object(function).realm)
}

/// Delivers a promise rejection event to the registered callback.
pub(crate) fn report_promise_reject(
  cx: &mut Isolate,
  promise: ObjRef,
  event: PromiseRejectEvent,
  value: JsValue,
) {
  let Some(callback) = cx.promise_reject_callback else {
    return;
  };
  let scope = &mut unsafe { CallbackScope::new(&mut *cx) };
  let scope = &mut HandleScope::new(scope);
  let promise = scope.new_object_local(promise);
  let value = match event {
    PromiseRejectEvent::PromiseHandlerAddedAfterReject => None,
    _ => Some(scope.value_local(value)),
  };
  callback(PromiseRejectMessage::new(promise, event, value));
}

/// State shared between an isolate and its `IsolateHandle`s, which may
/// live on other threads and outlive the isolate.
pub(crate) struct IsolateAnnex {
  // The `isolate` and `isolate_mutex` fields are there so an `IsolateHandle`
  // (which may outlive the isolate itself) can determine whether the isolate
  // is still alive. Safety rules:
  // - The 'main thread' must lock the mutex and reset `isolate` to null just
  //   before the isolate is disposed.
  // - Any other thread must lock the mutex while it's reading/using the
  //   `isolate` pointer.
  isolate: AtomicPtr<Isolate>,
  isolate_mutex: Mutex<()>,
  terminating: AtomicBool,
  pub(crate) tasks: Mutex<VecDeque<Box<dyn Task>>>,
  pub(crate) task_ready: Condvar,
}

impl IsolateAnnex {
  fn new(isolate: *mut Isolate) -> Self {
    Self {
      isolate: AtomicPtr::new(isolate),
      isolate_mutex: Mutex::new(()),
      terminating: AtomicBool::new(false),
      tasks: Mutex::new(VecDeque::new()),
      task_ready: Condvar::new(),
    }
  }
}

impl Debug for IsolateAnnex {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("IsolateAnnex")
      .field("isolate", &self.isolate)
      .field("isolate_mutex", &self.isolate_mutex)
      .finish()
  }
}

/// IsolateHandle is a thread-safe reference to an Isolate. It's main use is to
/// terminate execution of a running isolate from another thread.
///
/// It is created with Isolate::thread_safe_handle().
///
/// IsolateHandle is Cloneable, Send, and Sync.
#[derive(Clone, Debug)]
pub struct IsolateHandle(Arc<IsolateAnnex>);

unsafe impl Send for IsolateHandle {}
unsafe impl Sync for IsolateHandle {}

impl IsolateHandle {
  /// Runs `f` with the annex locked, unless the isolate is gone.
  fn with_live_isolate<R>(&self, f: impl FnOnce(&IsolateAnnex) -> R) -> Option<R> {
    let _lock = match self.0.isolate_mutex.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    if self.0.isolate.load(Ordering::SeqCst).is_null() {
      None
    } else {
      Some(f(&self.0))
    }
  }

  /// Forcefully terminate the current thread of JavaScript execution
  /// in the given isolate.
  ///
  /// This method can be used by any thread.
  ///
  /// Returns false if Isolate was already destroyed.
  #[inline(always)]
  pub fn terminate_execution(&self) -> bool {
    self
      .with_live_isolate(|annex| {
        annex.terminating.store(true, Ordering::SeqCst);
        info!("termination requested");
      })
      .is_some()
  }

  /// Resume execution capability in the given isolate, whose execution
  /// was previously forcefully terminated using TerminateExecution().
  ///
  /// When execution is forcefully terminated using TerminateExecution(),
  /// the isolate can not resume execution until all JavaScript frames
  /// have propagated the uncatchable exception which is generated.  This
  /// method allows the program embedding the engine to handle the
  /// termination event and resume execution capability, even if
  /// JavaScript frames remain on the stack.
  ///
  /// Returns false if Isolate was already destroyed.
  #[inline(always)]
  pub fn cancel_terminate_execution(&self) -> bool {
    self
      .with_live_isolate(|annex| {
        annex.terminating.store(false, Ordering::SeqCst);
        info!("termination cancelled");
      })
      .is_some()
  }

  /// Is the engine terminating JavaScript execution.
  ///
  /// Returns true if JavaScript execution is currently terminating
  /// because of a call to TerminateExecution.  In that case there are
  /// still JavaScript frames on the stack and the termination
  /// exception is still active.
  ///
  /// Returns false if Isolate was already destroyed.
  #[inline(always)]
  pub fn is_execution_terminating(&self) -> bool {
    self
      .with_live_isolate(|annex| annex.terminating.load(Ordering::SeqCst))
      .unwrap_or(false)
  }

  /// Queues a task to run on the isolate's thread the next time the
  /// platform's message loop is pumped. Returns false if the isolate was
  /// already destroyed.
  pub(crate) fn post_task(&self, task: Box<dyn Task>) -> bool {
    self
      .with_live_isolate(|annex| {
        let mut tasks = match annex.tasks.lock() {
          Ok(guard) => guard,
          Err(poisoned) => poisoned.into_inner(),
        };
        tasks.push_back(task);
        annex.task_ready.notify_one();
      })
      .is_some()
  }
}

/// Same as Isolate but gets disposed when it goes out of scope.
#[derive(Debug)]
pub struct OwnedIsolate {
  isolate_ptr: NonNull<Isolate>,
}

impl OwnedIsolate {
  fn new(isolate: *mut Isolate) -> Self {
    match NonNull::new(isolate) {
      Some(isolate_ptr) => Self { isolate_ptr },
      None => panic!("OwnedIsolate created from a null pointer"),
    }
  }
}

impl Drop for OwnedIsolate {
  fn drop(&mut self) {
    unsafe {
      self.exit();
      self.isolate_ptr.as_mut().dispose();
      drop(Box::from_raw(self.isolate_ptr.as_ptr()));
    }
  }
}

impl Deref for OwnedIsolate {
  type Target = Isolate;
  fn deref(&self) -> &Self::Target {
    unsafe { self.isolate_ptr.as_ref() }
  }
}

impl DerefMut for OwnedIsolate {
  fn deref_mut(&mut self) -> &mut Self::Target {
    unsafe { self.isolate_ptr.as_mut() }
  }
}

impl AsMut<Isolate> for OwnedIsolate {
  fn as_mut(&mut self) -> &mut Isolate {
    self
  }
}

impl AsMut<Isolate> for Isolate {
  fn as_mut(&mut self) -> &mut Isolate {
    self
  }
}

impl HeapStatistics {
  #[inline(always)]
  pub fn total_heap_size(&self) -> usize {
    self.total_heap_size
  }

  /// Always zero: there is no generated code.
  #[inline(always)]
  pub fn total_heap_size_executable(&self) -> usize {
    0
  }

  #[inline(always)]
  pub fn total_physical_size(&self) -> usize {
    self.total_physical_size
  }

  #[inline(always)]
  pub fn total_available_size(&self) -> usize {
    self.total_available_size
  }

  #[inline(always)]
  pub fn total_global_handles_size(&self) -> usize {
    self.total_global_handles_size
  }

  #[inline(always)]
  pub fn used_global_handles_size(&self) -> usize {
    self.used_global_handles_size
  }

  #[inline(always)]
  pub fn used_heap_size(&self) -> usize {
    self.used_heap_size
  }

  /// Zero when the heap is unbounded.
  #[inline(always)]
  pub fn heap_size_limit(&self) -> usize {
    self.heap_size_limit
  }

  #[inline(always)]
  pub fn malloced_memory(&self) -> usize {
    self.malloced_memory
  }

  /// Bytes held by array buffer backing stores from the isolate's allocator.
  #[inline(always)]
  pub fn external_memory(&self) -> usize {
    self.external_memory
  }

  #[inline(always)]
  pub fn peak_malloced_memory(&self) -> usize {
    self.peak_malloced_memory
  }

  #[inline(always)]
  pub fn number_of_native_contexts(&self) -> usize {
    self.number_of_native_contexts
  }

  #[inline(always)]
  pub fn number_of_detached_contexts(&self) -> usize {
    0
  }

  /// Number of completed collection cycles.
  #[inline(always)]
  pub fn gc_count(&self) -> u64 {
    self.gc_count
  }
}

/// A special hasher that is optimized for hashing `std::any::TypeId` values.
/// `TypeId` values already come out of a hash function, so it's unnecessary
/// to shuffle their bits any further.
#[derive(Clone, Default)]
pub(crate) struct TypeIdHasher {
  state: Option<u64>,
}

impl Hasher for TypeIdHasher {
  fn write(&mut self, bytes: &[u8]) {
    for chunk in bytes.chunks(8) {
      let mut word = [0u8; 8];
      word[..chunk.len()].copy_from_slice(chunk);
      self.write_u64(u64::from_le_bytes(word));
    }
  }

  #[inline]
  fn write_u64(&mut self, value: u64) {
    self.state = Some(match self.state {
      Some(prev) => prev.rotate_left(31) ^ value,
      None => value,
    });
  }

  #[inline]
  fn finish(&self) -> u64 {
    self.state.unwrap_or(0)
  }
}

/// Factory for instances of `TypeIdHasher`. This is the type that one would
/// pass to the constructor of some map/set type in order to make it use
/// `TypeIdHasher` instead of the default hasher implementation.
#[derive(Copy, Clone, Default)]
pub(crate) struct BuildTypeIdHasher;

impl BuildHasher for BuildTypeIdHasher {
  type Hasher = TypeIdHasher;

  #[inline]
  fn build_hasher(&self) -> Self::Hasher {
    Default::default()
  }
}

/// Type-erased storage for one isolate slot. Values that fit in a word are
/// stored inline; larger ones are boxed.
pub(crate) struct RawSlot {
  data: RawSlotData,
  dtor: Option<RawSlotDtor>,
}

type RawSlotData = MaybeUninit<usize>;
type RawSlotDtor = unsafe fn(&mut RawSlotData) -> ();

impl RawSlot {
  #[inline]
  pub fn new<T: 'static>(value: T) -> Self {
    if Self::needs_box::<T>() {
      Self::new_internal(Box::new(value))
    } else {
      Self::new_internal(value)
    }
  }

  // SAFETY: a valid value of type `T` must haven been stored in the slot
  // earlier. There is no verification that the type param provided by the
  // caller is correct.
  #[inline]
  pub unsafe fn borrow<T: 'static>(&self) -> &T {
    unsafe {
      if Self::needs_box::<T>() {
        &*(self.data.as_ptr() as *const Box<T>)
      } else {
        &*(self.data.as_ptr() as *const T)
      }
    }
  }

  // Safety: see [`RawSlot::borrow`].
  #[inline]
  pub unsafe fn borrow_mut<T: 'static>(&mut self) -> &mut T {
    unsafe {
      if Self::needs_box::<T>() {
        &mut *(self.data.as_mut_ptr() as *mut Box<T>)
      } else {
        &mut *(self.data.as_mut_ptr() as *mut T)
      }
    }
  }

  // Safety: see [`RawSlot::borrow`].
  #[inline]
  pub unsafe fn into_inner<T: 'static>(self) -> T {
    let value = unsafe {
      if Self::needs_box::<T>() {
        *std::ptr::read(self.data.as_ptr() as *mut Box<T>)
      } else {
        std::ptr::read(self.data.as_ptr() as *mut T)
      }
    };
    forget(self);
    value
  }

  const fn needs_box<T: 'static>() -> bool {
    size_of::<T>() > size_of::<RawSlotData>()
      || align_of::<T>() > align_of::<RawSlotData>()
  }

  #[inline]
  fn new_internal<B: 'static>(value: B) -> Self {
    assert!(!Self::needs_box::<B>());
    let mut self_ = Self {
      data: RawSlotData::zeroed(),
      dtor: None,
    };
    unsafe {
      ptr::write(self_.data.as_mut_ptr() as *mut B, value);
    }
    if needs_drop::<B>() {
      self_.dtor.replace(Self::drop_internal::<B>);
    };
    self_
  }

  // SAFETY: a valid value of type `T` or `Box<T>` must be stored in the slot.
  unsafe fn drop_internal<B: 'static>(data: &mut RawSlotData) {
    assert!(!Self::needs_box::<B>());
    unsafe { drop_in_place(data.as_mut_ptr() as *mut B) };
  }
}

impl Drop for RawSlot {
  fn drop(&mut self) {
    if let Some(dtor) = self.dtor {
      unsafe { dtor(&mut self.data) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::hash::Hash;

  #[test]
  fn type_id_hasher_is_stable() {
    let hash = |id: TypeId| {
      let mut hasher = BuildTypeIdHasher.build_hasher();
      id.hash(&mut hasher);
      hasher.finish()
    };
    assert_eq!(hash(TypeId::of::<u8>()), hash(TypeId::of::<u8>()));
    assert_ne!(hash(TypeId::of::<u8>()), hash(TypeId::of::<u16>()));
  }

  #[test]
  fn raw_slot_inline_and_boxed() {
    let small = RawSlot::new(7u32);
    assert_eq!(unsafe { *small.borrow::<u32>() }, 7);
    let mut big = RawSlot::new([1u64; 4]);
    unsafe { big.borrow_mut::<[u64; 4]>()[2] = 9 };
    assert_eq!(unsafe { big.into_inner::<[u64; 4]>() }, [1, 1, 9, 1]);
    let text = RawSlot::new(String::from("slot"));
    assert_eq!(unsafe { text.borrow::<String>() }, "slot");
  }

  #[test]
  fn try_catch_record_reset() {
    let mut record = TryCatchRecord::new(0);
    assert!(!record.has_caught());
    record.terminated = true;
    assert!(record.has_caught());
    record.reset();
    assert!(!record.has_caught());
    assert!(record.capture_message);
  }
}
