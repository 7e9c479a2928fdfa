// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use std::cell::Cell;
use std::cell::RefCell;
use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::null_mut;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::data::Tag;
use crate::engine::error::FrameInfo;
use crate::engine::error::MessageData;
use crate::engine::heap::Heap;
use crate::engine::heap::Tracer;
use crate::engine::object::InternalField;
use crate::engine::value::JsValue;
use crate::engine::ContextId;
use crate::engine::FunctionTemplateId;
use crate::engine::ModuleId;
use crate::engine::ObjectTemplateId;
use crate::engine::ScriptId;
use crate::HandleScope;
use crate::Isolate;

/// What a handle slot refers to. Most slots hold a JavaScript value; the
/// others hold the engine-side records that the API exposes as `Data`.
#[derive(Clone, Default)]
pub(crate) enum Handled {
  #[default]
  Empty,
  Value(JsValue),
  Context(ContextId),
  Script {
    script: ScriptId,
    context: ContextId,
  },
  UnboundScript(ScriptId),
  Module(ModuleId),
  ModuleRequest {
    module: ModuleId,
    index: usize,
  },
  FixedArray(Rc<[Handled]>),
  FunctionTemplate(FunctionTemplateId),
  ObjectTemplate(ObjectTemplateId),
  Message(Rc<MessageData>),
  StackTrace(Rc<Vec<FrameInfo>>),
  StackFrame {
    frames: Rc<Vec<FrameInfo>>,
    index: usize,
  },
}

impl Handled {
  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    match self {
      Handled::Value(value) => tracer.visit_value(value),
      Handled::FixedArray(items) => {
        for item in items.iter() {
          item.trace(tracer);
        }
      }
      Handled::Message(message) => tracer.visit_all(message.trace_values()),
      Handled::StackTrace(frames) | Handled::StackFrame { frames, .. } => {
        tracer.visit_all(frames.iter().map(|f| &f.script_name))
      }
      _ => {}
    }
  }

  /// Handle identity: the same object, the same primitive value, or the
  /// same engine record.
  pub(crate) fn same_identity(&self, other: &Handled) -> bool {
    match (self, other) {
      (Handled::Empty, Handled::Empty) => true,
      (Handled::Value(a), Handled::Value(b)) => a.same_value(b),
      (Handled::Context(a), Handled::Context(b)) => a == b,
      (
        Handled::Script { script: a, .. },
        Handled::Script { script: b, .. },
      ) => a == b,
      (Handled::UnboundScript(a), Handled::UnboundScript(b)) => a == b,
      (Handled::Module(a), Handled::Module(b)) => a == b,
      (
        Handled::ModuleRequest { module: m1, index: i1 },
        Handled::ModuleRequest { module: m2, index: i2 },
      ) => m1 == m2 && i1 == i2,
      (Handled::FixedArray(a), Handled::FixedArray(b)) => Rc::ptr_eq(a, b),
      (Handled::FunctionTemplate(a), Handled::FunctionTemplate(b)) => a == b,
      (Handled::ObjectTemplate(a), Handled::ObjectTemplate(b)) => a == b,
      (Handled::Message(a), Handled::Message(b)) => Rc::ptr_eq(a, b),
      (Handled::StackTrace(a), Handled::StackTrace(b)) => Rc::ptr_eq(a, b),
      (
        Handled::StackFrame { frames: a, index: i },
        Handled::StackFrame { frames: b, index: j },
      ) => Rc::ptr_eq(a, b) && i == j,
      _ => false,
    }
  }
}

/// One storage cell for a handle. Every public data type (`Value`,
/// `Object`, `Context`, ...) is a transparent wrapper around a `Slot`, so a
/// `&Object` is really a reference to the slot that holds the object.
///
/// Slots live either in the isolate's handle arena (local handles) or in a
/// box owned by the persistent handle table (global and weak handles). The
/// `stamp` changes every time an arena slot is released, which is how stale
/// `Local`s are detected.
pub struct Slot {
  content: UnsafeCell<Handled>,
  tag: Cell<Tag>,
  stamp: Cell<u32>,
  isolate: Cell<*mut Isolate>,
}

impl Slot {
  fn empty() -> Self {
    Self {
      content: UnsafeCell::new(Handled::Empty),
      tag: Cell::new(Tag::empty()),
      stamp: Cell::new(0),
      isolate: Cell::new(null_mut()),
    }
  }

  pub(crate) fn fill(&self, isolate: *mut Isolate, content: Handled, tag: Tag) {
    // The slot is either unused or owned by the caller; no reference into
    // its content is live.
    unsafe { *self.content.get() = content };
    self.tag.set(tag);
    self.isolate.set(isolate);
  }

  fn release(&self) {
    unsafe { *self.content.get() = Handled::Empty };
    self.tag.set(Tag::empty());
    self.stamp.set(self.stamp.get().wrapping_add(1));
  }

  pub(crate) fn isolate_ptr(&self) -> *mut Isolate {
    self.isolate.get()
  }

  pub(crate) fn tag(&self) -> Tag {
    self.tag.get()
  }

  pub(crate) fn stamp(&self) -> u32 {
    self.stamp.get()
  }

  pub(crate) fn with_content<R>(&self, f: impl FnOnce(&Handled) -> R) -> R {
    f(unsafe { &*self.content.get() })
  }

  pub(crate) fn content(&self) -> Handled {
    self.with_content(Handled::clone)
  }

  pub(crate) fn value(&self) -> JsValue {
    self.with_content(|content| match content {
      Handled::Value(value) => value.clone(),
      Handled::Empty => panic!("use of an empty handle"),
      _ => panic!("handle does not refer to a JavaScript value"),
    })
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.with_content(|content| matches!(content, Handled::Empty))
  }
}

const CHUNK_SIZE: usize = 256;

/// Backing storage for local handles. Slots are handed out in stack order;
/// `truncate()` releases everything above a mark when a `HandleScope` ends.
/// Chunks are never moved or freed while the isolate lives, so a slot
/// address stays valid for as long as the isolate does.
pub(crate) struct HandleArena {
  chunks: RefCell<Vec<NonNull<Slot>>>,
  len: Cell<usize>,
}

impl HandleArena {
  pub fn new() -> Self {
    Self {
      chunks: RefCell::new(Vec::new()),
      len: Cell::new(0),
    }
  }

  pub fn len(&self) -> usize {
    self.len.get()
  }

  fn slot(&self, index: usize) -> NonNull<Slot> {
    let chunk = self.chunks.borrow()[index / CHUNK_SIZE];
    unsafe { NonNull::new_unchecked(chunk.as_ptr().add(index % CHUNK_SIZE)) }
  }

  pub fn push(
    &self,
    isolate: *mut Isolate,
    content: Handled,
    tag: Tag,
  ) -> NonNull<Slot> {
    let index = self.len.get();
    if index == self.chunks.borrow().len() * CHUNK_SIZE {
      let chunk: Box<[Slot]> = (0..CHUNK_SIZE).map(|_| Slot::empty()).collect();
      let ptr = Box::into_raw(chunk) as *mut Slot;
      self
        .chunks
        .borrow_mut()
        .push(unsafe { NonNull::new_unchecked(ptr) });
    }
    self.len.set(index + 1);
    let slot = self.slot(index);
    unsafe { slot.as_ref() }.fill(isolate, content, tag);
    slot
  }

  pub fn truncate(&self, mark: usize) {
    let len = self.len.get();
    assert!(mark <= len, "HandleScope exited out of order");
    for index in mark..len {
      unsafe { self.slot(index).as_ref() }.release();
    }
    self.len.set(mark);
  }

  pub fn trace(&self, tracer: &mut Tracer) {
    for index in 0..self.len.get() {
      unsafe { self.slot(index).as_ref() }.with_content(|c| c.trace(tracer));
    }
  }
}

impl Drop for HandleArena {
  fn drop(&mut self) {
    for chunk in self.chunks.get_mut().drain(..) {
      let slice = std::ptr::slice_from_raw_parts_mut(chunk.as_ptr(), CHUNK_SIZE);
      drop(unsafe { Box::from_raw(slice) });
    }
  }
}

/// An object reference managed by the garbage collector.
///
/// All objects returned from the engine have to be tracked by the garbage
/// collector so that it knows that the objects are still alive. Handles
/// should always be passed by value and they should never be allocated on
/// the heap.
///
/// There are two types of handles: local and persistent handles.
///
/// Local handles are light-weight and transient and typically used in
/// local operations. They are managed by HandleScopes. That means that a
/// HandleScope must exist on the stack when they are created and that they
/// are only valid inside of the `HandleScope` active during their creation.
/// For passing a local handle to an outer `HandleScope`, an
/// `EscapableHandleScope` and its `escape()` method must be used.
///
/// Persistent handles can be used when storing objects across several
/// independent operations and have to be explicitly deallocated when
/// they're no longer used.
///
/// The lifetime `'s` ties a `Local` to the scope that created it, which
/// rules out most misuse at compile time. On top of that every `Local`
/// remembers the generation of the slot it points at; dereferencing a
/// `Local` whose slot has since been released panics instead of reading
/// whatever took its place.
///
/// Note: Local handles differ from the C++ API in that they are never
/// empty. In situations where empty handles are needed, use
/// `Option<Local>`.
pub struct Local<'s, T> {
  ptr: NonNull<T>,
  stamp: u32,
  _phantom: PhantomData<&'s ()>,
}

impl<'s, T> Local<'s, T> {
  /// Construct a new Local from an existing Handle.
  pub fn new(
    scope: &mut HandleScope<'s, ()>,
    handle: impl Handle<Data = T>,
  ) -> Self {
    let HandleInfo { data, host } = handle.get_handle_info();
    host.assert_match_isolate(scope);
    let slot = unsafe { data.cast::<Slot>().as_ref() };
    scope.new_local_with_tag(slot.content(), slot.tag())
  }

  /// Create a local handle by downcasting from one of its super types.
  /// This function is unsafe because the cast is unchecked.
  pub unsafe fn cast<A>(other: Local<'s, A>) -> Self
  where
    Local<'s, A>: From<Self>,
  {
    unsafe { Self::reinterpret(other) }
  }

  /// Unchecked retyping, used by the generated upcasts and checked casts.
  pub(crate) unsafe fn reinterpret<A>(other: Local<'s, A>) -> Self {
    Self {
      ptr: other.ptr.cast(),
      stamp: other.stamp,
      _phantom: PhantomData,
    }
  }

  pub(crate) unsafe fn from_slot(slot: NonNull<Slot>) -> Self {
    Self {
      ptr: slot.cast(),
      stamp: unsafe { slot.as_ref() }.stamp(),
      _phantom: PhantomData,
    }
  }

  pub(crate) fn slot(&self) -> &Slot {
    let slot = unsafe { self.ptr.cast::<Slot>().as_ref() };
    assert!(slot.stamp() == self.stamp, "use of a stale handle");
    slot
  }
}

impl<'s, T> Copy for Local<'s, T> {}

impl<'s, T> Clone for Local<'s, T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<'s, T> Deref for Local<'s, T> {
  type Target = T;
  fn deref(&self) -> &T {
    self.slot();
    unsafe { self.ptr.as_ref() }
  }
}

impl<'s, T> std::fmt::Debug for Local<'s, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let tag = unsafe { self.ptr.cast::<Slot>().as_ref() }.tag();
    f.debug_struct("Local").field("tag", &tag).finish()
  }
}

/// The callback registered with `Weak::with_parameter()`.
pub type WeakCallback = fn(&WeakCallbackInfo);

/// Whether a parameter finalizer also wants the first two aligned-pointer
/// internal fields of the dying object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeakCallbackType {
  Parameter,
  InternalFields,
}

/// What a parameter finalizer gets to see. The object itself is gone by the
/// time the callback runs.
pub struct WeakCallbackInfo {
  isolate: *mut Isolate,
  parameter: *mut c_void,
  internal_fields: [*mut c_void; 2],
}

impl WeakCallbackInfo {
  pub fn get_isolate_ptr(&self) -> *mut Isolate {
    self.isolate
  }

  pub fn get_parameter(&self) -> *mut c_void {
    self.parameter
  }

  /// One of the first two internal fields of the collected object, if it
  /// held an aligned pointer and the finalizer was registered with
  /// `WeakCallbackType::InternalFields`. Null otherwise.
  pub fn get_internal_field(&self, index: usize) -> *mut c_void {
    self.internal_fields.get(index).copied().unwrap_or(null_mut())
  }
}

pub(crate) enum Finalizer {
  Regular(Box<dyn FnOnce(&mut Isolate)>),
  Guaranteed(Box<dyn FnOnce()>),
  Parameter {
    callback: WeakCallback,
    parameter: *mut c_void,
    kind: WeakCallbackType,
  },
}

/// A finalizer whose referent died, waiting for the isolate to reach a safe
/// point.
pub(crate) struct PendingFinalizer {
  finalizer: Finalizer,
  internal_fields: [*mut c_void; 2],
}

impl PendingFinalizer {
  pub(crate) fn run(self, isolate: &mut Isolate) {
    match self.finalizer {
      Finalizer::Regular(f) => f(isolate),
      Finalizer::Guaranteed(f) => f(),
      Finalizer::Parameter {
        callback,
        parameter,
        ..
      } => callback(&WeakCallbackInfo {
        isolate,
        parameter,
        internal_fields: self.internal_fields,
      }),
    }
  }
}

struct Persistent {
  slot: Box<Slot>,
  weak: bool,
  finalizer: Option<Finalizer>,
}

/// Storage for `Global` and `Weak` handles, shared between the isolate and
/// every persistent handle so that handles can be dropped after the isolate
/// is gone.
pub(crate) struct PersistentTable {
  isolate: *mut Isolate,
  entries: Vec<Option<Persistent>>,
  free: Vec<usize>,
  disposed: bool,
}

impl PersistentTable {
  pub fn new(isolate: *mut Isolate) -> Self {
    Self {
      isolate,
      entries: Vec::new(),
      free: Vec::new(),
      disposed: false,
    }
  }

  fn insert(&mut self, content: Handled, tag: Tag, weak: bool) -> usize {
    let slot = Box::new(Slot::empty());
    slot.fill(self.isolate, content, tag);
    let entry = Some(Persistent {
      slot,
      weak,
      finalizer: None,
    });
    match self.free.pop() {
      Some(index) => {
        self.entries[index] = entry;
        index
      }
      None => {
        self.entries.push(entry);
        self.entries.len() - 1
      }
    }
  }

  fn entry(&self, index: usize) -> &Persistent {
    match &self.entries[index] {
      Some(entry) => entry,
      None => unreachable!("persistent handle {index} was released"),
    }
  }

  fn entry_mut(&mut self, index: usize) -> &mut Persistent {
    match &mut self.entries[index] {
      Some(entry) => entry,
      None => unreachable!("persistent handle {index} was released"),
    }
  }

  fn release(&mut self, index: usize) {
    if self.entries[index].take().is_some() {
      self.free.push(index);
    }
  }

  fn slot_ptr(&self, index: usize) -> NonNull<Slot> {
    NonNull::from(&*self.entry(index).slot)
  }

  fn host(&self) -> HandleHost {
    if self.disposed {
      HandleHost::DisposedIsolate
    } else {
      HandleHost::Isolate(self.isolate)
    }
  }

  pub fn trace_strong(&self, tracer: &mut Tracer) {
    for entry in self.entries.iter().flatten() {
      if !entry.weak {
        entry.slot.with_content(|c| c.trace(tracer));
      }
    }
  }

  /// Clears weak handles whose object did not survive marking and hands
  /// back their finalizers. Must run between mark and sweep: aligned
  /// pointers are copied out of the dying objects here.
  pub fn clear_unmarked(&mut self, heap: &Heap) -> Vec<PendingFinalizer> {
    let mut pending = Vec::new();
    for entry in self.entries.iter_mut().flatten() {
      if !entry.weak {
        continue;
      }
      let dead = entry.slot.with_content(|content| match content {
        Handled::Value(JsValue::Object(id)) => Some(*id),
        _ => None,
      });
      let Some(id) = dead.filter(|id| !heap.is_marked(*id)) else {
        continue;
      };
      let mut internal_fields = [null_mut(); 2];
      if let Some(Finalizer::Parameter {
        kind: WeakCallbackType::InternalFields,
        ..
      }) = &entry.finalizer
      {
        let fields = &heap.object(id).internal_fields;
        for (i, field) in internal_fields.iter_mut().enumerate() {
          if let Some(InternalField::Pointer(ptr)) = fields.kinds.get(i) {
            *field = *ptr;
          }
        }
      }
      entry.slot.release();
      if let Some(finalizer) = entry.finalizer.take() {
        pending.push(PendingFinalizer {
          finalizer,
          internal_fields,
        });
      }
    }
    pending
  }

  /// Marks the table as belonging to a disposed isolate and returns the
  /// guaranteed finalizers that never got to run.
  pub fn dispose(&mut self) -> Vec<Box<dyn FnOnce()>> {
    self.disposed = true;
    let mut guaranteed = Vec::new();
    for entry in self.entries.iter_mut().flatten() {
      entry.slot.release();
      if let Some(Finalizer::Guaranteed(f)) = entry.finalizer.take() {
        guaranteed.push(f);
      }
    }
    guaranteed
  }

  /// Strong handles that still refer to something.
  pub fn live_strong_count(&self) -> usize {
    self
      .entries
      .iter()
      .flatten()
      .filter(|entry| !entry.weak && !entry.slot.is_empty())
      .count()
  }
}

/// An object reference that is independent of any handle scope. Where
/// a Local handle only lives as long as the HandleScope in which it was
/// allocated, a global handle remains valid until it is explicitly
/// disposed using `reset()` or dropped.
pub struct Global<T> {
  index: usize,
  table: Rc<RefCell<PersistentTable>>,
  _phantom: PhantomData<T>,
}

impl<T> Global<T> {
  /// Construct a new Global from an existing Handle.
  pub fn new(isolate: &mut Isolate, handle: impl Handle<Data = T>) -> Self {
    let HandleInfo { data, host } = handle.get_handle_info();
    host.assert_match_isolate(isolate);
    let slot = unsafe { data.cast::<Slot>().as_ref() };
    Self::from_content(isolate.persistents(), slot.content(), slot.tag())
  }

  fn from_content(
    table: Rc<RefCell<PersistentTable>>,
    content: Handled,
    tag: Tag,
  ) -> Self {
    let index = table.borrow_mut().insert(content, tag, false);
    Self {
      index,
      table,
      _phantom: PhantomData,
    }
  }

  pub fn open<'a>(&'a self, isolate: &mut Isolate) -> &'a T {
    Handle::open(self, isolate)
  }

  /// Empties the handle. The referent may be collected afterwards; opening
  /// an empty `Global` panics.
  pub fn reset(&mut self) {
    let table = self.table.borrow();
    table.entry(self.index).slot.release();
  }

  pub fn is_empty(&self) -> bool {
    let table = self.table.borrow();
    table.entry(self.index).slot.is_empty()
  }
}

impl<T> Clone for Global<T> {
  fn clone(&self) -> Self {
    let (content, tag) = {
      let table = self.table.borrow();
      let slot = &table.entry(self.index).slot;
      (slot.content(), slot.tag())
    };
    Self::from_content(self.table.clone(), content, tag)
  }
}

impl<T> Drop for Global<T> {
  fn drop(&mut self) {
    self.table.borrow_mut().release(self.index);
  }
}

impl<T> std::fmt::Debug for Global<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Global").field("index", &self.index).finish()
  }
}

/// A weak reference to a heap value. It does not keep its referent alive;
/// once the referent is collected the handle becomes empty and the optional
/// finalizer is queued to run at the next safe point.
pub struct Weak<T> {
  index: Option<usize>,
  table: Rc<RefCell<PersistentTable>>,
  _phantom: PhantomData<T>,
}

impl<T> Weak<T> {
  pub fn new(isolate: &mut Isolate, handle: impl Handle<Data = T>) -> Self {
    Self::with_optional_finalizer(isolate, handle, None)
  }

  /// Create a weak handle with a finalization callback installed.
  ///
  /// There is no guarantee as to *when* or even *if* the finalization
  /// callback will be invoked. The invocation is performed solely on a best
  /// effort basis. It is not called if the `Weak` is dropped or reset
  /// first. The callback runs at a safe point after a collection, so it must
  /// not open new handle scopes.
  pub fn with_finalizer(
    isolate: &mut Isolate,
    handle: impl Handle<Data = T>,
    finalizer: Box<dyn FnOnce(&mut Isolate)>,
  ) -> Self {
    Self::with_optional_finalizer(
      isolate,
      handle,
      Some(Finalizer::Regular(finalizer)),
    )
  }

  /// Like `with_finalizer`, but the finalizer is guaranteed to run exactly
  /// once: either after the referent is collected, or when the isolate is
  /// disposed, whichever comes first. It gets no isolate because it may run
  /// during disposal.
  pub fn with_guaranteed_finalizer(
    isolate: &mut Isolate,
    handle: impl Handle<Data = T>,
    finalizer: Box<dyn FnOnce()>,
  ) -> Self {
    Self::with_optional_finalizer(
      isolate,
      handle,
      Some(Finalizer::Guaranteed(finalizer)),
    )
  }

  /// Installs a finalizer that receives a [`WeakCallbackInfo`] carrying
  /// `parameter` and, for `WeakCallbackType::InternalFields`, the first two
  /// aligned pointers stored in the object's internal fields.
  pub fn with_parameter(
    isolate: &mut Isolate,
    handle: impl Handle<Data = T>,
    parameter: *mut c_void,
    callback: WeakCallback,
    kind: WeakCallbackType,
  ) -> Self {
    Self::with_optional_finalizer(
      isolate,
      handle,
      Some(Finalizer::Parameter {
        callback,
        parameter,
        kind,
      }),
    )
  }

  fn with_optional_finalizer(
    isolate: &mut Isolate,
    handle: impl Handle<Data = T>,
    finalizer: Option<Finalizer>,
  ) -> Self {
    let HandleInfo { data, host } = handle.get_handle_info();
    host.assert_match_isolate(isolate);
    let slot = unsafe { data.cast::<Slot>().as_ref() };
    let table = isolate.persistents();
    let index = {
      let mut table = table.borrow_mut();
      let index = table.insert(slot.content(), slot.tag(), true);
      table.entry_mut(index).finalizer = finalizer;
      index
    };
    Self {
      index: Some(index),
      table,
      _phantom: PhantomData,
    }
  }

  /// Creates a weak handle that refers to nothing.
  pub fn empty(isolate: &mut Isolate) -> Self {
    Self {
      index: None,
      table: isolate.persistents(),
      _phantom: PhantomData,
    }
  }

  /// True once the referent was collected, the handle was reset, or the
  /// isolate was disposed.
  pub fn is_empty(&self) -> bool {
    match self.index {
      Some(index) => self.table.borrow().entry(index).slot.is_empty(),
      None => true,
    }
  }

  /// Empties the handle without running its finalizer.
  pub fn reset(&mut self) {
    if let Some(index) = self.index.take() {
      self.table.borrow_mut().release(index);
    }
  }

  fn live_slot(&self, isolate: &Isolate) -> Option<(Handled, Tag)> {
    let index = self.index?;
    let table = self.table.borrow();
    table
      .host()
      .assert_match_host(HandleHost::Isolate(isolate.as_ptr()));
    let slot = &table.entry(index).slot;
    if slot.is_empty() {
      None
    } else {
      Some((slot.content(), slot.tag()))
    }
  }

  pub fn to_local<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, T>> {
    let (content, tag) = self.live_slot(scope)?;
    Some(scope.new_local_with_tag(content, tag))
  }

  pub fn to_global(&self, isolate: &mut Isolate) -> Option<Global<T>> {
    let (content, tag) = self.live_slot(isolate)?;
    Some(Global::from_content(self.table.clone(), content, tag))
  }
}

impl<T> Clone for Weak<T> {
  /// The clone observes the same referent but carries no finalizer.
  fn clone(&self) -> Self {
    let index = self.index.map(|index| {
      let mut table = self.table.borrow_mut();
      let (content, tag) = {
        let slot = &table.entry(index).slot;
        (slot.content(), slot.tag())
      };
      table.insert(content, tag, true)
    });
    Self {
      index,
      table: self.table.clone(),
      _phantom: PhantomData,
    }
  }
}

impl<T> Drop for Weak<T> {
  fn drop(&mut self) {
    self.reset();
  }
}

impl<T> std::fmt::Debug for Weak<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Weak").field("index", &self.index).finish()
  }
}

pub trait Handle: Sized {
  type Data;

  #[doc(hidden)]
  fn get_handle_info(&self) -> HandleInfo<Self::Data>;

  /// Returns a reference to the heap object that this handle represents.
  /// The handle does not get cloned, nor is it converted to a `Local`
  /// handle.
  ///
  /// # Panics
  ///
  /// This function panics in the following situations:
  /// - The handle is not hosted by the specified Isolate.
  /// - The Isolate that hosts this handle has been disposed.
  /// - The handle is an empty `Global`.
  fn open<'a>(&'a self, isolate: &mut Isolate) -> &'a Self::Data {
    let HandleInfo { data, host } = self.get_handle_info();
    host.assert_match_isolate(isolate);
    unsafe { &*data.as_ptr() }
  }
}

impl<'s, T> Handle for Local<'s, T> {
  type Data = T;
  fn get_handle_info(&self) -> HandleInfo<T> {
    let slot = self.slot();
    HandleInfo::new(self.ptr, HandleHost::Isolate(slot.isolate_ptr()))
  }
}

impl<'a, 's: 'a, T> Handle for &'a Local<'s, T> {
  type Data = T;
  fn get_handle_info(&self) -> HandleInfo<T> {
    (**self).get_handle_info()
  }
}

impl<T> Handle for Global<T> {
  type Data = T;
  fn get_handle_info(&self) -> HandleInfo<T> {
    let table = self.table.borrow();
    let host = table.host();
    if let HandleHost::DisposedIsolate = host {
      panic!("attempt to access Handle hosted by disposed Isolate");
    }
    let slot = table.slot_ptr(self.index);
    assert!(
      !unsafe { slot.as_ref() }.is_empty(),
      "attempt to use an empty Global handle"
    );
    HandleInfo::new(slot.cast(), host)
  }
}

impl<'a, T> Handle for &'a Global<T> {
  type Data = T;
  fn get_handle_info(&self) -> HandleInfo<T> {
    (**self).get_handle_info()
  }
}

impl<'s, T, Rhs: Handle> PartialEq<Rhs> for Local<'s, T> {
  fn eq(&self, other: &Rhs) -> bool {
    handles_eq(self.get_handle_info(), other.get_handle_info())
  }
}

impl<T, Rhs: Handle> PartialEq<Rhs> for Global<T> {
  fn eq(&self, other: &Rhs) -> bool {
    handles_eq(self.get_handle_info(), other.get_handle_info())
  }
}

fn handles_eq<A, B>(a: HandleInfo<A>, b: HandleInfo<B>) -> bool {
  if !a.host.match_host(b.host) {
    return false;
  }
  let a = unsafe { a.data.cast::<Slot>().as_ref() };
  let b = unsafe { b.data.cast::<Slot>().as_ref() };
  a.with_content(|a| b.with_content(|b| a.same_identity(b)))
}

#[derive(Copy, Debug, Clone)]
pub struct HandleInfo<T> {
  data: NonNull<T>,
  host: HandleHost,
}

impl<T> HandleInfo<T> {
  fn new(data: NonNull<T>, host: HandleHost) -> Self {
    Self { data, host }
  }
}

#[derive(Copy, Debug, Clone)]
enum HandleHost {
  Isolate(*mut Isolate),
  DisposedIsolate,
}

impl HandleHost {
  /// Compares two `HandleHost` values, returning `true` if they refer to the
  /// same `Isolate`, or `false` if they refer to different isolates.
  ///
  /// # Panics
  ///
  /// This function panics if one of the `HandleHost` values refers to an
  /// `Isolate` that has been disposed.
  fn match_host(self, other: Self) -> bool {
    match (self, other) {
      (Self::Isolate(ile1), Self::Isolate(ile2)) => ile1 == ile2,
      // Handles hosted in an Isolate that has been disposed aren't good for
      // anything, even if a pair of handles used to be hosted in the same
      // now-disposed isolate.
      (Self::DisposedIsolate, _) | (_, Self::DisposedIsolate) => {
        panic!("attempt to access Handle hosted by disposed Isolate")
      }
    }
  }

  fn assert_match_host(self, other: Self) {
    assert!(
      self.match_host(other),
      "attempt to use Handle in an Isolate that is not its host"
    )
  }

  fn assert_match_isolate(self, isolate: &Isolate) {
    self.assert_match_host(Self::Isolate(isolate.as_ptr()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arena_truncate_bumps_stamps() {
    let arena = HandleArena::new();
    let first = arena.push(null_mut(), Handled::Value(JsValue::Number(1.0)), Tag::NUMBER);
    let mark = arena.len();
    let second = arena.push(null_mut(), Handled::Value(JsValue::Null), Tag::NULL);
    let stamp = unsafe { second.as_ref() }.stamp();
    arena.truncate(mark);
    assert_eq!(arena.len(), 1);
    assert_ne!(unsafe { second.as_ref() }.stamp(), stamp);
    assert!(unsafe { second.as_ref() }.is_empty());
    assert!(matches!(
      unsafe { first.as_ref() }.value(),
      JsValue::Number(n) if n == 1.0
    ));
  }

  #[test]
  fn arena_spans_chunks() {
    let arena = HandleArena::new();
    let slots: Vec<_> = (0..CHUNK_SIZE * 2 + 3)
      .map(|i| arena.push(null_mut(), Handled::Value(JsValue::Number(i as f64)), Tag::NUMBER))
      .collect();
    for (i, slot) in slots.iter().enumerate() {
      match unsafe { slot.as_ref() }.value() {
        JsValue::Number(n) => assert_eq!(n, i as f64),
        _ => panic!("unexpected slot content"),
      }
    }
    arena.truncate(0);
    assert_eq!(arena.len(), 0);
  }

  #[test]
  fn persistent_table_reuses_entries() {
    let mut table = PersistentTable::new(null_mut());
    let a = table.insert(Handled::Value(JsValue::Bool(true)), Tag::BOOLEAN, false);
    let b = table.insert(Handled::Value(JsValue::Null), Tag::NULL, true);
    assert_eq!(table.live_strong_count(), 1);
    table.release(a);
    assert_eq!(table.live_strong_count(), 0);
    let c = table.insert(Handled::Value(JsValue::Undefined), Tag::UNDEFINED, false);
    assert_eq!(a, c);
    assert_ne!(b, c);
    let guaranteed = table.dispose();
    assert!(guaranteed.is_empty());
    assert!(matches!(table.host(), HandleHost::DisposedIsolate));
  }
}
