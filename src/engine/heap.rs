// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Non-moving cell store with mark/sweep collection.
//!
//! Cells are addressed by [`HeapId`], an index plus the generation of the
//! slot at allocation time. A freed slot bumps its generation, so an id that
//! outlived its cell is detected instead of aliasing a newer allocation.

use crate::engine::env::Env;
use crate::engine::object::JsObject;
use crate::engine::value::JsValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct HeapId {
  index: u32,
  generation: u32,
}

impl HeapId {
  pub fn index(self) -> u32 {
    self.index
  }
}

pub(crate) enum Cell {
  Object(JsObject),
  Env(Env),
}

impl Cell {
  fn trace(&self, tracer: &mut Tracer) {
    match self {
      Cell::Object(object) => object.trace(tracer),
      Cell::Env(env) => env.trace(tracer),
    }
  }
}

pub(crate) trait Trace {
  fn trace(&self, tracer: &mut Tracer);
}

impl Trace for JsValue {
  fn trace(&self, tracer: &mut Tracer) {
    tracer.visit_value(self);
  }
}

impl<T: Trace> Trace for Option<T> {
  fn trace(&self, tracer: &mut Tracer) {
    if let Some(inner) = self {
      inner.trace(tracer);
    }
  }
}

impl<T: Trace> Trace for Vec<T> {
  fn trace(&self, tracer: &mut Tracer) {
    for item in self {
      item.trace(tracer);
    }
  }
}

impl Trace for HeapId {
  fn trace(&self, tracer: &mut Tracer) {
    tracer.visit(*self);
  }
}

/// Mark phase worklist.
#[derive(Default)]
pub(crate) struct Tracer {
  worklist: Vec<HeapId>,
}

impl Tracer {
  pub fn visit(&mut self, id: HeapId) {
    self.worklist.push(id);
  }

  pub fn visit_value(&mut self, value: &JsValue) {
    if let JsValue::Object(id) = value {
      self.worklist.push(*id);
    }
  }

  pub fn visit_all<'a>(
    &mut self,
    values: impl IntoIterator<Item = &'a JsValue>,
  ) {
    for value in values {
      self.visit_value(value);
    }
  }
}

struct Slot {
  generation: u32,
  marked: bool,
  cell: Option<Cell>,
}

/// Statistics about the last collection cycle.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CollectionStats {
  pub live: usize,
  pub freed: usize,
}

pub(crate) struct Heap {
  slots: Vec<Slot>,
  free_list: Vec<u32>,
  live: usize,
  allocated_since_gc: usize,
  gc_threshold: usize,
  max_cells: usize,
  gc_runs: u64,
}

/// Rough per-cell footprint used for heap statistics and limits.
pub(crate) const CELL_SIZE: usize = std::mem::size_of::<Slot>() + 64;

impl Heap {
  pub fn new(initial_bytes: usize, max_bytes: usize) -> Self {
    Self {
      slots: Vec::new(),
      free_list: Vec::new(),
      live: 0,
      allocated_since_gc: 0,
      gc_threshold: (initial_bytes / CELL_SIZE).max(1024),
      max_cells: max_bytes / CELL_SIZE,
      gc_runs: 0,
    }
  }

  pub fn alloc(&mut self, cell: Cell) -> HeapId {
    self.live += 1;
    self.allocated_since_gc += 1;
    if let Some(index) = self.free_list.pop() {
      let slot = &mut self.slots[index as usize];
      debug_assert!(slot.cell.is_none());
      slot.cell = Some(cell);
      return HeapId {
        index,
        generation: slot.generation,
      };
    }
    let index = self.slots.len() as u32;
    self.slots.push(Slot {
      generation: 0,
      marked: false,
      cell: Some(cell),
    });
    HeapId {
      index,
      generation: 0,
    }
  }

  pub fn is_live(&self, id: HeapId) -> bool {
    self
      .slots
      .get(id.index as usize)
      .is_some_and(|slot| {
        slot.generation == id.generation && slot.cell.is_some()
      })
  }

  pub fn get(&self, id: HeapId) -> &Cell {
    match self.slots.get(id.index as usize) {
      Some(Slot {
        generation,
        cell: Some(cell),
        ..
      }) if *generation == id.generation => cell,
      _ => panic!("heap cell {id:?} was collected while still referenced"),
    }
  }

  pub fn get_mut(&mut self, id: HeapId) -> &mut Cell {
    match self.slots.get_mut(id.index as usize) {
      Some(Slot {
        generation,
        cell: Some(cell),
        ..
      }) if *generation == id.generation => cell,
      _ => panic!("heap cell {id:?} was collected while still referenced"),
    }
  }

  pub fn object(&self, id: HeapId) -> &JsObject {
    match self.get(id) {
      Cell::Object(object) => object,
      Cell::Env(_) => panic!("heap cell {id:?} is not an object"),
    }
  }

  pub fn object_mut(&mut self, id: HeapId) -> &mut JsObject {
    match self.get_mut(id) {
      Cell::Object(object) => object,
      Cell::Env(_) => panic!("heap cell {id:?} is not an object"),
    }
  }

  pub fn env(&self, id: HeapId) -> &Env {
    match self.get(id) {
      Cell::Env(env) => env,
      Cell::Object(_) => panic!("heap cell {id:?} is not an environment"),
    }
  }

  pub fn env_mut(&mut self, id: HeapId) -> &mut Env {
    match self.get_mut(id) {
      Cell::Env(env) => env,
      Cell::Object(_) => panic!("heap cell {id:?} is not an environment"),
    }
  }

  pub fn live_cells(&self) -> usize {
    self.live
  }

  pub fn capacity_cells(&self) -> usize {
    self.slots.len()
  }

  pub fn gc_runs(&self) -> u64 {
    self.gc_runs
  }

  pub fn max_cells(&self) -> usize {
    self.max_cells
  }

  pub fn set_limits(&mut self, initial_bytes: usize, max_bytes: usize) {
    self.gc_threshold = (initial_bytes / CELL_SIZE).max(1024);
    self.max_cells = max_bytes / CELL_SIZE;
  }

  /// True once enough has been allocated since the last cycle that the
  /// next safe point should collect.
  pub fn wants_collection(&self) -> bool {
    self.allocated_since_gc >= self.gc_threshold
  }

  pub fn over_limit(&self) -> bool {
    self.max_cells != 0 && self.live > self.max_cells
  }

  /// Marks everything reachable from the tracer's worklist. After this,
  /// [`Heap::is_marked`] tells which cells survive the coming sweep.
  pub fn mark(&mut self, mut tracer: Tracer) {
    while let Some(id) = tracer.worklist.pop() {
      let Some(slot) = self.slots.get_mut(id.index as usize) else {
        continue;
      };
      if slot.generation != id.generation
        || slot.marked
        || slot.cell.is_none()
      {
        continue;
      }
      slot.marked = true;
      if let Some(cell) = &slot.cell {
        cell.trace(&mut tracer);
      }
    }
  }

  pub fn is_marked(&self, id: HeapId) -> bool {
    self
      .slots
      .get(id.index as usize)
      .is_some_and(|slot| slot.generation == id.generation && slot.marked)
  }

  /// Frees every unmarked cell and clears the mark bits.
  pub fn sweep(&mut self) -> CollectionStats {
    let mut freed = 0;
    for (index, slot) in self.slots.iter_mut().enumerate() {
      if slot.cell.is_none() {
        continue;
      }
      if slot.marked {
        slot.marked = false;
        continue;
      }
      slot.cell = None;
      slot.generation = slot.generation.wrapping_add(1);
      self.free_list.push(index as u32);
      freed += 1;
    }
    self.live -= freed;
    self.allocated_since_gc = 0;
    self.gc_runs += 1;
    CollectionStats {
      live: self.live,
      freed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::object::JsObject;

  fn object(heap: &mut Heap) -> HeapId {
    heap.alloc(Cell::Object(JsObject::ordinary(
      None,
      crate::engine::ContextId(0),
    )))
  }

  #[test]
  fn unreachable_cells_are_freed() {
    let mut heap = Heap::new(0, 0);
    let kept = object(&mut heap);
    let dropped = object(&mut heap);
    let mut tracer = Tracer::default();
    tracer.visit(kept);
    heap.mark(tracer);
    assert!(heap.is_marked(kept));
    assert!(!heap.is_marked(dropped));
    let stats = heap.sweep();
    assert_eq!(stats.freed, 1);
    assert_eq!(stats.live, 1);
    assert!(heap.is_live(kept));
    assert!(!heap.is_live(dropped));
  }

  #[test]
  fn reused_slots_get_a_new_generation() {
    let mut heap = Heap::new(0, 0);
    let first = object(&mut heap);
    heap.mark(Tracer::default());
    heap.sweep();
    let second = object(&mut heap);
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert!(!heap.is_live(first));
  }

  #[test]
  fn marking_follows_references() {
    let mut heap = Heap::new(0, 0);
    let child = object(&mut heap);
    let parent = heap.alloc(Cell::Object(JsObject::ordinary(
      Some(child),
      crate::engine::ContextId(0),
    )));
    let mut tracer = Tracer::default();
    tracer.visit(parent);
    heap.mark(tracer);
    assert_eq!(heap.sweep().freed, 0);
  }
}
