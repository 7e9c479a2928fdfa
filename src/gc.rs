// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use bitflags::bitflags;

bitflags! {
  /// Applications can register callback functions which will be called
  /// before and after certain garbage collection operations. The collector
  /// is a single-generation mark and sweep, so callbacks only ever see
  /// `MARK_SWEEP_COMPACT`; the other kinds exist so that filters written
  /// against a generational collector keep working.
  #[derive(Debug, Eq, PartialEq, Clone, Copy)]
  pub struct GCType: u32 {
    const SCAVENGE = 1;
    const MINOR_MARK_COMPACT = 2;
    const MARK_SWEEP_COMPACT = 4;
    const INCREMENTAL_MARKING = 8;
    const PROCESS_WEAK_CALLBACKS = 16;
    const ALL = 31;
  }
}

bitflags! {
  /// GCCallbackFlags is used to notify additional information about the GC
  /// callback.
  ///   - FORCED: The GC callback is for a forced GC for testing.
  ///   - COLLECT_ALL_AVAILABLE_GARBAGE: The GC callback is called in a phase
  ///     where the collector is trying to collect all available garbage
  ///     (e.g., handling a low memory notification).
  #[derive(Debug, Eq, PartialEq, Clone, Copy)]
  pub struct GCCallbackFlags: u32 {
    const NO_FLAGS = 0;
    const CONSTRUCT_RETAINED_OBJECT_INFOS = 2;
    const FORCED = 4;
    const SYNCHRONOUS_PHANTOM_CALLBACK_PROCESSING = 8;
    const COLLECT_ALL_AVAILABLE_GARBAGE = 16;
    const COLLECT_ALL_EXTERNAL_MEMORY = 32;
    const SCHEDULE_IDLE_GARBAGE_COLLECTION = 64;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gc_type_filters() {
    assert!(GCType::ALL.contains(GCType::MARK_SWEEP_COMPACT));
    assert!(!GCType::SCAVENGE.intersects(GCType::MARK_SWEEP_COMPACT));
    let flags = GCCallbackFlags::FORCED | GCCallbackFlags::NO_FLAGS;
    assert_eq!(flags, GCCallbackFlags::FORCED);
  }
}
