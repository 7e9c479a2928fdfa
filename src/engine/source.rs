// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::value::JsValue;

/// Source text plus the origin it was compiled with.
pub(crate) struct SourceInfo {
  pub text: std::rc::Rc<str>,
  pub resource_name: JsValue,
  pub source_map_url: JsValue,
  pub host_defined_options: JsValue,
  pub script_id: i32,
  pub line_offset: i32,
  pub column_offset: i32,
  pub shared_cross_origin: bool,
  pub opaque: bool,
  pub is_wasm: bool,
  pub is_module: bool,
  line_starts: Vec<u32>,
}

/// Zero-based line and column of a source position, offsets applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Location {
  pub line: i32,
  pub column: i32,
}

impl SourceInfo {
  pub fn new(text: std::rc::Rc<str>, script_id: i32) -> Self {
    let mut line_starts = vec![0];
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
      match bytes[i] {
        b'\n' => line_starts.push(i as u32 + 1),
        b'\r' if bytes.get(i + 1) != Some(&b'\n') => {
          line_starts.push(i as u32 + 1)
        }
        // U+2028 and U+2029 are line terminators too.
        0xe2 if bytes.get(i + 1) == Some(&0x80)
          && matches!(bytes.get(i + 2), Some(0xa8 | 0xa9)) =>
        {
          line_starts.push(i as u32 + 3);
          i += 2;
        }
        _ => {}
      }
      i += 1;
    }
    Self {
      text,
      resource_name: JsValue::Undefined,
      source_map_url: JsValue::Undefined,
      host_defined_options: JsValue::Undefined,
      script_id,
      line_offset: 0,
      column_offset: 0,
      shared_cross_origin: false,
      opaque: false,
      is_wasm: false,
      is_module: false,
      line_starts,
    }
  }

  fn line_index(&self, position: u32) -> usize {
    match self.line_starts.binary_search(&position) {
      Ok(i) => i,
      Err(i) => i - 1,
    }
  }

  pub fn location(&self, position: u32) -> Location {
    let position = position.min(self.text.len() as u32);
    let index = self.line_index(position);
    let start = self.line_starts[index] as usize;
    let column = self
      .text
      .get(start..position as usize)
      .map(|prefix| prefix.encode_utf16().count())
      .unwrap_or(0) as i32;
    let column = if index == 0 {
      column + self.column_offset
    } else {
      column
    };
    Location {
      line: index as i32 + self.line_offset,
      column,
    }
  }

  /// The full text of the line containing `position`, terminator excluded.
  pub fn source_line(&self, position: u32) -> &str {
    let index = self.line_index(position.min(self.text.len() as u32));
    let start = self.line_starts[index] as usize;
    let end = self
      .line_starts
      .get(index + 1)
      .map(|&e| e as usize)
      .unwrap_or(self.text.len());
    self
      .text
      .get(start..end)
      .unwrap_or("")
      .trim_end_matches(['\n', '\r', '\u{2028}', '\u{2029}'])
  }

  /// Byte offset of the start of a zero-based line (offsets not applied).
  pub fn line_start(&self, line: usize) -> Option<u32> {
    self.line_starts.get(line).copied()
  }
}

impl Trace for std::rc::Rc<SourceInfo> {
  fn trace(&self, tracer: &mut Tracer) {
    tracer.visit_value(&self.resource_name);
    tracer.visit_value(&self.source_map_url);
    tracer.visit_value(&self.host_defined_options);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn locations_apply_offsets() {
    let mut info = SourceInfo::new("a\nbc\r\nd".into(), 1);
    assert_eq!(info.location(0), Location { line: 0, column: 0 });
    assert_eq!(info.location(3), Location { line: 1, column: 1 });
    assert_eq!(info.location(6), Location { line: 2, column: 0 });
    info.line_offset = 10;
    info.column_offset = 4;
    assert_eq!(info.location(0), Location { line: 10, column: 4 });
    assert_eq!(info.location(6), Location { line: 12, column: 0 });
    assert_eq!(info.source_line(3), "bc");
  }
}
