// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::borrow::Cow;
use std::default::Default;

use bitflags::bitflags;

use crate::engine::value::utf16_len;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::isolate::Isolate;
use crate::script::string_text;
use crate::HandleScope;
use crate::Local;
use crate::String;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NewStringType {
  #[default]
  Normal,
  Internalized,
}

bitflags! {
  #[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
  #[repr(transparent)]
  pub struct WriteOptions: i32 {
    const NO_OPTIONS = 0;
    const HINT_MANY_WRITES_EXPECTED = 1;
    const NO_NULL_TERMINATION = 2;
    const PRESERVE_ONE_BYTE_NULL = 4;
    // Used by WriteUtf8 to replace orphan surrogate code units with the
    // unicode replacement character. Needs to be set to guarantee valid UTF-8
    // output.
    const REPLACE_INVALID_UTF8 = 8;
  }
}

impl String {
  /// The maximum length (in UTF-16 code units) of a string. Attempting to
  /// create a longer string returns `None`.
  pub const MAX_LENGTH: usize = (1 << 29) - 24;

  fn text(&self) -> JsStr {
    string_text(self)
  }

  fn from_text<'s>(
    scope: &mut HandleScope<'s, ()>,
    text: Cow<str>,
  ) -> Option<Local<'s, String>> {
    if utf16_len(&text) > Self::MAX_LENGTH {
      return None;
    }
    Some(scope.value_local(JsValue::String(text.into())))
  }

  pub fn empty<'s>(scope: &mut HandleScope<'s, ()>) -> Local<'s, String> {
    scope.value_local(JsValue::str(""))
  }

  /// Convenience function not present in the original V8 API.
  pub fn new<'s>(
    scope: &mut HandleScope<'s, ()>,
    value: &str,
  ) -> Option<Local<'s, String>> {
    Self::new_from_utf8(scope, value.as_bytes(), NewStringType::Normal)
  }

  /// Allocates a new string from UTF-8 data. Malformed sequences become
  /// U+FFFD. Only returns `None` when the result would be longer than
  /// `MAX_LENGTH`.
  pub fn new_from_utf8<'s>(
    scope: &mut HandleScope<'s, ()>,
    buffer: &[u8],
    _new_type: NewStringType,
  ) -> Option<Local<'s, String>> {
    Self::from_text(scope, std::string::String::from_utf8_lossy(buffer))
  }

  /// Allocates a new string from Latin-1 data.
  pub fn new_from_one_byte<'s>(
    scope: &mut HandleScope<'s, ()>,
    buffer: &[u8],
    _new_type: NewStringType,
  ) -> Option<Local<'s, String>> {
    let text: std::string::String =
      buffer.iter().map(|&byte| byte as char).collect();
    Self::from_text(scope, Cow::Owned(text))
  }

  /// Allocates a new string from UTF-16 data. Unpaired surrogates become
  /// U+FFFD.
  pub fn new_from_two_byte<'s>(
    scope: &mut HandleScope<'s, ()>,
    buffer: &[u16],
    _new_type: NewStringType,
  ) -> Option<Local<'s, String>> {
    let text = std::string::String::from_utf16_lossy(buffer);
    Self::from_text(scope, Cow::Owned(text))
  }

  /// Creates a new string by concatenating the left and the right strings
  /// passed in as parameters.
  pub fn concat<'s>(
    scope: &mut HandleScope<'s, ()>,
    left: Local<String>,
    right: Local<String>,
  ) -> Option<Local<'s, String>> {
    let text = format!("{}{}", left.text(), right.text());
    Self::from_text(scope, Cow::Owned(text))
  }

  /// Returns the number of characters (UTF-16 code units) in this string.
  pub fn length(&self) -> usize {
    utf16_len(&self.text())
  }

  /// Returns the number of bytes in the UTF-8 encoded representation of this
  /// string.
  pub fn utf8_length(&self, _scope: &mut Isolate) -> usize {
    self.text().len()
  }

  /// True if every character fits in Latin-1.
  pub fn contains_only_onebyte(&self) -> bool {
    self.text().chars().all(|c| (c as u32) < 0x100)
  }

  /// Writes the contents of the string to an external buffer, as 16-bit
  /// (UTF-16) character codes, starting at code unit `start`. Returns the
  /// number of code units written.
  pub fn write(
    &self,
    _scope: &mut Isolate,
    buffer: &mut [u16],
    start: usize,
    options: WriteOptions,
  ) -> usize {
    let text = self.text();
    let mut written = 0;
    for (slot, unit) in buffer.iter_mut().zip(text.encode_utf16().skip(start)) {
      *slot = unit;
      written += 1;
    }
    if !options.contains(WriteOptions::NO_NULL_TERMINATION)
      && written < buffer.len()
    {
      buffer[written] = 0;
    }
    written
  }

  /// Writes the contents of the string to an external buffer, as one-byte
  /// (Latin-1) characters. Characters outside Latin-1 are truncated to
  /// their low byte.
  pub fn write_one_byte(
    &self,
    _scope: &mut Isolate,
    buffer: &mut [u8],
    start: usize,
    options: WriteOptions,
  ) -> usize {
    let text = self.text();
    let mut written = 0;
    for (slot, unit) in buffer.iter_mut().zip(text.encode_utf16().skip(start)) {
      *slot = unit as u8;
      written += 1;
    }
    if !options.contains(WriteOptions::NO_NULL_TERMINATION)
      && written < buffer.len()
    {
      buffer[written] = 0;
    }
    written
  }

  /// Writes the contents of the string to an external buffer, as UTF-8.
  /// Only whole characters are written. Returns the number of bytes written
  /// including the terminating NUL, if one fit. The number of characters
  /// written is stored in `nchars_ref`.
  pub fn write_utf8(
    &self,
    _scope: &mut Isolate,
    buffer: &mut [u8],
    nchars_ref: Option<&mut usize>,
    options: WriteOptions,
  ) -> usize {
    let text = self.text();
    let mut position = 0;
    let mut nchars = 0;
    for c in text.chars() {
      let len = c.len_utf8();
      if position + len > buffer.len() {
        break;
      }
      c.encode_utf8(&mut buffer[position..position + len]);
      position += len;
      nchars += c.len_utf16();
    }
    if !options.contains(WriteOptions::NO_NULL_TERMINATION)
      && position < buffer.len()
    {
      buffer[position] = 0;
      position += 1;
    }
    if let Some(nchars_ref) = nchars_ref {
      *nchars_ref = nchars;
    }
    position
  }

  /// Convenience function not present in the original V8 API.
  pub fn to_rust_string_lossy(&self, _scope: &mut Isolate) -> std::string::String {
    self.text().to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::WriteOptions;

  #[test]
  fn write_options_compose() {
    let options =
      WriteOptions::NO_NULL_TERMINATION | WriteOptions::REPLACE_INVALID_UTF8;
    assert!(options.contains(WriteOptions::NO_NULL_TERMINATION));
    assert!(!options.contains(WriteOptions::PRESERVE_ONE_BYTE_NULL));
    assert_eq!(WriteOptions::default(), WriteOptions::NO_OPTIONS);
  }
}
