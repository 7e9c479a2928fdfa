// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `JSON.parse` and `JSON.stringify`.

use crate::engine::JsResult;
use crate::engine::conversion::number_to_string;
use crate::engine::error;
use crate::engine::error::ErrorKind;
use crate::engine::object::Attributes;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

/// Where `JSON.parse` gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonError {
  /// Byte offset of a character that cannot appear there.
  UnexpectedToken(usize),
  UnexpectedEnd,
}

fn syntax_error_message(text: &str, e: JsonError) -> String {
  let c = match e {
    JsonError::UnexpectedToken(position) => {
      text.get(position..).and_then(|rest| rest.chars().next())
    }
    JsonError::UnexpectedEnd => None,
  };
  match c {
    Some(c) => format!("Unexpected token '{c}', \"{text}\" is not valid JSON"),
    None => "Unexpected end of JSON input".to_string(),
  }
}

/// An array or object whose closing bracket has not been read yet.
enum Frame {
  Array(Vec<JsValue>),
  Object { object: ObjRef, key: JsStr },
}

/// Scans JSON text. Containers are tracked on an explicit stack by
/// `parse_text`, so nesting depth is bounded by memory only.
struct JsonParser<'a> {
  text: &'a str,
  pos: usize,
}

impl<'a> JsonParser<'a> {
  fn new(text: &'a str) -> Self {
    Self { text, pos: 0 }
  }

  fn peek(&self) -> Option<u8> {
    self.text.as_bytes().get(self.pos).copied()
  }

  fn skip_whitespace(&mut self) {
    while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
      self.pos += 1;
    }
  }

  fn unexpected<T>(&self) -> Result<T, JsonError> {
    match self.peek() {
      Some(_) => Err(JsonError::UnexpectedToken(self.pos)),
      None => Err(JsonError::UnexpectedEnd),
    }
  }

  fn literal(
    &mut self,
    word: &str,
    value: JsValue,
  ) -> Result<JsValue, JsonError> {
    for expected in word.bytes() {
      if self.peek() != Some(expected) {
        return self.unexpected();
      }
      self.pos += 1;
    }
    Ok(value)
  }

  fn digits(&mut self) {
    while matches!(self.peek(), Some(b'0'..=b'9')) {
      self.pos += 1;
    }
  }

  fn number(&mut self) -> Result<f64, JsonError> {
    let start = self.pos;
    if self.peek() == Some(b'-') {
      self.pos += 1;
    }
    match self.peek() {
      Some(b'0') => self.pos += 1,
      Some(b'1'..=b'9') => self.digits(),
      _ => return self.unexpected(),
    }
    if self.peek() == Some(b'.') {
      self.pos += 1;
      if !matches!(self.peek(), Some(b'0'..=b'9')) {
        return self.unexpected();
      }
      self.digits();
    }
    if matches!(self.peek(), Some(b'e' | b'E')) {
      self.pos += 1;
      if matches!(self.peek(), Some(b'+' | b'-')) {
        self.pos += 1;
      }
      if !matches!(self.peek(), Some(b'0'..=b'9')) {
        return self.unexpected();
      }
      self.digits();
    }
    // Magnitudes beyond f64 round to infinity or zero.
    self.text[start..self.pos]
      .parse()
      .map_err(|_| JsonError::UnexpectedToken(start))
  }

  fn hex4(&mut self) -> Result<u32, JsonError> {
    let mut value = 0;
    for _ in 0..4 {
      let Some(digit) = self.peek().and_then(|b| (b as char).to_digit(16))
      else {
        return self.unexpected();
      };
      value = value * 16 + digit;
      self.pos += 1;
    }
    Ok(value)
  }

  /// Joins a surrogate pair written as two escapes. Engine strings are
  /// UTF-8, so an unpaired surrogate becomes U+FFFD.
  fn code_point(&mut self, unit: u32) -> Result<char, JsonError> {
    if (0xd800..0xdc00).contains(&unit) && self.text[self.pos..].starts_with(
      "\\u",
    )
    {
      let save = self.pos;
      self.pos += 2;
      let low = self.hex4()?;
      if (0xdc00..0xe000).contains(&low) {
        let combined = 0x10000 + ((unit - 0xd800) << 10) + (low - 0xdc00);
        return Ok(char::from_u32(combined).unwrap_or('\u{fffd}'));
      }
      self.pos = save;
    }
    Ok(char::from_u32(unit).unwrap_or('\u{fffd}'))
  }

  fn escape(&mut self, out: &mut String) -> Result<(), JsonError> {
    let c = match self.peek() {
      Some(b'"') => '"',
      Some(b'\\') => '\\',
      Some(b'/') => '/',
      Some(b'b') => '\u{8}',
      Some(b'f') => '\u{c}',
      Some(b'n') => '\n',
      Some(b'r') => '\r',
      Some(b't') => '\t',
      Some(b'u') => {
        self.pos += 1;
        let unit = self.hex4()?;
        out.push(self.code_point(unit)?);
        return Ok(());
      }
      _ => return self.unexpected(),
    };
    self.pos += 1;
    out.push(c);
    Ok(())
  }

  fn string(&mut self) -> Result<JsStr, JsonError> {
    if self.peek() != Some(b'"') {
      return self.unexpected();
    }
    self.pos += 1;
    let mut out = String::new();
    loop {
      let run = self.pos;
      while let Some(b) = self.peek() {
        if b == b'"' || b == b'\\' || b < 0x20 {
          break;
        }
        self.pos += 1;
      }
      out.push_str(&self.text[run..self.pos]);
      match self.peek() {
        Some(b'"') => {
          self.pos += 1;
          return Ok(out.into());
        }
        Some(b'\\') => {
          self.pos += 1;
          self.escape(&mut out)?;
        }
        _ => return self.unexpected(),
      }
    }
  }

  /// A member name and the colon after it.
  fn key(&mut self) -> Result<JsStr, JsonError> {
    self.skip_whitespace();
    let key = self.string()?;
    self.skip_whitespace();
    if self.peek() != Some(b':') {
      return self.unexpected();
    }
    self.pos += 1;
    Ok(key)
  }
}

fn parse_text(cx: &mut Isolate, text: &str) -> Result<JsValue, JsonError> {
  let mut parser = JsonParser::new(text);
  let mut stack: Vec<Frame> = Vec::new();
  loop {
    parser.skip_whitespace();
    let mut value = match parser.peek() {
      Some(b'[') => {
        parser.pos += 1;
        parser.skip_whitespace();
        if parser.peek() != Some(b']') {
          stack.push(Frame::Array(Vec::new()));
          continue;
        }
        parser.pos += 1;
        JsValue::Object(ops::new_array(cx, Vec::new()))
      }
      Some(b'{') => {
        parser.pos += 1;
        parser.skip_whitespace();
        let object = ops::new_object(cx);
        if parser.peek() != Some(b'}') {
          let key = parser.key()?;
          stack.push(Frame::Object { object, key });
          continue;
        }
        parser.pos += 1;
        JsValue::Object(object)
      }
      Some(b'"') => JsValue::String(parser.string()?),
      Some(b'-' | b'0'..=b'9') => JsValue::Number(parser.number()?),
      Some(b't') => parser.literal("true", JsValue::Bool(true))?,
      Some(b'f') => parser.literal("false", JsValue::Bool(false))?,
      Some(b'n') => parser.literal("null", JsValue::Null)?,
      _ => return parser.unexpected(),
    };

    // Store the value in its container, closing every container that
    // ends right after it.
    loop {
      parser.skip_whitespace();
      match stack.last_mut() {
        None => {
          return match parser.peek() {
            None => Ok(value),
            Some(_) => parser.unexpected(),
          };
        }
        Some(Frame::Array(items)) => {
          items.push(value);
          match parser.peek() {
            Some(b',') => {
              parser.pos += 1;
              break;
            }
            Some(b']') => {
              parser.pos += 1;
              let items = std::mem::take(items);
              stack.pop();
              value = JsValue::Object(ops::new_array(cx, items));
            }
            _ => return parser.unexpected(),
          }
        }
        Some(Frame::Object { object, key }) => {
          let object = *object;
          ops::define_value(cx, object, key, value, Attributes::DEFAULT);
          match parser.peek() {
            Some(b',') => {
              parser.pos += 1;
              *key = parser.key()?;
              break;
            }
            Some(b'}') => {
              parser.pos += 1;
              stack.pop();
              value = JsValue::Object(object);
            }
            _ => return parser.unexpected(),
          }
        }
      }
    }
  }
}

/// JSON.parse. A callable `reviver` gets to transform every value bottom-up.
pub(crate) fn parse(
  cx: &mut Isolate,
  text: &str,
  reviver: Option<ObjRef>,
) -> JsResult<JsValue> {
  let value = match parse_text(cx, text) {
    Ok(value) => value,
    Err(e) => {
      let message = syntax_error_message(text, e);
      return Err(error::throw_error(cx, ErrorKind::SyntaxError, &message));
    }
  };
  match reviver {
    Some(reviver) => {
      let root = ops::new_object(cx);
      ops::define_value(cx, root, "", value, Attributes::DEFAULT);
      internalize(cx, root, PropertyKey::str(""), reviver)
    }
    None => Ok(value),
  }
}

fn internalize(
  cx: &mut Isolate,
  holder: ObjRef,
  key: PropertyKey,
  reviver: ObjRef,
) -> JsResult<JsValue> {
  ops::check_interrupts(cx)?;
  let value = ops::get(cx, holder, &key)?;
  if let JsValue::Object(object) = value {
    let keys: Vec<PropertyKey> = if ops::is_array(cx, &value) {
      let length = ops::length_of_array_like(cx, object)?;
      (0..length as usize).map(PropertyKey::index).collect()
    } else {
      enumerable_string_keys(cx, object)?
    };
    for key in keys {
      let element = internalize(cx, object, key.clone(), reviver)?;
      if element.is_undefined() {
        ops::delete_property(cx, object, &key)?;
      } else {
        ops::create_data_property(cx, object, key, element)?;
      }
    }
  }
  ops::call_function(
    cx,
    reviver,
    JsValue::Object(holder),
    &[key.to_value(), value],
  )
}

fn enumerable_string_keys(
  cx: &mut Isolate,
  object: ObjRef,
) -> JsResult<Vec<PropertyKey>> {
  let mut keys = Vec::new();
  for key in ops::own_property_keys(cx, object) {
    if matches!(key, PropertyKey::Symbol(_)) {
      continue;
    }
    let property = ops::own_property(cx, object, &key)?;
    if property.is_some_and(|p| p.attrs.enumerable) {
      keys.push(key);
    }
  }
  Ok(keys)
}

struct Serializer {
  replacer: Option<ObjRef>,
  allow_list: Option<Vec<PropertyKey>>,
  gap: String,
  indent: String,
  stack: Vec<ObjRef>,
}

/// The primitive inside a Number, String, Boolean or BigInt wrapper.
fn wrapped_primitive(cx: &Isolate, value: &JsValue) -> Option<JsValue> {
  match &cx.vm.heap.object(value.as_object()?).class {
    ObjectClass::Primitive(inner) => Some(inner.clone()),
    _ => None,
  }
}

pub(crate) fn quote(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// JSON.stringify. Returns `None` when the value has no JSON
/// representation (`undefined`, functions, symbols).
pub(crate) fn stringify(
  cx: &mut Isolate,
  value: &JsValue,
  replacer: &JsValue,
  space: &JsValue,
) -> JsResult<Option<JsStr>> {
  let mut serializer = Serializer {
    replacer: None,
    allow_list: None,
    gap: String::new(),
    indent: String::new(),
    stack: Vec::new(),
  };
  if let JsValue::Object(id) = replacer {
    if cx.vm.heap.object(*id).is_callable() {
      serializer.replacer = Some(*id);
    } else if ops::is_array(cx, replacer) {
      let mut list: Vec<PropertyKey> = Vec::new();
      for item in ops::array_like_to_list(cx, *id)? {
        let key = match (&item, wrapped_primitive(cx, &item)) {
          (JsValue::String(_) | JsValue::Number(_), _) => {
            Some(ops::to_property_key(cx, &item)?)
          }
          (_, Some(JsValue::String(_) | JsValue::Number(_))) => {
            Some(PropertyKey::String(ops::to_string(cx, &item)?))
          }
          _ => None,
        };
        if let Some(key) = key {
          if !list.contains(&key) {
            list.push(key);
          }
        }
      }
      serializer.allow_list = Some(list);
    }
  }
  let space = match wrapped_primitive(cx, space) {
    Some(JsValue::Number(_)) => JsValue::Number(ops::to_number(cx, space)?),
    Some(JsValue::String(_)) => JsValue::String(ops::to_string(cx, space)?),
    _ => space.clone(),
  };
  serializer.gap = match &space {
    JsValue::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
    JsValue::String(s) => s.chars().take(10).collect(),
    _ => String::new(),
  };

  let wrapper = ops::new_object(cx);
  ops::define_value(cx, wrapper, "", value.clone(), Attributes::DEFAULT);
  let result = serializer.property(cx, wrapper, PropertyKey::str(""))?;
  Ok(result.map(Into::into))
}

impl Serializer {
  fn property(
    &mut self,
    cx: &mut Isolate,
    holder: ObjRef,
    key: PropertyKey,
  ) -> JsResult<Option<String>> {
    let mut value = ops::get(cx, holder, &key)?;
    if matches!(value, JsValue::Object(_) | JsValue::BigInt(_)) {
      let to_json = ops::get_value(cx, &value, &PropertyKey::str("toJSON"))?;
      if ops::is_callable(cx, &to_json) {
        value = ops::call(cx, &to_json, value.clone(), &[key.to_value()])?;
      }
    }
    if let Some(replacer) = self.replacer {
      value = ops::call_function(
        cx,
        replacer,
        JsValue::Object(holder),
        &[key.to_value(), value],
      )?;
    }
    value = match wrapped_primitive(cx, &value) {
      Some(JsValue::Number(_)) => JsValue::Number(ops::to_number(cx, &value)?),
      Some(JsValue::String(_)) => JsValue::String(ops::to_string(cx, &value)?),
      Some(inner @ (JsValue::Bool(_) | JsValue::BigInt(_))) => inner,
      _ => value,
    };
    match &value {
      JsValue::Null => Ok(Some("null".into())),
      JsValue::Bool(b) => Ok(Some(b.to_string())),
      JsValue::String(s) => Ok(Some(quote(s))),
      JsValue::Number(n) if n.is_finite() => Ok(Some(number_to_string(*n))),
      JsValue::Number(_) => Ok(Some("null".into())),
      JsValue::BigInt(_) => {
        Err(error::type_error(cx, "Do not know how to serialize a BigInt"))
      }
      JsValue::Object(id) if !cx.vm.heap.object(*id).is_callable() => {
        let id = *id;
        if ops::is_array(cx, &value) {
          self.array(cx, id).map(Some)
        } else {
          self.object(cx, id).map(Some)
        }
      }
      _ => Ok(None),
    }
  }

  fn enter(&mut self, cx: &mut Isolate, id: ObjRef) -> JsResult<()> {
    ops::check_interrupts(cx)?;
    if self.stack.contains(&id) {
      return Err(error::type_error(
        cx,
        "Converting circular structure to JSON",
      ));
    }
    self.stack.push(id);
    Ok(())
  }

  fn wrap(
    &self,
    open: char,
    close: char,
    parts: Vec<String>,
    stepback: &str,
  ) -> String {
    if parts.is_empty() {
      return format!("{open}{close}");
    }
    if self.gap.is_empty() {
      format!("{open}{}{close}", parts.join(","))
    } else {
      let separator = format!(",\n{}", self.indent);
      format!(
        "{open}\n{}{}\n{stepback}{close}",
        self.indent,
        parts.join(&separator)
      )
    }
  }

  fn object(&mut self, cx: &mut Isolate, id: ObjRef) -> JsResult<String> {
    self.enter(cx, id)?;
    let stepback = self.indent.clone();
    self.indent.push_str(&self.gap);
    let keys = match &self.allow_list {
      Some(list) => list.clone(),
      None => enumerable_string_keys(cx, id)?,
    };
    let mut parts = Vec::new();
    for key in keys {
      if let Some(value) = self.property(cx, id, key.clone())? {
        let colon = if self.gap.is_empty() { ":" } else { ": " };
        parts.push(format!("{}{colon}{value}", quote(&key.to_string())));
      }
    }
    let result = self.wrap('{', '}', parts, &stepback);
    self.stack.pop();
    self.indent = stepback;
    Ok(result)
  }

  fn array(&mut self, cx: &mut Isolate, id: ObjRef) -> JsResult<String> {
    self.enter(cx, id)?;
    let stepback = self.indent.clone();
    self.indent.push_str(&self.gap);
    let length = ops::length_of_array_like(cx, id)?;
    let mut parts = Vec::with_capacity(length as usize);
    for index in 0..length as usize {
      let part = self.property(cx, id, PropertyKey::index(index))?;
      parts.push(part.unwrap_or_else(|| "null".into()));
    }
    let result = self.wrap('[', ']', parts, &stepback);
    self.stack.pop();
    self.indent = stepback;
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quoting_escapes_control_characters() {
    assert_eq!(quote("a\"b"), r#""a\"b""#);
    assert_eq!(quote("line\nbreak"), r#""line\nbreak""#);
    assert_eq!(quote("\u{1}"), r#""\u0001""#);
  }

  #[test]
  fn parse_errors_point_at_the_offending_token() {
    let text = r#"{"a":}"#;
    assert_eq!(
      syntax_error_message(text, JsonError::UnexpectedToken(5)),
      r#"Unexpected token '}', "{"a":}" is not valid JSON"#
    );
    assert_eq!(
      syntax_error_message("[1,", JsonError::UnexpectedEnd),
      "Unexpected end of JSON input"
    );
  }

  #[test]
  fn numbers_follow_the_json_grammar() {
    let number = |text: &str| JsonParser::new(text).number();
    assert_eq!(number("-12.5e1"), Ok(-125.0));
    assert_eq!(number("1e400"), Ok(f64::INFINITY));
    assert_eq!(number("-1e400"), Ok(f64::NEG_INFINITY));
    assert_eq!(number("1e-400"), Ok(0.0));
    assert!(number("-0").is_ok_and(|n| n == 0.0 && n.is_sign_negative()));
    assert_eq!(number("1."), Err(JsonError::UnexpectedEnd));
    assert_eq!(number("-x"), Err(JsonError::UnexpectedToken(1)));

    let mut parser = JsonParser::new("012");
    assert_eq!(parser.number(), Ok(0.0));
    assert_eq!(parser.pos, 1);
  }

  #[test]
  fn string_escapes() {
    let string = |text: &str| JsonParser::new(text)
      .string()
      .map(|s| s.to_string());
    assert_eq!(string(r#""a\"b\n\u0041""#).unwrap(), "a\"b\nA");
    assert_eq!(string(r#""\ud83d\ude00""#).unwrap(), "\u{1f600}");
    assert_eq!(string(r#""\ud800""#).unwrap(), "\u{fffd}");
    assert_eq!(string(r#""\udc00x""#).unwrap(), "\u{fffd}x");
    assert_eq!(string(r#""\ud800\u0041""#).unwrap(), "\u{fffd}A");
    assert_eq!(string("\"tab\there\""), Err(JsonError::UnexpectedToken(4)));
    assert_eq!(string(r#""\x""#), Err(JsonError::UnexpectedToken(2)));
    assert_eq!(string(r#""open"#), Err(JsonError::UnexpectedEnd));
  }
}
