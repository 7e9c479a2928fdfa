// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Primitive conversions that never call back into script.

/// Number::toString(10). Shortest round-tripping digits laid out the way
/// JavaScript prints them (`1e+21`, `1.5e-7`, `0.000001`).
pub(crate) fn number_to_string(n: f64) -> String {
  let mut buffer = ryu_js::Buffer::new();
  buffer.format(n).to_string()
}

/// Number::toString(radix) for radix != 10.
pub(crate) fn number_to_radix_string(n: f64, radix: u32) -> String {
  if n.is_nan() {
    return "NaN".into();
  }
  if n.is_infinite() {
    return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
  }
  if n == 0.0 {
    return "0".into();
  }
  let negative = n < 0.0;
  let n = n.abs();
  let mut int_part = n.trunc();
  let mut frac_part = n - int_part;

  let mut digits = Vec::new();
  if int_part == 0.0 {
    digits.push(b'0');
  }
  while int_part >= 1.0 {
    let d = (int_part % radix as f64) as u32;
    digits.push(std::char::from_digit(d, radix).unwrap_or('0') as u8);
    int_part = (int_part / radix as f64).trunc();
  }
  digits.reverse();
  let mut out = String::from_utf8(digits).unwrap_or_default();

  if frac_part > 0.0 {
    out.push('.');
    // 52 bits of mantissa never need more than this many digits in base 2.
    let mut remaining = 52;
    while frac_part > 0.0 && remaining > 0 {
      frac_part *= radix as f64;
      let d = frac_part.trunc() as u32;
      out.push(std::char::from_digit(d, radix).unwrap_or('0'));
      frac_part -= d as f64;
      remaining -= 1;
    }
  }
  if negative {
    out.insert(0, '-');
  }
  out
}

fn is_js_whitespace(c: char) -> bool {
  matches!(
    c,
    '\u{9}'
      | '\u{a}'
      | '\u{b}'
      | '\u{c}'
      | '\u{d}'
      | ' '
      | '\u{a0}'
      | '\u{1680}'
      | '\u{2000}'..='\u{200a}'
      | '\u{2028}'
      | '\u{2029}'
      | '\u{202f}'
      | '\u{205f}'
      | '\u{3000}'
      | '\u{feff}'
  )
}

pub(crate) fn trim_js_whitespace(s: &str) -> &str {
  s.trim_matches(is_js_whitespace)
}

pub(crate) fn trim_js_whitespace_start(s: &str) -> &str {
  s.trim_start_matches(is_js_whitespace)
}

pub(crate) fn trim_js_whitespace_end(s: &str) -> &str {
  s.trim_end_matches(is_js_whitespace)
}

/// ToNumber applied to a string.
pub(crate) fn string_to_number(s: &str) -> f64 {
  let s = trim_js_whitespace(s);
  if s.is_empty() {
    return 0.0;
  }
  for (prefix, radix) in [
    ("0x", 16),
    ("0X", 16),
    ("0o", 8),
    ("0O", 8),
    ("0b", 2),
    ("0B", 2),
  ] {
    if let Some(digits) = s.strip_prefix(prefix) {
      if digits.is_empty() {
        return f64::NAN;
      }
      let mut value = 0f64;
      for c in digits.chars() {
        match c.to_digit(radix) {
          Some(d) => value = value * radix as f64 + d as f64,
          None => return f64::NAN,
        }
      }
      return value;
    }
  }
  let (sign, body) = match s.as_bytes()[0] {
    b'-' => (-1.0, &s[1..]),
    b'+' => (1.0, &s[1..]),
    _ => (1.0, s),
  };
  if body == "Infinity" {
    return sign * f64::INFINITY;
  }
  match decimal_literal_len(body) {
    Some(len) if len == body.len() => {
      body.parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN)
    }
    _ => f64::NAN,
  }
}

/// Length of the longest prefix of `s` that is a StrUnsignedDecimalLiteral
/// (without `Infinity`).
pub(crate) fn decimal_literal_len(s: &str) -> Option<usize> {
  let bytes = s.as_bytes();
  let mut i = 0;
  let int_start = i;
  while i < bytes.len() && bytes[i].is_ascii_digit() {
    i += 1;
  }
  let mut has_digits = i > int_start;
  if i < bytes.len() && bytes[i] == b'.' {
    let frac_start = i + 1;
    let mut j = frac_start;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
      j += 1;
    }
    if j > frac_start || has_digits {
      has_digits = true;
      i = j;
    }
  }
  if !has_digits {
    return None;
  }
  if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
    let mut j = i + 1;
    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
      j += 1;
    }
    let exp_start = j;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
      j += 1;
    }
    if j > exp_start {
      i = j;
    }
  }
  Some(i)
}

/// The `parseFloat` prefix scan.
pub(crate) fn parse_float_prefix(s: &str) -> f64 {
  let s = trim_js_whitespace_start(s);
  let (sign, body) = match s.as_bytes().first() {
    Some(b'-') => (-1.0, &s[1..]),
    Some(b'+') => (1.0, &s[1..]),
    _ => (1.0, s),
  };
  if body.starts_with("Infinity") {
    return sign * f64::INFINITY;
  }
  match decimal_literal_len(body) {
    Some(len) => {
      let mut text = body[..len].to_string();
      if text.ends_with('.') {
        text.push('0');
      }
      if text.starts_with('.') {
        text.insert(0, '0');
      }
      text.parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN)
    }
    None => f64::NAN,
  }
}

/// The `parseInt` algorithm. A radix of 0 means "detect".
pub(crate) fn parse_int(s: &str, radix: i32) -> f64 {
  let s = trim_js_whitespace_start(s);
  let (sign, mut body) = match s.as_bytes().first() {
    Some(b'-') => (-1.0, &s[1..]),
    Some(b'+') => (1.0, &s[1..]),
    _ => (1.0, s),
  };
  let mut radix = radix;
  let mut strip_prefix = true;
  if radix != 0 {
    if !(2..=36).contains(&radix) {
      return f64::NAN;
    }
    if radix != 16 {
      strip_prefix = false;
    }
  } else {
    radix = 10;
  }
  if strip_prefix && (body.starts_with("0x") || body.starts_with("0X")) {
    body = &body[2..];
    radix = 16;
  }
  let mut value = 0f64;
  let mut any = false;
  for c in body.chars() {
    match c.to_digit(radix as u32) {
      Some(d) => {
        value = value * radix as f64 + d as f64;
        any = true;
      }
      None => break,
    }
  }
  if !any {
    return f64::NAN;
  }
  sign * value
}

/// ToInt32 on an already computed number.
pub(crate) fn f64_to_int32(n: f64) -> i32 {
  f64_to_uint32(n) as i32
}

/// ToUint32 on an already computed number.
pub(crate) fn f64_to_uint32(n: f64) -> u32 {
  if !n.is_finite() {
    return 0;
  }
  let m = n.trunc().rem_euclid(4294967296.0);
  m as u32
}

/// ToIntegerOrInfinity on an already computed number.
pub(crate) fn f64_to_integer(n: f64) -> f64 {
  if n.is_nan() {
    0.0
  } else if n.is_infinite() {
    n
  } else {
    n.trunc() + 0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_number_strings() {
    assert_eq!(number_to_string(3.14), "3.14");
    assert_eq!(number_to_string(2.0), "2");
    assert_eq!(number_to_string(-0.0), "0");
    assert_eq!(number_to_string(1e21), "1e+21");
    assert_eq!(
      number_to_string(123456789012345680000.0),
      "123456789012345680000",
    );
    assert_eq!(number_to_string(0.000001), "0.000001");
    assert_eq!(number_to_string(1e-7), "1e-7");
    assert_eq!(number_to_string(f64::NAN), "NaN");
    assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
  }

  #[test]
  fn radix_strings() {
    assert_eq!(number_to_radix_string(255.0, 16), "ff");
    assert_eq!(number_to_radix_string(-8.0, 2), "-1000");
    assert_eq!(number_to_radix_string(0.5, 2), "0.1");
  }

  #[test]
  fn strings_to_numbers() {
    assert_eq!(string_to_number("  42  "), 42.0);
    assert_eq!(string_to_number(""), 0.0);
    assert_eq!(string_to_number("0x10"), 16.0);
    assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
    assert_eq!(string_to_number("1e3"), 1000.0);
    assert_eq!(string_to_number(".5"), 0.5);
    assert!(string_to_number("12px").is_nan());
    assert!(string_to_number("inf").is_nan());
    assert!(string_to_number("-0x10").is_nan());
  }

  #[test]
  fn parse_int_and_float() {
    assert_eq!(parse_int("  12px", 0), 12.0);
    assert_eq!(parse_int("0x1A", 0), 26.0);
    assert_eq!(parse_int("-101", 2), -5.0);
    assert!(parse_int("z", 10).is_nan());
    assert_eq!(parse_float_prefix("3.25abc"), 3.25);
    assert_eq!(parse_float_prefix("-.5"), -0.5);
    assert!(parse_float_prefix("abc").is_nan());
  }

  #[test]
  fn int32_truncation() {
    assert_eq!(f64_to_int32(4294967297.0), 1);
    assert_eq!(f64_to_int32(2147483648.0), -2147483648);
    assert_eq!(f64_to_int32(-1.5), -1);
    assert_eq!(f64_to_uint32(-1.0), 4294967295);
    assert_eq!(f64_to_int32(f64::NAN), 0);
    assert_eq!(f64_to_uint32(f64::INFINITY), 0);
  }
}
