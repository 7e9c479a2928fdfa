// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use crate::engine::ast::Span;
use crate::engine::error::ErrorKind;
use crate::engine::value::JsStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub(crate) struct ParseError {
  pub message: String,
  pub position: u32,
  /// The error class thrown for this failure.
  pub kind: ErrorKind,
}

impl ParseError {
  pub fn new(message: impl Into<String>, position: u32) -> Self {
    Self {
      message: message.into(),
      position,
      kind: ErrorKind::SyntaxError,
    }
  }

  /// Source nested too deeply for the native stack.
  pub fn stack_overflow(position: u32) -> Self {
    Self {
      message: "Maximum call stack size exceeded".into(),
      position,
      kind: ErrorKind::RangeError,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
  /// Identifiers and keywords alike; the parser decides which is which.
  Ident(JsStr),
  Number(f64),
  /// Decimal digits of a BigInt literal, without the `n` suffix.
  BigInt(String),
  String(JsStr),
  Punct(&'static str),
  Eof,
}

#[derive(Clone, Debug)]
pub(crate) struct Token {
  pub kind: TokenKind,
  pub span: Span,
  pub newline_before: bool,
}

const PUNCTUATORS: &[&str] = &[
  ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=",
  "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=",
  "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "**", "{", "}", "(", ")", "[",
  "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~",
  "?", ":", "=", ".", "@", "#",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
  let mut lexer = Lexer {
    src: source,
    pos: 0,
    tokens: Vec::new(),
  };
  lexer.run()?;
  Ok(lexer.tokens)
}

struct Lexer<'a> {
  src: &'a str,
  pos: usize,
  tokens: Vec<Token>,
}

fn is_line_terminator(c: char) -> bool {
  matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_id_start(c: char) -> bool {
  c == '$' || c == '_' || c.is_alphabetic()
}

fn is_id_part(c: char) -> bool {
  c == '$'
    || c == '_'
    || c.is_alphanumeric()
    || c == '\u{200c}'
    || c == '\u{200d}'
}

impl Lexer<'_> {
  fn peek(&self) -> Option<char> {
    self.src[self.pos..].chars().next()
  }

  fn peek_at(&self, n: usize) -> Option<char> {
    self.src[self.pos..].chars().nth(n)
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    Some(c)
  }

  fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
    Err(ParseError::new(message, self.pos as u32))
  }

  fn run(&mut self) -> Result<(), ParseError> {
    if self.src.starts_with("#!") {
      while let Some(c) = self.peek() {
        if is_line_terminator(c) {
          break;
        }
        self.bump();
      }
    }
    loop {
      let newline_before = self.skip_trivia()?;
      let start = self.pos;
      let Some(c) = self.peek() else {
        self.tokens.push(Token {
          kind: TokenKind::Eof,
          span: Span::new(start as u32, start as u32),
          newline_before: true,
        });
        return Ok(());
      };
      let kind = if is_id_start(c) || c == '\\' {
        self.ident()?
      } else if c.is_ascii_digit()
        || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
      {
        self.number()?
      } else if c == '"' || c == '\'' {
        self.string(c)?
      } else if c == '`' {
        return self.error("Template literals are not supported");
      } else {
        self.punct()?
      };
      self.tokens.push(Token {
        kind,
        span: Span::new(start as u32, self.pos as u32),
        newline_before,
      });
    }
  }

  /// Skips whitespace and comments, reporting whether a line break was seen.
  fn skip_trivia(&mut self) -> Result<bool, ParseError> {
    let mut newline = false;
    while let Some(c) = self.peek() {
      if is_line_terminator(c) {
        newline = true;
        self.bump();
      } else if c.is_whitespace() || c == '\u{feff}' {
        self.bump();
      } else if self.src[self.pos..].starts_with("//") {
        while let Some(c) = self.peek() {
          if is_line_terminator(c) {
            break;
          }
          self.bump();
        }
      } else if self.src[self.pos..].starts_with("/*") {
        let rest = &self.src[self.pos + 2..];
        match rest.find("*/") {
          Some(end) => {
            if rest[..end].chars().any(is_line_terminator) {
              newline = true;
            }
            self.pos += end + 4;
          }
          None => return self.error("Invalid or unexpected token"),
        }
      } else {
        break;
      }
    }
    Ok(newline)
  }

  fn ident(&mut self) -> Result<TokenKind, ParseError> {
    let mut name = String::new();
    while let Some(c) = self.peek() {
      if c == '\\' {
        self.bump();
        if self.bump() != Some('u') {
          return self.error("Invalid Unicode escape sequence");
        }
        match self.unicode_escape()? {
          Some(ch) if is_id_part(ch) => name.push(ch),
          _ => return self.error("Invalid Unicode escape sequence"),
        }
      } else if is_id_part(c) {
        name.push(c);
        self.bump();
      } else {
        break;
      }
    }
    Ok(TokenKind::Ident(name.into()))
  }

  fn digits(&mut self, radix: u32, out: &mut String) {
    while let Some(c) = self.peek() {
      if c == '_' {
        self.bump();
      } else if c.is_digit(radix) {
        out.push(c);
        self.bump();
      } else {
        break;
      }
    }
  }

  fn number(&mut self) -> Result<TokenKind, ParseError> {
    let radix = match (self.peek(), self.peek_at(1)) {
      (Some('0'), Some('x' | 'X')) => 16,
      (Some('0'), Some('o' | 'O')) => 8,
      (Some('0'), Some('b' | 'B')) => 2,
      _ => 10,
    };
    let kind = if radix != 10 {
      self.pos += 2;
      let mut digits = String::new();
      self.digits(radix, &mut digits);
      if digits.is_empty() {
        return self.error("Invalid or unexpected token");
      }
      if self.peek() == Some('n') {
        self.bump();
        let value = num_bigint::BigInt::parse_bytes(digits.as_bytes(), radix)
          .unwrap_or_default();
        TokenKind::BigInt(value.to_string())
      } else {
        let mut value = 0f64;
        for d in digits.chars() {
          value = value * radix as f64 + d.to_digit(radix).unwrap_or(0) as f64;
        }
        TokenKind::Number(value)
      }
    } else {
      let mut text = String::new();
      self.digits(10, &mut text);
      if self.peek() == Some('n') {
        self.bump();
        return Ok(TokenKind::BigInt(text));
      }
      if self.peek() == Some('.') {
        self.bump();
        text.push('.');
        self.digits(10, &mut text);
      }
      if let Some('e' | 'E') = self.peek() {
        let sign = self.peek_at(1);
        let has_exponent = match sign {
          Some('+' | '-') => {
            self.peek_at(2).is_some_and(|c| c.is_ascii_digit())
          }
          Some(c) => c.is_ascii_digit(),
          None => false,
        };
        if has_exponent {
          self.bump();
          text.push('e');
          if let Some(s @ ('+' | '-')) = self.peek() {
            text.push(s);
            self.bump();
          }
          self.digits(10, &mut text);
        }
      }
      if text.starts_with('.') {
        text.insert(0, '0');
      }
      if text.ends_with('.') {
        text.push('0');
      }
      match text.parse::<f64>() {
        Ok(n) => TokenKind::Number(n),
        Err(_) => return self.error("Invalid or unexpected token"),
      }
    };
    if self.peek().is_some_and(|c| is_id_start(c) || c.is_ascii_digit()) {
      return self.error("Invalid or unexpected token");
    }
    Ok(kind)
  }

  fn hex_digits(&mut self, count: usize) -> Result<u32, ParseError> {
    let mut value = 0u32;
    for _ in 0..count {
      match self.bump().and_then(|c| c.to_digit(16)) {
        Some(d) => value = value * 16 + d,
        None => return self.error("Invalid hexadecimal escape sequence"),
      }
    }
    Ok(value)
  }

  /// Parses the part after `\u`. Returns `None` for a lone surrogate.
  fn unicode_escape(&mut self) -> Result<Option<char>, ParseError> {
    let code = if self.peek() == Some('{') {
      self.bump();
      let mut value = 0u32;
      loop {
        match self.bump() {
          Some('}') => break,
          Some(c) => match c.to_digit(16) {
            Some(d) if value <= 0x10ffff => value = value * 16 + d,
            _ => return self.error("Invalid Unicode escape sequence"),
          },
          None => return self.error("Invalid Unicode escape sequence"),
        }
      }
      value
    } else {
      self.hex_digits(4)?
    };
    if (0xd800..0xdc00).contains(&code) && self.src[self.pos..].starts_with(
      "\\u",
    )
    {
      let save = self.pos;
      self.pos += 2;
      let low = self.hex_digits(4)?;
      if (0xdc00..0xe000).contains(&low) {
        let combined = 0x10000 + ((code - 0xd800) << 10) + (low - 0xdc00);
        return Ok(char::from_u32(combined));
      }
      self.pos = save;
    }
    Ok(char::from_u32(code))
  }

  fn string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
    self.bump();
    let mut out = String::new();
    loop {
      let Some(c) = self.bump() else {
        return self.error("Invalid or unexpected token");
      };
      match c {
        c if c == quote => break,
        '\n' | '\r' => return self.error("Invalid or unexpected token"),
        '\\' => {
          let Some(e) = self.bump() else {
            return self.error("Invalid or unexpected token");
          };
          match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => {
              out.push('\0')
            }
            'x' => {
              let code = self.hex_digits(2)?;
              out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => out.push(self.unicode_escape()?.unwrap_or('\u{fffd}')),
            '\r' => {
              if self.peek() == Some('\n') {
                self.bump();
              }
            }
            c if is_line_terminator(c) => {}
            c => out.push(c),
          }
        }
        c => out.push(c),
      }
    }
    Ok(TokenKind::String(out.into()))
  }

  fn punct(&mut self) -> Result<TokenKind, ParseError> {
    let rest = &self.src[self.pos..];
    for p in PUNCTUATORS {
      if rest.starts_with(p) {
        // `a?.5:b` is a conditional, not optional chaining.
        if *p == "?."
          && rest[2..].chars().next().is_some_and(|c| c.is_ascii_digit())
        {
          continue;
        }
        self.pos += p.len();
        return Ok(TokenKind::Punct(p));
      }
    }
    let c = self.peek().unwrap_or(' ');
    self.error(format!("Invalid or unexpected token '{c}'"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
  }

  #[test]
  fn numbers() {
    assert_eq!(
      kinds("1 0x1f .5 1e3 1_000 10n"),
      vec![
        TokenKind::Number(1.0),
        TokenKind::Number(31.0),
        TokenKind::Number(0.5),
        TokenKind::Number(1000.0),
        TokenKind::Number(1000.0),
        TokenKind::BigInt("10".to_string()),
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn strings_and_escapes() {
    assert_eq!(
      kinds(r#"'a\nb' "A\x42" "🦕""#),
      vec![
        TokenKind::String("a\nb".into()),
        TokenKind::String("AB".into()),
        TokenKind::String("\u{1f995}".into()),
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn newline_tracking() {
    let tokens = tokenize("a /* x\n */ b // c\nd").unwrap();
    assert!(!tokens[0].newline_before);
    assert!(tokens[1].newline_before);
    assert!(tokens[2].newline_before);
  }

  #[test]
  fn longest_punctuator_wins() {
    assert_eq!(
      kinds("a >>>= b ?. c ? .5 : d"),
      vec![
        TokenKind::Ident("a".into()),
        TokenKind::Punct(">>>="),
        TokenKind::Ident("b".into()),
        TokenKind::Punct("?."),
        TokenKind::Ident("c".into()),
        TokenKind::Punct("?"),
        TokenKind::Number(0.5),
        TokenKind::Punct(":"),
        TokenKind::Ident("d".into()),
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn unterminated_string_is_an_error() {
    let err = tokenize("'abc").unwrap_err();
    assert_eq!(err.message, "Invalid or unexpected token");
  }
}
