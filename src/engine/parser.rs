// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Recursive descent parser for the script and module grammar the engine
//! supports. Declarations are hoisted while parsing so the interpreter can set
//! up each scope in one step.

use std::rc::Rc;

use num_bigint::BigInt;

use crate::engine::ast::*;
use crate::engine::conversion::number_to_string;
use crate::engine::lexer::ParseError;
use crate::engine::lexer::Token;
use crate::engine::lexer::TokenKind;
use crate::engine::lexer::tokenize;
use crate::engine::value::JsStr;

type PResult<T> = Result<T, ParseError>;

const RESERVED: &[&str] = &[
  "break", "case", "catch", "class", "const", "continue", "debugger",
  "default", "delete", "do", "else", "enum", "export", "extends", "false",
  "finally", "for", "function", "if", "import", "in", "instanceof", "new",
  "null", "return", "super", "switch", "this", "throw", "true", "try",
  "typeof", "var", "void", "while", "with",
];

const STRICT_RESERVED: &[&str] = &[
  "implements", "interface", "let", "package", "private", "protected", "public",
  "static", "yield",
];

/// How much native stack the parser may use below `base`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StackBudget {
  base: usize,
  limit: usize,
}

impl StackBudget {
  /// A budget of `limit` bytes measured from `base`, or from the caller's
  /// frame when `base` is zero.
  pub fn new(base: usize, limit: usize) -> Self {
    let base = if base == 0 { stack_address() } else { base };
    Self { base, limit }
  }

  fn exhausted(&self) -> bool {
    self.base.saturating_sub(stack_address()) > self.limit
  }
}

#[inline(never)]
fn stack_address() -> usize {
  let marker = 0u8;
  std::hint::black_box(&marker) as *const u8 as usize
}

pub(crate) fn parse_script(
  source: &str,
  strict: bool,
  stack: StackBudget,
) -> PResult<Program> {
  let mut parser = Parser::new(source, strict, false, stack)?;
  parser.program()
}

pub(crate) fn parse_module(
  source: &str,
  stack: StackBudget,
) -> PResult<Program> {
  let mut parser = Parser::new(source, true, true, stack)?;
  parser.program()
}

#[derive(Default)]
struct BlockCollector {
  lexical: Vec<LexicalDecl>,
  functions: Vec<Rc<FunctionNode>>,
  /// The top-level block of a function body hoists functions to the
  /// function scope instead.
  function_top: bool,
}

#[derive(Default)]
struct FunctionCtx {
  scope: FunctionScope,
  is_arrow: bool,
  uses_arguments: bool,
  strict: bool,
  in_iteration: u32,
  in_breakable: u32,
  labels: Vec<JsStr>,
  is_program: bool,
}

struct Parser<'a> {
  source: &'a str,
  tokens: Vec<Token>,
  pos: usize,
  functions: Vec<FunctionCtx>,
  blocks: Vec<BlockCollector>,
  is_module: bool,
  module: ModuleInfo,
  /// Set while parsing the init clause of a `for` statement.
  no_in: bool,
  stack: StackBudget,
  /// For each opening bracket token, the index of its closing bracket.
  brackets: Vec<Option<usize>>,
}

fn bracket_pairs(tokens: &[Token]) -> Vec<Option<usize>> {
  let mut pairs = vec![None; tokens.len()];
  let mut open = Vec::new();
  for (i, token) in tokens.iter().enumerate() {
    match token.kind {
      TokenKind::Punct("(" | "[" | "{") => open.push(i),
      TokenKind::Punct(")" | "]" | "}") => {
        if let Some(start) = open.pop() {
          pairs[start] = Some(i);
        }
      }
      _ => {}
    }
  }
  pairs
}

impl<'a> Parser<'a> {
  fn new(
    source: &'a str,
    strict: bool,
    is_module: bool,
    stack: StackBudget,
  ) -> PResult<Self> {
    let tokens = tokenize(source)?;
    Ok(Self {
      source,
      brackets: bracket_pairs(&tokens),
      tokens,
      pos: 0,
      functions: vec![FunctionCtx {
        strict,
        is_program: true,
        ..Default::default()
      }],
      blocks: vec![BlockCollector {
        function_top: true,
        ..Default::default()
      }],
      is_module,
      module: ModuleInfo::default(),
      no_in: false,
      stack,
    })
  }

  // Token helpers.

  fn peek(&self) -> &Token {
    &self.tokens[self.pos.min(self.tokens.len() - 1)]
  }

  fn peek_kind_at(&self, offset: usize) -> &TokenKind {
    let i = (self.pos + offset).min(self.tokens.len() - 1);
    &self.tokens[i].kind
  }

  fn advance(&mut self) -> Token {
    let token = self.peek().clone();
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
    token
  }

  fn prev_end(&self) -> u32 {
    if self.pos == 0 {
      0
    } else {
      self.tokens[self.pos - 1].span.end
    }
  }

  fn start(&self) -> u32 {
    self.peek().span.start
  }

  fn span_from(&self, start: u32) -> Span {
    Span::new(start, self.prev_end().max(start))
  }

  fn is_punct(&self, p: &str) -> bool {
    matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
  }

  fn is_keyword(&self, kw: &str) -> bool {
    matches!(&self.peek().kind, TokenKind::Ident(name) if &**name == kw)
  }

  fn eat_punct(&mut self, p: &str) -> bool {
    if self.is_punct(p) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn eat_keyword(&mut self, kw: &str) -> bool {
    if self.is_keyword(kw) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect_punct(&mut self, p: &str) -> PResult<()> {
    if self.eat_punct(p) {
      Ok(())
    } else {
      self.unexpected()
    }
  }

  fn expect_keyword(&mut self, kw: &str) -> PResult<()> {
    if self.eat_keyword(kw) {
      Ok(())
    } else {
      self.unexpected()
    }
  }

  fn unexpected<T>(&self) -> PResult<T> {
    let token = self.peek();
    let message = match &token.kind {
      TokenKind::Eof => "Unexpected end of input".to_string(),
      TokenKind::Ident(name) if RESERVED.contains(&&**name) => {
        format!("Unexpected token '{name}'")
      }
      TokenKind::Ident(name)
        if self.strict() && STRICT_RESERVED.contains(&&**name) =>
      {
        "Unexpected strict mode reserved word".to_string()
      }
      TokenKind::Ident(name) => format!("Unexpected identifier '{name}'"),
      TokenKind::Number(_) | TokenKind::BigInt(_) => {
        "Unexpected number".to_string()
      }
      TokenKind::String(_) => "Unexpected string".to_string(),
      TokenKind::Punct(p) => format!("Unexpected token '{p}'"),
    };
    Err(ParseError::new(message, token.span.start))
  }

  fn error_at<T>(
    &self,
    message: impl Into<String>,
    position: u32,
  ) -> PResult<T> {
    Err(ParseError::new(message, position))
  }

  /// Guards every recursive production so deeply nested source fails
  /// with a `RangeError` instead of overflowing the native stack.
  fn check_stack(&self) -> PResult<()> {
    if self.stack.exhausted() {
      return Err(ParseError::stack_overflow(self.start()));
    }
    Ok(())
  }

  fn consume_semicolon(&mut self) -> PResult<()> {
    if self.eat_punct(";") {
      return Ok(());
    }
    let token = self.peek();
    if token.newline_before
      || matches!(token.kind, TokenKind::Eof | TokenKind::Punct("}"))
    {
      Ok(())
    } else {
      self.unexpected()
    }
  }

  fn strict(&self) -> bool {
    self.functions.last().is_some_and(|f| f.strict)
  }

  fn function_ctx(&mut self) -> &mut FunctionCtx {
    let last = self.functions.len() - 1;
    &mut self.functions[last]
  }

  fn binding_identifier(&mut self) -> PResult<JsStr> {
    let token = self.peek().clone();
    match &token.kind {
      TokenKind::Ident(name) => {
        if RESERVED.contains(&&**name)
          || (self.strict() && STRICT_RESERVED.contains(&&**name))
        {
          return self.unexpected();
        }
        if self.strict() && (&**name == "eval" || &**name == "arguments") {
          return self
            .error_at(
              "Unexpected eval or arguments in strict mode",
              token.span.start,
            );
        }
        self.advance();
        Ok(name.clone())
      }
      _ => self.unexpected(),
    }
  }

  /// Any IdentifierName, keywords included (property names).
  fn identifier_name(&mut self) -> PResult<JsStr> {
    match &self.peek().kind {
      TokenKind::Ident(name) => {
        let name = name.clone();
        self.advance();
        Ok(name)
      }
      _ => self.unexpected(),
    }
  }

  // Scope bookkeeping.

  fn declare_var(&mut self, name: &JsStr) {
    let scope = &mut self.function_ctx().scope;
    if !scope.var_names.contains(name) {
      scope.var_names.push(name.clone());
    }
  }

  fn declare_lexical(
    &mut self,
    name: &JsStr,
    is_const: bool,
    at: u32,
  ) -> PResult<()> {
    let Some(block) = self.blocks.last_mut() else {
      return Ok(());
    };
    if block.lexical.iter().any(|d| &d.name == name) {
      return self.error_at(
        format!("Identifier '{name}' has already been declared"),
        at,
      );
    }
    block.lexical.push(LexicalDecl {
      name: name.clone(),
      is_const,
    });
    Ok(())
  }

  fn declare_function(&mut self, node: Rc<FunctionNode>) {
    let name = node
      .name
      .clone()
      .unwrap_or_else(|| DEFAULT_EXPORT_BINDING.into());
    let top = self.blocks.last().is_some_and(|b| b.function_top);
    if top {
      self.declare_var(&name);
      let scope = &mut self.function_ctx().scope;
      scope.functions.retain(|f| f.name != node.name);
      scope.functions.push(node);
    } else if let Some(block) = self.blocks.last_mut() {
      block.functions.push(node);
    }
  }

  fn with_block<T>(
    &mut self,
    f: impl FnOnce(&mut Self) -> PResult<T>,
  ) -> PResult<(T, BlockCollector)> {
    self.blocks.push(BlockCollector::default());
    let result = f(self);
    let block = self.blocks.pop().unwrap_or_default();
    Ok((result?, block))
  }

  fn has_use_strict_directive(&self) -> bool {
    let mut i = self.pos;
    while let TokenKind::String(s) = &self.tokens[i].kind {
      let raw = &self.source
        [self.tokens[i].span.start as usize + 1..self.tokens[i].span.end as usize - 1];
      if &**s == "use strict" && raw == "use strict" {
        return true;
      }
      i += 1;
      match &self.tokens[i].kind {
        TokenKind::Punct(";") => i += 1,
        _ if self.tokens[i].newline_before => {}
        _ => return false,
      }
    }
    false
  }

  // Programs.

  fn program(&mut self) -> PResult<Program> {
    if self.has_use_strict_directive() {
      self.function_ctx().strict = true;
    }
    let mut body = Vec::new();
    while !matches!(self.peek().kind, TokenKind::Eof) {
      body.push(self.statement_list_item(true)?);
    }
    let ctx = self.functions.pop().unwrap_or_default();
    let block = self.blocks.pop().unwrap_or_default();
    let module = if self.is_module {
      Some(std::mem::take(&mut self.module))
    } else {
      None
    };
    Ok(Program {
      body,
      strict: ctx.strict,
      scope: ctx.scope,
      lexical: block.lexical,
      module,
    })
  }

  fn statement_list_item(&mut self, top_level: bool) -> PResult<Stmt> {
    let start = self.start();
    if self.is_keyword("import")
      && !matches!(self.peek_kind_at(1), TokenKind::Punct("(" | "."))
    {
      if !(self.is_module && top_level) {
        return self
          .error_at("Cannot use import statement outside a module", start);
      }
      return self.import_declaration();
    }
    if self.is_keyword("export") {
      if !(self.is_module && top_level) {
        return self.unexpected();
      }
      return self.export_declaration();
    }
    if self.is_keyword("function") {
      let node = self.function(false, true)?;
      self.declare_function(node.clone());
      return Ok(Stmt {
        kind: StmtKind::FunctionDecl(node),
        span: self.span_from(start),
      });
    }
    if self.is_keyword("let") || self.is_keyword("const") {
      return self.lexical_declaration();
    }
    if self.is_keyword("class") {
      return self.error_at("Classes are not supported", start);
    }
    self.statement()
  }

  fn lexical_declaration(&mut self) -> PResult<Stmt> {
    let start = self.start();
    let kind = if self.eat_keyword("let") {
      VarKind::Let
    } else {
      self.expect_keyword("const")?;
      VarKind::Const
    };
    let decls = self.declarators(kind)?;
    self.consume_semicolon()?;
    Ok(Stmt {
      kind: StmtKind::Var(kind, decls),
      span: self.span_from(start),
    })
  }

  fn declarators(&mut self, kind: VarKind) -> PResult<Vec<VarDeclarator>> {
    let mut decls = Vec::new();
    loop {
      let start = self.start();
      let name = self.binding_identifier()?;
      match kind {
        VarKind::Var => self.declare_var(&name),
        VarKind::Let => self.declare_lexical(&name, false, start)?,
        VarKind::Const => self.declare_lexical(&name, true, start)?,
      }
      let init = if self.eat_punct("=") {
        Some(self.assignment()?)
      } else {
        None
      };
      if kind == VarKind::Const && init.is_none() && !self.is_for_in_of_head() {
        return self.error_at("Missing initializer in const declaration", start);
      }
      decls.push(VarDeclarator {
        name,
        init,
        span: self.span_from(start),
      });
      if !self.eat_punct(",") {
        break;
      }
    }
    Ok(decls)
  }

  fn is_for_in_of_head(&self) -> bool {
    self.no_in && (self.is_keyword("in") || self.is_keyword("of"))
  }

  // Statements.

  fn statement(&mut self) -> PResult<Stmt> {
    self.check_stack()?;
    let start = self.start();
    let token = self.peek().clone();
    let kind = match &token.kind {
      TokenKind::Punct("{") => StmtKind::Block(self.block()?),
      TokenKind::Punct(";") => {
        self.advance();
        StmtKind::Empty
      }
      TokenKind::Ident(name) => match &**name {
        "var" => {
          self.advance();
          let decls = self.declarators(VarKind::Var)?;
          self.consume_semicolon()?;
          StmtKind::Var(VarKind::Var, decls)
        }
        "if" => self.if_statement()?,
        "while" => {
          self.advance();
          self.expect_punct("(")?;
          let test = self.expression()?;
          self.expect_punct(")")?;
          let body = self.loop_body()?;
          StmtKind::While(test, Box::new(body))
        }
        "do" => {
          self.advance();
          let body = self.loop_body()?;
          self.expect_keyword("while")?;
          self.expect_punct("(")?;
          let test = self.expression()?;
          self.expect_punct(")")?;
          self.eat_punct(";");
          StmtKind::DoWhile(Box::new(body), test)
        }
        "for" => self.for_statement()?,
        "return" => {
          self.advance();
          if self.functions.len() == 1 {
            return self.error_at("Illegal return statement", start);
          }
          let arg = if self.is_punct(";")
            || self.is_punct("}")
            || self.peek().newline_before
            || matches!(self.peek().kind, TokenKind::Eof)
          {
            None
          } else {
            Some(self.expression()?)
          };
          self.consume_semicolon()?;
          StmtKind::Return(arg)
        }
        "break" | "continue" => {
          let is_break = &**name == "break";
          self.advance();
          let label = match &self.peek().kind {
            TokenKind::Ident(l)
              if !self.peek().newline_before && !RESERVED.contains(&&**l) =>
            {
              let l = l.clone();
              if !self.function_ctx().labels.contains(&l) {
                return self.error_at(
                  format!("Undefined label '{l}'"),
                  self.start(),
                );
              }
              self.advance();
              Some(l)
            }
            _ => None,
          };
          let ctx = self.function_ctx();
          if label.is_none() {
            if is_break && ctx.in_breakable == 0 {
              return self.error_at("Illegal break statement", start);
            }
            if !is_break && ctx.in_iteration == 0 {
              return self.error_at(
                "Illegal continue statement: no surrounding iteration statement",
                start,
              );
            }
          }
          self.consume_semicolon()?;
          if is_break {
            StmtKind::Break(label)
          } else {
            StmtKind::Continue(label)
          }
        }
        "throw" => {
          self.advance();
          if self.peek().newline_before {
            return self.error_at("Illegal newline after throw", self.start());
          }
          let arg = self.expression()?;
          self.consume_semicolon()?;
          StmtKind::Throw(arg)
        }
        "try" => self.try_statement()?,
        "switch" => self.switch_statement()?,
        "debugger" => {
          self.advance();
          self.consume_semicolon()?;
          StmtKind::Debugger
        }
        "function" => {
          return self.error_at(
            "In strict mode code, functions can only be declared at top level or inside a block.",
            start,
          );
        }
        "let" | "const" | "class" => return self.unexpected(),
        "with" => {
          return self.error_at(
            "Strict mode code may not include a with statement",
            start,
          );
        }
        _ if matches!(self.peek_kind_at(1), TokenKind::Punct(":"))
          && !RESERVED.contains(&&**name) =>
        {
          let label = name.clone();
          self.advance();
          self.advance();
          self.function_ctx().labels.push(label.clone());
          let body = self.statement();
          self.function_ctx().labels.pop();
          StmtKind::Labeled(label, Box::new(body?))
        }
        _ => self.expression_statement()?,
      },
      _ => self.expression_statement()?,
    };
    Ok(Stmt {
      kind,
      span: self.span_from(start),
    })
  }

  fn expression_statement(&mut self) -> PResult<StmtKind> {
    let expr = self.expression()?;
    self.consume_semicolon()?;
    Ok(StmtKind::Expr(expr))
  }

  fn block(&mut self) -> PResult<Block> {
    self.expect_punct("{")?;
    let (body, collector) = self.with_block(|p| {
      let mut body = Vec::new();
      while !p.is_punct("}") {
        if matches!(p.peek().kind, TokenKind::Eof) {
          return p.unexpected();
        }
        body.push(p.statement_list_item(false)?);
      }
      Ok(body)
    })?;
    self.expect_punct("}")?;
    Ok(Block {
      body,
      lexical: collector.lexical,
      functions: collector.functions,
    })
  }

  fn if_statement(&mut self) -> PResult<StmtKind> {
    self.advance();
    self.expect_punct("(")?;
    let test = self.expression()?;
    self.expect_punct(")")?;
    let cons = self.sub_statement()?;
    let alt = if self.eat_keyword("else") {
      Some(Box::new(self.sub_statement()?))
    } else {
      None
    };
    Ok(StmtKind::If(test, Box::new(cons), alt))
  }

  /// The body of `if`/loops. A bare function declaration here is only
  /// allowed in sloppy mode, where it acts like it was wrapped in a block.
  fn sub_statement(&mut self) -> PResult<Stmt> {
    if self.is_keyword("function") && !self.strict() {
      let start = self.start();
      let (stmt, collector) = self.with_block(|p| {
        let node = p.function(false, true)?;
        p.declare_function(node.clone());
        Ok(Stmt {
          kind: StmtKind::FunctionDecl(node),
          span: p.span_from(start),
        })
      })?;
      return Ok(Stmt {
        kind: StmtKind::Block(Block {
          body: vec![stmt],
          lexical: collector.lexical,
          functions: collector.functions,
        }),
        span: self.span_from(start),
      });
    }
    self.statement()
  }

  fn loop_body(&mut self) -> PResult<Stmt> {
    let ctx = self.function_ctx();
    ctx.in_iteration += 1;
    ctx.in_breakable += 1;
    let body = self.sub_statement();
    let ctx = self.function_ctx();
    ctx.in_iteration -= 1;
    ctx.in_breakable -= 1;
    body
  }

  fn for_statement(&mut self) -> PResult<StmtKind> {
    let start = self.start();
    self.advance();
    if self.is_keyword("await") {
      return self.error_at("for await is not supported", start);
    }
    self.expect_punct("(")?;

    // Lexical declarations in the head get their own scope; collect them
    // into a throwaway block so they do not leak into the enclosing one.
    let (result, _head_block) = self.with_block(|p| p.for_rest())?;
    Ok(result)
  }

  fn for_rest(&mut self) -> PResult<StmtKind> {
    let init_start = self.start();
    let mut init = None;
    if self.eat_punct(";") {
      // No init clause.
    } else {
      let decl_kind = if self.is_keyword("var") {
        Some(VarKind::Var)
      } else if self.is_keyword("let")
        && matches!(self.peek_kind_at(1), TokenKind::Ident(_))
      {
        Some(VarKind::Let)
      } else if self.is_keyword("const") {
        Some(VarKind::Const)
      } else {
        None
      };
      self.no_in = true;
      let head = match decl_kind {
        Some(kind) => {
          self.advance();
          self.declarators(kind).map(|d| ForInit::Var(kind, d))
        }
        None => self.expression().map(ForInit::Expr),
      };
      self.no_in = false;
      let head = head?;

      let is_in = self.is_keyword("in");
      let is_of = self.is_keyword("of");
      if is_in || is_of {
        self.advance();
        let binding = match head {
          ForInit::Var(kind, mut decls) => {
            if decls.len() != 1 || decls[0].init.is_some() {
              return self.error_at(
                "Invalid left-hand side in for-in loop: Must have a single binding.",
                init_start,
              );
            }
            ForBinding::Decl(kind, decls.remove(0).name)
          }
          ForInit::Expr(expr) => {
            if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member(..)) {
              return self
                .error_at("Invalid left-hand side in for-loop", init_start);
            }
            ForBinding::Target(expr)
          }
        };
        let right = if is_of {
          self.assignment()?
        } else {
          self.expression()?
        };
        self.expect_punct(")")?;
        let body = Box::new(self.loop_body()?);
        return Ok(if is_of {
          StmtKind::ForOf(binding, right, body)
        } else {
          StmtKind::ForIn(binding, right, body)
        });
      }
      self.expect_punct(";")?;
      init = Some(head);
    }
    let test = if self.is_punct(";") {
      None
    } else {
      Some(self.expression()?)
    };
    self.expect_punct(";")?;
    let update = if self.is_punct(")") {
      None
    } else {
      Some(self.expression()?)
    };
    self.expect_punct(")")?;
    let body = Box::new(self.loop_body()?);
    Ok(StmtKind::For {
      init,
      test,
      update,
      body,
    })
  }

  fn try_statement(&mut self) -> PResult<StmtKind> {
    let start = self.start();
    self.advance();
    let block = self.block()?;
    let handler = if self.eat_keyword("catch") {
      let param = if self.eat_punct("(") {
        let name = self.binding_identifier()?;
        self.expect_punct(")")?;
        Some(name)
      } else {
        None
      };
      Some(CatchClause {
        param,
        body: self.block()?,
      })
    } else {
      None
    };
    let finalizer = if self.eat_keyword("finally") {
      Some(self.block()?)
    } else {
      None
    };
    if handler.is_none() && finalizer.is_none() {
      return self.error_at("Missing catch or finally after try", start);
    }
    Ok(StmtKind::Try {
      block,
      handler,
      finalizer,
    })
  }

  fn switch_statement(&mut self) -> PResult<StmtKind> {
    self.advance();
    self.expect_punct("(")?;
    let discriminant = self.expression()?;
    self.expect_punct(")")?;
    self.expect_punct("{")?;
    self.function_ctx().in_breakable += 1;
    let result = self.with_block(|p| {
      let mut cases = Vec::new();
      let mut seen_default = false;
      while !p.eat_punct("}") {
        let test = if p.eat_keyword("case") {
          Some(p.expression()?)
        } else if p.is_keyword("default") {
          if seen_default {
            return p.error_at(
              "More than one default clause in switch statement",
              p.start(),
            );
          }
          seen_default = true;
          p.advance();
          None
        } else {
          return p.unexpected();
        };
        p.expect_punct(":")?;
        let mut body = Vec::new();
        while !(p.is_keyword("case") || p.is_keyword("default") || p.is_punct(
          "}",
        )) {
          if matches!(p.peek().kind, TokenKind::Eof) {
            return p.unexpected();
          }
          body.push(p.statement_list_item(false)?);
        }
        cases.push(SwitchCase { test, body });
      }
      Ok(cases)
    });
    self.function_ctx().in_breakable -= 1;
    let (cases, collector) = result?;
    Ok(StmtKind::Switch {
      discriminant,
      cases,
      lexical: collector.lexical,
      functions: collector.functions,
    })
  }

  // Functions.

  /// Parses `function name(params) { body }`. The `function` keyword is
  /// the current token.
  fn function(
    &mut self,
    is_expression: bool,
    require_name: bool,
  ) -> PResult<Rc<FunctionNode>> {
    let start = self.start();
    self.expect_keyword("function")?;
    if self.is_punct("*") {
      return self.error_at("Generators are not supported", self.start());
    }
    let name = if matches!(self.peek().kind, TokenKind::Ident(_)) {
      Some(self.binding_identifier()?)
    } else if require_name {
      return self.unexpected();
    } else {
      None
    };
    let binds_own_name = is_expression && name.is_some();
    self.function_rest(start, name, binds_own_name)
  }

  fn function_rest(
    &mut self,
    start: u32,
    name: Option<JsStr>,
    binds_own_name: bool,
  ) -> PResult<Rc<FunctionNode>> {
    self.expect_punct("(")?;
    let mut params = Vec::new();
    while !self.eat_punct(")") {
      if self.is_punct("...") || self.is_punct("{") || self.is_punct("[") {
        return self.error_at(
          "Only simple parameter lists are supported",
          self.start(),
        );
      }
      params.push(self.binding_identifier()?);
      if self.eat_punct("=") {
        return self.error_at(
          "Default parameters are not supported",
          self.prev_end(),
        );
      }
      if !self.is_punct(")") {
        self.expect_punct(",")?;
      }
    }
    self.function_body(start, name, params, binds_own_name, false)
  }

  fn function_body(
    &mut self,
    start: u32,
    name: Option<JsStr>,
    params: Vec<JsStr>,
    binds_own_name: bool,
    is_arrow: bool,
  ) -> PResult<Rc<FunctionNode>> {
    let outer_strict = self.strict();
    self.functions.push(FunctionCtx {
      strict: outer_strict,
      is_arrow,
      ..Default::default()
    });
    self.blocks.push(BlockCollector {
      function_top: true,
      ..Default::default()
    });
    let no_in = std::mem::replace(&mut self.no_in, false);
    let result = (|| {
      if !is_arrow || self.is_punct("{") {
        self.expect_punct("{")?;
        if self.has_use_strict_directive() {
          self.function_ctx().strict = true;
        }
        let mut body = Vec::new();
        while !self.is_punct("}") {
          if matches!(self.peek().kind, TokenKind::Eof) {
            return self.unexpected();
          }
          body.push(self.statement_list_item(false)?);
        }
        self.expect_punct("}")?;
        Ok(FunctionBody::Block(body))
      } else {
        Ok(FunctionBody::Expression(Box::new(self.assignment()?)))
      }
    })();
    self.no_in = no_in;
    let block = self.blocks.pop().unwrap_or_default();
    let ctx = self.functions.pop().unwrap_or_default();
    let body = result?;
    if ctx.uses_arguments && is_arrow {
      self.mark_arguments();
    }
    if ctx.strict {
      for p in &params {
        if &**p == "eval" || &**p == "arguments" {
          return self.error_at(
            "Unexpected eval or arguments in strict mode",
            start,
          );
        }
      }
    }
    Ok(Rc::new(FunctionNode {
      name,
      params,
      body,
      is_arrow,
      binds_own_name,
      strict: ctx.strict,
      uses_arguments: ctx.uses_arguments && !is_arrow,
      scope: ctx.scope,
      lexical: block.lexical,
      span: self.span_from(start),
    }))
  }

  fn mark_arguments(&mut self) {
    if let Some(ctx) = self.functions.last_mut() {
      if !ctx.is_program {
        ctx.uses_arguments = true;
      }
    }
  }

  // Expressions.

  fn expression(&mut self) -> PResult<Expr> {
    let start = self.start();
    let first = self.assignment()?;
    if !self.is_punct(",") {
      return Ok(first);
    }
    let mut exprs = vec![first];
    while self.eat_punct(",") {
      exprs.push(self.assignment()?);
    }
    Ok(Expr {
      kind: ExprKind::Sequence(exprs),
      span: self.span_from(start),
    })
  }

  fn matching_paren(&self, open: usize) -> Option<usize> {
    self.brackets.get(open).copied().flatten()
  }

  fn is_arrow_ahead(&self) -> bool {
    match &self.peek().kind {
      TokenKind::Ident(name) if !RESERVED.contains(&&**name) => {
        let next = &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)];
        matches!(next.kind, TokenKind::Punct("=>")) && !next.newline_before
      }
      TokenKind::Punct("(") => match self.matching_paren(self.pos) {
        Some(close) => {
          let next = &self.tokens[(close + 1).min(self.tokens.len() - 1)];
          matches!(next.kind, TokenKind::Punct("=>")) && !next.newline_before
        }
        None => false,
      },
      _ => false,
    }
  }

  fn arrow_function(&mut self) -> PResult<Expr> {
    let start = self.start();
    let mut params = Vec::new();
    if self.eat_punct("(") {
      while !self.eat_punct(")") {
        if !matches!(self.peek().kind, TokenKind::Ident(_)) {
          return self.error_at(
            "Only simple parameter lists are supported",
            self.start(),
          );
        }
        params.push(self.binding_identifier()?);
        if !self.is_punct(")") {
          self.expect_punct(",")?;
        }
      }
    } else {
      params.push(self.binding_identifier()?);
    }
    self.expect_punct("=>")?;
    let node = self.function_body(start, None, params, false, true)?;
    Ok(Expr {
      kind: ExprKind::Function(node),
      span: self.span_from(start),
    })
  }

  fn assignment(&mut self) -> PResult<Expr> {
    self.check_stack()?;
    if self.is_arrow_ahead() {
      return self.arrow_function();
    }
    let start = self.start();
    let target = self.conditional()?;
    let op = match &self.peek().kind {
      TokenKind::Punct(p) => match *p {
        "=" => Some(AssignOp::Assign),
        "+=" => Some(AssignOp::Compound(BinaryOp::Add)),
        "-=" => Some(AssignOp::Compound(BinaryOp::Sub)),
        "*=" => Some(AssignOp::Compound(BinaryOp::Mul)),
        "/=" => Some(AssignOp::Compound(BinaryOp::Div)),
        "%=" => Some(AssignOp::Compound(BinaryOp::Rem)),
        "**=" => Some(AssignOp::Compound(BinaryOp::Exp)),
        "<<=" => Some(AssignOp::Compound(BinaryOp::Shl)),
        ">>=" => Some(AssignOp::Compound(BinaryOp::Shr)),
        ">>>=" => Some(AssignOp::Compound(BinaryOp::UShr)),
        "&=" => Some(AssignOp::Compound(BinaryOp::BitAnd)),
        "|=" => Some(AssignOp::Compound(BinaryOp::BitOr)),
        "^=" => Some(AssignOp::Compound(BinaryOp::BitXor)),
        "&&=" => Some(AssignOp::Logical(LogicalOp::And)),
        "||=" => Some(AssignOp::Logical(LogicalOp::Or)),
        "??=" => Some(AssignOp::Logical(LogicalOp::Coalesce)),
        _ => None,
      },
      _ => None,
    };
    let Some(op) = op else {
      return Ok(target);
    };
    self.check_assignment_target(&target, start)?;
    self.advance();
    let value = self.assignment()?;
    Ok(Expr {
      kind: ExprKind::Assign(op, Box::new(target), Box::new(value)),
      span: self.span_from(start),
    })
  }

  fn check_assignment_target(&self, target: &Expr, at: u32) -> PResult<()> {
    match &target.kind {
      ExprKind::Ident(name) => {
        if self.strict() && (&**name == "eval" || &**name == "arguments") {
          return self.error_at(
            "Unexpected eval or arguments in strict mode",
            at,
          );
        }
        Ok(())
      }
      ExprKind::Member(..) => Ok(()),
      _ => self.error_at("Invalid left-hand side in assignment", at),
    }
  }

  fn conditional(&mut self) -> PResult<Expr> {
    let start = self.start();
    let test = self.binary(0)?;
    if !self.eat_punct("?") {
      return Ok(test);
    }
    let no_in = std::mem::replace(&mut self.no_in, false);
    let cons = self.assignment();
    self.no_in = no_in;
    let cons = cons?;
    self.expect_punct(":")?;
    let alt = self.assignment()?;
    Ok(Expr {
      kind: ExprKind::Conditional(
        Box::new(test),
        Box::new(cons),
        Box::new(alt),
      ),
      span: self.span_from(start),
    })
  }

  fn binary_operator(&self) -> Option<(u8, Result<BinaryOp, LogicalOp>)> {
    let op = match &self.peek().kind {
      TokenKind::Punct(p) => match *p {
        "??" => (1, Err(LogicalOp::Coalesce)),
        "||" => (2, Err(LogicalOp::Or)),
        "&&" => (3, Err(LogicalOp::And)),
        "|" => (4, Ok(BinaryOp::BitOr)),
        "^" => (5, Ok(BinaryOp::BitXor)),
        "&" => (6, Ok(BinaryOp::BitAnd)),
        "==" => (7, Ok(BinaryOp::Eq)),
        "!=" => (7, Ok(BinaryOp::NotEq)),
        "===" => (7, Ok(BinaryOp::StrictEq)),
        "!==" => (7, Ok(BinaryOp::StrictNotEq)),
        "<" => (8, Ok(BinaryOp::Lt)),
        ">" => (8, Ok(BinaryOp::Gt)),
        "<=" => (8, Ok(BinaryOp::LtEq)),
        ">=" => (8, Ok(BinaryOp::GtEq)),
        "<<" => (9, Ok(BinaryOp::Shl)),
        ">>" => (9, Ok(BinaryOp::Shr)),
        ">>>" => (9, Ok(BinaryOp::UShr)),
        "+" => (10, Ok(BinaryOp::Add)),
        "-" => (10, Ok(BinaryOp::Sub)),
        "*" => (11, Ok(BinaryOp::Mul)),
        "/" => (11, Ok(BinaryOp::Div)),
        "%" => (11, Ok(BinaryOp::Rem)),
        "**" => (12, Ok(BinaryOp::Exp)),
        _ => return None,
      },
      TokenKind::Ident(name) => match &**name {
        "instanceof" => (8, Ok(BinaryOp::InstanceOf)),
        "in" if !self.no_in => (8, Ok(BinaryOp::In)),
        _ => return None,
      },
      _ => return None,
    };
    Some(op)
  }

  fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
    let start = self.start();
    let mut left = self.unary()?;
    while let Some((prec, op)) = self.binary_operator() {
      if prec <= min_prec {
        break;
      }
      self.advance();
      // `**` is right-associative.
      let right = if prec == 12 {
        self.binary(prec - 1)?
      } else {
        self.binary(prec)?
      };
      let span = self.span_from(start);
      left = Expr {
        kind: match op {
          Ok(op) => ExprKind::Binary(op, Box::new(left), Box::new(right)),
          Err(op) => ExprKind::Logical(op, Box::new(left), Box::new(right)),
        },
        span,
      };
    }
    Ok(left)
  }

  fn unary(&mut self) -> PResult<Expr> {
    self.check_stack()?;
    let start = self.start();
    let op = match &self.peek().kind {
      TokenKind::Punct("-") => Some(UnaryOp::Minus),
      TokenKind::Punct("+") => Some(UnaryOp::Plus),
      TokenKind::Punct("!") => Some(UnaryOp::Not),
      TokenKind::Punct("~") => Some(UnaryOp::BitNot),
      TokenKind::Ident(name) => match &**name {
        "typeof" => Some(UnaryOp::TypeOf),
        "void" => Some(UnaryOp::Void),
        "delete" => Some(UnaryOp::Delete),
        _ => None,
      },
      _ => None,
    };
    if let Some(op) = op {
      self.advance();
      let arg = self.unary()?;
      if op == UnaryOp::Delete && self.strict() {
        if let ExprKind::Ident(_) = arg.kind {
          return self.error_at(
            "Delete of an unqualified identifier in strict mode.",
            start,
          );
        }
      }
      if self.is_punct("**") {
        return self.error_at(
          "Unary operator used immediately before exponentiation expression. Parenthesis must be used to disambiguate operator precedence",
          self.start(),
        );
      }
      return Ok(Expr {
        kind: ExprKind::Unary(op, Box::new(arg)),
        span: self.span_from(start),
      });
    }
    if self.is_punct("++") || self.is_punct("--") {
      let increment = self.is_punct("++");
      self.advance();
      let target = self.unary()?;
      if !matches!(target.kind, ExprKind::Ident(_) | ExprKind::Member(..)) {
        return self.error_at(
          "Invalid left-hand side expression in prefix operation",
          start,
        );
      }
      return Ok(Expr {
        kind: ExprKind::Update {
          increment,
          prefix: true,
          target: Box::new(target),
        },
        span: self.span_from(start),
      });
    }
    if self.is_keyword("await") && self.is_module {
      return self.error_at("Top-level await is not supported", start);
    }
    self.postfix()
  }

  fn postfix(&mut self) -> PResult<Expr> {
    let start = self.start();
    let expr = self.left_hand_side()?;
    if (self.is_punct("++") || self.is_punct("--"))
      && !self.peek().newline_before
    {
      if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member(..)) {
        return self.error_at(
          "Invalid left-hand side expression in postfix operation",
          start,
        );
      }
      let increment = self.is_punct("++");
      self.advance();
      return Ok(Expr {
        kind: ExprKind::Update {
          increment,
          prefix: false,
          target: Box::new(expr),
        },
        span: self.span_from(start),
      });
    }
    Ok(expr)
  }

  fn arguments(&mut self) -> PResult<Vec<Expr>> {
    self.expect_punct("(")?;
    let mut args = Vec::new();
    let no_in = std::mem::replace(&mut self.no_in, false);
    let result = (|| {
      while !self.eat_punct(")") {
        if self.is_punct("...") {
          return self.error_at(
            "Spread arguments are not supported",
            self.start(),
          );
        }
        args.push(self.assignment()?);
        if !self.is_punct(")") {
          if !self.is_punct(",") {
            return self.error_at("missing ) after argument list", self.start());
          }
          self.advance();
        }
      }
      Ok(())
    })();
    self.no_in = no_in;
    result?;
    Ok(args)
  }

  /// Parses one `.name` or `[expr]` suffix applied to `object`.
  fn member_suffix(
    &mut self,
    start: u32,
    object: &mut Expr,
  ) -> PResult<Option<Expr>> {
    let take = |object: &mut Expr| {
      std::mem::replace(object, Expr {
        kind: ExprKind::Null,
        span: Span::default(),
      })
    };
    if self.eat_punct(".") {
      let name = self.identifier_name()?;
      return Ok(Some(Expr {
        kind: ExprKind::Member(Box::new(take(object)), MemberProp::Named(name)),
        span: self.span_from(start),
      }));
    }
    if self.is_punct("[") {
      self.advance();
      let no_in = std::mem::replace(&mut self.no_in, false);
      let property = self.expression();
      self.no_in = no_in;
      let property = property?;
      self.expect_punct("]")?;
      return Ok(Some(Expr {
        kind: ExprKind::Member(
          Box::new(take(object)),
          MemberProp::Computed(Box::new(property)),
        ),
        span: self.span_from(start),
      }));
    }
    if self.is_punct("?.") {
      return self.error_at("Optional chaining is not supported", self.start());
    }
    Ok(None)
  }

  fn left_hand_side(&mut self) -> PResult<Expr> {
    let start = self.start();
    let mut expr = if self.is_keyword("new") {
      self.new_expression()?
    } else {
      self.primary()?
    };
    loop {
      if self.is_punct("(") {
        let args = self.arguments()?;
        expr = Expr {
          kind: ExprKind::Call(Box::new(expr), args),
          span: self.span_from(start),
        };
        continue;
      }
      if !(self.is_punct(".") || self.is_punct("[") || self.is_punct("?.")) {
        break;
      }
      if let Some(next) = self.member_suffix(start, &mut expr)? {
        expr = next;
      }
    }
    Ok(expr)
  }

  fn new_expression(&mut self) -> PResult<Expr> {
    let start = self.start();
    self.check_stack()?;
    self.expect_keyword("new")?;
    if self.is_punct(".") {
      return self.error_at("new.target is not supported", self.start());
    }
    let mut callee = if self.is_keyword("new") {
      self.new_expression()?
    } else {
      self.primary()?
    };
    while self.is_punct(".") || self.is_punct("[") || self.is_punct("?.") {
      if let Some(next) = self.member_suffix(start, &mut callee)? {
        callee = next;
      }
    }
    let args = if self.is_punct("(") {
      self.arguments()?
    } else {
      Vec::new()
    };
    Ok(Expr {
      kind: ExprKind::New(Box::new(callee), args),
      span: self.span_from(start),
    })
  }

  fn primary(&mut self) -> PResult<Expr> {
    let start = self.start();
    let token = self.peek().clone();
    let kind = match &token.kind {
      TokenKind::Number(n) => {
        self.advance();
        ExprKind::Number(*n)
      }
      TokenKind::BigInt(digits) => {
        self.advance();
        let value = digits.parse::<BigInt>().unwrap_or_default();
        ExprKind::BigInt(Rc::new(value))
      }
      TokenKind::String(s) => {
        self.advance();
        ExprKind::String(s.clone())
      }
      TokenKind::Punct("(") => {
        self.advance();
        let no_in = std::mem::replace(&mut self.no_in, false);
        let expr = self.expression();
        self.no_in = no_in;
        let expr = expr?;
        self.expect_punct(")")?;
        // Keep the inner node; parentheses only matter for the span.
        return Ok(expr);
      }
      TokenKind::Punct("[") => self.array_literal()?,
      TokenKind::Punct("{") => self.object_literal()?,
      TokenKind::Ident(name) => match &**name {
        "this" => {
          self.advance();
          ExprKind::This
        }
        "null" => {
          self.advance();
          ExprKind::Null
        }
        "true" => {
          self.advance();
          ExprKind::Bool(true)
        }
        "false" => {
          self.advance();
          ExprKind::Bool(false)
        }
        "function" => ExprKind::Function(self.function(true, false)?),
        "class" => return self.error_at("Classes are not supported", start),
        "super" => {
          return self.error_at("'super' keyword unexpected here", start)
        }
        "import" => {
          return self.error_at("Dynamic import is not supported", start);
        }
        _ => {
          if RESERVED.contains(&&**name)
            || (self.strict() && STRICT_RESERVED.contains(&&**name))
          {
            return self.unexpected();
          }
          if &**name == "arguments" {
            self.mark_arguments();
          }
          self.advance();
          ExprKind::Ident(name.clone())
        }
      },
      _ => return self.unexpected(),
    };
    Ok(Expr {
      kind,
      span: self.span_from(start),
    })
  }

  fn array_literal(&mut self) -> PResult<ExprKind> {
    self.expect_punct("[")?;
    let mut elements = Vec::new();
    let no_in = std::mem::replace(&mut self.no_in, false);
    let result = (|| {
      loop {
        if self.eat_punct("]") {
          return Ok(());
        }
        if self.eat_punct(",") {
          elements.push(None);
          continue;
        }
        if self.is_punct("...") {
          return self.error_at(
            "Spread elements are not supported",
            self.start(),
          );
        }
        elements.push(Some(self.assignment()?));
        if !self.is_punct("]") {
          self.expect_punct(",")?;
        }
      }
    })();
    self.no_in = no_in;
    result?;
    Ok(ExprKind::Array(elements))
  }

  fn property_name(&mut self) -> PResult<PropName> {
    let token = self.peek().clone();
    match &token.kind {
      TokenKind::Ident(name) => {
        self.advance();
        Ok(PropName::Named(name.clone()))
      }
      TokenKind::String(s) => {
        self.advance();
        Ok(PropName::Named(s.clone()))
      }
      TokenKind::Number(n) => {
        self.advance();
        Ok(PropName::Named(number_to_string(*n).into()))
      }
      TokenKind::BigInt(digits) => {
        self.advance();
        Ok(PropName::Named(digits.as_str().into()))
      }
      TokenKind::Punct("[") => {
        self.advance();
        let expr = self.assignment()?;
        self.expect_punct("]")?;
        Ok(PropName::Computed(Box::new(expr)))
      }
      _ => self.unexpected(),
    }
  }

  fn object_literal(&mut self) -> PResult<ExprKind> {
    self.expect_punct("{")?;
    let mut props = Vec::new();
    let no_in = std::mem::replace(&mut self.no_in, false);
    let result = (|| {
      while !self.eat_punct("}") {
        props.push(self.property_definition()?);
        if !self.is_punct("}") {
          self.expect_punct(",")?;
        }
      }
      Ok(())
    })();
    self.no_in = no_in;
    result?;
    Ok(ExprKind::Object(props))
  }

  fn property_definition(&mut self) -> PResult<PropDef> {
    let start = self.start();
    if self.is_punct("...") {
      return self.error_at("Object spread is not supported", start);
    }
    if self.is_keyword("async")
      && !matches!(
        self.peek_kind_at(1),
        TokenKind::Punct(":" | "(" | "," | "}"),
      )
    {
      return self.error_at("Async methods are not supported", start);
    }
    let accessor = match &self.peek().kind {
      TokenKind::Ident(name) if &**name == "get" || &**name == "set" => {
        let follows_name = !matches!(
          self.peek_kind_at(1),
          TokenKind::Punct(":" | "(" | "," | "}")
        );
        if follows_name {
          Some(&**name == "get")
        } else {
          None
        }
      }
      _ => None,
    };
    if let Some(is_getter) = accessor {
      self.advance();
      let key = self.property_name()?;
      let name = match &key {
        PropName::Named(n) => Some(n.clone()),
        PropName::Computed(_) => None,
      };
      let node = self.function_rest(start, name, false)?;
      if is_getter && !node.params.is_empty() {
        return self.error_at(
          "Getter must not have any formal parameters.",
          start,
        );
      }
      if !is_getter && node.params.len() != 1 {
        return self.error_at(
          "Setter must have exactly one formal parameter.",
          start,
        );
      }
      return Ok(if is_getter {
        PropDef::Getter(key, node)
      } else {
        PropDef::Setter(key, node)
      });
    }

    let is_identifier = matches!(&self.peek().kind, TokenKind::Ident(_));
    let key = self.property_name()?;
    if self.eat_punct(":") {
      let value = self.assignment()?;
      if let PropName::Named(name) = &key {
        if &**name == "__proto__" {
          return Ok(PropDef::Proto(value));
        }
      }
      return Ok(PropDef::Value(key, value));
    }
    if self.is_punct("(") {
      let name = match &key {
        PropName::Named(n) => Some(n.clone()),
        PropName::Computed(_) => None,
      };
      let node = self.function_rest(start, name, false)?;
      return Ok(PropDef::Value(
        key,
        Expr {
          kind: ExprKind::Function(node),
          span: self.span_from(start),
        },
      ));
    }
    match key {
      PropName::Named(name) if is_identifier => {
        if RESERVED.contains(&&*name) {
          return self.error_at(format!("Unexpected token '{name}'"), start);
        }
        if &*name == "arguments" {
          self.mark_arguments();
        }
        let value = Expr {
          kind: ExprKind::Ident(name.clone()),
          span: self.span_from(start),
        };
        Ok(PropDef::Value(PropName::Named(name), value))
      }
      _ => self.unexpected(),
    }
  }

  // Modules.

  fn module_specifier(&mut self) -> PResult<(JsStr, u32)> {
    let token = self.peek().clone();
    match &token.kind {
      TokenKind::String(s) => {
        self.advance();
        Ok((s.clone(), token.span.start))
      }
      _ => self.unexpected(),
    }
  }

  fn import_attributes(&mut self) -> PResult<Vec<(JsStr, JsStr)>> {
    let mut attributes = Vec::new();
    if (self.is_keyword("with") || self.is_keyword("assert"))
      && !self.peek().newline_before
    {
      self.advance();
      self.expect_punct("{")?;
      while !self.eat_punct("}") {
        let key = match self.property_name()? {
          PropName::Named(k) => k,
          PropName::Computed(_) => return self.unexpected(),
        };
        self.expect_punct(":")?;
        let value = match &self.peek().kind {
          TokenKind::String(v) => v.clone(),
          _ => return self.unexpected(),
        };
        self.advance();
        if attributes.iter().any(|(k, _): &(JsStr, JsStr)| *k == key) {
          return self.error_at(
            format!("Import attribute has duplicate key '{key}'"),
            self.prev_end(),
          );
        }
        attributes.push((key, value));
        if !self.is_punct("}") {
          self.expect_punct(",")?;
        }
      }
    }
    Ok(attributes)
  }

  fn add_request(
    &mut self,
    specifier: JsStr,
    offset: u32,
    attributes: Vec<(JsStr, JsStr)>,
  ) -> usize {
    if let Some(i) = self
      .module
      .requests
      .iter()
      .position(|r| r.specifier == specifier && r.attributes == attributes)
    {
      return i;
    }
    self.module.requests.push(ModuleRequestInfo {
      specifier,
      offset,
      attributes,
    });
    self.module.requests.len() - 1
  }

  fn import_declaration(&mut self) -> PResult<Stmt> {
    let start = self.start();
    self.expect_keyword("import")?;
    let mut entries: Vec<(ImportName, JsStr, Span)> = Vec::new();
    if let TokenKind::String(_) = self.peek().kind {
      let (specifier, offset) = self.module_specifier()?;
      let attributes = self.import_attributes()?;
      self.add_request(specifier, offset, attributes);
      self.consume_semicolon()?;
      return Ok(Stmt {
        kind: StmtKind::Import,
        span: self.span_from(start),
      });
    }
    if matches!(self.peek().kind, TokenKind::Ident(_)) && !self.is_punct("{") {
      let s = self.start();
      let local = self.binding_identifier()?;
      entries.push((
        ImportName::Named("default".into()),
        local,
        self.span_from(s),
      ));
      if !self.eat_punct(",") {
        return self.import_from(start, entries);
      }
    }
    if self.eat_punct("*") {
      let s = self.start();
      if !self.eat_keyword("as") {
        return self.unexpected();
      }
      let local = self.binding_identifier()?;
      entries.push((ImportName::Namespace, local, self.span_from(s)));
    } else if self.eat_punct("{") {
      while !self.eat_punct("}") {
        let s = self.start();
        let imported = match &self.peek().kind {
          TokenKind::String(n) | TokenKind::Ident(n) => n.clone(),
          _ => return self.unexpected(),
        };
        let was_string = matches!(self.peek().kind, TokenKind::String(_));
        self.advance();
        let local = if self.eat_keyword("as") {
          self.binding_identifier()?
        } else {
          if was_string || RESERVED.contains(&&*imported) {
            return self.unexpected();
          }
          imported.clone()
        };
        entries.push((ImportName::Named(imported), local, self.span_from(s)));
        if !self.is_punct("}") {
          self.expect_punct(",")?;
        }
      }
    } else {
      return self.unexpected();
    }
    self.import_from(start, entries)
  }

  fn import_from(
    &mut self,
    start: u32,
    entries: Vec<(ImportName, JsStr, Span)>,
  ) -> PResult<Stmt> {
    self.expect_keyword("from")?;
    let (specifier, offset) = self.module_specifier()?;
    let attributes = self.import_attributes()?;
    let request = self.add_request(specifier, offset, attributes);
    self.consume_semicolon()?;
    for (import_name, local, span) in entries {
      if self.module.imports.iter().any(|e| e.local == local) {
        return self.error_at(
          format!("Identifier '{local}' has already been declared"),
          span.start,
        );
      }
      self.module.imports.push(ImportEntry {
        request,
        import_name,
        local,
        span,
      });
    }
    Ok(Stmt {
      kind: StmtKind::Import,
      span: self.span_from(start),
    })
  }

  fn add_local_export(
    &mut self,
    export_name: JsStr,
    local: JsStr,
    at: u32,
  ) -> PResult<()> {
    let duplicate = self
      .module
      .local_exports
      .iter()
      .any(|(e, _)| *e == export_name)
      || self
        .module
        .indirect_exports
        .iter()
        .any(|e| e.export_name == export_name);
    if duplicate {
      return self.error_at(format!("Duplicate export of '{export_name}'"), at);
    }
    self.module.local_exports.push((export_name, local));
    Ok(())
  }

  fn export_declaration(&mut self) -> PResult<Stmt> {
    let start = self.start();
    self.expect_keyword("export")?;

    if self.eat_keyword("default") {
      if self.is_keyword("function") {
        let fstart = self.start();
        // Anonymous default functions live in the "*default*" binding.
        let node = self.function(false, false)?;
        let local: JsStr = node
          .name
          .clone()
          .unwrap_or_else(|| DEFAULT_EXPORT_BINDING.into());
        self.declare_function(node.clone());
        self.add_local_export("default".into(), local, fstart)?;
        return Ok(Stmt {
          kind: StmtKind::ExportDecl(Box::new(Stmt {
            kind: StmtKind::FunctionDecl(node),
            span: self.span_from(fstart),
          })),
          span: self.span_from(start),
        });
      }
      let expr = self.assignment()?;
      self.consume_semicolon()?;
      self.declare_lexical(&DEFAULT_EXPORT_BINDING.into(), false, start)?;
      self.add_local_export(
        "default".into(),
        DEFAULT_EXPORT_BINDING.into(),
        start,
      )?;
      return Ok(Stmt {
        kind: StmtKind::ExportDefaultExpr(expr),
        span: self.span_from(start),
      });
    }

    if self.eat_punct("*") {
      let export_name = if self.eat_keyword("as") {
        Some(match &self.peek().kind {
          TokenKind::Ident(n) | TokenKind::String(n) => {
            let n = n.clone();
            self.advance();
            n
          }
          _ => return self.unexpected(),
        })
      } else {
        None
      };
      self.expect_keyword("from")?;
      let (specifier, offset) = self.module_specifier()?;
      let attributes = self.import_attributes()?;
      let request = self.add_request(specifier, offset, attributes);
      self.consume_semicolon()?;
      match export_name {
        Some(export_name) => self.module.indirect_exports.push(IndirectExport {
          export_name,
          request,
          import_name: None,
          span: self.span_from(start),
        }),
        None => self.module.star_exports.push(request),
      }
      return Ok(Stmt {
        kind: StmtKind::ExportNamed,
        span: self.span_from(start),
      });
    }

    if self.eat_punct("{") {
      let mut specs = Vec::new();
      while !self.eat_punct("}") {
        let s = self.start();
        let local = match &self.peek().kind {
          TokenKind::Ident(n) | TokenKind::String(n) => n.clone(),
          _ => return self.unexpected(),
        };
        self.advance();
        let exported = if self.eat_keyword("as") {
          match &self.peek().kind {
            TokenKind::Ident(n) | TokenKind::String(n) => {
              let n = n.clone();
              self.advance();
              n
            }
            _ => return self.unexpected(),
          }
        } else {
          local.clone()
        };
        specs.push((local, exported, s));
        if !self.is_punct("}") {
          self.expect_punct(",")?;
        }
      }
      if self.eat_keyword("from") {
        let (specifier, offset) = self.module_specifier()?;
        let attributes = self.import_attributes()?;
        let request = self.add_request(specifier, offset, attributes);
        for (local, exported, s) in specs {
          self.module.indirect_exports.push(IndirectExport {
            export_name: exported,
            request,
            import_name: Some(local),
            span: Span::new(s, s),
          });
        }
      } else {
        for (local, exported, s) in specs {
          self.add_local_export(exported, local, s)?;
        }
      }
      self.consume_semicolon()?;
      return Ok(Stmt {
        kind: StmtKind::ExportNamed,
        span: self.span_from(start),
      });
    }

    let decl = if self.is_keyword("function") {
      let fstart = self.start();
      let node = self.function(false, true)?;
      self.declare_function(node.clone());
      if let Some(name) = &node.name {
        self.add_local_export(name.clone(), name.clone(), fstart)?;
      }
      Stmt {
        kind: StmtKind::FunctionDecl(node),
        span: self.span_from(fstart),
      }
    } else if self.is_keyword("var")
      || self.is_keyword("let")
      || self.is_keyword("const")
    {
      let dstart = self.start();
      let stmt = if self.is_keyword("var") {
        self.advance();
        let decls = self.declarators(VarKind::Var)?;
        self.consume_semicolon()?;
        Stmt {
          kind: StmtKind::Var(VarKind::Var, decls),
          span: self.span_from(dstart),
        }
      } else {
        self.lexical_declaration()?
      };
      if let StmtKind::Var(_, decls) = &stmt.kind {
        let names: Vec<JsStr> = decls.iter().map(|d| d.name.clone()).collect();
        for name in names {
          self.add_local_export(name.clone(), name, dstart)?;
        }
      }
      stmt
    } else {
      return self.unexpected();
    };
    Ok(Stmt {
      kind: StmtKind::ExportDecl(Box::new(decl)),
      span: self.span_from(start),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn budget() -> StackBudget {
    StackBudget::new(0, 256 * 1024)
  }

  fn script(source: &str) -> PResult<Program> {
    parse_script(source, false, budget())
  }

  #[test]
  fn hoists_var_and_functions() {
    let program =
      script("var a = 1; function f() { var b; } { let c; var d; }")
        .unwrap();
    let names: Vec<&str> = program
      .scope
      .var_names
      .iter()
      .map(|n| &**n)
      .collect();
    assert_eq!(names, vec!["a", "f", "d"]);
    assert_eq!(program.scope.functions.len(), 1);
    assert!(program.lexical.is_empty());
    let f = &program.scope.functions[0];
    assert_eq!(f.scope.var_names.len(), 1);
  }

  #[test]
  fn operator_precedence() {
    let program = script("1 + 2 * 3").unwrap();
    let StmtKind::Expr(expr) = &program.body[0].kind else {
      panic!("expected expression statement");
    };
    let ExprKind::Binary(BinaryOp::Add, _, right) = &expr.kind else {
      panic!("expected addition at the root");
    };
    assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
  }

  #[test]
  fn exponent_is_right_associative() {
    let program = script("2 ** 3 ** 2").unwrap();
    let StmtKind::Expr(expr) = &program.body[0].kind else {
      panic!("expected expression statement");
    };
    let ExprKind::Binary(BinaryOp::Exp, left, _) = &expr.kind else {
      panic!("expected exponentiation at the root");
    };
    assert!(matches!(left.kind, ExprKind::Number(n) if n == 2.0));
  }

  #[test]
  fn arrow_functions() {
    let program = script("var f = (a, b) => a + b; var g = x => { return x; };")
      .unwrap();
    assert_eq!(program.body.len(), 2);
  }

  #[test]
  fn automatic_semicolon_insertion() {
    assert!(script("var a = 1\nvar b = 2\na + b").is_ok());
    assert!(script("var a = 1 var b = 2").is_err());
  }

  #[test]
  fn strict_directive() {
    let program = script("'use strict'; var x;").unwrap();
    assert!(program.strict);
    let program = script("var x; 'use strict';").unwrap();
    assert!(!program.strict);
  }

  #[test]
  fn syntax_error_messages() {
    let err = script("var = 1").unwrap_err();
    assert_eq!(err.message, "Unexpected token '='");
    let err = script("1 +").unwrap_err();
    assert_eq!(err.message, "Unexpected end of input");
    let err = script("let a; let a;").unwrap_err();
    assert_eq!(err.message, "Identifier 'a' has already been declared");
    let err = script("return 1").unwrap_err();
    assert_eq!(err.message, "Illegal return statement");
  }

  #[test]
  fn module_records() {
    let program = parse_module(
      "import a, { b as c } from './x.js';\n\
       import * as ns from './y.js';\n\
       export const d = 1;\n\
       export { c as e };\n\
       export * from './x.js';\n\
       export default 42;",
      budget(),
    )
    .unwrap();
    let module = program.module.unwrap();
    let specifiers: Vec<&str> =
      module.requests.iter().map(|r| &*r.specifier).collect();
    assert_eq!(specifiers, vec!["./x.js", "./y.js"]);
    assert_eq!(module.requests[0].offset, 26);
    assert_eq!(module.imports.len(), 3);
    let exports: Vec<&str> =
      module.local_exports.iter().map(|(e, _)| &**e).collect();
    assert_eq!(exports, vec!["d", "e", "default"]);
    assert_eq!(module.star_exports, vec![0]);
    assert!(program.strict);
  }

  #[test]
  fn import_is_rejected_in_scripts() {
    let err = script("import x from 'y';").unwrap_err();
    assert_eq!(err.message, "Cannot use import statement outside a module");
  }

  #[test]
  fn deep_nesting_is_a_range_error() {
    let nested = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let err = script(&nested).unwrap_err();
    assert_eq!(err.kind, crate::engine::error::ErrorKind::RangeError);
    assert_eq!(err.message, "Maximum call stack size exceeded");

    let err = script(&format!("{}1", "!".repeat(20_000))).unwrap_err();
    assert_eq!(err.kind, crate::engine::error::ErrorKind::RangeError);

    let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
    assert!(script(&shallow).is_ok());
  }
}
