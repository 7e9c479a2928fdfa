// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Syntax tree produced by the parser and walked by the interpreter.

use std::rc::Rc;

use num_bigint::BigInt;

use crate::engine::value::JsStr;

/// Byte offsets into the source text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Span {
  pub start: u32,
  pub end: u32,
}

impl Span {
  pub fn new(start: u32, end: u32) -> Self {
    Self { start, end }
  }

  pub fn to(self, other: Span) -> Span {
    Span::new(self.start, other.end)
  }
}

#[derive(Debug)]
pub(crate) struct Program {
  pub body: Vec<Stmt>,
  pub strict: bool,
  pub scope: FunctionScope,
  pub lexical: Vec<LexicalDecl>,
  /// Present when the source was parsed as a module.
  pub module: Option<ModuleInfo>,
}

/// Declarations hoisted to the top of a function (or script) body.
#[derive(Debug, Default)]
pub(crate) struct FunctionScope {
  pub var_names: Vec<JsStr>,
  pub functions: Vec<Rc<FunctionNode>>,
}

#[derive(Clone, Debug)]
pub(crate) struct LexicalDecl {
  pub name: JsStr,
  pub is_const: bool,
}

#[derive(Debug)]
pub(crate) struct FunctionNode {
  pub name: Option<JsStr>,
  pub params: Vec<JsStr>,
  pub body: FunctionBody,
  pub is_arrow: bool,
  /// Function expressions with a name bind that name to themselves.
  pub binds_own_name: bool,
  pub strict: bool,
  pub uses_arguments: bool,
  pub scope: FunctionScope,
  pub lexical: Vec<LexicalDecl>,
  pub span: Span,
}

#[derive(Debug)]
pub(crate) enum FunctionBody {
  Block(Vec<Stmt>),
  Expression(Box<Expr>),
}

#[derive(Debug)]
pub(crate) struct Block {
  pub body: Vec<Stmt>,
  pub lexical: Vec<LexicalDecl>,
  pub functions: Vec<Rc<FunctionNode>>,
}

impl Block {
  pub fn needs_scope(&self) -> bool {
    !self.lexical.is_empty() || !self.functions.is_empty()
  }
}

#[derive(Debug)]
pub(crate) struct Stmt {
  pub kind: StmtKind,
  pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarKind {
  Var,
  Let,
  Const,
}

#[derive(Debug)]
pub(crate) struct VarDeclarator {
  pub name: JsStr,
  pub init: Option<Expr>,
  pub span: Span,
}

#[derive(Debug)]
pub(crate) enum ForInit {
  Var(VarKind, Vec<VarDeclarator>),
  Expr(Expr),
}

#[derive(Debug)]
pub(crate) enum ForBinding {
  Decl(VarKind, JsStr),
  Target(Expr),
}

#[derive(Debug)]
pub(crate) struct SwitchCase {
  pub test: Option<Expr>,
  pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub(crate) struct CatchClause {
  pub param: Option<JsStr>,
  pub body: Block,
}

#[derive(Debug)]
pub(crate) enum StmtKind {
  Empty,
  Debugger,
  Expr(Expr),
  Var(VarKind, Vec<VarDeclarator>),
  /// Hoisted; evaluating the statement itself does nothing.
  FunctionDecl(Rc<FunctionNode>),
  Return(Option<Expr>),
  If(Expr, Box<Stmt>, Option<Box<Stmt>>),
  Block(Block),
  While(Expr, Box<Stmt>),
  DoWhile(Box<Stmt>, Expr),
  For {
    init: Option<ForInit>,
    test: Option<Expr>,
    update: Option<Expr>,
    body: Box<Stmt>,
  },
  ForIn(ForBinding, Expr, Box<Stmt>),
  ForOf(ForBinding, Expr, Box<Stmt>),
  Break(Option<JsStr>),
  Continue(Option<JsStr>),
  Throw(Expr),
  Try {
    block: Block,
    handler: Option<CatchClause>,
    finalizer: Option<Block>,
  },
  Switch {
    discriminant: Expr,
    cases: Vec<SwitchCase>,
    lexical: Vec<LexicalDecl>,
    functions: Vec<Rc<FunctionNode>>,
  },
  Labeled(JsStr, Box<Stmt>),
  /// Module-only; bindings are created during linking.
  Import,
  ExportDefaultExpr(Expr),
  /// `export <declaration>`; the inner statement runs normally.
  ExportDecl(Box<Stmt>),
  /// `export { ... }` lists and re-exports; nothing to run.
  ExportNamed,
}

#[derive(Debug)]
pub(crate) struct Expr {
  pub kind: ExprKind,
  pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
  Minus,
  Plus,
  Not,
  BitNot,
  TypeOf,
  Void,
  Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Exp,
  Shl,
  Shr,
  UShr,
  BitAnd,
  BitOr,
  BitXor,
  Eq,
  NotEq,
  StrictEq,
  StrictNotEq,
  Lt,
  LtEq,
  Gt,
  GtEq,
  In,
  InstanceOf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogicalOp {
  And,
  Or,
  Coalesce,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AssignOp {
  Assign,
  Compound(BinaryOp),
  Logical(LogicalOp),
}

#[derive(Debug)]
pub(crate) enum MemberProp {
  Named(JsStr),
  Computed(Box<Expr>),
}

#[derive(Debug)]
pub(crate) enum PropName {
  Named(JsStr),
  Computed(Box<Expr>),
}

#[derive(Debug)]
pub(crate) enum PropDef {
  Value(PropName, Expr),
  Getter(PropName, Rc<FunctionNode>),
  Setter(PropName, Rc<FunctionNode>),
  /// `__proto__: value` in a literal.
  Proto(Expr),
}

#[derive(Debug)]
pub(crate) enum ExprKind {
  Number(f64),
  String(JsStr),
  BigInt(Rc<BigInt>),
  Bool(bool),
  Null,
  Ident(JsStr),
  This,
  Array(Vec<Option<Expr>>),
  Object(Vec<PropDef>),
  Function(Rc<FunctionNode>),
  Unary(UnaryOp, Box<Expr>),
  Update {
    increment: bool,
    prefix: bool,
    target: Box<Expr>,
  },
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  Logical(LogicalOp, Box<Expr>, Box<Expr>),
  Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
  Assign(AssignOp, Box<Expr>, Box<Expr>),
  Sequence(Vec<Expr>),
  Member(Box<Expr>, MemberProp),
  Call(Box<Expr>, Vec<Expr>),
  New(Box<Expr>, Vec<Expr>),
}

/// Static import/export shape of a module.
#[derive(Debug, Default)]
pub(crate) struct ModuleInfo {
  pub requests: Vec<ModuleRequestInfo>,
  pub imports: Vec<ImportEntry>,
  /// export name -> local binding name
  pub local_exports: Vec<(JsStr, JsStr)>,
  pub indirect_exports: Vec<IndirectExport>,
  /// Indices into `requests` for `export * from`.
  pub star_exports: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct ModuleRequestInfo {
  pub specifier: JsStr,
  pub offset: u32,
  pub attributes: Vec<(JsStr, JsStr)>,
}

#[derive(Clone, Debug)]
pub(crate) enum ImportName {
  Named(JsStr),
  Namespace,
}

#[derive(Debug)]
pub(crate) struct ImportEntry {
  pub request: usize,
  pub import_name: ImportName,
  pub local: JsStr,
  pub span: Span,
}

#[derive(Debug)]
pub(crate) struct IndirectExport {
  pub export_name: JsStr,
  pub request: usize,
  /// `None` re-exports the whole namespace (`export * as ns from`).
  pub import_name: Option<JsStr>,
  pub span: Span,
}

/// The binding name of `export default <expression>`.
pub(crate) const DEFAULT_EXPORT_BINDING: &str = "*default*";
