//! Kona AST definitions
//!
//! This crate defines the typed abstract syntax tree (AST) for the Kona
//! language. It is the contract between the front end (parsing, name and
//! type resolution) and the compiler core: the core consumes a fully
//! resolved tree, so every expression carries its static type and every
//! node carries a source span.

use std::ops::Range;

/// Byte range of a node in its unit's source text.
pub type Span = Range<usize>;

/// Resolved static type of an expression or declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    Bool,
    /// The type of the `null` literal.
    Null,
    /// The built-in string type.
    Str,
    /// A class reference type, by resolved class name.
    Class(String),
    /// An array of the element type.
    Array(Box<Type>),
}

impl Type {
    /// Whether values of this type are represented as pointers at runtime.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Str | Type::Null | Type::Class(_) | Type::Array(_)
        )
    }

    /// The class name, for class-typed values.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }
}

/// One compilation unit: every class declared in one source file.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Source file path, used for diagnostics and debug metadata.
    pub path: String,
    pub classes: Vec<ClassDecl>,
    pub span: Span,
}

impl Unit {
    /// Looks up a class declaration by name.
    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// Class declaration.
///
/// Nesting is recorded relationally: the front end flattens lexically
/// nested classes into the unit's class list and stamps each with its
/// enclosing class and whether an enclosing-instance reference is required
/// (`captures_enclosing` is false for static nested classes).
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    /// Immediately enclosing class, for nested classes.
    pub enclosing: Option<String>,
    /// Whether instances hold a reference to their enclosing instance.
    pub captures_enclosing: bool,
    pub fields: Vec<FieldDecl>,
    /// Free-standing static initializer blocks. Spans order them against
    /// the static field initializers: both run at program load in source
    /// order.
    pub static_blocks: Vec<StaticBlockDecl>,
    pub ctor: Option<CtorDecl>,
    pub methods: Vec<MethodDecl>,
    pub span: Span,
}

impl ClassDecl {
    /// Looks up a field declared directly on this class.
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Field declaration. Static field initializers run at program load, in
/// declaration order; instance field initializers are folded into the
/// constructor body by the front end.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub is_final: bool,
    pub init: Option<Expr>,
    pub span: Span,
}

/// A `static { ... }` initializer block. Runs at program load, ordered
/// among the class's static field initializers by source position.
#[derive(Debug, Clone)]
pub struct StaticBlockDecl {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Constructor declaration. A class has at most one constructor.
#[derive(Debug, Clone)]
pub struct CtorDecl {
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Method declaration.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Formal parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    Local(LocalDecl),
    Expr(ExprStmt),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    Block(BlockStmt),
    SuperCall(SuperCallStmt),
}

impl Stmt {
    /// The statement's source span.
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Local(s) => &s.span,
            Stmt::Expr(s) => &s.span,
            Stmt::Return(s) => &s.span,
            Stmt::If(s) => &s.span,
            Stmt::While(s) => &s.span,
            Stmt::Block(s) => &s.span,
            Stmt::SuperCall(s) => &s.span,
        }
    }
}

/// Local variable declaration.
#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Expression statement.
#[derive(Debug, Clone)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

/// Return statement.
#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

/// If statement.
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
    pub span: Span,
}

/// While statement.
#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub cond: Expr,
    pub body: Box<Stmt>,
    pub span: Span,
}

/// Braced statement block with its own local scope.
#[derive(Debug, Clone)]
pub struct BlockStmt {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// Constructor delegation to the superclass constructor, with an optional
/// explicit enclosing-instance qualifier.
#[derive(Debug, Clone)]
pub struct SuperCallStmt {
    pub qualifier: Option<Expr>,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// Expression node. Every expression carries its resolved static type.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

/// Expression kinds.
#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StrLit(String),
    NullLit,
    /// Self reference, optionally qualified by an enclosing class name.
    This { qualifier: Option<String> },
    /// Superclass reference, optionally qualified by an enclosing class name.
    Super { qualifier: Option<String> },
    /// Resolved local variable or parameter reference.
    Local(String),
    /// Instance field access.
    Field { target: Box<Expr>, name: String },
    /// Static field access.
    StaticField { class: String, name: String },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Assignment; the target is a local, field, or static field.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Object construction, optionally qualified by an explicit enclosing
    /// instance.
    New {
        class: String,
        qualifier: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    /// Instance method call.
    Call {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Static method call.
    StaticCall {
        class: String,
        method: String,
        args: Vec<Expr>,
    },
    /// Type cast; the cast-to type is the expression's own type.
    Cast(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}
