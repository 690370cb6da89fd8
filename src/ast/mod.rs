use num_bigint::BigInt;
use serde::Serialize;

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(r: std::ops::Range<usize>) -> Self {
        Span { start: r.start, end: r.end }
    }
}

/// Wraps a node with its source span. Transparent to serde (serializes as inner node only).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Spanned { node, span }
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

impl<T: Serialize> Serialize for Spanned<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.node.serialize(serializer)
    }
}

fn serialize_bigint<S: serde::Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

// ---- Core AST types ----

pub type Expr = Spanned<ExprKind>;
pub type Stmt = Spanned<StmtKind>;

/// A whole source file after preprocessing.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    /// `define name as value [end]`
    Define { name: String, value: Expr },

    /// `puts value`
    Puts { value: Expr },

    /// Bare expression; its value is displayed by the driver.
    Expression { value: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Integer {
        #[serde(serialize_with = "serialize_bigint")]
        value: BigInt,
    },
    Text { value: String },
    Bool { value: bool },
    Nil,
    Ident { name: String },

    /// `not x`, `-x`
    Prefix { op: UnaryOp, operand: Box<Expr> },

    /// `left op right`
    Infix {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `if condition then consequence [else alternative]`
    If {
        condition: Box<Expr>,
        consequence: Box<Expr>,
        alternative: Option<Box<Expr>>,
    },

    /// `lambda param . body`
    Lambda { param: String, body: Box<Expr> },

    /// `function | argument`
    Apply {
        function: Box<Expr>,
        argument: Box<Expr>,
    },
}

impl ExprKind {
    /// Short kind tag used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExprKind::Integer { .. } => "integer literal",
            ExprKind::Text { .. } => "string literal",
            ExprKind::Bool { .. } => "boolean literal",
            ExprKind::Nil => "nil literal",
            ExprKind::Ident { .. } => "identifier",
            ExprKind::Prefix { .. } => "prefix expression",
            ExprKind::Infix { .. } => "infix expression",
            ExprKind::If { .. } => "if expression",
            ExprKind::Lambda { .. } => "lambda",
            ExprKind::Apply { .. } => "application",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    And,
    Or,
}

impl BinOp {
    /// Surface spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Modulo => "mod",
            BinOp::Equals => "=",
            BinOp::NotEquals => "~=",
            BinOp::GreaterThan => ">",
            BinOp::LessThan => "<",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Negate => "-",
        }
    }
}
