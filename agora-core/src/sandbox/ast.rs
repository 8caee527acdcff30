//! Abstract syntax tree for the sandbox expression language.
//!
//! The grammar admits exactly one value-producing expression per submission,
//! plus two policy-gated top-level forms: a single binding (`name = expr`) and
//! an assertion (`assert expr`). Everything else the original surface syntax
//! could express (statements, definitions, imports) has no representation here
//! and is rejected before evaluation.

use core::fmt;

/// One complete submission to the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    /// A plain value-producing expression.
    Expr(Expr),
    /// A single top-level binding, admitted only under the binding policy.
    Binding { name: String, value: Expr },
    /// A single top-level assertion, admitted under the same policy.
    Assert(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `then_branch if condition else else_branch`
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Index {
        value: Box<Expr>,
        index: Box<IndexExpr>,
    },
    Call {
        function: String,
        arguments: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        arguments: Vec<Expr>,
    },
    /// Bare attribute access. Parsed so the validator can reject it with a
    /// precise error; never evaluated.
    Attribute {
        receiver: Box<Expr>,
        attribute: String,
    },
    /// `[element for binding in iterable if condition]`
    ListComp {
        element: Box<Expr>,
        binding: String,
        iterable: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
}

/// Subscript form: a single index or a slice with optional bounds and step.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexExpr {
    Single(Expr),
    Slice {
        start: Option<Expr>,
        stop: Option<Expr>,
        step: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    In,
    NotIn,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::FloorDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "**",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanEqual => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::In => "in",
            BinaryOperator::NotIn => "not in",
        };
        write!(f, "{}", symbol)
    }
}

impl Program {
    /// The expression producing this submission's value, whichever form the
    /// submission took.
    pub fn value_expr(&self) -> &Expr {
        match self {
            Program::Expr(expr) => expr,
            Program::Binding { value, .. } => value,
            Program::Assert(expr) => expr,
        }
    }
}
