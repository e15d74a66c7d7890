//! The stable AST surface produced by the parser. Downstream crates
//! (`synthetic-sensors-eval`, the AST analysis service) walk this tree;
//! it never changes shape across a formula's lifetime, which is what
//! makes analysis/binding-plan caching by formula text valid.

use synthetic_sensors_common::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A bare name — may resolve to host state, a computed variable, a
    /// cross-sensor key, or a data-provider lookup depending on the
    /// binding plan.
    Identifier(String),
    /// `base.attr` — either a state-attribute lookup (`power.battery_level`)
    /// or a dotted entity id read as a single token by the tokenizer's
    /// identifier rule being insufficient; the parser always produces
    /// this shape for any `.`-joined chain so analysis can tell the two
    /// apart later from the binding plan.
    Attribute { base: Box<Expr>, attr: String },
    Index { base: Box<Expr>, index: Box<Expr> },
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison, e.g. `0 <= x < 10`, matching Python semantics
    /// (all pairs must hold, short-circuiting left to right).
    Compare {
        left: Box<Expr>,
        ops: Vec<CompareOp>,
        comparators: Vec<Expr>,
    },
    BoolOp { op: BoolOp, values: Vec<Expr> },
    Not(Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    In { left: Box<Expr>, right: Box<Expr>, negated: bool },
    IsNone { expr: Box<Expr>, negated: bool },
    Call { name: String, args: Vec<Expr> },
    FString(Vec<FStringPart>),
}

impl Expr {
    /// True for the handful of node shapes that can directly name an
    /// identifier the dependency manager must resolve (used by the AST
    /// analysis walk in the engine crate).
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier(name) => Some(name),
            _ => None,
        }
    }
}
