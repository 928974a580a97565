//! AST for process definitions.
//!
//! Everything here is surface syntax: attribute names and values are plain
//! strings, and no validation against declared attribute sets has happened
//! yet. The runtime's rule compiler lowers these into validated, normalized
//! forms.

use indexmap::IndexMap;
use std::fmt;

/// A partial state as written: a subset of attributes, each constrained to
/// one value or a parenthesized set of alternatives.
///
/// `{}` is the empty partial state and matches every full state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialStateExpr {
    /// Attribute name to allowed values, in written order
    pub constraints: IndexMap<String, Vec<String>>,
}

impl PartialStateExpr {
    pub fn empty() -> Self {
        Self {
            constraints: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl fmt::Display for PartialStateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (attr, values)) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if values.len() == 1 {
                write!(f, "{}:{}", attr, values[0])?;
            } else {
                write!(f, "{}:({})", attr, values.join(", "))?;
            }
        }
        write!(f, "}}")
    }
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A rate expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Free identifier, bound as a process parameter at construction time
    Param(String),
    /// Unary negation
    Neg(Box<Expr>),
    /// Binary arithmetic
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `NN(state)` or `NN(state, edge_state)`: neighbor count, optionally
    /// restricted to edges matching the second partial state
    NeighborCount {
        state: PartialStateExpr,
        edge: Option<PartialStateExpr>,
    },
    /// `MF(state)`: global fraction of entities in a declared mean-field state
    MeanField(PartialStateExpr),
}

/// One transition rule declaration, order-significant
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    /// Left-hand side: the states this rule applies to
    pub source: PartialStateExpr,
    /// Right-hand side: attribute updates applied when the rule fires
    pub delta: PartialStateExpr,
    /// Per-unit-time probability expression
    pub rate: Expr,
    /// Original declaration text, kept for diagnostics
    pub text: String,
}

/// A complete parsed process definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessDef {
    /// Node attribute name to its value domain, in declaration order
    pub node_attributes: IndexMap<String, Vec<String>>,
    /// Edge attribute name to its value domain, in declaration order
    pub edge_attributes: IndexMap<String, Vec<String>>,
    /// Tracked mean-field states
    pub mean_field_states: Vec<PartialStateExpr>,
    /// Node transition rules, in declaration order
    pub node_rules: Vec<RuleDecl>,
    /// Edge transition rules, in declaration order
    pub edge_rules: Vec<RuleDecl>,
}
