//! Compiled rate expressions.
//!
//! Parameters and mean-field references are resolved to slot indices when a
//! process is constructed, so evaluation is a pure walk over the tree with
//! no name lookups. The entity-specific queries (`NN`, `MF`) are answered by
//! a [`QueryHost`] the engine installs per entity per iteration; the same
//! compiled expression is reused across all entities and iterations.

use percolate_dsl::{BinaryOp, Expr};

use crate::error::{Error, Result};
use crate::state::{AttributeSet, PartialState};

/// Answers the query functions for the entity currently being updated.
///
/// Implementations read exclusively from the previous-iteration snapshot.
pub trait QueryHost {
    /// Number of neighbors whose state matches `state`, optionally counting
    /// only neighbors reached over an edge matching `edge`
    fn neighbor_count(&self, state: &PartialState, edge: Option<&PartialState>) -> f64;

    /// Global fraction of entities in the declared mean-field target with
    /// this index, as of the end of the previous completed iteration
    fn mean_field(&self, target: usize) -> f64;
}

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    /// Slot into the bound parameter vector
    Param(usize),
    Neg(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    NeighborCount {
        state: PartialState,
        edge: Option<PartialState>,
    },
    /// Slot into the declared mean-field targets
    MeanField(usize),
}

/// A validated, slot-resolved rate expression
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    root: Node,
}

impl CompiledExpr {
    /// Evaluate against bound parameter values and an entity's query host.
    ///
    /// Pure and re-entrant; no interior state.
    pub fn eval(&self, params: &[f64], host: &dyn QueryHost) -> f64 {
        eval_node(&self.root, params, host)
    }
}

fn eval_node(node: &Node, params: &[f64], host: &dyn QueryHost) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Param(slot) => params[*slot],
        Node::Neg(inner) => -eval_node(inner, params, host),
        Node::Binary { op, lhs, rhs } => {
            let l = eval_node(lhs, params, host);
            let r = eval_node(rhs, params, host);
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
            }
        }
        Node::NeighborCount { state, edge } => host.neighbor_count(state, edge.as_ref()),
        Node::MeanField(target) => host.mean_field(*target),
    }
}

/// Shared context for compiling the expressions of one process.
///
/// Collects parameter names in first-appearance order; the slot order here
/// is the binding order used by [`crate::process::RuleProcess`].
pub struct ExprCompiler<'a> {
    /// Node attribute set; validates `NN`'s first argument and `MF` targets
    /// (mean-field states are node states, even when referenced from an
    /// edge rule)
    pub node_attrs: &'a AttributeSet,
    /// Attribute set for `NN`'s edge-filter argument
    pub edge_attrs: &'a AttributeSet,
    /// Declared mean-field targets, in declaration order
    pub mean_fields: &'a [PartialState],
    /// Whether `NN` is meaningful here (node rules only)
    pub allow_neighbor_count: bool,
    /// Parameter names encountered so far, slot order
    pub param_names: Vec<String>,
}

impl<'a> ExprCompiler<'a> {
    pub fn compile(&mut self, expr: &Expr, rule_text: &str) -> Result<CompiledExpr> {
        let root = self.lower(expr, rule_text)?;
        Ok(CompiledExpr { root })
    }

    fn lower(&mut self, expr: &Expr, rule_text: &str) -> Result<Node> {
        match expr {
            Expr::Number(v) => Ok(Node::Const(*v)),
            Expr::Param(name) => {
                let slot = match self.param_names.iter().position(|n| n == name) {
                    Some(slot) => slot,
                    None => {
                        self.param_names.push(name.clone());
                        self.param_names.len() - 1
                    }
                };
                Ok(Node::Param(slot))
            }
            Expr::Neg(inner) => Ok(Node::Neg(Box::new(self.lower(inner, rule_text)?))),
            Expr::Binary { op, lhs, rhs } => Ok(Node::Binary {
                op: *op,
                lhs: Box::new(self.lower(lhs, rule_text)?),
                rhs: Box::new(self.lower(rhs, rule_text)?),
            }),
            Expr::NeighborCount { state, edge } => {
                if !self.allow_neighbor_count {
                    return Err(Error::configuration(format!(
                        "in '{rule_text}': NN() is only available in node rules"
                    )));
                }
                let state = PartialState::compile(state, self.node_attrs)?;
                let edge = match edge {
                    Some(e) => Some(PartialState::compile(e, self.edge_attrs)?),
                    None => None,
                };
                Ok(Node::NeighborCount { state, edge })
            }
            Expr::MeanField(target) => {
                let compiled = PartialState::compile(target, self.node_attrs)?;
                let Some(slot) = self.mean_fields.iter().position(|mf| *mf == compiled) else {
                    return Err(Error::configuration(format!(
                        "in '{rule_text}': MF({target}) does not name a declared mean-field state"
                    )));
                };
                Ok(Node::MeanField(slot))
            }
        }
    }
}
