//! Rule and configuration language for percolate processes.
//!
//! A process definition is an ini-style file whose sections declare entity
//! attributes, tracked mean-field states, and ordered transition rules of the
//! form `{attr:value, ...} -> {attr:value, ...} = rate expression`. This crate
//! tokenizes and parses that surface syntax into a plain AST; all semantic
//! validation (declared attributes, parameter binding, domain membership)
//! happens later in `percolate-runtime`.

pub mod ast;
pub mod config;
pub mod definition;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr, PartialStateExpr, ProcessDef, RuleDecl};
pub use config::{ConfigError, ConfigFile};
pub use definition::DefinitionError;
pub use lexer::{LexError, Token, lex};
pub use parser::{ParseError, parse_expr_str, parse_partial_state_str, parse_rule_str};
