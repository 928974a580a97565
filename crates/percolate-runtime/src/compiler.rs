//! Lowering rule declarations into validated, grouped rule tables.
//!
//! Rules are grouped by their normalized source partial state. Group order
//! and rule order within a group are both declaration order; both matter
//! operationally (see [`CompiledRules::first_match`] and the engine's
//! sequential thinning walk).

use percolate_dsl::RuleDecl;

use crate::error::{Error, Result};
use crate::expr::{CompiledExpr, ExprCompiler};
use crate::state::{AttributeSet, FullState, PartialState};

/// One compiled transition rule
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Attribute updates applied when the rule fires
    pub delta: PartialState,
    /// Per-unit-time probability
    pub rate: CompiledExpr,
    /// Declaration text, kept for diagnostics
    pub text: String,
}

/// Rules sharing one source partial state, in declaration order
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub source: PartialState,
    /// Display form of the source, for diagnostics
    pub source_text: String,
    pub rules: Vec<CompiledRule>,
    /// Position among groups, used for per-group bookkeeping
    pub index: usize,
}

/// The compiled rule table for one entity kind (nodes or edges)
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    groups: Vec<RuleGroup>,
}

impl CompiledRules {
    /// Compile an ordered list of declarations.
    ///
    /// `entity_attrs` validates rule sources and deltas; expressions are
    /// compiled through the shared `exprs` context so parameter slots are
    /// consistent across node and edge rules.
    pub fn compile(
        decls: &[RuleDecl],
        entity_attrs: &AttributeSet,
        exprs: &mut ExprCompiler<'_>,
    ) -> Result<Self> {
        let mut groups: Vec<RuleGroup> = Vec::new();

        for decl in decls {
            let source = PartialState::compile(&decl.source, entity_attrs)?;
            let delta = PartialState::compile(&decl.delta, entity_attrs)?;
            if !delta.is_single_valued() {
                return Err(Error::configuration(format!(
                    "in '{}': a delta must name exactly one value per attribute",
                    decl.text
                )));
            }
            let rate = exprs.compile(&decl.rate, &decl.text)?;

            let pos = match groups.iter().position(|g| g.source == source) {
                Some(pos) => pos,
                None => {
                    groups.push(RuleGroup {
                        source,
                        source_text: decl.source.to_string(),
                        rules: Vec::new(),
                        index: groups.len(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[pos];
            if group.rules.iter().any(|r| r.delta == delta) {
                return Err(Error::configuration(format!(
                    "duplicate rule '{}': the same source and delta were already declared",
                    decl.text
                )));
            }
            group.rules.push(CompiledRule {
                delta,
                rate,
                text: decl.text.clone(),
            });
        }

        Ok(Self { groups })
    }

    /// The first group, in declaration order, whose source matches `state`.
    ///
    /// When a state matches more than one group's source partial, the first
    /// declared group wins; later groups are not consulted at all.
    pub fn first_match(&self, state: &FullState) -> Option<&RuleGroup> {
        self.groups.iter().find(|g| g.source.matches(state))
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
