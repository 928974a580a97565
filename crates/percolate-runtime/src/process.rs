//! The stochastic process engine.
//!
//! [`RuleProcess`] holds the compiled rule tables, bound parameters, and
//! mean-field counters for one run. Its per-entity update implements
//! sequential thinning: one uniform draw per entity per iteration, walked
//! against the cumulative acceptance intervals of the first matching rule
//! group in declared order. Declaration order is therefore precedence; a
//! rule declared earlier claims the interval `[0, p·Δt)` ahead of everything
//! after it.

use indexmap::IndexMap;
use percolate_dsl::ProcessDef;
use percolate_network::{AttrMap, EdgeId, Graph, NodeId};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::warn;

use crate::compiler::CompiledRules;
use crate::error::{Error, Result};
use crate::expr::{ExprCompiler, QueryHost};
use crate::meanfield::{self, MeanFieldTracker};
use crate::state::{AttributeSet, FullState, PartialState, StateDefect};

/// How entity state is represented on the network.
///
/// Both variants deduce and write states through an [`AttributeSet`]; the
/// difference is how that set comes to exist.
#[derive(Debug, Clone)]
pub enum StateModel {
    /// One enumerated tag attribute holds the whole state. The programmatic
    /// path: callers name the attribute and list its states directly.
    Explicit { attrs: AttributeSet },
    /// The state is the full vector of declared attributes. The DSL path.
    AttributeVector { attrs: AttributeSet },
}

impl StateModel {
    pub fn explicit(attribute: impl Into<String>, states: Vec<String>) -> Result<Self> {
        let mut attrs = AttributeSet::new();
        attrs.declare(attribute, states)?;
        Ok(StateModel::Explicit { attrs })
    }

    pub fn attribute_vector(decls: &IndexMap<String, Vec<String>>) -> Result<Self> {
        Ok(StateModel::AttributeVector {
            attrs: AttributeSet::from_declarations(decls)?,
        })
    }

    pub fn attrs(&self) -> &AttributeSet {
        match self {
            StateModel::Explicit { attrs } => attrs,
            StateModel::AttributeVector { attrs } => attrs,
        }
    }

    /// Read an entity's full state off its attribute map
    pub fn deduce(&self, map: &AttrMap) -> std::result::Result<FullState, StateDefect> {
        FullState::from_attrs(self.attrs(), map)
    }

    /// Write a full state into an entity's attribute map
    pub fn write(&self, state: &FullState, map: &mut AttrMap) {
        state.write_attrs(self.attrs(), map);
    }

    /// Every full state over the declared attributes
    pub fn all_states(&self) -> Vec<FullState> {
        PartialState::empty().expand(self.attrs())
    }
}

/// Result of one per-entity update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Transitioned { from: FullState, to: FullState },
}

/// A compiled process: rule tables, bound parameters, mean-field counters
#[derive(Debug)]
pub struct RuleProcess {
    node_model: StateModel,
    edge_model: StateModel,
    node_rules: CompiledRules,
    edge_rules: CompiledRules,
    param_names: Vec<String>,
    params: Vec<f64>,
    tracker: MeanFieldTracker,
    /// Per-iteration (from, to) transition tally, keyed by display text
    transitions: IndexMap<(String, String), u64>,
    node_overflow_warned: Vec<bool>,
    edge_overflow_warned: Vec<bool>,
}

impl RuleProcess {
    /// Compile a parsed definition and bind its free parameters.
    ///
    /// Everything that can fail, fails here: undeclared attributes or
    /// values, duplicate rules, `MF` of an undeclared target, `NN` in an
    /// edge rule, unbound parameters.
    pub fn from_definition(def: &ProcessDef, supplied: &IndexMap<String, f64>) -> Result<Self> {
        let node_model = StateModel::attribute_vector(&def.node_attributes)?;
        let edge_model = StateModel::attribute_vector(&def.edge_attributes)?;

        let targets = meanfield::compile_targets(&def.mean_field_states, node_model.attrs())?;
        let mean_fields: Vec<PartialState> = targets.iter().map(|(t, _)| t.clone()).collect();

        let mut exprs = ExprCompiler {
            node_attrs: node_model.attrs(),
            edge_attrs: edge_model.attrs(),
            mean_fields: &mean_fields,
            allow_neighbor_count: true,
            param_names: Vec::new(),
        };
        let node_rules = CompiledRules::compile(&def.node_rules, node_model.attrs(), &mut exprs)?;
        exprs.allow_neighbor_count = false;
        let edge_rules = CompiledRules::compile(&def.edge_rules, edge_model.attrs(), &mut exprs)?;
        let param_names = exprs.param_names;

        let mut missing = Vec::new();
        let mut params = Vec::with_capacity(param_names.len());
        for name in &param_names {
            match supplied.get(name) {
                Some(value) => params.push(*value),
                None => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::configuration(format!(
                "unbound rate parameter(s): {}",
                missing.join(", ")
            )));
        }
        for name in supplied.keys() {
            if !param_names.iter().any(|p| p == name) {
                warn!(parameter = %name, "supplied parameter is not referenced by any rule");
            }
        }

        let node_overflow_warned = vec![false; node_rules.groups().len()];
        let edge_overflow_warned = vec![false; edge_rules.groups().len()];
        Ok(Self {
            node_model,
            edge_model,
            node_rules,
            edge_rules,
            param_names,
            params,
            tracker: MeanFieldTracker::new(targets),
            transitions: IndexMap::new(),
            node_overflow_warned,
            edge_overflow_warned,
        })
    }

    pub fn node_model(&self) -> &StateModel {
        &self.node_model
    }

    pub fn edge_model(&self) -> &StateModel {
        &self.edge_model
    }

    pub fn tracker(&self) -> &MeanFieldTracker {
        &self.tracker
    }

    /// Transitions recorded so far this iteration
    pub fn transition_tally(&self) -> &IndexMap<(String, String), u64> {
        &self.transitions
    }

    /// Bound parameters, in slot order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, f64)> {
        self.param_names
            .iter()
            .map(|n| n.as_str())
            .zip(self.params.iter().copied())
    }

    pub fn run_node_update(&self) -> bool {
        !self.node_rules.is_empty()
    }

    pub fn run_edge_update(&self) -> bool {
        !self.edge_rules.is_empty()
    }

    /// Rules only rewrite attributes; the topology never changes
    pub fn constant_topology(&self) -> bool {
        true
    }

    /// Census all node states and publish, so the first iteration's `MF()`
    /// reads the initial counts
    pub fn initialize_counts(&mut self, graph: &Graph) -> Result<()> {
        let mut states = Vec::with_capacity(graph.node_count());
        for node in graph.nodes() {
            let state = self
                .node_model
                .deduce(graph.node_attrs(node))
                .map_err(|d| Error::state(node.to_string(), d.to_string()))?;
            states.push(state);
        }
        self.tracker.census(states.iter());
        Ok(())
    }

    /// Sequential-thinning update for one node, reading `prev` only
    pub fn update_node(
        &mut self,
        prev: &Graph,
        node: NodeId,
        rng: &mut StdRng,
        dt: f64,
    ) -> Result<Outcome> {
        let state = self
            .node_model
            .deduce(prev.node_attrs(node))
            .map_err(|d| Error::state(node.to_string(), d.to_string()))?;

        let (group_index, fired, cum) = {
            let Some(group) = self.node_rules.first_match(&state) else {
                return Ok(Outcome::Unchanged);
            };
            let host = NodeHost {
                prev,
                node,
                node_attrs: self.node_model.attrs(),
                edge_attrs: self.edge_model.attrs(),
                tracker: &self.tracker,
            };
            let u: f64 = rng.gen_range(0.0..1.0);
            let mut cum = 0.0;
            let mut fired = None;
            // keep summing past the firing rule so the overflow check below
            // sees the whole group
            for rule in &group.rules {
                let p = rule.rate.eval(&self.params, &host);
                cum += p * dt;
                if fired.is_none() && u < cum {
                    fired = Some(rule.delta.apply(&state));
                }
            }
            (group.index, fired, cum)
        };

        if cum > 1.0 && !self.node_overflow_warned[group_index] {
            self.node_overflow_warned[group_index] = true;
            self.warn_overflow(&self.node_rules.groups()[group_index].source_text, cum, dt);
        }

        match fired {
            Some(to) => {
                self.note_transition(&state, &to, true);
                Ok(Outcome::Transitioned { from: state, to })
            }
            None => Ok(Outcome::Unchanged),
        }
    }

    /// Sequential-thinning update for one edge, reading `prev` only
    pub fn update_edge(
        &mut self,
        prev: &Graph,
        edge: EdgeId,
        rng: &mut StdRng,
        dt: f64,
    ) -> Result<Outcome> {
        let state = self
            .edge_model
            .deduce(prev.edge_attrs(edge))
            .map_err(|d| Error::state(edge.to_string(), d.to_string()))?;

        let (group_index, fired, cum) = {
            let Some(group) = self.edge_rules.first_match(&state) else {
                return Ok(Outcome::Unchanged);
            };
            let host = EdgeHost {
                tracker: &self.tracker,
            };
            let u: f64 = rng.gen_range(0.0..1.0);
            let mut cum = 0.0;
            let mut fired = None;
            for rule in &group.rules {
                let p = rule.rate.eval(&self.params, &host);
                cum += p * dt;
                if fired.is_none() && u < cum {
                    fired = Some(rule.delta.apply(&state));
                }
            }
            (group.index, fired, cum)
        };

        if cum > 1.0 && !self.edge_overflow_warned[group_index] {
            self.edge_overflow_warned[group_index] = true;
            self.warn_overflow(&self.edge_rules.groups()[group_index].source_text, cum, dt);
        }

        match fired {
            Some(to) => {
                self.note_transition(&state, &to, false);
                Ok(Outcome::Transitioned { from: state, to })
            }
            None => Ok(Outcome::Unchanged),
        }
    }

    fn note_transition(&mut self, from: &FullState, to: &FullState, node: bool) {
        let attrs = if node {
            self.node_model.attrs()
        } else {
            self.edge_model.attrs()
        };
        let key = (from.describe(attrs), to.describe(attrs));
        if node {
            self.tracker.record_transition(from, to);
        }
        *self.transitions.entry(key).or_insert(0) += 1;
    }

    fn warn_overflow(&self, source: &str, cum: f64, dt: f64) {
        warn!(
            source = %source,
            sum = cum,
            dt,
            "summed rule probabilities exceed 1 for this time step; probabilities are thinned, not rescaled"
        );
    }

    /// Whole-network pass at the end of an iteration: mirror mean-field
    /// counts into the graph's own attribute map
    pub fn update_network(&self, graph: &mut Graph, time: f64) {
        let attrs = graph.graph_attrs_mut();
        attrs.insert("time".to_string(), time.to_string());
        for (slot, count) in self.tracker.working_counts().iter().enumerate() {
            attrs.insert(
                format!("count({})", self.tracker.target_text(slot)),
                count.to_string(),
            );
        }
    }

    /// Publish end-of-iteration counters and reset per-iteration tallies
    pub fn finish_iteration(&mut self) {
        self.tracker.publish();
        self.transitions.clear();
    }

    /// Debug-build invariant check: incremental counts match a fresh census
    pub fn counts_consistent(&self, graph: &Graph) -> bool {
        let mut states = Vec::with_capacity(graph.node_count());
        for node in graph.nodes() {
            match self.node_model.deduce(graph.node_attrs(node)) {
                Ok(state) => states.push(state),
                Err(_) => return false,
            }
        }
        self.tracker.consistent_with(states.iter())
    }
}

struct NodeHost<'a> {
    prev: &'a Graph,
    node: NodeId,
    node_attrs: &'a AttributeSet,
    edge_attrs: &'a AttributeSet,
    tracker: &'a MeanFieldTracker,
}

impl QueryHost for NodeHost<'_> {
    fn neighbor_count(&self, state: &PartialState, edge: Option<&PartialState>) -> f64 {
        let mut count = 0usize;
        for (neighbor, edge_id) in self.prev.neighbors(self.node) {
            if let Some(filter) = edge {
                if !filter.matches_map(self.edge_attrs, self.prev.edge_attrs(edge_id)) {
                    continue;
                }
            }
            if state.matches_map(self.node_attrs, self.prev.node_attrs(neighbor)) {
                count += 1;
            }
        }
        count as f64
    }

    fn mean_field(&self, target: usize) -> f64 {
        self.tracker.fraction(target)
    }
}

struct EdgeHost<'a> {
    tracker: &'a MeanFieldTracker,
}

impl QueryHost for EdgeHost<'_> {
    fn neighbor_count(&self, _state: &PartialState, _edge: Option<&PartialState>) -> f64 {
        // NN is rejected in edge rules at compilation
        debug_assert!(false, "NN evaluated in an edge rule");
        0.0
    }

    fn mean_field(&self, target: usize) -> f64 {
        self.tracker.fraction(target)
    }
}
