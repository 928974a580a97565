//! Mean-field bookkeeping.
//!
//! For each declared target the tracker holds two count buffers: `published`
//! is what `MF()` reads during an iteration and reflects the end of the
//! previous completed iteration; `working` absorbs transition adjustments as
//! entities are updated. [`MeanFieldTracker::publish`] swaps working into
//! published at the iteration boundary.
//!
//! Invariant: each working count equals the true number of entities whose
//! full state the target matches. A consistency pass checking this is
//! available to debug builds via [`MeanFieldTracker::consistent_with`].

use crate::state::{AttributeSet, FullState, PartialState};

#[derive(Debug, Clone)]
pub struct MeanFieldTracker {
    /// (target, display text), declaration order; `MF` slots index this
    targets: Vec<(PartialState, String)>,
    published: Vec<usize>,
    working: Vec<usize>,
    /// Entities that entered each target this iteration, reset on publish
    influx: Vec<u64>,
    total_entities: usize,
}

impl MeanFieldTracker {
    pub fn new(targets: Vec<(PartialState, String)>) -> Self {
        let n = targets.len();
        Self {
            targets,
            published: vec![0; n],
            working: vec![0; n],
            influx: vec![0; n],
            total_entities: 0,
        }
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn target_text(&self, index: usize) -> &str {
        &self.targets[index].1
    }

    /// Count entity states from scratch and publish immediately.
    ///
    /// Called once after initial states are dealt, so iteration 1 reads the
    /// initial census.
    pub fn census<'a>(&mut self, states: impl Iterator<Item = &'a FullState>) {
        self.working.fill(0);
        self.influx.fill(0);
        self.total_entities = 0;
        for state in states {
            self.total_entities += 1;
            for (slot, (target, _)) in self.targets.iter().enumerate() {
                if target.matches(state) {
                    self.working[slot] += 1;
                }
            }
        }
        self.published.copy_from_slice(&self.working);
    }

    /// Adjust counts for one entity's transition
    pub fn record_transition(&mut self, from: &FullState, to: &FullState) {
        for (slot, (target, _)) in self.targets.iter().enumerate() {
            let was = target.matches(from);
            let is = target.matches(to);
            if was && !is {
                self.working[slot] -= 1;
            } else if !was && is {
                self.working[slot] += 1;
                self.influx[slot] += 1;
            }
        }
    }

    /// Publish end-of-iteration counts for the next iteration's `MF()` reads
    /// and reset the per-iteration influx counters
    pub fn publish(&mut self) {
        self.published.copy_from_slice(&self.working);
        self.influx.fill(0);
    }

    /// Published fraction for one target; what `MF()` evaluates to
    pub fn fraction(&self, slot: usize) -> f64 {
        if self.total_entities == 0 {
            return 0.0;
        }
        self.published[slot] as f64 / self.total_entities as f64
    }

    /// End-of-iteration counts, before publish
    pub fn working_counts(&self) -> &[usize] {
        &self.working
    }

    pub fn influx_counts(&self) -> &[u64] {
        &self.influx
    }

    pub fn total_entities(&self) -> usize {
        self.total_entities
    }

    /// Verify the incremental working counts against a fresh census
    pub fn consistent_with<'a>(&self, states: impl Iterator<Item = &'a FullState>) -> bool {
        let mut fresh = vec![0usize; self.targets.len()];
        let mut total = 0usize;
        for state in states {
            total += 1;
            for (slot, (target, _)) in self.targets.iter().enumerate() {
                if target.matches(state) {
                    fresh[slot] += 1;
                }
            }
        }
        total == self.total_entities && fresh == self.working
    }
}

/// Compile declared mean-field targets, rejecting duplicates
pub fn compile_targets(
    exprs: &[percolate_dsl::PartialStateExpr],
    attrs: &AttributeSet,
) -> crate::error::Result<Vec<(PartialState, String)>> {
    let mut targets: Vec<(PartialState, String)> = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let compiled = PartialState::compile(expr, attrs)?;
        if targets.iter().any(|(t, _)| *t == compiled) {
            return Err(crate::error::Error::configuration(format!(
                "mean-field state '{expr}' declared twice"
            )));
        }
        targets.push((compiled, expr.to_string()));
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_dsl::parse_partial_state_str;

    fn attrs() -> AttributeSet {
        let mut a = AttributeSet::new();
        a.declare("status", vec!["S".into(), "I".into(), "R".into()])
            .unwrap();
        a
    }

    fn tracker(attrs: &AttributeSet) -> MeanFieldTracker {
        let exprs = [
            parse_partial_state_str("{status:S}").unwrap(),
            parse_partial_state_str("{status:I}").unwrap(),
        ];
        MeanFieldTracker::new(compile_targets(&exprs, attrs).unwrap())
    }

    fn s(v: &str) -> FullState {
        FullState::new(vec![v.to_string()])
    }

    #[test]
    fn test_census_and_fractions() {
        let attrs = attrs();
        let mut t = tracker(&attrs);
        let states = [s("S"), s("S"), s("S"), s("I")];
        t.census(states.iter());

        assert_eq!(t.working_counts(), &[3, 1]);
        assert_eq!(t.fraction(0), 0.75);
        assert_eq!(t.fraction(1), 0.25);
    }

    #[test]
    fn test_transitions_stay_unpublished_until_publish() {
        let attrs = attrs();
        let mut t = tracker(&attrs);
        let states = [s("S"), s("S"), s("I"), s("I")];
        t.census(states.iter());

        t.record_transition(&s("S"), &s("I"));
        // published values are still the census
        assert_eq!(t.fraction(1), 0.5);
        assert_eq!(t.working_counts(), &[1, 3]);
        assert_eq!(t.influx_counts(), &[0, 1]);

        t.publish();
        assert_eq!(t.fraction(1), 0.75);
        assert_eq!(t.influx_counts(), &[0, 0]);
    }

    #[test]
    fn test_transition_outside_targets() {
        let attrs = attrs();
        let mut t = tracker(&attrs);
        let states = [s("I")];
        t.census(states.iter());

        // R is not tracked; leaving I only decrements I
        t.record_transition(&s("I"), &s("R"));
        assert_eq!(t.working_counts(), &[0, 0]);
        assert_eq!(t.influx_counts(), &[0, 0]);
    }

    #[test]
    fn test_consistency_check() {
        let attrs = attrs();
        let mut t = tracker(&attrs);
        let before = [s("S"), s("I")];
        t.census(before.iter());
        t.record_transition(&s("S"), &s("R"));

        let after = [s("R"), s("I")];
        assert!(t.consistent_with(after.iter()));
        assert!(!t.consistent_with(before.iter()));
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let attrs = attrs();
        let exprs = [
            parse_partial_state_str("{status:I}").unwrap(),
            parse_partial_state_str("{status:I}").unwrap(),
        ];
        assert!(compile_targets(&exprs, &attrs).is_err());
    }
}
