//! Initial-state distribution.
//!
//! Builds a deck of full states, one per entity, from a declared
//! distribution of partial-state targets and weights. Weights summing
//! exactly to the entity count are taken as integer quotas; anything else is
//! normalized proportionally with largest-remainder rounding so the quotas
//! always sum to the entity count. Rounding drift is logged, never silently
//! dropped. With no declared distribution, entities are partitioned as
//! evenly as possible across all full states.

use indexmap::IndexMap;
use percolate_dsl::PartialStateExpr;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::process::StateModel;
use crate::state::FullState;

/// Build a shuffled deck of `count` initial states.
///
/// Each distribution target expands to the full states it matches, with the
/// target's weight split equally across the expansion. Duplicate full states
/// accumulate weight.
pub fn deal_states(
    model: &StateModel,
    distribution: Option<&[(PartialStateExpr, f64)]>,
    count: usize,
    rng: &mut StdRng,
) -> Result<Vec<FullState>> {
    let (states, quotas) = match distribution {
        Some(entries) => weighted_quotas(model, entries, count)?,
        None => even_partition(model, count)?,
    };

    let mut deck = Vec::with_capacity(count);
    for (state, quota) in states.iter().zip(&quotas) {
        for _ in 0..*quota {
            deck.push(state.clone());
        }
    }
    debug_assert_eq!(deck.len(), count);
    deck.shuffle(rng);
    Ok(deck)
}

fn weighted_quotas(
    model: &StateModel,
    entries: &[(PartialStateExpr, f64)],
    count: usize,
) -> Result<(Vec<FullState>, Vec<usize>)> {
    let mut weighted: IndexMap<FullState, f64> = IndexMap::new();
    for (target, weight) in entries {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::configuration(format!(
                "distribution weight for '{target}' must be a non-negative number, found {weight}"
            )));
        }
        let compiled = crate::state::PartialState::compile(target, model.attrs())?;
        let expansion = compiled.expand(model.attrs());
        if expansion.is_empty() {
            return Err(Error::configuration(format!(
                "distribution target '{target}' matches no full state"
            )));
        }
        let share = weight / expansion.len() as f64;
        for state in expansion {
            *weighted.entry(state).or_insert(0.0) += share;
        }
    }

    let states: Vec<FullState> = weighted.keys().cloned().collect();
    let weights: Vec<f64> = weighted.values().copied().collect();
    let quotas = allocate_quotas(&weights, count)?;
    for ((state, quota), weight) in states.iter().zip(&quotas).zip(&weights) {
        debug!(state = %state.describe(model.attrs()), weight, quota, "initial quota");
    }
    Ok((states, quotas))
}

/// Integer quotas from weights: exact when the weights already are integer
/// quotas summing to `total`, largest-remainder proportional otherwise
pub fn allocate_quotas(weights: &[f64], total: usize) -> Result<Vec<usize>> {
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return Err(Error::configuration(
            "distribution weights must not sum to zero",
        ));
    }

    let exact = weights.iter().all(|w| w.fract() == 0.0) && sum == total as f64;
    if exact {
        return Ok(weights.iter().map(|w| *w as usize).collect());
    }

    let raw: Vec<f64> = weights.iter().map(|w| total as f64 * w / sum).collect();
    let mut quotas: Vec<usize> = raw.iter().map(|r| r.floor() as usize).collect();
    let assigned: usize = quotas.iter().sum();
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = raw[a].fract();
        let fb = raw[b].fract();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });
    for &slot in order.iter().take(total - assigned) {
        quotas[slot] += 1;
    }

    let drift: f64 = raw
        .iter()
        .zip(&quotas)
        .map(|(r, q)| (*q as f64 - r).abs())
        .fold(0.0_f64, f64::max);
    warn!(
        weight_sum = sum,
        entities = total,
        max_drift = drift,
        "distribution weights normalized proportionally to the entity count"
    );
    Ok(quotas)
}

fn even_partition(model: &StateModel, count: usize) -> Result<(Vec<FullState>, Vec<usize>)> {
    if model.attrs().is_empty() {
        return Err(Error::configuration(
            "cannot partition entities: no attributes are declared",
        ));
    }
    let states = model.all_states();
    let base = count / states.len();
    let remainder = count % states.len();
    let quotas = (0..states.len())
        .map(|i| base + usize::from(i < remainder))
        .collect();
    Ok((states, quotas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_dsl::parse_partial_state_str;
    use rand::SeedableRng;

    fn model() -> StateModel {
        StateModel::explicit("status", vec!["S".into(), "I".into(), "R".into()]).unwrap()
    }

    fn dist(entries: &[(&str, f64)]) -> Vec<(PartialStateExpr, f64)> {
        entries
            .iter()
            .map(|(t, w)| (parse_partial_state_str(t).unwrap(), *w))
            .collect()
    }

    fn tally(deck: &[FullState]) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for state in deck {
            *counts.entry(state.value(0).to_string()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_exact_quotas() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(1);
        let entries = dist(&[("{status:S}", 70.0), ("{status:I}", 30.0)]);
        let deck = deal_states(&model, Some(&entries), 100, &mut rng).unwrap();

        let counts = tally(&deck);
        assert_eq!(counts["S"], 70);
        assert_eq!(counts["I"], 30);
    }

    #[test]
    fn test_proportional_quotas() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(1);
        let entries = dist(&[("{status:S}", 7.0), ("{status:I}", 3.0)]);
        let deck = deal_states(&model, Some(&entries), 100, &mut rng).unwrap();

        let counts = tally(&deck);
        assert_eq!(counts["S"], 70);
        assert_eq!(counts["I"], 30);
    }

    #[test]
    fn test_proportional_rounding_sums_to_total() {
        // 1/3 : 2/3 over 100 entities cannot be exact
        let quotas = allocate_quotas(&[1.0, 2.0], 100).unwrap();
        assert_eq!(quotas.iter().sum::<usize>(), 100);
        assert!(quotas[0] == 33 || quotas[0] == 34);
    }

    #[test]
    fn test_even_partition_fallback() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(1);
        let deck = deal_states(&model, None, 10, &mut rng).unwrap();

        let counts = tally(&deck);
        // 10 over 3 states: 4, 3, 3
        let mut sizes: Vec<usize> = counts.values().copied().collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 3, 4]);
    }

    #[test]
    fn test_expansion_splits_weight() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(1);
        // {} expands to all three states, 30 each; S gets 60 more
        let entries = dist(&[("{}", 90.0), ("{status:S}", 60.0)]);
        let deck = deal_states(&model, Some(&entries), 150, &mut rng).unwrap();

        let counts = tally(&deck);
        assert_eq!(counts["S"], 90);
        assert_eq!(counts["I"], 30);
        assert_eq!(counts["R"], 30);
    }

    #[test]
    fn test_zero_sum_rejected() {
        assert!(allocate_quotas(&[0.0, 0.0], 10).is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(1);
        let entries = dist(&[("{status:S}", -1.0)]);
        assert!(deal_states(&model, Some(&entries), 10, &mut rng).is_err());
    }
}
