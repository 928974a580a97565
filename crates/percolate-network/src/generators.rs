//! Named network generators.
//!
//! A generator is looked up by name and fed a typed parameter map read from
//! the `[NetworkParameters]` section of a simulation configuration. Random
//! generators draw from the caller's seeded RNG so a run is reproducible
//! end to end.

use indexmap::IndexMap;
use rand::Rng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::graph::{Graph, NodeId};

/// Error while building a network
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("unknown network generator '{0}'")]
    UnknownGenerator(String),

    #[error("generator '{generator}' is missing parameter '{name}'")]
    MissingParameter { generator: String, name: String },

    #[error("generator '{generator}' parameter '{name}': {detail}")]
    InvalidParameter {
        generator: String,
        name: String,
        detail: String,
    },
}

/// A typed generator parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Interpret raw configuration text: integer, then float, then text
    pub fn parse(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return ParamValue::Float(f);
        }
        ParamValue::Text(text.to_string())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float accessor, also accepting integer values
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Parameter map for a generator, in declaration order
#[derive(Debug, Clone, Default)]
pub struct GeneratorParams {
    params: IndexMap<String, ParamValue>,
}

impl GeneratorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.params.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Build a network by generator name
pub fn build(name: &str, params: &GeneratorParams, rng: &mut StdRng) -> Result<Graph, GeneratorError> {
    match name {
        "complete" => complete(require_count(name, params, "n")?),
        "cycle" => cycle(require_count(name, params, "n")?),
        "grid_2d" => grid_2d(
            require_count(name, params, "rows")?,
            require_count(name, params, "columns")?,
        ),
        "gnp_random" => gnp_random(
            require_count(name, params, "n")?,
            require_probability(name, params, "p")?,
            rng,
        ),
        "barabasi_albert" => barabasi_albert(
            require_count(name, params, "n")?,
            require_count(name, params, "m")?,
            rng,
        ),
        other => Err(GeneratorError::UnknownGenerator(other.to_string())),
    }
}

fn require_count(
    generator: &str,
    params: &GeneratorParams,
    name: &str,
) -> Result<usize, GeneratorError> {
    let value = params.get(name).ok_or_else(|| GeneratorError::MissingParameter {
        generator: generator.to_string(),
        name: name.to_string(),
    })?;
    match value.as_int() {
        Some(i) if i > 0 => Ok(i as usize),
        _ => Err(GeneratorError::InvalidParameter {
            generator: generator.to_string(),
            name: name.to_string(),
            detail: format!("expected a positive integer, found '{value}'"),
        }),
    }
}

fn require_probability(
    generator: &str,
    params: &GeneratorParams,
    name: &str,
) -> Result<f64, GeneratorError> {
    let value = params.get(name).ok_or_else(|| GeneratorError::MissingParameter {
        generator: generator.to_string(),
        name: name.to_string(),
    })?;
    match value.as_float() {
        Some(p) if (0.0..=1.0).contains(&p) => Ok(p),
        _ => Err(GeneratorError::InvalidParameter {
            generator: generator.to_string(),
            name: name.to_string(),
            detail: format!("expected a probability in [0, 1], found '{value}'"),
        }),
    }
}

fn complete(n: usize) -> Result<Graph, GeneratorError> {
    let mut g = Graph::with_nodes(n);
    for a in 0..n {
        for b in (a + 1)..n {
            g.add_edge(NodeId(a), NodeId(b));
        }
    }
    Ok(g)
}

fn cycle(n: usize) -> Result<Graph, GeneratorError> {
    let mut g = Graph::with_nodes(n);
    if n == 1 {
        return Ok(g);
    }
    if n == 2 {
        g.add_edge(NodeId(0), NodeId(1));
        return Ok(g);
    }
    for a in 0..n {
        g.add_edge(NodeId(a), NodeId((a + 1) % n));
    }
    Ok(g)
}

fn grid_2d(rows: usize, columns: usize) -> Result<Graph, GeneratorError> {
    let mut g = Graph::with_nodes(rows * columns);
    let at = |r: usize, c: usize| NodeId(r * columns + c);
    for r in 0..rows {
        for c in 0..columns {
            if c + 1 < columns {
                g.add_edge(at(r, c), at(r, c + 1));
            }
            if r + 1 < rows {
                g.add_edge(at(r, c), at(r + 1, c));
            }
        }
    }
    Ok(g)
}

fn gnp_random(n: usize, p: f64, rng: &mut StdRng) -> Result<Graph, GeneratorError> {
    let mut g = Graph::with_nodes(n);
    for a in 0..n {
        for b in (a + 1)..n {
            if rng.gen_range(0.0..1.0) < p {
                g.add_edge(NodeId(a), NodeId(b));
            }
        }
    }
    Ok(g)
}

/// Preferential attachment: each new node attaches to `m` distinct existing
/// nodes, chosen with probability proportional to degree
fn barabasi_albert(n: usize, m: usize, rng: &mut StdRng) -> Result<Graph, GeneratorError> {
    if m >= n {
        return Err(GeneratorError::InvalidParameter {
            generator: "barabasi_albert".to_string(),
            name: "m".to_string(),
            detail: format!("m ({m}) must be smaller than n ({n})"),
        });
    }
    let mut g = Graph::with_nodes(n);
    // Repeated endpoints in this list implement degree weighting
    let mut endpoints: Vec<NodeId> = Vec::with_capacity(2 * m * n);

    // Seed: a star over the first m + 1 nodes so every early node has
    // nonzero degree
    for b in 1..=m {
        g.add_edge(NodeId(0), NodeId(b));
        endpoints.push(NodeId(0));
        endpoints.push(NodeId(b));
    }

    for a in (m + 1)..n {
        let mut chosen: Vec<NodeId> = Vec::with_capacity(m);
        while chosen.len() < m {
            let pick = endpoints[rng.gen_range(0..endpoints.len())];
            if !chosen.contains(&pick) {
                chosen.push(pick);
            }
        }
        for b in chosen {
            g.add_edge(NodeId(a), b);
            endpoints.push(NodeId(a));
            endpoints.push(b);
        }
    }
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(pairs: &[(&str, ParamValue)]) -> GeneratorParams {
        let mut p = GeneratorParams::new();
        for (k, v) in pairs {
            p.insert(*k, v.clone());
        }
        p
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_param_value_parse() {
        assert_eq!(ParamValue::parse("12"), ParamValue::Int(12));
        assert_eq!(ParamValue::parse("0.3"), ParamValue::Float(0.3));
        assert_eq!(
            ParamValue::parse("grid_2d"),
            ParamValue::Text("grid_2d".to_string())
        );
    }

    #[test]
    fn test_complete() {
        let g = build("complete", &params(&[("n", ParamValue::Int(5))]), &mut rng()).unwrap();
        assert_eq!(g.node_count(), 5);
        assert_eq!(g.edge_count(), 10);
    }

    #[test]
    fn test_cycle() {
        let g = build("cycle", &params(&[("n", ParamValue::Int(6))]), &mut rng()).unwrap();
        assert_eq!(g.edge_count(), 6);
        for node in g.nodes() {
            assert_eq!(g.degree(node), 2);
        }
    }

    #[test]
    fn test_grid_2d() {
        let g = build(
            "grid_2d",
            &params(&[("rows", ParamValue::Int(3)), ("columns", ParamValue::Int(4))]),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(g.node_count(), 12);
        // 3*(4-1) horizontal + (3-1)*4 vertical
        assert_eq!(g.edge_count(), 17);
    }

    #[test]
    fn test_gnp_extremes() {
        let empty = build(
            "gnp_random",
            &params(&[("n", ParamValue::Int(10)), ("p", ParamValue::Float(0.0))]),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(empty.edge_count(), 0);

        let full = build(
            "gnp_random",
            &params(&[("n", ParamValue::Int(10)), ("p", ParamValue::Float(1.0))]),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(full.edge_count(), 45);
    }

    #[test]
    fn test_gnp_deterministic_per_seed() {
        let p = params(&[("n", ParamValue::Int(30)), ("p", ParamValue::Float(0.2))]);
        let a = build("gnp_random", &p, &mut rng()).unwrap();
        let b = build("gnp_random", &p, &mut rng()).unwrap();
        assert_eq!(a.edge_count(), b.edge_count());
        for e in a.edges() {
            assert_eq!(a.edge_endpoints(e), b.edge_endpoints(e));
        }
    }

    #[test]
    fn test_barabasi_albert_edge_count() {
        let g = build(
            "barabasi_albert",
            &params(&[("n", ParamValue::Int(20)), ("m", ParamValue::Int(2))]),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(g.node_count(), 20);
        // m seed-star edges + m per node beyond the first m + 1
        assert_eq!(g.edge_count(), 2 + 17 * 2);
    }

    #[test]
    fn test_unknown_generator() {
        let err = build("moebius", &GeneratorParams::new(), &mut rng()).unwrap_err();
        assert!(matches!(err, GeneratorError::UnknownGenerator(_)));
    }

    #[test]
    fn test_missing_parameter() {
        let err = build("complete", &GeneratorParams::new(), &mut rng()).unwrap_err();
        assert!(matches!(err, GeneratorError::MissingParameter { .. }));
    }

    #[test]
    fn test_invalid_probability() {
        let err = build(
            "gnp_random",
            &params(&[("n", ParamValue::Int(5)), ("p", ParamValue::Float(1.5))]),
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidParameter { .. }));
    }
}
