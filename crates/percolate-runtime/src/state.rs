//! Attribute declarations, full states, and validated partial states.
//!
//! An [`AttributeSet`] fixes the attribute names and value domains once, at
//! process construction. A [`FullState`] is one value per declared attribute,
//! stored in declaration order so it is cheap to hash and compare. A
//! [`PartialState`] is the validated, index-resolved form of the surface
//! syntax: matching is a predicate over the constrained attributes only, and
//! expansion enumerates the full states it matches.

use indexmap::IndexMap;
use percolate_dsl::PartialStateExpr;
use percolate_network::AttrMap;
use thiserror::Error;

use crate::error::{Error, Result};

/// Declared attributes and their value domains, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: IndexMap<String, Vec<String>>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute with its value domain
    pub fn declare(&mut self, name: impl Into<String>, domain: Vec<String>) -> Result<()> {
        let name = name.into();
        if domain.is_empty() {
            return Err(Error::configuration(format!(
                "attribute '{name}' declared with an empty domain"
            )));
        }
        let mut seen = Vec::with_capacity(domain.len());
        for value in &domain {
            if seen.contains(&value) {
                return Err(Error::configuration(format!(
                    "attribute '{name}' lists value '{value}' twice"
                )));
            }
            seen.push(value);
        }
        if self.attrs.insert(name.clone(), domain).is_some() {
            return Err(Error::configuration(format!(
                "attribute '{name}' declared twice"
            )));
        }
        Ok(())
    }

    pub fn from_declarations(decls: &IndexMap<String, Vec<String>>) -> Result<Self> {
        let mut set = Self::new();
        for (name, domain) in decls {
            set.declare(name.clone(), domain.clone())?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attrs.get_index_of(name)
    }

    pub fn name(&self, index: usize) -> &str {
        self.attrs.get_index(index).map(|(n, _)| n.as_str()).unwrap_or("")
    }

    pub fn domain(&self, index: usize) -> &[String] {
        self.attrs
            .get_index(index)
            .map(|(_, d)| d.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attrs.iter().map(|(n, d)| (n.as_str(), d.as_slice()))
    }

    /// Number of distinct full states over these attributes
    pub fn state_space_size(&self) -> usize {
        self.attrs.values().map(|d| d.len()).product()
    }
}

/// Why a full state could not be read off an entity
#[derive(Debug, Error)]
pub enum StateDefect {
    #[error("attribute '{0}' is missing")]
    MissingAttribute(String),

    #[error("attribute '{attr}' holds '{value}', which is outside its declared domain")]
    UndeclaredValue { attr: String, value: String },
}

/// One value per declared attribute, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullState(Vec<String>);

impl FullState {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    /// Read an entity's full state from its attribute map
    pub fn from_attrs(attrs: &AttributeSet, map: &AttrMap) -> std::result::Result<Self, StateDefect> {
        let mut values = Vec::with_capacity(attrs.len());
        for (name, domain) in attrs.iter() {
            let Some(value) = map.get(name) else {
                return Err(StateDefect::MissingAttribute(name.to_string()));
            };
            if !domain.iter().any(|v| v == value) {
                return Err(StateDefect::UndeclaredValue {
                    attr: name.to_string(),
                    value: value.clone(),
                });
            }
            values.push(value.clone());
        }
        Ok(Self(values))
    }

    /// Write this state into an entity's attribute map
    pub fn write_attrs(&self, attrs: &AttributeSet, map: &mut AttrMap) {
        for (index, value) in self.0.iter().enumerate() {
            map.insert(attrs.name(index).to_string(), value.clone());
        }
    }

    pub fn value(&self, index: usize) -> &str {
        &self.0[index]
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Render with attribute names, e.g. `{status:I, age:old}`
    pub fn describe(&self, attrs: &AttributeSet) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}:{}", attrs.name(i), v))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

/// A validated partial state: constraints resolved to attribute indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialState {
    /// (attribute index, allowed values), sorted by index
    constraints: Vec<(usize, Vec<String>)>,
}

impl PartialState {
    /// The empty partial state, matching every full state
    pub fn empty() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Validate surface syntax against declared attributes.
    ///
    /// Undeclared attribute names or out-of-domain values fail here, so
    /// matching and application never fail at run time.
    pub fn compile(expr: &PartialStateExpr, attrs: &AttributeSet) -> Result<Self> {
        let mut constraints = Vec::with_capacity(expr.constraints.len());
        for (name, values) in &expr.constraints {
            let Some(index) = attrs.index_of(name) else {
                return Err(Error::configuration(format!(
                    "'{expr}' references undeclared attribute '{name}'"
                )));
            };
            let domain = attrs.domain(index);
            for value in values {
                if !domain.iter().any(|v| v == value) {
                    return Err(Error::configuration(format!(
                        "'{expr}' uses value '{value}' outside the domain of '{name}'"
                    )));
                }
            }
            constraints.push((index, values.clone()));
        }
        constraints.sort_by_key(|(index, _)| *index);
        Ok(Self { constraints })
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// True iff every constrained attribute of `full` holds an allowed value
    pub fn matches(&self, full: &FullState) -> bool {
        self.constraints
            .iter()
            .all(|(index, values)| values.iter().any(|v| v == full.value(*index)))
    }

    /// Predicate form over a raw attribute map (used for edge filters)
    pub fn matches_map(&self, attrs: &AttributeSet, map: &AttrMap) -> bool {
        self.constraints.iter().all(|(index, values)| {
            map.get(attrs.name(*index))
                .is_some_and(|held| values.iter().any(|v| v == held))
        })
    }

    /// Enumerate every full state this partial state matches.
    ///
    /// Cartesian product over unconstrained attributes; only used for
    /// mean-field targets and initial-distribution targets, never on the
    /// per-entity update path.
    pub fn expand(&self, attrs: &AttributeSet) -> Vec<FullState> {
        let mut choices: Vec<&[String]> = Vec::with_capacity(attrs.len());
        for index in 0..attrs.len() {
            match self.constraints.iter().find(|(i, _)| *i == index) {
                Some((_, values)) => choices.push(values.as_slice()),
                None => choices.push(attrs.domain(index)),
            }
        }

        let mut states = vec![Vec::new()];
        for domain in choices {
            let mut next = Vec::with_capacity(states.len() * domain.len());
            for prefix in &states {
                for value in domain {
                    let mut s = prefix.clone();
                    s.push(value.clone());
                    next.push(s);
                }
            }
            states = next;
        }
        states.into_iter().map(FullState).collect()
    }

    /// Apply this partial state as a delta: listed attributes take the
    /// delta's value, all others are carried over unchanged.
    ///
    /// Deltas are validated single-valued at rule compilation, so this never
    /// fails.
    pub fn apply(&self, full: &FullState) -> FullState {
        let mut values = full.0.clone();
        for (index, replacement) in &self.constraints {
            debug_assert_eq!(replacement.len(), 1);
            values[*index] = replacement[0].clone();
        }
        FullState(values)
    }

    /// True iff every constraint names exactly one value (required of deltas)
    pub fn is_single_valued(&self) -> bool {
        self.constraints.iter().all(|(_, values)| values.len() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_dsl::parse_partial_state_str;

    fn attrs() -> AttributeSet {
        let mut a = AttributeSet::new();
        a.declare("status", svec(&["S", "I", "R"])).unwrap();
        a.declare("age", svec(&["young", "old"])).unwrap();
        a
    }

    fn svec(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn compile(text: &str, attrs: &AttributeSet) -> PartialState {
        PartialState::compile(&parse_partial_state_str(text).unwrap(), attrs).unwrap()
    }

    #[test]
    fn test_declare_rejects_duplicates_and_empty() {
        let mut a = AttributeSet::new();
        a.declare("status", svec(&["S"])).unwrap();
        assert!(a.declare("status", svec(&["X"])).is_err());
        assert!(a.declare("other", vec![]).is_err());
        assert!(a.declare("twice", svec(&["a", "a"])).is_err());
    }

    #[test]
    fn test_matching() {
        let attrs = attrs();
        let s = FullState::new(svec(&["I", "old"]));

        assert!(compile("{}", &attrs).matches(&s));
        assert!(compile("{status:I}", &attrs).matches(&s));
        assert!(compile("{status:(S, I)}", &attrs).matches(&s));
        assert!(compile("{status:I, age:old}", &attrs).matches(&s));
        assert!(!compile("{status:S}", &attrs).matches(&s));
        assert!(!compile("{status:I, age:young}", &attrs).matches(&s));
    }

    #[test]
    fn test_compile_rejects_undeclared() {
        let attrs = attrs();
        let expr = parse_partial_state_str("{mood:happy}").unwrap();
        assert!(PartialState::compile(&expr, &attrs).is_err());

        let expr = parse_partial_state_str("{status:X}").unwrap();
        assert!(PartialState::compile(&expr, &attrs).is_err());
    }

    #[test]
    fn test_expansion_cardinality() {
        let attrs = attrs();
        // unconstrained age: 2 full states
        let states = compile("{status:S}", &attrs).expand(&attrs);
        assert_eq!(states.len(), 2);
        let p = compile("{status:S}", &attrs);
        assert!(states.iter().all(|s| p.matches(s)));

        // empty partial: the whole state space
        assert_eq!(compile("{}", &attrs).expand(&attrs).len(), 6);
        assert_eq!(attrs.state_space_size(), 6);

        // alternation constrains without pinning
        assert_eq!(compile("{status:(S, I)}", &attrs).expand(&attrs).len(), 4);
    }

    #[test]
    fn test_apply_delta_overwrites_only_listed() {
        let attrs = attrs();
        let s = FullState::new(svec(&["S", "old"]));
        let next = compile("{status:I}", &attrs).apply(&s);
        assert_eq!(next.values(), &svec(&["I", "old"]));
    }

    #[test]
    fn test_from_attrs_defects() {
        let attrs = attrs();
        let mut map = AttrMap::new();
        map.insert("status".to_string(), "I".to_string());

        assert!(matches!(
            FullState::from_attrs(&attrs, &map),
            Err(StateDefect::MissingAttribute(_))
        ));

        map.insert("age".to_string(), "ancient".to_string());
        assert!(matches!(
            FullState::from_attrs(&attrs, &map),
            Err(StateDefect::UndeclaredValue { .. })
        ));

        map.insert("age".to_string(), "old".to_string());
        let s = FullState::from_attrs(&attrs, &map).unwrap();
        assert_eq!(s.describe(&attrs), "{status:I, age:old}");
    }

    #[test]
    fn test_write_attrs_roundtrip() {
        let attrs = attrs();
        let s = FullState::new(svec(&["R", "young"]));
        let mut map = AttrMap::new();
        map.insert("unrelated".to_string(), "kept".to_string());
        s.write_attrs(&attrs, &mut map);
        assert_eq!(FullState::from_attrs(&attrs, &map).unwrap(), s);
        assert_eq!(map.get("unrelated").unwrap(), "kept");
    }
}
