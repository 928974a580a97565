//! Assembling a [`ProcessDef`] from a parsed configuration file.
//!
//! Section layout:
//!
//! - `[NodeAttributes]` / `[EdgeAttributes]`: `name = v1, v2, ...` declares
//!   an attribute and its value domain.
//! - `[MeanFieldStates]`: bare partial-state lines, one tracked state each.
//! - `[NodeRules]` / `[EdgeRules]`: `partial -> partial = expression`, one
//!   per line, declaration order significant.

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{ProcessDef, RuleDecl};
use crate::config::{self, ConfigError, ConfigFile, Section};
use crate::parser::{self, ParseError};

const SECTION_NODE_ATTRIBUTES: &str = "NodeAttributes";
const SECTION_EDGE_ATTRIBUTES: &str = "EdgeAttributes";
const SECTION_MEAN_FIELD: &str = "MeanFieldStates";
const SECTION_NODE_RULES: &str = "NodeRules";
const SECTION_EDGE_RULES: &str = "EdgeRules";

/// Error while interpreting a process definition file
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("line {line}: attribute '{name}' declared with an empty domain")]
    EmptyDomain { line: usize, name: String },

    #[error("line {line}: attribute '{name}' declared twice")]
    DuplicateAttribute { line: usize, name: String },

    #[error("line {line}: attribute declaration '{name}' has no value list")]
    MissingDomain { line: usize, name: String },

    #[error("line {line}: mean-field declarations take no value, found '{text}'")]
    MeanFieldWithValue { line: usize, text: String },

    #[error("line {line}: rule '{text}' has no rate expression")]
    RuleWithoutRate { line: usize, text: String },

    #[error("line {line}: in '{text}': {source}")]
    Parse {
        line: usize,
        text: String,
        source: ParseError,
    },
}

impl ProcessDef {
    /// Build a process definition from configuration text
    pub fn parse(source: &str) -> Result<Self, DefinitionError> {
        let cfg = ConfigFile::parse(source)?;
        Self::from_config(&cfg)
    }

    /// Build a process definition from a parsed configuration file.
    ///
    /// All sections are optional; a definition with no edge attributes and
    /// no edge rules is the common case.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, DefinitionError> {
        let mut def = ProcessDef::default();

        if let Some(section) = cfg.section(SECTION_NODE_ATTRIBUTES) {
            def.node_attributes = attributes(section)?;
        }
        if let Some(section) = cfg.section(SECTION_EDGE_ATTRIBUTES) {
            def.edge_attributes = attributes(section)?;
        }
        if let Some(section) = cfg.section(SECTION_MEAN_FIELD) {
            for entry in &section.entries {
                if let Some(value) = &entry.value {
                    return Err(DefinitionError::MeanFieldWithValue {
                        line: entry.line,
                        text: format!("{} = {}", entry.key, value),
                    });
                }
                let state = parser::parse_partial_state_str(&entry.key).map_err(|source| {
                    DefinitionError::Parse {
                        line: entry.line,
                        text: entry.key.clone(),
                        source,
                    }
                })?;
                def.mean_field_states.push(state);
            }
        }
        if let Some(section) = cfg.section(SECTION_NODE_RULES) {
            def.node_rules = rules(section)?;
        }
        if let Some(section) = cfg.section(SECTION_EDGE_RULES) {
            def.edge_rules = rules(section)?;
        }

        Ok(def)
    }
}

fn attributes(section: &Section) -> Result<IndexMap<String, Vec<String>>, DefinitionError> {
    let mut attrs = IndexMap::new();
    for entry in &section.entries {
        let Some(value) = &entry.value else {
            return Err(DefinitionError::MissingDomain {
                line: entry.line,
                name: entry.key.clone(),
            });
        };
        let domain = config::parse_list(value);
        if domain.is_empty() {
            return Err(DefinitionError::EmptyDomain {
                line: entry.line,
                name: entry.key.clone(),
            });
        }
        if attrs.insert(entry.key.clone(), domain).is_some() {
            return Err(DefinitionError::DuplicateAttribute {
                line: entry.line,
                name: entry.key.clone(),
            });
        }
    }
    Ok(attrs)
}

fn rules(section: &Section) -> Result<Vec<RuleDecl>, DefinitionError> {
    let mut rules = Vec::new();
    for entry in &section.entries {
        let Some(rate_text) = &entry.value else {
            return Err(DefinitionError::RuleWithoutRate {
                line: entry.line,
                text: entry.key.clone(),
            });
        };
        let text = format!("{} = {}", entry.key, rate_text);
        let rule =
            parser::parse_rule_str(&text).map_err(|source| DefinitionError::Parse {
                line: entry.line,
                text: text.clone(),
                source,
            })?;
        rules.push(rule);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    const SIR: &str = r#"
[NodeAttributes]
status = S, I, R

[MeanFieldStates]
{status:S}
{status:I}
{status:R}

[NodeRules]
{status:S} -> {status:I} = NN({status:I}) * beta
{status:I} -> {status:R} = gamma
"#;

    #[test]
    fn test_sir_definition() {
        let def = ProcessDef::parse(SIR).unwrap();
        assert_eq!(def.node_attributes["status"], vec!["S", "I", "R"]);
        assert!(def.edge_attributes.is_empty());
        assert_eq!(def.mean_field_states.len(), 3);
        assert_eq!(def.node_rules.len(), 2);
        assert!(def.edge_rules.is_empty());

        let infect = &def.node_rules[0];
        assert_eq!(infect.source.constraints["status"], vec!["S"]);
        assert_eq!(infect.delta.constraints["status"], vec!["I"]);
        assert!(matches!(infect.rate, Expr::Binary { .. }));
    }

    #[test]
    fn test_rule_order_preserved() {
        let def = ProcessDef::parse(SIR).unwrap();
        assert_eq!(def.node_rules[0].delta.constraints["status"], vec!["I"]);
        assert_eq!(def.node_rules[1].delta.constraints["status"], vec!["R"]);
    }

    #[test]
    fn test_empty_domain_rejected() {
        let err = ProcessDef::parse("[NodeAttributes]\nstatus =\n").unwrap_err();
        assert!(err.to_string().contains("empty domain"));
    }

    #[test]
    fn test_rule_without_rate_rejected() {
        let src = "[NodeRules]\n{status:S} -> {status:I}\n";
        let err = ProcessDef::parse(src).unwrap_err();
        assert!(err.to_string().contains("no rate expression"));
    }

    #[test]
    fn test_malformed_rule_reports_line() {
        let src = "[NodeAttributes]\nstatus = S, I\n\n[NodeRules]\n{status:S} -> = beta\n";
        let err = ProcessDef::parse(src).unwrap_err();
        assert!(err.to_string().contains("line 5"));
    }
}
