//! Ini-style configuration reader.
//!
//! Both process definition files and simulation configuration files share
//! this format: `[Section]` headers, `key = value` options, and bare
//! option-only lines (used for mean-field state declarations). Declaration
//! order is preserved everywhere because rule order is significant.

use indexmap::IndexMap;
use thiserror::Error;

/// Error while reading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: entry '{text}' appears before any [Section] header")]
    EntryOutsideSection { line: usize, text: String },

    #[error("line {line}: malformed section header '{text}'")]
    MalformedHeader { line: usize, text: String },

    #[error("line {line}: duplicate section [{name}]")]
    DuplicateSection { line: usize, name: String },
}

/// One entry in a section: `key = value`, or a bare option with no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Option<String>,
    /// 1-based source line, kept for diagnostics
    pub line: usize,
}

/// A named section with its entries in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub entries: Vec<Entry>,
}

impl Section {
    /// Look up the value of a `key = value` entry
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: IndexMap<String, Section>,
}

impl ConfigFile {
    /// Parse configuration text.
    ///
    /// Blank lines and `#`/`;` comment lines are skipped. A `key = value`
    /// line splits on the first `=`; everything before it (trimmed) is the
    /// key, which allows rule declarations like
    /// `{status:S} -> {status:I} = NN({status:I}) * beta` where the key is
    /// the mapping and the value is the rate expression.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut sections: IndexMap<String, Section> = IndexMap::new();
        let mut current: Option<String> = None;

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') || text.starts_with(';') {
                continue;
            }

            if text.starts_with('[') {
                if !text.ends_with(']') || text.len() < 3 {
                    return Err(ConfigError::MalformedHeader {
                        line,
                        text: text.to_string(),
                    });
                }
                let name = text[1..text.len() - 1].trim().to_string();
                if sections.contains_key(&name) {
                    return Err(ConfigError::DuplicateSection { line, name });
                }
                sections.insert(name.clone(), Section::default());
                current = Some(name);
                continue;
            }

            let Some(section) = current.as_ref() else {
                return Err(ConfigError::EntryOutsideSection {
                    line,
                    text: text.to_string(),
                });
            };

            let entry = match text.split_once('=') {
                Some((key, value)) => Entry {
                    key: key.trim().to_string(),
                    value: Some(value.trim().to_string()),
                    line,
                },
                None => Entry {
                    key: text.to_string(),
                    value: None,
                    line,
                },
            };
            sections[section].entries.push(entry);
        }

        Ok(Self { sections })
    }

    /// Get a section by name
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Get a `key = value` option from a section
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Iterate sections in declaration order
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(name, s)| (name.as_str(), s))
    }

    /// Render the configuration back to text (for resolved-config output)
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            out.push('[');
            out.push_str(name);
            out.push_str("]\n");
            for entry in &section.entries {
                match &entry.value {
                    Some(value) => {
                        out.push_str(&entry.key);
                        out.push_str(" = ");
                        out.push_str(value);
                        out.push('\n');
                    }
                    None => {
                        out.push_str(&entry.key);
                        out.push('\n');
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Split a comma-separated value list, trimming whitespace around items
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# An SIR process
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
    fn test_sections_and_options() {
        let cfg = ConfigFile::parse(SAMPLE).unwrap();
        assert_eq!(cfg.get("NodeAttributes", "status"), Some("S, I, R"));
        assert_eq!(
            parse_list(cfg.get("NodeAttributes", "status").unwrap()),
            vec!["S", "I", "R"]
        );
    }

    #[test]
    fn test_bare_options_preserve_order() {
        let cfg = ConfigFile::parse(SAMPLE).unwrap();
        let mf = cfg.section("MeanFieldStates").unwrap();
        let keys: Vec<&str> = mf.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["{status:S}", "{status:I}", "{status:R}"]);
        assert!(mf.entries.iter().all(|e| e.value.is_none()));
    }

    #[test]
    fn test_rule_lines_split_on_first_equals() {
        let cfg = ConfigFile::parse(SAMPLE).unwrap();
        let rules = cfg.section("NodeRules").unwrap();
        assert_eq!(rules.entries[0].key, "{status:S} -> {status:I}");
        assert_eq!(
            rules.entries[0].value.as_deref(),
            Some("NN({status:I}) * beta")
        );
        assert_eq!(rules.entries[1].key, "{status:I} -> {status:R}");
        assert_eq!(rules.entries[1].value.as_deref(), Some("gamma"));
    }

    #[test]
    fn test_entry_outside_section() {
        let err = ConfigFile::parse("orphan = 1\n[S]\n").unwrap_err();
        assert!(matches!(err, ConfigError::EntryOutsideSection { line: 1, .. }));
    }

    #[test]
    fn test_duplicate_section() {
        let err = ConfigFile::parse("[A]\n[A]\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSection { .. }));
    }

    #[test]
    fn test_roundtrip_text() {
        let cfg = ConfigFile::parse(SAMPLE).unwrap();
        let rendered = cfg.to_text();
        let reparsed = ConfigFile::parse(&rendered).unwrap();
        assert_eq!(cfg, reparsed);
    }
}
