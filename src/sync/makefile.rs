use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Serialize;

/// `[export ]NAME=VALUE[#comment]`
static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?([A-Za-z0-9_]+)=([^#]*)(?:#.*)?$").expect("assignment regex")
});

/// `@echo "KEY: VALUE"` with anything after the closing quote ignored
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*@echo\s+"([A-Za-z0-9_]+):\s+([^"]*)".*$"#).expect("declaration regex")
});

/// `$NAME` or `$(NAME)`
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(?([A-Za-z0-9_]+)\)?").expect("reference regex"));

/// A declared value; keys that occur more than once collect into a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    List(Vec<String>),
}

impl FieldValue {
    /// All values in declaration order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::List(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Values joined with a single space.
    pub fn joined(&self) -> String {
        self.values().join(" ")
    }

    /// The first declared value.
    pub fn first(&self) -> &str {
        match self {
            Self::Single(value) => value,
            Self::List(values) => values.first().map_or("", String::as_str),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => *self = Self::List(vec![std::mem::take(first), value]),
            Self::List(values) => values.push(value),
        }
    }
}

/// Metadata declared by one test Makefile, keyed by field name in
/// declaration order (e.g. `Name`, `Owner`, `RhtsRequires`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Descriptor {
    fields: IndexMap<String, FieldValue>,
}

impl Descriptor {
    /// Parses Makefile text. Lines that are neither assignments nor
    /// `@echo` declarations are ignored.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let variables = bind_variables(&lines);
        Self::from_declarations(&lines, &variables)
    }

    fn from_declarations(lines: &[&str], variables: &HashMap<String, String>) -> Self {
        let mut fields: IndexMap<String, FieldValue> = IndexMap::new();

        for line in lines {
            let Some(caps) = DECLARATION.captures(line) else {
                continue;
            };
            let key = caps[1].to_string();
            let value = substitute(&caps[2], variables).trim().to_string();

            match fields.get_mut(&key) {
                Some(existing) => existing.push(value),
                None => {
                    fields.insert(key, FieldValue::Single(value));
                }
            }
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// First value of a field, if declared.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).map(FieldValue::first)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Binds Makefile variables in a single left-to-right pass. References
/// resolve only against variables bound on earlier lines.
fn bind_variables(lines: &[&str]) -> HashMap<String, String> {
    let mut variables = HashMap::new();

    for line in lines {
        let Some(caps) = ASSIGNMENT.captures(line) else {
            continue;
        };
        let raw = caps[2].trim().trim_matches('"');
        let value = substitute(raw, &variables).trim().to_string();
        variables.insert(caps[1].to_string(), value);
    }

    variables
}

/// Replaces variable references; unknown variables become empty.
fn substitute(value: &str, variables: &HashMap<String, String>) -> String {
    REFERENCE
        .replace_all(value, |caps: &Captures| {
            variables.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
