//! Solution bindings streamed between operators

use oxrdf::{BlankNode, Term};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::fmt;

/// One result row: variable name → bound term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binding {
    values: BTreeMap<String, Term>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variable: impl Into<String>, value: Term) {
        self.values.insert(variable.into(), value);
    }

    pub fn with(mut self, variable: impl Into<String>, value: impl Into<Term>) -> Self {
        self.insert(variable, value.into());
        self
    }

    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.values.get(variable)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.values.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Term> {
        self.values.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Restricts the row to the given variables. Unbound ones stay unbound.
    pub fn project<'a>(&self, variables: impl IntoIterator<Item = &'a String>) -> Binding {
        let mut projected = Binding::new();
        for variable in variables {
            if let Some(value) = self.values.get(variable) {
                projected.insert(variable.clone(), value.clone());
            }
        }
        projected
    }

    /// Values of `variables` in order, used as a join key.
    pub fn key(&self, variables: &BTreeSet<String>) -> Vec<Option<Term>> {
        variables.iter().map(|v| self.values.get(v).cloned()).collect()
    }

    /// Whether both rows agree on every variable they share.
    pub fn is_compatible(&self, other: &Binding) -> bool {
        let (small, large) =
            if self.len() <= other.len() { (self, other) } else { (other, self) };
        small.values.iter().all(|(variable, value)| match large.values.get(variable) {
            Some(other_value) => other_value == value,
            None => true,
        })
    }

    /// Merges two compatible rows, `None` when they disagree.
    pub fn merge(&self, other: &Binding) -> Option<Binding> {
        if !self.is_compatible(other) {
            return None;
        }
        let mut merged = self.clone();
        for (variable, value) in &other.values {
            merged.values.entry(variable.clone()).or_insert_with(|| value.clone());
        }
        Some(merged)
    }

    /// Prefixes blank node labels with a hex encoding of `scope`, so equal
    /// labels coming from different sources never join or deduplicate.
    pub fn scope_blank_nodes(self, scope: &str) -> Binding {
        if !self.values.values().any(|term| matches!(term, Term::BlankNode(_))) {
            return self;
        }
        let prefix: String = scope.bytes().map(|b| format!("{:02x}", b)).collect();
        self.values
            .into_iter()
            .map(|(variable, term)| match term {
                Term::BlankNode(node) => {
                    let label = format!("{}_{}", prefix, node.as_str());
                    (variable, BlankNode::new_unchecked(label).into())
                }
                other => (variable, other),
            })
            .collect()
    }
}

impl FromIterator<(String, Term)> for Binding {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a Binding {
    type Item = (&'a String, &'a Term);
    type IntoIter = btree_map::Iter<'a, String, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (variable, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "?{}={}", variable, value)?;
        }
        f.write_str("}")
    }
}
