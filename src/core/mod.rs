//! Core data structures shared by every stage of the federation pipeline

use oxrdf::{NamedNode, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a federation member. Ordered so that source sets compare
/// and print deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A set of candidate sources. The empty set marks an unsatisfiable fragment.
pub type SourceSet = BTreeSet<SourceId>;

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// A bound RDF term
    Term(Term),
    /// A named variable (stored without the leading `?`)
    Var(String),
    /// A blank pattern slot that occurs exactly once and is never projected
    Blank,
}

impl Slot {
    pub fn var(name: impl Into<String>) -> Self {
        Slot::Var(name.into())
    }

    pub fn iri(iri: &str) -> Self {
        Slot::Term(Term::NamedNode(NamedNode::new_unchecked(iri)))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Slot::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Slot::Term(term) => Some(term),
            _ => None,
        }
    }

    pub fn as_named_node(&self) -> Option<&NamedNode> {
        match self {
            Slot::Term(Term::NamedNode(node)) => Some(node),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Slot::Term(_))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Term(term) => write!(f, "{}", term),
            Slot::Var(name) => write!(f, "?{}", name),
            Slot::Blank => f.write_str("[]"),
        }
    }
}

/// One atomic triple pattern (a query fragment).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: Slot,
    pub predicate: Slot,
    pub object: Slot,
}

impl TriplePattern {
    pub fn new(subject: Slot, predicate: Slot, object: Slot) -> Self {
        Self { subject, predicate, object }
    }

    pub fn slots(&self) -> [&Slot; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Named variables introduced by this pattern.
    pub fn variables(&self) -> BTreeSet<String> {
        self.slots().iter().filter_map(|slot| slot.as_var()).map(str::to_string).collect()
    }

    /// Named variables in subject, predicate, object order, without duplicates.
    pub fn variables_in_order(&self) -> Vec<String> {
        let mut ordered = Vec::new();
        for name in self.slots().iter().filter_map(|slot| slot.as_var()) {
            if !ordered.iter().any(|seen: &String| seen == name) {
                ordered.push(name.to_string());
            }
        }
        ordered
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

pub mod binding;
pub use binding::Binding;
