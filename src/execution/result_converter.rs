//! SPARQL 1.1 Query Results JSON conversion.
//!
//! Decodes responses from remote endpoints into [`Binding`]s and encodes
//! federated results for the CLI and the HTTP endpoint.

use crate::core::Binding;
use crate::error::SourceError;
use oxrdf::{BlankNode, Literal, NamedNode, Term};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Deserialize)]
pub struct SparqlResultsDocument {
    #[serde(default)]
    pub head: Head,
    #[serde(default)]
    pub results: Option<Results>,
    #[serde(default)]
    pub boolean: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Results {
    pub bindings: Vec<HashMap<String, JsonTerm>>,
}

/// One RDF term in the JSON results format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTerm {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl JsonTerm {
    pub fn to_term(&self) -> Result<Term, SourceError> {
        match self.kind.as_str() {
            "uri" => NamedNode::new(self.value.as_str())
                .map(Term::from)
                .map_err(|e| SourceError::Response(format!("invalid IRI '{}': {}", self.value, e))),
            "bnode" => BlankNode::new(self.value.as_str()).map(Term::from).map_err(|e| {
                SourceError::Response(format!("invalid blank node '{}': {}", self.value, e))
            }),
            "literal" | "typed-literal" => {
                if let Some(lang) = &self.lang {
                    Literal::new_language_tagged_literal(self.value.as_str(), lang.as_str())
                        .map(Term::from)
                        .map_err(|e| SourceError::Response(format!("invalid language tag: {}", e)))
                } else if let Some(datatype) = &self.datatype {
                    let datatype = NamedNode::new(datatype.as_str()).map_err(|e| {
                        SourceError::Response(format!("invalid datatype '{}': {}", datatype, e))
                    })?;
                    Ok(Literal::new_typed_literal(self.value.as_str(), datatype).into())
                } else {
                    Ok(Literal::new_simple_literal(self.value.as_str()).into())
                }
            }
            other => Err(SourceError::Response(format!("unknown term type '{}'", other))),
        }
    }

    pub fn from_term(term: &Term) -> Self {
        match term {
            Term::NamedNode(node) => Self::plain("uri", node.as_str()),
            Term::BlankNode(node) => Self::plain("bnode", node.as_str()),
            Term::Literal(literal) => {
                let mut encoded = Self::plain("literal", literal.value());
                if let Some(lang) = literal.language() {
                    encoded.lang = Some(lang.to_string());
                } else if literal.datatype() != oxrdf::vocab::xsd::STRING {
                    encoded.datatype = Some(literal.datatype().as_str().to_string());
                }
                encoded
            }
            #[allow(unreachable_patterns)]
            other => Self::plain("literal", &other.to_string()),
        }
    }

    fn plain(kind: &str, value: &str) -> Self {
        Self { kind: kind.to_string(), value: value.to_string(), lang: None, datatype: None }
    }
}

/// Decoded body of a remote response.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResults {
    Solutions(Vec<Binding>),
    Boolean(bool),
}

pub fn parse_results(body: &[u8]) -> Result<RemoteResults, SourceError> {
    let document: SparqlResultsDocument = serde_json::from_slice(body)
        .map_err(|e| SourceError::Response(format!("invalid SPARQL JSON results: {}", e)))?;

    if let Some(boolean) = document.boolean {
        return Ok(RemoteResults::Boolean(boolean));
    }
    let results = document
        .results
        .ok_or_else(|| {
            SourceError::Response("neither 'results' nor 'boolean' present".to_string())
        })?;

    let mut rows = Vec::with_capacity(results.bindings.len());
    for row in results.bindings {
        let mut binding = Binding::new();
        for (variable, value) in row {
            binding.insert(variable, value.to_term()?);
        }
        rows.push(binding);
    }
    Ok(RemoteResults::Solutions(rows))
}

/// Encodes solutions as a SPARQL JSON results document.
pub fn solutions_to_json(variables: &[String], rows: &[Binding]) -> Value {
    let bindings: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (variable, term) in row {
                if let Ok(value) = serde_json::to_value(JsonTerm::from_term(term)) {
                    object.insert(variable.clone(), value);
                }
            }
            Value::Object(object)
        })
        .collect();
    json!({ "head": { "vars": variables }, "results": { "bindings": bindings } })
}

pub fn boolean_to_json(value: bool) -> Value {
    json!({ "head": {}, "boolean": value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select_results() {
        let body = br#"{
            "head": {"vars": ["x", "n"]},
            "results": {"bindings": [
                {"x": {"type": "uri", "value": "http://ex/alice"},
                 "n": {"type": "literal", "value": "Alice", "xml:lang": "en"}},
                {"x": {"type": "bnode", "value": "b1"},
                 "n": {"type": "literal", "value": "42",
                       "datatype": "http://www.w3.org/2001/XMLSchema#integer"}}
            ]}
        }"#;
        let RemoteResults::Solutions(rows) = parse_results(body).unwrap() else {
            panic!("expected solutions");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get("n"),
            Some(&Term::from(Literal::new_language_tagged_literal_unchecked("Alice", "en")))
        );
        assert!(matches!(rows[1].get("x"), Some(Term::BlankNode(_))));
    }

    #[test]
    fn test_parse_boolean() {
        let body = br#"{"head": {}, "boolean": true}"#;
        assert_eq!(parse_results(body).unwrap(), RemoteResults::Boolean(true));
    }

    #[test]
    fn test_invalid_body_is_response_error() {
        assert!(matches!(parse_results(b"<html>"), Err(SourceError::Response(_))));
    }

    #[test]
    fn test_invalid_blank_node_label_is_response_error() {
        let body = br#"{
            "head": {"vars": ["x"]},
            "results": {"bindings": [{"x": {"type": "bnode", "value": "not a label"}}]}
        }"#;
        let err = parse_results(body).unwrap_err();
        assert!(matches!(&err, SourceError::Response(message) if message.contains("not a label")));
    }

    #[test]
    fn test_encode_solutions() {
        let row = Binding::new()
            .with("x", NamedNode::new_unchecked("http://ex/a"))
            .with("n", Literal::new_simple_literal("A"));
        let json = solutions_to_json(&["x".to_string(), "n".to_string()], &[row]);
        assert_eq!(json["head"]["vars"][0], "x");
        assert_eq!(json["results"]["bindings"][0]["x"]["type"], "uri");
        assert!(json["results"]["bindings"][0]["n"].get("datatype").is_none());
    }
}
