//! Decomposes SPARQL queries into federatable fragments.
//!
//! A query is parsed with spargebra and flattened into union branches. Each
//! branch is a conjunction of triple patterns plus the filters that apply to
//! it. Solution modifiers at the top of the algebra are lifted out and applied
//! once the federated rows are available.

use crate::core::{Slot, SourceSet, TriplePattern};
use crate::error::{FederationError, Result};
use oxrdf::Term;
use spargebra::algebra::{Expression, GraphPattern};
use spargebra::term::{NamedNodePattern, TermPattern};
use spargebra::Query;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Prefix of the variables that stand in for blank nodes shared by several patterns.
pub const BLANK_VARIABLE_PREFIX: &str = "__bnode_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    Select,
    Ask,
}

/// A filter condition together with the variables it mentions.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub expression: Expression,
    pub variables: BTreeSet<String>,
    /// Triple patterns matched inside `EXISTS` clauses.
    pub exists_patterns: Vec<TriplePattern>,
    /// Candidate sources of each entry of `exists_patterns`, filled in by
    /// `SourceSelector::scope_filters`. Empty until then.
    pub exists_sources: Vec<SourceSet>,
}

impl FilterCondition {
    pub fn new(expression: Expression) -> Self {
        let mut variables = BTreeSet::new();
        collect_expression_variables(&expression, &mut variables);
        let mut exists_patterns = Vec::new();
        collect_exists_patterns(&expression, &mut exists_patterns);
        Self { expression, variables, exists_patterns, exists_sources: Vec::new() }
    }

    /// Whether every `EXISTS` pattern can only be answered by `sources`, and
    /// that is a single source.
    pub fn exists_local_to(&self, sources: &SourceSet) -> bool {
        sources.len() == 1
            && self.exists_sources.len() == self.exists_patterns.len()
            && self.exists_sources.iter().all(|candidates| candidates == sources)
    }

    /// Whether evaluating this condition requires a pattern match (`EXISTS`).
    pub fn has_exists(&self) -> bool {
        expression_has_exists(&self.expression)
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// One conjunctive branch of the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBranch {
    pub fragments: Vec<TriplePattern>,
    pub filters: Vec<FilterCondition>,
}

impl QueryBranch {
    /// Named variables bound by the fragments, in first-occurrence order.
    pub fn variables(&self) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::new();
        for fragment in &self.fragments {
            for variable in fragment.variables_in_order() {
                if !ordered.contains(&variable) {
                    ordered.push(variable);
                }
            }
        }
        ordered
    }
}

/// Solution modifiers applied at the stream boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionModifiers {
    /// Projected variables; `None` keeps every variable.
    pub projection: Option<Vec<String>>,
    pub distinct: bool,
    pub reduced: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedQuery {
    pub form: QueryForm,
    pub branches: Vec<QueryBranch>,
    pub modifiers: SolutionModifiers,
}

impl DecomposedQuery {
    /// Output variables: the projection, or every branch variable in order.
    pub fn result_variables(&self) -> Vec<String> {
        if let Some(projection) = &self.modifiers.projection {
            return projection.clone();
        }
        let mut ordered: Vec<String> = Vec::new();
        for branch in &self.branches {
            for variable in branch.variables() {
                if !variable.starts_with(BLANK_VARIABLE_PREFIX) && !ordered.contains(&variable) {
                    ordered.push(variable);
                }
            }
        }
        ordered
    }

    pub fn fragment_count(&self) -> usize {
        self.branches.iter().map(|b| b.fragments.len()).sum()
    }
}

/// Parser front-end of the federation.
#[derive(Debug, Clone, Default)]
pub struct QueryParser;

impl QueryParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> Result<DecomposedQuery> {
        let query = Query::parse(text, None)?;
        self.decompose(&query)
    }

    pub fn decompose(&self, query: &Query) -> Result<DecomposedQuery> {
        let (form, dataset, pattern) = match query {
            Query::Select { dataset, pattern, .. } => (QueryForm::Select, dataset, pattern),
            Query::Ask { dataset, pattern, .. } => (QueryForm::Ask, dataset, pattern),
            Query::Construct { .. } => return Err(unsupported("CONSTRUCT queries")),
            Query::Describe { .. } => return Err(unsupported("DESCRIBE queries")),
        };
        if dataset.is_some() {
            return Err(unsupported("FROM / FROM NAMED dataset clauses"));
        }

        let mut modifiers = SolutionModifiers::default();
        let body = lift_modifiers(pattern, &mut modifiers)?;

        let mut blank_counts = HashMap::new();
        count_blank_nodes(body, &mut blank_counts);

        let branches = flatten(body, &blank_counts)?;
        if branches.iter().any(|b| b.fragments.is_empty()) {
            return Err(unsupported("group patterns without triple patterns"));
        }

        Ok(DecomposedQuery { form, branches, modifiers })
    }
}

fn unsupported(what: &str) -> FederationError {
    FederationError::UnsupportedFragment(what.to_string())
}

/// Peels Slice/Distinct/Reduced/Project off the top of the algebra tree.
fn lift_modifiers<'a>(
    mut pattern: &'a GraphPattern,
    modifiers: &mut SolutionModifiers,
) -> Result<&'a GraphPattern> {
    loop {
        pattern = match pattern {
            GraphPattern::Slice { inner, start, length } => {
                modifiers.offset = *start;
                modifiers.limit = *length;
                inner.as_ref()
            }
            GraphPattern::Distinct { inner } => {
                modifiers.distinct = true;
                inner.as_ref()
            }
            GraphPattern::Reduced { inner } => {
                modifiers.reduced = true;
                inner.as_ref()
            }
            GraphPattern::Project { inner, variables } => {
                modifiers.projection =
                    Some(variables.iter().map(|v| v.as_str().to_string()).collect());
                return match inner.as_ref() {
                    GraphPattern::Extend { .. } => Err(unsupported("SELECT expressions")),
                    GraphPattern::Group { .. } => Err(unsupported("aggregation")),
                    GraphPattern::OrderBy { .. } => Err(unsupported("ORDER BY")),
                    other => Ok(other),
                };
            }
            GraphPattern::OrderBy { .. } => return Err(unsupported("ORDER BY")),
            other => return Ok(other),
        };
    }
}

fn flatten(pattern: &GraphPattern, blanks: &HashMap<String, usize>) -> Result<Vec<QueryBranch>> {
    match pattern {
        GraphPattern::Bgp { patterns } => {
            let fragments =
                patterns.iter().map(|p| convert_pattern(p, blanks)).collect::<Result<Vec<_>>>()?;
            Ok(vec![QueryBranch { fragments, filters: Vec::new() }])
        }
        GraphPattern::Join { left, right } => {
            let left = flatten(left, blanks)?;
            let right = flatten(right, blanks)?;
            let mut joined = Vec::with_capacity(left.len() * right.len());
            for l in &left {
                for r in &right {
                    let mut branch = l.clone();
                    branch.fragments.extend(r.fragments.iter().cloned());
                    branch.filters.extend(r.filters.iter().cloned());
                    joined.push(branch);
                }
            }
            Ok(joined)
        }
        GraphPattern::Filter { expr, inner } => {
            let mut branches = flatten(inner, blanks)?;
            let condition = FilterCondition::new(expr.clone());
            for branch in &mut branches {
                branch.filters.push(condition.clone());
            }
            Ok(branches)
        }
        GraphPattern::Union { left, right } => {
            let mut branches = flatten(left, blanks)?;
            branches.extend(flatten(right, blanks)?);
            Ok(branches)
        }
        GraphPattern::LeftJoin { .. } => Err(unsupported("OPTIONAL")),
        GraphPattern::Minus { .. } => Err(unsupported("MINUS")),
        GraphPattern::Graph { .. } => Err(unsupported("GRAPH")),
        GraphPattern::Service { .. } => Err(unsupported("SERVICE")),
        GraphPattern::Values { .. } => Err(unsupported("VALUES")),
        GraphPattern::Extend { .. } => Err(unsupported("BIND")),
        GraphPattern::Path { .. } => Err(unsupported("property paths")),
        GraphPattern::Group { .. } => Err(unsupported("aggregation")),
        GraphPattern::OrderBy { .. } => Err(unsupported("ORDER BY")),
        GraphPattern::Project { .. }
        | GraphPattern::Distinct { .. }
        | GraphPattern::Reduced { .. }
        | GraphPattern::Slice { .. } => Err(unsupported("sub-select")),
        #[allow(unreachable_patterns)]
        _ => Err(unsupported("graph pattern")),
    }
}

fn convert_pattern(
    pattern: &spargebra::term::TriplePattern,
    blanks: &HashMap<String, usize>,
) -> Result<TriplePattern> {
    let predicate = match &pattern.predicate {
        NamedNodePattern::NamedNode(node) => Slot::Term(Term::NamedNode(node.clone())),
        NamedNodePattern::Variable(variable) => Slot::Var(variable.as_str().to_string()),
    };
    Ok(TriplePattern::new(
        convert_term(&pattern.subject, blanks)?,
        predicate,
        convert_term(&pattern.object, blanks)?,
    ))
}

fn convert_term(term: &TermPattern, blanks: &HashMap<String, usize>) -> Result<Slot> {
    match term {
        TermPattern::NamedNode(node) => Ok(Slot::Term(Term::NamedNode(node.clone()))),
        TermPattern::Literal(literal) => Ok(Slot::Term(Term::Literal(literal.clone()))),
        TermPattern::Variable(variable) => Ok(Slot::Var(variable.as_str().to_string())),
        TermPattern::BlankNode(node) => {
            if blanks.get(node.as_str()).copied().unwrap_or(0) > 1 {
                Ok(Slot::Var(format!("{}{}", BLANK_VARIABLE_PREFIX, node.as_str())))
            } else {
                Ok(Slot::Blank)
            }
        }
        #[allow(unreachable_patterns)]
        _ => Err(unsupported("quoted triple patterns")),
    }
}

fn count_blank_nodes(pattern: &GraphPattern, counts: &mut HashMap<String, usize>) {
    match pattern {
        GraphPattern::Bgp { patterns } => {
            for triple in patterns {
                for term in [&triple.subject, &triple.object] {
                    if let TermPattern::BlankNode(node) = term {
                        *counts.entry(node.as_str().to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
        GraphPattern::Join { left, right } | GraphPattern::Union { left, right } => {
            count_blank_nodes(left, counts);
            count_blank_nodes(right, counts);
        }
        GraphPattern::Filter { inner, .. } => count_blank_nodes(inner, counts),
        _ => {}
    }
}

fn collect_expression_variables(expression: &Expression, out: &mut BTreeSet<String>) {
    match expression {
        Expression::Variable(v) | Expression::Bound(v) => {
            out.insert(v.as_str().to_string());
        }
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            collect_expression_variables(a, out);
            collect_expression_variables(b, out);
        }
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            collect_expression_variables(e, out);
        }
        Expression::In(e, list) => {
            collect_expression_variables(e, out);
            for item in list {
                collect_expression_variables(item, out);
            }
        }
        Expression::If(a, b, c) => {
            collect_expression_variables(a, out);
            collect_expression_variables(b, out);
            collect_expression_variables(c, out);
        }
        Expression::Coalesce(list) | Expression::FunctionCall(_, list) => {
            for item in list {
                collect_expression_variables(item, out);
            }
        }
        Expression::Exists(pattern) => collect_pattern_variables(pattern, out),
        _ => {}
    }
}

fn collect_pattern_variables(pattern: &GraphPattern, out: &mut BTreeSet<String>) {
    match pattern {
        GraphPattern::Bgp { patterns } => {
            for triple in patterns {
                for term in [&triple.subject, &triple.object] {
                    if let TermPattern::Variable(v) = term {
                        out.insert(v.as_str().to_string());
                    }
                }
                if let NamedNodePattern::Variable(v) = &triple.predicate {
                    out.insert(v.as_str().to_string());
                }
            }
        }
        GraphPattern::Join { left, right } | GraphPattern::Union { left, right } => {
            collect_pattern_variables(left, out);
            collect_pattern_variables(right, out);
        }
        GraphPattern::Filter { expr, inner } => {
            collect_expression_variables(expr, out);
            collect_pattern_variables(inner, out);
        }
        _ => {}
    }
}

fn collect_exists_patterns(expression: &Expression, out: &mut Vec<TriplePattern>) {
    match expression {
        Expression::Exists(pattern) => collect_pattern_triples(pattern, out),
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            collect_exists_patterns(a, out);
            collect_exists_patterns(b, out);
        }
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            collect_exists_patterns(e, out)
        }
        Expression::In(e, list) => {
            collect_exists_patterns(e, out);
            list.iter().for_each(|item| collect_exists_patterns(item, out));
        }
        Expression::If(a, b, c) => {
            collect_exists_patterns(a, out);
            collect_exists_patterns(b, out);
            collect_exists_patterns(c, out);
        }
        Expression::Coalesce(list) | Expression::FunctionCall(_, list) => {
            list.iter().for_each(|item| collect_exists_patterns(item, out));
        }
        _ => {}
    }
}

fn collect_pattern_triples(pattern: &GraphPattern, out: &mut Vec<TriplePattern>) {
    match pattern {
        GraphPattern::Bgp { patterns } => {
            let blanks = HashMap::new();
            out.extend(patterns.iter().filter_map(|p| convert_pattern(p, &blanks).ok()));
        }
        GraphPattern::Join { left, right } | GraphPattern::Union { left, right } => {
            collect_pattern_triples(left, out);
            collect_pattern_triples(right, out);
        }
        GraphPattern::Filter { expr, inner } => {
            collect_exists_patterns(expr, out);
            collect_pattern_triples(inner, out);
        }
        _ => {}
    }
}

fn expression_has_exists(expression: &Expression) -> bool {
    match expression {
        Expression::Exists(_) => true,
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => expression_has_exists(a) || expression_has_exists(b),
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            expression_has_exists(e)
        }
        Expression::In(e, list) => {
            expression_has_exists(e) || list.iter().any(expression_has_exists)
        }
        Expression::If(a, b, c) => {
            expression_has_exists(a) || expression_has_exists(b) || expression_has_exists(c)
        }
        Expression::Coalesce(list) | Expression::FunctionCall(_, list) => {
            list.iter().any(expression_has_exists)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<DecomposedQuery> {
        QueryParser::new().parse(text)
    }

    #[test]
    fn test_basic_select() {
        let query = parse(
            "PREFIX ex: <http://ex/> SELECT ?x ?n WHERE { ?x ex:knows ?y . ?y ex:name ?n }",
        )
        .unwrap();
        assert_eq!(query.form, QueryForm::Select);
        assert_eq!(query.branches.len(), 1);
        assert_eq!(query.branches[0].fragments.len(), 2);
        assert_eq!(query.result_variables(), vec!["x".to_string(), "n".to_string()]);
    }

    #[test]
    fn test_union_produces_branches() {
        let query = parse(
            "SELECT * WHERE {
                { ?x <http://ex/a> ?y } UNION { ?x <http://ex/b> ?y }
                ?y <http://ex/c> ?z
            }",
        )
        .unwrap();
        assert_eq!(query.branches.len(), 2);
        assert!(query.branches.iter().all(|b| b.fragments.len() == 2));
    }

    #[test]
    fn test_filter_attached_with_variables() {
        let query =
            parse("SELECT ?x WHERE { ?x <http://ex/age> ?a FILTER(?a > 30) }").unwrap();
        let filters = &query.branches[0].filters;
        assert_eq!(filters.len(), 1);
        assert!(filters[0].variables.contains("a"));
        assert!(!filters[0].has_exists());
    }

    #[test]
    fn test_modifiers_lifted() {
        let query =
            parse("SELECT DISTINCT ?x WHERE { ?x <http://ex/p> ?y } LIMIT 5 OFFSET 2").unwrap();
        assert!(query.modifiers.distinct);
        assert_eq!(query.modifiers.limit, Some(5));
        assert_eq!(query.modifiers.offset, 2);
        assert_eq!(query.modifiers.projection, Some(vec!["x".to_string()]));
    }

    #[test]
    fn test_ask_form() {
        let query = parse("ASK { <http://ex/a> <http://ex/p> ?o }").unwrap();
        assert_eq!(query.form, QueryForm::Ask);
        assert_eq!(query.modifiers.projection, None);
    }

    #[test]
    fn test_shared_blank_node_becomes_variable() {
        let query = parse(
            "SELECT ?n WHERE {
                _:b <http://ex/knows> ?x . _:b <http://ex/name> ?n . ?x <http://ex/p> []
            }",
        )
        .unwrap();
        let fragments = &query.branches[0].fragments;
        let subject = &fragments[0].subject;
        assert!(matches!(subject, Slot::Var(v) if v.starts_with(BLANK_VARIABLE_PREFIX)));
        assert_eq!(fragments[2].object, Slot::Blank);
    }

    #[test]
    fn test_unsupported_operators_rejected() {
        for text in [
            "SELECT * WHERE { ?x <http://ex/p> ?y OPTIONAL { ?y <http://ex/q> ?z } }",
            "SELECT * WHERE { ?x <http://ex/p> ?y MINUS { ?y <http://ex/q> ?z } }",
            "SELECT * WHERE { GRAPH ?g { ?x <http://ex/p> ?y } }",
            "SELECT * WHERE { ?x <http://ex/p>+ ?y }",
            "SELECT ?x WHERE { ?x <http://ex/p> ?y } ORDER BY ?y",
            "CONSTRUCT { ?x <http://ex/p> ?y } WHERE { ?x <http://ex/p> ?y }",
        ] {
            let err = parse(text).unwrap_err();
            assert!(matches!(err, FederationError::UnsupportedFragment(_)), "{}", text);
        }
    }

    #[test]
    fn test_malformed_query_is_parse_error() {
        let err = parse("SELECT WHERE {").unwrap_err();
        assert!(matches!(err, FederationError::Parse(_)));
    }
}
