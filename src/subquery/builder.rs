//! Renders fragment groups back into SPARQL sub-queries.
//!
//! Expressions are rendered top-down with an explicit [`Scope`] describing
//! where the current node sits (a plain filter, the N-th argument of a REGEX,
//! or inside a string transform applied to such an argument). Anything the
//! renderer cannot express faithfully is reported as
//! [`FederationError::UnsupportedFragment`] before the text reaches a source.

use crate::core::{Binding, Slot};
use crate::error::{FederationError, Result};
use crate::optimizer::Group;
use crate::parsing::FilterCondition;
use oxrdf::{Term, Variable};
use spargebra::algebra::{Expression, Function, GraphPattern};
use spargebra::term::{NamedNodePattern, TermPattern};
use std::fmt::Write;

/// String transforms that may wrap a REGEX argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    LCase,
    UCase,
    StrLen,
    EncodeForUri,
    Str,
}

impl Transform {
    fn from_function(function: &Function) -> Option<Self> {
        match function {
            Function::LCase => Some(Transform::LCase),
            Function::UCase => Some(Transform::UCase),
            Function::StrLen => Some(Transform::StrLen),
            Function::EncodeForUri => Some(Transform::EncodeForUri),
            Function::Str => Some(Transform::Str),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Transform::LCase => "LCASE",
            Transform::UCase => "UCASE",
            Transform::StrLen => "STRLEN",
            Transform::EncodeForUri => "ENCODE_FOR_URI",
            Transform::Str => "STR",
        }
    }
}

/// Where an expression node is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Filter,
    RegexArgument(usize),
    Transformed { argument: usize, transform: Transform },
}

impl Scope {
    fn regex_argument(self) -> Option<usize> {
        match self {
            Scope::Filter => None,
            Scope::RegexArgument(argument) | Scope::Transformed { argument, .. } => Some(argument),
        }
    }
}

/// Serializes groups into SELECT/ASK text for remote sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubQueryBuilder;

impl SubQueryBuilder {
    pub fn new() -> Self {
        Self
    }

    /// `SELECT ?vars WHERE { patterns filters }` for the whole group.
    pub fn render(&self, group: &Group) -> Result<String> {
        Renderer { bound: None }.select(group)
    }

    /// Existence probe for the group's patterns and filters.
    pub fn render_ask(&self, group: &Group) -> Result<String> {
        let renderer = Renderer { bound: None };
        let mut text = String::from("ASK {\n");
        renderer.body(group, &mut text)?;
        text.push('}');
        Ok(text)
    }

    /// Like [`render`](Self::render) with the values of `binding` substituted
    /// as constants. Blank node values are left as variables.
    pub fn render_bound(&self, group: &Group, binding: &Binding) -> Result<String> {
        Renderer { bound: Some(binding) }.select(group)
    }

    /// Renders a single filter expression.
    pub fn render_filter(&self, filter: &FilterCondition) -> Result<String> {
        let mut text = String::new();
        Renderer { bound: None }.expression(&filter.expression, Scope::Filter, &mut text)?;
        Ok(text)
    }

    pub fn can_render(&self, filter: &FilterCondition) -> bool {
        self.render_filter(filter).is_ok()
    }
}

struct Renderer<'a> {
    bound: Option<&'a Binding>,
}

impl Renderer<'_> {
    fn substitute(&self, variable: &str) -> Option<&Term> {
        self.bound
            .and_then(|b| b.get(variable))
            .filter(|term| !matches!(term, Term::BlankNode(_)))
    }

    fn select(&self, group: &Group) -> Result<String> {
        let projection: Vec<String> = group
            .variables_in_order()
            .into_iter()
            .filter(|v| self.substitute(v).is_none())
            .map(|v| format!("?{}", v))
            .collect();

        let mut text = String::new();
        if projection.is_empty() {
            text.push_str("SELECT * WHERE {\n");
        } else {
            let _ = writeln!(text, "SELECT {} WHERE {{", projection.join(" "));
        }
        self.body(group, &mut text)?;
        text.push('}');
        Ok(text)
    }

    fn body(&self, group: &Group, out: &mut String) -> Result<()> {
        for pattern in group.patterns() {
            let _ = writeln!(
                out,
                "  {} {} {} .",
                self.slot(&pattern.subject),
                self.slot(&pattern.predicate),
                self.slot(&pattern.object)
            );
        }
        for filter in &group.filters {
            out.push_str("  FILTER (");
            self.expression(&filter.expression, Scope::Filter, out)?;
            out.push_str(")\n");
        }
        Ok(())
    }

    fn slot(&self, slot: &Slot) -> String {
        match slot {
            Slot::Term(term) => term.to_string(),
            Slot::Var(name) => match self.substitute(name) {
                Some(term) => term.to_string(),
                None => format!("?{}", name),
            },
            Slot::Blank => "[]".to_string(),
        }
    }

    fn variable(&self, variable: &Variable) -> String {
        match self.substitute(variable.as_str()) {
            Some(term) => term.to_string(),
            None => variable.to_string(),
        }
    }

    fn expression(&self, expression: &Expression, scope: Scope, out: &mut String) -> Result<()> {
        if let Some(argument) = scope.regex_argument() {
            return self.regex_argument(expression, argument, scope, out);
        }

        match expression {
            Expression::NamedNode(node) => out.push_str(&node.to_string()),
            Expression::Literal(literal) => out.push_str(&literal.to_string()),
            Expression::Variable(variable) => out.push_str(&self.variable(variable)),
            Expression::Or(a, b) => self.infix(a, "||", b, out)?,
            Expression::And(a, b) => self.infix(a, "&&", b, out)?,
            Expression::Equal(a, b) => self.infix(a, "=", b, out)?,
            Expression::Greater(a, b) => self.infix(a, ">", b, out)?,
            Expression::GreaterOrEqual(a, b) => self.infix(a, ">=", b, out)?,
            Expression::Less(a, b) => self.infix(a, "<", b, out)?,
            Expression::LessOrEqual(a, b) => self.infix(a, "<=", b, out)?,
            Expression::Add(a, b) => self.infix(a, "+", b, out)?,
            Expression::Subtract(a, b) => self.infix(a, "-", b, out)?,
            Expression::Multiply(a, b) => self.infix(a, "*", b, out)?,
            Expression::Divide(a, b) => self.infix(a, "/", b, out)?,
            Expression::SameTerm(a, b) => self.call("sameTerm", [a.as_ref(), b.as_ref()], out)?,
            Expression::UnaryPlus(e) => self.prefix("+", e, out)?,
            Expression::UnaryMinus(e) => self.prefix("-", e, out)?,
            Expression::Not(e) => self.prefix("!", e, out)?,
            Expression::In(e, list) => {
                out.push('(');
                self.expression(e, Scope::Filter, out)?;
                out.push_str(" IN (");
                self.list(list.iter(), out)?;
                out.push_str("))");
            }
            Expression::Bound(variable) => {
                if self.substitute(variable.as_str()).is_some() {
                    out.push_str("true");
                } else {
                    let _ = write!(out, "BOUND({})", variable);
                }
            }
            Expression::If(a, b, c) => {
                self.call("IF", [a.as_ref(), b.as_ref(), c.as_ref()], out)?;
            }
            Expression::Coalesce(list) => self.call("COALESCE", list.iter(), out)?,
            Expression::Exists(pattern) => {
                out.push_str("EXISTS { ");
                self.graph_pattern(pattern, out)?;
                out.push('}');
            }
            Expression::FunctionCall(Function::Regex, args) => {
                if !(2..=3).contains(&args.len()) {
                    return Err(unsupported(format!("REGEX with {} arguments", args.len())));
                }
                out.push_str("REGEX(");
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    self.expression(arg, Scope::RegexArgument(index), out)?;
                }
                out.push(')');
            }
            Expression::FunctionCall(Function::Custom(iri), args) => {
                self.call(&iri.to_string(), args.iter(), out)?;
            }
            Expression::FunctionCall(function, args) => {
                let name = function_name(function)
                    .ok_or_else(|| unsupported(format!("function {:?}", function)))?;
                self.call(name, args.iter(), out)?;
            }
            #[allow(unreachable_patterns)]
            other => return Err(unsupported(format!("expression {}", other))),
        }
        Ok(())
    }

    /// Arguments of REGEX: terms, variables, or string transforms wrapping them.
    fn regex_argument(
        &self,
        expression: &Expression,
        argument: usize,
        scope: Scope,
        out: &mut String,
    ) -> Result<()> {
        match expression {
            Expression::NamedNode(node) => out.push_str(&node.to_string()),
            Expression::Literal(literal) => out.push_str(&literal.to_string()),
            Expression::Variable(variable) => out.push_str(&self.variable(variable)),
            Expression::FunctionCall(function, args) => {
                let transform = Transform::from_function(function).ok_or_else(|| {
                    unsupported(format!("{:?} wrapping REGEX argument {}", function, argument + 1))
                })?;
                let [inner] = args.as_slice() else {
                    return Err(unsupported(format!(
                        "{} with {} arguments inside REGEX",
                        transform.name(),
                        args.len()
                    )));
                };
                out.push_str(transform.name());
                out.push('(');
                self.expression(inner, Scope::Transformed { argument, transform }, out)?;
                out.push(')');
            }
            other => {
                let context = match scope {
                    Scope::Transformed { transform, .. } => format!(" under {}", transform.name()),
                    _ => String::new(),
                };
                return Err(unsupported(format!(
                    "expression {} in REGEX argument {}{}",
                    other,
                    argument + 1,
                    context
                )));
            }
        }
        Ok(())
    }

    fn infix(&self, a: &Expression, op: &str, b: &Expression, out: &mut String) -> Result<()> {
        out.push('(');
        self.expression(a, Scope::Filter, out)?;
        let _ = write!(out, " {} ", op);
        self.expression(b, Scope::Filter, out)?;
        out.push(')');
        Ok(())
    }

    fn prefix(&self, op: &str, e: &Expression, out: &mut String) -> Result<()> {
        out.push_str(op);
        out.push('(');
        self.expression(e, Scope::Filter, out)?;
        out.push(')');
        Ok(())
    }

    fn call<'e>(
        &self,
        name: &str,
        args: impl IntoIterator<Item = &'e Expression>,
        out: &mut String,
    ) -> Result<()> {
        out.push_str(name);
        out.push('(');
        self.list(args, out)?;
        out.push(')');
        Ok(())
    }

    fn list<'e>(
        &self,
        items: impl IntoIterator<Item = &'e Expression>,
        out: &mut String,
    ) -> Result<()> {
        for (index, item) in items.into_iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            self.expression(item, Scope::Filter, out)?;
        }
        Ok(())
    }

    fn graph_pattern(&self, pattern: &GraphPattern, out: &mut String) -> Result<()> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                for triple in patterns {
                    let predicate = match &triple.predicate {
                        NamedNodePattern::NamedNode(node) => node.to_string(),
                        NamedNodePattern::Variable(v) => self.variable(v),
                    };
                    let _ = write!(
                        out,
                        "{} {} {} . ",
                        self.term_pattern(&triple.subject)?,
                        predicate,
                        self.term_pattern(&triple.object)?
                    );
                }
                Ok(())
            }
            GraphPattern::Join { left, right } => {
                self.graph_pattern(left, out)?;
                self.graph_pattern(right, out)
            }
            GraphPattern::Filter { expr, inner } => {
                self.graph_pattern(inner, out)?;
                out.push_str("FILTER (");
                self.expression(expr, Scope::Filter, out)?;
                out.push_str(") ");
                Ok(())
            }
            GraphPattern::Extend { .. } => Err(unsupported("BIND inside EXISTS".to_string())),
            GraphPattern::LeftJoin { .. } => Err(unsupported("OPTIONAL inside EXISTS".to_string())),
            GraphPattern::Path { .. } => {
                Err(unsupported("property path inside EXISTS".to_string()))
            }
            other => Err(unsupported(format!("pattern inside EXISTS: {}", other))),
        }
    }

    fn term_pattern(&self, term: &TermPattern) -> Result<String> {
        match term {
            TermPattern::NamedNode(node) => Ok(node.to_string()),
            TermPattern::Literal(literal) => Ok(literal.to_string()),
            TermPattern::BlankNode(node) => Ok(node.to_string()),
            TermPattern::Variable(variable) => Ok(self.variable(variable)),
            #[allow(unreachable_patterns)]
            _ => Err(unsupported("quoted triple pattern".to_string())),
        }
    }
}

fn unsupported(what: String) -> FederationError {
    FederationError::UnsupportedFragment(what)
}

fn function_name(function: &Function) -> Option<&'static str> {
    Some(match function {
        Function::Str => "STR",
        Function::Lang => "LANG",
        Function::LangMatches => "LANGMATCHES",
        Function::Datatype => "DATATYPE",
        Function::Iri => "IRI",
        Function::BNode => "BNODE",
        Function::Rand => "RAND",
        Function::Abs => "ABS",
        Function::Ceil => "CEIL",
        Function::Floor => "FLOOR",
        Function::Round => "ROUND",
        Function::Concat => "CONCAT",
        Function::SubStr => "SUBSTR",
        Function::StrLen => "STRLEN",
        Function::Replace => "REPLACE",
        Function::UCase => "UCASE",
        Function::LCase => "LCASE",
        Function::EncodeForUri => "ENCODE_FOR_URI",
        Function::Contains => "CONTAINS",
        Function::StrStarts => "STRSTARTS",
        Function::StrEnds => "STRENDS",
        Function::StrBefore => "STRBEFORE",
        Function::StrAfter => "STRAFTER",
        Function::Year => "YEAR",
        Function::Month => "MONTH",
        Function::Day => "DAY",
        Function::Hours => "HOURS",
        Function::Minutes => "MINUTES",
        Function::Seconds => "SECONDS",
        Function::Timezone => "TIMEZONE",
        Function::Tz => "TZ",
        Function::Now => "NOW",
        Function::Uuid => "UUID",
        Function::StrUuid => "STRUUID",
        Function::Md5 => "MD5",
        Function::Sha1 => "SHA1",
        Function::Sha256 => "SHA256",
        Function::Sha384 => "SHA384",
        Function::Sha512 => "SHA512",
        Function::StrLang => "STRLANG",
        Function::StrDt => "STRDT",
        Function::IsIri => "isIRI",
        Function::IsBlank => "isBLANK",
        Function::IsLiteral => "isLITERAL",
        Function::IsNumeric => "isNUMERIC",
        Function::Regex => "REGEX",
        _ => return None,
    })
}
