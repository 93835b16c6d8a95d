//! Local evaluation of filter conditions that could not be pushed to a source.
//!
//! Follows SPARQL error semantics: an expression that raises an error (an
//! unbound variable, a type mismatch, an unsupported function) makes the
//! filter reject the row. `||` and `&&` absorb errors the way the SPARQL
//! truth tables require. [`is_supported`] tells the planner up front which
//! expressions can be evaluated here at all.

use crate::core::Binding;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, NamedNodeRef, Term};
use regex::{Regex, RegexBuilder};
use spargebra::algebra::{Expression, Function};
use std::cmp::Ordering;

/// Whether `binding` passes `expression`.
pub fn evaluate_filter(expression: &Expression, binding: &Binding) -> bool {
    evaluate(expression, binding).and_then(|t| effective_boolean_value(&t)).unwrap_or(false)
}

/// Evaluates `expression`; `None` is a SPARQL evaluation error.
pub fn evaluate(expression: &Expression, binding: &Binding) -> Option<Term> {
    match expression {
        Expression::NamedNode(node) => Some(node.clone().into()),
        Expression::Literal(literal) => Some(literal.clone().into()),
        Expression::Variable(variable) => binding.get(variable.as_str()).cloned(),
        Expression::Or(a, b) => {
            let a = evaluate(a, binding).and_then(|t| effective_boolean_value(&t));
            let b = evaluate(b, binding).and_then(|t| effective_boolean_value(&t));
            match (a, b) {
                (Some(true), _) | (_, Some(true)) => Some(boolean(true)),
                (Some(false), Some(false)) => Some(boolean(false)),
                _ => None,
            }
        }
        Expression::And(a, b) => {
            let a = evaluate(a, binding).and_then(|t| effective_boolean_value(&t));
            let b = evaluate(b, binding).and_then(|t| effective_boolean_value(&t));
            match (a, b) {
                (Some(false), _) | (_, Some(false)) => Some(boolean(false)),
                (Some(true), Some(true)) => Some(boolean(true)),
                _ => None,
            }
        }
        Expression::Equal(a, b) => {
            let a = evaluate(a, binding)?;
            let b = evaluate(b, binding)?;
            equals(&a, &b).map(boolean)
        }
        Expression::SameTerm(a, b) => {
            Some(boolean(evaluate(a, binding)? == evaluate(b, binding)?))
        }
        Expression::Greater(a, b) => compare_with(a, b, binding, |o| o == Ordering::Greater),
        Expression::GreaterOrEqual(a, b) => compare_with(a, b, binding, |o| o != Ordering::Less),
        Expression::Less(a, b) => compare_with(a, b, binding, |o| o == Ordering::Less),
        Expression::LessOrEqual(a, b) => compare_with(a, b, binding, |o| o != Ordering::Greater),
        Expression::In(e, list) => {
            let value = evaluate(e, binding)?;
            let mut errored = false;
            for item in list {
                match evaluate(item, binding).and_then(|candidate| equals(&value, &candidate)) {
                    Some(true) => return Some(boolean(true)),
                    Some(false) => {}
                    None => errored = true,
                }
            }
            if errored {
                None
            } else {
                Some(boolean(false))
            }
        }
        Expression::Add(a, b) => arithmetic(a, b, binding, Operation::Add),
        Expression::Subtract(a, b) => arithmetic(a, b, binding, Operation::Subtract),
        Expression::Multiply(a, b) => arithmetic(a, b, binding, Operation::Multiply),
        Expression::Divide(a, b) => arithmetic(a, b, binding, Operation::Divide),
        Expression::UnaryPlus(e) => {
            let value = evaluate(e, binding)?;
            Numeric::of(&value)?;
            Some(value)
        }
        Expression::UnaryMinus(e) => Numeric::of(&evaluate(e, binding)?)?.negate()?.to_term(),
        Expression::Not(e) => {
            let value = effective_boolean_value(&evaluate(e, binding)?)?;
            Some(boolean(!value))
        }
        Expression::Bound(variable) => Some(boolean(binding.contains(variable.as_str()))),
        Expression::If(condition, then, otherwise) => {
            if effective_boolean_value(&evaluate(condition, binding)?)? {
                evaluate(then, binding)
            } else {
                evaluate(otherwise, binding)
            }
        }
        Expression::Coalesce(list) => list.iter().find_map(|e| evaluate(e, binding)),
        Expression::FunctionCall(function, args) => call(function, args, binding),
        // EXISTS needs a pattern match against the sources.
        _ => None,
    }
}

/// SPARQL effective boolean value.
pub fn effective_boolean_value(term: &Term) -> Option<bool> {
    let Term::Literal(literal) = term else {
        return None;
    };
    let datatype = literal.datatype();
    if datatype == xsd::BOOLEAN {
        match literal.value() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => Some(false),
        }
    } else if datatype == xsd::STRING || literal.language().is_some() {
        Some(!literal.value().is_empty())
    } else if let Some(numeric) = Numeric::of(term) {
        let value = numeric.as_f64();
        Some(value != 0.0 && !value.is_nan())
    } else {
        None
    }
}

/// Whether every operator and function in `expression` can be evaluated
/// locally. `EXISTS` never can.
pub fn is_supported(expression: &Expression) -> bool {
    match expression {
        Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::Variable(_)
        | Expression::Bound(_) => true,
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
        | Expression::Divide(a, b) => is_supported(a) && is_supported(b),
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            is_supported(e)
        }
        Expression::In(e, list) => is_supported(e) && list.iter().all(is_supported),
        Expression::If(a, b, c) => is_supported(a) && is_supported(b) && is_supported(c),
        Expression::Coalesce(list) => list.iter().all(is_supported),
        Expression::FunctionCall(function, args) => {
            supports(function) && args.iter().all(is_supported)
        }
        _ => false,
    }
}

fn supports(function: &Function) -> bool {
    matches!(
        function,
        Function::Str
            | Function::Lang
            | Function::LangMatches
            | Function::Datatype
            | Function::Abs
            | Function::Ceil
            | Function::Floor
            | Function::Round
            | Function::Concat
            | Function::SubStr
            | Function::StrLen
            | Function::Replace
            | Function::UCase
            | Function::LCase
            | Function::EncodeForUri
            | Function::Contains
            | Function::StrStarts
            | Function::StrEnds
            | Function::StrBefore
            | Function::StrAfter
            | Function::Year
            | Function::Month
            | Function::Day
            | Function::Hours
            | Function::Minutes
            | Function::Seconds
            | Function::Timezone
            | Function::Tz
            | Function::StrLang
            | Function::StrDt
            | Function::IsIri
            | Function::IsBlank
            | Function::IsLiteral
            | Function::IsNumeric
            | Function::Regex
    )
}

fn boolean(value: bool) -> Term {
    Literal::from(value).into()
}

const DAY_TIME_DURATION: &str = "http://www.w3.org/2001/XMLSchema#dayTimeDuration";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Integer(i64),
    Decimal(f64),
    Double(f64),
}

impl Numeric {
    fn of(term: &Term) -> Option<Self> {
        let Term::Literal(literal) = term else {
            return None;
        };
        let datatype = literal.datatype();
        let value = literal.value().trim();
        if is_integer_type(datatype) {
            value.parse().ok().map(Numeric::Integer)
        } else if datatype == xsd::DECIMAL {
            value.parse().ok().map(Numeric::Decimal)
        } else if datatype == xsd::DOUBLE || datatype == xsd::FLOAT {
            match value {
                "INF" => Some(Numeric::Double(f64::INFINITY)),
                "-INF" => Some(Numeric::Double(f64::NEG_INFINITY)),
                "NaN" => Some(Numeric::Double(f64::NAN)),
                _ => value.parse().ok().map(Numeric::Double),
            }
        } else {
            None
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(v) => v as f64,
            Numeric::Decimal(v) | Numeric::Double(v) => v,
        }
    }

    fn negate(self) -> Option<Self> {
        Some(match self {
            Numeric::Integer(v) => Numeric::Integer(v.checked_neg()?),
            Numeric::Decimal(v) => Numeric::Decimal(-v),
            Numeric::Double(v) => Numeric::Double(-v),
        })
    }

    fn to_term(self) -> Option<Term> {
        let literal = match self {
            Numeric::Integer(v) => Literal::from(v),
            Numeric::Decimal(v) => {
                if !v.is_finite() {
                    return None;
                }
                Literal::new_typed_literal(format_decimal(v), xsd::DECIMAL)
            }
            Numeric::Double(v) => Literal::from(v),
        };
        Some(literal.into())
    }
}

fn format_decimal(value: f64) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn is_integer_type(datatype: NamedNodeRef<'_>) -> bool {
    [
        xsd::INTEGER,
        xsd::INT,
        xsd::LONG,
        xsd::SHORT,
        xsd::BYTE,
        xsd::NON_NEGATIVE_INTEGER,
        xsd::NON_POSITIVE_INTEGER,
        xsd::POSITIVE_INTEGER,
        xsd::NEGATIVE_INTEGER,
        xsd::UNSIGNED_INT,
        xsd::UNSIGNED_LONG,
        xsd::UNSIGNED_SHORT,
        xsd::UNSIGNED_BYTE,
    ]
    .contains(&datatype)
}

#[derive(Clone, Copy)]
enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

fn arithmetic(a: &Expression, b: &Expression, binding: &Binding, op: Operation) -> Option<Term> {
    let a = Numeric::of(&evaluate(a, binding)?)?;
    let b = Numeric::of(&evaluate(b, binding)?)?;
    let result = match (a, b) {
        (Numeric::Integer(x), Numeric::Integer(y)) => match op {
            Operation::Add => Numeric::Integer(x.checked_add(y)?),
            Operation::Subtract => Numeric::Integer(x.checked_sub(y)?),
            Operation::Multiply => Numeric::Integer(x.checked_mul(y)?),
            Operation::Divide => {
                if y == 0 {
                    return None;
                }
                Numeric::Decimal(x as f64 / y as f64)
            }
        },
        (x, y) => {
            let (x_value, y_value) = (x.as_f64(), y.as_f64());
            let value = match op {
                Operation::Add => x_value + y_value,
                Operation::Subtract => x_value - y_value,
                Operation::Multiply => x_value * y_value,
                Operation::Divide => x_value / y_value,
            };
            if matches!(x, Numeric::Double(_)) || matches!(y, Numeric::Double(_)) {
                Numeric::Double(value)
            } else {
                if matches!(op, Operation::Divide) && y_value == 0.0 {
                    return None;
                }
                Numeric::Decimal(value)
            }
        }
    };
    result.to_term()
}

/// An `xsd:dateTime` value. Values without a timezone only compare with each other.
#[derive(Debug, Clone, Copy)]
enum Instant {
    Zoned(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

impl Instant {
    fn of(term: &Term) -> Option<Self> {
        let Term::Literal(literal) = term else {
            return None;
        };
        if literal.datatype() != xsd::DATE_TIME {
            return None;
        }
        let value = literal.value().trim();
        match DateTime::parse_from_rfc3339(value) {
            Ok(zoned) => Some(Instant::Zoned(zoned)),
            Err(_) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(Instant::Local),
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Instant::Zoned(a), Instant::Zoned(b)) => Some(a.cmp(b)),
            (Instant::Local(a), Instant::Local(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn field(&self, function: &Function) -> Option<Term> {
        match self {
            Instant::Zoned(value) => date_field(function, value),
            Instant::Local(value) => date_field(function, value),
        }
    }
}

fn date_field<T: Datelike + Timelike>(function: &Function, value: &T) -> Option<Term> {
    let integer = match function {
        Function::Year => i64::from(value.year()),
        Function::Month => i64::from(value.month()),
        Function::Day => i64::from(value.day()),
        Function::Hours => i64::from(value.hour()),
        Function::Minutes => i64::from(value.minute()),
        Function::Seconds => {
            let seconds = f64::from(value.second()) + f64::from(value.nanosecond()) / 1e9;
            return Numeric::Decimal(seconds).to_term();
        }
        _ => return None,
    };
    Some(Literal::from(integer).into())
}

/// `xsd:dayTimeDuration` lexical form of a UTC offset.
fn offset_duration(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "PT0S".to_string();
    }
    let sign = if seconds < 0 { "-" } else { "" };
    let (hours, minutes) = (seconds.abs() / 3600, seconds.abs() % 3600 / 60);
    let mut text = format!("{}PT", sign);
    if hours > 0 {
        text.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        text.push_str(&format!("{}M", minutes));
    }
    text
}

/// Value equality (`=`); `None` when the operands are not comparable.
fn equals(a: &Term, b: &Term) -> Option<bool> {
    if let (Some(x), Some(y)) = (Numeric::of(a), Numeric::of(b)) {
        return Some(x.as_f64() == y.as_f64());
    }
    if let (Some(x), Some(y)) = (Instant::of(a), Instant::of(b)) {
        return x.compare(&y).map(|o| o == Ordering::Equal);
    }
    match (a, b) {
        (Term::Literal(x), Term::Literal(y)) => {
            if x == y {
                Some(true)
            } else if x.datatype() == y.datatype() && x.language() == y.language() {
                if is_known_type(x.datatype()) {
                    Some(false)
                } else {
                    None
                }
            } else if is_known_type(x.datatype()) && is_known_type(y.datatype()) {
                Some(false)
            } else {
                None
            }
        }
        _ => Some(a == b),
    }
}

fn is_known_type(datatype: NamedNodeRef<'_>) -> bool {
    datatype == xsd::STRING
        || datatype == xsd::BOOLEAN
        || datatype == oxrdf::vocab::rdf::LANG_STRING
        || datatype == xsd::DATE_TIME
        || is_integer_type(datatype)
        || datatype == xsd::DECIMAL
        || datatype == xsd::DOUBLE
        || datatype == xsd::FLOAT
}

fn compare(a: &Term, b: &Term) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (Numeric::of(a), Numeric::of(b)) {
        return x.as_f64().partial_cmp(&y.as_f64());
    }
    if let (Some(x), Some(y)) = (Instant::of(a), Instant::of(b)) {
        return x.compare(&y);
    }
    let (Term::Literal(x), Term::Literal(y)) = (a, b) else {
        return None;
    };
    let same_kind = x.datatype() == y.datatype() && x.language() == y.language();
    if !same_kind {
        return None;
    }
    let datatype = x.datatype();
    if datatype == xsd::STRING || x.language().is_some() {
        Some(x.value().cmp(y.value()))
    } else if datatype == xsd::BOOLEAN {
        let x = effective_boolean_value(a)?;
        let y = effective_boolean_value(b)?;
        Some(x.cmp(&y))
    } else {
        None
    }
}

fn compare_with(
    a: &Expression,
    b: &Expression,
    binding: &Binding,
    accept: impl Fn(Ordering) -> bool,
) -> Option<Term> {
    let a = evaluate(a, binding)?;
    let b = evaluate(b, binding)?;
    compare(&a, &b).map(|o| boolean(accept(o)))
}

/// Lexical form of a string-like literal with its language tag.
fn string_arg(term: &Term) -> Option<(&str, Option<&str>)> {
    match term {
        Term::Literal(literal)
            if literal.datatype() == xsd::STRING || literal.language().is_some() =>
        {
            Some((literal.value(), literal.language()))
        }
        _ => None,
    }
}

fn string_like(value: String, language: Option<&str>) -> Term {
    match language {
        Some(language) => Literal::new_language_tagged_literal_unchecked(value, language).into(),
        None => Literal::new_simple_literal(value).into(),
    }
}

fn call(function: &Function, args: &[Expression], binding: &Binding) -> Option<Term> {
    let values = || args.iter().map(|a| evaluate(a, binding)).collect::<Option<Vec<Term>>>();

    match function {
        Function::Str => match values()?.as_slice() {
            [Term::NamedNode(node)] => Some(Literal::new_simple_literal(node.as_str()).into()),
            [Term::Literal(literal)] => Some(Literal::new_simple_literal(literal.value()).into()),
            _ => None,
        },
        Function::Lang => match values()?.as_slice() {
            [Term::Literal(literal)] => {
                Some(Literal::new_simple_literal(literal.language().unwrap_or("")).into())
            }
            _ => None,
        },
        Function::Datatype => match values()?.as_slice() {
            [Term::Literal(literal)] => Some(literal.datatype().into_owned().into()),
            _ => None,
        },
        Function::LangMatches => {
            let values = values()?;
            let [tag, range] = values.as_slice() else { return None };
            let (tag, _) = string_arg(tag)?;
            let (range, _) = string_arg(range)?;
            let matches = if range == "*" {
                !tag.is_empty()
            } else {
                let tag = tag.to_ascii_lowercase();
                let range = range.to_ascii_lowercase();
                tag == range || tag.starts_with(&format!("{}-", range))
            };
            Some(boolean(matches))
        }
        Function::StrLen => {
            let values = values()?;
            let [value] = values.as_slice() else { return None };
            let (text, _) = string_arg(value)?;
            Some(Literal::from(text.chars().count() as i64).into())
        }
        Function::UCase | Function::LCase => {
            let values = values()?;
            let [value] = values.as_slice() else { return None };
            let (text, language) = string_arg(value)?;
            let converted = if matches!(function, Function::UCase) {
                text.to_uppercase()
            } else {
                text.to_lowercase()
            };
            Some(string_like(converted, language))
        }
        Function::EncodeForUri => {
            let values = values()?;
            let [value] = values.as_slice() else { return None };
            let (text, _) = string_arg(value)?;
            Some(Literal::new_simple_literal(encode_for_uri(text)).into())
        }
        Function::Contains | Function::StrStarts | Function::StrEnds => {
            let values = values()?;
            let [haystack, needle] = values.as_slice() else { return None };
            let (haystack, _) = string_arg(haystack)?;
            let (needle, _) = string_arg(needle)?;
            Some(boolean(match function {
                Function::Contains => haystack.contains(needle),
                Function::StrStarts => haystack.starts_with(needle),
                _ => haystack.ends_with(needle),
            }))
        }
        Function::Concat => {
            let values = values()?;
            let mut text = String::new();
            let mut language: Option<Option<&str>> = None;
            for value in &values {
                let (part, tag) = string_arg(value)?;
                text.push_str(part);
                language = match language {
                    None => Some(tag),
                    Some(previous) if previous == tag => Some(tag),
                    Some(_) => Some(None),
                };
            }
            Some(string_like(text, language.flatten()))
        }
        Function::SubStr => {
            let values = values()?;
            let (text, start, length) = match values.as_slice() {
                [text, start] => (text, start, None),
                [text, start, length] => (text, start, Some(length)),
                _ => return None,
            };
            let (text, language) = string_arg(text)?;
            let start = Numeric::of(start)?.as_f64().round();
            let end = match length {
                Some(length) => start + Numeric::of(length)?.as_f64().round(),
                None => f64::INFINITY,
            };
            let part: String = text
                .chars()
                .enumerate()
                .filter(|(index, _)| {
                    let position = (*index + 1) as f64;
                    position >= start && position < end
                })
                .map(|(_, c)| c)
                .collect();
            Some(string_like(part, language))
        }
        Function::StrBefore | Function::StrAfter => {
            let values = values()?;
            let [text, needle] = values.as_slice() else { return None };
            let (text, language) = string_arg(text)?;
            let (needle, needle_language) = string_arg(needle)?;
            if needle_language.is_some() && needle_language != language {
                return None;
            }
            Some(match text.find(needle) {
                Some(index) if matches!(function, Function::StrBefore) => {
                    string_like(text[..index].to_string(), language)
                }
                Some(index) => string_like(text[index + needle.len()..].to_string(), language),
                None => Literal::new_simple_literal("").into(),
            })
        }
        Function::Replace => {
            let values = values()?;
            let (text, pattern, replacement, flags) = match values.as_slice() {
                [text, pattern, replacement] => (text, pattern, replacement, None),
                [text, pattern, replacement, flags] => (text, pattern, replacement, Some(flags)),
                _ => return None,
            };
            let (text, language) = string_arg(text)?;
            let (pattern, _) = string_arg(pattern)?;
            let (replacement, _) = string_arg(replacement)?;
            let flags = match flags {
                Some(flags) => string_arg(flags)?.0,
                None => "",
            };
            let regex = build_regex(pattern, flags)?;
            Some(string_like(regex.replace_all(text, replacement).into_owned(), language))
        }
        Function::StrLang => {
            let values = values()?;
            let [value, tag] = values.as_slice() else { return None };
            let (value, None) = string_arg(value)? else { return None };
            let (tag, _) = string_arg(tag)?;
            Literal::new_language_tagged_literal(value, tag).ok().map(Into::into)
        }
        Function::StrDt => {
            let values = values()?;
            let [value, Term::NamedNode(datatype)] = values.as_slice() else { return None };
            let (value, None) = string_arg(value)? else { return None };
            Some(Literal::new_typed_literal(value, datatype.clone()).into())
        }
        Function::Ceil | Function::Floor | Function::Round => match values()?.as_slice() {
            [term] => {
                let round = |v: f64| match function {
                    Function::Ceil => v.ceil(),
                    Function::Floor => v.floor(),
                    _ => (v + 0.5).floor(),
                };
                match Numeric::of(term)? {
                    Numeric::Integer(v) => Numeric::Integer(v).to_term(),
                    Numeric::Decimal(v) => Numeric::Decimal(round(v)).to_term(),
                    Numeric::Double(v) => Numeric::Double(round(v)).to_term(),
                }
            }
            _ => None,
        },
        Function::Year
        | Function::Month
        | Function::Day
        | Function::Hours
        | Function::Minutes
        | Function::Seconds => match values()?.as_slice() {
            [term] => Instant::of(term)?.field(function),
            _ => None,
        },
        Function::Timezone => match values()?.as_slice() {
            [term] => match Instant::of(term)? {
                Instant::Zoned(value) => Some(
                    Literal::new_typed_literal(
                        offset_duration(value.offset()),
                        NamedNode::new_unchecked(DAY_TIME_DURATION),
                    )
                    .into(),
                ),
                Instant::Local(_) => None,
            },
            _ => None,
        },
        Function::Tz => match values()?.as_slice() {
            [Term::Literal(literal)] => {
                let tz = match Instant::of(&Term::Literal(literal.clone()))? {
                    Instant::Local(_) => "",
                    Instant::Zoned(_) if literal.value().trim().ends_with('Z') => "Z",
                    Instant::Zoned(_) => {
                        let value = literal.value().trim();
                        value.get(value.len().saturating_sub(6)..)?
                    }
                };
                Some(Literal::new_simple_literal(tz).into())
            }
            _ => None,
        },
        Function::Regex => {
            let values = values()?;
            let (text, pattern, flags) = match values.as_slice() {
                [text, pattern] => (text, pattern, None),
                [text, pattern, flags] => (text, pattern, Some(flags)),
                _ => return None,
            };
            let (text, _) = string_arg(text)?;
            let (pattern, _) = string_arg(pattern)?;
            let flags = match flags {
                Some(flags) => string_arg(flags)?.0,
                None => "",
            };
            regex_match(text, pattern, flags).map(boolean)
        }
        Function::IsIri => match values()?.as_slice() {
            [term] => Some(boolean(matches!(term, Term::NamedNode(_)))),
            _ => None,
        },
        Function::IsBlank => match values()?.as_slice() {
            [term] => Some(boolean(matches!(term, Term::BlankNode(_)))),
            _ => None,
        },
        Function::IsLiteral => match values()?.as_slice() {
            [term] => Some(boolean(matches!(term, Term::Literal(_)))),
            _ => None,
        },
        Function::IsNumeric => match values()?.as_slice() {
            [term] => Some(boolean(Numeric::of(term).is_some())),
            _ => None,
        },
        Function::Abs => match values()?.as_slice() {
            [term] => match Numeric::of(term)? {
                Numeric::Integer(v) => Numeric::Integer(v.checked_abs()?).to_term(),
                Numeric::Decimal(v) => Numeric::Decimal(v.abs()).to_term(),
                Numeric::Double(v) => Numeric::Double(v.abs()).to_term(),
            },
            _ => None,
        },
        _ => None,
    }
}

fn regex_match(text: &str, pattern: &str, flags: &str) -> Option<bool> {
    build_regex(pattern, flags).map(|regex| regex.is_match(text))
}

fn build_regex(pattern: &str, flags: &str) -> Option<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => return None,
        };
    }
    builder.build().ok()
}

fn encode_for_uri(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
