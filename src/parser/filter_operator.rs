use chrono::{DateTime, Utc};

use crate::model::{ScimAttribute, ScimObject, ScimValue};

/// An attribute path in a filter or sort key: `name` or `name.subName`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrPath {
    pub attribute: String,
    pub sub_attribute: Option<String>,
}

impl AttrPath {
    pub fn parse(path: &str) -> AttrPath {
        match path.split_once('.') {
            Some((attr, sub)) => AttrPath {
                attribute: attr.to_string(),
                sub_attribute: Some(sub.to_string()),
            },
            None => AttrPath {
                attribute: path.to_string(),
                sub_attribute: None,
            },
        }
    }
}

impl std::fmt::Display for AttrPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sub_attribute {
            Some(sub) => write!(f, "{}.{}", self.attribute, sub),
            None => write!(f, "{}", self.attribute),
        }
    }
}

/// A literal comparison value in a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Num(i64),
    Bool(bool),
}

/// The comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Co,
    Sw,
    Ew,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn parse(token: &str) -> Option<CompareOp> {
        match token.to_lowercase().as_str() {
            "eq" => Some(CompareOp::Eq),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            "ew" => Some(CompareOp::Ew),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        }
    }
}

/// An evaluable SCIM filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Compare(AttrPath, CompareOp, FilterValue),
    /// The unary `pr` (present) operator.
    Present(AttrPath),
    And(Box<FilterOp>, Box<FilterOp>),
    Or(Box<FilterOp>, Box<FilterOp>),
}

impl FilterOp {
    /// Evaluate this filter against an object.
    ///
    /// Comparisons follow SCIM leniency: a predicate whose literal cannot be
    /// compared with the attribute's data type is false, not an error.
    pub fn matches(&self, object: &ScimObject) -> bool {
        match self {
            FilterOp::And(a, b) => a.matches(object) && b.matches(object),
            FilterOp::Or(a, b) => a.matches(object) || b.matches(object),
            FilterOp::Present(path) => !resolve(object, path).is_empty(),
            FilterOp::Compare(path, op, literal) => resolve(object, path)
                .iter()
                .any(|(value, case_exact)| compare(value, *op, literal, *case_exact)),
        }
    }
}

/// Resolve an attribute path to the candidate values it addresses, paired
/// with the `caseExact` flag of the addressed descriptor. A plural
/// attribute contributes one candidate per element (its `value`
/// sub-attribute unless the path names another).
fn resolve<'a>(object: &'a ScimObject, path: &AttrPath) -> Vec<(&'a ScimValue, bool)> {
    let Some(attribute) = object.find_attribute(&path.attribute) else {
        return Vec::new();
    };
    let descriptor = attribute.descriptor();

    if descriptor.is_plural() {
        let sub_name = path.sub_attribute.as_deref().unwrap_or("value");
        return attribute
            .values()
            .iter()
            .filter_map(|element| element.sub_attribute(sub_name))
            .map(value_of)
            .collect();
    }

    match &path.sub_attribute {
        Some(sub_name) => attribute
            .value()
            .sub_attribute(sub_name)
            .map(value_of)
            .into_iter()
            .collect(),
        None if descriptor.is_complex() => Vec::new(),
        None => vec![(attribute.value(), descriptor.is_case_exact())],
    }
}

fn value_of(attribute: &ScimAttribute) -> (&ScimValue, bool) {
    (attribute.value(), attribute.descriptor().is_case_exact())
}

fn compare(value: &ScimValue, op: CompareOp, literal: &FilterValue, case_exact: bool) -> bool {
    match (value, literal) {
        (ScimValue::Str(s), FilterValue::Str(lit)) => compare_str(s, op, lit, case_exact),
        (ScimValue::DateTime(dt), FilterValue::Str(lit)) => {
            match DateTime::parse_from_rfc3339(lit) {
                Ok(parsed) => compare_ord(dt, op, &parsed.with_timezone(&Utc)),
                Err(_) => false,
            }
        }
        (ScimValue::Int(i), FilterValue::Num(lit)) => compare_ord(i, op, lit),
        (ScimValue::Bool(b), FilterValue::Bool(lit)) => op == CompareOp::Eq && b == lit,
        _ => false,
    }
}

fn compare_str(value: &str, op: CompareOp, literal: &str, case_exact: bool) -> bool {
    let (v, l) = if case_exact {
        (value.to_string(), literal.to_string())
    } else {
        (value.to_lowercase(), literal.to_lowercase())
    };
    match op {
        CompareOp::Eq => v == l,
        CompareOp::Co => v.contains(&l),
        CompareOp::Sw => v.starts_with(&l),
        CompareOp::Ew => v.ends_with(&l),
        CompareOp::Gt => v > l,
        CompareOp::Ge => v >= l,
        CompareOp::Lt => v < l,
        CompareOp::Le => v <= l,
    }
}

fn compare_ord<T: PartialOrd>(value: &T, op: CompareOp, literal: &T) -> bool {
    match op {
        CompareOp::Eq => value == literal,
        CompareOp::Gt => value > literal,
        CompareOp::Ge => value >= literal,
        CompareOp::Lt => value < literal,
        CompareOp::Le => value <= literal,
        CompareOp::Co | CompareOp::Sw | CompareOp::Ew => false,
    }
}
