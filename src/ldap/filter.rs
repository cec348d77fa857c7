//! Translation of SCIM filter trees into RFC 4515 LDAP search filters.

use chrono::DateTime;

use crate::error::ScimResult;
use crate::parser::{AttrPath, CompareOp, FilterOp, FilterValue};
use crate::schema::ResourceDescriptor;

use super::mapping::{AttributeMapping, ResourceMapping, ValueTransform};

/// Translate a SCIM filter into an LDAP filter string.
///
/// `Ok(None)` means the filter provably selects nothing (it references an
/// attribute with no LDAP mapping); the caller returns the empty set
/// without searching. String comparisons against an attribute whose
/// descriptor is not `caseExact` flatten to substring matches on the
/// lowercased value.
pub fn translate(
    filter: &FilterOp,
    mapping: &ResourceMapping,
    resource: &ResourceDescriptor,
) -> ScimResult<Option<String>> {
    Ok(match filter {
        FilterOp::And(a, b) => {
            match (translate(a, mapping, resource)?, translate(b, mapping, resource)?) {
                (Some(left), Some(right)) => Some(format!("(&{}{})", left, right)),
                // One side selects nothing, so the conjunction does too.
                _ => None,
            }
        }
        FilterOp::Or(a, b) => {
            match (translate(a, mapping, resource)?, translate(b, mapping, resource)?) {
                (Some(left), Some(right)) => Some(format!("(|{}{})", left, right)),
                (Some(one), None) | (None, Some(one)) => Some(one),
                (None, None) => None,
            }
        }
        FilterOp::Present(path) => {
            resolve(path, mapping).map(|(attrs, _)| {
                or_over(attrs.iter().map(|a| format!("({}=*)", a)))
            })
        }
        FilterOp::Compare(path, op, literal) => resolve(path, mapping).map(|(attrs, transform)| {
            let flatten = matches!(literal, FilterValue::Str(_))
                && transform == ValueTransform::String
                && !case_exact_for(path, resource);
            if flatten {
                let value =
                    escape_ldap_value(&render_literal(literal, transform).to_lowercase());
                or_over(attrs.iter().map(|a| flattened_predicate(a, *op, &value)))
            } else {
                let value = escape_ldap_value(&render_literal(literal, transform));
                or_over(attrs.iter().map(|a| predicate(a, *op, &value)))
            }
        }),
    })
}

/// The `caseExact` flag of the descriptor an attribute path addresses.
/// Plural paths address the element's `value` sub-attribute unless the
/// path names another sub-attribute.
fn case_exact_for(path: &AttrPath, resource: &ResourceDescriptor) -> bool {
    let Some(descriptor) = resource.attribute(&path.attribute) else {
        return true;
    };
    if descriptor.is_plural() {
        let sub = path.sub_attribute.as_deref().unwrap_or("value");
        // A canonical type token addresses the element value.
        return descriptor
            .sub_attribute(sub)
            .or_else(|| descriptor.sub_attribute("value"))
            .map(|d| d.is_case_exact())
            .unwrap_or_else(|| descriptor.is_case_exact());
    }
    match &path.sub_attribute {
        Some(sub) => descriptor
            .sub_attribute(sub)
            .map(|d| d.is_case_exact())
            .unwrap_or(true),
        None => descriptor.is_case_exact(),
    }
}

/// The LDAP attributes an attribute path addresses, with the value
/// transform that applies. `None` when the path has no mapping.
fn resolve<'a>(
    path: &AttrPath,
    mapping: &'a ResourceMapping,
) -> Option<(Vec<&'a str>, ValueTransform)> {
    let attribute = mapping.attribute(&path.attribute)?;
    match attribute {
        AttributeMapping::Simple { ldap_attribute, transform } => match &path.sub_attribute {
            None => Some((vec![ldap_attribute.as_str()], *transform)),
            Some(_) => None,
        },
        AttributeMapping::Derived { ldap_attribute } => match &path.sub_attribute {
            None => Some((vec![ldap_attribute.as_str()], ValueTransform::String)),
            Some(_) => None,
        },
        AttributeMapping::Complex { sub_attributes } => {
            let sub = path.sub_attribute.as_deref()?;
            sub_attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(sub))
                .map(|(_, attr)| (vec![attr.as_str()], ValueTransform::String))
        }
        AttributeMapping::Plural { types, .. } => match path.sub_attribute.as_deref() {
            // No type token: any of the mapped type attributes may match.
            None | Some("value") => {
                Some((types.values().map(|s| s.as_str()).collect(), ValueTransform::String))
            }
            // A type token chooses the mapped LDAP attribute for that type.
            Some(token) => types
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(token))
                .map(|(_, attr)| (vec![attr.as_str()], ValueTransform::String)),
        },
    }
}

fn predicate(attr: &str, op: CompareOp, value: &str) -> String {
    match op {
        CompareOp::Eq => format!("({}={})", attr, value),
        CompareOp::Co => format!("({}=*{}*)", attr, value),
        CompareOp::Sw => format!("({}={}*)", attr, value),
        CompareOp::Ew => format!("({}=*{})", attr, value),
        CompareOp::Ge => format!("({}>={})", attr, value),
        CompareOp::Le => format!("({}<={})", attr, value),
        // LDAP has no strict inequalities.
        CompareOp::Gt => format!("(&({attr}>={value})(!({attr}={value})))", attr = attr, value = value),
        CompareOp::Lt => format!("(&({attr}<={value})(!({attr}={value})))", attr = attr, value = value),
    }
}

/// Predicate for a non-case-exact string comparison: equality and ordering
/// operators flatten to a substring match on the normalized value.
fn flattened_predicate(attr: &str, op: CompareOp, value: &str) -> String {
    match op {
        CompareOp::Sw => format!("({}={}*)", attr, value),
        CompareOp::Ew => format!("({}=*{})", attr, value),
        _ => format!("({}=*{}*)", attr, value),
    }
}

fn or_over(mut parts: impl Iterator<Item = String>) -> String {
    let first = parts.next().unwrap_or_default();
    let rest: Vec<String> = parts.collect();
    if rest.is_empty() {
        first
    } else {
        format!("(|{}{})", first, rest.concat())
    }
}

fn render_literal(literal: &FilterValue, transform: ValueTransform) -> String {
    match (literal, transform) {
        (FilterValue::Bool(b), ValueTransform::Boolean) => {
            if *b { "TRUE" } else { "FALSE" }.to_string()
        }
        (FilterValue::Str(s), ValueTransform::Datetime) => DateTime::parse_from_rfc3339(s)
            .map(|dt| super::mapper::to_generalized_time(&dt.with_timezone(&chrono::Utc)))
            .unwrap_or_else(|_| s.clone()),
        (FilterValue::Str(s), _) => s.clone(),
        (FilterValue::Num(n), _) => n.to_string(),
        (FilterValue::Bool(b), _) => b.to_string(),
    }
}

/// Escape special characters in filter values (RFC 4515).
pub fn escape_ldap_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}
