use std::cmp::Ordering;

use crate::model::{ScimObject, ScimValue};

use super::filter_operator::AttrPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn parse(s: &str) -> SortOrder {
        match s.to_lowercase().as_str() {
            "descending" => SortOrder::Descending,
            _ => SortOrder::Ascending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

/// A sort key parsed from `sortBy` / `sortOrder` query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub by: AttrPath,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn from_params(sort_by: Option<&str>, sort_order: Option<&str>) -> Option<SortSpec> {
        sort_by.map(|attr| SortSpec {
            by: AttrPath::parse(attr),
            order: sort_order.map(SortOrder::parse).unwrap_or(SortOrder::Ascending),
        })
    }

    /// Ordering of two objects under this key. Objects missing the sort
    /// attribute order after those that have it, regardless of direction.
    pub fn compare(&self, a: &ScimObject, b: &ScimObject) -> Ordering {
        let path = self.by.to_string();
        let ordering = match (a.simple_value(&path), b.simple_value(&path)) {
            (Some(va), Some(vb)) => compare_values(va, vb),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

fn compare_values(a: &ScimValue, b: &ScimValue) -> Ordering {
    match (a, b) {
        (ScimValue::Str(x), ScimValue::Str(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (ScimValue::Int(x), ScimValue::Int(y)) => x.cmp(y),
        (ScimValue::DateTime(x), ScimValue::DateTime(y)) => x.cmp(y),
        (ScimValue::Bool(x), ScimValue::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
