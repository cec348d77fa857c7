//! The SCIM resource URI model.
//!
//! A SCIM URI has the shape
//! `<baseURI>/<endpoint>[/<resourceID>][.xml|.json][?query]`. Both client
//! and server go through this model: the server parses inbound request
//! URIs, the client emits outbound ones. `parse(emit(x)) == x` for every
//! well-formed value.

use url::form_urlencoded;

use crate::error::{ScimError, ScimResult};
use crate::parser::SortOrder;

/// A media-type suffix on the final path segment. When present it overrides
/// `Accept`-header content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaSuffix {
    #[default]
    None,
    Xml,
    Json,
}

impl MediaSuffix {
    fn strip(segment: &str) -> (&str, MediaSuffix) {
        if let Some(stem) = segment.strip_suffix(".xml") {
            (stem, MediaSuffix::Xml)
        } else if let Some(stem) = segment.strip_suffix(".json") {
            (stem, MediaSuffix::Json)
        } else {
            (segment, MediaSuffix::None)
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MediaSuffix::None => "",
            MediaSuffix::Xml => ".xml",
            MediaSuffix::Json => ".json",
        }
    }
}

/// Query parameters of a SCIM list or retrieve request. The filter is kept
/// as its raw expression string; callers hand it to the filter parser.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    pub attributes: Option<Vec<String>>,
    pub filter: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub start_index: Option<i64>,
    pub count: Option<i64>,
}

impl QueryParams {
    pub fn is_empty(&self) -> bool {
        *self == QueryParams::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScimUri {
    pub endpoint: String,
    pub resource_id: Option<String>,
    pub suffix: MediaSuffix,
    pub query: QueryParams,
}

impl ScimUri {
    pub fn for_endpoint(endpoint: &str) -> Self {
        ScimUri {
            endpoint: endpoint.to_string(),
            resource_id: None,
            suffix: MediaSuffix::None,
            query: QueryParams::default(),
        }
    }

    pub fn for_resource(endpoint: &str, resource_id: &str) -> Self {
        ScimUri {
            endpoint: endpoint.to_string(),
            resource_id: Some(resource_id.to_string()),
            suffix: MediaSuffix::None,
            query: QueryParams::default(),
        }
    }

    /// Parse the path-and-query of a request URI, relative to `base_uri`
    /// (e.g. `/v1`).
    pub fn parse(base_uri: &str, path_and_query: &str) -> ScimResult<ScimUri> {
        let base = base_uri.trim_end_matches('/');
        let rest = path_and_query
            .strip_prefix(base)
            .ok_or_else(|| {
                ScimError::InvalidUri(format!(
                    "path '{}' is outside the SCIM base URI '{}'",
                    path_and_query, base
                ))
            })?;

        let (path, raw_query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if segments.is_empty() || segments.len() > 2 {
            return Err(ScimError::InvalidUri(format!(
                "expected <endpoint>[/<id>], got '{}'",
                path
            )));
        }

        let (suffix, endpoint, resource_id) = if segments.len() == 2 {
            let (id, suffix) = MediaSuffix::strip(segments[1]);
            if id.is_empty() {
                return Err(ScimError::InvalidUri("empty resource id".to_string()));
            }
            (suffix, segments[0].to_string(), Some(id.to_string()))
        } else {
            let (endpoint, suffix) = MediaSuffix::strip(segments[0]);
            (suffix, endpoint.to_string(), None)
        };

        if endpoint.is_empty() {
            return Err(ScimError::InvalidUri("empty endpoint".to_string()));
        }

        let query = match raw_query {
            Some(q) => parse_query(q)?,
            None => QueryParams::default(),
        };

        Ok(ScimUri {
            endpoint,
            resource_id,
            suffix,
            query,
        })
    }

    /// Emit the path-and-query under `base_uri`.
    pub fn emit(&self, base_uri: &str) -> String {
        let mut out = format!(
            "{}/{}",
            base_uri.trim_end_matches('/'),
            self.endpoint
        );
        if let Some(id) = &self.resource_id {
            out.push('/');
            out.push_str(id);
        }
        out.push_str(self.suffix.as_str());

        if !self.query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            if let Some(attrs) = &self.query.attributes {
                serializer.append_pair("attributes", &attrs.join(","));
            }
            if let Some(filter) = &self.query.filter {
                serializer.append_pair("filter", filter);
            }
            if let Some(sort_by) = &self.query.sort_by {
                serializer.append_pair("sortBy", sort_by);
            }
            if let Some(order) = &self.query.sort_order {
                serializer.append_pair("sortOrder", order.as_str());
            }
            if let Some(start) = self.query.start_index {
                serializer.append_pair("startIndex", &start.to_string());
            }
            if let Some(count) = self.query.count {
                serializer.append_pair("count", &count.to_string());
            }
            out.push('?');
            out.push_str(&serializer.finish());
        }
        out
    }
}

fn parse_query(raw: &str) -> ScimResult<QueryParams> {
    let mut query = QueryParams::default();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        match key.to_lowercase().as_str() {
            "attributes" => {
                let attrs: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
                query.attributes = Some(attrs);
            }
            "filter" => query.filter = Some(value.into_owned()),
            "sortby" => query.sort_by = Some(value.into_owned()),
            "sortorder" => query.sort_order = Some(SortOrder::parse(&value)),
            "startindex" => {
                query.start_index = Some(value.parse::<i64>().map_err(|_| {
                    ScimError::InvalidUri(format!("startIndex is not a number: {}", value))
                })?)
            }
            "count" => {
                query.count = Some(value.parse::<i64>().map_err(|_| {
                    ScimError::InvalidUri(format!("count is not a number: {}", value))
                })?)
            }
            _ => {}
        }
    }
    Ok(query)
}
