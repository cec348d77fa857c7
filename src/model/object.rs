use crate::error::{ScimError, ScimResult};
use crate::schema::ResourceDescriptor;

use super::attribute::ScimAttribute;
use super::value::ScimValue;

/// A single resource instance: an ordered mapping from schema URI to an
/// ordered, case-insensitive mapping from attribute name to attribute.
///
/// Attributes of schemas the registry does not know are kept verbatim in
/// `extra` so that PUT round-trips preserve them.
#[derive(Debug, Clone, Default)]
pub struct ScimObject {
    resource_name: String,
    entries: Vec<(String, Vec<ScimAttribute>)>,
    extra: Vec<(String, serde_json::Value)>,
}

impl ScimObject {
    pub fn new(resource_name: &str) -> Self {
        ScimObject {
            resource_name: resource_name.to_string(),
            entries: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Add an attribute under its descriptor's schema, replacing any
    /// attribute of the same name.
    pub fn add_attribute(&mut self, attribute: ScimAttribute) {
        let schema = attribute.schema();
        let index = match self.entries.iter().position(|(uri, _)| uri == schema) {
            Some(index) => index,
            None => {
                self.entries.push((schema.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        let attrs = &mut self.entries[index].1;
        match attrs
            .iter_mut()
            .find(|a| a.name().eq_ignore_ascii_case(attribute.name()))
        {
            Some(existing) => *existing = attribute,
            None => attrs.push(attribute),
        }
    }

    /// Look up an attribute: exact on schema URI, case-insensitive on name.
    pub fn attribute(&self, schema: &str, name: &str) -> Option<&ScimAttribute> {
        self.entries
            .iter()
            .find(|(uri, _)| uri == schema)
            .and_then(|(_, attrs)| {
                attrs
                    .iter()
                    .find(|a| a.name().eq_ignore_ascii_case(name))
            })
    }

    /// Look up an attribute by name across every schema, in schema
    /// insertion order.
    pub fn find_attribute(&self, name: &str) -> Option<&ScimAttribute> {
        self.entries.iter().find_map(|(_, attrs)| {
            attrs
                .iter()
                .find(|a| a.name().eq_ignore_ascii_case(name))
        })
    }

    pub fn remove_attribute(&mut self, schema: &str, name: &str) -> Option<ScimAttribute> {
        let (_, attrs) = self.entries.iter_mut().find(|(uri, _)| uri == schema)?;
        let idx = attrs
            .iter()
            .position(|a| a.name().eq_ignore_ascii_case(name))?;
        Some(attrs.remove(idx))
    }

    /// Schema URIs with at least one attribute, in insertion order,
    /// followed by preserved unknown schemas.
    pub fn schemas(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, attrs)| !attrs.is_empty())
            .map(|(uri, _)| uri.as_str())
            .chain(self.extra.iter().map(|(uri, _)| uri.as_str()))
            .collect()
    }

    pub fn attributes_of(&self, schema: &str) -> &[ScimAttribute] {
        self.entries
            .iter()
            .find(|(uri, _)| uri == schema)
            .map(|(_, attrs)| attrs.as_slice())
            .unwrap_or(&[])
    }

    /// All attributes across schemas, in order.
    pub fn attributes(&self) -> impl Iterator<Item = &ScimAttribute> {
        self.entries.iter().flat_map(|(_, attrs)| attrs.iter())
    }

    /// Preserve the body of a schema the registry does not know.
    pub fn add_extra_schema(&mut self, uri: &str, body: serde_json::Value) {
        match self.extra.iter_mut().find(|(u, _)| u == uri) {
            Some((_, existing)) => *existing = body,
            None => self.extra.push((uri.to_string(), body)),
        }
    }

    pub fn extra_schemas(&self) -> &[(String, serde_json::Value)] {
        &self.extra
    }

    /// The `id` attribute value, when present.
    pub fn id(&self) -> Option<&str> {
        self.find_attribute("id")
            .and_then(|a| a.value().as_string().ok())
    }

    /// Convenience read of a simple top-level or dotted sub-attribute value.
    pub fn simple_value(&self, path: &str) -> Option<&ScimValue> {
        match path.split_once('.') {
            None => self.find_attribute(path).map(|a| a.value()),
            Some((name, sub)) => self
                .find_attribute(name)
                .and_then(|a| a.value().sub_attribute(sub))
                .map(|a| a.value()),
        }
    }

    /// Validate this object against its resource descriptor: every
    /// `required` attribute must be present.
    pub fn check_required(&self, resource: &ResourceDescriptor) -> ScimResult<()> {
        for descriptor in resource.attributes() {
            if descriptor.is_required()
                && !descriptor.is_read_only()
                && self.attribute(descriptor.schema(), descriptor.name()).is_none()
            {
                return Err(ScimError::SchemaViolation(format!(
                    "missing required attribute '{}'",
                    descriptor.name()
                )));
            }
        }
        Ok(())
    }

    /// Drop attributes marked `readOnly`, as PUT/POST semantics require for
    /// inbound bodies.
    pub fn strip_read_only(&mut self) {
        for (_, attrs) in &mut self.entries {
            attrs.retain(|a| !a.descriptor().is_read_only());
        }
    }
}

/// Structural equality: same resource, same attribute multiset per schema
/// (case-insensitive on names), unknown-schema bodies equal. Attribute
/// order is not significant.
impl PartialEq for ScimObject {
    fn eq(&self, other: &Self) -> bool {
        if !self.resource_name.eq_ignore_ascii_case(&other.resource_name) {
            return false;
        }
        let mine: Vec<&(String, Vec<ScimAttribute>)> =
            self.entries.iter().filter(|(_, a)| !a.is_empty()).collect();
        let theirs: Vec<&(String, Vec<ScimAttribute>)> =
            other.entries.iter().filter(|(_, a)| !a.is_empty()).collect();
        if mine.len() != theirs.len() {
            return false;
        }
        for (uri, attrs) in mine {
            let Some((_, other_attrs)) = theirs.iter().find(|(u, _)| u == uri) else {
                return false;
            };
            if attrs.len() != other_attrs.len() {
                return false;
            }
            for attr in attrs {
                let Some(counterpart) = other_attrs
                    .iter()
                    .find(|a| a.name().eq_ignore_ascii_case(attr.name()))
                else {
                    return false;
                };
                if attr != counterpart {
                    return false;
                }
            }
        }
        self.extra == other.extra
    }
}
