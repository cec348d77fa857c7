use std::collections::HashMap;

use crate::error::{ScimError, ScimResult};

use super::core;
use super::descriptor::{AttributeDescriptor, ResourceDescriptor};

/// The attributes a schema URI contributes, across every resource that
/// declares attributes under it.
#[derive(Debug, Clone)]
pub struct Schema {
    uri: String,
    attributes: Vec<AttributeDescriptor>,
}

impl Schema {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Look up an attribute by local name, case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }
}

/// Process-wide registry of resource descriptors and their schemas.
///
/// Built once at startup (core schema plus any configured extensions) and
/// shared read-only behind an `Arc` thereafter.
#[derive(Debug)]
pub struct SchemaRegistry {
    resources: Vec<ResourceDescriptor>,
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    /// An empty registry. Most callers want [`SchemaRegistry::core`].
    pub fn new() -> Self {
        SchemaRegistry {
            resources: Vec::new(),
            schemas: HashMap::new(),
        }
    }

    /// A registry holding the SCIM 1.0 core User and Group resources.
    pub fn core() -> Self {
        let mut registry = SchemaRegistry::new();
        registry
            .register(core::USER.clone())
            .expect("core User registers into an empty registry");
        registry
            .register(core::GROUP.clone())
            .expect("core Group registers into an empty registry");
        registry
    }

    /// Register a resource descriptor. Rejects a resource whose name or
    /// endpoint is already taken.
    pub fn register(&mut self, resource: ResourceDescriptor) -> ScimResult<()> {
        if self
            .resources
            .iter()
            .any(|r| r.name().eq_ignore_ascii_case(resource.name()))
        {
            return Err(ScimError::Configuration(format!(
                "duplicate resource registration: {}",
                resource.name()
            )));
        }
        if self
            .resources
            .iter()
            .any(|r| r.endpoint().eq_ignore_ascii_case(resource.endpoint()))
        {
            return Err(ScimError::Configuration(format!(
                "duplicate endpoint registration: {}",
                resource.endpoint()
            )));
        }

        let schema = self
            .schemas
            .entry(resource.schema().to_string())
            .or_insert_with(|| Schema {
                uri: resource.schema().to_string(),
                attributes: Vec::new(),
            });
        for attr in resource.attributes() {
            if schema.attribute(attr.name()).is_none() {
                schema.attributes.push(attr.clone());
            }
        }

        self.resources.push(resource);
        Ok(())
    }

    /// Resolve a resource descriptor by its external name (`User`, `Group`).
    pub fn resource_by_name(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources
            .iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    /// Resolve a resource descriptor by its REST endpoint (`Users`, `Groups`).
    pub fn resource_by_endpoint(&self, endpoint: &str) -> Option<&ResourceDescriptor> {
        self.resources
            .iter()
            .find(|r| r.endpoint().eq_ignore_ascii_case(endpoint))
    }

    /// Resolve a schema by its URI. The URI match is exact.
    pub fn schema(&self, uri: &str) -> Option<&Schema> {
        self.schemas.get(uri)
    }

    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::core()
    }
}
