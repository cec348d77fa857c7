use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::BackendSettings;
use crate::error::{ScimError, ScimResult};
use crate::ldap::{LdapMapper, ResourceMapping};
use crate::model::{ScimAttribute, ScimObject, ScimValue};
use crate::parser::{FilterOp, PageParams, SortSpec};
use crate::schema::{ResourceDescriptor, SchemaRegistry};

pub mod ldap;
pub mod memory;

/// Retrieve one resource by id.
#[derive(Debug, Clone)]
pub struct GetResourceRequest {
    pub endpoint: String,
    pub resource_id: String,
    pub attributes: Option<Vec<String>>,
}

/// Retrieve selected resources.
#[derive(Debug, Clone)]
pub struct GetResourcesRequest {
    pub endpoint: String,
    pub filter: Option<FilterOp>,
    pub sort: Option<SortSpec>,
    pub page: PageParams,
    pub attributes: Option<Vec<String>>,
}

/// Create a resource.
#[derive(Debug, Clone)]
pub struct PostResourceRequest {
    pub endpoint: String,
    pub resource: ScimObject,
}

/// Replace a resource.
#[derive(Debug, Clone)]
pub struct PutResourceRequest {
    pub endpoint: String,
    pub resource_id: String,
    pub resource: ScimObject,
}

/// Delete a resource.
#[derive(Debug, Clone)]
pub struct DeleteResourceRequest {
    pub endpoint: String,
    pub resource_id: String,
}

/// One page of a list result.
#[derive(Debug, Clone)]
pub struct ResourcePage {
    pub resources: Vec<ScimObject>,
    pub total_results: i64,
    pub start_index: i64,
}

/// The pluggable resource store behind the SCIM server.
///
/// Implementations must be safe for concurrent use; every request works on
/// its own typed request value and returns either resources or a
/// [`ScimError`] that the HTTP layer maps to an Errors envelope.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Verify a user's credentials.
    async fn authenticate(&self, user_id: &str, password: &str) -> ScimResult<bool>;

    async fn get_resource(&self, request: &GetResourceRequest) -> ScimResult<ScimObject>;

    async fn get_resources(&self, request: &GetResourcesRequest) -> ScimResult<ResourcePage>;

    async fn post_resource(&self, request: &PostResourceRequest) -> ScimResult<ScimObject>;

    async fn put_resource(&self, request: &PutResourceRequest) -> ScimResult<ScimObject>;

    async fn delete_resource(&self, request: &DeleteResourceRequest) -> ScimResult<()>;
}

/// Creates a backend from configuration.
pub struct BackendFactory;

impl BackendFactory {
    pub fn create(
        settings: &BackendSettings,
        registry: Arc<SchemaRegistry>,
        mappings: Vec<ResourceMapping>,
        max_candidates: usize,
    ) -> ScimResult<Arc<dyn Backend>> {
        match settings.backend_type.as_str() {
            "memory" => Ok(Arc::new(memory::InMemoryBackend::new(registry))),
            "ldap" => {
                let ldap_settings = settings.ldap.clone().ok_or_else(|| {
                    ScimError::Configuration(
                        "ldap settings are required for the ldap backend".to_string(),
                    )
                })?;
                let mappers = mappings
                    .into_iter()
                    .map(|mapping| LdapMapper::new(mapping, &registry))
                    .collect::<ScimResult<Vec<LdapMapper>>>()?;
                if mappers.is_empty() {
                    return Err(ScimError::Configuration(
                        "the ldap backend needs at least one resource mapping".to_string(),
                    ));
                }
                Ok(Arc::new(ldap::LdapBackend::new(
                    ldap_settings,
                    mappers,
                    max_candidates,
                )))
            }
            other => Err(ScimError::Configuration(format!(
                "unsupported backend type: {}",
                other
            ))),
        }
    }
}

/// Stamp a server-assigned id onto a created resource.
pub(crate) fn assign_id(
    object: &mut ScimObject,
    resource: &ResourceDescriptor,
    id: &str,
) -> ScimResult<()> {
    if let Some(descriptor) = resource.attribute("id") {
        object.add_attribute(ScimAttribute::singular(
            descriptor,
            ScimValue::Str(id.to_string()),
        )?);
    }
    Ok(())
}

/// Stamp `meta.created` / `meta.lastModified` onto a resource.
pub(crate) fn stamp_meta(
    object: &mut ScimObject,
    resource: &ResourceDescriptor,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
) -> ScimResult<()> {
    let Some(meta_descriptor) = resource.attribute("meta") else {
        return Ok(());
    };
    let mut subs = Vec::new();
    if let Some(descriptor) = meta_descriptor.sub_attribute("created") {
        subs.push(ScimAttribute::singular(descriptor, ScimValue::DateTime(created))?);
    }
    if let Some(descriptor) = meta_descriptor.sub_attribute("lastModified") {
        subs.push(ScimAttribute::singular(descriptor, ScimValue::DateTime(modified))?);
    }
    let value = ScimAttribute::complex_value(meta_descriptor, subs)?;
    object.add_attribute(ScimAttribute::singular(meta_descriptor, value)?);
    Ok(())
}
