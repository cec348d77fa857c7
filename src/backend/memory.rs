//! An in-memory backend for development mode and integration tests.
//!
//! Resources live in a map keyed by endpoint and id; filters are evaluated
//! directly against the typed objects. State is process-local and gone on
//! shutdown.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ScimError, ScimResult};
use crate::model::ScimObject;
use crate::schema::{ResourceDescriptor, SchemaRegistry};

use super::{
    assign_id, stamp_meta, Backend, DeleteResourceRequest, GetResourceRequest,
    GetResourcesRequest, PostResourceRequest, PutResourceRequest, ResourcePage,
};

pub struct InMemoryBackend {
    registry: Arc<SchemaRegistry>,
    store: RwLock<HashMap<String, HashMap<String, ScimObject>>>,
}

impl InMemoryBackend {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        InMemoryBackend {
            registry,
            store: RwLock::new(HashMap::new()),
        }
    }

    fn resource_for(&self, endpoint: &str) -> ScimResult<&ResourceDescriptor> {
        self.registry
            .resource_by_endpoint(endpoint)
            .ok_or_else(|| ScimError::UnknownEndpoint(endpoint.to_string()))
    }

    /// The attribute whose value must be unique per endpoint: the
    /// resource's first required writable attribute (`userName` for User,
    /// `displayName` for Group).
    fn natural_key(resource: &ResourceDescriptor) -> Option<&str> {
        resource
            .attributes()
            .iter()
            .find(|a| a.is_required() && !a.is_read_only())
            .map(|a| a.name())
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn authenticate(&self, user_id: &str, password: &str) -> ScimResult<bool> {
        let store = self.store.read().await;
        let Some(users) = store.get("users") else {
            return Ok(false);
        };
        Ok(users.values().any(|user| {
            let name_matches = user
                .simple_value("userName")
                .and_then(|v| v.as_string().ok())
                .is_some_and(|name| name.eq_ignore_ascii_case(user_id));
            let password_matches = user
                .simple_value("password")
                .and_then(|v| v.as_string().ok())
                .is_some_and(|stored| stored == password);
            name_matches && password_matches
        }))
    }

    async fn get_resource(&self, request: &GetResourceRequest) -> ScimResult<ScimObject> {
        self.resource_for(&request.endpoint)?;
        let store = self.store.read().await;
        store
            .get(&request.endpoint.to_lowercase())
            .and_then(|resources| resources.get(&request.resource_id))
            .cloned()
            .ok_or_else(|| ScimError::NotFound(request.resource_id.clone()))
    }

    async fn get_resources(&self, request: &GetResourcesRequest) -> ScimResult<ResourcePage> {
        self.resource_for(&request.endpoint)?;
        let store = self.store.read().await;
        let mut matched: Vec<ScimObject> = store
            .get(&request.endpoint.to_lowercase())
            .map(|resources| {
                resources
                    .values()
                    .filter(|object| {
                        request
                            .filter
                            .as_ref()
                            .map(|f| f.matches(object))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &request.sort {
            matched.sort_by(|a, b| sort.compare(a, b));
        } else {
            // Stable listing order for pagination walks.
            matched.sort_by(|a, b| a.id().unwrap_or("").cmp(b.id().unwrap_or("")));
        }

        let total_results = matched.len() as i64;
        let (offset, limit) = request.page.window();
        let resources: Vec<ScimObject> = matched.into_iter().skip(offset).take(limit).collect();

        Ok(ResourcePage {
            resources,
            total_results,
            start_index: request.page.start_index,
        })
    }

    async fn post_resource(&self, request: &PostResourceRequest) -> ScimResult<ScimObject> {
        let resource = self.resource_for(&request.endpoint)?;
        let mut object = request.resource.clone();

        let mut store = self.store.write().await;
        let resources = store
            .entry(request.endpoint.to_lowercase())
            .or_insert_with(HashMap::new);

        if let Some(key) = Self::natural_key(resource) {
            if let Some(value) = request.resource.simple_value(key).and_then(|v| v.as_string().ok())
            {
                let duplicate = resources.values().any(|existing| {
                    existing
                        .simple_value(key)
                        .and_then(|v| v.as_string().ok())
                        .is_some_and(|other| other.eq_ignore_ascii_case(value))
                });
                if duplicate {
                    return Err(ScimError::Conflict(format!(
                        "{} '{}' is already in use",
                        key, value
                    )));
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        assign_id(&mut object, resource, &id)?;
        stamp_meta(&mut object, resource, now, now)?;
        resources.insert(id, object.clone());
        Ok(object)
    }

    async fn put_resource(&self, request: &PutResourceRequest) -> ScimResult<ScimObject> {
        let resource = self.resource_for(&request.endpoint)?;
        let mut store = self.store.write().await;
        let resources = store
            .entry(request.endpoint.to_lowercase())
            .or_insert_with(HashMap::new);
        let existing = resources
            .get(&request.resource_id)
            .ok_or_else(|| ScimError::NotFound(request.resource_id.clone()))?;

        let created = existing
            .simple_value("meta.created")
            .and_then(|v| v.as_datetime().ok())
            .unwrap_or_else(Utc::now);

        // Full replace: the inbound body becomes the resource; identity and
        // creation time survive.
        let mut object = request.resource.clone();
        assign_id(&mut object, resource, &request.resource_id)?;
        stamp_meta(&mut object, resource, created, Utc::now())?;
        resources.insert(request.resource_id.clone(), object.clone());
        Ok(object)
    }

    async fn delete_resource(&self, request: &DeleteResourceRequest) -> ScimResult<()> {
        self.resource_for(&request.endpoint)?;
        let mut store = self.store.write().await;
        let removed = store
            .get_mut(&request.endpoint.to_lowercase())
            .and_then(|resources| resources.remove(&request.resource_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(ScimError::NotFound(request.resource_id.clone())),
        }
    }
}
