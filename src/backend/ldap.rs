//! The LDAP directory backend.
//!
//! Resources are materialized from directory entries through the
//! declarative mapper. One connection is cached behind an async lock and
//! rebuilt on connection-level failures; transient faults are retried with
//! exponential backoff, logical LDAP results are not.

use async_trait::async_trait;
use chrono::Utc;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LdapSettings;
use crate::error::{ScimError, ScimResult};
use crate::ldap::{escape_ldap_value, filter::translate, AttributeMapping, LdapMapper};
use crate::model::ScimObject;

use super::{
    assign_id, stamp_meta, Backend, DeleteResourceRequest, GetResourceRequest,
    GetResourcesRequest, PostResourceRequest, PutResourceRequest, ResourcePage,
};

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

pub struct LdapBackend {
    settings: LdapSettings,
    mappers: HashMap<String, LdapMapper>,
    connection: Arc<RwLock<Option<Ldap>>>,
    max_candidates: usize,
}

impl LdapBackend {
    pub fn new(settings: LdapSettings, mappers: Vec<LdapMapper>, max_candidates: usize) -> Self {
        let mappers = mappers
            .into_iter()
            .map(|m| (m.resource().endpoint().to_lowercase(), m))
            .collect();
        LdapBackend {
            settings,
            mappers,
            connection: Arc::new(RwLock::new(None)),
            max_candidates,
        }
    }

    fn mapper_for(&self, endpoint: &str) -> ScimResult<&LdapMapper> {
        self.mappers
            .get(&endpoint.to_lowercase())
            .ok_or_else(|| ScimError::UnknownEndpoint(endpoint.to_string()))
    }

    fn url(&self) -> String {
        let scheme = if self.settings.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.settings.host, self.settings.port)
    }

    async fn create_connection(&self) -> Result<Ldap, LdapError> {
        let url = self.url();
        debug!(url = %url, "connecting to directory");
        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.settings.connect_timeout_secs));
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver error");
            }
        });
        ldap.simple_bind(&self.settings.bind_dn, &self.settings.bind_password)
            .await?
            .success()?;
        info!(host = %self.settings.host, "directory connection established");
        Ok(ldap)
    }

    async fn connection(&self) -> Result<Ldap, LdapError> {
        {
            let guard = self.connection.read().await;
            if let Some(ldap) = guard.as_ref() {
                return Ok(ldap.clone());
            }
        }
        let ldap = self.create_connection().await?;
        *self.connection.write().await = Some(ldap.clone());
        Ok(ldap)
    }

    async fn invalidate(&self) {
        *self.connection.write().await = None;
    }

    /// Run an operation, retrying connection-level failures with
    /// exponential backoff. Logical LDAP results are surfaced immediately.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> ScimResult<T>
    where
        F: FnMut(Ldap) -> Fut,
        Fut: Future<Output = Result<T, LdapError>>,
    {
        let mut backoff = Duration::from_millis(self.settings.retry.backoff_ms.max(1));
        let mut attempt: u32 = 0;
        loop {
            let result = match self.connection().await {
                Ok(ldap) => op(ldap).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt + 1 < self.settings.retry.attempts.max(1) => {
                    attempt += 1;
                    warn!(error = %e, attempt, "transient directory error, retrying");
                    self.invalidate().await;
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(classify(e)),
            }
        }
    }

    async fn find_entry(&self, mapper: &LdapMapper, id: &str) -> ScimResult<SearchEntry> {
        let mapping = mapper.mapping();
        let filter = format!(
            "(&{}({}={}))",
            mapping.search_filter,
            mapping.id_attribute,
            escape_ldap_value(id)
        );
        let base = mapping.base_dn.clone();
        let attrs = mapping.requested_ldap_attributes();

        let result = self
            .with_retry(|mut ldap| {
                let base = base.clone();
                let filter = filter.clone();
                let attrs = attrs.clone();
                async move { ldap.search(&base, Scope::Subtree, &filter, attrs).await }
            })
            .await?;
        let (entries, _) = result.success().map_err(classify)?;
        entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .ok_or_else(|| ScimError::NotFound(id.to_string()))
    }

    /// Walk the candidate set with simple paged results, carrying the
    /// paging cookie between pages, bounded by the configured cap.
    async fn paged_search(
        &self,
        mapper: &LdapMapper,
        ldap_filter: &str,
    ) -> ScimResult<Vec<SearchEntry>> {
        let mapping = mapper.mapping();
        let base = mapping.base_dn.clone();
        let attrs = mapping.requested_ldap_attributes();
        let filter = ldap_filter.to_string();
        let page_size = self.settings.page_size;
        let cap = self.max_candidates;

        let entries = self
            .with_retry(|mut ldap| {
                let base = base.clone();
                let filter = filter.clone();
                let attrs = attrs.clone();
                async move {
                    let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
                        Box::new(EntriesOnly::new()),
                        Box::new(PagedResults::new(page_size)),
                    ];
                    let mut stream = ldap
                        .streaming_search_with(adapters, &base, Scope::Subtree, &filter, attrs)
                        .await?;
                    let mut entries = Vec::new();
                    while let Some(entry) = stream.next().await? {
                        entries.push(SearchEntry::construct(entry));
                        if entries.len() > cap {
                            break;
                        }
                    }
                    let _ = stream.finish().await;
                    Ok(entries)
                }
            })
            .await?;

        if entries.len() > cap {
            return Err(ScimError::Backend(format!(
                "candidate set exceeds the configured maximum of {}",
                cap
            )));
        }
        Ok(entries)
    }
}

#[async_trait]
impl Backend for LdapBackend {
    async fn authenticate(&self, user_id: &str, password: &str) -> ScimResult<bool> {
        // Resolve the user's DN through the User mapping, then verify the
        // credentials with a bind on a dedicated connection.
        let Some(mapper) = self
            .mappers
            .values()
            .find(|m| m.resource().name().eq_ignore_ascii_case("User"))
        else {
            return Ok(false);
        };
        let Some(AttributeMapping::Simple { ldap_attribute, .. }) =
            mapper.mapping().attribute("userName")
        else {
            return Ok(false);
        };

        let mapping = mapper.mapping();
        let filter = format!(
            "(&{}({}={}))",
            mapping.search_filter,
            ldap_attribute,
            escape_ldap_value(user_id)
        );
        let base = mapping.base_dn.clone();
        let result = self
            .with_retry(|mut ldap| {
                let base = base.clone();
                let filter = filter.clone();
                async move {
                    ldap.search(&base, Scope::Subtree, &filter, vec!["dn".to_string()])
                        .await
                }
            })
            .await?;
        let (entries, _) = result.success().map_err(classify)?;
        let Some(entry) = entries.into_iter().next().map(SearchEntry::construct) else {
            return Ok(false);
        };

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.settings.connect_timeout_secs));
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.url())
            .await
            .map_err(classify)?;
        tokio::spawn(async move {
            let _ = conn.drive().await;
        });
        let bind = ldap
            .simple_bind(&entry.dn, password)
            .await
            .map_err(classify)?;
        let _ = ldap.unbind().await;
        match bind.rc {
            0 => Ok(true),
            RC_INVALID_CREDENTIALS => Ok(false),
            rc => Err(ScimError::Backend(format!(
                "bind for {} failed with result code {}",
                entry.dn, rc
            ))),
        }
    }

    async fn get_resource(&self, request: &GetResourceRequest) -> ScimResult<ScimObject> {
        let mapper = self.mapper_for(&request.endpoint)?;
        let entry = self.find_entry(mapper, &request.resource_id).await?;
        mapper.from_entry(&entry)
    }

    async fn get_resources(&self, request: &GetResourcesRequest) -> ScimResult<ResourcePage> {
        let mapper = self.mapper_for(&request.endpoint)?;
        let mapping = mapper.mapping();

        let ldap_filter = match &request.filter {
            Some(filter) => match translate(filter, mapping, mapper.resource())? {
                Some(clause) => format!("(&{}{})", mapping.search_filter, clause),
                // The filter references an unmapped attribute: empty set.
                None => {
                    return Ok(ResourcePage {
                        resources: Vec::new(),
                        total_results: 0,
                        start_index: request.page.start_index,
                    })
                }
            },
            None => mapping.search_filter.clone(),
        };

        let entries = self.paged_search(mapper, &ldap_filter).await?;
        let mut objects = entries
            .iter()
            .map(|entry| mapper.from_entry(entry))
            .collect::<ScimResult<Vec<ScimObject>>>()?;

        if let Some(sort) = &request.sort {
            objects.sort_by(|a, b| sort.compare(a, b));
        }

        let total_results = objects.len() as i64;
        let (offset, limit) = request.page.window();
        let resources = objects.into_iter().skip(offset).take(limit).collect();
        Ok(ResourcePage {
            resources,
            total_results,
            start_index: request.page.start_index,
        })
    }

    async fn post_resource(&self, request: &PostResourceRequest) -> ScimResult<ScimObject> {
        let mapper = self.mapper_for(&request.endpoint)?;
        let id = Uuid::new_v4().to_string();
        let dn = mapper.dn_for_create(&request.resource, &id)?;
        let entry = mapper.entry_for_create(&request.resource, &id)?;
        let attrs: Vec<(Vec<u8>, std::collections::HashSet<Vec<u8>>)> = entry
            .values
            .into_iter()
            .map(|(attr, values)| (attr.into_bytes(), values.into_iter().collect()))
            .collect();

        let result = self
            .with_retry(|mut ldap| {
                let dn = dn.clone();
                let attrs = attrs.clone();
                async move { ldap.add(&dn, attrs).await }
            })
            .await?;
        match result.rc {
            0 => {}
            RC_ENTRY_ALREADY_EXISTS => {
                return Err(ScimError::Conflict(format!("entry {} already exists", dn)))
            }
            rc => {
                return Err(ScimError::Backend(format!(
                    "add of {} failed with result code {}: {}",
                    dn, rc, result.text
                )))
            }
        }

        let mut object = request.resource.clone();
        let now = Utc::now();
        assign_id(&mut object, mapper.resource(), &id)?;
        stamp_meta(&mut object, mapper.resource(), now, now)?;
        Ok(object)
    }

    async fn put_resource(&self, request: &PutResourceRequest) -> ScimResult<ScimObject> {
        let mapper = self.mapper_for(&request.endpoint)?;
        let entry = self.find_entry(mapper, &request.resource_id).await?;
        let mods = mapper.modifications(&request.resource)?;

        if !mods.is_empty() {
            let dn = entry.dn.clone();
            let result = self
                .with_retry(|mut ldap| {
                    let dn = dn.clone();
                    let mods = mods.clone();
                    async move { ldap.modify(&dn, mods).await }
                })
                .await?;
            match result.rc {
                0 => {}
                RC_NO_SUCH_OBJECT => {
                    return Err(ScimError::NotFound(request.resource_id.clone()))
                }
                rc => {
                    return Err(ScimError::Backend(format!(
                        "modify of {} failed with result code {}: {}",
                        entry.dn, rc, result.text
                    )))
                }
            }
        }

        let refreshed = self.find_entry(mapper, &request.resource_id).await?;
        mapper.from_entry(&refreshed)
    }

    async fn delete_resource(&self, request: &DeleteResourceRequest) -> ScimResult<()> {
        let mapper = self.mapper_for(&request.endpoint)?;
        let entry = self.find_entry(mapper, &request.resource_id).await?;
        let dn = entry.dn.clone();
        let result = self
            .with_retry(|mut ldap| {
                let dn = dn.clone();
                async move { ldap.delete(&dn).await }
            })
            .await?;
        match result.rc {
            0 => Ok(()),
            RC_NO_SUCH_OBJECT => Err(ScimError::NotFound(request.resource_id.clone())),
            rc => Err(ScimError::Backend(format!(
                "delete of {} failed with result code {}: {}",
                entry.dn, rc, result.text
            ))),
        }
    }
}


fn is_transient(error: &LdapError) -> bool {
    matches!(error, LdapError::Io { .. } | LdapError::EndOfStream)
}

fn classify(error: LdapError) -> ScimError {
    match error {
        LdapError::LdapResult { result } => match result.rc {
            RC_NO_SUCH_OBJECT => ScimError::NotFound(result.text),
            RC_INVALID_CREDENTIALS => ScimError::Unauthorized,
            RC_ENTRY_ALREADY_EXISTS => ScimError::Conflict(result.text),
            rc => ScimError::Backend(format!("directory result code {}: {}", rc, result.text)),
        },
        other => ScimError::Backend(other.to_string()),
    }
}
