use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{ScimError, ScimResult};
use crate::schema::{AttributeDescriptor, DataType, ResourceDescriptor};

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub authentication: AuthSettings,
    pub backend: BackendSettings,
    /// Per-resource LDAP mapping files, relative to the config file.
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
    /// Additional resource schemas registered next to the SCIM core schema.
    #[serde(default)]
    pub schemas: Vec<SchemaDecl>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
    /// `count` applied when a list request names none.
    #[serde(default = "default_count")]
    pub default_count: i64,
    /// Upper bound on the candidate set retrieved for in-memory sorting.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Deadline for outbound exchanges, seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_uri() -> String {
    "/v1".to_string()
}

fn default_count() -> i64 {
    100
}

fn default_max_candidates() -> usize {
    10_000
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    /// `basic` or `none`.
    #[serde(rename = "type")]
    pub auth_type: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            auth_type: "basic".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    /// `ldap` or `memory`.
    #[serde(rename = "type")]
    pub backend_type: String,
    pub ldap: Option<LdapSettings>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LdapSettings {
    pub host: String,
    #[serde(default = "default_ldap_port")]
    pub port: u16,
    pub bind_dn: String,
    pub bind_password: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Simple paged results page size.
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_page_size() -> i32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            attempts: 3,
            backoff_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub mapping_file: String,
}

/// A resource schema declared in the configuration file, registered at
/// startup next to the built-in core schema.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDecl {
    pub schema: String,
    pub name: String,
    pub endpoint: String,
    pub attributes: Vec<AttrDecl>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttrDecl {
    pub name: String,
    #[serde(rename = "type", default = "default_attr_type")]
    pub data_type: DataType,
    #[serde(default)]
    pub plural: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub case_exact: bool,
    #[serde(default)]
    pub plural_types: Vec<String>,
    #[serde(default)]
    pub sub_attributes: Vec<AttrDecl>,
}

fn default_attr_type() -> DataType {
    DataType::String
}

impl SchemaDecl {
    pub fn to_descriptor(&self) -> ScimResult<ResourceDescriptor> {
        let attributes = self
            .attributes
            .iter()
            .map(|decl| decl.to_descriptor(&self.schema))
            .collect::<ScimResult<Vec<AttributeDescriptor>>>()?;
        Ok(ResourceDescriptor::new(
            &self.schema,
            &self.name,
            &self.endpoint,
            attributes,
        ))
    }
}

impl AttrDecl {
    fn to_descriptor(&self, schema: &str) -> ScimResult<AttributeDescriptor> {
        if self.plural {
            let types: Vec<&str> = self.plural_types.iter().map(|s| s.as_str()).collect();
            return Ok(AttributeDescriptor::plural(
                &self.name,
                self.data_type,
                schema,
                self.read_only,
                self.required,
                self.case_exact,
                &types,
            ));
        }
        if self.data_type == DataType::Complex {
            let subs = self
                .sub_attributes
                .iter()
                .map(|decl| decl.to_descriptor(schema))
                .collect::<ScimResult<Vec<AttributeDescriptor>>>()?;
            return Ok(AttributeDescriptor::singular_complex(
                &self.name,
                schema,
                self.read_only,
                self.required,
                subs,
            ));
        }
        Ok(AttributeDescriptor::singular_simple(
            &self.name,
            self.data_type,
            schema,
            self.read_only,
            self.required,
            self.case_exact,
        ))
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` /
    /// `${VAR:-default}` references against the environment.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> ScimResult<Self> {
        let path = config_path.as_ref();
        if !path.exists() {
            return Err(ScimError::Configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| {
            ScimError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let expanded = Self::expand_env_vars(&content)?;
        let config: AppConfig = serde_yaml::from_str(&expanded).map_err(|e| {
            ScimError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Zero-config development mode: in-memory backend, no authentication.
    pub fn default_config() -> Self {
        AppConfig {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_uri: default_base_uri(),
                default_count: default_count(),
                max_candidates: default_max_candidates(),
                request_timeout_secs: default_request_timeout(),
            },
            authentication: AuthSettings {
                auth_type: "none".to_string(),
            },
            backend: BackendSettings {
                backend_type: "memory".to_string(),
                ldap: None,
            },
            resources: Vec::new(),
            schemas: Vec::new(),
        }
    }

    /// Expand environment variables in the form `${VAR}` or
    /// `${VAR:-default}`.
    fn expand_env_vars(content: &str) -> ScimResult<String> {
        let mut expanded = String::with_capacity(content.len());
        let mut rest = content;
        while let Some(open) = rest.find("${") {
            expanded.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find('}') else {
                expanded.push_str(&rest[open..]);
                return Ok(expanded);
            };
            let expr = &after[..close];
            let (name, default) = match expr.split_once(":-") {
                Some((n, d)) => (n, Some(d)),
                None => (expr, None),
            };
            match std::env::var(name) {
                Ok(value) => expanded.push_str(&value),
                Err(_) => match default {
                    Some(d) => expanded.push_str(d),
                    None => {
                        return Err(ScimError::Configuration(format!(
                            "environment variable {} not set and no default given",
                            name
                        )))
                    }
                },
            }
            rest = &after[close + 1..];
        }
        expanded.push_str(rest);
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  host: "0.0.0.0"
  port: 8080
  baseUri: /v1
authentication:
  type: basic
backend:
  type: ldap
  ldap:
    host: ldap.example.com
    bindDn: cn=admin,dc=example,dc=com
    bindPassword: "${SCIM_TEST_LDAP_PASSWORD:-hunter2}"
resources:
  - mappingFile: users.yaml
  - mappingFile: groups.yaml
"#;

    #[test]
    fn test_load_with_defaults_and_env_expansion() {
        let file = std::env::temp_dir().join("scim-gateway-config-test.yaml");
        std::fs::write(&file, SAMPLE).unwrap();

        let config = AppConfig::load_from_file(&file).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.base_uri, "/v1");
        assert_eq!(config.server.default_count, 100);
        assert_eq!(config.authentication.auth_type, "basic");
        let ldap = config.backend.ldap.as_ref().unwrap();
        assert_eq!(ldap.port, 389);
        assert_eq!(ldap.bind_password, "hunter2");
        assert_eq!(ldap.retry.attempts, 3);
        assert_eq!(config.resources.len(), 2);

        std::fs::remove_file(&file).unwrap();
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("SCIM_TEST_TOKEN", "sekrit");
        let expanded =
            AppConfig::expand_env_vars("a: ${SCIM_TEST_TOKEN}\nb: ${MISSING:-fallback}").unwrap();
        assert!(expanded.contains("sekrit"));
        assert!(expanded.contains("fallback"));
        std::env::remove_var("SCIM_TEST_TOKEN");

        assert!(AppConfig::expand_env_vars("x: ${DEFINITELY_NOT_SET_ANYWHERE}").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(AppConfig::load_from_file("/nonexistent/config.yaml").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default_config();
        assert_eq!(config.backend.backend_type, "memory");
        assert_eq!(config.authentication.auth_type, "none");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_schema_declaration() {
        let decl: SchemaDecl = serde_yaml::from_str(
            r#"
schema: urn:example:schemas:device:1.0
name: Device
endpoint: Devices
attributes:
  - name: id
    readOnly: true
    caseExact: true
  - name: serialNumber
    required: true
  - name: tags
    plural: true
    pluralTypes: [asset, location]
"#,
        )
        .unwrap();
        let resource = decl.to_descriptor().unwrap();
        assert_eq!(resource.endpoint(), "Devices");
        assert!(resource.attribute("serialNumber").unwrap().is_required());
        assert!(resource.attribute("tags").unwrap().is_plural());
    }
}
