//! Declarative SCIM-to-LDAP mapping configuration.
//!
//! One YAML file per resource describes how that resource materializes
//! from directory entries: the DN template and object classes used on
//! create, the filter selecting candidate entries, and a mapping for each
//! SCIM attribute.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ScimError, ScimResult};
use crate::schema::SchemaRegistry;

/// How a SCIM value is represented in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueTransform {
    #[default]
    String,
    /// `TRUE` / `FALSE`.
    Boolean,
    /// Generalized time, `YYYYMMDDHHMMSSZ`.
    Datetime,
    Integer,
    /// Raw bytes in the directory, base64 on the SCIM side.
    Binary,
}

/// The mapping of one SCIM attribute.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AttributeMapping {
    /// One SCIM attribute to one LDAP attribute.
    Simple {
        #[serde(rename = "ldapAttribute")]
        ldap_attribute: String,
        #[serde(default)]
        transform: ValueTransform,
    },
    /// Each sub-attribute of a complex attribute to a distinct LDAP
    /// attribute.
    Complex {
        #[serde(rename = "subAttributes")]
        sub_attributes: BTreeMap<String, String>,
    },
    /// One canonical type of a plural attribute to one LDAP attribute.
    Plural {
        types: BTreeMap<String, String>,
        #[serde(rename = "primaryType", default)]
        primary_type: Option<String>,
    },
    /// A read-only SCIM value computed from another LDAP attribute.
    /// Ignored on write.
    Derived {
        #[serde(rename = "ldapAttribute")]
        ldap_attribute: String,
    },
}

impl AttributeMapping {
    /// Every LDAP attribute this mapping reads.
    pub fn ldap_attributes(&self) -> Vec<&str> {
        match self {
            AttributeMapping::Simple { ldap_attribute, .. }
            | AttributeMapping::Derived { ldap_attribute } => vec![ldap_attribute.as_str()],
            AttributeMapping::Complex { sub_attributes } => {
                sub_attributes.values().map(|s| s.as_str()).collect()
            }
            AttributeMapping::Plural { types, .. } => {
                types.values().map(|s| s.as_str()).collect()
            }
        }
    }

    pub fn transform(&self) -> ValueTransform {
        match self {
            AttributeMapping::Simple { transform, .. } => *transform,
            _ => ValueTransform::String,
        }
    }
}

/// The per-resource mapping file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMapping {
    /// The SCIM resource this file maps, by external name.
    pub resource: String,
    /// Search base for candidate entries.
    pub base_dn: String,
    /// DN pattern for created entries; `{id}` and `{attributeName}` slots
    /// are substituted.
    pub dn_template: String,
    /// The LDAP attribute holding the SCIM `id`.
    pub id_attribute: String,
    #[serde(default)]
    pub object_classes: Vec<String>,
    /// Filter template selecting candidate entries for this resource.
    pub search_filter: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMapping>,
    /// Operational attribute for `meta.created`.
    #[serde(default = "default_created_attribute")]
    pub created_attribute: String,
    /// Operational attribute for `meta.lastModified`.
    #[serde(default = "default_modified_attribute")]
    pub modified_attribute: String,
}

fn default_created_attribute() -> String {
    "createTimestamp".to_string()
}

fn default_modified_attribute() -> String {
    "modifyTimestamp".to_string()
}

impl ResourceMapping {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ScimResult<ResourceMapping> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScimError::Configuration(format!(
                "failed to read mapping file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> ScimResult<ResourceMapping> {
        let mapping: ResourceMapping = serde_yaml::from_str(content)
            .map_err(|e| ScimError::Configuration(format!("invalid mapping file: {}", e)))?;
        Ok(mapping)
    }

    /// Check the mapping against the registry: the resource must exist and
    /// every mapped SCIM attribute must have a descriptor of the matching
    /// shape.
    pub fn validate(&self, registry: &SchemaRegistry) -> ScimResult<()> {
        let resource = registry.resource_by_name(&self.resource).ok_or_else(|| {
            ScimError::Configuration(format!("mapping names unknown resource '{}'", self.resource))
        })?;
        for (name, mapping) in &self.attributes {
            let descriptor = resource.attribute(name).ok_or_else(|| {
                ScimError::Configuration(format!(
                    "mapping for unknown attribute '{}' of '{}'",
                    name, self.resource
                ))
            })?;
            match mapping {
                AttributeMapping::Plural { types, .. } => {
                    if !descriptor.is_plural() {
                        return Err(ScimError::Configuration(format!(
                            "attribute '{}' is singular but mapped as plural",
                            name
                        )));
                    }
                    if let Some(canonical) = descriptor.plural_types() {
                        for t in types.keys() {
                            if !canonical.iter().any(|c| c.eq_ignore_ascii_case(t)) {
                                return Err(ScimError::Configuration(format!(
                                    "'{}' is not a canonical type of '{}'",
                                    t, name
                                )));
                            }
                        }
                    }
                }
                AttributeMapping::Complex { sub_attributes } => {
                    if !descriptor.is_complex() || descriptor.is_plural() {
                        return Err(ScimError::Configuration(format!(
                            "attribute '{}' is not a singular complex attribute",
                            name
                        )));
                    }
                    for sub in sub_attributes.keys() {
                        if descriptor.sub_attribute(sub).is_none() {
                            return Err(ScimError::Configuration(format!(
                                "'{}' is not a sub-attribute of '{}'",
                                sub, name
                            )));
                        }
                    }
                }
                AttributeMapping::Simple { .. } | AttributeMapping::Derived { .. } => {
                    if descriptor.is_complex() || descriptor.is_plural() {
                        return Err(ScimError::Configuration(format!(
                            "attribute '{}' needs a complex or plural mapping",
                            name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// The mapping of a SCIM attribute, case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&AttributeMapping> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// All LDAP attributes a search for this resource requests.
    pub fn requested_ldap_attributes(&self) -> Vec<String> {
        let mut attrs: Vec<String> = vec![
            self.id_attribute.clone(),
            self.created_attribute.clone(),
            self.modified_attribute.clone(),
        ];
        for mapping in self.attributes.values() {
            for attr in mapping.ldap_attributes() {
                if !attrs.iter().any(|a| a.eq_ignore_ascii_case(attr)) {
                    attrs.push(attr.to_string());
                }
            }
        }
        attrs
    }

    /// Substitute `{id}` and `{attributeName}` slots in the DN template.
    pub fn dn_for(&self, id: &str, lookup: impl Fn(&str) -> Option<String>) -> ScimResult<String> {
        let mut out = String::new();
        let mut rest = self.dn_template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                ScimError::Configuration(format!("unbalanced slot in dnTemplate '{}'", self.dn_template))
            })?;
            let slot = &after[..close];
            if slot == "id" {
                out.push_str(id);
            } else {
                let value = lookup(slot).ok_or_else(|| {
                    ScimError::SchemaViolation(format!(
                        "dnTemplate slot '{}' has no value in the resource",
                        slot
                    ))
                })?;
                out.push_str(&value);
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const USER_MAPPING: &str = r#"
resource: User
baseDn: ou=people,dc=example,dc=com
dnTemplate: "uid={userName},ou=people,dc=example,dc=com"
idAttribute: entryUUID
objectClasses: [top, inetOrgPerson]
searchFilter: "(objectClass=inetOrgPerson)"
attributes:
  userName: { kind: simple, ldapAttribute: uid }
  externalId: { kind: simple, ldapAttribute: employeeNumber }
  active: { kind: simple, ldapAttribute: loginEnabled, transform: boolean }
  name:
    kind: complex
    subAttributes:
      formatted: cn
      familyName: sn
      givenName: givenName
  emails:
    kind: plural
    types:
      work: mail
      home: homeEmail
    primaryType: work
  displayName: { kind: derived, ldapAttribute: cn }
  password: { kind: simple, ldapAttribute: userPassword }
"#;

    #[test]
    fn test_load_and_validate() {
        let mapping = ResourceMapping::load_from_str(USER_MAPPING).unwrap();
        assert_eq!(mapping.resource, "User");
        assert_eq!(mapping.id_attribute, "entryUUID");
        assert_eq!(mapping.created_attribute, "createTimestamp");
        let registry = SchemaRegistry::core();
        mapping.validate(&registry).unwrap();
    }

    #[test]
    fn test_attribute_lookup_and_kinds() {
        let mapping = ResourceMapping::load_from_str(USER_MAPPING).unwrap();
        assert!(matches!(
            mapping.attribute("USERNAME"),
            Some(AttributeMapping::Simple { .. })
        ));
        assert_eq!(
            mapping.attribute("active").unwrap().transform(),
            ValueTransform::Boolean
        );
        let emails = mapping.attribute("emails").unwrap();
        let mut attrs = emails.ldap_attributes();
        attrs.sort_unstable();
        assert_eq!(attrs, vec!["homeEmail", "mail"]);
    }

    #[test]
    fn test_requested_attributes_include_operational() {
        let mapping = ResourceMapping::load_from_str(USER_MAPPING).unwrap();
        let attrs = mapping.requested_ldap_attributes();
        for expected in ["entryUUID", "createTimestamp", "modifyTimestamp", "uid", "mail"] {
            assert!(attrs.iter().any(|a| a == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_dn_template_substitution() {
        let mapping = ResourceMapping::load_from_str(USER_MAPPING).unwrap();
        let dn = mapping
            .dn_for("ignored", |slot| {
                (slot == "userName").then(|| "jdoe".to_string())
            })
            .unwrap();
        assert_eq!(dn, "uid=jdoe,ou=people,dc=example,dc=com");

        let err = mapping.dn_for("x", |_| None).unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_attribute() {
        let broken = USER_MAPPING.replace("userName:", "loginName:");
        let mapping = ResourceMapping::load_from_str(&broken).unwrap();
        assert!(mapping.validate(&SchemaRegistry::core()).is_err());
    }

    #[test]
    fn test_validate_rejects_non_canonical_type() {
        let broken = USER_MAPPING.replace("home: homeEmail", "secondary: homeEmail");
        let mapping = ResourceMapping::load_from_str(&broken).unwrap();
        assert!(mapping.validate(&SchemaRegistry::core()).is_err());
    }
}
