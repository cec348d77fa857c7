//! Bidirectional conversion between SCIM objects and LDAP entries, driven
//! by a [`ResourceMapping`].

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use ldap3::{Mod, SearchEntry};

use crate::error::{ScimError, ScimResult};
use crate::model::{ScimAttribute, ScimObject, ScimValue};
use crate::schema::{AttributeDescriptor, DataType, ResourceDescriptor, SchemaRegistry};

use super::mapping::{AttributeMapping, ResourceMapping, ValueTransform};

/// Render a datetime as LDAP generalized time (`YYYYMMDDHHMMSSZ`).
pub fn to_generalized_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%SZ").to_string()
}

/// Parse LDAP generalized time, tolerating a fractional-seconds part.
pub fn from_generalized_time(raw: &str) -> ScimResult<DateTime<Utc>> {
    let trimmed = match raw.find('.') {
        Some(dot) if raw.ends_with('Z') => format!("{}Z", &raw[..dot]),
        _ => raw.to_string(),
    };
    NaiveDateTime::parse_from_str(&trimmed, "%Y%m%d%H%M%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|_| ScimError::Backend(format!("not a generalized time: {}", raw)))
}

/// The attribute values of an entry to be written to the directory.
#[derive(Debug, Default, PartialEq)]
pub struct EntryAttributes {
    pub values: Vec<(String, Vec<Vec<u8>>)>,
}

impl EntryAttributes {
    fn push(&mut self, attr: &str, value: Vec<u8>) {
        match self.values.iter_mut().find(|(a, _)| a == attr) {
            Some((_, values)) => values.push(value),
            None => self.values.push((attr.to_string(), vec![value])),
        }
    }

    pub fn get(&self, attr: &str) -> Option<&[Vec<u8>]> {
        self.values
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v.as_slice())
    }
}

/// Maps one resource between its SCIM and LDAP representations.
#[derive(Debug, Clone)]
pub struct LdapMapper {
    mapping: ResourceMapping,
    resource: ResourceDescriptor,
}

impl LdapMapper {
    pub fn new(mapping: ResourceMapping, registry: &SchemaRegistry) -> ScimResult<Self> {
        mapping.validate(registry)?;
        let resource = registry
            .resource_by_name(&mapping.resource)
            .ok_or_else(|| {
                ScimError::Configuration(format!("unknown resource '{}'", mapping.resource))
            })?
            .clone();
        Ok(LdapMapper { mapping, resource })
    }

    pub fn mapping(&self) -> &ResourceMapping {
        &self.mapping
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    /// The DN of a new entry, substituting `{id}` and attribute slots from
    /// the resource body.
    pub fn dn_for_create(&self, object: &ScimObject, id: &str) -> ScimResult<String> {
        self.mapping.dn_for(id, |slot| {
            object
                .simple_value(slot)
                .and_then(|v| v.render_str().ok())
        })
    }

    /// The directory attributes written on create: object classes, the id
    /// attribute, and every mapped mutable attribute present in the body.
    pub fn entry_for_create(&self, object: &ScimObject, id: &str) -> ScimResult<EntryAttributes> {
        let mut entry = EntryAttributes::default();
        for class in &self.mapping.object_classes {
            entry.push("objectClass", class.clone().into_bytes());
        }
        entry.push(&self.mapping.id_attribute, id.as_bytes().to_vec());
        for (name, attribute_mapping) in &self.mapping.attributes {
            if let Some(attribute) = object.find_attribute(name) {
                self.append_attribute(&mut entry, attribute, attribute_mapping)?;
            }
        }
        Ok(entry)
    }

    /// The modifications of a full replace: every mapped mutable attribute
    /// present in the body is replaced, every absent one deleted.
    pub fn modifications(&self, object: &ScimObject) -> ScimResult<Vec<Mod<Vec<u8>>>> {
        let mut mods = Vec::new();
        for (name, attribute_mapping) in &self.mapping.attributes {
            if matches!(attribute_mapping, AttributeMapping::Derived { .. }) {
                continue;
            }
            if let Some(descriptor) = self.resource.attribute(name) {
                if descriptor.is_read_only() {
                    continue;
                }
            }
            match object.find_attribute(name) {
                Some(attribute) => {
                    let mut entry = EntryAttributes::default();
                    self.append_attribute(&mut entry, attribute, attribute_mapping)?;
                    for (attr, values) in entry.values {
                        mods.push(Mod::Replace(
                            attr.into_bytes(),
                            values.into_iter().collect(),
                        ));
                    }
                    // A plural body may leave some mapped types empty.
                    if let AttributeMapping::Plural { types, .. } = attribute_mapping {
                        for ldap_attr in types.values() {
                            let written = mods.iter().any(|m| {
                                matches!(m, Mod::Replace(a, _) if a.as_slice() == ldap_attr.as_bytes())
                            });
                            if !written {
                                mods.push(Mod::Delete(
                                    ldap_attr.clone().into_bytes(),
                                    Default::default(),
                                ));
                            }
                        }
                    }
                }
                None => {
                    for attr in attribute_mapping.ldap_attributes() {
                        mods.push(Mod::Delete(
                            attr.as_bytes().to_vec(),
                            Default::default(),
                        ));
                    }
                }
            }
        }
        Ok(mods)
    }

    fn append_attribute(
        &self,
        entry: &mut EntryAttributes,
        attribute: &ScimAttribute,
        attribute_mapping: &AttributeMapping,
    ) -> ScimResult<()> {
        match attribute_mapping {
            AttributeMapping::Derived { .. } => Ok(()),
            AttributeMapping::Simple { ldap_attribute, transform } => {
                entry.push(ldap_attribute, render_value(attribute.value(), *transform)?);
                Ok(())
            }
            AttributeMapping::Complex { sub_attributes } => {
                for (sub_name, ldap_attribute) in sub_attributes {
                    if let Some(sub) = attribute.value().sub_attribute(sub_name) {
                        entry.push(
                            ldap_attribute,
                            render_value(sub.value(), ValueTransform::String)?,
                        );
                    }
                }
                Ok(())
            }
            AttributeMapping::Plural { types, primary_type } => {
                for element in attribute.values() {
                    let element_type = element
                        .sub_attribute("type")
                        .and_then(|t| t.value().as_string().ok())
                        .map(|s| s.to_string())
                        .or_else(|| primary_type.clone())
                        .ok_or_else(|| {
                            ScimError::SchemaViolation(format!(
                                "element of '{}' has no type and no default is configured",
                                attribute.name()
                            ))
                        })?;
                    let ldap_attribute = types
                        .iter()
                        .find(|(name, _)| name.eq_ignore_ascii_case(&element_type))
                        .map(|(_, attr)| attr)
                        .ok_or_else(|| {
                            ScimError::SchemaViolation(format!(
                                "no LDAP mapping for '{}' type '{}'",
                                attribute.name(),
                                element_type
                            ))
                        })?;
                    if let Some(value) = element.sub_attribute("value") {
                        entry.push(
                            ldap_attribute,
                            render_value(value.value(), ValueTransform::String)?,
                        );
                    }
                }
                Ok(())
            }
        }
    }

    /// Materialize a SCIM object from a directory entry.
    pub fn from_entry(&self, entry: &SearchEntry) -> ScimResult<ScimObject> {
        let mut object = ScimObject::new(self.resource.name());

        let id = first_text(entry, &self.mapping.id_attribute).ok_or_else(|| {
            ScimError::Backend(format!(
                "entry {} has no {} value",
                entry.dn, self.mapping.id_attribute
            ))
        })?;
        if let Some(descriptor) = self.resource.attribute("id") {
            object.add_attribute(ScimAttribute::singular(descriptor, ScimValue::Str(id))?);
        }

        for (name, attribute_mapping) in &self.mapping.attributes {
            let Some(descriptor) = self.resource.attribute(name) else {
                continue;
            };
            match attribute_mapping {
                AttributeMapping::Simple { ldap_attribute, transform } => {
                    if let Some(value) = read_value(entry, ldap_attribute, descriptor, *transform)? {
                        object.add_attribute(ScimAttribute::singular(descriptor, value)?);
                    }
                }
                AttributeMapping::Derived { ldap_attribute } => {
                    if let Some(value) =
                        read_value(entry, ldap_attribute, descriptor, ValueTransform::String)?
                    {
                        object.add_attribute(ScimAttribute::singular(descriptor, value)?);
                    }
                }
                AttributeMapping::Complex { sub_attributes } => {
                    let mut subs = Vec::new();
                    for (sub_name, ldap_attribute) in sub_attributes {
                        let Some(sub_descriptor) = descriptor.sub_attribute(sub_name) else {
                            continue;
                        };
                        if let Some(text) = first_text(entry, ldap_attribute) {
                            subs.push(ScimAttribute::simple(sub_descriptor, &text)?);
                        }
                    }
                    if !subs.is_empty() {
                        let value = ScimAttribute::complex_value(descriptor, subs)?;
                        object.add_attribute(ScimAttribute::singular(descriptor, value)?);
                    }
                }
                AttributeMapping::Plural { types, primary_type } => {
                    let mut elements = Vec::new();
                    for (type_name, ldap_attribute) in types {
                        let mut first_of_type = true;
                        for text in all_text(entry, ldap_attribute) {
                            elements.push(plural_element(
                                descriptor,
                                &text,
                                type_name,
                                first_of_type
                                    && primary_type
                                        .as_deref()
                                        .is_some_and(|p| p.eq_ignore_ascii_case(type_name)),
                            )?);
                            first_of_type = false;
                        }
                    }
                    if !elements.is_empty() {
                        object.add_attribute(ScimAttribute::plural(descriptor, elements)?);
                    }
                }
            }
        }

        self.stamp_meta(&mut object, entry)?;
        Ok(object)
    }

    fn stamp_meta(&self, object: &mut ScimObject, entry: &SearchEntry) -> ScimResult<()> {
        let Some(meta_descriptor) = self.resource.attribute("meta") else {
            return Ok(());
        };
        let mut subs = Vec::new();
        if let Some(raw) = first_text(entry, &self.mapping.created_attribute) {
            if let Some(descriptor) = meta_descriptor.sub_attribute("created") {
                subs.push(ScimAttribute::singular(
                    descriptor,
                    ScimValue::DateTime(from_generalized_time(&raw)?),
                )?);
            }
        }
        if let Some(raw) = first_text(entry, &self.mapping.modified_attribute) {
            if let Some(descriptor) = meta_descriptor.sub_attribute("lastModified") {
                subs.push(ScimAttribute::singular(
                    descriptor,
                    ScimValue::DateTime(from_generalized_time(&raw)?),
                )?);
            }
        }
        if !subs.is_empty() {
            let value = ScimAttribute::complex_value(meta_descriptor, subs)?;
            object.add_attribute(ScimAttribute::singular(meta_descriptor, value)?);
        }
        Ok(())
    }
}

fn plural_element(
    descriptor: &AttributeDescriptor,
    value_text: &str,
    type_name: &str,
    primary: bool,
) -> ScimResult<ScimValue> {
    let value_descriptor = descriptor.sub_attribute("value").ok_or_else(|| {
        ScimError::SchemaViolation(format!(
            "plural attribute '{}' has no value sub-attribute",
            descriptor.name()
        ))
    })?;
    let type_descriptor = descriptor.sub_attribute("type").ok_or_else(|| {
        ScimError::SchemaViolation(format!(
            "plural attribute '{}' has no type sub-attribute",
            descriptor.name()
        ))
    })?;
    let mut subs = vec![
        ScimAttribute::simple(value_descriptor, value_text)?,
        ScimAttribute::singular(type_descriptor, ScimValue::Str(type_name.to_string()))?,
    ];
    if primary {
        if let Some(primary_descriptor) = descriptor.sub_attribute("primary") {
            subs.push(ScimAttribute::singular(primary_descriptor, ScimValue::Bool(true))?);
        }
    }
    ScimAttribute::complex_value(descriptor, subs)
}

fn render_value(value: &ScimValue, transform: ValueTransform) -> ScimResult<Vec<u8>> {
    Ok(match (value, transform) {
        (ScimValue::Bool(b), ValueTransform::Boolean) => {
            if *b { b"TRUE".to_vec() } else { b"FALSE".to_vec() }
        }
        (ScimValue::DateTime(dt), ValueTransform::Datetime) => {
            to_generalized_time(dt).into_bytes()
        }
        (ScimValue::Binary(bytes), ValueTransform::Binary) => bytes.clone(),
        (other, _) => other.render_str()?.into_bytes(),
    })
}

fn read_value(
    entry: &SearchEntry,
    ldap_attribute: &str,
    descriptor: &AttributeDescriptor,
    transform: ValueTransform,
) -> ScimResult<Option<ScimValue>> {
    if transform == ValueTransform::Binary || descriptor.data_type() == DataType::Binary {
        return Ok(first_binary(entry, ldap_attribute).map(ScimValue::Binary));
    }
    let Some(text) = first_text(entry, ldap_attribute) else {
        return Ok(None);
    };
    let value = match transform {
        ValueTransform::Boolean => ScimValue::Bool(text.eq_ignore_ascii_case("true")),
        ValueTransform::Datetime => ScimValue::DateTime(from_generalized_time(&text)?),
        ValueTransform::Integer => ScimValue::Int(text.parse::<i64>().map_err(|_| {
            ScimError::Backend(format!("{} is not an integer: {}", ldap_attribute, text))
        })?),
        ValueTransform::String | ValueTransform::Binary => {
            ScimValue::parse_str(descriptor.data_type(), &text)?
        }
    };
    Ok(Some(value))
}

fn first_text(entry: &SearchEntry, attr: &str) -> Option<String> {
    lookup(&entry.attrs, attr).and_then(|values| values.first().cloned())
}

fn all_text(entry: &SearchEntry, attr: &str) -> Vec<String> {
    lookup(&entry.attrs, attr).cloned().unwrap_or_default()
}

fn first_binary(entry: &SearchEntry, attr: &str) -> Option<Vec<u8>> {
    lookup(&entry.bin_attrs, attr)
        .and_then(|values| values.first().cloned())
        .or_else(|| first_text(entry, attr).map(String::into_bytes))
}

fn lookup<'a, V>(attrs: &'a HashMap<String, V>, name: &str) -> Option<&'a V> {
    attrs
        .get(name)
        .or_else(|| attrs.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
}
