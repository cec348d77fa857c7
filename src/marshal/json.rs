//! SCIM 1.0 JSON representation.
//!
//! Top-level keys are the attributes of the resource's primary schema;
//! attributes of another registered schema are nested under a key equal to
//! that schema's URI. A `schemas` array names every schema present.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::{ScimError, ScimResult};
use crate::model::{ScimAttribute, ScimObject, ScimValue};
use crate::schema::{AttributeDescriptor, DataType, SchemaRegistry};

use super::{ordered_schemas, ErrorEntry, ListEnvelope, Marshaller, Unmarshaller};

pub struct JsonMarshaller {
    registry: Arc<SchemaRegistry>,
}

impl JsonMarshaller {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        JsonMarshaller { registry }
    }

    pub fn object_to_json(&self, object: &ScimObject) -> ScimResult<Value> {
        let resource = self
            .registry
            .resource_by_name(object.resource_name())
            .ok_or_else(|| {
                ScimError::InvalidResource(format!(
                    "no resource descriptor for '{}'",
                    object.resource_name()
                ))
            })?;
        let primary = resource.schema();

        let mut map = Map::new();
        let schemas = ordered_schemas(object, primary);
        map.insert(
            "schemas".to_string(),
            Value::Array(schemas.iter().map(|s| Value::String(s.to_string())).collect()),
        );

        // Primary schema attributes at the top level, in registry order.
        for descriptor in resource.attributes() {
            if let Some(attribute) = object.attribute(primary, descriptor.name()) {
                map.insert(descriptor.name().to_string(), attribute_to_json(attribute)?);
            }
        }

        // Attributes of other registered schemas nest under their URI.
        for uri in &schemas {
            if *uri == primary {
                continue;
            }
            let Some(schema) = self.registry.schema(uri) else {
                continue;
            };
            let mut nested = Map::new();
            for descriptor in schema.attributes() {
                if let Some(attribute) = object.attribute(uri, descriptor.name()) {
                    nested.insert(descriptor.name().to_string(), attribute_to_json(attribute)?);
                }
            }
            if !nested.is_empty() {
                map.insert(uri.to_string(), Value::Object(nested));
            }
        }

        // Unknown schemas round-trip verbatim.
        for (uri, body) in object.extra_schemas() {
            map.insert(uri.clone(), body.clone());
        }

        Ok(Value::Object(map))
    }
}

impl Marshaller for JsonMarshaller {
    fn marshal(&self, object: &ScimObject) -> ScimResult<Vec<u8>> {
        let value = self.object_to_json(object)?;
        Ok(serde_json::to_vec(&value)?)
    }

    fn marshal_list(&self, list: &ListEnvelope) -> ScimResult<Vec<u8>> {
        let resources = list
            .resources
            .iter()
            .map(|r| self.object_to_json(r))
            .collect::<ScimResult<Vec<Value>>>()?;
        let value = json!({
            "totalResults": list.total_results,
            "startIndex": list.start_index,
            "itemsPerPage": list.items_per_page,
            "Resources": resources,
        });
        Ok(serde_json::to_vec(&value)?)
    }

    fn marshal_errors(&self, errors: &[ErrorEntry]) -> ScimResult<Vec<u8>> {
        let entries: Vec<Value> = errors
            .iter()
            .map(|e| {
                let mut entry = Map::new();
                entry.insert("description".to_string(), Value::String(e.description.clone()));
                entry.insert("code".to_string(), Value::String(e.code.clone()));
                if let Some(uri) = &e.uri {
                    entry.insert("uri".to_string(), Value::String(uri.clone()));
                }
                Value::Object(entry)
            })
            .collect();
        Ok(serde_json::to_vec(&json!({ "Errors": entries }))?)
    }
}

pub struct JsonUnmarshaller {
    registry: Arc<SchemaRegistry>,
}

impl JsonUnmarshaller {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        JsonUnmarshaller { registry }
    }

    pub fn object_from_json(&self, root: &Value, resource_name: &str) -> ScimResult<ScimObject> {
        let resource = self
            .registry
            .resource_by_name(resource_name)
            .ok_or_else(|| {
                ScimError::InvalidResource(format!("no resource descriptor for '{}'", resource_name))
            })?;
        let primary = resource.schema().to_string();

        let Value::Object(map) = root else {
            return Err(ScimError::InvalidResource(
                "expected a JSON object".to_string(),
            ));
        };

        let mut object = ScimObject::new(resource.name());
        for (key, value) in map {
            if key.eq_ignore_ascii_case("schemas") {
                continue;
            }
            if let Some(schema) = self.registry.schema(key) {
                // Attributes nested under a registered schema URI key; the
                // primary schema's attributes may also arrive this way.
                let Value::Object(nested) = value else {
                    return Err(ScimError::InvalidResource(format!(
                        "schema key '{}' must hold an object",
                        key
                    )));
                };
                for (name, sub_value) in nested {
                    if let Some(descriptor) = schema.attribute(name) {
                        object.add_attribute(build_attribute(descriptor, sub_value)?);
                    }
                }
                continue;
            }
            if key.contains(':') {
                // SCIM 1.0 style URI key for a schema we do not know:
                // preserve it for PUT round-trips.
                object.add_extra_schema(key, value.clone());
                continue;
            }
            let Some(schema) = self.registry.schema(&primary) else {
                continue;
            };
            match schema.attribute(key) {
                Some(descriptor) => object.add_attribute(build_attribute(descriptor, value)?),
                None => {} // unknown attributes are dropped
            }
        }
        Ok(object)
    }
}

impl Unmarshaller for JsonUnmarshaller {
    fn unmarshal(&self, data: &[u8], resource_name: &str) -> ScimResult<ScimObject> {
        let root: Value = serde_json::from_slice(data)?;
        self.object_from_json(&root, resource_name)
    }

    fn unmarshal_list(&self, data: &[u8], resource_name: &str) -> ScimResult<ListEnvelope> {
        let root: Value = serde_json::from_slice(data)?;
        let Value::Object(map) = &root else {
            return Err(ScimError::InvalidResource(
                "expected a JSON object".to_string(),
            ));
        };
        let total_results = map
            .get("totalResults")
            .and_then(Value::as_i64)
            .ok_or_else(|| ScimError::InvalidResource("missing totalResults".to_string()))?;
        let start_index = map.get("startIndex").and_then(Value::as_i64).unwrap_or(1);
        let resources = match map.get("Resources") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| self.object_from_json(entry, resource_name))
                .collect::<ScimResult<Vec<ScimObject>>>()?,
            _ => Vec::new(),
        };
        let items_per_page = map
            .get("itemsPerPage")
            .and_then(Value::as_i64)
            .unwrap_or(resources.len() as i64);
        Ok(ListEnvelope {
            total_results,
            start_index,
            items_per_page,
            resources,
        })
    }

    fn unmarshal_errors(&self, data: &[u8]) -> ScimResult<Vec<ErrorEntry>> {
        let root: Value = serde_json::from_slice(data)?;
        let entries = root
            .get("Errors")
            .and_then(Value::as_array)
            .ok_or_else(|| ScimError::InvalidResource("missing Errors list".to_string()))?;
        Ok(entries
            .iter()
            .map(|entry| ErrorEntry {
                code: entry
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                uri: entry
                    .get("uri")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
            })
            .collect())
    }
}

fn attribute_to_json(attribute: &ScimAttribute) -> ScimResult<Value> {
    let descriptor = attribute.descriptor();
    if descriptor.is_plural() {
        let elements = attribute
            .values()
            .iter()
            .map(complex_to_json)
            .collect::<ScimResult<Vec<Value>>>()?;
        return Ok(Value::Array(elements));
    }
    if descriptor.is_complex() {
        return complex_to_json(attribute.value());
    }
    simple_to_json(attribute.value())
}

fn complex_to_json(value: &ScimValue) -> ScimResult<Value> {
    let mut map = Map::new();
    for sub in value.as_complex()? {
        map.insert(sub.name().to_string(), simple_to_json(sub.value())?);
    }
    Ok(Value::Object(map))
}

fn simple_to_json(value: &ScimValue) -> ScimResult<Value> {
    Ok(match value {
        ScimValue::Str(s) => Value::String(s.clone()),
        ScimValue::Bool(b) => Value::Bool(*b),
        ScimValue::Int(i) => Value::Number((*i).into()),
        ScimValue::DateTime(_) | ScimValue::Binary(_) => Value::String(value.render_str()?),
        ScimValue::Complex(_) => {
            return Err(ScimError::SchemaViolation(
                "nested complex value".to_string(),
            ))
        }
    })
}

fn build_attribute(descriptor: &AttributeDescriptor, value: &Value) -> ScimResult<ScimAttribute> {
    if descriptor.is_plural() {
        let elements = match value {
            Value::Array(entries) => entries.iter().collect::<Vec<&Value>>(),
            single => vec![single],
        };
        let values = elements
            .into_iter()
            .map(|element| build_plural_element(descriptor, element))
            .collect::<ScimResult<Vec<ScimValue>>>()?;
        return ScimAttribute::plural(descriptor, values);
    }
    if descriptor.is_complex() {
        let complex = build_complex_value(descriptor, value)?;
        return ScimAttribute::singular(descriptor, complex);
    }
    let simple = json_to_simple(descriptor.data_type(), value, descriptor.name())?;
    ScimAttribute::singular(descriptor, simple)
}

fn build_plural_element(descriptor: &AttributeDescriptor, element: &Value) -> ScimResult<ScimValue> {
    match element {
        Value::Object(_) => build_complex_value(descriptor, element),
        // A bare primitive is shorthand for { "value": ... }.
        primitive => {
            let value_descriptor = descriptor.sub_attribute("value").ok_or_else(|| {
                ScimError::SchemaViolation(format!(
                    "plural attribute '{}' has no value sub-attribute",
                    descriptor.name()
                ))
            })?;
            let simple = json_to_simple(value_descriptor.data_type(), primitive, "value")?;
            ScimAttribute::complex_value(
                descriptor,
                vec![ScimAttribute::singular(value_descriptor, simple)?],
            )
        }
    }
}

fn build_complex_value(descriptor: &AttributeDescriptor, value: &Value) -> ScimResult<ScimValue> {
    let Value::Object(map) = value else {
        return Err(ScimError::SchemaViolation(format!(
            "attribute '{}' expects an object",
            descriptor.name()
        )));
    };
    let mut sub_attributes = Vec::new();
    for (name, sub_value) in map {
        let Some(sub_descriptor) = descriptor.sub_attribute(name) else {
            continue; // unknown sub-attributes are dropped
        };
        let simple = json_to_simple(sub_descriptor.data_type(), sub_value, name)?;
        sub_attributes.push(ScimAttribute::singular(sub_descriptor, simple)?);
    }
    ScimAttribute::complex_value(descriptor, sub_attributes)
}

fn json_to_simple(data_type: DataType, value: &Value, name: &str) -> ScimResult<ScimValue> {
    match (data_type, value) {
        (DataType::String, Value::String(s)) => Ok(ScimValue::Str(s.clone())),
        (DataType::Boolean, Value::Bool(b)) => Ok(ScimValue::Bool(*b)),
        (DataType::Integer, Value::Number(n)) => n.as_i64().map(ScimValue::Int).ok_or_else(|| {
            ScimError::SchemaViolation(format!("'{}' is not an integer", name))
        }),
        (DataType::DateTime, Value::String(s)) => ScimValue::parse_str(DataType::DateTime, s),
        (DataType::Binary, Value::String(s)) => ScimValue::parse_str(DataType::Binary, s),
        (expected, got) => Err(ScimError::SchemaViolation(format!(
            "'{}' expects a {:?} value, got {}",
            name, expected, got
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::core::SCHEMA_URI_CORE;

    fn codecs() -> (JsonMarshaller, JsonUnmarshaller) {
        let registry = Arc::new(SchemaRegistry::core());
        (
            JsonMarshaller::new(registry.clone()),
            JsonUnmarshaller::new(registry),
        )
    }

    fn sample_json() -> Value {
        json!({
            "schemas": [SCHEMA_URI_CORE],
            "id": "2819c223",
            "userName": "jdoe",
            "active": true,
            "name": { "formatted": "Jane Doe", "familyName": "Doe" },
            "emails": [
                { "value": "jdoe@example.com", "type": "work", "primary": true },
                { "value": "jane@example.org", "type": "home" }
            ],
            "meta": { "created": "2011-08-01T18:29:49Z", "lastModified": "2011-08-01T18:29:49Z" }
        })
    }

    #[test]
    fn test_unmarshal_reads_typed_values() {
        let (_, unmarshaller) = codecs();
        let data = serde_json::to_vec(&sample_json()).unwrap();
        let object = unmarshaller.unmarshal(&data, "User").unwrap();

        assert_eq!(object.id(), Some("2819c223"));
        assert!(object
            .find_attribute("active")
            .unwrap()
            .value()
            .as_boolean()
            .unwrap());
        assert_eq!(
            object.simple_value("name.familyName").unwrap().as_string().unwrap(),
            "Doe"
        );
        let emails = object.find_attribute("emails").unwrap();
        assert_eq!(emails.values().len(), 2);
        assert!(emails.primary_value().is_some());
        assert_eq!(
            object
                .simple_value("meta.created")
                .unwrap()
                .render_str()
                .unwrap(),
            "2011-08-01T18:29:49Z"
        );
    }

    #[test]
    fn test_round_trip() {
        let (marshaller, unmarshaller) = codecs();
        let data = serde_json::to_vec(&sample_json()).unwrap();
        let object = unmarshaller.unmarshal(&data, "User").unwrap();

        let emitted = marshaller.marshal(&object).unwrap();
        let reparsed = unmarshaller.unmarshal(&emitted, "User").unwrap();
        assert_eq!(object, reparsed);
    }

    #[test]
    fn test_unknown_attribute_dropped_unknown_schema_kept() {
        let (marshaller, unmarshaller) = codecs();
        let data = serde_json::to_vec(&json!({
            "schemas": [SCHEMA_URI_CORE, "urn:example:custom:1.0"],
            "userName": "jdoe",
            "favouriteColor": "teal",
            "urn:example:custom:1.0": { "department": "ops" }
        }))
        .unwrap();
        let object = unmarshaller.unmarshal(&data, "User").unwrap();
        assert!(object.find_attribute("favouriteColor").is_none());
        assert_eq!(object.extra_schemas().len(), 1);

        let emitted: Value =
            serde_json::from_slice(&marshaller.marshal(&object).unwrap()).unwrap();
        assert_eq!(
            emitted["urn:example:custom:1.0"]["department"],
            Value::String("ops".to_string())
        );
        assert_eq!(
            emitted["schemas"],
            json!([SCHEMA_URI_CORE, "urn:example:custom:1.0"])
        );
    }

    #[test]
    fn test_type_mismatch_is_schema_violation() {
        let (_, unmarshaller) = codecs();
        let data = serde_json::to_vec(&json!({ "active": "yes" })).unwrap();
        let err = unmarshaller.unmarshal(&data, "User").unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }

    #[test]
    fn test_malformed_body_is_invalid_resource() {
        let (_, unmarshaller) = codecs();
        assert!(matches!(
            unmarshaller.unmarshal(b"{not json", "User").unwrap_err(),
            ScimError::InvalidResource(_)
        ));
        assert!(matches!(
            unmarshaller.unmarshal(b"[1,2]", "User").unwrap_err(),
            ScimError::InvalidResource(_)
        ));
    }

    #[test]
    fn test_list_envelope_round_trip() {
        let (marshaller, unmarshaller) = codecs();
        let data = serde_json::to_vec(&sample_json()).unwrap();
        let object = unmarshaller.unmarshal(&data, "User").unwrap();
        let list = ListEnvelope {
            total_results: 5,
            start_index: 2,
            items_per_page: 1,
            resources: vec![object],
        };
        let emitted = marshaller.marshal_list(&list).unwrap();
        let reparsed = unmarshaller.unmarshal_list(&emitted, "User").unwrap();
        assert_eq!(list, reparsed);
    }

    #[test]
    fn test_errors_envelope() {
        let (marshaller, unmarshaller) = codecs();
        let errors = vec![ErrorEntry {
            code: "404".to_string(),
            description: "Resource 42 not found".to_string(),
            uri: None,
        }];
        let emitted = marshaller.marshal_errors(&errors).unwrap();
        let reparsed = unmarshaller.unmarshal_errors(&emitted).unwrap();
        assert_eq!(errors, reparsed);
    }
}
