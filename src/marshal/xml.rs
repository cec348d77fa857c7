//! SCIM 1.0 XML representation.
//!
//! The root element's local name is the resource name and its namespace is
//! the resource's primary schema URI. Attributes of another registered
//! schema carry their own namespace. Reading is namespace-aware,
//! whitespace-trimming and non-validating; unknown elements are dropped.

use std::sync::Arc;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};

use crate::error::{ScimError, ScimResult};
use crate::model::{ScimAttribute, ScimObject, ScimValue};
use crate::schema::core::SCHEMA_URI_CORE;
use crate::schema::{AttributeDescriptor, ResourceDescriptor, SchemaRegistry};

use super::{ordered_schemas, ErrorEntry, ListEnvelope, Marshaller, Unmarshaller};

/// A parsed element tree. The codec reads the whole document into this
/// before resolving it against the registry.
#[derive(Debug, Clone, Default)]
struct XmlElement {
    ns: Option<String>,
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

fn parse_dom(data: &[u8]) -> ScimResult<XmlElement> {
    let mut reader = NsReader::from_reader(data);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_resolved_event()? {
            (resolve, Event::Start(start)) => {
                stack.push(element_for(resolve, &start));
            }
            (resolve, Event::Empty(start)) => {
                let element = element_for(resolve, &start);
                attach(&mut stack, &mut root, element)?;
            }
            (_, Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            (_, Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| {
                    ScimError::InvalidResource("unbalanced end tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ScimError::InvalidResource(
            "unterminated document".to_string(),
        ));
    }
    root.ok_or_else(|| ScimError::InvalidResource("empty document".to_string()))
}

fn element_for(resolve: ResolveResult<'_>, start: &BytesStart<'_>) -> XmlElement {
    let ns = match resolve {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.into_inner()).into_owned())
        }
        _ => None,
    };
    XmlElement {
        ns,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        text: String::new(),
        children: Vec::new(),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> ScimResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(ScimError::InvalidResource(
                    "multiple document elements".to_string(),
                ));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

pub struct XmlUnmarshaller {
    registry: Arc<SchemaRegistry>,
}

impl XmlUnmarshaller {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        XmlUnmarshaller { registry }
    }

    fn build_object(
        &self,
        children: &[XmlElement],
        resource: &ResourceDescriptor,
        default_ns: &str,
    ) -> ScimResult<ScimObject> {
        let mut object = ScimObject::new(resource.name());
        for child in children {
            let ns = child.ns.as_deref().unwrap_or(default_ns);
            let Some(schema) = self.registry.schema(ns) else {
                continue;
            };
            let Some(descriptor) = schema.attribute(&child.name) else {
                continue;
            };
            object.add_attribute(build_attribute(descriptor, child)?);
        }
        Ok(object)
    }
}

impl Unmarshaller for XmlUnmarshaller {
    fn unmarshal(&self, data: &[u8], resource_name: &str) -> ScimResult<ScimObject> {
        let resource = self
            .registry
            .resource_by_name(resource_name)
            .ok_or_else(|| {
                ScimError::InvalidResource(format!("no resource descriptor for '{}'", resource_name))
            })?;
        let root = parse_dom(data)?;
        if !root.name.eq_ignore_ascii_case(resource.name()) {
            return Err(ScimError::InvalidResource(format!(
                "document element '{}' does not match resource '{}'",
                root.name,
                resource.name()
            )));
        }
        let default_ns = root.ns.clone().unwrap_or_else(|| resource.schema().to_string());
        self.build_object(&root.children, resource, &default_ns)
    }

    fn unmarshal_list(&self, data: &[u8], resource_name: &str) -> ScimResult<ListEnvelope> {
        let resource = self
            .registry
            .resource_by_name(resource_name)
            .ok_or_else(|| {
                ScimError::InvalidResource(format!("no resource descriptor for '{}'", resource_name))
            })?;
        let root = parse_dom(data)?;
        if !root.name.eq_ignore_ascii_case("Response") {
            return Err(ScimError::InvalidResource(format!(
                "expected a Response envelope, found '{}'",
                root.name
            )));
        }

        let total_results = int_child(&root, "totalResults")?.ok_or_else(|| {
            ScimError::InvalidResource("missing totalResults".to_string())
        })?;
        let start_index = int_child(&root, "startIndex")?.unwrap_or(1);

        let mut resources = Vec::new();
        if let Some(list) = root.child("Resources") {
            for entry in &list.children {
                let default_ns = entry
                    .ns
                    .clone()
                    .unwrap_or_else(|| resource.schema().to_string());
                resources.push(self.build_object(&entry.children, resource, &default_ns)?);
            }
        }
        let items_per_page =
            int_child(&root, "itemsPerPage")?.unwrap_or(resources.len() as i64);

        Ok(ListEnvelope {
            total_results,
            start_index,
            items_per_page,
            resources,
        })
    }

    fn unmarshal_errors(&self, data: &[u8]) -> ScimResult<Vec<ErrorEntry>> {
        let root = parse_dom(data)?;
        let errors = root
            .child("Errors")
            .ok_or_else(|| ScimError::InvalidResource("missing Errors list".to_string()))?;
        Ok(errors
            .children
            .iter()
            .map(|entry| ErrorEntry {
                code: entry.child("code").map(|c| c.text.clone()).unwrap_or_default(),
                description: entry
                    .child("description")
                    .map(|c| c.text.clone())
                    .unwrap_or_default(),
                uri: entry.child("uri").map(|c| c.text.clone()),
            })
            .collect())
    }
}

fn int_child(root: &XmlElement, name: &str) -> ScimResult<Option<i64>> {
    match root.child(name) {
        None => Ok(None),
        Some(child) => child.text.parse::<i64>().map(Some).map_err(|_| {
            ScimError::InvalidResource(format!("{} is not a number: {}", name, child.text))
        }),
    }
}

fn build_attribute(
    descriptor: &AttributeDescriptor,
    element: &XmlElement,
) -> ScimResult<ScimAttribute> {
    if descriptor.is_plural() {
        let values = element
            .children
            .iter()
            .map(|entry| build_complex_value(descriptor, entry))
            .collect::<ScimResult<Vec<ScimValue>>>()?;
        return ScimAttribute::plural(descriptor, values);
    }
    if descriptor.is_complex() {
        let value = build_complex_value(descriptor, element)?;
        return ScimAttribute::singular(descriptor, value);
    }
    ScimAttribute::simple(descriptor, &element.text)
}

fn build_complex_value(
    descriptor: &AttributeDescriptor,
    element: &XmlElement,
) -> ScimResult<ScimValue> {
    let mut sub_attributes = Vec::new();
    for child in &element.children {
        let Some(sub_descriptor) = descriptor.sub_attribute(&child.name) else {
            continue; // unknown sub-elements are dropped
        };
        sub_attributes.push(ScimAttribute::simple(sub_descriptor, &child.text)?);
    }
    ScimAttribute::complex_value(descriptor, sub_attributes)
}

pub struct XmlMarshaller {
    registry: Arc<SchemaRegistry>,
}

impl XmlMarshaller {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        XmlMarshaller { registry }
    }

    fn write_resource_body<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        object: &ScimObject,
        resource: &ResourceDescriptor,
    ) -> ScimResult<()> {
        let primary = resource.schema();
        for descriptor in resource.attributes() {
            if let Some(attribute) = object.attribute(primary, descriptor.name()) {
                write_attribute(writer, attribute, None)?;
            }
        }
        for uri in ordered_schemas(object, primary) {
            if uri == primary {
                continue;
            }
            let Some(schema) = self.registry.schema(uri) else {
                continue; // unknown schemas have no XML representation
            };
            for descriptor in schema.attributes() {
                if let Some(attribute) = object.attribute(uri, descriptor.name()) {
                    write_attribute(writer, attribute, Some(uri))?;
                }
            }
        }
        Ok(())
    }

    fn resource_for<'a>(&'a self, object: &ScimObject) -> ScimResult<&'a ResourceDescriptor> {
        self.registry
            .resource_by_name(object.resource_name())
            .ok_or_else(|| {
                ScimError::InvalidResource(format!(
                    "no resource descriptor for '{}'",
                    object.resource_name()
                ))
            })
    }
}

impl Marshaller for XmlMarshaller {
    fn marshal(&self, object: &ScimObject) -> ScimResult<Vec<u8>> {
        let resource = self.resource_for(object)?;
        let mut writer = Writer::new(Vec::new());

        let mut root = BytesStart::new(resource.name());
        root.push_attribute(("xmlns", resource.schema()));
        writer.write_event(Event::Start(root))?;
        self.write_resource_body(&mut writer, object, resource)?;
        writer.write_event(Event::End(BytesEnd::new(resource.name())))?;

        Ok(writer.into_inner())
    }

    fn marshal_list(&self, list: &ListEnvelope) -> ScimResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let mut root = BytesStart::new("Response");
        root.push_attribute(("xmlns", SCHEMA_URI_CORE));
        writer.write_event(Event::Start(root))?;

        write_text_element(&mut writer, "totalResults", &list.total_results.to_string())?;
        write_text_element(&mut writer, "itemsPerPage", &list.items_per_page.to_string())?;
        write_text_element(&mut writer, "startIndex", &list.start_index.to_string())?;

        writer.write_event(Event::Start(BytesStart::new("Resources")))?;
        for object in &list.resources {
            let resource = self.resource_for(object)?;
            let mut entry = BytesStart::new("Resource");
            if resource.schema() != SCHEMA_URI_CORE {
                entry.push_attribute(("xmlns", resource.schema()));
            }
            writer.write_event(Event::Start(entry))?;
            self.write_resource_body(&mut writer, object, resource)?;
            writer.write_event(Event::End(BytesEnd::new("Resource")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Resources")))?;

        writer.write_event(Event::End(BytesEnd::new("Response")))?;
        Ok(writer.into_inner())
    }

    fn marshal_errors(&self, errors: &[ErrorEntry]) -> ScimResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let mut root = BytesStart::new("Response");
        root.push_attribute(("xmlns", SCHEMA_URI_CORE));
        writer.write_event(Event::Start(root))?;
        writer.write_event(Event::Start(BytesStart::new("Errors")))?;
        for error in errors {
            writer.write_event(Event::Start(BytesStart::new("error")))?;
            write_text_element(&mut writer, "description", &error.description)?;
            write_text_element(&mut writer, "code", &error.code)?;
            if let Some(uri) = &error.uri {
                write_text_element(&mut writer, "uri", uri)?;
            }
            writer.write_event(Event::End(BytesEnd::new("error")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Errors")))?;
        writer.write_event(Event::End(BytesEnd::new("Response")))?;
        Ok(writer.into_inner())
    }
}

fn write_attribute<W: std::io::Write>(
    writer: &mut Writer<W>,
    attribute: &ScimAttribute,
    ns: Option<&str>,
) -> ScimResult<()> {
    let descriptor = attribute.descriptor();
    let name = descriptor.name();

    let mut start = BytesStart::new(name);
    if let Some(uri) = ns {
        start.push_attribute(("xmlns", uri));
    }

    if descriptor.is_plural() {
        writer.write_event(Event::Start(start))?;
        let element_name = element_name_for(name);
        for value in attribute.values() {
            writer.write_event(Event::Start(BytesStart::new(element_name)))?;
            write_complex_body(writer, value)?;
            writer.write_event(Event::End(BytesEnd::new(element_name)))?;
        }
        writer.write_event(Event::End(BytesEnd::new(name)))?;
        return Ok(());
    }

    if descriptor.is_complex() {
        writer.write_event(Event::Start(start))?;
        write_complex_body(writer, attribute.value())?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(&attribute.value().render_str()?)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_complex_body<W: std::io::Write>(
    writer: &mut Writer<W>,
    value: &ScimValue,
) -> ScimResult<()> {
    for sub in value.as_complex()? {
        write_text_element(writer, sub.name(), &sub.value().render_str()?)?;
    }
    Ok(())
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> ScimResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// The element name used for one entry of a plural attribute, e.g.
/// `emails` elements contain `email` entries.
fn element_name_for(plural_name: &str) -> &str {
    plural_name.strip_suffix('s').unwrap_or(plural_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::json::JsonUnmarshaller;

    fn codecs() -> (XmlMarshaller, XmlUnmarshaller) {
        let registry = Arc::new(SchemaRegistry::core());
        (
            XmlMarshaller::new(registry.clone()),
            XmlUnmarshaller::new(registry),
        )
    }

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<User xmlns="urn:scim:schemas:core:1.0">
  <id>2819c223</id>
  <userName>jdoe</userName>
  <active>true</active>
  <name>
    <formatted>Jane Doe</formatted>
    <familyName>Doe</familyName>
  </name>
  <emails>
    <email>
      <value>jdoe@example.com</value>
      <type>work</type>
      <primary>true</primary>
    </email>
    <email>
      <value>jane@example.org</value>
      <type>home</type>
    </email>
  </emails>
</User>"#;

    #[test]
    fn test_unmarshal_reads_typed_values() {
        let (_, unmarshaller) = codecs();
        let object = unmarshaller.unmarshal(SAMPLE.as_bytes(), "User").unwrap();
        assert_eq!(object.id(), Some("2819c223"));
        assert!(object
            .find_attribute("active")
            .unwrap()
            .value()
            .as_boolean()
            .unwrap());
        assert_eq!(
            object.simple_value("name.formatted").unwrap().as_string().unwrap(),
            "Jane Doe"
        );
        let emails = object.find_attribute("emails").unwrap();
        assert_eq!(emails.values().len(), 2);
        assert!(emails.primary_value().is_some());
    }

    #[test]
    fn test_root_element_must_match_resource() {
        let (_, unmarshaller) = codecs();
        let err = unmarshaller.unmarshal(SAMPLE.as_bytes(), "Group").unwrap_err();
        assert!(matches!(err, ScimError::InvalidResource(_)));
    }

    #[test]
    fn test_unknown_elements_dropped() {
        let (_, unmarshaller) = codecs();
        let data = r#"<User xmlns="urn:scim:schemas:core:1.0">
            <userName>jdoe</userName>
            <favouriteColor>teal</favouriteColor>
            <gadget xmlns="urn:example:unknown:1.0">x</gadget>
        </User>"#;
        let object = unmarshaller.unmarshal(data.as_bytes(), "User").unwrap();
        assert!(object.find_attribute("userName").is_some());
        assert!(object.find_attribute("favouriteColor").is_none());
        assert!(object.find_attribute("gadget").is_none());
    }

    #[test]
    fn test_round_trip() {
        let (marshaller, unmarshaller) = codecs();
        let object = unmarshaller.unmarshal(SAMPLE.as_bytes(), "User").unwrap();
        let emitted = marshaller.marshal(&object).unwrap();
        let reparsed = unmarshaller.unmarshal(&emitted, "User").unwrap();
        assert_eq!(object, reparsed);
    }

    #[test]
    fn test_escaping_round_trip() {
        let (marshaller, unmarshaller) = codecs();
        let data = r#"<User xmlns="urn:scim:schemas:core:1.0">
            <userName>a&lt;b&gt;&amp;"c"</userName>
        </User>"#;
        let object = unmarshaller.unmarshal(data.as_bytes(), "User").unwrap();
        assert_eq!(
            object.find_attribute("userName").unwrap().value().as_string().unwrap(),
            "a<b>&\"c\""
        );
        let emitted = marshaller.marshal(&object).unwrap();
        let reparsed = unmarshaller.unmarshal(&emitted, "User").unwrap();
        assert_eq!(object, reparsed);
    }

    #[test]
    fn test_malformed_document_rejected() {
        let (_, unmarshaller) = codecs();
        assert!(unmarshaller.unmarshal(b"<User>", "User").is_err());
        assert!(unmarshaller.unmarshal(b"", "User").is_err());
    }

    #[test]
    fn test_list_envelope_round_trip() {
        let (marshaller, unmarshaller) = codecs();
        let object = unmarshaller.unmarshal(SAMPLE.as_bytes(), "User").unwrap();
        let list = ListEnvelope {
            total_results: 7,
            start_index: 3,
            items_per_page: 1,
            resources: vec![object],
        };
        let emitted = marshaller.marshal_list(&list).unwrap();
        let reparsed = unmarshaller.unmarshal_list(&emitted, "User").unwrap();
        assert_eq!(list, reparsed);
    }

    #[test]
    fn test_errors_envelope_round_trip() {
        let (marshaller, unmarshaller) = codecs();
        let errors = vec![ErrorEntry {
            code: "409".to_string(),
            description: "userName already in use".to_string(),
            uri: None,
        }];
        let emitted = marshaller.marshal_errors(&errors).unwrap();
        let reparsed = unmarshaller.unmarshal_errors(&emitted).unwrap();
        assert_eq!(errors, reparsed);
    }

    #[test]
    fn test_cross_codec_equivalence() {
        let registry = Arc::new(SchemaRegistry::core());
        let xml_un = XmlUnmarshaller::new(registry.clone());
        let json_un = JsonUnmarshaller::new(registry);

        let from_xml = xml_un.unmarshal(SAMPLE.as_bytes(), "User").unwrap();
        let json_doc = serde_json::json!({
            "schemas": ["urn:scim:schemas:core:1.0"],
            "id": "2819c223",
            "userName": "jdoe",
            "active": true,
            "name": { "formatted": "Jane Doe", "familyName": "Doe" },
            "emails": [
                { "value": "jdoe@example.com", "type": "work", "primary": true },
                { "value": "jane@example.org", "type": "home" }
            ]
        });
        let from_json = json_un
            .unmarshal(&serde_json::to_vec(&json_doc).unwrap(), "User")
            .unwrap();
        assert_eq!(from_xml, from_json);
    }
}
