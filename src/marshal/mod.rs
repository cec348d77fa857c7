//! Marshalling between [`ScimObject`] graphs and their JSON and XML wire
//! representations, guided by the schema registry.

pub mod json;
pub mod xml;

use std::sync::Arc;

use crate::error::ScimResult;
use crate::model::ScimObject;
use crate::schema::SchemaRegistry;

pub use json::{JsonMarshaller, JsonUnmarshaller};
pub use xml::{XmlMarshaller, XmlUnmarshaller};

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_XML: &str = "application/xml";

/// The two SCIM 1.0 wire representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Xml,
}

impl WireFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            WireFormat::Json => MEDIA_TYPE_JSON,
            WireFormat::Xml => MEDIA_TYPE_XML,
        }
    }

    /// Match a media type, ignoring parameters such as `charset`.
    pub fn from_media_type(media_type: &str) -> Option<WireFormat> {
        let essence = media_type.split(';').next().unwrap_or("").trim();
        if essence.eq_ignore_ascii_case(MEDIA_TYPE_JSON) {
            Some(WireFormat::Json)
        } else if essence.eq_ignore_ascii_case(MEDIA_TYPE_XML) || essence.eq_ignore_ascii_case("text/xml")
        {
            Some(WireFormat::Xml)
        } else {
            None
        }
    }
}

/// A list Response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEnvelope {
    pub total_results: i64,
    pub start_index: i64,
    pub items_per_page: i64,
    pub resources: Vec<ScimObject>,
}

/// A single entry of an Errors envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub code: String,
    pub description: String,
    pub uri: Option<String>,
}

/// Writes SCIM objects and Response envelopes to a wire representation.
pub trait Marshaller: Send + Sync {
    fn marshal(&self, object: &ScimObject) -> ScimResult<Vec<u8>>;
    fn marshal_list(&self, list: &ListEnvelope) -> ScimResult<Vec<u8>>;
    fn marshal_errors(&self, errors: &[ErrorEntry]) -> ScimResult<Vec<u8>>;
}

/// Reads SCIM objects and Response envelopes from a wire representation.
pub trait Unmarshaller: Send + Sync {
    /// Read a single resource of the named type.
    fn unmarshal(&self, data: &[u8], resource_name: &str) -> ScimResult<ScimObject>;
    /// Read a list Response envelope whose entries are the named type.
    fn unmarshal_list(&self, data: &[u8], resource_name: &str) -> ScimResult<ListEnvelope>;
    /// Read an Errors envelope.
    fn unmarshal_errors(&self, data: &[u8]) -> ScimResult<Vec<ErrorEntry>>;
}

pub fn marshaller_for(format: WireFormat, registry: Arc<SchemaRegistry>) -> Box<dyn Marshaller> {
    match format {
        WireFormat::Json => Box::new(JsonMarshaller::new(registry)),
        WireFormat::Xml => Box::new(XmlMarshaller::new(registry)),
    }
}

pub fn unmarshaller_for(
    format: WireFormat,
    registry: Arc<SchemaRegistry>,
) -> Box<dyn Unmarshaller> {
    match format {
        WireFormat::Json => Box::new(JsonUnmarshaller::new(registry)),
        WireFormat::Xml => Box::new(XmlUnmarshaller::new(registry)),
    }
}

/// Schema URIs of an object in marshalling order: the resource's primary
/// schema first, the rest in lexical order.
pub(crate) fn ordered_schemas<'a>(object: &'a ScimObject, primary: &str) -> Vec<&'a str> {
    let mut uris = object.schemas();
    uris.sort_unstable();
    if let Some(pos) = uris.iter().position(|u| *u == primary) {
        let p = uris.remove(pos);
        uris.insert(0, p);
    }
    uris
}
