//! Content negotiation, attribute selection and Response envelope
//! rendering for the resource server.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use std::sync::Arc;

use crate::error::{ScimError, ScimResult};
use crate::marshal::{marshaller_for, ErrorEntry, ListEnvelope, WireFormat};
use crate::model::{ScimAttribute, ScimObject};
use crate::schema::SchemaRegistry;
use crate::uri::MediaSuffix;

/// Pick the response representation: a media suffix on the URI wins;
/// otherwise the first acceptable type from `Accept`, JSON preferred when
/// both are acceptable; JSON when no preference is stated.
pub fn negotiate(suffix: MediaSuffix, accept: Option<&str>) -> ScimResult<WireFormat> {
    match suffix {
        MediaSuffix::Json => return Ok(WireFormat::Json),
        MediaSuffix::Xml => return Ok(WireFormat::Xml),
        MediaSuffix::None => {}
    }
    let Some(accept) = accept else {
        return Ok(WireFormat::Json);
    };
    let mut json_acceptable = false;
    let mut xml_acceptable = false;
    for part in accept.split(',') {
        let essence = part.split(';').next().unwrap_or("").trim();
        match essence.to_lowercase().as_str() {
            "*/*" | "application/*" => {
                json_acceptable = true;
                xml_acceptable = true;
            }
            "application/json" => json_acceptable = true,
            "application/xml" | "text/xml" => xml_acceptable = true,
            _ => {}
        }
    }
    if json_acceptable {
        Ok(WireFormat::Json)
    } else if xml_acceptable {
        Ok(WireFormat::Xml)
    } else {
        Err(ScimError::InvalidUri(format!(
            "no supported media type in Accept: {}",
            accept
        )))
    }
}

/// Apply an `attributes=` selection: only the listed paths plus the
/// always-returned `id` and `meta` survive. An empty selection returns the
/// object unchanged.
pub fn select_attributes(object: &ScimObject, selection: &[String]) -> ScimObject {
    if selection.is_empty() {
        return object.clone();
    }
    let mut selected = ScimObject::new(object.resource_name());
    for attribute in object.attributes() {
        let name = attribute.name();
        if name.eq_ignore_ascii_case("id") || name.eq_ignore_ascii_case("meta") {
            selected.add_attribute(attribute.clone());
            continue;
        }
        let paths: Vec<Option<&str>> = selection
            .iter()
            .filter_map(|path| {
                let (head, sub) = match path.split_once('.') {
                    Some((head, sub)) => (head, Some(sub)),
                    None => (path.as_str(), None),
                };
                head.eq_ignore_ascii_case(name).then_some(sub)
            })
            .collect();
        if paths.is_empty() {
            continue;
        }
        // A bare path, a plural, or a simple attribute keeps the whole
        // attribute; sub-paths into a complex value narrow it.
        let whole = paths.iter().any(|sub| sub.is_none())
            || attribute.descriptor().is_plural()
            || !attribute.descriptor().is_complex();
        if whole {
            selected.add_attribute(attribute.clone());
            continue;
        }
        let subs: Vec<ScimAttribute> = attribute
            .value()
            .as_complex()
            .map(|all| {
                all.iter()
                    .filter(|sub| {
                        paths
                            .iter()
                            .any(|p| p.is_some_and(|s| s.eq_ignore_ascii_case(sub.name())))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if subs.is_empty() {
            continue;
        }
        if let Ok(value) = ScimAttribute::complex_value(attribute.descriptor(), subs) {
            if let Ok(narrowed) = ScimAttribute::singular(attribute.descriptor(), value) {
                selected.add_attribute(narrowed);
            }
        }
    }
    for (uri, body) in object.extra_schemas() {
        selected.add_extra_schema(uri, body.clone());
    }
    selected
}

/// `password` is write-only: it never appears in a response body.
pub fn strip_password(object: &mut ScimObject) {
    let schemas: Vec<String> = object.schemas().iter().map(|s| s.to_string()).collect();
    for schema in schemas {
        object.remove_attribute(&schema, "password");
    }
}

pub fn render_object(
    format: WireFormat,
    registry: &Arc<SchemaRegistry>,
    object: &ScimObject,
    status: StatusCode,
    location: Option<&str>,
) -> Response {
    let marshaller = marshaller_for(format, registry.clone());
    match marshaller.marshal(object) {
        Ok(body) => {
            let mut response = wire_response(status, format, body);
            if let Some(location) = location {
                if let Ok(value) = HeaderValue::from_str(location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
            }
            response
        }
        Err(err) => render_error(format, registry, &err),
    }
}

pub fn render_list(
    format: WireFormat,
    registry: &Arc<SchemaRegistry>,
    list: &ListEnvelope,
) -> Response {
    let marshaller = marshaller_for(format, registry.clone());
    match marshaller.marshal_list(list) {
        Ok(body) => wire_response(StatusCode::OK, format, body),
        Err(err) => render_error(format, registry, &err),
    }
}

pub fn render_no_content(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(axum::body::Body::empty())
        .unwrap_or_default()
}

/// Render a [`ScimError`] as an Errors envelope in the negotiated format.
pub fn render_error(
    format: WireFormat,
    registry: &Arc<SchemaRegistry>,
    error: &ScimError,
) -> Response {
    let status = error.status();
    let entry = ErrorEntry {
        code: status.as_u16().to_string(),
        description: error.public_description(),
        uri: None,
    };
    let marshaller = marshaller_for(format, registry.clone());
    let body = marshaller
        .marshal_errors(&[entry])
        .unwrap_or_else(|_| b"{\"Errors\":[]}".to_vec());
    let mut response = wire_response(status, format, body);
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"SCIM\""),
        );
    }
    response
}

fn wire_response(status: StatusCode, format: WireFormat, body: Vec<u8>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, format.media_type())
        .body(axum::body::Body::from(body))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{JsonUnmarshaller, Unmarshaller};

    #[test]
    fn test_negotiate() {
        assert_eq!(
            negotiate(MediaSuffix::Xml, Some("application/json")).unwrap(),
            WireFormat::Xml
        );
        assert_eq!(negotiate(MediaSuffix::None, None).unwrap(), WireFormat::Json);
        assert_eq!(
            negotiate(MediaSuffix::None, Some("application/xml")).unwrap(),
            WireFormat::Xml
        );
        assert_eq!(
            negotiate(MediaSuffix::None, Some("application/xml, application/json")).unwrap(),
            WireFormat::Json
        );
        assert_eq!(
            negotiate(MediaSuffix::None, Some("*/*")).unwrap(),
            WireFormat::Json
        );
        assert!(negotiate(MediaSuffix::None, Some("text/plain")).is_err());
    }

    #[test]
    fn test_select_attributes() {
        let registry = Arc::new(SchemaRegistry::core());
        let unmarshaller = JsonUnmarshaller::new(registry);
        let body = serde_json::json!({
            "id": "42",
            "userName": "jdoe",
            "displayName": "Jane",
            "name": { "formatted": "Jane Doe", "familyName": "Doe" },
            "meta": { "created": "2011-08-01T18:29:49Z" }
        });
        let object = unmarshaller
            .unmarshal(&serde_json::to_vec(&body).unwrap(), "User")
            .unwrap();

        let selected = select_attributes(
            &object,
            &["userName".to_string(), "name.familyName".to_string()],
        );
        assert!(selected.find_attribute("userName").is_some());
        assert!(selected.find_attribute("displayName").is_none());
        // always returned
        assert!(selected.find_attribute("id").is_some());
        assert!(selected.find_attribute("meta").is_some());
        // narrowed complex
        assert!(selected.simple_value("name.familyName").is_some());
        assert!(selected.simple_value("name.formatted").is_none());

        // empty selection returns everything
        let all = select_attributes(&object, &[]);
        assert!(all.find_attribute("displayName").is_some());
    }

    #[test]
    fn test_strip_password() {
        let registry = Arc::new(SchemaRegistry::core());
        let unmarshaller = JsonUnmarshaller::new(registry);
        let body = serde_json::json!({ "userName": "jdoe", "password": "s3cret" });
        let mut object = unmarshaller
            .unmarshal(&serde_json::to_vec(&body).unwrap(), "User")
            .unwrap();
        strip_password(&mut object);
        assert!(object.find_attribute("password").is_none());
        assert!(object.find_attribute("userName").is_some());
    }
}
