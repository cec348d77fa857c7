//! A SCIM 1.0 client over HTTP.
//!
//! The client shares the codec, URI model and schema registry with the
//! server. Representation flags and method-override flags are plain fields;
//! each operation captures them at the call site, so changing them between
//! requests is safe.

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ScimError, ScimResult};
use crate::marshal::{
    marshaller_for, unmarshaller_for, ListEnvelope, WireFormat, MEDIA_TYPE_JSON, MEDIA_TYPE_XML,
};
use crate::model::ScimObject;
use crate::schema::SchemaRegistry;
use crate::uri::{QueryParams, ScimUri};

const HEADER_METHOD_OVERRIDE: &str = "X-HTTP-Method-Override";

/// A client for one SCIM service endpoint.
#[derive(Clone)]
pub struct ScimClient {
    http: reqwest::Client,
    base_url: String,
    registry: Arc<SchemaRegistry>,
    credentials: Option<(String, String)>,
    /// Send request bodies as JSON; XML otherwise.
    pub send_json: bool,
    /// Accept JSON responses.
    pub accept_json: bool,
    /// Accept XML responses.
    pub accept_xml: bool,
    /// Tunnel PUT through POST with a method override.
    pub put_uses_method_override: bool,
    /// Tunnel DELETE through POST with a method override.
    pub delete_uses_method_override: bool,
}

impl ScimClient {
    /// A client for the service at `base_url` (e.g.
    /// `http://localhost:8080/v1`) with the default 30 second deadline.
    pub fn new(base_url: &str, registry: Arc<SchemaRegistry>) -> ScimResult<Self> {
        Self::with_timeout(base_url, registry, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: &str,
        registry: Arc<SchemaRegistry>,
        timeout: Duration,
    ) -> ScimResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScimError::ExchangeFailure(e.to_string()))?;
        Ok(ScimClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            registry,
            credentials: None,
            send_json: true,
            accept_json: true,
            accept_xml: true,
            put_uses_method_override: false,
            delete_uses_method_override: false,
        })
    }

    /// Use basic authentication for all subsequent requests.
    pub fn set_basic_auth(&mut self, user_id: &str, password: &str) {
        self.credentials = Some((user_id.to_string(), password.to_string()));
    }

    /// Retrieve one resource, optionally restricted to selected attributes.
    pub async fn get_resource(
        &self,
        endpoint: &str,
        resource_id: &str,
        attributes: Option<&[String]>,
    ) -> ScimResult<ScimObject> {
        let resource_name = self.resource_name(endpoint)?;
        let mut uri = ScimUri::for_resource(endpoint, resource_id);
        uri.query.attributes = attributes.map(|a| a.to_vec());

        let response = self
            .exchange(Method::GET, &uri, None, None)
            .await?;
        let (status, format, body) = Self::split(response).await?;
        if status != StatusCode::OK {
            return Err(self.error_from_response(status, format, &body));
        }
        unmarshaller_for(format, self.registry.clone()).unmarshal(&body, &resource_name)
    }

    /// Retrieve selected resources with filter, sort, pagination and
    /// attribute selection taken from `query`.
    pub async fn get_resources(
        &self,
        endpoint: &str,
        query: &QueryParams,
    ) -> ScimResult<ListEnvelope> {
        let resource_name = self.resource_name(endpoint)?;
        let mut uri = ScimUri::for_endpoint(endpoint);
        uri.query = query.clone();

        let response = self.exchange(Method::GET, &uri, None, None).await?;
        let (status, format, body) = Self::split(response).await?;
        if status != StatusCode::OK {
            return Err(self.error_from_response(status, format, &body));
        }
        unmarshaller_for(format, self.registry.clone()).unmarshal_list(&body, &resource_name)
    }

    /// Create a resource; returns the created resource with its
    /// server-assigned id and the Location the server reported.
    pub async fn post_resource(
        &self,
        endpoint: &str,
        resource: &ScimObject,
    ) -> ScimResult<(ScimObject, Option<String>)> {
        let resource_name = self.resource_name(endpoint)?;
        let send_format = self.send_format();
        let payload = marshaller_for(send_format, self.registry.clone()).marshal(resource)?;
        let uri = ScimUri::for_endpoint(endpoint);

        let response = self
            .exchange(Method::POST, &uri, Some((send_format, payload)), None)
            .await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string());
        let (status, format, body) = Self::split(response).await?;
        if status != StatusCode::CREATED {
            return Err(self.error_from_response(status, format, &body));
        }
        let created =
            unmarshaller_for(format, self.registry.clone()).unmarshal(&body, &resource_name)?;
        Ok((created, location))
    }

    /// Replace a resource. Honors `put_uses_method_override`.
    pub async fn put_resource(
        &self,
        endpoint: &str,
        resource_id: &str,
        resource: &ScimObject,
    ) -> ScimResult<ScimObject> {
        let resource_name = self.resource_name(endpoint)?;
        let use_override = self.put_uses_method_override;
        let send_format = self.send_format();
        let payload = marshaller_for(send_format, self.registry.clone()).marshal(resource)?;
        let uri = ScimUri::for_resource(endpoint, resource_id);

        let (method, override_header) = if use_override {
            (Method::POST, Some("PUT"))
        } else {
            (Method::PUT, None)
        };
        let response = self
            .exchange(method, &uri, Some((send_format, payload)), override_header)
            .await?;
        let (status, format, body) = Self::split(response).await?;
        if status != StatusCode::OK {
            return Err(self.error_from_response(status, format, &body));
        }
        unmarshaller_for(format, self.registry.clone()).unmarshal(&body, &resource_name)
    }

    /// Delete a resource. Honors `delete_uses_method_override`.
    pub async fn delete_resource(&self, endpoint: &str, resource_id: &str) -> ScimResult<()> {
        self.resource_name(endpoint)?;
        let use_override = self.delete_uses_method_override;
        let uri = ScimUri::for_resource(endpoint, resource_id);

        let (method, override_header) = if use_override {
            (Method::POST, Some("DELETE"))
        } else {
            (Method::DELETE, None)
        };
        let response = self.exchange(method, &uri, None, override_header).await?;
        let (status, format, body) = Self::split(response).await?;
        if status != StatusCode::OK {
            return Err(self.error_from_response(status, format, &body));
        }
        Ok(())
    }

    fn resource_name(&self, endpoint: &str) -> ScimResult<String> {
        self.registry
            .resource_by_endpoint(endpoint)
            .map(|r| r.name().to_string())
            .ok_or_else(|| ScimError::UnknownEndpoint(endpoint.to_string()))
    }

    fn send_format(&self) -> WireFormat {
        if self.send_json {
            WireFormat::Json
        } else {
            WireFormat::Xml
        }
    }

    fn accept_header(&self) -> Option<&'static str> {
        match (self.accept_json, self.accept_xml) {
            (true, true) => Some("application/json, application/xml"),
            (true, false) => Some(MEDIA_TYPE_JSON),
            (false, true) => Some(MEDIA_TYPE_XML),
            (false, false) => None,
        }
    }

    async fn exchange(
        &self,
        method: Method,
        uri: &ScimUri,
        payload: Option<(WireFormat, Vec<u8>)>,
        override_header: Option<&str>,
    ) -> ScimResult<reqwest::Response> {
        let url = uri.emit(&self.base_url);
        let mut request = self.http.request(method, &url);
        if let Some(accept) = self.accept_header() {
            request = request.header(ACCEPT, accept);
        }
        if let Some((format, body)) = payload {
            request = request
                .header(CONTENT_TYPE, format.media_type())
                .body(body);
        }
        if let Some(tunneled) = override_header {
            request = request.header(
                HEADER_METHOD_OVERRIDE,
                HeaderValue::from_str(tunneled)
                    .map_err(|e| ScimError::ExchangeFailure(e.to_string()))?,
            );
        }
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        request.send().await.map_err(classify_transport)
    }

    async fn split(response: reqwest::Response) -> ScimResult<(StatusCode, WireFormat, Vec<u8>)> {
        let status = response.status();
        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(WireFormat::from_media_type)
            .unwrap_or(WireFormat::Json);
        let body = response
            .bytes()
            .await
            .map_err(classify_transport)?
            .to_vec();
        Ok((status, format, body))
    }

    /// Map an error response onto the SCIM error taxonomy, reading the
    /// Errors envelope for the description.
    fn error_from_response(
        &self,
        status: StatusCode,
        format: WireFormat,
        body: &[u8],
    ) -> ScimError {
        let description = unmarshaller_for(format, self.registry.clone())
            .unmarshal_errors(body)
            .ok()
            .and_then(|errors| errors.into_iter().next())
            .map(|entry| entry.description)
            .unwrap_or_else(|| format!("status {}", status.as_u16()));
        match status {
            StatusCode::BAD_REQUEST => ScimError::InvalidResource(description),
            StatusCode::UNAUTHORIZED => ScimError::Unauthorized,
            StatusCode::FORBIDDEN => ScimError::Forbidden(description),
            StatusCode::NOT_FOUND => ScimError::NotFound(description),
            StatusCode::CONFLICT => ScimError::Conflict(description),
            StatusCode::PRECONDITION_FAILED => ScimError::PreconditionFailed,
            StatusCode::NOT_IMPLEMENTED => ScimError::NotImplemented(description),
            _ => ScimError::ExchangeFailure(description),
        }
    }
}

fn classify_transport(error: reqwest::Error) -> ScimError {
    if error.is_timeout() {
        ScimError::Expired(error.to_string())
    } else if error.is_connect() {
        ScimError::ExchangeFailure(error.to_string())
    } else if error.is_body() || error.is_decode() {
        ScimError::Interrupted(error.to_string())
    } else {
        ScimError::ExchangeFailure(error.to_string())
    }
}
