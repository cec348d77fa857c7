//! HTTP verb handlers: one dispatch point that parses the SCIM URI,
//! negotiates the representation, applies method override, and routes to
//! the backend.

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;

use crate::auth::AuthCredentials;
use crate::error::{ScimError, ScimResult};
use crate::marshal::{unmarshaller_for, ListEnvelope, WireFormat};
use crate::model::ScimObject;
use crate::parser::{parse_filter, PageParams, SortSpec};
use crate::uri::ScimUri;

use super::response::{
    negotiate, render_error, render_list, render_no_content, render_object, select_attributes,
    strip_password,
};
use super::AppState;

pub async fn handle(
    State(state): State<AppState>,
    Extension(credentials): Extension<AuthCredentials>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    // Errors before negotiation completes render as JSON.
    let mut format = WireFormat::Json;
    match dispatch(&state, &credentials, &method, &headers, &uri, &body, &mut format).await {
        Ok(response) => response,
        Err(err) => render_error(format, &state.registry, &err),
    }
}

async fn dispatch(
    state: &AppState,
    credentials: &AuthCredentials,
    method: &Method,
    headers: &HeaderMap,
    uri: &Uri,
    body: &Bytes,
    format: &mut WireFormat,
) -> ScimResult<Response> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let scim_uri = ScimUri::parse(&state.config.server.base_uri, path_and_query)?;

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());
    *format = negotiate(scim_uri.suffix, accept)?;

    if state
        .registry
        .resource_by_endpoint(&scim_uri.endpoint)
        .is_none()
    {
        return Err(ScimError::UnknownEndpoint(scim_uri.endpoint.clone()));
    }

    let effective = if *method == Method::POST && scim_uri.resource_id.is_some() {
        override_method(headers)?
    } else {
        method.clone()
    };

    match (effective.as_str(), scim_uri.resource_id.as_deref()) {
        ("GET", None) => list_resources(state, &scim_uri, *format).await,
        ("POST", None) => {
            create_resource(state, credentials, headers, body, &scim_uri, *format).await
        }
        ("GET", Some(id)) => get_resource(state, &scim_uri, id, *format).await,
        ("PUT", Some(id)) => {
            put_resource(state, credentials, headers, body, &scim_uri, id, *format).await
        }
        ("DELETE", Some(id)) => delete_resource(state, credentials, &scim_uri, id).await,
        (other, _) => Err(ScimError::InvalidUri(format!(
            "method {} is not supported for this URI",
            other
        ))),
    }
}

/// `X-HTTP-Method-Override` tunnels PUT, PATCH and DELETE through POST for
/// intermediaries that only pass POST.
fn override_method(headers: &HeaderMap) -> ScimResult<Method> {
    let value = headers
        .get("x-http-method-override")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ScimError::InvalidUri(
                "POST to a resource URI requires X-HTTP-Method-Override".to_string(),
            )
        })?;
    match value.to_uppercase().as_str() {
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Err(ScimError::NotImplemented("PATCH".to_string())),
        other => Err(ScimError::InvalidUri(format!(
            "unsupported method override: {}",
            other
        ))),
    }
}

/// The server verifies credentials against the backend before any mutation
/// is dispatched.
async fn authenticate_mutation(state: &AppState, credentials: &AuthCredentials) -> ScimResult<()> {
    if state.config.authentication.auth_type != "basic" {
        return Ok(());
    }
    let Some((user_id, password)) = &credentials.0 else {
        return Err(ScimError::Unauthorized);
    };
    if state.backend.authenticate(user_id, password).await? {
        Ok(())
    } else {
        Err(ScimError::Unauthorized)
    }
}

fn read_body(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    resource_name: &str,
) -> ScimResult<ScimObject> {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let format = match declared {
        Some(content_type) => WireFormat::from_media_type(content_type).ok_or_else(|| {
            ScimError::InvalidResource(format!("unsupported Content-Type: {}", content_type))
        })?,
        None => WireFormat::Json,
    };
    let unmarshaller = unmarshaller_for(format, state.registry.clone());
    unmarshaller.unmarshal(body, resource_name)
}

fn location_for(state: &AppState, headers: &HeaderMap, endpoint: &str, id: &str) -> String {
    let path = ScimUri::for_resource(endpoint, id).emit(&state.config.server.base_uri);
    match headers.get(header::HOST).and_then(|value| value.to_str().ok()) {
        Some(host) => format!("http://{}{}", host, path),
        None => path,
    }
}

async fn get_resource(
    state: &AppState,
    scim_uri: &ScimUri,
    id: &str,
    format: WireFormat,
) -> ScimResult<Response> {
    let request = crate::backend::GetResourceRequest {
        endpoint: scim_uri.endpoint.clone(),
        resource_id: id.to_string(),
        attributes: scim_uri.query.attributes.clone(),
    };
    let mut object = state.backend.get_resource(&request).await?;
    strip_password(&mut object);
    let object = select_attributes(&object, scim_uri.query.attributes.as_deref().unwrap_or(&[]));
    Ok(render_object(
        format,
        &state.registry,
        &object,
        StatusCode::OK,
        None,
    ))
}

async fn list_resources(
    state: &AppState,
    scim_uri: &ScimUri,
    format: WireFormat,
) -> ScimResult<Response> {
    let filter = scim_uri
        .query
        .filter
        .as_deref()
        .map(parse_filter)
        .transpose()?;
    let sort = SortSpec::from_params(
        scim_uri.query.sort_by.as_deref(),
        scim_uri.query.sort_order.map(|order| order.as_str()),
    );
    let page = PageParams::from_params(
        scim_uri.query.start_index,
        scim_uri.query.count,
        state.config.server.default_count,
    )?;

    let request = crate::backend::GetResourcesRequest {
        endpoint: scim_uri.endpoint.clone(),
        filter,
        sort,
        page,
        attributes: scim_uri.query.attributes.clone(),
    };
    let page = state.backend.get_resources(&request).await?;

    let selection = scim_uri.query.attributes.as_deref().unwrap_or(&[]);
    let resources: Vec<ScimObject> = page
        .resources
        .into_iter()
        .map(|mut object| {
            strip_password(&mut object);
            select_attributes(&object, selection)
        })
        .collect();

    let list = ListEnvelope {
        total_results: page.total_results,
        start_index: page.start_index,
        items_per_page: resources.len() as i64,
        resources,
    };
    Ok(render_list(format, &state.registry, &list))
}

async fn create_resource(
    state: &AppState,
    credentials: &AuthCredentials,
    headers: &HeaderMap,
    body: &Bytes,
    scim_uri: &ScimUri,
    format: WireFormat,
) -> ScimResult<Response> {
    let resource = state
        .registry
        .resource_by_endpoint(&scim_uri.endpoint)
        .ok_or_else(|| ScimError::UnknownEndpoint(scim_uri.endpoint.clone()))?;

    let mut object = read_body(state, headers, body, resource.name())?;
    object.strip_read_only();
    object.check_required(resource)?;

    authenticate_mutation(state, credentials).await?;

    let request = crate::backend::PostResourceRequest {
        endpoint: scim_uri.endpoint.clone(),
        resource: object,
    };
    let mut created = state.backend.post_resource(&request).await?;
    strip_password(&mut created);

    let id = created
        .id()
        .ok_or_else(|| ScimError::Backend("created resource has no id".to_string()))?
        .to_string();
    let location = location_for(state, headers, &scim_uri.endpoint, &id);
    Ok(render_object(
        format,
        &state.registry,
        &created,
        StatusCode::CREATED,
        Some(&location),
    ))
}

async fn put_resource(
    state: &AppState,
    credentials: &AuthCredentials,
    headers: &HeaderMap,
    body: &Bytes,
    scim_uri: &ScimUri,
    id: &str,
    format: WireFormat,
) -> ScimResult<Response> {
    let resource = state
        .registry
        .resource_by_endpoint(&scim_uri.endpoint)
        .ok_or_else(|| ScimError::UnknownEndpoint(scim_uri.endpoint.clone()))?;

    let mut object = read_body(state, headers, body, resource.name())?;
    // readOnly attributes in the body are discarded, not errored.
    object.strip_read_only();
    object.check_required(resource)?;

    authenticate_mutation(state, credentials).await?;

    let request = crate::backend::PutResourceRequest {
        endpoint: scim_uri.endpoint.clone(),
        resource_id: id.to_string(),
        resource: object,
    };
    let mut replaced = state.backend.put_resource(&request).await?;
    strip_password(&mut replaced);
    Ok(render_object(
        format,
        &state.registry,
        &replaced,
        StatusCode::OK,
        None,
    ))
}

async fn delete_resource(
    state: &AppState,
    credentials: &AuthCredentials,
    scim_uri: &ScimUri,
    id: &str,
) -> ScimResult<Response> {
    authenticate_mutation(state, credentials).await?;
    let request = crate::backend::DeleteResourceRequest {
        endpoint: scim_uri.endpoint.clone(),
        resource_id: id.to_string(),
    };
    state.backend.delete_resource(&request).await?;
    Ok(render_no_content(StatusCode::OK))
}
