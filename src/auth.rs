use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::ScimError;
use crate::marshal::WireFormat;
use crate::server::response::render_error;
use crate::server::AppState;

/// Basic credentials decoded from the request, stored in request
/// extensions for the handlers. `None` when the request carried none.
#[derive(Debug, Clone)]
pub struct AuthCredentials(pub Option<(String, String)>);

/// Decode `Authorization: Basic` credentials and enforce their presence
/// when the server is configured for basic authentication. Credential
/// verification itself happens against the backend, before mutations are
/// dispatched.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic);

    if state.config.authentication.auth_type == "basic" && credentials.is_none() {
        return render_error(WireFormat::Json, &state.registry, &ScimError::Unauthorized);
    }

    request.extensions_mut().insert(AuthCredentials(credentials));
    next.run(request).await
}

fn parse_basic(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
