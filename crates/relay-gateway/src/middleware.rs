use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_core::{RelayError, RelayResult};
use std::sync::Arc;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";

/// CORS configuration for the gateway.
#[derive(Clone, Debug)]
pub struct CorsConfig {
    allow_origin: HeaderValue,
}

impl CorsConfig {
    /// Allow the given origin. Fails if it is not a valid header value.
    pub fn new(allow_origin: &str) -> RelayResult<Self> {
        let allow_origin = HeaderValue::from_str(allow_origin).map_err(|e| {
            RelayError::Config(format!("invalid CORS origin '{allow_origin}': {e}"))
        })?;
        Ok(Self { allow_origin })
    }

    /// Any origin (`*`).
    pub fn permissive() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
        }
    }

    pub fn allow_origin(&self) -> &HeaderValue {
        &self.allow_origin
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::permissive()
    }
}

/// CORS middleware.
///
/// Answers every `OPTIONS` request with an empty 204 preflight response and
/// stamps `Access-Control-Allow-Origin` on everything else, including error
/// and streaming responses.
pub async fn cors_middleware(
    State(cors): State<Arc<CorsConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.allow_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        return response;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.allow_origin.clone());
    response
}
