//! Transport-level Tower middleware for the HTTP surface.
//!
//! Layers are listed outermost first: the first layer sees the request
//! first and the response last.

use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method, StatusCode};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

const REQUEST_ID_HEADER: &str = "x-request-id";

type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        CorsLayer,
        Stack<
            TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
            Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
        >,
    >,
>;

/// Builds the middleware stack shared by every route.
///
/// 1. `SetRequestId`: UUID v4 `x-request-id` on every request
/// 2. `Trace`: request/response spans
/// 3. `Cors`: configured origins, `GET` and `POST`
/// 4. `PropagateRequestId`: echoes `x-request-id` on the response
///
/// Body size is enforced by the router's `DefaultBodyLimit`, which the
/// `Json` extractor honours.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// 408 once `request_timeout` elapses. Only the health routes get this;
/// dropping a batch future would not stop its blocking task from committing.
#[must_use]
pub fn build_timeout_layer(config: &NetworkConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout)
}

/// Unparseable origins are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
