//! Web server using Axum.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{Level, Span};

use crate::config::Settings;
use crate::context::AppContext;
use crate::error::{Error, Result};

use super::router::create_app_router;

/// Webhook batches and message bodies are small; anything larger is refused.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!("http", method = %request.method(), path = %request.uri().path())
}

/// Request tracing: one `http` span per request, response status and
/// latency (ms) logged at INFO when it completes.
pub fn http_trace_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    fn(&Request<Body>) -> Span,
    DefaultOnRequest,
    DefaultOnResponse,
> {
    TraceLayer::new_for_http()
        .make_span_with(request_span as fn(&Request<Body>) -> Span)
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        )
}

/// Run the web server until the listener fails.
pub async fn run_server(settings: Settings) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

    let ctx = AppContext::new(settings)?;
    tracing::info!("Using database at {}", ctx.db.path().display());

    let app = create_app_router(ctx)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(http_trace_layer())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    tracing::info!("Starting web server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::channel::ChannelRelay;
    use crate::notify::Notifier;
    use crate::testing::TestEnv;

    #[tokio::test]
    async fn test_traced_stack_serves_requests() {
        let env = TestEnv::new();
        let relay: std::sync::Arc<dyn ChannelRelay> = env.relay.clone();
        let ctx = AppContext::from_parts(Settings::default(), env.db.clone(), Notifier::new(), relay);
        let app = create_app_router(ctx)
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(http_trace_layer());

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
