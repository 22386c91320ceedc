use anyhow::anyhow;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, StatusCode},
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    handlers::{
        add_member, create_channel, delete_channel, delete_message, edit_message,
        get_channel_messages, list_channels, post_message, remove_member, update_channel,
    },
    publisher::EventPublisher,
    types::health,
};

fn validate(config: &AppConfig) -> anyhow::Result<()> {
    if config.max_body_bytes == 0 {
        return Err(anyhow!("request body limit must be at least 1 byte"));
    }
    if config.request_timeout.is_zero() {
        return Err(anyhow!("request timeout must be at least 1 millisecond"));
    }
    if config.publish_timeout.is_zero() {
        return Err(anyhow!("publish timeout must be at least 1 millisecond"));
    }
    if config.queue_topic.trim().is_empty() {
        return Err(anyhow!("queue topic must not be empty"));
    }
    Ok(())
}

/// Build the axum router plus a handle to the event publisher so the
/// caller can flush it at shutdown.
///
/// # Errors
/// Returns an error if configured limits are invalid or a backend
/// handle cannot be created.
pub fn build_service(config: &AppConfig) -> anyhow::Result<(Router, EventPublisher)> {
    validate(config)?;
    let app_state = AppState::new(config)?;
    let publisher = app_state.publisher.clone();
    Ok((router_with_state(app_state, config), publisher))
}

/// Build the axum router with global middleware.
///
/// # Errors
/// Returns an error if configured limits are invalid.
pub fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    build_service(config).map(|(router, _)| router)
}

pub(crate) fn router_with_state(app_state: AppState, config: &AppConfig) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health))
        .route("/v1/channels", get(list_channels).post(create_channel))
        .route(
            "/v1/channels/{channel_id}",
            get(get_channel_messages)
                .post(post_message)
                .patch(update_channel)
                .delete(delete_channel),
        )
        .route(
            "/v1/channels/{channel_id}/members",
            post(add_member).delete(remove_member),
        )
        .route(
            "/v1/messages/{message_id}",
            patch(edit_message).delete(delete_message),
        )
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                )),
        )
}
