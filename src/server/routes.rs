//! HTTP routes
//!
//! `/events` opens a Server-Sent-Events stream for one environment. The
//! `/api/v1` routes manage projects, environments and features; every
//! feature mutation is published to the open streams after it commits.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{KeepAliveStream, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::Error;
use crate::features::{
    CreateEnvironmentRequest, CreateFeatureRequest, CreateProjectRequest, Environment,
    FeatureService, FeatureStore, StoreError, UpdateFeatureRequest,
};
use crate::registry::{EnvironmentId, RegistryError, SubscriberRegistry};
use crate::server::config::ServerConfig;
use crate::session::{self, DeliveryLoop, SubscriptionContext};
use crate::stats::HubStats;
use crate::transport::{sse_channel, SseStream};

/// Request/response header carrying the correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeatureService>,
    pub registry: Arc<SubscriberRegistry>,
    pub config: Arc<ServerConfig>,
    pub connections: Option<Arc<Semaphore>>,
}

/// State of the `/events` route, which reads snapshots through any
/// [`FeatureStore`]
pub struct StreamState<S> {
    pub store: Arc<S>,
    pub registry: Arc<SubscriberRegistry>,
    pub config: Arc<ServerConfig>,
    pub connections: Option<Arc<Semaphore>>,
}

impl<S> Clone for StreamState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            connections: self.connections.clone(),
        }
    }
}

// ==================
// Responses
// ==================

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

fn data<T: Serialize>(value: T) -> Json<DataResponse<T>> {
    Json(DataResponse { data: value })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// Handler error mapped onto an HTTP status
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (ApiError::BadRequest(error)
        | ApiError::NotFound(error)
        | ApiError::Unavailable(error)
        | ApiError::Internal(error)) = self;

        (
            status,
            Json(ErrorResponse {
                error,
                code: status.as_u16(),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            StoreError::Unavailable(_) => ApiError::Unavailable(err.to_string()),
            _ => ApiError::NotFound(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscriptions: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub hub: HubStats,
    pub registered_subscriptions: usize,
    pub streaming_environments: usize,
    pub last_sequence: u64,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub environment_id: Option<String>,
}

// ==================
// Router
// ==================

/// Create the HTTP router
pub fn router(state: AppState) -> Router {
    let store = Arc::clone(state.service.store());
    router_with_store(state, store)
}

/// Create the HTTP router, serving stream snapshots from `store`
pub fn router_with_store<S>(state: AppState, store: Arc<S>) -> Router
where
    S: FeatureStore + 'static,
{
    let cors = cors_layer(&state.config.cors_origins);

    let events: Router = Router::new()
        .route("/events", get(stream_events::<S>))
        .with_state(StreamState {
            store,
            registry: Arc::clone(&state.registry),
            config: Arc::clone(&state.config),
            connections: state.connections.clone(),
        });

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .route("/api/v1/projects/{project_id}", get(get_project))
        .route(
            "/api/v1/projects/{project_id}/environments",
            get(list_environments).post(create_environment),
        )
        .route(
            "/api/v1/projects/{project_id}/features",
            get(list_project_features).post(create_feature),
        )
        .route(
            "/api/v1/projects/{project_id}/environments/{environment_id}/features",
            get(list_environment_features),
        )
        .route(
            "/api/v1/projects/{project_id}/environments/{environment_id}/features/{feature_id}",
            get(get_feature).put(update_feature).delete(delete_feature),
        )
        .with_state(state)
        .merge(events)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<Body>| {
            let correlation_id = request
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                correlation_id = %correlation_id,
            )
        }))
        .layer(middleware::from_fn(propagate_correlation_id))
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(CORRELATION_ID_HEADER)]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Ensure every request and response carries a correlation id
async fn propagate_correlation_id(mut request: Request, next: Next) -> Response {
    let value = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(value) = value else {
        return next.run(request).await;
    };

    request
        .headers_mut()
        .insert(CORRELATION_ID_HEADER, value.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    response
}

fn correlation_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
}

// ==================
// Handlers
// ==================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscriptions: state.registry.len(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<DataResponse<StatsResponse>> {
    data(StatsResponse {
        hub: state.registry.metrics().snapshot(),
        registered_subscriptions: state.registry.len(),
        streaming_environments: state.registry.environment_count(),
        last_sequence: state.registry.last_sequence(),
    })
}

/// Open a live event stream for one environment
async fn stream_events<S>(
    State(state): State<StreamState<S>>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<KeepAliveStream<SseStream>>, ApiError>
where
    S: FeatureStore + 'static,
{
    let environment_id = query
        .environment_id
        .filter(|id| !id.trim().is_empty())
        .map(EnvironmentId::new)
        .ok_or_else(|| ApiError::BadRequest("environment_id is required".into()))?;

    let permit = match &state.connections {
        Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(environment = %environment_id, "Stream rejected: limit reached");
                return Err(ApiError::Unavailable("connection limit reached".into()));
            }
        },
        None => None,
    };

    state.store.environment(&environment_id).await?;

    let opened = session::open(&state.registry, state.store.as_ref(), environment_id.clone())
        .await
        .map_err(|err| match err {
            Error::Store(e) if e.is_not_found() => ApiError::NotFound(e.to_string()),
            Error::Registry(RegistryError::ShuttingDown) => {
                ApiError::Unavailable("server is shutting down".into())
            }
            Error::SubscriptionClosed(id) => {
                ApiError::Unavailable(format!("subscription {id} closed while opening"))
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    let mut context = SubscriptionContext::new(opened.handle.id(), environment_id);
    if let Some(id) = correlation_id(&headers) {
        context = context.with_correlation_id(id);
    }

    let (transport, sse) = sse_channel(
        state.config.transport_buffer,
        state.config.keep_alive_interval,
    );
    let delivery = DeliveryLoop::new(opened, state.config.write_timeout).with_context(context);

    tokio::spawn(async move {
        let _permit = permit;
        delivery.run(transport).await;
    });

    Ok(sse)
}

async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.service.create_project(&request)?;
    Ok((StatusCode::CREATED, data(project)))
}

async fn list_projects(State(state): State<AppState>) -> impl IntoResponse {
    data(state.service.store().list_projects())
}

async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(data(state.service.store().get_project(&project_id)?))
}

async fn create_environment(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateEnvironmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = state.service.create_environment(&project_id, &request)?;
    Ok((StatusCode::CREATED, data(environment)))
}

async fn list_environments(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(data(state.service.store().list_environments(&project_id)?))
}

async fn create_feature(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateFeatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create_feature(&project_id, &request)?;
    Ok((StatusCode::CREATED, data(created)))
}

async fn list_project_features(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(data(state.service.store().list_project_features(&project_id)?))
}

/// Resolve an environment and check it belongs to the project in the path
fn project_environment(
    state: &AppState,
    project_id: &str,
    environment_id: &str,
) -> Result<Environment, ApiError> {
    let environment = state.service.store().get_environment(environment_id)?;
    if environment.project_id != project_id {
        return Err(StoreError::EnvironmentNotFound(environment_id.to_string()).into());
    }
    Ok(environment)
}

async fn list_environment_features(
    State(state): State<AppState>,
    Path((project_id, environment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    project_environment(&state, &project_id, &environment_id)?;
    Ok(data(state.service.store().list_features(&environment_id)?))
}

async fn get_feature(
    State(state): State<AppState>,
    Path((project_id, environment_id, feature_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    project_environment(&state, &project_id, &environment_id)?;
    Ok(data(
        state.service.store().get_feature(&environment_id, &feature_id)?,
    ))
}

async fn update_feature(
    State(state): State<AppState>,
    Path((project_id, environment_id, feature_id)): Path<(String, String, String)>,
    Json(request): Json<UpdateFeatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    project_environment(&state, &project_id, &environment_id)?;
    let updated = state
        .service
        .update_feature(&environment_id, &feature_id, &request)?;
    Ok(data(updated))
}

async fn delete_feature(
    State(state): State<AppState>,
    Path((project_id, environment_id, feature_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    project_environment(&state, &project_id, &environment_id)?;
    let deleted = state.service.delete_feature(&environment_id, &feature_id)?;
    Ok(data(deleted))
}
