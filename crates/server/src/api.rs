use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rfpdesk_core::domain::dispatch::DispatchStats;
use rfpdesk_core::domain::quotation::{Quotation, QuotationId};
use rfpdesk_core::domain::score::VendorScore;
use rfpdesk_core::domain::session::{AccountId, ChatSession, SessionId};
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};
use rfpdesk_core::domain::vendor::VendorId;
use rfpdesk_core::errors::{ApplicationError, InterfaceError};
use rfpdesk_engine::{
    CallContext, DashboardSummary, DispatchBatch, RfpEngine, SyncOutcome, SyncReport,
    VendorQuotations,
};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<RfpEngine>,
}

pub fn router(engine: Arc<RfpEngine>) -> Router {
    Router::new()
        .route("/api/v1/sessions", post(create_session).get(list_sessions))
        .route("/api/v1/sessions/{session_id}", get(session_history))
        .route("/api/v1/sessions/{session_id}/messages", post(post_message))
        .route("/api/v1/sessions/{session_id}/submit", post(submit_session))
        .route("/api/v1/sessions/{session_id}/confirm", post(confirm_session))
        .route("/api/v1/templates", get(list_templates))
        .route("/api/v1/templates/{template_id}/dispatch", post(dispatch_template))
        .route("/api/v1/templates/{template_id}/dispatch/stats", get(dispatch_stats))
        .route("/api/v1/templates/{template_id}/sync", post(sync_template))
        .route("/api/v1/templates/{template_id}/vendors/{vendor_id}/sync", post(sync_vendor))
        .route("/api/v1/templates/{template_id}/quotations", get(list_quotations))
        .route("/api/v1/templates/{template_id}/scores", post(score_template))
        .route("/api/v1/templates/{template_id}/dashboard", get(dashboard))
        .route("/api/v1/quotations/{quotation_id}/review", post(review_quotation))
        .with_state(ApiState { engine })
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_application(ctx: &CallContext, error: ApplicationError) -> Self {
        let mapped = error.into_interface(ctx.correlation_id.clone());
        warn!(
            event_name = "server.api.request_failed",
            correlation_id = %ctx.correlation_id,
            kind = mapped.kind().as_str(),
            error = %mapped,
            "api request failed"
        );
        Self(mapped)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let missing_fields = match &self.0 {
            InterfaceError::BadRequest { missing_fields, .. } if !missing_fields.is_empty() => {
                Some(missing_fields.clone())
            }
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            kind: self.0.kind().as_str(),
            correlation_id: self.0.correlation_id().to_string(),
            missing_fields,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Honors a caller-supplied correlation id so traces line up across services.
fn call_context(headers: &HeaderMap) -> CallContext {
    match headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(correlation_id) => CallContext::new(correlation_id, "api"),
        None => CallContext::for_actor("api"),
    }
}

fn respond<T>(ctx: &CallContext, result: Result<T, ApplicationError>) -> ApiResult<T> {
    result.map(Json).map_err(|error| ApiError::from_application(ctx, error))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub vendor_ids: Vec<VendorId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub n: Option<usize>,
}

async fn create_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ChatSession>), ApiError> {
    let ctx = call_context(&headers);
    let session = respond(&ctx, state.engine.sessions.start(&ctx, AccountId(request.owner)).await)?;
    Ok((StatusCode::CREATED, session))
}

async fn list_sessions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Vec<ChatSession>> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.sessions.list(&AccountId(query.owner)).await)
}

async fn session_history(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<ChatSession> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.sessions.history(&SessionId(session_id)).await)
}

async fn post_message(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<ChatSession> {
    let ctx = call_context(&headers);
    respond(
        &ctx,
        state.engine.sessions.post_message(&ctx, &SessionId(session_id), &request.text).await,
    )
}

/// The returned session carries the generated proposal.
async fn submit_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<ChatSession> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.sessions.submit(&ctx, &SessionId(session_id)).await)
}

async fn confirm_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<EmailTemplate>), ApiError> {
    let ctx = call_context(&headers);
    let template = respond(
        &ctx,
        state
            .engine
            .sessions
            .confirm(&ctx, &SessionId(session_id), &request.subject, &request.body)
            .await,
    )?;
    Ok((StatusCode::CREATED, template))
}

async fn list_templates(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Vec<EmailTemplate>> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.templates.list_for_owner(&AccountId(query.owner)).await)
}

async fn dispatch_template(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(template_id): Path<String>,
    Json(request): Json<DispatchRequest>,
) -> ApiResult<DispatchBatch> {
    let ctx = call_context(&headers);
    let template_id = TemplateId(template_id);
    let batch = respond(
        &ctx,
        state.engine.dispatch.dispatch_many(&ctx, &template_id, &request.vendor_ids).await,
    )?;
    info!(
        event_name = "server.api.dispatch_completed",
        correlation_id = %ctx.correlation_id,
        template_id = %template_id.0,
        sent = batch.stats.sent,
        failed = batch.stats.failed,
        "dispatch batch completed"
    );
    Ok(batch)
}

async fn dispatch_stats(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(template_id): Path<String>,
) -> ApiResult<DispatchStats> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.dispatch.stats_for_template(&TemplateId(template_id)).await)
}

async fn sync_template(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(template_id): Path<String>,
) -> ApiResult<SyncReport> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.sync.sync_all(&ctx, &TemplateId(template_id)).await)
}

async fn sync_vendor(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((template_id, vendor_id)): Path<(String, i64)>,
) -> ApiResult<SyncOutcome> {
    let ctx = call_context(&headers);
    respond(
        &ctx,
        state.engine.sync.sync(&ctx, &TemplateId(template_id), VendorId(vendor_id)).await,
    )
}

async fn list_quotations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(template_id): Path<String>,
) -> ApiResult<Vec<VendorQuotations>> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.sync.quotations(&TemplateId(template_id)).await)
}

async fn review_quotation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(quotation_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Quotation> {
    let ctx = call_context(&headers);
    respond(
        &ctx,
        state.engine.sync.review(&ctx, &QuotationId(quotation_id), request.notes).await,
    )
}

async fn score_template(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(template_id): Path<String>,
) -> ApiResult<Vec<VendorScore>> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.scorer.score(&ctx, &TemplateId(template_id)).await)
}

async fn dashboard(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(template_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardSummary> {
    let ctx = call_context(&headers);
    respond(&ctx, state.engine.dashboard.summary(&TemplateId(template_id), query.n).await)
}
