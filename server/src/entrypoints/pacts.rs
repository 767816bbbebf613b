use std::sync::Arc;

use chrono::NaiveDate;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use pact_engine::evaluation::EvaluationEngine;
use pact_engine::lifecycle::LifecycleManager;
use shared::PactId;

use super::types::{
    CancelRequest, CreatePactRequest, EndRequest, ErrorResponse, LedgerEntryResponse,
    PactResponse, ReportProgressRequest, RespondRequest,
};
use super::ApiError;

const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 100;

fn parse_pact_id(id: &str) -> Result<PactId, ApiError> {
    Uuid::parse_str(id)
        .map_err(|_| ApiError::new(Status::BadRequest, format!("invalid pact id {id}")))
}

#[utoipa::path(
    context_path = "/api/pacts",
    request_body = CreatePactRequest,
    responses(
        (status = 200, description = "Invitation created", body = PactResponse),
        (status = 400, description = "Invalid target or self-pact", body = ErrorResponse),
        (status = 404, description = "Partner not found", body = ErrorResponse),
    )
)]
#[post("/", data = "<request>")]
pub(crate) async fn create_pact(
    request: Json<CreatePactRequest>,
    lifecycle: &State<Arc<LifecycleManager>>,
) -> Result<Json<PactResponse>, ApiError> {
    let request = request.into_inner();
    let commitment = request.commitment().ok_or_else(|| {
        ApiError::new(
            Status::BadRequest,
            format!("unknown commitment type {}", request.commitment_type),
        )
    })?;
    let target_value = request
        .target_value
        .unwrap_or_else(|| commitment.default_target());

    let pact = lifecycle
        .create_pact(
            &request.initiator,
            &request.partner,
            commitment,
            target_value,
            chrono::Utc::now(),
        )
        .await?;
    Ok(Json(pact.into()))
}

#[utoipa::path(
    context_path = "/api/pacts",
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Response recorded", body = PactResponse),
        (status = 409, description = "Already responded", body = ErrorResponse),
        (status = 410, description = "Invitation expired", body = ErrorResponse),
    )
)]
#[post("/<id>/respond", data = "<request>")]
pub(crate) async fn respond(
    id: &str,
    request: Json<RespondRequest>,
    lifecycle: &State<Arc<LifecycleManager>>,
) -> Result<Json<PactResponse>, ApiError> {
    let pact_id = parse_pact_id(id)?;
    let pact = lifecycle
        .respond(pact_id, &request.responder, request.accept, chrono::Utc::now())
        .await?;
    Ok(Json(pact.into()))
}

#[utoipa::path(
    context_path = "/api/pacts",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Invitation cancelled", body = PactResponse),
        (status = 403, description = "Not the initiator", body = ErrorResponse),
    )
)]
#[post("/<id>/cancel", data = "<request>")]
pub(crate) async fn cancel(
    id: &str,
    request: Json<CancelRequest>,
    lifecycle: &State<Arc<LifecycleManager>>,
) -> Result<Json<PactResponse>, ApiError> {
    let pact_id = parse_pact_id(id)?;
    let pact = lifecycle
        .cancel_invitation(pact_id, &request.requester, chrono::Utc::now())
        .await?;
    Ok(Json(pact.into()))
}

#[utoipa::path(
    context_path = "/api/pacts",
    request_body = EndRequest,
    responses(
        (status = 200, description = "Pact ended", body = PactResponse),
        (status = 409, description = "Pact not active", body = ErrorResponse),
    )
)]
#[post("/<id>/end", data = "<request>")]
pub(crate) async fn end(
    id: &str,
    request: Json<EndRequest>,
    lifecycle: &State<Arc<LifecycleManager>>,
) -> Result<Json<PactResponse>, ApiError> {
    let pact_id = parse_pact_id(id)?;
    let pact = lifecycle
        .end(pact_id, &request.requester, request.mutual, chrono::Utc::now())
        .await?;
    Ok(Json(pact.into()))
}

#[utoipa::path(
    context_path = "/api/pacts",
    responses(
        (status = 200, description = "Current pact state", body = PactResponse),
        (status = 404, description = "Pact not found", body = ErrorResponse),
    )
)]
#[get("/<id>")]
pub(crate) async fn current_state(
    id: &str,
    lifecycle: &State<Arc<LifecycleManager>>,
) -> Result<Json<PactResponse>, ApiError> {
    let pact_id = parse_pact_id(id)?;
    let pact = lifecycle.current_state(pact_id).await?;
    Ok(Json(pact.into()))
}

#[utoipa::path(
    context_path = "/api/pacts",
    responses(
        (status = 200, description = "Ledger page, most recent first", body = [LedgerEntryResponse]),
        (status = 404, description = "Pact not found", body = ErrorResponse),
    )
)]
#[get("/<id>/ledger?<before>&<limit>")]
pub(crate) async fn ledger(
    id: &str,
    before: Option<&str>,
    limit: Option<i64>,
    lifecycle: &State<Arc<LifecycleManager>>,
) -> Result<Json<Vec<LedgerEntryResponse>>, ApiError> {
    let pact_id = parse_pact_id(id)?;
    let before = before
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::new(Status::BadRequest, format!("invalid cursor date {raw}"))
            })
        })
        .transpose()?;
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);

    let entries = lifecycle.ledger_history(pact_id, before, limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    context_path = "/api/pacts",
    request_body = ReportProgressRequest,
    responses(
        (status = 200, description = "Progress recorded", body = LedgerEntryResponse),
        (status = 400, description = "Date not started on the participant's clock", body = ErrorResponse),
        (status = 409, description = "Pact not active", body = ErrorResponse),
    )
)]
#[post("/<id>/progress", data = "<request>")]
pub(crate) async fn report_progress(
    id: &str,
    request: Json<ReportProgressRequest>,
    engine: &State<Arc<EvaluationEngine>>,
) -> Result<Json<LedgerEntryResponse>, ApiError> {
    let pact_id = parse_pact_id(id)?;
    let entry = engine
        .report_progress(
            pact_id,
            &request.participant,
            request.date,
            request.progress_value,
            chrono::Utc::now(),
        )
        .await?;
    Ok(Json(entry.into()))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing pact entrypoints", |rocket| async {
        rocket.mount(
            "/api/pacts",
            rocket::routes![
                create_pact,
                respond,
                cancel,
                end,
                current_state,
                ledger,
                report_progress
            ],
        )
    })
}
