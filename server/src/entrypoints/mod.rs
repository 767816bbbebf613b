use std::io::Cursor;

use rocket::fairing::AdHoc;
use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use utoipa::OpenApi;

use pact_engine::evaluation::EvaluationError;
use pact_engine::lifecycle::LifecycleError;
use shared::Pact;

pub mod pacts;
pub mod types;

use types::{ErrorResponse, PactResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        pacts::create_pact,
        pacts::respond,
        pacts::cancel,
        pacts::end,
        pacts::current_state,
        pacts::ledger,
        pacts::report_progress,
    ),
    components(schemas(
        types::CreatePactRequest,
        types::RespondRequest,
        types::CancelRequest,
        types::EndRequest,
        types::ReportProgressRequest,
        types::ParticipantResponse,
        types::PactResponse,
        types::LedgerEntryResponse,
        types::ErrorResponse,
    ))
)]
pub struct ApiDoc;

pub struct ApiError {
    status: Status,
    message: String,
    pact: Option<PactResponse>,
}

impl ApiError {
    pub fn new(status: Status, message: String) -> Self {
        Self {
            status,
            message,
            pact: None,
        }
    }

    fn with_pact(status: Status, message: String, pact: Pact) -> Self {
        Self {
            status,
            message,
            pact: Some(pact.into()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        let message = e.to_string();
        match e {
            LifecycleError::SelfPact | LifecycleError::InvalidTarget(_) => {
                Self::new(Status::BadRequest, message)
            }
            LifecycleError::UnknownPartner(_) | LifecycleError::PactNotFound(_) => {
                Self::new(Status::NotFound, message)
            }
            LifecycleError::NotAParticipant { .. } => Self::new(Status::Forbidden, message),
            LifecycleError::NotInvited { pact } | LifecycleError::NotInitiator { pact } => {
                Self::with_pact(Status::Forbidden, message, *pact)
            }
            LifecycleError::AlreadyResponded { pact } | LifecycleError::PactInactive { pact } => {
                Self::with_pact(Status::Conflict, message, *pact)
            }
            LifecycleError::InvitationExpired { pact } => {
                Self::with_pact(Status::Gone, message, *pact)
            }
            LifecycleError::Directory(_) => Self::new(Status::ServiceUnavailable, message),
            LifecycleError::Store(e) if e.is_transient() => {
                Self::new(Status::ServiceUnavailable, message)
            }
            LifecycleError::Store(_) => Self::new(Status::InternalServerError, message),
        }
    }
}

impl From<EvaluationError> for ApiError {
    fn from(e: EvaluationError) -> Self {
        let message = e.to_string();
        match e {
            EvaluationError::PactNotFound(_) => Self::new(Status::NotFound, message),
            EvaluationError::NotAParticipant { .. } => Self::new(Status::Forbidden, message),
            EvaluationError::PactInactive { pact } => {
                Self::with_pact(Status::Conflict, message, *pact)
            }
            EvaluationError::FutureDate { .. } => Self::new(Status::BadRequest, message),
            EvaluationError::MissingCursor(_) => Self::new(Status::InternalServerError, message),
            EvaluationError::Store(e) if e.is_transient() => {
                Self::new(Status::ServiceUnavailable, message)
            }
            EvaluationError::Store(_) => Self::new(Status::InternalServerError, message),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let body = serde_json::to_vec(&ErrorResponse {
            error: self.message,
            pact: self.pact,
        })
        .map_err(|_| Status::InternalServerError)?;

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.attach(pacts::stage())
    })
}
