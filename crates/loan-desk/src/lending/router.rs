use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::catalog::SchemeChanges;
use super::domain::{
    ApplicationId, Caller, CustomerId, Identity, NewLoanScheme, OfficerId, Role, SchemeId,
    UploadedFile,
};
use super::intake::DocumentIntake;
use super::notify::Notifier;
use super::repository::LendingStore;
use super::service::{ErrorClass, LendingError, LendingService};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Shared handler state: the service plus the per-request deadline.
pub struct LendingState<S, N, D> {
    pub service: Arc<LendingService<S, N, D>>,
    pub request_timeout: Duration,
}

impl<S, N, D> Clone for LendingState<S, N, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            request_timeout: self.request_timeout,
        }
    }
}

/// Router builder exposing the customer, officer and admin endpoints.
pub fn lending_router<S, N, D>(
    service: Arc<LendingService<S, N, D>>,
    request_timeout: Duration,
) -> Router
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    Router::new()
        .route("/api/v1/customers", post(register_customer_handler::<S, N, D>))
        .route(
            "/api/v1/loan-applications",
            post(apply_handler::<S, N, D>).get(customer_applications_handler::<S, N, D>),
        )
        .route(
            "/api/v1/loan-applications/:application_id/collateral",
            post(upload_collateral_handler::<S, N, D>),
        )
        .route(
            "/api/v1/loan-applications/:application_id/payments",
            post(pay_handler::<S, N, D>),
        )
        .route(
            "/api/v1/officer/applications",
            get(officer_applications_handler::<S, N, D>),
        )
        .route(
            "/api/v1/officer/applications/:application_id/initial-decision",
            post(initial_decision_handler::<S, N, D>),
        )
        .route(
            "/api/v1/officer/applications/:application_id/collateral-decision",
            post(collateral_decision_handler::<S, N, D>),
        )
        .route("/api/v1/admin/schemes", post(create_scheme_handler::<S, N, D>))
        .route(
            "/api/v1/admin/schemes/:scheme_id",
            put(update_scheme_handler::<S, N, D>).delete(delete_scheme_handler::<S, N, D>),
        )
        .route(
            "/api/v1/admin/officers",
            post(register_officer_handler::<S, N, D>).get(officer_loads_handler::<S, N, D>),
        )
        .route(
            "/api/v1/admin/officers/:officer_id",
            delete(delete_officer_handler::<S, N, D>),
        )
        .route(
            "/api/v1/admin/officers/:officer_id/active",
            put(officer_activation_handler::<S, N, D>),
        )
        .with_state(LendingState {
            service,
            request_timeout,
        })
}

/// Uploaded file as carried in JSON bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentPayload {
    pub name: String,
    pub content: String,
}

impl From<DocumentPayload> for UploadedFile {
    fn from(payload: DocumentPayload) -> Self {
        UploadedFile::new(payload.name, payload.content.into_bytes())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyRequest {
    pub loan_scheme_id: SchemeId,
    pub amount: f64,
    #[serde(default)]
    pub documents: Vec<DocumentPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollateralRequest {
    #[serde(default)]
    pub documents: Vec<DocumentPayload>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DecisionRequest {
    pub approve: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ActivationRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityRequest {
    pub name: String,
    pub email: String,
}

impl From<IdentityRequest> for Identity {
    fn from(request: IdentityRequest) -> Self {
        Identity::new(request.name, request.email)
    }
}

/// Failure of one HTTP request, before or during the service call.
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(String),
    WrongRole { required: Role },
    Lending(LendingError),
    DeadlineExceeded(Duration),
    Worker(String),
}

impl From<LendingError> for ApiError {
    fn from(value: LendingError) -> Self {
        ApiError::Lending(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Unauthenticated(message) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            ApiError::WrongRole { required } => (
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("this endpoint requires the {required:?} role"),
            ),
            ApiError::Lending(error) => {
                let (status, kind) = match error.class() {
                    ErrorClass::Validation => (StatusCode::BAD_REQUEST, "validation"),
                    ErrorClass::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
                    ErrorClass::Conflict => (StatusCode::CONFLICT, "conflict"),
                    ErrorClass::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                    ErrorClass::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %error, "lending request failed");
                }
                (status, kind, error.to_string())
            }
            ApiError::DeadlineExceeded(limit) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "timeout",
                format!("request exceeded {} ms", limit.as_millis()),
            ),
            ApiError::Worker(message) => {
                tracing::error!(%message, "lending worker failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        };
        let payload = json!({
            "error": message,
            "kind": kind,
        });
        (status, axum::Json(payload)).into_response()
    }
}

/// Resolve the caller from the identity headers and require `role`.
pub fn authorize(headers: &HeaderMap, role: Role) -> Result<Caller, ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing or invalid {USER_ID_HEADER}")))?;
    let caller_role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse)
        .ok_or_else(|| {
            ApiError::Unauthenticated(format!("missing or invalid {USER_ROLE_HEADER}"))
        })?;
    if caller_role != role {
        return Err(ApiError::WrongRole { required: role });
    }
    Ok(Caller {
        user_id,
        role: caller_role,
    })
}

/// Run a synchronous service call on the blocking pool, bounded by `limit`. A call that overruns
/// keeps running to completion; only the response is abandoned.
async fn run_bounded<T, F>(limit: Duration, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LendingError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result.map_err(ApiError::Lending),
        Ok(Err(join)) => Err(ApiError::Worker(join.to_string())),
        Err(_) => Err(ApiError::DeadlineExceeded(limit)),
    }
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn register_customer_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    axum::Json(request): axum::Json<IdentityRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.register_customer(request.into())
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn apply_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ApplyRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::Customer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.apply_for_loan(
            CustomerId(caller.user_id),
            request.loan_scheme_id,
            request.amount,
            request.documents.into_iter().map(UploadedFile::from).collect(),
        )
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn customer_applications_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    headers: HeaderMap,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::Customer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.customer_applications(CustomerId(caller.user_id))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn upload_collateral_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CollateralRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::Customer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.upload_collateral(
            ApplicationId(application_id),
            CustomerId(caller.user_id),
            request.documents.into_iter().map(UploadedFile::from).collect(),
        )
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn pay_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::Customer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.pay_nearest_installment(CustomerId(caller.user_id), ApplicationId(application_id))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn officer_applications_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    headers: HeaderMap,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::LoanOfficer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.officer_applications(OfficerId(caller.user_id))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn initial_decision_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::LoanOfficer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.approve_initial(
            ApplicationId(application_id),
            OfficerId(caller.user_id),
            request.approve,
        )
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn collateral_decision_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let caller = match authorize(&headers, Role::LoanOfficer) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.approve_collateral(
            ApplicationId(application_id),
            OfficerId(caller.user_id),
            request.approve,
        )
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_scheme_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<NewLoanScheme>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || service.create_scheme(request)).await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn update_scheme_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(scheme_id): Path<u64>,
    headers: HeaderMap,
    axum::Json(changes): axum::Json<SchemeChanges>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.update_scheme(SchemeId(scheme_id), changes)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn delete_scheme_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(scheme_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    match run_bounded(state.request_timeout, move || {
        service.delete_scheme(SchemeId(scheme_id))
    })
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn register_officer_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<IdentityRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.register_officer(request.into())
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn officer_loads_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    headers: HeaderMap,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || service.officer_loads()).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn officer_activation_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(officer_id): Path<u64>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ActivationRequest>,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    let result = run_bounded(state.request_timeout, move || {
        service.set_officer_active(OfficerId(officer_id), request.active)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn delete_officer_handler<S, N, D>(
    State(state): State<LendingState<S, N, D>>,
    Path(officer_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    if let Err(error) = authorize(&headers, Role::Admin) {
        return error.into_response();
    }
    let service = state.service;
    match run_bounded(state.request_timeout, move || {
        service.delete_officer(OfficerId(officer_id))
    })
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}
