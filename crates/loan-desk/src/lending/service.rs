use std::sync::Arc;

use serde::Serialize;

use super::balancer;
use super::domain::{
    ApplicationDetails, ApplicationId, Customer, CustomerId, Document, Installment,
    LoanApplication, LoanApplicationStatus, LoanOfficer, OfficerId, SchemeId,
};
use super::intake::{DocumentIntake, IntakeError};
use super::notify::{NotificationStatus, Notifier};
use super::repository::{InstallmentFilter, LendingStore, LendingTransaction, RepositoryError};
use super::schedule::{MaterializeError, ScheduleError, SchedulePeriod};

/// Business limits applied by the lending service.
#[derive(Debug, Clone, PartialEq)]
pub struct LendingPolicy {
    pub max_open_applications: usize,
    pub collateral_deadline: chrono::Duration,
    pub installment_period: SchedulePeriod,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            max_open_applications: 3,
            collateral_deadline: chrono::Duration::days(7),
            installment_period: SchedulePeriod::CalendarMonth,
        }
    }
}

/// Service composing the store, notification and document-intake collaborators.
pub struct LendingService<S, N, D> {
    store: Arc<S>,
    notifier: Arc<N>,
    intake: Arc<D>,
    policy: LendingPolicy,
}

impl<S, N, D> LendingService<S, N, D>
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, intake: Arc<D>, policy: LendingPolicy) -> Self {
        Self {
            store,
            notifier,
            intake,
            policy,
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }

    pub(crate) fn intake(&self) -> &D {
        &self.intake
    }

    /// Least-loaded active officer, see [`balancer::pick_officer`].
    pub fn pick_officer(&self) -> Result<LoanOfficer, LendingError> {
        let mut tx = self.store.begin()?;
        balancer::pick_officer(&mut *tx)?.ok_or(LendingError::NoEligibleOfficer)
    }
}

pub(crate) fn load_application(
    tx: &mut dyn LendingTransaction,
    id: ApplicationId,
) -> Result<LoanApplication, LendingError> {
    tx.application(id)?
        .ok_or(LendingError::ApplicationNotFound(id))
}

pub(crate) fn load_customer(
    tx: &mut dyn LendingTransaction,
    id: CustomerId,
) -> Result<Customer, LendingError> {
    tx.customer(id)?.ok_or(LendingError::CustomerNotFound(id))
}

pub(crate) fn load_details(
    tx: &mut dyn LendingTransaction,
    application: LoanApplication,
) -> Result<ApplicationDetails, LendingError> {
    let documents = tx.documents(application.id)?;
    let installments = tx.installments(&InstallmentFilter::for_application(application.id))?;
    Ok(ApplicationDetails {
        application,
        documents,
        installments,
    })
}

/// Move `application` along one edge of the lifecycle graph.
pub(crate) fn advance(
    application: &mut LoanApplication,
    next: LoanApplicationStatus,
) -> Result<(), LendingError> {
    if !application.status.can_transition_to(next) {
        return Err(LendingError::InvalidState {
            application_id: application.id,
            expected: next,
            actual: application.status,
        });
    }
    application.status = next;
    Ok(())
}

/// Result of a committed state-machine transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReceipt {
    pub application: LoanApplication,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<Document>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub installments: Vec<Installment>,
    pub notification: NotificationStatus,
}

/// Outcome classes the HTTP layer translates into status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    Forbidden,
    Conflict,
    NotFound,
    Internal,
}

/// Error raised by the lending service.
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("loan amount must be greater than zero, got {0}")]
    InvalidAmount(f64),
    #[error("at least one document must be provided")]
    NoDocumentsProvided,
    #[error("invalid loan scheme: {0}")]
    InvalidScheme(String),
    #[error("invalid user details: {0}")]
    InvalidIdentity(String),
    #[error("customer already has {open} open applications (limit {limit})")]
    TooManyOpenApplications { open: usize, limit: usize },
    #[error("no active loan officer is available")]
    NoEligibleOfficer,
    #[error("officer {officer_id} is not assigned to application {application_id}")]
    NotAssignedOfficer {
        application_id: ApplicationId,
        officer_id: OfficerId,
    },
    #[error("application {application_id} does not belong to customer {customer_id}")]
    NotOwner {
        application_id: ApplicationId,
        customer_id: CustomerId,
    },
    #[error("application {application_id} has already been processed ({status})")]
    AlreadyProcessed {
        application_id: ApplicationId,
        status: LoanApplicationStatus,
    },
    #[error("application {application_id} is {actual}, operation requires {expected}")]
    InvalidState {
        application_id: ApplicationId,
        expected: LoanApplicationStatus,
        actual: LoanApplicationStatus,
    },
    #[error("loan application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("loan scheme {0} not found")]
    SchemeNotFound(SchemeId),
    #[error("loan officer {0} not found")]
    OfficerNotFound(OfficerId),
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),
    #[error("{count} application(s) still depend on this record")]
    DependentApplications { count: usize },
    #[error("installment schedule failed: {0}")]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LendingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LendingError::InvalidAmount(_)
            | LendingError::NoDocumentsProvided
            | LendingError::InvalidScheme(_)
            | LendingError::InvalidIdentity(_)
            | LendingError::Intake(IntakeError::EmptyFile(_))
            | LendingError::Intake(IntakeError::InvalidName(_)) => ErrorClass::Validation,
            LendingError::NotAssignedOfficer { .. } | LendingError::NotOwner { .. } => {
                ErrorClass::Forbidden
            }
            LendingError::TooManyOpenApplications { .. }
            | LendingError::NoEligibleOfficer
            | LendingError::AlreadyProcessed { .. }
            | LendingError::InvalidState { .. }
            | LendingError::DependentApplications { .. }
            | LendingError::Repository(RepositoryError::Conflict)
            | LendingError::Repository(RepositoryError::StaleWrite) => ErrorClass::Conflict,
            LendingError::ApplicationNotFound(_)
            | LendingError::SchemeNotFound(_)
            | LendingError::OfficerNotFound(_)
            | LendingError::CustomerNotFound(_)
            | LendingError::Repository(RepositoryError::NotFound) => ErrorClass::NotFound,
            LendingError::Schedule(_)
            | LendingError::Intake(IntakeError::Unavailable(_))
            | LendingError::Repository(RepositoryError::Unavailable(_)) => ErrorClass::Internal,
        }
    }
}

impl From<MaterializeError> for LendingError {
    fn from(value: MaterializeError) -> Self {
        match value {
            MaterializeError::Schedule(err) => LendingError::Schedule(err),
            MaterializeError::Repository(err) => LendingError::Repository(err),
        }
    }
}
