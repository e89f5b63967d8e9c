use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationId, Customer, CustomerId, Document, Identity, Installment, InstallmentStatus,
    LoanApplication, LoanApplicationStatus, LoanOfficer, LoanScheme, NewDocument,
    NewInstallment, NewLoanApplication, NewLoanScheme, OfficerId, SchemeId,
};

/// Storage abstraction handing out atomic units of work.
///
/// Every read and write of the lending engine goes through a [`LendingTransaction`]; nothing is
/// cached between calls.
pub trait LendingStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn LendingTransaction + '_>, RepositoryError>;
}

/// One unit of work. Dropping it without [`commit`](LendingTransaction::commit) rolls back
/// every write made through it.
pub trait LendingTransaction {
    fn insert_application(
        &mut self,
        application: NewLoanApplication,
    ) -> Result<LoanApplication, RepositoryError>;
    fn application(&mut self, id: ApplicationId)
        -> Result<Option<LoanApplication>, RepositoryError>;
    fn applications(
        &mut self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<LoanApplication>, RepositoryError>;
    /// Conditional update: fails with [`RepositoryError::StaleWrite`] unless the stored row still
    /// carries `application.version`. Returns the row with its bumped version.
    fn update_application(
        &mut self,
        application: &LoanApplication,
    ) -> Result<LoanApplication, RepositoryError>;

    fn insert_document(&mut self, document: NewDocument) -> Result<Document, RepositoryError>;
    fn documents(&mut self, application_id: ApplicationId)
        -> Result<Vec<Document>, RepositoryError>;

    fn insert_installment(
        &mut self,
        installment: NewInstallment,
    ) -> Result<Installment, RepositoryError>;
    fn installments(
        &mut self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<Installment>, RepositoryError>;
    fn update_installment(&mut self, installment: &Installment) -> Result<(), RepositoryError>;

    fn insert_officer(&mut self, identity: Identity) -> Result<LoanOfficer, RepositoryError>;
    fn officer(&mut self, id: OfficerId) -> Result<Option<LoanOfficer>, RepositoryError>;
    fn officers(&mut self, active_only: bool) -> Result<Vec<LoanOfficer>, RepositoryError>;
    fn update_officer(&mut self, officer: &LoanOfficer) -> Result<(), RepositoryError>;
    fn delete_officer(&mut self, id: OfficerId) -> Result<(), RepositoryError>;

    fn insert_scheme(&mut self, scheme: NewLoanScheme) -> Result<LoanScheme, RepositoryError>;
    fn scheme(&mut self, id: SchemeId) -> Result<Option<LoanScheme>, RepositoryError>;
    fn update_scheme(&mut self, scheme: &LoanScheme) -> Result<(), RepositoryError>;
    fn delete_scheme(&mut self, id: SchemeId) -> Result<(), RepositoryError>;

    fn insert_customer(&mut self, identity: Identity) -> Result<Customer, RepositoryError>;
    fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;

    fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Row filter for applications. Unset fields match everything; an empty status list matches
/// every status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationFilter {
    pub customer_id: Option<CustomerId>,
    pub officer_id: Option<OfficerId>,
    pub scheme_id: Option<SchemeId>,
    pub statuses: Vec<LoanApplicationStatus>,
    pub npa: Option<bool>,
}

impl ApplicationFilter {
    pub fn customer(mut self, id: CustomerId) -> Self {
        self.customer_id = Some(id);
        self
    }

    pub fn officer(mut self, id: OfficerId) -> Self {
        self.officer_id = Some(id);
        self
    }

    pub fn scheme(mut self, id: SchemeId) -> Self {
        self.scheme_id = Some(id);
        self
    }

    pub fn statuses(mut self, statuses: &[LoanApplicationStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn open(self) -> Self {
        self.statuses(&LoanApplicationStatus::OPEN)
    }

    pub fn npa(mut self, flagged: bool) -> Self {
        self.npa = Some(flagged);
        self
    }

    pub fn matches(&self, application: &LoanApplication) -> bool {
        self.customer_id
            .map_or(true, |id| application.customer_id == id)
            && self
                .officer_id
                .map_or(true, |id| application.loan_officer_id == id)
            && self
                .scheme_id
                .map_or(true, |id| application.loan_scheme_id == id)
            && (self.statuses.is_empty() || self.statuses.contains(&application.status))
            && self.npa.map_or(true, |flag| application.is_npa == flag)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DueDateOrder {
    #[default]
    Ascending,
    Descending,
}

/// Row filter for installments. Rows are ordered by due date with the id as tie-breaker;
/// `Descending` reverses both keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallmentFilter {
    pub application_id: Option<ApplicationId>,
    pub status: Option<InstallmentStatus>,
    /// Strictly before.
    pub due_before: Option<DateTime<Utc>>,
    /// Inclusive lower bound.
    pub due_from: Option<DateTime<Utc>>,
    pub order: DueDateOrder,
    pub limit: Option<usize>,
}

impl InstallmentFilter {
    pub fn for_application(id: ApplicationId) -> Self {
        Self {
            application_id: Some(id),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: InstallmentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn due_before(mut self, instant: DateTime<Utc>) -> Self {
        self.due_before = Some(instant);
        self
    }

    pub fn due_from(mut self, instant: DateTime<Utc>) -> Self {
        self.due_from = Some(instant);
        self
    }

    pub fn order(mut self, order: DueDateOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, installment: &Installment) -> bool {
        self.application_id
            .map_or(true, |id| installment.loan_application_id == id)
            && self.status.map_or(true, |status| installment.status == status)
            && self
                .due_before
                .map_or(true, |bound| installment.due_date < bound)
            && self.due_from.map_or(true, |bound| installment.due_date >= bound)
    }

    /// Sorts and truncates rows that already passed [`matches`](Self::matches).
    pub fn arrange(&self, rows: &mut Vec<Installment>) {
        rows.sort_by(|a, b| {
            let ordering = a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id));
            match self.order {
                DueDateOrder::Ascending => ordering,
                DueDateOrder::Descending => ordering.reverse(),
            }
        });
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified by a concurrent unit of work")]
    StaleWrite,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
