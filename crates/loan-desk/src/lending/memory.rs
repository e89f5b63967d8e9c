use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    ApplicationId, Customer, CustomerId, Document, DocumentId, Identity, Installment,
    InstallmentId, InstallmentStatus, LoanApplication, LoanApplicationStatus, LoanOfficer,
    LoanScheme, NewDocument, NewInstallment, NewLoanApplication, NewLoanScheme, OfficerId,
    SchemeId,
};
use super::repository::{
    ApplicationFilter, InstallmentFilter, LendingStore, LendingTransaction, RepositoryError,
};

#[derive(Debug, Clone, Default)]
struct Sequences {
    application: u64,
    document: u64,
    installment: u64,
    officer: u64,
    scheme: u64,
    customer: u64,
}

fn next(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    sequences: Sequences,
    applications: BTreeMap<ApplicationId, LoanApplication>,
    documents: BTreeMap<DocumentId, Document>,
    installments: BTreeMap<InstallmentId, Installment>,
    officers: BTreeMap<OfficerId, LoanOfficer>,
    schemes: BTreeMap<SchemeId, LoanScheme>,
    customers: BTreeMap<CustomerId, Customer>,
}

/// Process-local store used by the API binary, the demo and the tests.
///
/// A transaction holds the table lock for its whole lifetime and works on a private copy, so
/// units of work are serialized and a dropped transaction leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLendingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LendingStore for InMemoryLendingStore {
    fn begin(&self) -> Result<Box<dyn LendingTransaction + '_>, RepositoryError> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))?;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    working: Tables,
}

impl LendingTransaction for MemoryTransaction<'_> {
    fn insert_application(
        &mut self,
        application: NewLoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        let id = ApplicationId(next(&mut self.working.sequences.application));
        let row = LoanApplication {
            id,
            customer_id: application.customer_id,
            loan_scheme_id: application.loan_scheme_id,
            loan_officer_id: application.loan_officer_id,
            amount: application.amount,
            status: LoanApplicationStatus::Pending,
            application_date: application.application_date,
            decision_date: None,
            is_npa: false,
            version: 1,
        };
        self.working.applications.insert(id, row.clone());
        Ok(row)
    }

    fn application(
        &mut self,
        id: ApplicationId,
    ) -> Result<Option<LoanApplication>, RepositoryError> {
        Ok(self.working.applications.get(&id).cloned())
    }

    fn applications(
        &mut self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<LoanApplication>, RepositoryError> {
        Ok(self
            .working
            .applications
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    fn update_application(
        &mut self,
        application: &LoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        let stored = self
            .working
            .applications
            .get_mut(&application.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != application.version {
            return Err(RepositoryError::StaleWrite);
        }
        let mut updated = application.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn insert_document(&mut self, document: NewDocument) -> Result<Document, RepositoryError> {
        if !self
            .working
            .applications
            .contains_key(&document.loan_application_id)
        {
            return Err(RepositoryError::NotFound);
        }
        let id = DocumentId(next(&mut self.working.sequences.document));
        let row = Document {
            id,
            loan_application_id: document.loan_application_id,
            document_type: document.document_type,
            url: document.url,
        };
        self.working.documents.insert(id, row.clone());
        Ok(row)
    }

    fn documents(
        &mut self,
        application_id: ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        Ok(self
            .working
            .documents
            .values()
            .filter(|row| row.loan_application_id == application_id)
            .cloned()
            .collect())
    }

    fn insert_installment(
        &mut self,
        installment: NewInstallment,
    ) -> Result<Installment, RepositoryError> {
        if !self
            .working
            .applications
            .contains_key(&installment.loan_application_id)
        {
            return Err(RepositoryError::NotFound);
        }
        let id = InstallmentId(next(&mut self.working.sequences.installment));
        let row = Installment {
            id,
            loan_application_id: installment.loan_application_id,
            amount_to_be_paid: installment.amount_to_be_paid,
            due_date: installment.due_date,
            payment_date: None,
            status: InstallmentStatus::Pending,
        };
        self.working.installments.insert(id, row.clone());
        Ok(row)
    }

    fn installments(
        &mut self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<Installment>, RepositoryError> {
        let mut rows: Vec<Installment> = self
            .working
            .installments
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        filter.arrange(&mut rows);
        Ok(rows)
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<(), RepositoryError> {
        let stored = self
            .working
            .installments
            .get_mut(&installment.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status == InstallmentStatus::Paid {
            return Err(RepositoryError::StaleWrite);
        }
        *stored = installment.clone();
        Ok(())
    }

    fn insert_officer(&mut self, identity: Identity) -> Result<LoanOfficer, RepositoryError> {
        if email_taken(&self.working, &identity.email) {
            return Err(RepositoryError::Conflict);
        }
        let id = OfficerId(next(&mut self.working.sequences.officer));
        let row = LoanOfficer { id, identity };
        self.working.officers.insert(id, row.clone());
        Ok(row)
    }

    fn officer(&mut self, id: OfficerId) -> Result<Option<LoanOfficer>, RepositoryError> {
        Ok(self.working.officers.get(&id).cloned())
    }

    fn officers(&mut self, active_only: bool) -> Result<Vec<LoanOfficer>, RepositoryError> {
        Ok(self
            .working
            .officers
            .values()
            .filter(|officer| !active_only || officer.is_active())
            .cloned()
            .collect())
    }

    fn update_officer(&mut self, officer: &LoanOfficer) -> Result<(), RepositoryError> {
        let stored = self
            .working
            .officers
            .get_mut(&officer.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = officer.clone();
        Ok(())
    }

    fn delete_officer(&mut self, id: OfficerId) -> Result<(), RepositoryError> {
        self.working
            .officers
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn insert_scheme(&mut self, scheme: NewLoanScheme) -> Result<LoanScheme, RepositoryError> {
        let id = SchemeId(next(&mut self.working.sequences.scheme));
        let row = LoanScheme {
            id,
            name: scheme.name,
            category: scheme.category,
            interest_rate: scheme.interest_rate,
            tenure: scheme.tenure,
        };
        self.working.schemes.insert(id, row.clone());
        Ok(row)
    }

    fn scheme(&mut self, id: SchemeId) -> Result<Option<LoanScheme>, RepositoryError> {
        Ok(self.working.schemes.get(&id).cloned())
    }

    fn update_scheme(&mut self, scheme: &LoanScheme) -> Result<(), RepositoryError> {
        let stored = self
            .working
            .schemes
            .get_mut(&scheme.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = scheme.clone();
        Ok(())
    }

    fn delete_scheme(&mut self, id: SchemeId) -> Result<(), RepositoryError> {
        self.working
            .schemes
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn insert_customer(&mut self, identity: Identity) -> Result<Customer, RepositoryError> {
        if email_taken(&self.working, &identity.email) {
            return Err(RepositoryError::Conflict);
        }
        let id = CustomerId(next(&mut self.working.sequences.customer));
        let row = Customer { id, identity };
        self.working.customers.insert(id, row.clone());
        Ok(row)
    }

    fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.working.customers.get(&id).cloned())
    }

    fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

// Emails are unique across every user table, mirroring the shared users table.
fn email_taken(tables: &Tables, email: &str) -> bool {
    tables
        .officers
        .values()
        .map(|officer| &officer.identity)
        .chain(tables.customers.values().map(|customer| &customer.identity))
        .any(|identity| identity.email.eq_ignore_ascii_case(email))
}
