use std::sync::{Arc, Mutex};

use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::lending::domain::{
    ApplicationId, Customer, CustomerId, Document, Identity, Installment, LoanApplication,
    LoanOfficer, LoanScheme, NewDocument, NewInstallment, NewLoanApplication, NewLoanScheme,
    OfficerId, SchemeCategory, SchemeId, UploadedFile,
};
use crate::lending::intake::InMemoryDocumentIntake;
use crate::lending::memory::InMemoryLendingStore;
use crate::lending::notify::{Notification, NotificationError, NotificationKind, Notifier};
use crate::lending::repository::{
    ApplicationFilter, InstallmentFilter, LendingStore, LendingTransaction, RepositoryError,
};
use crate::lending::router::{USER_ID_HEADER, USER_ROLE_HEADER};
use crate::lending::{LendingPolicy, LendingService, SchedulePeriod, TransitionReceipt};

pub(super) type MemoryService =
    LendingService<InMemoryLendingStore, MemoryNotifier, InMemoryDocumentIntake>;

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn kinds(&self) -> Vec<NotificationKind> {
        self.sent().into_iter().map(|n| n.kind).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("mail relay offline".to_string()))
    }
}

/// Bounces mail for one recipient and records everything else.
pub(super) struct BouncingNotifier {
    pub(super) bounce: String,
    pub(super) delivered: MemoryNotifier,
}

impl BouncingNotifier {
    pub(super) fn new(bounce: &str) -> Self {
        Self {
            bounce: bounce.to_string(),
            delivered: MemoryNotifier::default(),
        }
    }
}

impl Notifier for BouncingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        if notification.recipient == self.bounce {
            return Err(NotificationError::Recipient(notification.recipient));
        }
        self.delivered.send(notification)
    }
}

/// Which insert a [`FlakyStore`] unit of work refuses, counted from 1.
#[derive(Debug, Clone, Copy)]
pub(super) enum FailingInsert {
    Installment(usize),
    Document(usize),
}

/// Delegates to an in-memory store but fails one chosen insert of every unit of work.
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryLendingStore,
    pub(super) fail_at: FailingInsert,
}

impl LendingStore for FlakyStore {
    fn begin(&self) -> Result<Box<dyn LendingTransaction + '_>, RepositoryError> {
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin()?,
            fail_at: self.fail_at,
            installments: 0,
            documents: 0,
        }))
    }
}

struct FlakyTransaction<'a> {
    inner: Box<dyn LendingTransaction + 'a>,
    fail_at: FailingInsert,
    installments: usize,
    documents: usize,
}

impl LendingTransaction for FlakyTransaction<'_> {
    fn insert_application(
        &mut self,
        application: NewLoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        self.inner.insert_application(application)
    }

    fn application(
        &mut self,
        id: ApplicationId,
    ) -> Result<Option<LoanApplication>, RepositoryError> {
        self.inner.application(id)
    }

    fn applications(
        &mut self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<LoanApplication>, RepositoryError> {
        self.inner.applications(filter)
    }

    fn update_application(
        &mut self,
        application: &LoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        self.inner.update_application(application)
    }

    fn insert_document(&mut self, document: NewDocument) -> Result<Document, RepositoryError> {
        self.documents += 1;
        if let FailingInsert::Document(n) = self.fail_at {
            if self.documents == n {
                return Err(RepositoryError::Unavailable("disk full".to_string()));
            }
        }
        self.inner.insert_document(document)
    }

    fn documents(
        &mut self,
        application_id: ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        self.inner.documents(application_id)
    }

    fn insert_installment(
        &mut self,
        installment: NewInstallment,
    ) -> Result<Installment, RepositoryError> {
        self.installments += 1;
        if let FailingInsert::Installment(n) = self.fail_at {
            if self.installments == n {
                return Err(RepositoryError::Unavailable("disk full".to_string()));
            }
        }
        self.inner.insert_installment(installment)
    }

    fn installments(
        &mut self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<Installment>, RepositoryError> {
        self.inner.installments(filter)
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<(), RepositoryError> {
        self.inner.update_installment(installment)
    }

    fn insert_officer(&mut self, identity: Identity) -> Result<LoanOfficer, RepositoryError> {
        self.inner.insert_officer(identity)
    }

    fn officer(&mut self, id: OfficerId) -> Result<Option<LoanOfficer>, RepositoryError> {
        self.inner.officer(id)
    }

    fn officers(&mut self, active_only: bool) -> Result<Vec<LoanOfficer>, RepositoryError> {
        self.inner.officers(active_only)
    }

    fn update_officer(&mut self, officer: &LoanOfficer) -> Result<(), RepositoryError> {
        self.inner.update_officer(officer)
    }

    fn delete_officer(&mut self, id: OfficerId) -> Result<(), RepositoryError> {
        self.inner.delete_officer(id)
    }

    fn insert_scheme(&mut self, scheme: NewLoanScheme) -> Result<LoanScheme, RepositoryError> {
        self.inner.insert_scheme(scheme)
    }

    fn scheme(&mut self, id: SchemeId) -> Result<Option<LoanScheme>, RepositoryError> {
        self.inner.scheme(id)
    }

    fn update_scheme(&mut self, scheme: &LoanScheme) -> Result<(), RepositoryError> {
        self.inner.update_scheme(scheme)
    }

    fn delete_scheme(&mut self, id: SchemeId) -> Result<(), RepositoryError> {
        self.inner.delete_scheme(id)
    }

    fn insert_customer(&mut self, identity: Identity) -> Result<Customer, RepositoryError> {
        self.inner.insert_customer(identity)
    }

    fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        self.inner.customer(id)
    }

    fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let FlakyTransaction { inner, .. } = *self;
        inner.commit()
    }
}

pub(super) struct UnavailableStore;

impl LendingStore for UnavailableStore {
    fn begin(&self) -> Result<Box<dyn LendingTransaction + '_>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".to_string()))
    }
}

/// Rows every scenario starts from: one customer, two active officers, a 12% / 12 month scheme.
#[derive(Debug, Clone)]
pub(super) struct Seed {
    pub(super) customer: Customer,
    pub(super) second_customer: Customer,
    pub(super) officers: Vec<LoanOfficer>,
    pub(super) scheme: LoanScheme,
}

pub(super) fn seed<S: LendingStore>(store: &S) -> Seed {
    let mut tx = store.begin().expect("begin");
    let customer = tx
        .insert_customer(Identity::new("Asha Verma", "asha@example.com"))
        .expect("customer");
    let second_customer = tx
        .insert_customer(Identity::new("Kabir Rao", "kabir@example.com"))
        .expect("customer");
    let officers = vec![
        tx.insert_officer(Identity::new("Ravi Menon", "ravi@bank.example"))
            .expect("officer"),
        tx.insert_officer(Identity::new("Leela Nair", "leela@bank.example"))
            .expect("officer"),
    ];
    let scheme = tx
        .insert_scheme(NewLoanScheme {
            name: "Personal Loan".to_string(),
            category: SchemeCategory::Retail,
            interest_rate: 12.0,
            tenure: 12,
        })
        .expect("scheme");
    tx.commit().expect("commit");
    Seed {
        customer,
        second_customer,
        officers,
        scheme,
    }
}

pub(super) struct Fixture {
    pub(super) service: Arc<MemoryService>,
    pub(super) store: InMemoryLendingStore,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) intake: Arc<InMemoryDocumentIntake>,
    pub(super) seed: Seed,
}

pub(super) fn build_service() -> Fixture {
    build_service_with(LendingPolicy::default())
}

/// Installments one day apart so sweeps can be driven with a shifted `now`.
pub(super) fn daily_policy() -> LendingPolicy {
    LendingPolicy {
        installment_period: SchedulePeriod::Fixed(chrono::Duration::days(1)),
        ..LendingPolicy::default()
    }
}

pub(super) fn build_service_with(policy: LendingPolicy) -> Fixture {
    let store = InMemoryLendingStore::new();
    let seed = seed(&store);
    let notifier = Arc::new(MemoryNotifier::default());
    let intake = Arc::new(InMemoryDocumentIntake::new());
    let service = Arc::new(LendingService::new(
        Arc::new(store.clone()),
        notifier.clone(),
        intake.clone(),
        policy,
    ));
    Fixture {
        service,
        store,
        notifier,
        intake,
        seed,
    }
}

pub(super) fn personal_documents() -> Vec<UploadedFile> {
    vec![
        UploadedFile::new("pan-card.pdf", b"PAN".to_vec()),
        UploadedFile::new("salary-slip.pdf", b"SALARY".to_vec()),
    ]
}

pub(super) fn collateral_documents() -> Vec<UploadedFile> {
    vec![UploadedFile::new("property-deed.pdf", b"DEED".to_vec())]
}

impl Fixture {
    pub(super) fn customer_id(&self) -> CustomerId {
        self.seed.customer.id
    }

    pub(super) fn apply(&self, amount: f64) -> LoanApplication {
        self.service
            .apply_for_loan(
                self.customer_id(),
                self.seed.scheme.id,
                amount,
                personal_documents(),
            )
            .expect("application accepted")
            .application
    }

    pub(super) fn awaiting_collateral(&self, amount: f64) -> LoanApplication {
        let application = self.apply(amount);
        self.service
            .approve_initial(application.id, application.loan_officer_id, true)
            .expect("initial approval")
            .application
    }

    pub(super) fn collateral_uploaded(&self, amount: f64) -> LoanApplication {
        let application = self.awaiting_collateral(amount);
        self.service
            .upload_collateral(application.id, self.customer_id(), collateral_documents())
            .expect("collateral upload")
            .application
    }

    pub(super) fn approved(&self, amount: f64) -> TransitionReceipt {
        let application = self.collateral_uploaded(amount);
        self.service
            .approve_collateral(application.id, application.loan_officer_id, true)
            .expect("final approval")
    }

    pub(super) fn application(&self, id: ApplicationId) -> LoanApplication {
        let mut tx = self.store.begin().expect("begin");
        tx.application(id).expect("query").expect("application present")
    }

    pub(super) fn installments(&self, id: ApplicationId) -> Vec<Installment> {
        let mut tx = self.store.begin().expect("begin");
        tx.installments(&InstallmentFilter::for_application(id))
            .expect("query")
    }

    pub(super) fn set_decision_date(&self, id: ApplicationId, decided: DateTime<Utc>) {
        let mut tx = self.store.begin().expect("begin");
        let mut application = tx.application(id).expect("query").expect("present");
        application.decision_date = Some(decided);
        tx.update_application(&application).expect("update");
        tx.commit().expect("commit");
    }
}

pub(super) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}

pub(super) fn json_request(method: &str, uri: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(&body).expect("serialize body"),
        ))
        .expect("request")
}

pub(super) fn as_user(
    mut request: Request<axum::body::Body>,
    user_id: u64,
    role: &str,
) -> Request<axum::body::Body> {
    let headers = request.headers_mut();
    headers.insert(
        USER_ID_HEADER,
        user_id.to_string().parse().expect("header value"),
    );
    headers.insert(USER_ROLE_HEADER, role.parse().expect("header value"));
    request
}

pub(super) fn empty_request(method: &str, uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .expect("request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
