use loan_desk::lending::{
    Customer, DocumentIntake, Identity, LendingError, LendingService, LendingStore, LoanOfficer,
    LoanScheme, NewLoanScheme, Notification, NotificationError, Notifier, SchemeCategory,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Writes every notification to the log instead of a mail relay.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            application_id = %notification.application_id,
            kind = ?notification.kind,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryOutbox {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl Notifier for InMemoryOutbox {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}

impl InMemoryOutbox {
    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DeskSeed {
    pub(crate) customer: Customer,
    pub(crate) officers: Vec<LoanOfficer>,
    pub(crate) schemes: Vec<LoanScheme>,
}

/// Register the sample officers, customer and schemes used by `demo` and `serve --seed`.
pub(crate) fn seed_desk<S, N, D>(
    service: &LendingService<S, N, D>,
) -> Result<DeskSeed, LendingError>
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let officers = vec![
        service.register_officer(Identity::new("Meera Kapoor", "meera@bank.example"))?,
        service.register_officer(Identity::new("Tomas Reyes", "tomas@bank.example"))?,
    ];
    let customer = service.register_customer(Identity::new("Asha Rao", "asha@example.com"))?;
    let schemes = vec![
        service.create_scheme(NewLoanScheme {
            name: "Personal Loan".to_string(),
            category: SchemeCategory::Retail,
            interest_rate: 12.0,
            tenure: 12,
        })?,
        service.create_scheme(NewLoanScheme {
            name: "Working Capital".to_string(),
            category: SchemeCategory::Corporate,
            interest_rate: 9.5,
            tenure: 24,
        })?,
    ];

    info!(
        officers = officers.len(),
        schemes = schemes.len(),
        customer_id = %customer.id,
        "seeded loan desk"
    );
    Ok(DeskSeed {
        customer,
        officers,
        schemes,
    })
}
