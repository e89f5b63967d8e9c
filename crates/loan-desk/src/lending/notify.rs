use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, Customer, Installment};

/// Outbound delivery hook (e-mail, SMS, ...). Delivery is best-effort: callers log failures and
/// never roll back committed state because of them.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CollateralRequested,
    LoanApproved,
    ApplicationRejected,
    CollateralExpired,
    InstallmentDue,
}

/// `(recipient, subject, body)` plus the routing metadata tests and adapters key on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub application_id: ApplicationId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient rejected: {0}")]
    Recipient(String),
}

/// What happened to the notification attached to a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum NotificationStatus {
    NotRequired,
    Sent,
    Failed(String),
}

/// Deliver and fold the result into a [`NotificationStatus`], logging failures.
pub(crate) fn dispatch<N: Notifier + ?Sized>(
    notifier: &N,
    notification: Notification,
) -> NotificationStatus {
    let kind = notification.kind;
    let application_id = notification.application_id;
    match notifier.send(notification) {
        Ok(()) => NotificationStatus::Sent,
        Err(error) => {
            tracing::warn!(%application_id, ?kind, %error, "notification delivery failed");
            NotificationStatus::Failed(error.to_string())
        }
    }
}

pub(crate) fn collateral_requested(
    customer: &Customer,
    application_id: ApplicationId,
    deadline_days: i64,
) -> Notification {
    Notification {
        kind: NotificationKind::CollateralRequested,
        application_id,
        recipient: customer.identity.email.clone(),
        subject: "Loan Approval, Pending Collateral".to_string(),
        body: format!(
            "Dear {},\n\nYour loan application (ID: {}) has been approved. Please upload your \
             collateral documents within {} days, otherwise the application will be rejected.\n",
            customer.identity.name, application_id, deadline_days
        ),
    }
}

pub(crate) fn loan_approved(customer: &Customer, application_id: ApplicationId) -> Notification {
    Notification {
        kind: NotificationKind::LoanApproved,
        application_id,
        recipient: customer.identity.email.clone(),
        subject: "Loan Approved!".to_string(),
        body: format!(
            "Dear {},\n\nCongratulations! Your loan application (ID: {}) has been approved. \
             Log in to review your installment schedule.\n",
            customer.identity.name, application_id
        ),
    }
}

pub(crate) fn application_rejected(
    customer: &Customer,
    application_id: ApplicationId,
) -> Notification {
    Notification {
        kind: NotificationKind::ApplicationRejected,
        application_id,
        recipient: customer.identity.email.clone(),
        subject: "Loan Application Rejected".to_string(),
        body: format!(
            "Dear {},\n\nYour loan application (ID: {}) was not approved. You may apply for \
             another loan at any time.\n",
            customer.identity.name, application_id
        ),
    }
}

pub(crate) fn collateral_expired(
    customer: &Customer,
    application_id: ApplicationId,
    deadline_days: i64,
) -> Notification {
    Notification {
        kind: NotificationKind::CollateralExpired,
        application_id,
        recipient: customer.identity.email.clone(),
        subject: "Loan Rejection due to Pending Collateral".to_string(),
        body: format!(
            "Dear {},\n\nYour loan application (ID: {}) has been rejected because collateral \
             documents were not uploaded within {} days.\n",
            customer.identity.name, application_id, deadline_days
        ),
    }
}

pub(crate) fn installment_due(customer: &Customer, installment: &Installment) -> Notification {
    let due = format_due(installment.due_date);
    Notification {
        kind: NotificationKind::InstallmentDue,
        application_id: installment.loan_application_id,
        recipient: customer.identity.email.clone(),
        subject: "Loan Payment Reminder".to_string(),
        body: format!(
            "Dear {},\n\nYour installment of ${:.2} for loan application {} is due on {}.\n",
            customer.identity.name,
            installment.amount_to_be_paid,
            installment.loan_application_id,
            due
        ),
    }
}

fn format_due(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d").to_string()
}
