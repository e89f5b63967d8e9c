//! Loan application lifecycle: submission, officer assignment, two-step approval, installment
//! generation, payments and the delinquency, reminder and collateral-expiry sweeps.
//!
//! All state goes through a [`LendingStore`]; every operation opens its own unit of work and
//! notifications are dispatched only after it commits.

pub mod balancer;
pub mod catalog;
pub mod domain;
pub mod intake;
mod lifecycle;
pub mod memory;
pub mod notify;
mod payments;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod sweeps;

#[cfg(test)]
mod tests;

pub use balancer::OfficerLoad;
pub use catalog::SchemeChanges;
pub use domain::{
    ApplicationDetails, ApplicationId, Caller, Customer, CustomerId, Document, DocumentCategory,
    Identity, Installment, InstallmentStatus, LoanApplication, LoanApplicationStatus, LoanOfficer,
    LoanScheme, NewLoanScheme, OfficerId, Role, SchemeCategory, SchemeId, UploadedFile,
};
pub use intake::{DocumentIntake, InMemoryDocumentIntake, IntakeError};
pub use memory::InMemoryLendingStore;
pub use notify::{Notification, NotificationError, NotificationKind, NotificationStatus, Notifier};
pub use payments::PaymentOutcome;
pub use repository::{LendingStore, LendingTransaction, RepositoryError};
pub use router::lending_router;
pub use schedule::{level_installment, RepaymentPlan, SchedulePeriod};
pub use scheduler::{SchedulerConfig, SchedulerHandle};
pub use service::{ErrorClass, LendingError, LendingPolicy, LendingService, TransitionReceipt};
pub use sweeps::{
    CollateralSweepReport, NpaSweepReport, ReminderSweepReport, SweepKind, SweepSummary,
};
