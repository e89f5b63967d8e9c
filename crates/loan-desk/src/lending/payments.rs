use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use super::domain::{
    ApplicationId, CustomerId, Installment, InstallmentStatus, LoanApplication,
    LoanApplicationStatus,
};
use super::intake::DocumentIntake;
use super::lifecycle::ensure_owner;
use super::notify::Notifier;
use super::repository::{DueDateOrder, InstallmentFilter, LendingStore};
use super::service::{advance, load_application, LendingError, LendingService};

/// What a payment request did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// The earliest pending installment was settled.
    Paid {
        installment: Installment,
        remaining: usize,
    },
    /// Nothing was left to pay; the loan is (now) `PaidOff`.
    NoPendingInstallments { application: LoanApplication },
}

impl<S, N, D> LendingService<S, N, D>
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    /// Settle the pending installment with the earliest due date. Once none remain the
    /// application moves to `PaidOff`; asking again reports the same outcome without writing.
    #[instrument(skip(self))]
    pub fn pay_nearest_installment(
        &self,
        customer_id: CustomerId,
        application_id: ApplicationId,
    ) -> Result<PaymentOutcome, LendingError> {
        let mut tx = self.store().begin()?;
        let mut application = load_application(&mut *tx, application_id)?;
        ensure_owner(&application, customer_id)?;

        let pending = tx.installments(
            &InstallmentFilter::for_application(application_id)
                .status(InstallmentStatus::Pending)
                .order(DueDateOrder::Ascending),
        )?;

        let Some(nearest) = pending.first() else {
            return match application.status {
                LoanApplicationStatus::PaidOff => {
                    Ok(PaymentOutcome::NoPendingInstallments { application })
                }
                LoanApplicationStatus::Approved => {
                    advance(&mut application, LoanApplicationStatus::PaidOff)?;
                    let application = tx.update_application(&application)?;
                    tx.commit()?;
                    info!(%application_id, "loan paid off");
                    Ok(PaymentOutcome::NoPendingInstallments { application })
                }
                actual => Err(LendingError::InvalidState {
                    application_id,
                    expected: LoanApplicationStatus::Approved,
                    actual,
                }),
            };
        };

        if application.status != LoanApplicationStatus::Approved {
            return Err(LendingError::InvalidState {
                application_id,
                expected: LoanApplicationStatus::Approved,
                actual: application.status,
            });
        }

        let mut installment = nearest.clone();
        installment.status = InstallmentStatus::Paid;
        installment.payment_date = Some(Utc::now());
        tx.update_installment(&installment)?;
        tx.commit()?;

        let remaining = pending.len() - 1;
        info!(
            %application_id,
            installment_id = %installment.id,
            remaining,
            "installment paid"
        );
        Ok(PaymentOutcome::Paid {
            installment,
            remaining,
        })
    }
}
