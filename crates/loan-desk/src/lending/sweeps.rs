//! Background sweeps over approved and waiting applications.
//!
//! Each sweep lists its candidates in one read, then handles every candidate in its own unit of
//! work. A failure on one candidate is logged and counted; the rest of the batch still runs.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    ApplicationId, Customer, Installment, InstallmentStatus, LoanApplicationStatus,
};
use super::intake::DocumentIntake;
use super::notify::{self, NotificationStatus, Notifier};
use super::repository::{ApplicationFilter, DueDateOrder, InstallmentFilter, LendingStore};
use super::service::{advance, load_application, load_customer, LendingError, LendingService};

/// Overdue pending installments needed to flag an application as non-performing.
pub const NPA_OVERDUE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NpaSweepReport {
    pub examined: usize,
    pub flagged: usize,
    pub cleared: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollateralSweepReport {
    pub examined: usize,
    pub rejected: usize,
    pub notifications_failed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderSweepReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Which sweep to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    Npa,
    Reminders,
    CollateralExpiry,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [
        SweepKind::Npa,
        SweepKind::Reminders,
        SweepKind::CollateralExpiry,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            SweepKind::Npa => "npa",
            SweepKind::Reminders => "installment_reminders",
            SweepKind::CollateralExpiry => "collateral_expiry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "sweep", rename_all = "snake_case")]
pub enum SweepSummary {
    Npa(NpaSweepReport),
    Reminders(ReminderSweepReport),
    CollateralExpiry(CollateralSweepReport),
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepSummary::Npa(r) => write!(
                f,
                "examined={} flagged={} cleared={} failed={}",
                r.examined, r.flagged, r.cleared, r.failed
            ),
            SweepSummary::Reminders(r) => write!(
                f,
                "examined={} sent={} failed={}",
                r.examined, r.sent, r.failed
            ),
            SweepSummary::CollateralExpiry(r) => write!(
                f,
                "examined={} rejected={} notifications_failed={} failed={}",
                r.examined, r.rejected, r.notifications_failed, r.failed
            ),
        }
    }
}

impl<S, N, D> LendingService<S, N, D>
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    pub fn run_sweep(
        &self,
        kind: SweepKind,
        now: DateTime<Utc>,
    ) -> Result<SweepSummary, LendingError> {
        Ok(match kind {
            SweepKind::Npa => SweepSummary::Npa(self.sweep_npa(now)?),
            SweepKind::Reminders => SweepSummary::Reminders(self.sweep_reminders(now)?),
            SweepKind::CollateralExpiry => {
                SweepSummary::CollateralExpiry(self.sweep_collateral_expiry(now)?)
            }
        })
    }

    /// Recompute `is_npa` for approved loans and for anything still flagged. An application is
    /// non-performing when its [`NPA_OVERDUE_THRESHOLD`] most recent overdue installments are all
    /// still pending; the flag clears again once that stops holding.
    pub fn sweep_npa(&self, now: DateTime<Utc>) -> Result<NpaSweepReport, LendingError> {
        let candidates: BTreeSet<ApplicationId> = {
            let mut tx = self.store().begin()?;
            let approved = tx.applications(
                &ApplicationFilter::default().statuses(&[LoanApplicationStatus::Approved]),
            )?;
            let flagged = tx.applications(&ApplicationFilter::default().npa(true))?;
            approved
                .into_iter()
                .chain(flagged)
                .map(|application| application.id)
                .collect()
        };

        let mut report = NpaSweepReport {
            examined: candidates.len(),
            ..NpaSweepReport::default()
        };
        for application_id in candidates {
            match self.refresh_npa(application_id, now) {
                Ok(Some(true)) => report.flagged += 1,
                Ok(Some(false)) => report.cleared += 1,
                Ok(None) => {}
                Err(error) => {
                    report.failed += 1;
                    warn!(%application_id, %error, "npa evaluation failed");
                }
            }
        }
        Ok(report)
    }

    /// `Some(new_flag)` when the flag changed.
    fn refresh_npa(
        &self,
        application_id: ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, LendingError> {
        let mut tx = self.store().begin()?;
        let mut application = load_application(&mut *tx, application_id)?;
        let overdue = tx.installments(
            &InstallmentFilter::for_application(application_id)
                .status(InstallmentStatus::Pending)
                .due_before(now)
                .order(DueDateOrder::Descending)
                .limit(NPA_OVERDUE_THRESHOLD),
        )?;
        let delinquent = application.status == LoanApplicationStatus::Approved
            && overdue.len() == NPA_OVERDUE_THRESHOLD;
        if delinquent == application.is_npa {
            return Ok(None);
        }

        application.is_npa = delinquent;
        tx.update_application(&application)?;
        tx.commit()?;
        if delinquent {
            warn!(%application_id, "application flagged as non-performing");
        } else {
            info!(%application_id, "non-performing flag cleared");
        }
        Ok(Some(delinquent))
    }

    /// Reject `PendingCollateral` applications whose collateral deadline passed, then notify the
    /// customer.
    pub fn sweep_collateral_expiry(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CollateralSweepReport, LendingError> {
        let deadline = self.policy().collateral_deadline;
        let candidates: Vec<ApplicationId> = {
            let mut tx = self.store().begin()?;
            tx.applications(
                &ApplicationFilter::default()
                    .statuses(&[LoanApplicationStatus::PendingCollateral]),
            )?
            .into_iter()
            .filter(|application| collateral_overdue(application.decision_date, deadline, now))
            .map(|application| application.id)
            .collect()
        };

        let mut report = CollateralSweepReport {
            examined: candidates.len(),
            ..CollateralSweepReport::default()
        };
        for application_id in candidates {
            match self.expire_collateral(application_id, now) {
                Ok(Some(status)) => {
                    report.rejected += 1;
                    if matches!(status, NotificationStatus::Failed(_)) {
                        report.notifications_failed += 1;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    report.failed += 1;
                    warn!(%application_id, %error, "collateral expiry failed");
                }
            }
        }
        Ok(report)
    }

    /// Re-checks the candidate inside its own unit of work; `None` when it moved on meanwhile.
    fn expire_collateral(
        &self,
        application_id: ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Option<NotificationStatus>, LendingError> {
        let deadline = self.policy().collateral_deadline;
        let mut tx = self.store().begin()?;
        let mut application = load_application(&mut *tx, application_id)?;
        if application.status != LoanApplicationStatus::PendingCollateral
            || !collateral_overdue(application.decision_date, deadline, now)
        {
            return Ok(None);
        }
        let customer = load_customer(&mut *tx, application.customer_id)?;

        advance(&mut application, LoanApplicationStatus::Rejected)?;
        tx.update_application(&application)?;
        tx.commit()?;
        info!(%application_id, "collateral deadline passed, application rejected");

        let notification =
            notify::collateral_expired(&customer, application_id, deadline.num_days());
        Ok(Some(notify::dispatch(self.notifier(), notification)))
    }

    /// Send one reminder per pending installment due on `now`'s UTC calendar day.
    pub fn sweep_reminders(&self, now: DateTime<Utc>) -> Result<ReminderSweepReport, LendingError> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let day_end = day_start + Duration::days(1);

        let mut report = ReminderSweepReport::default();
        let mut outbox: Vec<(Customer, Installment)> = Vec::new();
        {
            let mut tx = self.store().begin()?;
            let due_today = tx.installments(
                &InstallmentFilter::default()
                    .status(InstallmentStatus::Pending)
                    .due_from(day_start)
                    .due_before(day_end),
            )?;
            report.examined = due_today.len();
            for installment in due_today {
                let recipient = load_application(&mut *tx, installment.loan_application_id)
                    .and_then(|application| load_customer(&mut *tx, application.customer_id));
                match recipient {
                    Ok(customer) => outbox.push((customer, installment)),
                    Err(error) => {
                        report.failed += 1;
                        warn!(
                            installment_id = %installment.id,
                            %error,
                            "reminder recipient lookup failed"
                        );
                    }
                }
            }
        }

        for (customer, installment) in outbox {
            let notification = notify::installment_due(&customer, &installment);
            match notify::dispatch(self.notifier(), notification) {
                NotificationStatus::Failed(_) => report.failed += 1,
                _ => report.sent += 1,
            }
        }
        if report.examined > 0 {
            info!(sent = report.sent, failed = report.failed, "installment reminders processed");
        }
        Ok(report)
    }
}

fn collateral_overdue(
    decision_date: Option<DateTime<Utc>>,
    deadline: Duration,
    now: DateTime<Utc>,
) -> bool {
    decision_date
        .and_then(|decided| decided.checked_add_signed(deadline))
        .is_some_and(|expires| expires < now)
}
