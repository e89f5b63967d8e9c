//! Level-payment (EMI) schedules.

use chrono::{DateTime, Months, Utc};

use super::domain::{Installment, LoanApplication, LoanScheme, NewInstallment};
use super::repository::{LendingTransaction, RepositoryError};

/// Spacing between consecutive due dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePeriod {
    CalendarMonth,
    /// Fixed spacing, used to make schedules observable in minutes instead of months.
    Fixed(chrono::Duration),
}

impl SchedulePeriod {
    /// Due date of the `n`-th installment (1-based) counted from `start`.
    pub fn nth_due(&self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            SchedulePeriod::CalendarMonth => start.checked_add_months(Months::new(n)),
            SchedulePeriod::Fixed(step) => step
                .checked_mul(i32::try_from(n).ok()?)
                .and_then(|offset| start.checked_add_signed(offset)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("principal must be positive, got {0}")]
    InvalidPrincipal(f64),
    #[error("interest rate must be non-negative, got {0}")]
    InvalidRate(f64),
    #[error("tenure must be at least one period")]
    EmptyTenure,
    #[error("due date overflow at installment {0}")]
    DateOverflow(u32),
}

/// Periodic rate for an annual percentage rate.
pub fn monthly_rate(annual_percent: f64) -> f64 {
    annual_percent / 12.0 / 100.0
}

/// `principal * r / (1 - (1 + r)^-tenure)`, or straight-line repayment when `r` is zero.
pub fn level_installment(
    principal: f64,
    annual_percent: f64,
    tenure: u32,
) -> Result<f64, ScheduleError> {
    if !(principal.is_finite() && principal > 0.0) {
        return Err(ScheduleError::InvalidPrincipal(principal));
    }
    if !(annual_percent.is_finite() && annual_percent >= 0.0) {
        return Err(ScheduleError::InvalidRate(annual_percent));
    }
    if tenure == 0 {
        return Err(ScheduleError::EmptyTenure);
    }

    let rate = monthly_rate(annual_percent);
    if rate == 0.0 {
        return Ok(principal / f64::from(tenure));
    }
    let periods = i32::try_from(tenure).unwrap_or(i32::MAX);
    Ok(principal * rate / (1.0 - (1.0 + rate).powi(-periods)))
}

/// Computed schedule before it is written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentPlan {
    pub emi: f64,
    pub due_dates: Vec<DateTime<Utc>>,
}

impl RepaymentPlan {
    pub fn build(
        principal: f64,
        scheme: &LoanScheme,
        start: DateTime<Utc>,
        period: SchedulePeriod,
    ) -> Result<Self, ScheduleError> {
        let emi = level_installment(principal, scheme.interest_rate, scheme.tenure)?;
        let due_dates = (1..=scheme.tenure)
            .map(|n| period.nth_due(start, n).ok_or(ScheduleError::DateOverflow(n)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { emi, due_dates })
    }

    pub fn total(&self) -> f64 {
        self.emi * self.due_dates.len() as f64
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum MaterializeError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Writes one row per due date inside the caller's unit of work. A failed insert returns early;
/// the caller drops the transaction so no partial schedule survives.
pub(crate) fn materialize(
    tx: &mut dyn LendingTransaction,
    application: &LoanApplication,
    scheme: &LoanScheme,
    start: DateTime<Utc>,
    period: SchedulePeriod,
) -> Result<Vec<Installment>, MaterializeError> {
    let plan = RepaymentPlan::build(application.amount, scheme, start, period)?;
    let mut rows = Vec::with_capacity(plan.due_dates.len());
    for due_date in plan.due_dates {
        rows.push(tx.insert_installment(NewInstallment {
            loan_application_id: application.id,
            amount_to_be_paid: plan.emi,
            due_date,
        })?);
    }
    Ok(rows)
}
