//! Admin-side maintenance of schemes, officers and customers.

use serde::Deserialize;
use tracing::info;

use super::balancer::{self, OfficerLoad};
use super::domain::{
    Customer, Identity, LoanOfficer, LoanScheme, NewLoanScheme, OfficerId, SchemeCategory,
    SchemeId,
};
use super::intake::DocumentIntake;
use super::notify::Notifier;
use super::repository::{ApplicationFilter, LendingStore, LendingTransaction};
use super::service::{LendingError, LendingService};

/// Schemes must run for strictly more months than this.
pub const MIN_TENURE_EXCLUSIVE: u32 = 3;

/// Partial update for a scheme; unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemeChanges {
    pub name: Option<String>,
    pub category: Option<SchemeCategory>,
    pub interest_rate: Option<f64>,
    pub tenure: Option<u32>,
}

impl<S, N, D> LendingService<S, N, D>
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    pub fn create_scheme(&self, scheme: NewLoanScheme) -> Result<LoanScheme, LendingError> {
        validate_scheme(&scheme.name, scheme.interest_rate, scheme.tenure)?;
        let mut tx = self.store().begin()?;
        let scheme = tx.insert_scheme(scheme)?;
        tx.commit()?;
        info!(scheme_id = %scheme.id, name = %scheme.name, "loan scheme created");
        Ok(scheme)
    }

    /// Blocked while any open or approved application still references the scheme.
    pub fn update_scheme(
        &self,
        scheme_id: SchemeId,
        changes: SchemeChanges,
    ) -> Result<LoanScheme, LendingError> {
        let mut tx = self.store().begin()?;
        let mut scheme = tx
            .scheme(scheme_id)?
            .ok_or(LendingError::SchemeNotFound(scheme_id))?;
        ensure_scheme_free(&mut *tx, scheme_id)?;

        if let Some(name) = changes.name {
            scheme.name = name;
        }
        if let Some(category) = changes.category {
            scheme.category = category;
        }
        if let Some(rate) = changes.interest_rate {
            scheme.interest_rate = rate;
        }
        if let Some(tenure) = changes.tenure {
            scheme.tenure = tenure;
        }
        validate_scheme(&scheme.name, scheme.interest_rate, scheme.tenure)?;

        tx.update_scheme(&scheme)?;
        tx.commit()?;
        info!(%scheme_id, "loan scheme updated");
        Ok(scheme)
    }

    pub fn delete_scheme(&self, scheme_id: SchemeId) -> Result<(), LendingError> {
        let mut tx = self.store().begin()?;
        tx.scheme(scheme_id)?
            .ok_or(LendingError::SchemeNotFound(scheme_id))?;
        ensure_scheme_free(&mut *tx, scheme_id)?;
        tx.delete_scheme(scheme_id)?;
        tx.commit()?;
        info!(%scheme_id, "loan scheme deleted");
        Ok(())
    }

    pub fn register_officer(&self, identity: Identity) -> Result<LoanOfficer, LendingError> {
        let identity = validate_identity(identity)?;
        let mut tx = self.store().begin()?;
        let officer = tx.insert_officer(identity)?;
        tx.commit()?;
        info!(officer_id = %officer.id, "loan officer registered");
        Ok(officer)
    }

    /// Inactive officers keep their current applications but receive no new ones.
    pub fn set_officer_active(
        &self,
        officer_id: OfficerId,
        active: bool,
    ) -> Result<LoanOfficer, LendingError> {
        let mut tx = self.store().begin()?;
        let mut officer = tx
            .officer(officer_id)?
            .ok_or(LendingError::OfficerNotFound(officer_id))?;
        officer.identity.is_active = active;
        tx.update_officer(&officer)?;
        tx.commit()?;
        info!(%officer_id, active, "loan officer activation changed");
        Ok(officer)
    }

    /// Refused while the officer still has open applications.
    pub fn delete_officer(&self, officer_id: OfficerId) -> Result<(), LendingError> {
        let mut tx = self.store().begin()?;
        tx.officer(officer_id)?
            .ok_or(LendingError::OfficerNotFound(officer_id))?;
        let open = tx
            .applications(&ApplicationFilter::default().officer(officer_id).open())?
            .len();
        if open > 0 {
            return Err(LendingError::DependentApplications { count: open });
        }
        tx.delete_officer(officer_id)?;
        tx.commit()?;
        info!(%officer_id, "loan officer deleted");
        Ok(())
    }

    pub fn register_customer(&self, identity: Identity) -> Result<Customer, LendingError> {
        let identity = validate_identity(identity)?;
        let mut tx = self.store().begin()?;
        let customer = tx.insert_customer(identity)?;
        tx.commit()?;
        info!(customer_id = %customer.id, "customer registered");
        Ok(customer)
    }

    pub fn officer_loads(&self) -> Result<Vec<OfficerLoad>, LendingError> {
        let mut tx = self.store().begin()?;
        Ok(balancer::officer_loads(&mut *tx)?)
    }
}

fn ensure_scheme_free(
    tx: &mut dyn LendingTransaction,
    scheme_id: SchemeId,
) -> Result<(), LendingError> {
    let holding = tx
        .applications(&ApplicationFilter::default().scheme(scheme_id))?
        .into_iter()
        .filter(|application| application.status.holds_scheme())
        .count();
    if holding > 0 {
        return Err(LendingError::DependentApplications { count: holding });
    }
    Ok(())
}

fn validate_scheme(name: &str, interest_rate: f64, tenure: u32) -> Result<(), LendingError> {
    if name.trim().is_empty() {
        return Err(LendingError::InvalidScheme("name must not be empty".to_string()));
    }
    if !(interest_rate.is_finite() && interest_rate > 0.0) {
        return Err(LendingError::InvalidScheme(format!(
            "interest rate must be positive, got {interest_rate}"
        )));
    }
    if tenure <= MIN_TENURE_EXCLUSIVE {
        return Err(LendingError::InvalidScheme(format!(
            "tenure must exceed {MIN_TENURE_EXCLUSIVE} months, got {tenure}"
        )));
    }
    Ok(())
}

fn validate_identity(mut identity: Identity) -> Result<Identity, LendingError> {
    identity.name = identity.name.trim().to_string();
    identity.email = identity.email.trim().to_string();
    if identity.name.is_empty() {
        return Err(LendingError::InvalidIdentity("name must not be empty".to_string()));
    }
    if !identity.email.contains('@') {
        return Err(LendingError::InvalidIdentity(format!(
            "'{}' is not an email address",
            identity.email
        )));
    }
    Ok(identity)
}
