use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{LoanOfficer, OfficerId};
use super::repository::{ApplicationFilter, LendingTransaction, RepositoryError};

/// Open-work count for one active officer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfficerLoad {
    pub officer: LoanOfficer,
    pub open_applications: usize,
}

/// Current load of every active officer, ordered by officer id.
pub fn officer_loads(
    tx: &mut dyn LendingTransaction,
) -> Result<Vec<OfficerLoad>, RepositoryError> {
    let officers = tx.officers(true)?;
    let mut counts: BTreeMap<OfficerId, usize> =
        officers.iter().map(|officer| (officer.id, 0)).collect();

    for application in tx.applications(&ApplicationFilter::default().open())? {
        if let Some(count) = counts.get_mut(&application.loan_officer_id) {
            *count += 1;
        }
    }

    let mut loads: Vec<OfficerLoad> = officers
        .into_iter()
        .map(|officer| {
            let open_applications = counts.get(&officer.id).copied().unwrap_or(0);
            OfficerLoad {
                officer,
                open_applications,
            }
        })
        .collect();
    loads.sort_by_key(|load| load.officer.id);
    Ok(loads)
}

/// Least-loaded active officer; ties go to the lowest id. `None` when nobody is active.
///
/// This reads and decides without locking. Two concurrent submissions can observe the same
/// minimum and both land on that officer; the imbalance is accepted and corrects itself as later
/// submissions see the new counts.
pub fn pick_officer(
    tx: &mut dyn LendingTransaction,
) -> Result<Option<LoanOfficer>, RepositoryError> {
    Ok(officer_loads(tx)?
        .into_iter()
        .min_by_key(|load| (load.open_applications, load.officer.id))
        .map(|load| load.officer))
}
