//! Reconciliation of candidate records against stored bills.
//!
//! Candidates are matched to stored bills by exact bill number. A match is
//! overwritten field by field with the candidate's values (empty values
//! included); anything unmatched becomes a new bill. The whole batch is
//! committed in one transaction.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, instrument, warn};

use billtracker_shared::{CandidateRecord, Result, StoredBill};
use billtracker_storage::Storage;

/// Counts reported by one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionCounts {
    pub new_count: usize,
    pub updated_count: usize,
}

/// Upsert `candidates` into `storage` and report how many were inserted and updated.
///
/// When one batch carries the same bill number twice, the later candidate wins.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn reconcile(storage: &Storage, candidates: Vec<CandidateRecord>) -> Result<IngestionCounts> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CandidateRecord> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match position.get(&candidate.number) {
            Some(&i) => {
                warn!(bill = %candidate.number, "duplicate bill number in batch, keeping the later entry");
                unique[i] = candidate;
            }
            None => {
                position.insert(candidate.number.clone(), unique.len());
                unique.push(candidate);
            }
        }
    }

    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    for candidate in unique {
        match storage.find_bill_by_number(&candidate.number).await? {
            Some(mut stored) => {
                stored.apply_candidate(candidate);
                updates.push(stored);
            }
            None => inserts.push(StoredBill::from_candidate(candidate)),
        }
    }

    storage.commit_bills(&inserts, &updates).await?;

    let counts = IngestionCounts {
        new_count: inserts.len(),
        updated_count: updates.len(),
    };
    info!(new = counts.new_count, updated = counts.updated_count, "batch reconciled");
    Ok(counts)
}
