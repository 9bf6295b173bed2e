//! Books fixed transactions into the ledger, once per fixed transaction and month.
//!
//! Every materialization path (the monthly scheduler, the startup catch-up,
//! manual triggers and the creation hook) goes through [`Materializer`], which
//! serializes them behind one async mutex. The store's unique
//! `(definition_id, period)` index backs that up: a second generated row for
//! the same pair is silently ignored.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{Database, EntryMatch};
use crate::models::{FixedTransaction, Period};

/// How the materializer decides that a fixed transaction was already booked
/// for a period.
///
/// - `Legacy`: any entry of the same user, category, kind and amount inside the
///   period counts. Two fixed transactions that share those four values are
///   conflated and only the first one is booked.
/// - `Identity`: only a generated entry pointing back at the same fixed
///   transaction and period counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    Legacy,
    #[default]
    Identity,
}

impl DedupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Identity => "identity",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "legacy" => Some(Self::Legacy),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// Result of trying to book one fixed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionOutcome {
    /// A new ledger entry was written.
    Created(Uuid),
    /// An entry for this period already exists.
    AlreadyPresent,
    /// The fixed transaction is inactive and was not booked.
    Inactive,
}

/// Summary of one materialization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationReport {
    pub period: Period,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MaterializationReport {
    fn empty(period: Period) -> Self {
        Self {
            period,
            created: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

#[derive(Clone)]
pub struct Materializer {
    db: Database,
    clock: Arc<dyn Clock>,
    policy: DedupPolicy,
    gate: Arc<Mutex<()>>,
}

impl Materializer {
    pub fn new(db: Database, clock: Arc<dyn Clock>, policy: DedupPolicy) -> Self {
        Self {
            db,
            clock,
            policy,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub fn current_period(&self) -> Period {
        Period::containing(self.clock.now())
    }

    /// Book every active fixed transaction of every user that has no entry in
    /// `period` yet.
    ///
    /// A failure to book one fixed transaction is logged and counted; the
    /// remaining ones are still processed. Only failing to list the fixed
    /// transactions aborts the pass.
    pub async fn materialize(&self, period: Period) -> Result<MaterializationReport> {
        let _guard = self.gate.lock().await;

        let definitions = self.db.list_active_definitions(None)?;
        let mut report = MaterializationReport::empty(period);

        for definition in &definitions {
            match self.materialize_one(definition, period) {
                Ok(DefinitionOutcome::Created(_)) => report.created += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to book fixed transaction {} ({}) for {}: {:#}",
                        definition.id,
                        definition.name,
                        period,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Fixed transactions for {}: {} created, {} skipped, {} failed",
            period,
            report.created,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Book a freshly created fixed transaction for the current month right
    /// away instead of waiting for the next boundary.
    pub async fn on_definition_created(
        &self,
        definition: &FixedTransaction,
    ) -> Result<DefinitionOutcome> {
        if !definition.is_active {
            return Ok(DefinitionOutcome::Inactive);
        }

        let period = self.current_period();
        let _guard = self.gate.lock().await;
        self.materialize_one(definition, period)
    }

    /// Remove the ledger entries generated from a fixed transaction that is
    /// about to be deleted. Returns the number of entries removed.
    pub fn on_definition_deleted(&self, definition: &FixedTransaction) -> Result<usize> {
        let deleted = self
            .db
            .delete_generated_entries(definition, self.policy == DedupPolicy::Identity)?;
        tracing::info!(
            "Removed {} generated entries of fixed transaction {} ({})",
            deleted,
            definition.id,
            definition.name
        );
        Ok(deleted)
    }

    fn materialize_one(
        &self,
        definition: &FixedTransaction,
        period: Period,
    ) -> Result<DefinitionOutcome> {
        if self.already_present(definition, period)? {
            tracing::debug!(
                "Skipping fixed transaction {} for {}: entry already present",
                definition.name,
                period
            );
            return Ok(DefinitionOutcome::AlreadyPresent);
        }

        match self.db.insert_generated_entry(definition, period)? {
            Some(entry) => {
                tracing::info!(
                    "Booked fixed transaction {} for {}: {} {}",
                    definition.name,
                    period,
                    definition.kind.as_str(),
                    definition.amount
                );
                Ok(DefinitionOutcome::Created(entry.id))
            }
            None => Ok(DefinitionOutcome::AlreadyPresent),
        }
    }

    fn already_present(&self, definition: &FixedTransaction, period: Period) -> Result<bool> {
        let count = match self.policy {
            DedupPolicy::Legacy => self.db.count_matching_entries(&EntryMatch {
                user_id: definition.user_id,
                category_id: Some(definition.category_id),
                kind: definition.kind,
                amount: Some(definition.amount),
                period,
            })?,
            DedupPolicy::Identity => self.db.count_generated_for(definition.id, period)?,
        };
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_round_trips_through_strings() {
        for policy in [DedupPolicy::Legacy, DedupPolicy::Identity] {
            assert_eq!(DedupPolicy::from_str(policy.as_str()), Some(policy));
        }
        assert_eq!(DedupPolicy::from_str("fuzzy"), None);
        assert_eq!(DedupPolicy::default(), DedupPolicy::Identity);
    }
}
