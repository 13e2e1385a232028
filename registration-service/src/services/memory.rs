//! In-process store for local development and tests. Same semantics as the
//! MongoDB store, nothing survives a restart.

use crate::models::{Assignment, PaymentClaim, Registration};
use crate::services::repository::{claim_is_stale, other_event_conflict, RegistrationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use service_core::error::AppError;

struct Claim {
    event_id: String,
    claimed_at: DateTime<Utc>,
    assignment: Option<Assignment>,
}

#[derive(Default)]
pub struct InMemoryRegistrationStore {
    counters: DashMap<String, i64>,
    claims: DashMap<String, Claim>,
    registrations: DashMap<String, Registration>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn allocate_participant_no(&self, event_id: &str) -> Result<i64, AppError> {
        // The entry guard holds the shard's write lock for the whole increment.
        let mut counter = self.counters.entry(event_id.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn last_participant_no(&self, event_id: &str) -> Result<i64, AppError> {
        Ok(self.counters.get(event_id).map(|c| *c.value()).unwrap_or(0))
    }

    async fn claim_payment(
        &self,
        event_id: &str,
        payment_id: &str,
    ) -> Result<PaymentClaim, AppError> {
        let now = Utc::now();
        match self.claims.entry(payment_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Claim {
                    event_id: event_id.to_string(),
                    claimed_at: now,
                    assignment: None,
                });
                Ok(PaymentClaim::Acquired)
            }
            Entry::Occupied(mut entry) => {
                let claim = entry.get_mut();
                if claim.event_id != event_id {
                    return Err(other_event_conflict(payment_id));
                }
                if let Some(assignment) = &claim.assignment {
                    return Ok(PaymentClaim::Assigned(assignment.clone()));
                }
                if claim_is_stale(claim.claimed_at, now) {
                    claim.claimed_at = now;
                    return Ok(PaymentClaim::Acquired);
                }
                Ok(PaymentClaim::Pending)
            }
        }
    }

    async fn assign_payment(
        &self,
        event_id: &str,
        payment_id: &str,
        assignment: &Assignment,
    ) -> Result<bool, AppError> {
        match self.claims.get_mut(payment_id) {
            Some(mut claim) if claim.event_id == event_id && claim.assignment.is_none() => {
                claim.assignment = Some(assignment.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_payment(&self, event_id: &str, payment_id: &str) -> Result<(), AppError> {
        self.claims.remove_if(payment_id, |_, claim| {
            claim.event_id == event_id && claim.assignment.is_none()
        });
        Ok(())
    }

    async fn find_registration(
        &self,
        event_id: &str,
        payment_id: &str,
    ) -> Result<Option<Registration>, AppError> {
        Ok(self
            .registrations
            .get(payment_id)
            .filter(|r| r.event_id == event_id)
            .map(|r| r.value().clone()))
    }

    async fn record_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, AppError> {
        let stored = match self.registrations.entry(registration.payment_id.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.event_id != registration.event_id {
                    return Err(other_event_conflict(&registration.payment_id));
                }
                existing.merge_from(registration);
                existing.clone()
            }
            Entry::Vacant(entry) => entry.insert(registration).value().clone(),
        };
        Ok(stored)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
