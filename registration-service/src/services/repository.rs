use crate::models::{Assignment, PaymentClaim, Registration};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{
    bson::{self, doc, Bson, Document},
    Client, Collection, Database, IndexModel,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::error::AppError;

use crate::config::DatabaseConfig;

/// How long an unassigned claim blocks other requests for the same payment.
pub const CLAIM_LEASE_SECS: i64 = 30;

/// Persistence for participant counters and registrations.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Atomically bump the event's counter and return the new value. The first
    /// allocation for an event returns 1.
    async fn allocate_participant_no(&self, event_id: &str) -> Result<i64, AppError>;

    /// Current counter value; 0 when nothing was ever allocated.
    async fn last_participant_no(&self, event_id: &str) -> Result<i64, AppError>;

    /// Claim a payment before numbering it. Of any number of concurrent
    /// callers exactly one gets `Acquired`. An unassigned claim older than
    /// [`CLAIM_LEASE_SECS`] can be taken over. A payment claimed under another
    /// event is a conflict.
    async fn claim_payment(
        &self,
        event_id: &str,
        payment_id: &str,
    ) -> Result<PaymentClaim, AppError>;

    /// Attach the allocated number and token to a claimed payment. Returns
    /// `false` when the payment already carries an assignment or the claim is
    /// gone; the caller's number is then unused.
    async fn assign_payment(
        &self,
        event_id: &str,
        payment_id: &str,
        assignment: &Assignment,
    ) -> Result<bool, AppError>;

    /// Drop a claim that never got an assignment.
    async fn release_payment(&self, event_id: &str, payment_id: &str) -> Result<(), AppError>;

    async fn find_registration(
        &self,
        event_id: &str,
        payment_id: &str,
    ) -> Result<Option<Registration>, AppError>;

    /// Upsert keyed by payment id and return the stored document. Participant
    /// number and token are only written when the document is created. A
    /// payment recorded under another event is a conflict.
    async fn record_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

pub(crate) fn other_event_conflict(payment_id: &str) -> AppError {
    AppError::Conflict(anyhow::anyhow!(
        "Payment {} is registered for another event",
        payment_id
    ))
}

pub(crate) fn claim_is_stale(claimed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - claimed_at > Duration::seconds(CLAIM_LEASE_SECS)
}

const COUNTER_FIELD: &str = "lastParticipantNo";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Deserialize)]
struct ClaimDocument {
    event_id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    claimed_at: DateTime<Utc>,
    participant_no: Option<i64>,
    token: Option<String>,
}

#[derive(Clone)]
pub struct MongoRegistrationStore {
    db: Database,
    counters: Collection<Document>,
    claims: Collection<ClaimDocument>,
    registrations: Collection<Registration>,
}

impl MongoRegistrationStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(config.url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some("registration-service".to_string());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;

        Ok(Self::new(client.database(&config.db_name)))
    }

    pub fn new(db: Database) -> Self {
        Self {
            counters: db.collection("counters"),
            claims: db.collection("payment_claims"),
            registrations: db.collection("registrations"),
            db,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Participant numbers are unique per event; the index turns any
    /// violation into a write error instead of a silent duplicate.
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let participant_index = IndexModel::builder()
            .keys(doc! { "event_id": 1, "participant_no": 1 })
            .options(
                IndexOptions::builder()
                    .name("event_participant_no_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let token_index = IndexModel::builder()
            .keys(doc! { "event_id": 1, "token": 1 })
            .options(IndexOptions::builder().name("event_token_idx".to_string()).build())
            .build();

        self.registrations
            .create_indexes([participant_index, token_index], None)
            .await?;

        tracing::info!("Registration service indexes initialized");
        Ok(())
    }
}

/// Counter value as stored. Missing or non-numeric reads as 0.
fn counter_value(counter: &Document) -> i64 {
    match counter.get(COUNTER_FIELD) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(f)) if f.is_finite() => *f as i64,
        _ => 0,
    }
}

/// Server message of a duplicate key error, `None` for any other error.
fn duplicate_key_message(err: &mongodb::error::Error) -> Option<&str> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
            Some(e.message.as_str())
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY => Some(e.message.as_str()),
        _ => None,
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    duplicate_key_message(err).is_some()
}

fn is_duplicate_id(err: &mongodb::error::Error) -> bool {
    duplicate_key_message(err).is_some_and(|message| message.contains("index: _id_ "))
}

#[async_trait]
impl RegistrationStore for MongoRegistrationStore {
    async fn allocate_participant_no(&self, event_id: &str) -> Result<i64, AppError> {
        // Single-document findAndModify is atomic. The pipeline treats a
        // missing document, a missing field and a non-numeric field alike as 0,
        // and concurrent first-time upserts are retried by the server.
        let update = vec![doc! {
            "$set": {
                COUNTER_FIELD: {
                    "$add": [
                        {
                            "$cond": [
                                { "$isNumber": format!("${}", COUNTER_FIELD) },
                                format!("${}", COUNTER_FIELD),
                                0_i64
                            ]
                        },
                        1_i64
                    ]
                },
                "updated_at": "$$NOW"
            }
        }];

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": event_id }, update, options)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Counter upsert for event {} returned no document",
                    event_id
                ))
            })?;

        let participant_no = counter_value(&counter);
        if participant_no < 1 {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Counter for event {} holds an invalid value",
                event_id
            )));
        }

        Ok(participant_no)
    }

    async fn last_participant_no(&self, event_id: &str) -> Result<i64, AppError> {
        let counter = self
            .counters
            .find_one(doc! { "_id": event_id }, None)
            .await?;
        Ok(counter.as_ref().map(counter_value).unwrap_or(0))
    }

    async fn claim_payment(
        &self,
        event_id: &str,
        payment_id: &str,
    ) -> Result<PaymentClaim, AppError> {
        let now = Utc::now();
        let update = doc! {
            "$setOnInsert": {
                "event_id": event_id,
                "claimed_at": bson::DateTime::from_chrono(now),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::Before)
            .build();

        let claim = match self
            .claims
            .find_one_and_update(doc! { "_id": payment_id }, update, options)
            .await
        {
            Ok(None) => return Ok(PaymentClaim::Acquired),
            Ok(Some(claim)) => claim,
            // Lost the insert race; read what the winner wrote.
            Err(e) if is_duplicate_key(&e) => {
                match self.claims.find_one(doc! { "_id": payment_id }, None).await? {
                    Some(claim) => claim,
                    None => return Ok(PaymentClaim::Pending),
                }
            }
            Err(e) => return Err(e.into()),
        };

        if claim.event_id != event_id {
            return Err(other_event_conflict(payment_id));
        }

        if let (Some(participant_no), Some(token)) = (claim.participant_no, claim.token) {
            return Ok(PaymentClaim::Assigned(Assignment {
                participant_no,
                token,
            }));
        }

        if !claim_is_stale(claim.claimed_at, now) {
            return Ok(PaymentClaim::Pending);
        }

        let takeover = self
            .claims
            .find_one_and_update(
                doc! {
                    "_id": payment_id,
                    "participant_no": { "$exists": false },
                    "claimed_at": bson::DateTime::from_chrono(claim.claimed_at),
                },
                doc! { "$set": { "claimed_at": bson::DateTime::from_chrono(now) } },
                None,
            )
            .await?;

        if takeover.is_some() {
            tracing::warn!(payment_id, "Took over a stale payment claim");
            Ok(PaymentClaim::Acquired)
        } else {
            Ok(PaymentClaim::Pending)
        }
    }

    async fn assign_payment(
        &self,
        event_id: &str,
        payment_id: &str,
        assignment: &Assignment,
    ) -> Result<bool, AppError> {
        let result = self
            .claims
            .update_one(
                doc! {
                    "_id": payment_id,
                    "event_id": event_id,
                    "participant_no": { "$exists": false },
                },
                doc! {
                    "$set": {
                        "participant_no": assignment.participant_no,
                        "token": assignment.token.as_str(),
                        "assigned_at": bson::DateTime::now(),
                    }
                },
                None,
            )
            .await?;

        Ok(result.modified_count == 1)
    }

    async fn release_payment(&self, event_id: &str, payment_id: &str) -> Result<(), AppError> {
        self.claims
            .delete_one(
                doc! {
                    "_id": payment_id,
                    "event_id": event_id,
                    "participant_no": { "$exists": false },
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn find_registration(
        &self,
        event_id: &str,
        payment_id: &str,
    ) -> Result<Option<Registration>, AppError> {
        let filter = doc! { "_id": payment_id, "event_id": event_id };
        Ok(self.registrations.find_one(filter, None).await?)
    }

    async fn record_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, AppError> {
        let mut fields = mongodb::bson::to_document(&registration)
            .map_err(|e| AppError::DatabaseError(e.into()))?;
        fields.remove("_id");
        fields.remove("participant_no");
        fields.remove("token");

        let update = doc! {
            "$set": fields,
            "$setOnInsert": {
                "participant_no": registration.participant_no,
                "token": registration.token.as_str(),
            }
        };

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        // A document with this id under another event makes the upsert insert,
        // which the primary key refuses.
        let filter = doc! {
            "_id": &registration.payment_id,
            "event_id": &registration.event_id,
        };
        let stored = self
            .registrations
            .find_one_and_update(filter, update, options)
            .await
            .map_err(|e| {
                if is_duplicate_id(&e) {
                    other_event_conflict(&registration.payment_id)
                } else {
                    AppError::from(e)
                }
            })?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Registration upsert for payment {} returned no document",
                    registration.payment_id
                ))
            })?;

        Ok(stored)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
