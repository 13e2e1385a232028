//! Payment confirmation: signature check, participant numbering, recording.

use crate::config::EventConfig;
use crate::models::{Assignment, PaymentClaim, Registration, RegistrationForm, RegistrationStatus};
use crate::services::metrics::{record_allocation, record_dropped_field, record_verification};
use crate::services::razorpay::{PaymentVerification, RazorpayClient};
use crate::services::repository::RegistrationStore;
use crate::services::token::TokenGenerator;
use chrono::Utc;
use serde_json::Value;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;

const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(25);
const CLAIM_POLL_ATTEMPTS: u32 = 80;

#[derive(Clone)]
pub struct RegistrationService {
    razorpay: RazorpayClient,
    store: Arc<dyn RegistrationStore>,
    tokens: TokenGenerator,
    event: EventConfig,
}

impl RegistrationService {
    pub fn new(
        razorpay: RazorpayClient,
        store: Arc<dyn RegistrationStore>,
        event: EventConfig,
    ) -> Self {
        Self {
            razorpay,
            store,
            tokens: TokenGenerator::new(event.token_prefix.clone()),
            event,
        }
    }

    /// Confirm a checkout and record the registration.
    ///
    /// Nothing is allocated or written unless the signature checks out. A
    /// verified payment is always recorded: unusable form fields are dropped,
    /// never a reason to refuse. Every request for the same payment, including
    /// concurrent ones, ends up with the same participant number and token.
    pub async fn confirm_payment(
        &self,
        verification: PaymentVerification,
        form_data: &Value,
    ) -> Result<Registration, AppError> {
        let event_id = self.event.id.as_str();

        if !self.razorpay.verify_payment_signature(&verification)? {
            record_verification(event_id, "invalid_signature");
            return Err(AppError::InvalidSignature);
        }

        let payment_id = verification.razorpay_payment_id;
        let submitted = RegistrationForm::from_submitted(form_data);
        if !submitted.dropped.is_empty() {
            tracing::warn!(
                payment_id = %payment_id,
                dropped = ?submitted.dropped,
                "Discarded unusable form fields"
            );
            for field in &submitted.dropped {
                record_dropped_field(event_id, field);
            }
        }
        let form = submitted.form;

        let (assignment, replayed) = self
            .assign(event_id, &payment_id, form.regno.as_deref())
            .await
            .inspect_err(|_| record_verification(event_id, "failed"))?;

        let registration = Registration {
            payment_id: payment_id.clone(),
            event_id: event_id.to_string(),
            order_id: verification.razorpay_order_id,
            signature: verification.razorpay_signature,
            participant_no: assignment.participant_no,
            token: assignment.token,
            status: RegistrationStatus::Success,
            amount: self.event.registration_amount,
            conv_fee: self.event.convenience_fee,
            paid_at: Utc::now(),
            form,
        };

        let stored = self
            .store
            .record_registration(registration)
            .await
            .map_err(|e| {
                tracing::error!(
                    payment_id = %payment_id,
                    participant_no = assignment.participant_no,
                    "Registration write failed; the number stays reserved for this payment"
                );
                record_verification(event_id, "failed");
                e
            })?;

        record_verification(event_id, if replayed { "replayed" } else { "registered" });
        tracing::info!(
            payment_id = %stored.payment_id,
            participant_no = stored.participant_no,
            token = %stored.token,
            "Registration recorded"
        );

        Ok(stored)
    }

    /// Number a payment exactly once. Returns the assignment and whether an
    /// earlier request made it.
    async fn assign(
        &self,
        event_id: &str,
        payment_id: &str,
        regno: Option<&str>,
    ) -> Result<(Assignment, bool), AppError> {
        for _ in 0..CLAIM_POLL_ATTEMPTS {
            match self.store.claim_payment(event_id, payment_id).await? {
                PaymentClaim::Assigned(assignment) => {
                    tracing::info!(
                        payment_id,
                        participant_no = assignment.participant_no,
                        "Payment already numbered, reusing participant number"
                    );
                    return Ok((assignment, true));
                }
                PaymentClaim::Pending => tokio::time::sleep(CLAIM_POLL_INTERVAL).await,
                PaymentClaim::Acquired => {
                    let participant_no = match self.store.allocate_participant_no(event_id).await {
                        Ok(participant_no) => participant_no,
                        Err(e) => {
                            self.release(event_id, payment_id).await;
                            return Err(e);
                        }
                    };
                    record_allocation(event_id);

                    let assignment = Assignment {
                        participant_no,
                        token: self.tokens.generate(regno, participant_no),
                    };

                    match self.store.assign_payment(event_id, payment_id, &assignment).await {
                        Ok(true) => {
                            tracing::info!(
                                payment_id,
                                participant_no,
                                "Participant number allocated"
                            );
                            return Ok((assignment, false));
                        }
                        Ok(false) => {
                            tracing::warn!(
                                payment_id,
                                participant_no,
                                "Payment claim was taken over; participant number is burned"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                payment_id,
                                participant_no,
                                "Assignment write failed; participant number is burned"
                            );
                            self.release(event_id, payment_id).await;
                            return Err(e);
                        }
                    }
                }
            }
        }

        Err(AppError::Conflict(anyhow::anyhow!("Payment is still being processed")))
    }

    async fn release(&self, event_id: &str, payment_id: &str) {
        if let Err(e) = self.store.release_payment(event_id, payment_id).await {
            tracing::warn!(payment_id, error = %e, "Failed to release payment claim");
        }
    }
}
