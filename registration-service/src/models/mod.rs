use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use validator::Validate;

/// A confirmed, paid registration. Keyed by the gateway payment id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Registration {
    #[serde(rename = "_id")]
    pub payment_id: String,
    pub event_id: String,
    pub order_id: String,
    pub signature: String,
    pub participant_no: i64,
    pub token: String,
    pub status: RegistrationStatus,
    pub amount: f64,
    pub conv_fee: f64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub paid_at: DateTime<Utc>,
    #[serde(flatten)]
    pub form: RegistrationForm,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Success,
}

/// Participant number and token handed to a payment. Assigned once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub participant_no: i64,
    pub token: String,
}

/// Outcome of claiming a payment before numbering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentClaim {
    /// The caller owns the payment and must allocate a number for it.
    Acquired,
    /// The payment was numbered by an earlier request.
    Assigned(Assignment),
    /// Another request holds the claim and has not assigned a number yet.
    Pending,
}

impl Registration {
    /// Fold a re-recorded registration into this one. Participant number and
    /// token are assigned once and survive every later write.
    pub fn merge_from(&mut self, newer: Registration) {
        self.event_id = newer.event_id;
        self.order_id = newer.order_id;
        self.signature = newer.signature;
        self.status = newer.status;
        self.amount = newer.amount;
        self.conv_fee = newer.conv_fee;
        self.paid_at = newer.paid_at;
        self.form.merge(newer.form);
    }
}

/// Registrant-supplied details. Only these fields are ever stored; anything
/// else in the submitted form is dropped.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Validate)]
pub struct RegistrationForm {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(email, length(max = 254))]
    pub email: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 20))]
    pub phone: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 40))]
    pub regno: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 200))]
    pub college: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 120))]
    pub department: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 20))]
    pub year: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 120))]
    pub team: Option<String>,
}

/// Form fields kept from a submission, and the names of the ones that were
/// discarded.
#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub form: RegistrationForm,
    pub dropped: Vec<String>,
}

impl RegistrationForm {
    pub const FIELDS: [&'static str; 8] = [
        "name",
        "email",
        "phone",
        "regno",
        "college",
        "department",
        "year",
        "team",
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "name" => Some(&mut self.name),
            "email" => Some(&mut self.email),
            "phone" => Some(&mut self.phone),
            "regno" => Some(&mut self.regno),
            "college" => Some(&mut self.college),
            "department" => Some(&mut self.department),
            "year" => Some(&mut self.year),
            "team" => Some(&mut self.team),
            _ => None,
        }
    }

    /// Build a form from whatever the client posted as `formData`.
    ///
    /// Never fails: unknown keys are ignored, while non-scalar values and
    /// values that fail validation are discarded and reported in `dropped`.
    pub fn from_submitted(submitted: &Value) -> SubmittedForm {
        let mut result = SubmittedForm::default();

        let fields = match submitted {
            Value::Object(fields) => fields,
            Value::Null => return result,
            _ => {
                result.dropped.push("formData".to_string());
                return result;
            }
        };

        for name in Self::FIELDS {
            let text = match fields.get(name) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(_) => {
                    result.dropped.push(name.to_string());
                    continue;
                }
            };
            if let Some(slot) = result.form.field_mut(name) {
                *slot = Some(text);
            }
        }

        if let Err(errors) = result.form.validate() {
            let mut invalid: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|name| name.to_string())
                .collect();
            invalid.sort();
            for name in invalid {
                if let Some(slot) = result.form.field_mut(&name) {
                    *slot = None;
                }
                result.dropped.push(name);
            }
        }

        result
    }

    /// Overwrite with every field `newer` provides; absent fields keep their
    /// stored value.
    pub fn merge(&mut self, newer: RegistrationForm) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.name, newer.name);
        take(&mut self.email, newer.email);
        take(&mut self.phone, newer.phone);
        take(&mut self.regno, newer.regno);
        take(&mut self.college, newer.college);
        take(&mut self.department, newer.department);
        take(&mut self.year, newer.year);
        take(&mut self.team, newer.team);
    }
}

/// Accept strings, numbers and booleans for text fields. Forms routinely
/// submit `"year": 3` or a numeric phone. Anything else reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
        Flag(bool),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(f)) => Some(f.to_string()),
        Some(Raw::Flag(b)) => Some(b.to_string()),
        Some(Raw::Other(_)) | None => None,
    })
}
