use chrono::{DateTime, Utc};
use lagoon_core::occurrence::Occurrence;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Intake form as submitted by the tourist client. Totals are never taken
/// from here; the orchestrator recomputes them from the occurrence's price
/// table.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingIntake {
    pub occurrence_id: Uuid,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_email: String,
    pub customer_email_confirm: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub adult_count: u32,
    #[serde(default)]
    pub child_count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every intake rule and report ALL violations, not just the first,
/// so the caller can highlight every broken field at once.
///
/// The capacity check here is advisory (against the advertised spot count);
/// the authoritative check is the store's atomic reservation write.
pub fn validate_intake(
    intake: &BookingIntake,
    occurrence: &Occurrence,
    now: DateTime<Utc>,
) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    if intake.customer_first_name.trim().is_empty() {
        violations.push(FieldViolation::new(
            "customer_first_name",
            "first name is required",
        ));
    }
    if intake.customer_last_name.trim().is_empty() {
        violations.push(FieldViolation::new(
            "customer_last_name",
            "last name is required",
        ));
    }

    let email = intake.customer_email.trim();
    if !plausible_email(email) {
        violations.push(FieldViolation::new(
            "customer_email",
            "a valid contact email is required",
        ));
    } else if !email.eq_ignore_ascii_case(intake.customer_email_confirm.trim()) {
        violations.push(FieldViolation::new(
            "customer_email_confirm",
            "email confirmation does not match",
        ));
    }

    if intake.adult_count < 1 {
        violations.push(FieldViolation::new(
            "adult_count",
            "at least one adult is required",
        ));
    }

    let party = intake.adult_count.saturating_add(intake.child_count);
    if party > occurrence.available_spots {
        violations.push(FieldViolation::new(
            "participants",
            format!(
                "{party} participants requested but only {} spots remain",
                occurrence.available_spots
            ),
        ));
    }

    if now > occurrence.booking_deadline {
        violations.push(FieldViolation::new(
            "occurrence_id",
            "booking deadline for this occurrence has passed",
        ));
    }

    violations
}

fn plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && domain.len() >= 3,
        None => false,
    }
}
