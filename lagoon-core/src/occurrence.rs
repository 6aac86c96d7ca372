use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an occurrence comes from.
///
/// Standalone listings carry their operator directly; instances generated
/// from a schedule template may inherit it from the template. Both are hidden
/// behind [`Occurrence::operator_id`] so callers never query two source
/// tables themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceSource {
    Listing {
        operator_id: Uuid,
    },
    TemplateInstance {
        template_id: Uuid,
        schedule_id: Uuid,
        operator_id: Option<Uuid>,
    },
}

/// One bookable date/time instance of an activity, consumed read-only by the
/// engine. `available_spots` is only authoritative at the store's atomic
/// reservation write; the copy read here is advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Uuid,
    pub name: String,
    pub source: OccurrenceSource,
    pub starts_at: DateTime<Utc>,
    pub booking_deadline: DateTime<Utc>,
    pub price_per_adult: i64,
    pub price_per_child: i64,
    pub max_capacity: u32,
    pub available_spots: u32,
    /// Per-operator commission override in basis points; the engine falls
    /// back to the configured default when absent.
    pub commission_rate_bps: Option<u32>,
}

impl Occurrence {
    pub fn operator_id(&self) -> Option<Uuid> {
        match &self.source {
            OccurrenceSource::Listing { operator_id } => Some(*operator_id),
            OccurrenceSource::TemplateInstance { operator_id, .. } => *operator_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_id_is_uniform_across_sources() {
        let operator = Uuid::new_v4();

        let listing = OccurrenceSource::Listing {
            operator_id: operator,
        };
        let instance = OccurrenceSource::TemplateInstance {
            template_id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            operator_id: Some(operator),
        };
        let orphan = OccurrenceSource::TemplateInstance {
            template_id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            operator_id: None,
        };

        let base = Occurrence {
            id: Uuid::new_v4(),
            name: "Lagoon snorkeling".to_string(),
            source: listing,
            starts_at: Utc::now(),
            booking_deadline: Utc::now(),
            price_per_adult: 15_000,
            price_per_child: 7_500,
            max_capacity: 10,
            available_spots: 10,
            commission_rate_bps: None,
        };

        assert_eq!(base.operator_id(), Some(operator));
        let with_instance = Occurrence {
            source: instance,
            ..base.clone()
        };
        assert_eq!(with_instance.operator_id(), Some(operator));
        let with_orphan = Occurrence {
            source: orphan,
            ..base
        };
        assert_eq!(with_orphan.operator_id(), None);
    }
}
