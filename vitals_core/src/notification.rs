//! Logical notifications, independent of any delivery channel.

use crate::{BpCategory, Domain, DoseSlot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type-specific structured data carried by a notification
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    BloodPressure {
        enhanced: bool,
        dominant: Option<BpCategory>,
        latest: Option<BpCategory>,
    },
    Weight {
        last_weight_kg: Option<f64>,
    },
    Medication {
        medication_id: Uuid,
        name: String,
        dosage: String,
        slot: DoseSlot,
    },
    Workout {
        session_id: Uuid,
        title: String,
        variant: Option<String>,
        scheduled_at: DateTime<Utc>,
    },
}

impl NotificationPayload {
    pub fn domain(&self) -> Domain {
        match self {
            NotificationPayload::BloodPressure { .. } => Domain::BloodPressure,
            NotificationPayload::Weight { .. } => Domain::Weight,
            NotificationPayload::Medication { .. } => Domain::Medication,
            NotificationPayload::Workout { .. } => Domain::Workout,
        }
    }
}

/// An interactive button offered alongside a notification
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
}

impl NotificationAction {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
    /// Proposed actions, most important first
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn domain(&self) -> Domain {
        self.payload.domain()
    }

    pub fn blood_pressure(enhanced: bool, dominant: Option<BpCategory>, latest: Option<BpCategory>) -> Self {
        let body = if enhanced {
            format!(
                "Your last reading was {}, above your usual {}. Please measure again today.",
                latest.map(|c| c.label()).unwrap_or("unknown"),
                dominant.map(|c| c.label()).unwrap_or("range")
            )
        } else {
            "Time for your evening blood pressure measurement.".to_string()
        };
        Self {
            title: if enhanced {
                "Blood pressure check needed".into()
            } else {
                "Blood pressure reminder".into()
            },
            body,
            payload: NotificationPayload::BloodPressure {
                enhanced,
                dominant,
                latest,
            },
            actions: vec![
                NotificationAction::new("snooze", "Remind me later"),
                NotificationAction::new("suppress", "Not today"),
            ],
        }
    }

    pub fn weight(last_weight_kg: Option<f64>) -> Self {
        Self {
            title: "Weigh-in reminder".into(),
            body: match last_weight_kg {
                Some(kg) => format!("Morning weigh-in time. Last recorded: {:.1} kg.", kg),
                None => "Morning weigh-in time.".into(),
            },
            payload: NotificationPayload::Weight { last_weight_kg },
            actions: vec![
                NotificationAction::new("snooze", "Remind me later"),
                NotificationAction::new("suppress", "Not today"),
            ],
        }
    }

    pub fn medication(medication_id: Uuid, name: &str, dosage: &str, slot: DoseSlot) -> Self {
        Self {
            title: format!("Take {}", name),
            body: format!("{} of {} is due ({}).", dosage, name, slot.time.format("%H:%M")),
            payload: NotificationPayload::Medication {
                medication_id,
                name: name.to_string(),
                dosage: dosage.to_string(),
                slot,
            },
            actions: vec![
                NotificationAction::new("taken", "Taken"),
                NotificationAction::new("snooze", "Snooze"),
            ],
        }
    }

    pub fn workout(session_id: Uuid, title: &str, variant: Option<&str>, scheduled_at: DateTime<Utc>) -> Self {
        let body = match variant {
            Some(v) => format!("{} ({}) starts soon.", title, v),
            None => format!("{} starts soon.", title),
        };
        Self {
            title: "Workout coming up".into(),
            body,
            payload: NotificationPayload::Workout {
                session_id,
                title: title.to_string(),
                variant: variant.map(str::to_string),
                scheduled_at,
            },
            actions: vec![
                NotificationAction::new("start", "Start"),
                NotificationAction::new("snooze", "Snooze"),
                NotificationAction::new("skip", "Skip"),
            ],
        }
    }
}

/// One provider's acceptance of a notification
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider: String,
    pub handle: String,
}

/// Everything needed to retract a fanned-out notification later
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SentHandle {
    pub receipts: Vec<DeliveryReceipt>,
}

impl SentHandle {
    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}
