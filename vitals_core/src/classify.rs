//! Blood-pressure severity tiers and escalation.
//!
//! Tiers are ordered by severity so that `Ord` comparisons read naturally:
//! `Normal < Elevated < HighStage1 < HighStage2 < HypertensiveCrisis`.

use crate::BloodPressureReading;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BpCategory {
    Normal,
    Elevated,
    HighStage1,
    HighStage2,
    HypertensiveCrisis,
}

impl BpCategory {
    pub fn label(&self) -> &'static str {
        match self {
            BpCategory::Normal => "Normal",
            BpCategory::Elevated => "Elevated",
            BpCategory::HighStage1 => "High BP Stage 1",
            BpCategory::HighStage2 => "High BP Stage 2",
            BpCategory::HypertensiveCrisis => "Hypertensive Crisis",
        }
    }
}

/// Classify a single measurement
///
/// The more severe of the systolic and diastolic tiers wins.
pub fn classify(systolic: i32, diastolic: i32) -> BpCategory {
    if systolic > 180 || diastolic > 120 {
        BpCategory::HypertensiveCrisis
    } else if systolic >= 140 || diastolic >= 90 {
        BpCategory::HighStage2
    } else if systolic >= 130 || diastolic >= 80 {
        BpCategory::HighStage1
    } else if systolic >= 120 {
        BpCategory::Elevated
    } else {
        BpCategory::Normal
    }
}

impl BloodPressureReading {
    pub fn category(&self) -> BpCategory {
        classify(self.systolic, self.diastolic)
    }
}

/// Majority category among readings, ties broken toward the more severe tier
///
/// Readings flagged `exclude_from_calculation` do not vote.
pub fn dominant_category<'a, I>(readings: I) -> Option<BpCategory>
where
    I: IntoIterator<Item = &'a BloodPressureReading>,
{
    let mut counts: BTreeMap<BpCategory, usize> = BTreeMap::new();
    for reading in readings.into_iter().filter(|r| !r.exclude_from_calculation) {
        *counts.entry(reading.category()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by_key(|(category, count)| (*count, *category))
        .map(|(category, _)| category)
}

/// Whether the latest reading is strictly more severe than the recent norm
///
/// `latest` is taken as-is: an excluded reading still counts here even
/// though it never votes for the dominant category.
pub fn should_escalate(dominant: Option<BpCategory>, latest: Option<&BloodPressureReading>) -> bool {
    match (dominant, latest) {
        (Some(dominant), Some(latest)) => latest.category() > dominant,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn reading(systolic: i32, diastolic: i32) -> BloodPressureReading {
        BloodPressureReading {
            id: Uuid::new_v4(),
            user_id: "ana".into(),
            measured_at: Utc::now(),
            systolic,
            diastolic,
            pulse: None,
            note: None,
            exclude_from_calculation: false,
        }
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(115, 75), BpCategory::Normal);
        assert_eq!(classify(125, 75), BpCategory::Elevated);
        assert_eq!(classify(125, 82), BpCategory::HighStage1);
        assert_eq!(classify(132, 70), BpCategory::HighStage1);
        assert_eq!(classify(141, 70), BpCategory::HighStage2);
        assert_eq!(classify(120, 95), BpCategory::HighStage2);
        assert_eq!(classify(185, 100), BpCategory::HypertensiveCrisis);
        assert_eq!(classify(150, 125), BpCategory::HypertensiveCrisis);
    }

    #[test]
    fn test_dominant_tie_prefers_more_severe() {
        let readings = vec![
            reading(110, 70),
            reading(112, 72),
            reading(132, 82),
            reading(134, 84),
        ];
        assert_eq!(dominant_category(&readings), Some(BpCategory::HighStage1));
    }

    #[test]
    fn test_dominant_majority_wins() {
        let readings = vec![reading(110, 70), reading(112, 72), reading(145, 95)];
        assert_eq!(dominant_category(&readings), Some(BpCategory::Normal));
    }

    #[test]
    fn test_excluded_readings_do_not_vote() {
        let mut high = reading(145, 95);
        high.exclude_from_calculation = true;
        let readings = vec![reading(110, 70), high.clone(), high];
        assert_eq!(dominant_category(&readings), Some(BpCategory::Normal));
        assert_eq!(dominant_category(&[] as &[BloodPressureReading]), None);
    }

    #[test]
    fn test_escalation_uses_latest_even_if_excluded() {
        let mut latest = reading(145, 95);
        latest.exclude_from_calculation = true;
        assert!(should_escalate(Some(BpCategory::Normal), Some(&latest)));
        assert!(!should_escalate(Some(BpCategory::HighStage2), Some(&latest)));
        assert!(!should_escalate(None, Some(&latest)));
    }
}
