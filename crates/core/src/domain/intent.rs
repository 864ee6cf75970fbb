use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::DomainError;

/// Intents below this confidence are never acted on.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

pub const DEFAULT_EVENT_DURATION_MINUTES: i64 = 60;

pub fn default_event_duration() -> Duration {
    Duration::minutes(DEFAULT_EVENT_DURATION_MINUTES)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarAction {
    Create,
    Modify,
    View,
    Delete,
    CheckAvailability,
}

impl CalendarAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::View => "view",
            Self::Delete => "delete",
            Self::CheckAvailability => "check_availability",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown calendar action `{0}` (expected create|modify|view|delete|check_availability)")]
pub struct UnknownActionError(pub String);

impl std::str::FromStr for CalendarAction {
    type Err = UnknownActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "view" => Ok(Self::View),
            "delete" => Ok(Self::Delete),
            "check_availability" => Ok(Self::CheckAvailability),
            other => Err(UnknownActionError(other.to_string())),
        }
    }
}

/// A complete window. Use [`TimeSlot::new`] to get the `end > start` check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::InvalidTimeWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

/// The time window as the oracle reported it; `end` may still be unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedTime {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub is_all_day: bool,
}

impl RequestedTime {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, end: None, is_all_day: false }
    }

    pub fn resolved_end(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start + default_event_duration())
    }

    pub fn to_slot(&self) -> Result<TimeSlot, DomainError> {
        TimeSlot::new(self.start, self.resolved_end())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentParameters {
    pub date_time: Option<RequestedTime>,
    pub title: Option<String>,
    pub guests: Option<Vec<String>>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub recurrence: Option<String>,
}

impl IntentParameters {
    pub fn is_empty(&self) -> bool {
        self.date_time.is_none()
            && self.title.is_none()
            && self.guests.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.recurrence.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarIntent {
    pub action: CalendarAction,
    pub confidence: f64,
    pub parameters: IntentParameters,
    pub missing_info: Vec<String>,
}

impl CalendarIntent {
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    pub fn is_actionable(&self) -> bool {
        self.missing_info.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{CalendarAction, CalendarIntent, IntentParameters, RequestedTime, TimeSlot};
    use crate::errors::DomainError;

    #[test]
    fn time_slot_rejects_inverted_window() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();

        assert!(matches!(TimeSlot::new(start, end), Err(DomainError::InvalidTimeWindow { .. })));
        assert!(TimeSlot::new(start, start).is_err());
    }

    #[test]
    fn overlap_excludes_touching_windows() {
        let slot = TimeSlot::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
        )
        .unwrap();

        assert!(slot.overlaps(
            Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap(),
        ));
        assert!(!slot.overlaps(
            Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
        ));
    }

    #[test]
    fn requested_time_defaults_to_one_hour() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let requested = RequestedTime::starting_at(start);

        let slot = requested.to_slot().unwrap();
        assert_eq!(slot.duration().num_minutes(), 60);
    }

    #[test]
    fn actions_parse_case_insensitively() {
        assert_eq!("Create".parse::<CalendarAction>(), Ok(CalendarAction::Create));
        assert_eq!(
            "check_availability".parse::<CalendarAction>(),
            Ok(CalendarAction::CheckAvailability)
        );
        assert!("reschedule".parse::<CalendarAction>().is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let intent = CalendarIntent {
            action: CalendarAction::Create,
            confidence: 0.7,
            parameters: IntentParameters::default(),
            missing_info: vec!["title".to_string()],
        };

        assert!(intent.meets_threshold(0.7));
        assert!(!intent.is_actionable());
    }
}
