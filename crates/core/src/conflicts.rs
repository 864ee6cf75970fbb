//! Overlap detection against the calendar plus alternative slot suggestions.
//!
//! Suggestions are a minimum contract: a same-length slot ending where the
//! requested one starts, a slot starting where the last conflict ends, and
//! when neither fits working hours, the same clock time on the next day.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calendar::{CalendarApi, CalendarApiError, ExistingEvent};
use crate::domain::intent::TimeSlot;

pub const UNTITLED_EVENT: &str = "Untitled Event";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&ExistingEvent> for ConflictingEvent {
    fn from(event: &ExistingEvent) -> Self {
        let summary = event
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
            .unwrap_or(UNTITLED_EVENT)
            .to_string();
        Self { summary, start: event.start, end: event.end }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCheckResult {
    pub has_conflict: bool,
    pub conflicting_events: Option<Vec<ConflictingEvent>>,
    pub suggested_times: Option<Vec<TimeSlot>>,
}

impl ConflictCheckResult {
    pub fn clear() -> Self {
        Self::default()
    }
}

/// Working hours are whole local hours; a closing hour of 24 means midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuggestionPolicy {
    pub working_hours_start: u32,
    pub working_hours_end: u32,
    pub timezone: Tz,
}

impl SuggestionPolicy {
    pub fn new(timezone: Tz, start_hour: u32, end_hour: u32) -> Self {
        Self { working_hours_start: start_hour, working_hours_end: end_hour, timezone }
    }

    /// A slot fits when the hour it starts in is at or after opening and the
    /// hour it ends in is at or before closing, on one local day.
    pub fn within_working_hours(&self, slot: &TimeSlot) -> bool {
        let start = slot.start.with_timezone(&self.timezone);
        let end = slot.end.with_timezone(&self.timezone);
        let end_hour = if end.date_naive() == start.date_naive() {
            end.hour()
        } else if end.time() == NaiveTime::MIN
            && end.date_naive() == start.date_naive() + Duration::days(1)
        {
            24
        } else {
            return false;
        };
        start.hour() >= self.working_hours_start && end_hour <= self.working_hours_end
    }
}

impl Default for SuggestionPolicy {
    fn default() -> Self {
        Self::new(Tz::UTC, 9, 17)
    }
}

pub struct ConflictChecker {
    calendar: Arc<dyn CalendarApi>,
    policy: SuggestionPolicy,
}

impl ConflictChecker {
    pub fn new(calendar: Arc<dyn CalendarApi>, policy: SuggestionPolicy) -> Self {
        Self { calendar, policy }
    }

    pub fn policy(&self) -> &SuggestionPolicy {
        &self.policy
    }

    pub async fn check_conflicts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ConflictCheckResult, CalendarApiError> {
        let events = self.calendar.list_events(start, end).await?;
        let conflicts = events
            .iter()
            .filter(|event| event.start < end && event.end > start)
            .map(ConflictingEvent::from)
            .collect::<Vec<_>>();

        if conflicts.is_empty() {
            debug!(
                event_name = "conflicts.check.clear",
                start = %start,
                end = %end,
                "requested window is free"
            );
            return Ok(ConflictCheckResult::clear());
        }

        let suggestions = suggest_alternatives(start, end, &conflicts, &self.policy);
        info!(
            event_name = "conflicts.check.detected",
            start = %start,
            end = %end,
            conflict_count = conflicts.len(),
            suggestion_count = suggestions.len(),
            "requested window overlaps existing events"
        );

        Ok(ConflictCheckResult {
            has_conflict: true,
            conflicting_events: Some(conflicts),
            suggested_times: (!suggestions.is_empty()).then_some(suggestions),
        })
    }
}

/// Computes alternative slots of the requested length around `conflicts`.
///
/// Returns at least one slot whenever `conflicts` is non-empty.
pub fn suggest_alternatives(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    conflicts: &[ConflictingEvent],
    policy: &SuggestionPolicy,
) -> Vec<TimeSlot> {
    let Some(latest_end) = conflicts.iter().map(|conflict| conflict.end).max() else {
        return Vec::new();
    };
    let duration = end - start;

    let mut suggestions = [
        TimeSlot::new(start - duration, start),
        TimeSlot::new(latest_end, latest_end + duration),
    ]
    .into_iter()
    .flatten()
    .filter(|slot| policy.within_working_hours(slot))
    .collect::<Vec<_>>();

    if suggestions.is_empty() {
        let next_start = same_time_next_day(start, policy.timezone);
        if let Ok(slot) = TimeSlot::new(next_start, next_start + duration) {
            suggestions.push(slot);
        }
    }

    suggestions
}

fn same_time_next_day(start: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let local = start.with_timezone(&timezone).naive_local() + Duration::days(1);
    let resolved = timezone.from_local_datetime(&local);
    resolved
        .single()
        .or_else(|| resolved.earliest())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or(start + Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{
        suggest_alternatives, ConflictChecker, ConflictingEvent, SuggestionPolicy, UNTITLED_EVENT,
    };
    use crate::calendar::{CalendarApiError, ExistingEvent, InMemoryCalendar};
    use crate::domain::intent::TimeSlot;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn existing(summary: Option<&str>, start: DateTime<Utc>, end: DateTime<Utc>) -> ExistingEvent {
        ExistingEvent { id: None, summary: summary.map(str::to_string), start, end }
    }

    fn checker(events: Vec<ExistingEvent>) -> (ConflictChecker, InMemoryCalendar) {
        let calendar = InMemoryCalendar::with_events(events);
        let checker = ConflictChecker::new(Arc::new(calendar.clone()), SuggestionPolicy::default());
        (checker, calendar)
    }

    #[tokio::test]
    async fn free_window_reports_no_conflict() {
        let (checker, _) = checker(vec![existing(Some("Lunch"), at(12, 0), at(13, 0))]);

        let result = checker.check_conflicts(at(14, 0), at(15, 0)).await.unwrap();
        assert!(!result.has_conflict);
        assert!(result.conflicting_events.is_none());
        assert!(result.suggested_times.is_none());
    }

    #[tokio::test]
    async fn touching_events_do_not_conflict() {
        let (checker, _) = checker(vec![existing(Some("Sync"), at(13, 0), at(14, 0))]);

        let result = checker.check_conflicts(at(14, 0), at(15, 0)).await.unwrap();
        assert!(!result.has_conflict);
    }

    #[tokio::test]
    async fn overlap_yields_before_and_after_suggestions() {
        let (checker, _) = checker(vec![existing(Some("Design sync"), at(13, 30), at(14, 30))]);

        let result = checker.check_conflicts(at(14, 0), at(15, 0)).await.unwrap();
        assert!(result.has_conflict);

        let conflicts = result.conflicting_events.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].summary, "Design sync");

        let suggestions = result.suggested_times.unwrap();
        assert!(suggestions.iter().any(|slot| slot.start == at(13, 0) && slot.end == at(14, 0)));
        assert!(suggestions.iter().any(|slot| slot.start == at(14, 30) && slot.end == at(15, 30)));
    }

    #[tokio::test]
    async fn untitled_events_get_a_placeholder_summary() {
        let (checker, _) = checker(vec![existing(None, at(10, 0), at(11, 0))]);

        let result = checker.check_conflicts(at(10, 30), at(11, 30)).await.unwrap();
        let conflicts = result.conflicting_events.unwrap();
        assert_eq!(conflicts[0].summary, UNTITLED_EVENT);
    }

    #[tokio::test]
    async fn calendar_failures_propagate() {
        let (checker, calendar) = checker(Vec::new());
        calendar.set_fail_reads(true);

        let error = checker.check_conflicts(at(10, 0), at(11, 0)).await.unwrap_err();
        assert!(matches!(error, CalendarApiError::Unavailable(_)));
    }

    #[test]
    fn falls_back_to_next_day_outside_working_hours() {
        let conflicts = vec![ConflictingEvent {
            summary: "Late call".to_string(),
            start: at(17, 0),
            end: at(19, 0),
        }];

        let suggestions =
            suggest_alternatives(at(18, 0), at(19, 0), &conflicts, &SuggestionPolicy::default());

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].start, Utc.with_ymd_and_hms(2026, 3, 3, 18, 0, 0).unwrap());
        assert_eq!(suggestions[0].end, Utc.with_ymd_and_hms(2026, 3, 3, 19, 0, 0).unwrap());
    }

    #[test]
    fn working_hours_are_checked_in_the_policy_zone() {
        let policy = SuggestionPolicy::new(chrono_tz::America::New_York, 9, 17);
        let conflicts = vec![ConflictingEvent {
            summary: "Standup".to_string(),
            start: at(14, 0),
            end: at(15, 0),
        }];

        // 14:00 UTC is 09:00 in New York, so the "before" slot falls at 08:00 local.
        let suggestions = suggest_alternatives(at(14, 0), at(15, 0), &conflicts, &policy);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].start, at(15, 0));
    }

    #[test]
    fn next_day_fallback_keeps_local_clock_time_across_dst() {
        let policy = SuggestionPolicy::new(chrono_tz::America::New_York, 9, 17);
        // 2026-03-07 20:00 EST is 2026-03-08 01:00 UTC; DST starts on 2026-03-08.
        let start = Utc.with_ymd_and_hms(2026, 3, 8, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 8, 2, 0, 0).unwrap();
        let conflicts = vec![ConflictingEvent { summary: "Dinner".to_string(), start, end }];

        let suggestions = suggest_alternatives(start, end, &conflicts, &policy);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].start, Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn slot_ending_inside_the_closing_hour_is_accepted() {
        let conflicts = vec![ConflictingEvent {
            summary: "Offsite".to_string(),
            start: at(8, 30),
            end: at(16, 30),
        }];

        let suggestions =
            suggest_alternatives(at(9, 0), at(10, 0), &conflicts, &SuggestionPolicy::default());

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].start, at(16, 30));
        assert_eq!(suggestions[0].end, at(17, 30));
    }

    #[test]
    fn working_hours_compare_whole_hours() {
        let policy = SuggestionPolicy::default();
        let slot = |start, end| TimeSlot::new(start, end).unwrap();

        assert!(policy.within_working_hours(&slot(at(9, 0), at(10, 0))));
        assert!(policy.within_working_hours(&slot(at(16, 30), at(17, 30))));
        assert!(!policy.within_working_hours(&slot(at(8, 30), at(9, 30))));
        assert!(!policy.within_working_hours(&slot(at(16, 30), at(18, 0))));

        let late = SuggestionPolicy::new(Tz::UTC, 9, 24);
        let midnight = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
        assert!(late.within_working_hours(&slot(at(23, 0), midnight)));
    }

    #[test]
    fn no_conflicts_means_no_suggestions() {
        let policy = SuggestionPolicy::new(Tz::UTC, 9, 17);
        assert!(suggest_alternatives(at(9, 0), at(10, 0), &[], &policy).is_empty());
    }
}
