//! Maps resolved [`EventDetails`] onto the provider's event payload.
//!
//! The mapping is a pure function of its input apart from the conference
//! request id, which is freshly generated on every call so the provider can
//! de-duplicate retries of the same payload but never conflate two builds.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::domain::event::EventDetails;
use crate::domain::intent::default_event_duration;
use crate::provider::{
    ConferenceCreateRequest, ConferenceData, ConferenceSolutionKey, ProviderAttendee,
    ProviderDateTime, ProviderEvent, ProviderReminderOverride, ProviderReminders,
};

pub const CONFERENCE_SOLUTION: &str = "hangoutsMeet";

/// # Panics
///
/// When `details` has a blank title or ends before it starts; callers build
/// details through `EventSession::to_event_details`, which rejects both.
pub fn build(details: &EventDetails) -> ProviderEvent {
    let end = details.end.unwrap_or(details.start + default_event_duration());
    assert!(!details.title.trim().is_empty(), "event title must be resolved before build");
    assert!(end >= details.start, "event end must not precede its start");

    let (start, end) = if details.is_all_day {
        let end = details.end.unwrap_or(details.start);
        (all_day(details.start, details.timezone), all_day(end, details.timezone))
    } else {
        (timed(details.start, details.timezone), timed(end, details.timezone))
    };

    let attendees = (!details.guests.is_empty()).then(|| {
        details
            .guests
            .iter()
            .map(|guest| ProviderAttendee { email: guest.email.clone(), optional: guest.optional })
            .collect()
    });

    let reminders = (!details.reminders.is_empty()).then(|| ProviderReminders {
        use_default: false,
        overrides: details
            .reminders
            .iter()
            .map(|reminder| ProviderReminderOverride {
                method: reminder.method.as_str().to_string(),
                minutes: reminder.minutes,
            })
            .collect(),
    });

    let conference_data = details.use_conferencing.then(|| ConferenceData {
        create_request: ConferenceCreateRequest {
            request_id: Uuid::new_v4().to_string(),
            conference_solution_key: ConferenceSolutionKey { kind: CONFERENCE_SOLUTION.into() },
        },
    });

    let permissions = details.guest_permissions;

    ProviderEvent {
        calendar_id: details.calendar_id.clone(),
        summary: details.title.clone(),
        description: details.description.clone(),
        start,
        end,
        location: details.location.clone(),
        conference_data,
        attendees,
        guests_can_invite_others: permissions.map(|p| p.can_invite_others),
        guests_can_see_other_guests: permissions.map(|p| p.can_see_guest_list),
        guests_can_modify: permissions.map(|p| p.can_modify_event),
        reminders,
        color_id: details.color.clone(),
        visibility: details.visibility.map(|visibility| visibility.as_str().to_string()),
        recurrence: details.recurrence.as_deref().map(recurrence_lines),
    }
}

fn timed(instant: DateTime<Utc>, timezone: Tz) -> ProviderDateTime {
    ProviderDateTime {
        date_time: Some(instant.with_timezone(&timezone).to_rfc3339()),
        date: None,
        time_zone: Some(timezone.name().to_string()),
    }
}

fn all_day(instant: DateTime<Utc>, timezone: Tz) -> ProviderDateTime {
    ProviderDateTime {
        date_time: None,
        date: Some(instant.with_timezone(&timezone).date_naive()),
        time_zone: Some(timezone.name().to_string()),
    }
}

fn recurrence_lines(rule: &str) -> Vec<String> {
    let rule = rule.trim();
    if rule.to_ascii_uppercase().starts_with("RRULE:") {
        vec![rule.to_string()]
    } else {
        vec![format!("RRULE:{rule}")]
    }
}
