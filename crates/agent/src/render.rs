//! User-facing reply text.
//!
//! Every string the assistant says lives here so the dialogue code only
//! decides *what* to say.

use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use timebridge_core::calendar::{ExistingEvent, InsertedEvent};
use timebridge_core::conflicts::{ConflictCheckResult, UNTITLED_EVENT};
use timebridge_core::domain::event::EventDetails;
use timebridge_core::domain::intent::{default_event_duration, CalendarAction, TimeSlot};
use timebridge_core::domain::session::{EventSession, SessionField};

const TIME_FORMAT: &str = "%a, %b %-d, %Y %-I:%M %p";
const DATE_FORMAT: &str = "%a, %b %-d, %Y";

pub fn question(field: SessionField) -> String {
    match field {
        SessionField::Title => "What would you like to title this event?",
        SessionField::StartTime => "When would you like to schedule this event?",
        SessionField::Guests => {
            "Would you like to add any guests to this event? Please provide their email \
             addresses, or say 'no guests'."
        }
        SessionField::Description => {
            "Would you like to add a description to the event? If not, say 'no description'."
        }
        SessionField::Location => {
            "Where will this event take place? If it's virtual, say 'virtual' or provide a \
             meeting link."
        }
        SessionField::Recurrence => {
            "Should this be a recurring event? If so, please specify the pattern (daily, \
             weekly, monthly)."
        }
        SessionField::Duration => "How long should the event last?",
    }
    .to_string()
}

pub fn unclear() -> String {
    "I'm not sure what kind of calendar operation you want to perform. Could you please \
     rephrase your request?"
        .to_string()
}

pub fn start_over() -> String {
    "Okay, let's start over. What event would you like to create?".to_string()
}

pub fn cancelled() -> String {
    "Okay, I've cancelled that event. Let me know if you'd like to create another one."
        .to_string()
}

pub fn unsupported(action: CalendarAction) -> String {
    let verb = match action {
        CalendarAction::Modify => "change existing events",
        CalendarAction::Delete => "delete events",
        _ => "do that",
    };
    format!(
        "Sorry, I can't {verb} from chat yet. I can create new events, show your schedule, \
         or check your availability."
    )
}

pub fn commit_failed(user_message: &str) -> String {
    format!(
        "I'm sorry, I couldn't create the event. {user_message}\n\nSay 'yes' to try again, or \
         'cancel' to discard it."
    )
}

/// Summary shown before committing, ending with the confirmation question.
pub fn confirmation(
    session: &EventSession,
    fallback_timezone: Tz,
    conflicts: Option<&ConflictCheckResult>,
) -> String {
    let timezone = session.timezone.unwrap_or(fallback_timezone);
    let mut reply = String::from("Here's the event I'm about to create:\n");

    if let Some(title) = &session.title {
        let _ = writeln!(reply, "Title: {title}");
    }
    if let Some(start) = session.start_time {
        let end = session.end_time.unwrap_or(start + default_event_duration());
        let _ = writeln!(reply, "Time: {}", window(start, end, session.is_all_day, timezone));
        if !session.is_all_day {
            let _ = writeln!(reply, "Duration: {}", describe_duration(end - start));
        }
    }
    match session.guests.as_deref() {
        Some(guests) if !guests.is_empty() => {
            let _ = writeln!(reply, "Guests: {}", guests.join(", "));
        }
        _ => reply.push_str("No guests\n"),
    }
    match &session.description {
        Some(description) => {
            let _ = writeln!(reply, "Description: {description}");
        }
        None => reply.push_str("No description\n"),
    }
    if let Some(location) = &session.location {
        let _ = writeln!(reply, "Location: {location}");
    }
    if let Some(recurrence) = &session.recurrence {
        let _ = writeln!(reply, "Recurring: {recurrence}");
    }

    if let Some(result) = conflicts.filter(|result| result.has_conflict) {
        reply.push('\n');
        reply.push_str(&conflict_notice(result, timezone));
    }

    reply.push_str("\nShall I create this event?");
    reply
}

pub fn created(details: &EventDetails, inserted: &InsertedEvent) -> String {
    let end = details.end.unwrap_or(details.start + default_event_duration());
    let mut reply = String::from("Great! I've created your event:\n");
    let _ = writeln!(reply, "Title: {}", details.title);
    let _ = writeln!(
        reply,
        "Time: {}",
        window(details.start, end, details.is_all_day, details.timezone)
    );
    if details.guests.is_empty() {
        reply.push_str("No guests\n");
    } else {
        let emails = details.guests.iter().map(|guest| guest.email.as_str()).collect::<Vec<_>>();
        let _ = writeln!(reply, "Guests: {}", emails.join(", "));
    }
    match &details.description {
        Some(description) => {
            let _ = writeln!(reply, "Description: {description}");
        }
        None => reply.push_str("No description\n"),
    }
    let _ = write!(reply, "\nYou can view it here: {}", inserted.html_link);
    reply
}

pub fn agenda(events: &[ExistingEvent], slot: &TimeSlot, timezone: Tz) -> String {
    let range = window(slot.start, slot.end, false, timezone);
    if events.is_empty() {
        return format!("You have no events scheduled for {range}.");
    }

    let mut reply = format!("Here's what you have scheduled for {range}:");
    for event in events {
        let summary = event.summary.as_deref().unwrap_or(UNTITLED_EVENT);
        let _ = write!(
            reply,
            "\n- {summary} ({})",
            window(event.start, event.end, false, timezone)
        );
    }
    reply
}

pub fn availability(result: &ConflictCheckResult, slot: &TimeSlot, timezone: Tz) -> String {
    let range = window(slot.start, slot.end, false, timezone);
    if !result.has_conflict {
        return format!("You're free {range}.");
    }
    format!("You're busy {range}.\n{}", conflict_notice(result, timezone))
}

pub fn availability_needs_time() -> String {
    "What time would you like me to check your availability for?".to_string()
}

fn conflict_notice(result: &ConflictCheckResult, timezone: Tz) -> String {
    let mut notice = String::from("Heads up, this overlaps with:");
    for event in result.conflicting_events.as_deref().unwrap_or_default() {
        let _ = write!(
            notice,
            "\n- {} ({})",
            event.summary,
            window(event.start, event.end, false, timezone)
        );
    }
    let suggestions = result.suggested_times.as_deref().unwrap_or_default();
    if !suggestions.is_empty() {
        notice.push_str("\nThese times are open instead:");
        for slot in suggestions {
            let _ = write!(notice, "\n- {}", window(slot.start, slot.end, false, timezone));
        }
    }
    notice.push('\n');
    notice
}

fn window(start: DateTime<Utc>, end: DateTime<Utc>, all_day: bool, timezone: Tz) -> String {
    let local_start = start.with_timezone(&timezone);
    if all_day {
        return format!("{} (all day, {})", local_start.format(DATE_FORMAT), timezone.name());
    }
    let local_end = end.with_timezone(&timezone);
    format!(
        "{} - {} ({})",
        local_start.format(TIME_FORMAT),
        local_end.format(TIME_FORMAT),
        timezone.name()
    )
}

/// "45 minutes", "1 hour", "2 hours and 30 minutes".
pub fn describe_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    let plural = if hours > 1 { "s" } else { "" };

    match (hours, minutes) {
        (0, minutes) => format!("{minutes} minutes"),
        (hours, 0) => format!("{hours} hour{plural}"),
        (hours, minutes) => format!("{hours} hour{plural} and {minutes} minutes"),
    }
}
