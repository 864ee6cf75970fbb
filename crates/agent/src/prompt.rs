//! Prompt assembly for the intent oracle.
//!
//! The prompt pins the oracle to a single JSON object and carries the user's
//! zone, local clock and, mid-conversation, what is already known about the
//! draft so short answers ("3pm", "alice@example.com") land on the right field.

use std::fmt::Write as _;

use chrono_tz::Tz;
use timebridge_core::context::TimeContext;
use timebridge_core::domain::session::{EventSession, SessionField};

const RESPONSE_SHAPE: &str = r#"{
  "action": "create|modify|view|delete|check_availability",
  "confidence": 0.0 to 1.0,
  "parameters": {
    "dateTime": {
      "start": "ISO string with timezone",
      "end": "ISO string with timezone",
      "duration": "minutes, only when no end is given",
      "isAllDay": boolean
    },
    "title": "string",
    "guests": ["email addresses"],
    "description": "string",
    "location": "string",
    "recurrence": "RRULE string"
  },
  "missingInfo": ["list of required fields that are missing"]
}"#;

/// What the assistant already knows about the draft it is collecting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DraftContext {
    pub pending: Option<SessionField>,
    pub known_fields: Vec<(&'static str, String)>,
}

impl DraftContext {
    pub fn from_session(session: &EventSession, timezone: Tz) -> Self {
        let mut known_fields = Vec::new();
        if let Some(title) = &session.title {
            known_fields.push(("title", title.clone()));
        }
        if let Some(start) = session.start_time {
            known_fields.push(("start", start.with_timezone(&timezone).to_rfc3339()));
        }
        if let Some(end) = session.end_time {
            known_fields.push(("end", end.with_timezone(&timezone).to_rfc3339()));
        }
        if let Some(guests) = &session.guests {
            let value = if guests.is_empty() { "none".to_string() } else { guests.join(", ") };
            known_fields.push(("guests", value));
        }
        if let Some(description) = &session.description {
            known_fields.push(("description", description.clone()));
        }
        if let Some(location) = &session.location {
            known_fields.push(("location", location.clone()));
        }
        if let Some(recurrence) = &session.recurrence {
            known_fields.push(("recurrence", recurrence.clone()));
        }

        Self { pending: session.pending, known_fields }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.known_fields.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        context: &TimeContext,
        message: &str,
        draft: Option<&DraftContext>,
    ) -> String {
        let timezone = context.timezone.name();
        let local_now = context.local_now();

        let mut prompt = String::with_capacity(2_048);
        prompt.push_str("You are an AI assistant helping with calendar management.\n");
        prompt.push_str("Current context:\n");
        let _ = writeln!(prompt, "- User's timezone: {timezone}");
        let _ = writeln!(prompt, "- Local time: {}", local_now.format("%A, %B %-d, %Y %-I:%M %p"));
        if let Some(city) = context.city.as_deref().filter(|city| !city.trim().is_empty()) {
            let _ = writeln!(prompt, "- Location: {city}");
        }

        prompt.push_str(
            "\nAnalyze the following calendar-related request and provide a JSON response with \
             these fields:\n",
        );
        prompt.push_str(RESPONSE_SHAPE);
        prompt.push_str("\n\nConsider these rules:\n");
        let _ = writeln!(
            prompt,
            "1. Times should be interpreted in the user's timezone ({timezone})"
        );
        let _ = writeln!(
            prompt,
            "2. For relative times like \"tomorrow\", use {} as reference",
            local_now.to_rfc3339()
        );
        prompt.push_str("3. Default meeting duration is 1 hour unless specified\n");
        prompt.push_str("4. If time is ambiguous, ask for clarification\n");
        prompt.push_str("5. Detect recurring patterns (daily, weekly, monthly)\n");
        prompt.push_str("6. Extract guest emails if provided\n");
        prompt.push_str("7. Confidence should be lower if any ambiguity exists\n");
        prompt.push_str("8. Reply with the JSON object only, without markdown or commentary\n");

        if let Some(draft) = draft.filter(|draft| !draft.is_empty()) {
            prompt.push_str("\nConversation so far (an event is being created):\n");
            for (field, value) in &draft.known_fields {
                let _ = writeln!(prompt, "- Known {field}: {value}");
            }
            if let Some(pending) = draft.pending {
                let _ = writeln!(
                    prompt,
                    "- The assistant just asked for the {}. Treat the request as the answer to \
                     that question and use action \"create\".",
                    pending_label(pending)
                );
            }
        }

        let _ = write!(prompt, "\nUser request: \"{}\"", message.trim());
        prompt
    }
}

fn pending_label(field: SessionField) -> &'static str {
    match field {
        SessionField::Title => "event title",
        SessionField::StartTime => "event date and start time",
        SessionField::Guests => "guest email addresses (an empty list means no guests)",
        SessionField::Description => "event description",
        SessionField::Location => "event location",
        SessionField::Recurrence => "recurrence pattern as an RRULE",
        SessionField::Duration => "event duration",
    }
}
