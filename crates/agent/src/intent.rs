//! Decode boundary between the oracle's free text and a typed [`CalendarIntent`].
//!
//! Everything the oracle returns is untrusted. A response either decodes
//! into a complete intent or is rejected with a [`ParseFailure`]; nothing in
//! between reaches the dialogue.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use timebridge_core::context::TimeContext;
use timebridge_core::domain::intent::{
    CalendarAction, CalendarIntent, IntentParameters, RequestedTime,
};
use timebridge_core::domain::session::SessionField;
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::prompt::{DraftContext, PromptBuilder};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseFailure {
    #[error("intent oracle failed: {0}")]
    Oracle(String),
    #[error("oracle response is not JSON: {0}")]
    NotJson(String),
    #[error("oracle response does not match the intent schema: {0}")]
    Schema(String),
    #[error("oracle response has no action")]
    MissingAction,
    #[error("oracle response names unknown action `{0}`")]
    UnknownAction(String),
    #[error("oracle response has no confidence")]
    MissingConfidence,
    #[error("oracle confidence {0} is outside 0..=1")]
    ConfidenceOutOfRange(f64),
    #[error("oracle {field} `{value}` is not an ISO-8601 date or date-time")]
    InvalidDateTime { field: &'static str, value: String },
    #[error("oracle time window ends at or before its start")]
    InvalidTimeWindow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIntent {
    action: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    parameters: Option<RawParameters>,
    #[serde(default)]
    missing_info: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameters {
    date_time: Option<RawDateTime>,
    title: Option<String>,
    guests: Option<RawGuests>,
    description: Option<String>,
    location: Option<String>,
    recurrence: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDateTime {
    start: Option<String>,
    end: Option<String>,
    duration: Option<f64>,
    is_all_day: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGuests {
    One(String),
    Many(Vec<String>),
}

pub struct IntentParser {
    llm: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, prompts: PromptBuilder::new() }
    }

    pub async fn parse(
        &self,
        message: &str,
        context: &TimeContext,
        draft: Option<&DraftContext>,
    ) -> Result<CalendarIntent, ParseFailure> {
        let prompt = self.prompts.build(context, message, draft);
        self.parse_prompt(&prompt, context.timezone).await
    }

    /// Sends an already assembled prompt and decodes the answer.
    pub async fn parse_prompt(
        &self,
        prompt: &str,
        timezone: Tz,
    ) -> Result<CalendarIntent, ParseFailure> {
        let raw = self
            .llm
            .complete(prompt)
            .await
            .map_err(|error| ParseFailure::Oracle(error.to_string()))?;
        debug!(event_name = "intent.oracle.responded", response_len = raw.len(), "oracle answered");
        decode_intent(&raw, timezone)
    }
}

pub fn decode_intent(raw: &str, timezone: Tz) -> Result<CalendarIntent, ParseFailure> {
    let body = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|error| ParseFailure::NotJson(error.to_string()))?;
    let raw: RawIntent =
        serde_json::from_value(value).map_err(|error| ParseFailure::Schema(error.to_string()))?;

    let action = raw
        .action
        .as_deref()
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .ok_or(ParseFailure::MissingAction)?;
    let action = action
        .parse::<CalendarAction>()
        .map_err(|_| ParseFailure::UnknownAction(action.to_string()))?;

    let confidence = raw.confidence.ok_or(ParseFailure::MissingConfidence)?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ParseFailure::ConfidenceOutOfRange(confidence));
    }

    let mut missing_info = normalize_missing_info(raw.missing_info.unwrap_or_default());
    let raw_parameters = raw.parameters.unwrap_or_default();

    let date_time = match raw_parameters.date_time {
        Some(window) => decode_window(window, timezone)?,
        None => None,
    };

    let guests = raw_parameters.guests.map(|guests| match guests {
        RawGuests::One(guest) => vec![guest],
        RawGuests::Many(guests) => guests,
    });
    let guests = match guests {
        Some(supplied) => {
            let supplied_any = supplied.iter().any(|guest| !guest.trim().is_empty());
            let valid = supplied
                .into_iter()
                .map(|guest| guest.trim().to_string())
                .filter(|guest| !guest.is_empty())
                .filter(|guest| {
                    let keep = is_email_shaped(guest);
                    if !keep {
                        warn!(
                            event_name = "intent.guest.dropped",
                            guest = %guest,
                            "dropping guest that is not an email address"
                        );
                    }
                    keep
                })
                .collect::<Vec<_>>();
            if supplied_any && valid.is_empty() {
                push_missing(&mut missing_info, SessionField::Guests.as_str());
                None
            } else {
                Some(valid)
            }
        }
        None => None,
    };

    Ok(CalendarIntent {
        action,
        confidence,
        parameters: IntentParameters {
            date_time,
            title: non_blank(raw_parameters.title),
            guests,
            description: non_blank(raw_parameters.description),
            location: non_blank(raw_parameters.location),
            recurrence: non_blank(raw_parameters.recurrence),
        },
        missing_info,
    })
}

/// Longest duration accepted from the oracle: one leap year.
const MAX_DURATION_MINUTES: f64 = 60.0 * 24.0 * 366.0;

fn decode_window(window: RawDateTime, timezone: Tz) -> Result<Option<RequestedTime>, ParseFailure> {
    let Some(start_raw) = non_blank(window.start) else {
        return Ok(None);
    };
    let (start, date_only) = parse_instant("dateTime.start", &start_raw, timezone)?;
    let is_all_day = window.is_all_day.unwrap_or(false) || date_only;

    let end = match non_blank(window.end) {
        Some(end_raw) => Some(parse_instant("dateTime.end", &end_raw, timezone)?.0),
        None => match window.duration {
            Some(minutes) if minutes > 0.0 && minutes <= MAX_DURATION_MINUTES => {
                let end = Duration::try_minutes(minutes.round() as i64)
                    .and_then(|duration| start.checked_add_signed(duration))
                    .ok_or(ParseFailure::InvalidTimeWindow)?;
                Some(end)
            }
            Some(_) => return Err(ParseFailure::InvalidTimeWindow),
            None => None,
        },
    };

    let end = match end {
        Some(end) if end <= start && is_all_day => None,
        Some(end) if end <= start => return Err(ParseFailure::InvalidTimeWindow),
        other => other,
    };

    Ok(Some(RequestedTime { start, end, is_all_day }))
}

/// Returns the instant and whether the input carried a date only.
fn parse_instant(
    field: &'static str,
    value: &str,
    timezone: Tz,
) -> Result<(DateTime<Utc>, bool), ParseFailure> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok((parsed.with_timezone(&Utc), false));
    }

    const LOCAL_FORMATS: [&str; 4] =
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
    let local = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| (naive, false))
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| (naive, true))
        });

    let invalid = || ParseFailure::InvalidDateTime { field, value: value.to_string() };
    let (naive, date_only) = local.ok_or_else(invalid)?;
    let resolved = timezone.from_local_datetime(&naive);
    let instant = resolved.single().or_else(|| resolved.earliest()).ok_or_else(invalid)?;
    Ok((instant.with_timezone(&Utc), date_only))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    let rest = match rest.find('\n') {
        Some(newline) if !rest[..newline].trim_start().starts_with('{') => &rest[newline + 1..],
        _ => rest,
    };
    rest.trim()
}

fn normalize_missing_info(entries: Vec<String>) -> Vec<String> {
    let mut normalized = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let name = SessionField::from_missing_info(entry)
            .map(|field| field.as_str().to_string())
            .unwrap_or_else(|| entry.to_string());
        push_missing(&mut normalized, &name);
    }
    normalized
}

fn push_missing(missing: &mut Vec<String>, name: &str) {
    if !missing.iter().any(|existing| existing == name) {
        missing.push(name.to_string());
    }
}

fn is_email_shaped(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
