use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::event::{CalendarDefaults, EventDetails, EventGuest};
use crate::domain::intent::{default_event_duration, IntentParameters, TimeSlot};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionField {
    Title,
    StartTime,
    Guests,
    Description,
    Location,
    Recurrence,
    Duration,
}

impl SessionField {
    /// Maps a `missingInfo` entry from the oracle onto a session field.
    pub fn from_missing_info(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "title" | "summary" => Some(Self::Title),
            "datetime" | "date_time" | "starttime" | "start_time" | "start" | "time" | "date" => {
                Some(Self::StartTime)
            }
            "guests" | "attendees" => Some(Self::Guests),
            "description" => Some(Self::Description),
            "location" => Some(Self::Location),
            "recurrence" => Some(Self::Recurrence),
            "duration" | "endtime" | "end_time" | "end" => Some(Self::Duration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::StartTime => "start_time",
            Self::Guests => "guests",
            Self::Description => "description",
            Self::Location => "location",
            Self::Recurrence => "recurrence",
            Self::Duration => "duration",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Self::Title | Self::StartTime)
    }

    fn is_extra(&self) -> bool {
        matches!(self, Self::Location | Self::Recurrence | Self::Duration)
    }
}

/// Draft of the event being assembled across turns of one conversation.
///
/// Merging never clears a filled field. `declined` holds the optional
/// fields the user chose to leave empty; `requested` holds the extra fields
/// the oracle asked about, in the order it asked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSession {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    pub guests: Option<Vec<String>>,
    pub description: Option<String>,
    pub timezone: Option<Tz>,
    pub location: Option<String>,
    pub recurrence: Option<String>,
    pub declined: BTreeSet<SessionField>,
    pub requested: Vec<SessionField>,
    pub pending: Option<SessionField>,
}

impl EventSession {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone: Some(timezone), ..Self::default() }
    }

    pub fn merge(&mut self, parameters: &IntentParameters) {
        if let Some(requested) = parameters.date_time {
            self.merge_time(requested.start, requested.end);
            self.is_all_day = requested.is_all_day;
        }
        if let Some(title) = non_blank(parameters.title.as_deref()) {
            self.title = Some(title);
            self.declined.remove(&SessionField::Title);
        }
        if let Some(guests) = &parameters.guests {
            if !guests.is_empty() {
                self.guests = Some(guests.clone());
                self.declined.remove(&SessionField::Guests);
            } else if self.guests.is_none() {
                // An explicit empty list answers the guest question.
                self.guests = Some(Vec::new());
            }
        }
        if let Some(description) = non_blank(parameters.description.as_deref()) {
            self.description = Some(description);
            self.declined.remove(&SessionField::Description);
        }
        if let Some(location) = non_blank(parameters.location.as_deref()) {
            self.location = Some(location);
            self.declined.remove(&SessionField::Location);
        }
        if let Some(recurrence) = non_blank(parameters.recurrence.as_deref()) {
            self.recurrence = Some(recurrence);
            self.declined.remove(&SessionField::Recurrence);
        }
    }

    fn merge_time(&mut self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) {
        let previous_duration = match (self.start_time, self.end_time) {
            (Some(previous_start), Some(previous_end)) => Some(previous_end - previous_start),
            _ => None,
        };
        self.start_time = Some(start);

        if let Some(end) = end {
            self.end_time = Some(end);
            self.declined.remove(&SessionField::Duration);
            return;
        }

        // A moved start keeps the supplied end while it still lies after it.
        if let Some(existing_end) = self.end_time {
            if existing_end <= start {
                self.end_time = previous_duration.map(|duration| start + duration);
            }
        }
    }

    /// Records the fields the oracle still considers missing.
    pub fn request_fields(&mut self, missing_info: &[String]) {
        for field in missing_info.iter().filter_map(|name| SessionField::from_missing_info(name)) {
            if field.is_extra() && !self.requested.contains(&field) {
                self.requested.push(field);
            }
        }
    }

    pub fn decline(&mut self, field: SessionField) {
        if !field.is_required() {
            self.declined.insert(field);
        }
    }

    /// Closes out the pending question after the user answered it.
    ///
    /// Extra fields are asked once: an answer that does not fill them counts
    /// as declined.
    pub fn settle_pending(&mut self) {
        let Some(field) = self.pending.take() else {
            return;
        };
        if field.is_extra() && !self.is_filled(field) {
            self.declined.insert(field);
        }
    }

    pub fn is_filled(&self, field: SessionField) -> bool {
        match field {
            SessionField::Title => self.title.is_some(),
            SessionField::StartTime => self.start_time.is_some(),
            SessionField::Guests => self.guests.is_some(),
            SessionField::Description => self.description.is_some(),
            SessionField::Location => self.location.is_some(),
            SessionField::Recurrence => self.recurrence.is_some(),
            SessionField::Duration => self.end_time.is_some(),
        }
    }

    pub fn is_resolved(&self, field: SessionField) -> bool {
        self.is_filled(field) || self.declined.contains(&field)
    }

    pub fn has_required_fields(&self) -> bool {
        self.title.is_some() && self.start_time.is_some()
    }

    /// The next field to ask about, or `None` when the draft is ready to confirm.
    pub fn next_field(&self) -> Option<SessionField> {
        let fixed = [
            SessionField::Title,
            SessionField::StartTime,
            SessionField::Guests,
            SessionField::Description,
        ];
        fixed
            .into_iter()
            .chain(self.requested.iter().copied())
            .find(|field| !self.is_resolved(*field))
    }

    pub fn resolved_end(&self) -> Option<DateTime<Utc>> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(start + default_event_duration()))
    }

    pub fn time_slot(&self) -> Option<TimeSlot> {
        let start = self.start_time?;
        TimeSlot::new(start, self.resolved_end()?).ok()
    }

    pub fn to_event_details(
        &self,
        fallback_timezone: Tz,
        defaults: &CalendarDefaults,
    ) -> Result<EventDetails, DomainError> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push(SessionField::Title.as_str().to_string());
        }
        if self.start_time.is_none() {
            missing.push(SessionField::StartTime.as_str().to_string());
        }
        let (Some(title), Some(start)) = (self.title.clone(), self.start_time) else {
            return Err(DomainError::IncompleteEvent { missing });
        };

        let end = self.resolved_end().unwrap_or(start + default_event_duration());
        TimeSlot::new(start, end)?;

        let guests = self
            .guests
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|email| EventGuest::required(email.clone()))
            .collect();

        Ok(EventDetails {
            title,
            start,
            end: Some(end),
            is_all_day: self.is_all_day,
            timezone: self.timezone.unwrap_or(fallback_timezone),
            description: self.description.clone(),
            location: self.location.clone(),
            guests,
            guest_permissions: None,
            use_conferencing: defaults.use_conferencing,
            reminders: defaults.reminders.clone(),
            color: None,
            visibility: defaults.visibility,
            recurrence: self.recurrence.clone(),
            calendar_id: defaults.calendar_id.clone(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
