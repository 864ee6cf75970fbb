use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventVisibility {
    Default,
    Public,
    Private,
}

impl EventVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl std::str::FromStr for EventVisibility {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => {
                Err(format!("unsupported visibility `{other}` (expected default|public|private)"))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMethod {
    Popup,
    Email,
}

impl ReminderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Popup => "popup",
            Self::Email => "email",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReminder {
    pub method: ReminderMethod,
    pub minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGuest {
    pub email: String,
    pub optional: Option<bool>,
}

impl EventGuest {
    pub fn required(email: impl Into<String>) -> Self {
        Self { email: email.into(), optional: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestPermissions {
    pub can_invite_others: bool,
    pub can_see_guest_list: bool,
    pub can_modify_event: bool,
}

/// A fully resolved event, ready for [`crate::builder::build`].
///
/// `end` may be left open; the builder applies the one hour default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    pub timezone: Tz,
    pub description: Option<String>,
    pub location: Option<String>,
    pub guests: Vec<EventGuest>,
    pub guest_permissions: Option<GuestPermissions>,
    pub use_conferencing: bool,
    pub reminders: Vec<EventReminder>,
    pub color: Option<String>,
    pub visibility: Option<EventVisibility>,
    pub recurrence: Option<String>,
    pub calendar_id: Option<String>,
}

impl EventDetails {
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            title: title.into(),
            start,
            end: None,
            is_all_day: false,
            timezone,
            description: None,
            location: None,
            guests: Vec::new(),
            guest_permissions: None,
            use_conferencing: false,
            reminders: Vec::new(),
            color: None,
            visibility: None,
            recurrence: None,
            calendar_id: None,
        }
    }
}

/// Per-deployment settings layered onto every event created from chat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalendarDefaults {
    pub calendar_id: Option<String>,
    pub use_conferencing: bool,
    pub reminders: Vec<EventReminder>,
    pub visibility: Option<EventVisibility>,
}
