use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::provider::ProviderEvent;

/// An event already on the calendar, with recurring events expanded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedEvent {
    pub id: String,
    pub html_link: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CalendarApiError {
    #[error("calendar service unavailable: {0}")]
    Unavailable(String),
    #[error("calendar service rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Calendar backend the assistant reads from and writes to.
///
/// Implementations own transport, auth and retry. `list_events` returns the
/// single instances overlapping `[time_min, time_max)` ordered by start.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<ExistingEvent>, CalendarApiError>;

    async fn insert_event(&self, event: &ProviderEvent) -> Result<InsertedEvent, CalendarApiError>;
}

#[derive(Clone, Default)]
pub struct InMemoryCalendar {
    events: Arc<Mutex<Vec<ExistingEvent>>>,
    inserted: Arc<Mutex<Vec<ProviderEvent>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryCalendar {
    pub fn with_events(events: Vec<ExistingEvent>) -> Self {
        let calendar = Self::default();
        *lock(&calendar.events) = events;
        calendar
    }

    pub fn add_event(&self, event: ExistingEvent) {
        lock(&self.events).push(event);
    }

    pub fn inserted(&self) -> Vec<ProviderEvent> {
        lock(&self.inserted).clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarApi for InMemoryCalendar {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<ExistingEvent>, CalendarApiError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CalendarApiError::Unavailable("in-memory calendar read failure".into()));
        }

        let mut matching = lock(&self.events)
            .iter()
            .filter(|event| event.start < time_max && event.end > time_min)
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by_key(|event| event.start);
        Ok(matching)
    }

    async fn insert_event(&self, event: &ProviderEvent) -> Result<InsertedEvent, CalendarApiError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalendarApiError::Rejected {
                status: 503,
                message: "in-memory calendar write failure".into(),
            });
        }

        let (Some(start), Some(end)) = (event.start.to_instant(), event.end.to_instant()) else {
            return Err(CalendarApiError::Rejected {
                status: 400,
                message: "event start/end could not be read".into(),
            });
        };

        let id = Uuid::new_v4().simple().to_string();
        lock(&self.events).push(ExistingEvent {
            id: Some(id.clone()),
            summary: Some(event.summary.clone()),
            start,
            end,
        });
        lock(&self.inserted).push(event.clone());

        Ok(InsertedEvent { html_link: format!("memory://calendar/events/{id}"), id })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
