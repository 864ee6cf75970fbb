use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Where and when the user is, as seen at the start of a turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeContext {
    pub timezone: Tz,
    pub city: Option<String>,
    pub now: DateTime<Utc>,
}

impl TimeContext {
    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.timezone)
    }
}

pub trait ContextProvider: Send + Sync {
    fn context(&self) -> TimeContext;
}

/// Configured zone and city, wall-clock time.
#[derive(Clone, Debug)]
pub struct SystemContextProvider {
    timezone: Tz,
    city: Option<String>,
}

impl SystemContextProvider {
    pub fn new(timezone: Tz, city: Option<String>) -> Self {
        Self { timezone, city }
    }
}

impl ContextProvider for SystemContextProvider {
    fn context(&self) -> TimeContext {
        TimeContext { timezone: self.timezone, city: self.city.clone(), now: Utc::now() }
    }
}

/// Always returns the same context. Used by tests and replay tooling.
#[derive(Clone, Debug)]
pub struct FixedContextProvider {
    context: TimeContext,
}

impl FixedContextProvider {
    pub fn new(context: TimeContext) -> Self {
        Self { context }
    }

    pub fn at(timezone: Tz, now: DateTime<Utc>) -> Self {
        Self::new(TimeContext { timezone, city: None, now })
    }
}

impl ContextProvider for FixedContextProvider {
    fn context(&self) -> TimeContext {
        self.context.clone()
    }
}
