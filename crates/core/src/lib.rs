pub mod audit;
pub mod builder;
pub mod calendar;
pub mod config;
pub mod conflicts;
pub mod context;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod provider;

pub use calendar::{CalendarApi, CalendarApiError, ExistingEvent, InMemoryCalendar, InsertedEvent};
pub use conflicts::{ConflictCheckResult, ConflictChecker, ConflictingEvent, SuggestionPolicy};
pub use context::{ContextProvider, FixedContextProvider, SystemContextProvider, TimeContext};
pub use domain::event::{CalendarDefaults, EventDetails, EventGuest, EventVisibility};
pub use domain::intent::{CalendarAction, CalendarIntent, IntentParameters, RequestedTime, TimeSlot};
pub use domain::session::{EventSession, SessionField};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{DialogueState, FlowEngine};
pub use provider::ProviderEvent;
