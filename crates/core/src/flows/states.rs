use serde::{Deserialize, Serialize};

use crate::domain::session::EventSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialoguePhase {
    Idle,
    Collecting,
    AwaitingConfirmation,
    Committing,
    Cancelled,
}

impl DialoguePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Committing => "committing",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn holds_session(&self) -> bool {
        matches!(self, Self::Collecting | Self::AwaitingConfirmation | Self::Committing)
    }
}

/// Conversation state with the draft carried by the phases that own one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum DialogueState {
    #[default]
    Idle,
    Collecting(EventSession),
    AwaitingConfirmation(EventSession),
    Committing(EventSession),
    Cancelled,
}

impl DialogueState {
    pub fn phase(&self) -> DialoguePhase {
        match self {
            Self::Idle => DialoguePhase::Idle,
            Self::Collecting(_) => DialoguePhase::Collecting,
            Self::AwaitingConfirmation(_) => DialoguePhase::AwaitingConfirmation,
            Self::Committing(_) => DialoguePhase::Committing,
            Self::Cancelled => DialoguePhase::Cancelled,
        }
    }

    pub fn session(&self) -> Option<&EventSession> {
        match self {
            Self::Collecting(session)
            | Self::AwaitingConfirmation(session)
            | Self::Committing(session) => Some(session),
            Self::Idle | Self::Cancelled => None,
        }
    }

    /// Rebuilds the state for `phase`, attaching `session` where the phase owns one.
    pub fn for_phase(phase: DialoguePhase, session: EventSession) -> Self {
        match phase {
            DialoguePhase::Idle => Self::Idle,
            DialoguePhase::Collecting => Self::Collecting(session),
            DialoguePhase::AwaitingConfirmation => Self::AwaitingConfirmation(session),
            DialoguePhase::Committing => Self::Committing(session),
            DialoguePhase::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueEvent {
    DraftStarted,
    DraftUpdated,
    RequiredFieldsCollected,
    CorrectionReceived,
    ConfirmationAccepted,
    ConfirmationRejected,
    CancelRequested,
    CommitSucceeded,
    CommitFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
}

impl FlowContext {
    pub fn for_session(session: &EventSession) -> Self {
        let mut missing = Vec::new();
        if session.title.is_none() {
            missing.push("title".to_owned());
        }
        if session.start_time.is_none() {
            missing.push("start_time".to_owned());
        }
        Self { missing_required_fields: missing }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueAction {
    AskFollowUp,
    CheckConflicts,
    RenderConfirmation,
    BuildProviderEvent,
    InsertEvent,
    ClearSession,
    PreserveSession,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DialoguePhase,
    pub to: DialoguePhase,
    pub event: DialogueEvent,
    pub actions: Vec<DialogueAction>,
}
