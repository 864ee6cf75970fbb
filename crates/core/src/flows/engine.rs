use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    DialogueAction, DialogueEvent, DialoguePhase, FlowContext, TransitionOutcome,
};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn initial_phase(&self) -> DialoguePhase;
    fn transition(
        &self,
        current: DialoguePhase,
        event: DialogueEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The create-event conversation: draft, confirm, commit.
#[derive(Clone, Debug, Default)]
pub struct CreateEventFlow;

impl FlowDefinition for CreateEventFlow {
    fn name(&self) -> &'static str {
        "create_event"
    }

    fn initial_phase(&self) -> DialoguePhase {
        DialoguePhase::Idle
    }

    fn transition(
        &self,
        current: DialoguePhase,
        event: DialogueEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_create_event(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn initial_phase(&self) -> DialoguePhase {
        self.flow.initial_phase()
    }

    pub fn apply(
        &self,
        current: DialoguePhase,
        event: DialogueEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: DialoguePhase,
        event: DialogueEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::in_context(
                        audit,
                        "dialogue.transition_applied",
                        AuditCategory::Dialogue,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", self.name())
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::in_context(
                        audit,
                        "dialogue.transition_rejected",
                        AuditCategory::Dialogue,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", self.name())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<CreateEventFlow> {
    fn default() -> Self {
        Self::new(CreateEventFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: DialoguePhase, missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DialoguePhase, event: DialogueEvent },
}

fn transition_create_event(
    current: DialoguePhase,
    event: DialogueEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use DialogueAction::{
        AskFollowUp, BuildProviderEvent, CheckConflicts, ClearSession, InsertEvent,
        PreserveSession, RenderConfirmation,
    };
    use DialogueEvent::{
        CancelRequested, CommitFailed, CommitSucceeded, ConfirmationAccepted,
        ConfirmationRejected, CorrectionReceived, DraftStarted, DraftUpdated,
        RequiredFieldsCollected,
    };
    use DialoguePhase::{AwaitingConfirmation, Cancelled, Collecting, Committing, Idle};

    let (to, actions) = match (current, event) {
        (Idle, DraftStarted) | (Cancelled, DraftStarted) => (Collecting, Vec::new()),
        (Collecting, DraftUpdated) => (Collecting, vec![AskFollowUp]),
        (Collecting, RequiredFieldsCollected) => {
            if !context.missing_required_fields.is_empty() {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: current,
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            (AwaitingConfirmation, vec![CheckConflicts, RenderConfirmation])
        }
        (AwaitingConfirmation, CorrectionReceived) => (Collecting, Vec::new()),
        (AwaitingConfirmation, ConfirmationAccepted) => {
            (Committing, vec![BuildProviderEvent, InsertEvent])
        }
        (AwaitingConfirmation, ConfirmationRejected) => (Idle, vec![ClearSession]),
        (Collecting, CancelRequested) | (AwaitingConfirmation, CancelRequested) => {
            (Cancelled, vec![ClearSession])
        }
        (Committing, CommitSucceeded) => (Idle, vec![ClearSession]),
        (Committing, CommitFailed) => (AwaitingConfirmation, vec![PreserveSession]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: current, event });
        }
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}
