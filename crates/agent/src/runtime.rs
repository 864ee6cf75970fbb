//! Turn handling for the create-event conversation.
//!
//! The runtime holds only injected collaborators. Everything that belongs to
//! one conversation travels in [`ConversationState`], which the caller passes
//! in and gets back with every turn, so one runtime can serve any number of
//! conversations concurrently.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timebridge_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use timebridge_core::builder;
use timebridge_core::calendar::{CalendarApi, CalendarApiError};
use timebridge_core::config::AppConfig;
use timebridge_core::conflicts::{ConflictCheckResult, ConflictChecker, SuggestionPolicy};
use timebridge_core::context::{ContextProvider, TimeContext};
use timebridge_core::domain::event::CalendarDefaults;
use timebridge_core::domain::intent::{
    CalendarAction, CalendarIntent, TimeSlot, DEFAULT_CONFIDENCE_THRESHOLD,
};
use timebridge_core::domain::session::EventSession;
use timebridge_core::errors::{ApplicationError, DomainError};
use timebridge_core::flows::{
    CreateEventFlow, DialogueEvent, DialoguePhase, DialogueState, FlowContext, FlowEngine,
    FlowTransitionError, TransitionOutcome,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{ConfirmationReply, KeywordClassifier};
use crate::intent::IntentParser;
use crate::llm::LlmClient;
use crate::prompt::DraftContext;
use crate::render;

const ACTOR: &str = "assistant";

#[derive(Clone, Debug)]
pub struct AssistantSettings {
    pub confidence_threshold: f64,
    pub calendar_defaults: CalendarDefaults,
    pub suggestion_policy: SuggestionPolicy,
}

impl AssistantSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            confidence_threshold: config.assistant.confidence_threshold,
            calendar_defaults: config.calendar.defaults(),
            suggestion_policy: config.assistant.suggestion_policy(),
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            calendar_defaults: CalendarDefaults::default(),
            suggestion_policy: SuggestionPolicy::default(),
        }
    }
}

/// Everything the assistant remembers about one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub state: DialogueState,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self { conversation_id: conversation_id.into(), state: DialogueState::Idle }
    }

    pub fn phase(&self) -> DialoguePhase {
        self.state.phase()
    }
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub conversation: ConversationState,
    pub reply: String,
    pub transitions: Vec<TransitionOutcome>,
}

/// Raised only for defects: a transition the flow forbids, or a draft that
/// reached commit without what it needs.
#[derive(Debug, Error, PartialEq)]
pub enum DialogueError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

struct Turn {
    audit: AuditContext,
    context: TimeContext,
    transitions: Vec<TransitionOutcome>,
}

type Step = (DialogueState, String);

pub struct DialogueRuntime {
    parser: IntentParser,
    classifier: KeywordClassifier,
    conflicts: ConflictChecker,
    calendar: Arc<dyn CalendarApi>,
    context: Arc<dyn ContextProvider>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<CreateEventFlow>,
    settings: AssistantSettings,
}

impl DialogueRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        calendar: Arc<dyn CalendarApi>,
        context: Arc<dyn ContextProvider>,
        audit: Arc<dyn AuditSink>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            parser: IntentParser::new(llm),
            classifier: KeywordClassifier::default(),
            conflicts: ConflictChecker::new(calendar.clone(), settings.suggestion_policy),
            calendar,
            context,
            audit,
            engine: FlowEngine::default(),
            settings,
        }
    }

    pub fn with_classifier(mut self, classifier: KeywordClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn handle_turn(
        &self,
        conversation: ConversationState,
        message: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        let ConversationState { conversation_id, state } = conversation;
        let correlation_id = Uuid::new_v4().to_string();
        let phase = state.phase();

        info!(
            event_name = "dialogue.turn.received",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            phase = phase.as_str(),
            "handling conversation turn"
        );

        let mut turn = Turn {
            audit: AuditContext::new(Some(conversation_id.clone()), correlation_id, ACTOR),
            context: self.context.context(),
            transitions: Vec::new(),
        };
        self.audit.emit(
            AuditEvent::in_context(
                &turn.audit,
                "dialogue.turn_received",
                AuditCategory::Ingress,
                AuditOutcome::Success,
            )
            .with_metadata("phase", phase.as_str()),
        );

        let (state, reply) = match state {
            DialogueState::Idle | DialogueState::Cancelled => {
                self.on_idle(&mut turn, phase, message).await?
            }
            DialogueState::Collecting(session) => {
                self.on_collecting(&mut turn, session, message).await?
            }
            DialogueState::AwaitingConfirmation(session) => {
                self.on_confirmation(&mut turn, session, message).await?
            }
            DialogueState::Committing(session) => {
                // A commit that never reported back is treated as failed.
                self.transition(
                    &mut turn,
                    DialoguePhase::Committing,
                    DialogueEvent::CommitFailed,
                    &session,
                )?;
                self.on_confirmation(&mut turn, session, message).await?
            }
        };

        debug!(
            event_name = "dialogue.turn.completed",
            correlation_id = %turn.audit.correlation_id,
            conversation_id = %conversation_id,
            from = phase.as_str(),
            to = state.phase().as_str(),
            "conversation turn handled"
        );

        Ok(TurnOutcome {
            conversation: ConversationState { conversation_id, state },
            reply,
            transitions: turn.transitions,
        })
    }

    async fn on_idle(
        &self,
        turn: &mut Turn,
        phase: DialoguePhase,
        message: &str,
    ) -> Result<Step, DialogueError> {
        let unchanged = || DialogueState::for_phase(phase, EventSession::default());
        let Some(intent) = self.usable_intent(turn, message, None).await else {
            return Ok((unchanged(), render::unclear()));
        };

        let lookup =
            matches!(intent.action, CalendarAction::View | CalendarAction::CheckAvailability);
        let starts_draft = intent.action == CalendarAction::Create
            || (!lookup && self.classifier.is_create_request(message));
        if starts_draft {
            let session = EventSession::new(turn.context.timezone);
            self.transition(turn, phase, DialogueEvent::DraftStarted, &session)?;
            return self.absorb(turn, session, &intent).await;
        }

        let reply = match intent.action {
            CalendarAction::View => self.agenda(turn, &intent).await,
            CalendarAction::CheckAvailability => self.availability(turn, &intent).await,
            action => render::unsupported(action),
        };
        Ok((unchanged(), reply))
    }

    async fn on_collecting(
        &self,
        turn: &mut Turn,
        mut session: EventSession,
        message: &str,
    ) -> Result<Step, DialogueError> {
        if self.classifier.is_cancel(message) {
            self.transition(
                turn,
                DialoguePhase::Collecting,
                DialogueEvent::CancelRequested,
                &session,
            )?;
            return Ok((DialogueState::Cancelled, render::cancelled()));
        }

        if let Some(field) = session.pending.filter(|field| !field.is_required()) {
            if self.classifier.is_decline(message) {
                debug!(
                    event_name = "dialogue.field.declined",
                    correlation_id = %turn.audit.correlation_id,
                    field = field.as_str(),
                    "optional field declined"
                );
                session.decline(field);
                session.pending = None;
                return self.advance(turn, session).await;
            }
        }

        let draft = DraftContext::from_session(&session, turn.context.timezone);
        let Some(intent) = self.usable_intent(turn, message, Some(&draft)).await else {
            let reply = session.pending.map(render::question).unwrap_or_else(render::unclear);
            return Ok((DialogueState::Collecting(session), reply));
        };
        self.absorb(turn, session, &intent).await
    }

    async fn on_confirmation(
        &self,
        turn: &mut Turn,
        session: EventSession,
        message: &str,
    ) -> Result<Step, DialogueError> {
        let phase = DialoguePhase::AwaitingConfirmation;
        match self.classifier.confirmation(message) {
            Some(ConfirmationReply::Affirmative) => self.commit(turn, session).await,
            Some(ConfirmationReply::Cancel) => {
                self.transition(turn, phase, DialogueEvent::CancelRequested, &session)?;
                Ok((DialogueState::Cancelled, render::cancelled()))
            }
            Some(ConfirmationReply::Negative) => {
                self.transition(turn, phase, DialogueEvent::ConfirmationRejected, &session)?;
                Ok((DialogueState::Idle, render::start_over()))
            }
            None => {
                let draft = DraftContext::from_session(&session, turn.context.timezone);
                let Some(intent) = self.usable_intent(turn, message, Some(&draft)).await else {
                    let conflicts = self.session_conflicts(turn, &session).await;
                    let reply =
                        render::confirmation(&session, turn.context.timezone, conflicts.as_ref());
                    return Ok((DialogueState::AwaitingConfirmation(session), reply));
                };
                self.transition(turn, phase, DialogueEvent::CorrectionReceived, &session)?;
                self.absorb(turn, session, &intent).await
            }
        }
    }

    async fn absorb(
        &self,
        turn: &mut Turn,
        mut session: EventSession,
        intent: &CalendarIntent,
    ) -> Result<Step, DialogueError> {
        session.merge(&intent.parameters);
        session.request_fields(&intent.missing_info);
        session.settle_pending();
        self.advance(turn, session).await
    }

    /// Asks the next open question, or moves to confirmation once nothing is open.
    async fn advance(
        &self,
        turn: &mut Turn,
        mut session: EventSession,
    ) -> Result<Step, DialogueError> {
        if let Some(field) = session.next_field() {
            self.transition(
                turn,
                DialoguePhase::Collecting,
                DialogueEvent::DraftUpdated,
                &session,
            )?;
            session.pending = Some(field);
            return Ok((DialogueState::Collecting(session), render::question(field)));
        }

        self.transition(
            turn,
            DialoguePhase::Collecting,
            DialogueEvent::RequiredFieldsCollected,
            &session,
        )?;
        session.pending = None;
        let conflicts = self.session_conflicts(turn, &session).await;
        let reply = render::confirmation(&session, turn.context.timezone, conflicts.as_ref());
        Ok((DialogueState::AwaitingConfirmation(session), reply))
    }

    async fn commit(&self, turn: &mut Turn, session: EventSession) -> Result<Step, DialogueError> {
        self.transition(
            turn,
            DialoguePhase::AwaitingConfirmation,
            DialogueEvent::ConfirmationAccepted,
            &session,
        )?;
        let details =
            session.to_event_details(turn.context.timezone, &self.settings.calendar_defaults)?;
        let payload = builder::build(&details);

        match self.calendar.insert_event(&payload).await {
            Ok(inserted) => {
                self.transition(
                    turn,
                    DialoguePhase::Committing,
                    DialogueEvent::CommitSucceeded,
                    &session,
                )?;
                info!(
                    event_name = "commit.event_inserted",
                    correlation_id = %turn.audit.correlation_id,
                    event_id = %inserted.id,
                    "calendar event created"
                );
                self.audit.emit(
                    AuditEvent::in_context(
                        &turn.audit,
                        "commit.event_inserted",
                        AuditCategory::Commit,
                        AuditOutcome::Success,
                    )
                    .with_metadata("event_id", inserted.id.clone())
                    .with_metadata("html_link", inserted.html_link.clone()),
                );
                Ok((DialogueState::Idle, render::created(&details, &inserted)))
            }
            Err(error) => {
                self.transition(
                    turn,
                    DialoguePhase::Committing,
                    DialogueEvent::CommitFailed,
                    &session,
                )?;
                warn!(
                    event_name = "commit.event_failed",
                    correlation_id = %turn.audit.correlation_id,
                    error = %error,
                    "calendar rejected the event; draft kept for retry"
                );
                self.audit.emit(
                    AuditEvent::in_context(
                        &turn.audit,
                        "commit.event_failed",
                        AuditCategory::Commit,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                let reply = render::commit_failed(self.user_message(turn, error));
                Ok((DialogueState::AwaitingConfirmation(session), reply))
            }
        }
    }

    async fn usable_intent(
        &self,
        turn: &Turn,
        message: &str,
        draft: Option<&DraftContext>,
    ) -> Option<CalendarIntent> {
        match self.parser.parse(message, &turn.context, draft).await {
            Ok(intent) if intent.meets_threshold(self.settings.confidence_threshold) => {
                debug!(
                    event_name = "intent.parsed",
                    correlation_id = %turn.audit.correlation_id,
                    action = intent.action.as_str(),
                    confidence = intent.confidence,
                    "intent accepted"
                );
                Some(intent)
            }
            Ok(intent) => {
                info!(
                    event_name = "intent.low_confidence",
                    correlation_id = %turn.audit.correlation_id,
                    action = intent.action.as_str(),
                    confidence = intent.confidence,
                    threshold = self.settings.confidence_threshold,
                    "intent below confidence threshold"
                );
                None
            }
            Err(failure) => {
                warn!(
                    event_name = "intent.parse_failed",
                    correlation_id = %turn.audit.correlation_id,
                    error = %failure,
                    "could not read an intent from the message"
                );
                None
            }
        }
    }

    async fn session_conflicts(
        &self,
        turn: &Turn,
        session: &EventSession,
    ) -> Option<ConflictCheckResult> {
        let slot = session.time_slot()?;
        match self.conflicts.check_conflicts(slot.start, slot.end).await {
            Ok(result) => {
                if result.has_conflict {
                    self.audit.emit(
                        AuditEvent::in_context(
                            &turn.audit,
                            "conflict.detected",
                            AuditCategory::Conflict,
                            AuditOutcome::Success,
                        )
                        .with_metadata(
                            "conflict_count",
                            result.conflicting_events.as_ref().map_or(0, Vec::len).to_string(),
                        ),
                    );
                }
                Some(result)
            }
            Err(error) => {
                warn!(
                    event_name = "conflicts.check.failed",
                    correlation_id = %turn.audit.correlation_id,
                    error = %error,
                    "conflict check failed; confirming without it"
                );
                None
            }
        }
    }

    async fn agenda(&self, turn: &Turn, intent: &CalendarIntent) -> String {
        let timezone = turn.context.timezone;
        let slot = match intent.parameters.date_time {
            Some(requested) if requested.is_all_day && requested.end.is_none() => {
                TimeSlot::new(requested.start, requested.start + Duration::days(1))
            }
            Some(requested) => requested.to_slot(),
            None => TimeSlot::new(turn.context.now, end_of_local_day(&turn.context)),
        };
        let Ok(slot) = slot else {
            return render::unclear();
        };

        match self.calendar.list_events(slot.start, slot.end).await {
            Ok(events) => render::agenda(&events, &slot, timezone),
            Err(error) => self.user_message(turn, error).to_string(),
        }
    }

    async fn availability(&self, turn: &Turn, intent: &CalendarIntent) -> String {
        let Some(requested) = intent.parameters.date_time else {
            return render::availability_needs_time();
        };
        let Ok(slot) = requested.to_slot() else {
            return render::unclear();
        };

        match self.conflicts.check_conflicts(slot.start, slot.end).await {
            Ok(result) => render::availability(&result, &slot, turn.context.timezone),
            Err(error) => self.user_message(turn, error).to_string(),
        }
    }

    fn user_message(&self, turn: &Turn, error: CalendarApiError) -> &'static str {
        ApplicationError::from(error)
            .into_interface(turn.audit.correlation_id.clone())
            .user_message()
    }

    fn transition(
        &self,
        turn: &mut Turn,
        from: DialoguePhase,
        event: DialogueEvent,
        session: &EventSession,
    ) -> Result<DialoguePhase, DialogueError> {
        let outcome = self.engine.apply_with_audit(
            from,
            event,
            &FlowContext::for_session(session),
            self.audit.as_ref(),
            &turn.audit,
        )?;
        let to = outcome.to;
        turn.transitions.push(outcome);
        Ok(to)
    }
}

fn end_of_local_day(context: &TimeContext) -> DateTime<Utc> {
    let local_now = context.local_now();
    local_now
        .date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| {
            let resolved = context.timezone.from_local_datetime(&midnight);
            resolved.single().or_else(|| resolved.earliest())
        })
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(context.now + Duration::days(1))
}
