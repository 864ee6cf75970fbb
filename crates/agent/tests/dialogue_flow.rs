use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use timebridge_agent::llm::{LlmClient, ScriptedLlmClient};
use timebridge_agent::render;
use timebridge_agent::runtime::{
    AssistantSettings, ConversationState, DialogueRuntime, TurnOutcome,
};
use timebridge_core::audit::InMemoryAuditSink;
use timebridge_core::calendar::{ExistingEvent, InMemoryCalendar};
use timebridge_core::conflicts::SuggestionPolicy;
use timebridge_core::context::{FixedContextProvider, TimeContext};
use timebridge_core::domain::event::CalendarDefaults;
use timebridge_core::domain::session::{EventSession, SessionField};
use timebridge_core::flows::{DialogueEvent, DialoguePhase, DialogueState};

const NEW_YORK: Tz = chrono_tz::America::New_York;

/// Monday 2026-03-02, 9:30 AM in New York.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap()
}

/// Tuesday 2026-03-03 at `hour:minute` New York time.
fn tomorrow(hour: u32, minute: u32) -> DateTime<Utc> {
    NEW_YORK.with_ymd_and_hms(2026, 3, 3, hour, minute, 0).unwrap().with_timezone(&Utc)
}

struct Harness {
    llm: ScriptedLlmClient,
    calendar: InMemoryCalendar,
    audit: InMemoryAuditSink,
    runtime: DialogueRuntime,
}

fn harness() -> Harness {
    harness_with(ScriptedLlmClient::default(), InMemoryCalendar::default())
}

fn harness_with(llm: ScriptedLlmClient, calendar: InMemoryCalendar) -> Harness {
    let audit = InMemoryAuditSink::default();
    let runtime = DialogueRuntime::new(
        Arc::new(llm.clone()),
        Arc::new(calendar.clone()),
        Arc::new(FixedContextProvider::new(context())),
        Arc::new(audit.clone()),
        settings(),
    );
    Harness { llm, calendar, audit, runtime }
}

fn context() -> TimeContext {
    TimeContext { timezone: NEW_YORK, city: Some("New York".to_string()), now: now() }
}

fn settings() -> AssistantSettings {
    AssistantSettings {
        calendar_defaults: CalendarDefaults {
            calendar_id: Some("primary".to_string()),
            ..CalendarDefaults::default()
        },
        suggestion_policy: SuggestionPolicy::new(NEW_YORK, 9, 17),
        ..AssistantSettings::default()
    }
}

fn ready_session(title: &str, start: DateTime<Utc>) -> EventSession {
    let mut session = EventSession::new(NEW_YORK);
    session.title = Some(title.to_string());
    session.start_time = Some(start);
    session.guests = Some(Vec::new());
    session.decline(SessionField::Description);
    session
}

fn conversation(state: DialogueState) -> ConversationState {
    ConversationState { conversation_id: "conv-1".to_string(), state }
}

fn events(outcome: &TurnOutcome) -> Vec<DialogueEvent> {
    outcome.transitions.iter().map(|transition| transition.event).collect()
}

#[tokio::test]
async fn vague_create_request_asks_for_a_title() {
    let harness = harness();
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,
            "parameters":{"dateTime":{"start":"2026-03-03T15:00:00-05:00"}},
            "missingInfo":["title"]}"#,
    );

    let outcome = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "schedule a meeting tomorrow at 3pm")
        .await
        .expect("turn succeeds");

    assert_eq!(outcome.reply, "What would you like to title this event?");
    assert_eq!(events(&outcome), vec![DialogueEvent::DraftStarted, DialogueEvent::DraftUpdated]);
    let DialogueState::Collecting(session) = &outcome.conversation.state else {
        panic!("expected collecting, got {:?}", outcome.conversation.state);
    };
    assert_eq!(session.start_time, Some(tomorrow(15, 0)));
    assert_eq!(session.pending, Some(SessionField::Title));
    assert!(harness.llm.prompts()[0].contains("User's timezone: America/New_York"));
}

#[tokio::test]
async fn full_conversation_creates_the_event() {
    let harness = harness();
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.95,
            "parameters":{"title":"Standup","dateTime":{"start":"2026-03-03T09:00:00-05:00"}},
            "missingInfo":[]}"#,
    );

    let first = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "create a standup tomorrow at 9am")
        .await
        .unwrap();
    assert_eq!(first.reply, render::question(SessionField::Guests));

    let second = harness.runtime.handle_turn(first.conversation, "no guests").await.unwrap();
    assert_eq!(second.reply, render::question(SessionField::Description));

    let third = harness.runtime.handle_turn(second.conversation, "No description").await.unwrap();
    assert_eq!(third.conversation.phase(), DialoguePhase::AwaitingConfirmation);
    assert!(third.reply.contains("Title: Standup"));
    assert!(third.reply.contains("No guests"));
    assert!(third.reply.contains("No description"));
    assert!(third.reply.ends_with("Shall I create this event?"));
    assert_eq!(events(&third), vec![DialogueEvent::RequiredFieldsCollected]);

    let fourth = harness.runtime.handle_turn(third.conversation, "yes").await.unwrap();
    assert_eq!(fourth.conversation.state, DialogueState::Idle);
    assert_eq!(
        events(&fourth),
        vec![DialogueEvent::ConfirmationAccepted, DialogueEvent::CommitSucceeded]
    );
    assert!(fourth.reply.starts_with("Great! I've created your event:\nTitle: Standup"));
    assert!(fourth.reply.contains("You can view it here: memory://calendar/events/"));

    let inserted = harness.calendar.inserted();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].summary, "Standup");
    assert_eq!(inserted[0].calendar_id.as_deref(), Some("primary"));
    assert_eq!(inserted[0].start.time_zone.as_deref(), Some("America/New_York"));
    assert_eq!(inserted[0].end.to_instant(), Some(tomorrow(10, 0)));

    // Decline and confirmation replies are read locally.
    assert_eq!(harness.llm.call_count(), 1);
    assert_eq!(harness.audit.events_of_type("commit.event_inserted").len(), 1);
    assert_eq!(harness.audit.events_of_type("dialogue.transition_applied").len(), 6);
}

#[tokio::test]
async fn guest_answers_are_merged_into_the_draft() {
    let harness = harness();
    let mut session = EventSession::new(NEW_YORK);
    session.title = Some("Planning".to_string());
    session.start_time = Some(tomorrow(11, 0));
    session.pending = Some(SessionField::Guests);
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,
            "parameters":{"guests":["alice@example.com","bob@example.com"]}}"#,
    );

    let outcome = harness
        .runtime
        .handle_turn(
            conversation(DialogueState::Collecting(session)),
            "alice@example.com and bob@example.com",
        )
        .await
        .unwrap();

    assert_eq!(outcome.reply, render::question(SessionField::Description));
    let session = outcome.conversation.state.session().expect("draft kept");
    assert_eq!(
        session.guests,
        Some(vec!["alice@example.com".to_string(), "bob@example.com".to_string()])
    );
    assert!(harness.llm.prompts()[0].contains("The assistant just asked for the guest email"));
}

#[tokio::test]
async fn low_confidence_and_parse_failures_leave_state_unchanged() {
    let harness = harness();
    let mut session = ready_session("Review", tomorrow(11, 0));
    session.guests = None;
    session.pending = Some(SessionField::Guests);
    let before = conversation(DialogueState::Collecting(session));

    harness
        .llm
        .push_response(r#"{"action":"create","confidence":0.4,"parameters":{"title":"Lunch"}}"#);
    let outcome = harness.runtime.handle_turn(before.clone(), "hmm maybe").await.unwrap();
    assert_eq!(outcome.conversation, before);
    assert_eq!(outcome.reply, render::question(SessionField::Guests));
    assert!(outcome.transitions.is_empty());

    harness.llm.push_response("Sure! Here's what I think you mean.");
    let outcome = harness.runtime.handle_turn(before.clone(), "whatever").await.unwrap();
    assert_eq!(outcome.conversation, before);

    harness.llm.push_response(r#"{"action":"create","confidence":0.5}"#);
    let outcome =
        harness.runtime.handle_turn(ConversationState::new("conv-2"), "meeting?").await.unwrap();
    assert_eq!(outcome.conversation.state, DialogueState::Idle);
    assert_eq!(outcome.reply, render::unclear());
}

#[tokio::test]
async fn confidence_at_the_threshold_is_accepted() {
    let harness = harness();
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.7,"parameters":{},
            "missingInfo":["title","dateTime"]}"#,
    );

    let outcome =
        harness.runtime.handle_turn(ConversationState::new("conv-1"), "new event").await.unwrap();
    assert_eq!(outcome.conversation.phase(), DialoguePhase::Collecting);
    assert_eq!(outcome.reply, render::question(SessionField::Title));
}

#[tokio::test]
async fn failed_commit_keeps_the_draft_for_a_retry() {
    let harness = harness();
    harness.calendar.set_fail_writes(true);
    let state = DialogueState::AwaitingConfirmation(ready_session("Retro", tomorrow(13, 0)));

    let failed = harness.runtime.handle_turn(conversation(state.clone()), "yes").await.unwrap();
    assert_eq!(failed.conversation.state, state);
    assert_eq!(
        events(&failed),
        vec![DialogueEvent::ConfirmationAccepted, DialogueEvent::CommitFailed]
    );
    assert!(failed.reply.starts_with("I'm sorry, I couldn't create the event."));
    assert!(failed.reply.contains("temporarily unavailable"));
    assert!(failed.reply.contains("Say 'yes' to try again"));
    assert_eq!(harness.audit.events_of_type("commit.event_failed").len(), 1);
    assert!(harness.calendar.inserted().is_empty());

    harness.calendar.set_fail_writes(false);
    let retried = harness.runtime.handle_turn(failed.conversation, "yes, try again").await.unwrap();
    assert_eq!(retried.conversation.state, DialogueState::Idle);
    assert_eq!(harness.calendar.inserted().len(), 1);
}

#[tokio::test]
async fn interrupted_commit_is_treated_as_failed() {
    let harness = harness();
    let state = DialogueState::Committing(ready_session("Retro", tomorrow(13, 0)));

    let outcome = harness.runtime.handle_turn(conversation(state), "yes").await.unwrap();
    assert_eq!(
        events(&outcome),
        vec![
            DialogueEvent::CommitFailed,
            DialogueEvent::ConfirmationAccepted,
            DialogueEvent::CommitSucceeded
        ]
    );
    assert_eq!(harness.calendar.inserted().len(), 1);
}

#[tokio::test]
async fn negative_confirmation_starts_over_and_cancel_cancels() {
    let harness = harness();
    let state = DialogueState::AwaitingConfirmation(ready_session("Retro", tomorrow(13, 0)));

    let rejected =
        harness.runtime.handle_turn(conversation(state.clone()), "incorrect").await.unwrap();
    assert_eq!(rejected.conversation.state, DialogueState::Idle);
    assert_eq!(rejected.reply, render::start_over());

    let cancelled = harness.runtime.handle_turn(conversation(state), "cancel").await.unwrap();
    assert_eq!(cancelled.conversation.state, DialogueState::Cancelled);
    assert_eq!(cancelled.reply, render::cancelled());

    assert!(harness.calendar.inserted().is_empty());
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn correction_during_confirmation_is_folded_back_in() {
    let harness = harness();
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,
            "parameters":{"dateTime":{"start":"2026-03-03T16:00:00-05:00"}}}"#,
    );
    let state = DialogueState::AwaitingConfirmation(ready_session("Retro", tomorrow(13, 0)));

    let outcome =
        harness.runtime.handle_turn(conversation(state), "actually make it 4pm").await.unwrap();

    assert_eq!(
        events(&outcome),
        vec![DialogueEvent::CorrectionReceived, DialogueEvent::RequiredFieldsCollected]
    );
    let session = outcome.conversation.state.session().expect("draft kept");
    assert_eq!(outcome.conversation.phase(), DialoguePhase::AwaitingConfirmation);
    assert_eq!(session.start_time, Some(tomorrow(16, 0)));
    assert_eq!(session.title.as_deref(), Some("Retro"));
    assert!(outcome.reply.contains("4:00 PM"));
}

#[tokio::test]
async fn confirmation_mentions_conflicts_and_alternatives() {
    let calendar = InMemoryCalendar::with_events(vec![ExistingEvent {
        id: Some("evt-1".to_string()),
        summary: Some("Design review".to_string()),
        start: tomorrow(13, 30),
        end: tomorrow(14, 30),
    }]);
    let harness = harness_with(ScriptedLlmClient::default(), calendar);
    let mut session = ready_session("Retro", tomorrow(14, 0));
    session.declined.clear();
    session.pending = Some(SessionField::Description);

    let outcome = harness
        .runtime
        .handle_turn(conversation(DialogueState::Collecting(session)), "no description")
        .await
        .unwrap();

    assert_eq!(outcome.conversation.phase(), DialoguePhase::AwaitingConfirmation);
    assert!(outcome.reply.contains("Heads up, this overlaps with:\n- Design review"));
    assert!(outcome.reply.contains("- Tue, Mar 3, 2026 1:00 PM - Tue, Mar 3, 2026 2:00 PM"));
    assert!(outcome.reply.contains("- Tue, Mar 3, 2026 2:30 PM - Tue, Mar 3, 2026 3:30 PM"));
    assert!(outcome.reply.ends_with("Shall I create this event?"));
    assert_eq!(harness.audit.events_of_type("conflict.detected").len(), 1);

    let unclear =
        harness.runtime.handle_turn(outcome.conversation, "hmm, let me think").await.unwrap();
    assert_eq!(unclear.conversation.phase(), DialoguePhase::AwaitingConfirmation);
    assert!(unclear.transitions.is_empty());
    assert_eq!(unclear.reply, outcome.reply);
}

#[tokio::test]
async fn conflict_lookup_failure_still_confirms() {
    let harness = harness();
    harness.calendar.set_fail_reads(true);
    let mut session = ready_session("Retro", tomorrow(14, 0));
    session.declined.clear();
    session.pending = Some(SessionField::Description);

    let outcome = harness
        .runtime
        .handle_turn(conversation(DialogueState::Collecting(session)), "skip")
        .await
        .unwrap();

    assert_eq!(outcome.conversation.phase(), DialoguePhase::AwaitingConfirmation);
    assert!(!outcome.reply.contains("Heads up"));
    assert!(outcome.reply.ends_with("Shall I create this event?"));
}

#[tokio::test]
async fn cancel_while_collecting_discards_the_draft() {
    let harness = harness();
    let mut session = EventSession::new(NEW_YORK);
    session.pending = Some(SessionField::Title);

    let outcome = harness
        .runtime
        .handle_turn(conversation(DialogueState::Collecting(session)), "never mind")
        .await
        .unwrap();
    assert_eq!(outcome.conversation.state, DialogueState::Cancelled);
    assert_eq!(outcome.reply, render::cancelled());

    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,"parameters":{"title":"Lunch"},
            "missingInfo":["dateTime"]}"#,
    );
    let restarted =
        harness.runtime.handle_turn(outcome.conversation, "schedule lunch").await.unwrap();
    assert_eq!(restarted.reply, render::question(SessionField::StartTime));
    assert_eq!(restarted.transitions[0].from, DialoguePhase::Cancelled);
}

#[tokio::test]
async fn answers_mentioning_cancel_words_are_content() {
    let harness = harness();
    let mut session = EventSession::new(NEW_YORK);
    session.start_time = Some(tomorrow(15, 0));
    session.pending = Some(SessionField::Title);
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,"parameters":{"title":"Bus stop inspection"},
            "missingInfo":[]}"#,
    );

    let outcome = harness
        .runtime
        .handle_turn(conversation(DialogueState::Collecting(session)), "Bus stop inspection")
        .await
        .unwrap();

    assert_eq!(harness.llm.prompts().len(), 1);
    assert_eq!(outcome.reply, render::question(SessionField::Guests));
    let DialogueState::Collecting(session) = &outcome.conversation.state else {
        panic!("expected collecting, got {:?}", outcome.conversation.state);
    };
    assert_eq!(session.title.as_deref(), Some("Bus stop inspection"));
    assert_eq!(session.start_time, Some(tomorrow(15, 0)));
}

#[tokio::test]
async fn flagged_extra_fields_are_asked_once() {
    let harness = harness();
    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,
            "parameters":{"title":"Offsite",
                "dateTime":{"start":"2026-03-03T10:00:00-05:00"},"guests":[]},
            "missingInfo":["location"]}"#,
    );
    let first = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "schedule an offsite tomorrow at 10")
        .await
        .unwrap();
    assert_eq!(first.reply, render::question(SessionField::Description));

    let second = harness.runtime.handle_turn(first.conversation, "none").await.unwrap();
    assert_eq!(second.reply, render::question(SessionField::Location));

    harness.llm.push_response(
        r#"{"action":"create","confidence":0.9,"parameters":{"location":"Room 4"}}"#,
    );
    let third = harness.runtime.handle_turn(second.conversation, "Room 4").await.unwrap();
    assert_eq!(third.conversation.phase(), DialoguePhase::AwaitingConfirmation);
    assert!(third.reply.contains("Location: Room 4"));
}

#[tokio::test]
async fn view_lists_the_rest_of_today() {
    let calendar = InMemoryCalendar::with_events(vec![
        ExistingEvent {
            id: None,
            summary: Some("Dentist".to_string()),
            start: Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 2, 19, 0, 0).unwrap(),
        },
        ExistingEvent { id: None, summary: None, start: tomorrow(9, 0), end: tomorrow(10, 0) },
    ]);
    let harness = harness_with(ScriptedLlmClient::default(), calendar);
    harness.llm.push_response(r#"{"action":"view","confidence":0.85}"#);

    let outcome = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "what's on my calendar today?")
        .await
        .unwrap();

    assert_eq!(outcome.conversation.state, DialogueState::Idle);
    assert!(outcome.transitions.is_empty());
    assert!(outcome.reply.contains("- Dentist (Mon, Mar 2, 2026 1:00 PM"));
    assert!(!outcome.reply.contains("Untitled Event"));
}

#[tokio::test]
async fn availability_checks_use_the_conflict_checker() {
    let calendar = InMemoryCalendar::with_events(vec![ExistingEvent {
        id: None,
        summary: Some("Interview".to_string()),
        start: tomorrow(15, 0),
        end: tomorrow(16, 0),
    }]);
    let harness = harness_with(ScriptedLlmClient::default(), calendar);

    harness.llm.push_response(r#"{"action":"check_availability","confidence":0.9}"#);
    let outcome =
        harness.runtime.handle_turn(ConversationState::new("conv-1"), "am I free?").await.unwrap();
    assert_eq!(outcome.reply, render::availability_needs_time());

    harness.llm.push_response(
        r#"{"action":"check_availability","confidence":0.9,
            "parameters":{"dateTime":{"start":"2026-03-03T15:30:00-05:00","duration":30}}}"#,
    );
    let busy = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "am I free tomorrow at 3:30?")
        .await
        .unwrap();
    assert!(busy.reply.starts_with("You're busy"));
    assert!(busy.reply.contains("- Interview"));
    assert_eq!(busy.conversation.state, DialogueState::Idle);

    harness.llm.push_response(
        r#"{"action":"check_availability","confidence":0.9,
            "parameters":{"dateTime":{"start":"2026-03-03T11:00:00-05:00"}}}"#,
    );
    let free = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "what about 11?")
        .await
        .unwrap();
    assert!(free.reply.starts_with("You're free"));
}

#[tokio::test]
async fn modify_and_delete_are_not_supported_from_chat() {
    let harness = harness();
    harness.llm.push_response(r#"{"action":"delete","confidence":0.9}"#);

    let outcome = harness
        .runtime
        .handle_turn(ConversationState::new("conv-1"), "delete my 3pm")
        .await
        .unwrap();
    assert_eq!(outcome.conversation.state, DialogueState::Idle);
    assert!(outcome.reply.contains("can't delete events"));
}

/// Answers by looking at which request the prompt carries.
struct RoutingLlm;

#[async_trait]
impl LlmClient for RoutingLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = prompt.rsplit("User request:").next().unwrap_or_default();
        if request.contains("Alpha") {
            Ok(r#"{"action":"create","confidence":0.9,"parameters":{"title":"Alpha sync",
                "dateTime":{"start":"2026-03-03T10:00:00-05:00"}}}"#
                .to_string())
        } else if request.contains("Beta") {
            Ok(r#"{"action":"create","confidence":0.9,"parameters":{"title":"Beta review",
                "dateTime":{"start":"2026-03-03T14:00:00-05:00"}}}"#
                .to_string())
        } else {
            Err(anyhow!("unexpected prompt"))
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_conversations_do_not_share_state() {
    let calendar = InMemoryCalendar::default();
    let runtime = Arc::new(DialogueRuntime::new(
        Arc::new(RoutingLlm),
        Arc::new(calendar.clone()),
        Arc::new(FixedContextProvider::new(context())),
        Arc::new(InMemoryAuditSink::default()),
        settings(),
    ));

    let alpha = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            runtime.handle_turn(ConversationState::new("alpha"), "schedule Alpha sync at 10").await
        })
    };
    let beta = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            runtime.handle_turn(ConversationState::new("beta"), "schedule Beta review at 2").await
        })
    };

    let alpha = alpha.await.expect("alpha task").expect("alpha turn");
    let beta = beta.await.expect("beta task").expect("beta turn");

    let alpha_session = alpha.conversation.state.session().expect("alpha draft");
    let beta_session = beta.conversation.state.session().expect("beta draft");
    assert_eq!(alpha.conversation.conversation_id, "alpha");
    assert_eq!(alpha_session.title.as_deref(), Some("Alpha sync"));
    assert_eq!(alpha_session.start_time, Some(tomorrow(10, 0)));
    assert_eq!(beta.conversation.conversation_id, "beta");
    assert_eq!(beta_session.title.as_deref(), Some("Beta review"));
    assert_eq!(beta_session.start_time, Some(tomorrow(14, 0)));
}
