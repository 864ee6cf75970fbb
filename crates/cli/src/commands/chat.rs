use std::sync::Arc;

use anyhow::Result;
use timebridge_agent::llm::OpenAiCompatibleClient;
use timebridge_agent::runtime::{AssistantSettings, ConversationState, DialogueRuntime};
use timebridge_core::audit::NoopAuditSink;
use timebridge_core::calendar::InMemoryCalendar;
use timebridge_core::config::{AppConfig, LoadOptions};
use timebridge_core::context::SystemContextProvider;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;
use uuid::Uuid;

use crate::commands::CommandResult;

const GREETING: &str = "Hi! Tell me about the event you'd like to create, or ask what's on your \
                        calendar. Type 'quit' to leave.";

#[derive(Clone, Debug)]
pub struct ChatSummary {
    pub turns: usize,
    pub conversation: ConversationState,
}

pub async fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2)
        }
    };
    crate::init_logging(&config);

    let llm = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(llm) => llm,
        Err(error) => return CommandResult::failure("chat", "llm_setup", error.to_string(), 3),
    };
    let runtime = DialogueRuntime::new(
        Arc::new(llm),
        Arc::new(InMemoryCalendar::default()),
        Arc::new(SystemContextProvider::new(
            config.assistant.timezone,
            config.assistant.city.clone(),
        )),
        Arc::new(NoopAuditSink),
        AssistantSettings::from_config(&config),
    );

    let input = BufReader::new(tokio::io::stdin());
    match converse(&runtime, input, tokio::io::stdout()).await {
        Ok(summary) => CommandResult::success(
            "chat",
            format!("conversation ended after {} turns", summary.turns),
        ),
        Err(error) => CommandResult::failure("chat", "runtime", error.to_string(), 4),
    }
}

/// Feeds each non-empty input line to the runtime and writes the replies.
pub async fn converse<R, W>(
    runtime: &DialogueRuntime,
    input: R,
    mut output: W,
) -> Result<ChatSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut conversation = ConversationState::new(Uuid::new_v4().to_string());
    let mut turns = 0;
    let mut lines = input.lines();

    output.write_all(format!("{GREETING}\n\n").as_bytes()).await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message.to_ascii_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        let outcome = runtime.handle_turn(conversation, message).await?;
        conversation = outcome.conversation;
        turns += 1;

        output.write_all(format!("{}\n\n", outcome.reply).as_bytes()).await?;
        output.flush().await?;
    }

    info!(
        event_name = "cli.chat.ended",
        conversation_id = %conversation.conversation_id,
        turns,
        phase = conversation.phase().as_str(),
        "chat session ended"
    );
    Ok(ChatSummary { turns, conversation })
}
