use std::sync::Arc;

use timebridge_agent::intent::IntentParser;
use timebridge_agent::llm::{LlmClient, OpenAiCompatibleClient};
use timebridge_core::config::{AppConfig, LoadOptions};
use timebridge_core::context::{ContextProvider, SystemContextProvider, TimeContext};
use tracing::info;

use crate::commands::CommandResult;

pub async fn run(options: LoadOptions, message: &str) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("parse", "config_validation", error.to_string(), 2)
        }
    };
    crate::init_logging(&config);

    let llm = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(llm) => llm,
        Err(error) => return CommandResult::failure("parse", "llm_setup", error.to_string(), 3),
    };
    let context =
        SystemContextProvider::new(config.assistant.timezone, config.assistant.city.clone())
            .context();

    run_with(Arc::new(llm), &context, message).await
}

pub async fn run_with(
    llm: Arc<dyn LlmClient>,
    context: &TimeContext,
    message: &str,
) -> CommandResult {
    let parser = IntentParser::new(llm);
    match parser.parse(message, context, None).await {
        Ok(intent) => {
            info!(
                event_name = "cli.parse.completed",
                action = intent.action.as_str(),
                confidence = intent.confidence,
                "message interpreted"
            );
            match serde_json::to_value(&intent) {
                Ok(data) => CommandResult::success_with_data(
                    "parse",
                    format!("{} ({:.2})", intent.action.as_str(), intent.confidence),
                    Some(data),
                ),
                Err(error) => {
                    CommandResult::failure("parse", "serialization", error.to_string(), 4)
                }
            }
        }
        Err(failure) => CommandResult::failure("parse", "parse_failure", failure.to_string(), 5),
    }
}
