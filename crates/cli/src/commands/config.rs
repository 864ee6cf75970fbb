use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use timebridge_core::config::{AppConfig, ConfigOverrides, LoadOptions, DEFAULT_CONFIG_FILE};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    overridden: bool,
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let overrides = options.overrides.clone();

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let mut lines = vec![
        "effective config (source precedence: cli > env > file > default):".to_string(),
    ];

    for field in fields(&config, &overrides) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig, overrides: &ConfigOverrides) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "llm.provider",
            value: config.llm.provider.as_str().to_string(),
            env_keys: &["TIMEBRIDGE_LLM_PROVIDER"],
            overridden: overrides.llm_provider.is_some(),
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["TIMEBRIDGE_LLM_MODEL"],
            overridden: overrides.llm_model.is_some(),
        },
        Field {
            key: "llm.base_url",
            value: config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["TIMEBRIDGE_LLM_BASE_URL"],
            overridden: false,
        },
        Field {
            key: "llm.api_key",
            value: api_key,
            env_keys: &["TIMEBRIDGE_LLM_API_KEY"],
            overridden: overrides.llm_api_key.is_some(),
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["TIMEBRIDGE_LLM_TIMEOUT_SECS"],
            overridden: false,
        },
        Field {
            key: "llm.max_retries",
            value: config.llm.max_retries.to_string(),
            env_keys: &["TIMEBRIDGE_LLM_MAX_RETRIES"],
            overridden: false,
        },
        Field {
            key: "assistant.timezone",
            value: config.assistant.timezone.name().to_string(),
            env_keys: &["TIMEBRIDGE_ASSISTANT_TIMEZONE", "TIMEBRIDGE_TIMEZONE"],
            overridden: overrides.timezone.is_some(),
        },
        Field {
            key: "assistant.city",
            value: config.assistant.city.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["TIMEBRIDGE_ASSISTANT_CITY"],
            overridden: overrides.city.is_some(),
        },
        Field {
            key: "assistant.confidence_threshold",
            value: config.assistant.confidence_threshold.to_string(),
            env_keys: &["TIMEBRIDGE_ASSISTANT_CONFIDENCE_THRESHOLD"],
            overridden: false,
        },
        Field {
            key: "assistant.working_hours_start",
            value: config.assistant.working_hours_start.to_string(),
            env_keys: &["TIMEBRIDGE_ASSISTANT_WORKING_HOURS_START"],
            overridden: false,
        },
        Field {
            key: "assistant.working_hours_end",
            value: config.assistant.working_hours_end.to_string(),
            env_keys: &["TIMEBRIDGE_ASSISTANT_WORKING_HOURS_END"],
            overridden: false,
        },
        Field {
            key: "calendar.calendar_id",
            value: config.calendar.calendar_id.clone(),
            env_keys: &["TIMEBRIDGE_CALENDAR_ID"],
            overridden: overrides.calendar_id.is_some(),
        },
        Field {
            key: "calendar.use_conferencing",
            value: config.calendar.use_conferencing.to_string(),
            env_keys: &["TIMEBRIDGE_CALENDAR_USE_CONFERENCING"],
            overridden: false,
        },
        Field {
            key: "calendar.default_reminder_minutes",
            value: config
                .calendar
                .default_reminder_minutes
                .map(|minutes| minutes.to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["TIMEBRIDGE_CALENDAR_DEFAULT_REMINDER_MINUTES"],
            overridden: false,
        },
        Field {
            key: "calendar.visibility",
            value: config
                .calendar
                .visibility
                .map(|visibility| visibility.as_str().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["TIMEBRIDGE_CALENDAR_VISIBILITY"],
            overridden: false,
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["TIMEBRIDGE_LOGGING_LEVEL", "TIMEBRIDGE_LOG_LEVEL"],
            overridden: overrides.log_level.is_some(),
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["TIMEBRIDGE_LOGGING_FORMAT", "TIMEBRIDGE_LOG_FORMAT"],
            overridden: false,
        },
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if field.overridden {
        return "cli".to_string();
    }

    for env_key in field.env_keys {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
