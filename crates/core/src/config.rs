use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conflicts::SuggestionPolicy;
use crate::domain::event::{
    CalendarDefaults, EventReminder, EventVisibility, ReminderMethod,
};
use crate::domain::intent::DEFAULT_CONFIDENCE_THRESHOLD;

pub const DEFAULT_CONFIG_FILE: &str = "timebridge.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub assistant: AssistantConfig,
    pub calendar: CalendarConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub timezone: Tz,
    pub city: Option<String>,
    pub confidence_threshold: f64,
    pub working_hours_start: u32,
    pub working_hours_end: u32,
}

impl AssistantConfig {
    pub fn suggestion_policy(&self) -> SuggestionPolicy {
        SuggestionPolicy::new(self.timezone, self.working_hours_start, self.working_hours_end)
    }
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub use_conferencing: bool,
    pub default_reminder_minutes: Option<u32>,
    pub visibility: Option<EventVisibility>,
}

impl CalendarConfig {
    pub fn defaults(&self) -> CalendarDefaults {
        CalendarDefaults {
            calendar_id: Some(self.calendar_id.clone()),
            use_conferencing: self.use_conferencing,
            reminders: self
                .default_reminder_minutes
                .map(|minutes| vec![EventReminder { method: ReminderMethod::Popup, minutes }])
                .unwrap_or_default(),
            visibility: self.visibility,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub timezone: Option<Tz>,
    pub city: Option<String>,
    pub calendar_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            assistant: AssistantConfig {
                timezone: Tz::UTC,
                city: None,
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                working_hours_start: 9,
                working_hours_end: 17,
            },
            calendar: CalendarConfig {
                calendar_id: "primary".to_string(),
                use_conferencing: false,
                default_reminder_minutes: None,
                visibility: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(assistant) = patch.assistant {
            if let Some(timezone) = assistant.timezone {
                self.assistant.timezone = parse_timezone(&timezone)?;
            }
            if let Some(city) = assistant.city {
                self.assistant.city = Some(city);
            }
            if let Some(confidence_threshold) = assistant.confidence_threshold {
                self.assistant.confidence_threshold = confidence_threshold;
            }
            if let Some(working_hours_start) = assistant.working_hours_start {
                self.assistant.working_hours_start = working_hours_start;
            }
            if let Some(working_hours_end) = assistant.working_hours_end {
                self.assistant.working_hours_end = working_hours_end;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(calendar_id) = calendar.calendar_id {
                self.calendar.calendar_id = calendar_id;
            }
            if let Some(use_conferencing) = calendar.use_conferencing {
                self.calendar.use_conferencing = use_conferencing;
            }
            if let Some(default_reminder_minutes) = calendar.default_reminder_minutes {
                self.calendar.default_reminder_minutes = Some(default_reminder_minutes);
            }
            if let Some(visibility) = calendar.visibility {
                self.calendar.visibility = Some(visibility);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TIMEBRIDGE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TIMEBRIDGE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TIMEBRIDGE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TIMEBRIDGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TIMEBRIDGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TIMEBRIDGE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TIMEBRIDGE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TIMEBRIDGE_LLM_MAX_RETRIES", &value)?;
        }

        let timezone =
            read_env("TIMEBRIDGE_ASSISTANT_TIMEZONE").or_else(|| read_env("TIMEBRIDGE_TIMEZONE"));
        if let Some(value) = timezone {
            self.assistant.timezone = parse_timezone(&value)?;
        }
        if let Some(value) = read_env("TIMEBRIDGE_ASSISTANT_CITY") {
            self.assistant.city = Some(value);
        }
        if let Some(value) = read_env("TIMEBRIDGE_ASSISTANT_CONFIDENCE_THRESHOLD") {
            self.assistant.confidence_threshold =
                parse_f64("TIMEBRIDGE_ASSISTANT_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TIMEBRIDGE_ASSISTANT_WORKING_HOURS_START") {
            self.assistant.working_hours_start =
                parse_u32("TIMEBRIDGE_ASSISTANT_WORKING_HOURS_START", &value)?;
        }
        if let Some(value) = read_env("TIMEBRIDGE_ASSISTANT_WORKING_HOURS_END") {
            self.assistant.working_hours_end =
                parse_u32("TIMEBRIDGE_ASSISTANT_WORKING_HOURS_END", &value)?;
        }

        if let Some(value) = read_env("TIMEBRIDGE_CALENDAR_ID") {
            self.calendar.calendar_id = value;
        }
        if let Some(value) = read_env("TIMEBRIDGE_CALENDAR_USE_CONFERENCING") {
            self.calendar.use_conferencing =
                parse_bool("TIMEBRIDGE_CALENDAR_USE_CONFERENCING", &value)?;
        }
        if let Some(value) = read_env("TIMEBRIDGE_CALENDAR_DEFAULT_REMINDER_MINUTES") {
            self.calendar.default_reminder_minutes =
                Some(parse_u32("TIMEBRIDGE_CALENDAR_DEFAULT_REMINDER_MINUTES", &value)?);
        }
        if let Some(value) = read_env("TIMEBRIDGE_CALENDAR_VISIBILITY") {
            let visibility = value.parse::<EventVisibility>().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "TIMEBRIDGE_CALENDAR_VISIBILITY".to_string(),
                    value: value.clone(),
                }
            })?;
            self.calendar.visibility = Some(visibility);
        }

        let log_level =
            read_env("TIMEBRIDGE_LOGGING_LEVEL").or_else(|| read_env("TIMEBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TIMEBRIDGE_LOGGING_FORMAT").or_else(|| read_env("TIMEBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(timezone) = overrides.timezone {
            self.assistant.timezone = timezone;
        }
        if let Some(city) = overrides.city {
            self.assistant.city = Some(city);
        }
        if let Some(calendar_id) = overrides.calendar_id {
            self.calendar.calendar_id = calendar_id;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_assistant(&self.assistant)?;
        validate_calendar(&self.calendar)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn parse_timezone(value: &str) -> Result<Tz, ConfigError> {
    value.trim().parse::<Tz>().map_err(|_| {
        ConfigError::Validation(format!(
            "assistant.timezone `{}` is not an IANA timezone name (e.g. `Europe/Berlin`)",
            value.trim()
        ))
    })
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_assistant(assistant: &AssistantConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&assistant.confidence_threshold) {
        return Err(ConfigError::Validation(
            "assistant.confidence_threshold must be in range 0..=1".to_string(),
        ));
    }

    if assistant.working_hours_start >= assistant.working_hours_end
        || assistant.working_hours_end > 24
    {
        return Err(ConfigError::Validation(format!(
            "assistant working hours {}..{} are invalid: start must be before end \
             and end at most 24",
            assistant.working_hours_start, assistant.working_hours_end
        )));
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if calendar.calendar_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "calendar.calendar_id must not be empty (use `primary` for the default calendar)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    assistant: Option<AssistantPatch>,
    calendar: Option<CalendarPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    timezone: Option<String>,
    city: Option<String>,
    confidence_threshold: Option<f64>,
    working_hours_start: Option<u32>,
    working_hours_end: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    calendar_id: Option<String>,
    use_conferencing: Option<bool>,
    default_reminder_minutes: Option<u32>,
    visibility: Option<EventVisibility>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
