pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use chrono_tz::Tz;
use timebridge_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "timebridge",
    about = "Timebridge calendar assistant CLI",
    long_about = "Talk to the calendar assistant, inspect how a request is understood, \
                  and check the effective configuration.",
    after_help = "Examples:\n  timebridge config\n  \
                  timebridge parse \"lunch with sam tomorrow at noon\"\n  \
                  timebridge --timezone America/New_York chat"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Default, Args)]
pub struct GlobalArgs {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (default: timebridge.toml)"
    )]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "TZ", help = "IANA timezone, e.g. Europe/Berlin")]
    pub timezone: Option<String>,
    #[arg(long, global = true, help = "City shown to the assistant as the user's location")]
    pub city: Option<String>,
    #[arg(long, global = true, value_name = "LEVEL", help = "Log level override")]
    pub log_level: Option<String>,
}

impl GlobalArgs {
    pub fn load_options(&self) -> Result<LoadOptions, String> {
        let timezone = self
            .timezone
            .as_deref()
            .map(|value| {
                value.trim().parse::<Tz>().map_err(|_| format!("unknown timezone `{value}`"))
            })
            .transpose()?;

        Ok(LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                timezone,
                city: self.city.clone(),
                ..ConfigOverrides::default()
            },
        })
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Show the intent the assistant reads from a single message")]
    Parse {
        #[arg(required = true, trailing_var_arg = true, help = "Message to interpret")]
        message: Vec<String>,
    },
    #[command(about = "Start an interactive conversation against an in-memory calendar")]
    Chat,
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.global.load_options() {
        Err(message) => {
            commands::CommandResult::failure("cli", "invalid_argument", message, 2)
        }
        Ok(options) => match cli.command {
            Command::Config => {
                commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
            }
            Command::Parse { message } => commands::parse::run(options, &message.join(" ")).await,
            Command::Chat => commands::chat::run(options).await,
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Logs go to stderr so stdout stays machine-readable.
pub fn init_logging(config: &AppConfig) {
    use timebridge_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
