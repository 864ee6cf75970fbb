use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    timebridge_cli::run().await
}
