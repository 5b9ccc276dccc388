use clap::Parser;
use optrade_bot::cli::{dispatch, Cli};

#[tokio::main]
async fn main() {
    optrade_telemetry::init_logging().expect("logging initialization must succeed");
    let cli = Cli::parse();

    if let Err(err) = dispatch(cli).await {
        tracing::error!(error = %err, "optrade-bot exited with an error");
        std::process::exit(err.exit_code());
    }
}
