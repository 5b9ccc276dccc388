//! `AppError`: every sub-crate's error type folded into one enum the
//! Orchestrator and `main` can match on, matching the teacher's
//! one-aggregating-enum-per-binary convention (`hip3-bot::error::AppError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("core error: {0}")]
    Core(#[from] optrade_core::CoreError),

    #[error("store error: {0}")]
    Store(#[from] optrade_store::StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] optrade_broker::BrokerError),

    #[error("data error: {0}")]
    Data(#[from] optrade_data::DataError),

    #[error("event bus error: {0}")]
    EventBus(#[from] optrade_eventbus::EventBusError),

    #[error("signal error: {0}")]
    Signal(#[from] optrade_signal::SignalError),

    #[error("options error: {0}")]
    Options(#[from] optrade_options::OptionsError),

    #[error("risk error: {0}")]
    Risk(#[from] optrade_risk::RiskError),

    #[error("executor error: {0}")]
    Executor(#[from] optrade_executor::ExecutorError),

    #[error("runner error: {0}")]
    Runner(#[from] optrade_runners::RunnerError),

    #[error("position error: {0}")]
    Position(#[from] optrade_position::PositionError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] optrade_telemetry::TelemetryError),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Maps onto the CLI's exit-code table: 0 ok, 1 runtime error,
    /// 2 auth required, 3 config invalid. `main` is the only caller.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 3,
            AppError::Broker(optrade_broker::BrokerError::AuthRequired)
            | AppError::Broker(optrade_broker::BrokerError::AuthFailed(_))
            | AppError::Broker(optrade_broker::BrokerError::AuthExpired)
            | AppError::AuthRequired(_) => 2,
            _ => 1,
        }
    }
}
