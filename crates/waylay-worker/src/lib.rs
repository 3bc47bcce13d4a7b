mod config;
mod worker;

pub use config::{WorkerConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RUN_TIME_SECS, DEFAULT_READ_AHEAD, DEFAULT_SLEEP_DELAY_MS};
pub use worker::{shutdown_channel, ShutdownHandle, Worker};
