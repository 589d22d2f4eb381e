pub mod config;
pub mod fixtures;
pub mod harness;
pub mod spies;

pub use config::TempConfig;
pub use harness::McpTestHarness;
pub use spies::{
    flaky_handler, recording_handler, FailingGuard, Journal, RecordingGuard, RecordingInterceptor,
    RetryInterceptor,
};
