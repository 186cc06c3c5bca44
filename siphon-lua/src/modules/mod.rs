//! Modules installed into every connector sandbox

pub mod browser;
pub mod http;
pub mod log;

pub use browser::{BrowserModule, HeldLeases};
pub use http::HttpModule;
pub use log::{LogLevel, LogModule, LogSink, TracingLogSink};
