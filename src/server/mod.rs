pub mod config;
pub mod host_metrics;
pub mod log_stream;
