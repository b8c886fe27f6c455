pub mod models;
pub mod rate_limiter;
pub mod senders;
pub mod service;
