pub mod cooldown;
pub mod engine;
pub mod evaluation_service;
pub mod log_matcher;
pub mod models;
pub mod rules;
pub mod sources;
pub mod store;
pub mod window;
