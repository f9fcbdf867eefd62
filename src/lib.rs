pub mod auth;
pub mod config;
pub mod consts;
pub mod engine;
pub mod intents;
pub mod vehicle;
