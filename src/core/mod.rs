pub mod account;
pub mod api;
pub mod config;
pub mod evaluator;
pub mod orchestrator;
pub mod proxy;
pub mod report;
pub mod scheduler;
pub mod terminal;
pub mod timing;
