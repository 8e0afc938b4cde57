pub mod config;
pub mod models;
pub mod channel;
pub mod codec;
pub mod election;
pub mod registry;
pub mod catalog;
pub mod progress;
pub mod ticker;
pub mod heartbeat;
pub mod coordinator;
pub mod runner;
