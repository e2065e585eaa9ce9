pub mod api;
pub mod applier;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod leader_election;
pub mod planner;
pub mod serializer;
pub mod service;
pub mod store;
pub mod strategy;
pub mod topology;
pub mod transport;
pub mod util;
