//! Matchmaking: waiting queue and game assembly

pub mod queue;
pub mod service;

pub use queue::{QueuedPlayer, WaitingQueue};
pub use service::Matchmaker;
