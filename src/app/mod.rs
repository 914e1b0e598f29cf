//! Application wiring

pub mod server;
pub mod state;

pub use server::GameServer;
pub use state::AppState;
