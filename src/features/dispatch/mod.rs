pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use services::{
    AcceptanceCoordinator, DispatchBroadcaster, DispatchSessionService, ZoneDirectory,
};
