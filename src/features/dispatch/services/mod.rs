mod acceptance_coordinator;
mod broadcaster;
mod session_service;
mod zone_directory;

pub use acceptance_coordinator::AcceptanceCoordinator;
pub use broadcaster::DispatchBroadcaster;
pub use session_service::DispatchSessionService;
pub use zone_directory::{PresenceSnapshot, ZoneDirectory, ZonePresence};
