mod messages;

pub use messages::{AccidentRef, ClientMessage, DeclineReason, DispatchEvent, ServerMessage};
