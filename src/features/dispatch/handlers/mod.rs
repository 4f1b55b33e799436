pub mod presence_handler;
pub mod socket_handler;

pub use presence_handler::*;
pub use socket_handler::*;
