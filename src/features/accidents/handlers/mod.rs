mod accident_handler;

pub use accident_handler::*;
