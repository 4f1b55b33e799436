pub mod accidents;
pub mod auth;
pub mod dispatch;
