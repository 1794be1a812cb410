//! Data models shared across persistence and API handlers.

pub mod check_in;
pub mod family;
pub mod password_reset;
pub mod token;
pub mod user;
