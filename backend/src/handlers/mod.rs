pub mod check_in;
pub mod families;
pub mod server;
pub mod users;
