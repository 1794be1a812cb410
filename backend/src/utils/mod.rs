pub mod geo;
pub mod password;
pub mod token;

pub use geo::*;
pub use password::*;
pub use token::*;
