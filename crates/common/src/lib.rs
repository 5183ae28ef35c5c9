pub mod attendance;
pub mod auth;
pub mod collections;
pub mod faces;
pub mod faults;
pub mod history;
pub mod lessons;
pub mod users;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
