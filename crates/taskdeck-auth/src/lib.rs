pub mod credentials;
pub mod service;
pub mod users;

pub use service::AuthService;
pub use users::{UserRecord, UserRepo};
