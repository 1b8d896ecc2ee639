pub mod database;
pub mod error;
pub mod live;
pub mod schema;
pub mod store_impl;
pub mod tasks;

pub use database::Database;
pub use error::StoreError;
pub use live::LiveQueryHub;
pub use store_impl::SqliteTaskStore;
pub use tasks::TaskRepo;
