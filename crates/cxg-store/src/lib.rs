pub mod error;
pub mod json_bridge;
pub mod paths;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use paths::default_db_path;
pub use store::Store;
