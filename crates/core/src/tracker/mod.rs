mod service;
mod sqlite;
mod store;
mod types;

pub use service::*;
pub use sqlite::*;
pub use store::*;
pub use types::*;
