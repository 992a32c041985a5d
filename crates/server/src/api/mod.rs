pub mod cleanup;
pub mod conversions;
pub mod files;
pub mod handlers;
pub mod logs;
pub mod middleware;
pub mod options;
pub mod response;
pub mod routes;

pub use response::{ApiError, ApiResponse, ApiResult};
pub use routes::create_router;
