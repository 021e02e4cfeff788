pub mod auth;
pub mod client_ip;
pub mod errors;
pub mod rate_limit;
pub mod response;

pub use auth::{authenticate, authorize, AuthUser};
pub use client_ip::ClientIp;
pub use errors::{error_envelope, not_found};
pub use rate_limit::{rate_limit, RateLimiter};
pub use response::{ApiResponse, ApiResult, ListResponse};
