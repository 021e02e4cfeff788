// handlers/mod.rs - one module per resource; routes.rs decides which of
// them sit behind authentication and which roles they admit.

pub mod auth;
pub mod covers;
pub mod extract;
pub mod hits;
pub mod images;
pub mod insights;
pub mod me;
pub mod random;
pub mod topics;
pub mod trending;
pub mod users;
pub mod validate;
