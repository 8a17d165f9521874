pub mod auth;

pub use auth::{admin_auth_middleware, service_auth_middleware};
