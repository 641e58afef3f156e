pub mod auth;
pub mod cors;

pub use self::auth::auth_middleware;
pub use self::cors::create_cors_layer;
