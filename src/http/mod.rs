//! Thin REST transport over the game handler

pub mod middleware;
pub mod routes;

pub use routes::build_router;
