pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod stages;
pub mod usage;

pub use routes::create_router;
