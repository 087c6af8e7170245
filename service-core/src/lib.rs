//! service-core: HTTP plumbing shared by the AutoPatcher services.
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod observability;
pub mod utils;
