#![forbid(unsafe_code)]

mod server;

pub use server::{build_router, build_service, init_tracing, AppConfig, EventPublisher};
