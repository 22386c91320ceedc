pub(crate) mod authz;
pub(crate) mod channels;
pub(crate) mod core;
pub(crate) mod errors;
pub(crate) mod events;
pub(crate) mod handlers;
pub(crate) mod messages;
pub(crate) mod publisher;
pub(crate) mod router;
pub(crate) mod store;
#[cfg(test)]
mod tests;
pub(crate) mod types;

pub use self::core::AppConfig;
pub use errors::init_tracing;
pub use publisher::EventPublisher;
pub use router::{build_router, build_service};
