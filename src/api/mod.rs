pub mod broker_guard;
pub mod broker_handlers;
pub mod handlers;
pub mod routes;
pub mod security;

pub use broker_handlers::BrokerState;
pub use handlers::*;
pub use routes::*;
pub use security::{AuthState, SecurityPolicy};
