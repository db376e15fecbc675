pub mod broker_registry;
pub mod credentials;
pub mod memory;
pub mod pg_admin;
pub mod postgres;
pub mod session_store;
pub mod traits;

pub use broker_registry::*;
pub use credentials::*;
pub use memory::*;
pub use pg_admin::*;
pub use postgres::*;
pub use session_store::*;
pub use traits::*;
