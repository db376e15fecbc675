pub mod common;
pub mod principal;
pub mod service;
pub mod stock;

pub use common::*;
pub use principal::*;
pub use service::*;
pub use stock::*;
