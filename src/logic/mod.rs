pub mod broker;
pub mod error;
pub mod names;
#[cfg(test)]
pub mod test_support;

pub use broker::*;
pub use error::*;
