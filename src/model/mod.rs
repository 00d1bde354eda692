pub mod common;
pub mod error;
pub mod query;
pub mod service;

pub use common::*;
pub use error::*;
pub use query::*;
pub use service::*;
