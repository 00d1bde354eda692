pub mod assemble;
pub mod dispatch;
pub mod joiner;
pub mod normalize;
pub mod resolve;

pub use assemble::*;
pub use dispatch::*;
pub use joiner::*;
pub use normalize::QueryNormalizer;
pub use resolve::*;
