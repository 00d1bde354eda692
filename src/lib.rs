pub mod api;
pub mod config;
pub mod fetch;
pub mod logic;
pub mod model;
pub mod registry;
pub mod seed;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export fetch seam and implementations
pub use fetch::{FetchCall, HttpFetcher, InMemoryFetcher, RemoteFetcher};

// Export logic types
pub use logic::{
    Cardinality, FetchDispatcher, JoinerOptions, QueryNormalizer, RelationshipResolver,
    RemoteJoiner, ResolvedRelationship, ResultAssembler, DEFAULT_MAX_DEPTH,
};

// Export all model types
pub use model::*;

pub use registry::{RegistryBuilder, ResolvedAlias, ServiceRegistry};
