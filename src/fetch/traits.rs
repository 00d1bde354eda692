use crate::model::{Record, SubQuery};
use anyhow::Result;

/// Fetch capability for remote services, the joiner's only network-facing dependency
///
/// Implementations return records in the order the service produced them. Retries, if any,
/// belong here rather than in the joiner.
#[async_trait::async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, service: &str, query: &SubQuery) -> Result<Vec<Record>>;
}
