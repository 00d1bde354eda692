use crate::fetch::RemoteFetcher;
use crate::logic::{RelationshipResolver, ResolvedRelationship};
use crate::model::{
    join_key, Argument, BranchFetchError, ExpandNode, JoinError, Record, SubQuery, SINGLE_ARG,
};
use crate::registry::ServiceRegistry;
use anyhow::anyhow;
use itertools::Itertools;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builds sub-queries and invokes the fetch capability for one join operation
pub struct FetchDispatcher<'a> {
    fetcher: &'a dyn RemoteFetcher,
    cancel: &'a CancellationToken,
    fetch_timeout: Option<Duration>,
}

impl<'a> FetchDispatcher<'a> {
    pub fn new(
        fetcher: &'a dyn RemoteFetcher,
        cancel: &'a CancellationToken,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            fetcher,
            cancel,
            fetch_timeout,
        }
    }

    /// Fetch the records of the root service
    pub async fn fetch_root(
        &self,
        registry: &ServiceRegistry,
        service: &str,
        fields: &[String],
        args: &[Argument],
        expands: &[ExpandNode],
    ) -> Result<Vec<Record>, JoinError> {
        let query = SubQuery {
            fields: request_fields(registry, service, fields, None, expands)?,
            args: args.to_vec(),
            key_field: None,
        };
        self.fetch("", service, &query).await
    }

    /// Fetch the children of `parents` for one expand branch
    ///
    /// Returns an empty set without calling the service when no parent carries a key.
    pub async fn fetch_branch(
        &self,
        registry: &ServiceRegistry,
        resolved: &ResolvedRelationship,
        node: &ExpandNode,
        parents: &[Record],
        path: &str,
    ) -> Result<Vec<Record>, JoinError> {
        let keys = collect_keys(parents, resolved.parent_key());
        if keys.is_empty() {
            log::debug!("'{}' has no parent keys, skipping fetch", path);
            return Ok(Vec::new());
        }

        let query = build_sub_query(registry, resolved, node, keys)?;
        self.fetch(path, resolved.target_service(), &query).await
    }

    async fn fetch(
        &self,
        path: &str,
        service: &str,
        query: &SubQuery,
    ) -> Result<Vec<Record>, JoinError> {
        if self.cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }

        log::debug!(
            "fetching '{}' from '{}' with {} key(s)",
            if path.is_empty() { "<root>" } else { path },
            service,
            query.key_filter().map(|(_, keys)| keys.len()).unwrap_or(0)
        );

        let call = self.fetcher.fetch(service, query);
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(JoinError::Cancelled),
            outcome = with_timeout(call, self.fetch_timeout) => outcome,
        };

        outcome.map_err(|source| {
            log::warn!("fetch for '{}' from '{}' failed: {:#}", path, service, source);
            JoinError::BranchFetch(BranchFetchError {
                path: path.to_string(),
                service: service.to_string(),
                source,
            })
        })
    }
}

async fn with_timeout<F>(call: F, timeout: Option<Duration>) -> anyhow::Result<Vec<Record>>
where
    F: std::future::Future<Output = anyhow::Result<Vec<Record>>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| anyhow!("timed out after {}ms", limit.as_millis()))?,
        None => call.await,
    }
}

/// Distinct scalar values of `field` across `records`, in first-seen order
pub fn collect_keys(records: &[Record], field: &str) -> Vec<Value> {
    records
        .iter()
        .filter_map(|record| record.get(field))
        .filter_map(|value| join_key(value).map(|key| (key, value)))
        .unique_by(|(key, _)| key.clone())
        .map(|(_, value)| value.clone())
        .collect()
}

/// Sub-query for one branch: forwarded args without the cardinality directive, plus the key
/// filter, which replaces any caller argument of the same name
pub fn build_sub_query(
    registry: &ServiceRegistry,
    resolved: &ResolvedRelationship,
    node: &ExpandNode,
    keys: Vec<Value>,
) -> Result<SubQuery, JoinError> {
    let child_key = resolved.child_key();
    let fields = request_fields(
        registry,
        resolved.target_service(),
        &node.fields,
        Some(child_key),
        &node.expands,
    )?;

    let mut args: Vec<Argument> = node
        .args
        .iter()
        .filter(|arg| arg.name != SINGLE_ARG && arg.name != child_key)
        .cloned()
        .collect();
    args.push(Argument::new(child_key, Value::Array(keys)));

    Ok(SubQuery {
        fields,
        args,
        key_field: Some(child_key.to_string()),
    })
}

/// Requested fields plus every key the join itself needs from `service`'s records
fn request_fields(
    registry: &ServiceRegistry,
    service: &str,
    fields: &[String],
    join_key_field: Option<&str>,
    expands: &[ExpandNode],
) -> Result<Vec<String>, JoinError> {
    let mut required: Vec<String> = fields.to_vec();
    required.extend(join_key_field.map(str::to_string));

    for nested in expands {
        let resolved = RelationshipResolver::resolve(registry, service, &nested.property, &nested.args)?;
        required.push(resolved.parent_key().to_string());
    }

    Ok(required.into_iter().unique().collect())
}
