use crate::fetch::RemoteFetcher;
use crate::logic::normalize::{child_path, resolve_tree};
use crate::logic::{
    FetchDispatcher, QueryNormalizer, RelationshipResolver, ResolvedRelationship, ResultAssembler,
};
use crate::model::{
    AggregatedJoinError, Argument, BranchFetchError, ExpandNode, JoinError, NormalizedQuery, Query,
    Record,
};
use crate::registry::ServiceRegistry;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct JoinerOptions {
    /// Deepest expand nesting accepted before failing with `MaxDepthExceeded`
    pub max_depth: usize,
    /// Upper bound for a single fetch call
    pub fetch_timeout: Option<Duration>,
}

impl Default for JoinerOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            fetch_timeout: None,
        }
    }
}

/// Entry point: normalizes queries and joins the records of remote services into one tree
pub struct RemoteJoiner {
    registry: Arc<ServiceRegistry>,
    fetcher: Arc<dyn RemoteFetcher>,
    options: JoinerOptions,
}

impl RemoteJoiner {
    pub fn new(registry: Arc<ServiceRegistry>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            registry,
            fetcher,
            options: JoinerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: JoinerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn options(&self) -> &JoinerOptions {
        &self.options
    }

    pub fn normalize(&self, query: &Query) -> Result<NormalizedQuery, JoinError> {
        QueryNormalizer::new(&self.registry, self.options.max_depth).normalize(query)
    }

    pub async fn query(&self, query: &Query) -> Result<Value, JoinError> {
        self.query_with_cancel(query, &CancellationToken::new()).await
    }

    /// Run a query that the caller can abort through `cancel`
    pub async fn query_with_cancel(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Value, JoinError> {
        let normalized = self.normalize(query)?;
        self.execute(&normalized, cancel).await
    }

    /// Join an already-normalized query
    pub async fn execute(
        &self,
        query: &NormalizedQuery,
        cancel: &CancellationToken,
    ) -> Result<Value, JoinError> {
        let root = self.registry.lookup(&query.service)?;
        resolve_tree(
            &self.registry,
            &query.service,
            &query.expands,
            self.options.max_depth,
        )?;

        let operation = Uuid::new_v4();
        let started = Instant::now();
        let cancel = cancel.child_token();
        let run = JoinRun {
            operation,
            registry: &self.registry,
            dispatcher: FetchDispatcher::new(
                self.fetcher.as_ref(),
                &cancel,
                self.options.fetch_timeout,
            ),
            max_depth: self.options.max_depth,
        };

        log::debug!("[join {}] start on '{}'", operation, query.service);

        let mut records = run
            .dispatcher
            .fetch_root(
                &self.registry,
                &query.service,
                &query.fields,
                &query.args,
                &query.expands,
            )
            .await
            .map_err(|err| match err {
                JoinError::BranchFetch(failure) => {
                    JoinError::Aggregated(AggregatedJoinError { failures: vec![failure] })
                }
                other => other,
            })?;
        run.expand(&query.service, &mut records, &query.expands, "", 1)
            .await?;

        if cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }

        let records: Vec<Value> = records
            .into_iter()
            .map(|record| {
                Value::Object(ResultAssembler::project(
                    record,
                    &query.fields,
                    &query.expands,
                ))
            })
            .collect();

        log::debug!(
            "[join {}] '{}' finished with {} root record(s) in {}us",
            operation,
            query.service,
            records.len(),
            started.elapsed().as_micros()
        );

        if targets_single_identity(&root.primary_keys, &query.args) {
            Ok(records.into_iter().next().unwrap_or(Value::Null))
        } else {
            Ok(Value::Array(records))
        }
    }
}

/// True when the root arguments pin every primary key to one scalar value
fn targets_single_identity(primary_keys: &[String], args: &[Argument]) -> bool {
    primary_keys.iter().all(|key| {
        args.iter()
            .rev()
            .find(|arg| &arg.name == key)
            .and_then(|arg| arg.value.as_ref())
            .map(|value| !value.is_null() && !value.is_array() && !value.is_object())
            .unwrap_or(false)
    })
}

/// Working state of a single join operation
struct JoinRun<'a> {
    operation: Uuid,
    registry: &'a ServiceRegistry,
    dispatcher: FetchDispatcher<'a>,
    max_depth: usize,
}

impl<'a> JoinRun<'a> {
    /// Resolve every expand of one level onto `records`
    ///
    /// Sibling branches run concurrently and are all awaited before anything is merged.
    fn expand<'r>(
        &'r self,
        service: &'r str,
        records: &'r mut Vec<Record>,
        nodes: &'r [ExpandNode],
        path: &'r str,
        depth: usize,
    ) -> BoxFuture<'r, Result<(), JoinError>> {
        async move {
            if nodes.is_empty() {
                return Ok(());
            }
            if depth > self.max_depth {
                return Err(JoinError::MaxDepthExceeded {
                    path: child_path(path, &nodes[0].property),
                    max_depth: self.max_depth,
                });
            }

            let outcomes = {
                let parents: &[Record] = records.as_slice();
                join_all(
                    nodes
                        .iter()
                        .map(|node| self.branch(service, parents, node, path, depth)),
                )
                .await
            };

            let mut failures: Vec<BranchFetchError> = Vec::new();
            let mut fetched = Vec::with_capacity(nodes.len());
            let mut fatal = None;

            for outcome in outcomes {
                match outcome {
                    Ok(branch) => fetched.push(branch),
                    Err(JoinError::BranchFetch(failure)) => failures.push(failure),
                    Err(JoinError::Aggregated(nested)) => failures.extend(nested.failures),
                    Err(JoinError::Cancelled) => return Err(JoinError::Cancelled),
                    Err(other) => {
                        fatal.get_or_insert(other);
                    }
                }
            }

            if let Some(err) = fatal {
                return Err(err);
            }
            if !failures.is_empty() {
                log::warn!(
                    "[join {}] {} branch(es) failed under '{}'",
                    self.operation,
                    failures.len(),
                    if path.is_empty() { "<root>" } else { path }
                );
                return Err(JoinError::Aggregated(AggregatedJoinError { failures }));
            }

            let (resolved, children): (Vec<ResolvedRelationship>, Vec<Vec<Record>>) =
                fetched.into_iter().unzip();
            let branches = nodes
                .iter()
                .zip(&resolved)
                .zip(children)
                .map(|((node, resolved), children)| (node, resolved, children))
                .collect();
            ResultAssembler::attach_all(records, branches);
            Ok(())
        }
        .boxed()
    }

    /// Fetch one branch and fully expand its children before they are attached
    async fn branch(
        &self,
        service: &str,
        parents: &[Record],
        node: &ExpandNode,
        parent_path: &str,
        depth: usize,
    ) -> Result<(ResolvedRelationship, Vec<Record>), JoinError> {
        let path = child_path(parent_path, &node.property);
        let resolved = RelationshipResolver::resolve(self.registry, service, &node.property, &node.args)?;

        let mut children = self
            .dispatcher
            .fetch_branch(self.registry, &resolved, node, parents, &path)
            .await?;

        self.expand(
            resolved.target_service(),
            &mut children,
            &node.expands,
            &path,
            depth + 1,
        )
        .await?;

        Ok((resolved, children))
    }
}
