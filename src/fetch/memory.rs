use crate::fetch::RemoteFetcher;
use crate::model::{join_key, Argument, Record, SubQuery};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Pagination arguments understood by the in-memory fetcher; every other valued argument
/// filters records by equality (scalar) or membership (array)
const TAKE_ARG: &str = "take";
const SKIP_ARG: &str = "skip";

/// One recorded invocation of the fetch capability
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub service: String,
    pub query: SubQuery,
}

/// Fixture-backed fetcher holding every service's records in memory
///
/// Used by the demo server when no endpoints are configured and by tests, which can inspect
/// every call made against it.
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    records: HashMap<String, Vec<Record>>,
    failures: HashMap<String, String>,
    latency: HashMap<String, Duration>,
    calls: Mutex<Vec<FetchCall>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records of `service`; non-object values are ignored
    pub fn with_records(mut self, service: impl Into<String>, records: Vec<Value>) -> Self {
        let records = records
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect();
        self.records.insert(service.into(), records);
        self
    }

    /// Make every fetch against `service` fail with `message`
    pub fn with_failure(mut self, service: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(service.into(), message.into());
        self
    }

    /// Delay every fetch against `service`
    pub fn with_latency(mut self, service: impl Into<String>, latency: Duration) -> Self {
        self.latency.insert(service.into(), latency);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, service: &str) -> Vec<FetchCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.service == service)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn matches(record: &Record, arg: &Argument) -> bool {
        if arg.field.is_some() || arg.name == TAKE_ARG || arg.name == SKIP_ARG {
            return true;
        }

        match &arg.value {
            None | Some(Value::Null) => true,
            Some(Value::Array(values)) => {
                let wanted: HashSet<String> = values.iter().filter_map(join_key).collect();
                record
                    .get(&arg.name)
                    .and_then(join_key)
                    .map(|key| wanted.contains(&key))
                    .unwrap_or(false)
            }
            Some(value) => record.get(&arg.name) == Some(value),
        }
    }

    fn paginate(records: Vec<Record>, query: &SubQuery) -> Vec<Record> {
        let as_count = |name: &str| {
            query
                .argument(name)
                .and_then(|arg| arg.value.as_ref())
                .and_then(Value::as_u64)
                .map(|n| n as usize)
        };

        let skip = as_count(SKIP_ARG).unwrap_or(0);
        let take = as_count(TAKE_ARG).unwrap_or(usize::MAX);
        records.into_iter().skip(skip).take(take).collect()
    }

    fn project(record: &Record, fields: &[String]) -> Record {
        if fields.is_empty() {
            return record.clone();
        }

        fields
            .iter()
            .filter_map(|field| record.get(field).map(|value| (field.clone(), value.clone())))
            .collect()
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for InMemoryFetcher {
    async fn fetch(&self, service: &str, query: &SubQuery) -> Result<Vec<Record>> {
        self.calls.lock().push(FetchCall {
            service: service.to_string(),
            query: query.clone(),
        });

        if let Some(latency) = self.latency.get(service) {
            tokio::time::sleep(*latency).await;
        }

        if let Some(message) = self.failures.get(service) {
            return Err(anyhow!("service '{}' unavailable: {}", service, message));
        }

        let records = self
            .records
            .get(service)
            .ok_or_else(|| anyhow!("no records for service '{}'", service))?;

        let matching: Vec<Record> = records
            .iter()
            .filter(|record| query.args.iter().all(|arg| Self::matches(record, arg)))
            .map(|record| Self::project(record, &query.fields))
            .collect();

        Ok(Self::paginate(matching, query))
    }
}
