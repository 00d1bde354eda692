use crate::fetch::RemoteFetcher;
use crate::model::{Record, SubQuery};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Body returned by a remote service; either a bare array or wrapped in `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FetchResponse {
    Records(Vec<Record>),
    Wrapped { data: Vec<Record> },
}

/// Fetcher that POSTs each sub-query as JSON to the service's configured endpoint
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpFetcher {
    pub fn new(endpoints: HashMap<String, String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(client: reqwest::Client, endpoints: HashMap<String, String>) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints.get(service).map(String::as_str)
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, service: &str, query: &SubQuery) -> Result<Vec<Record>> {
        let url = self
            .endpoint(service)
            .ok_or_else(|| anyhow!("no endpoint configured for service '{}'", service))?;

        log::debug!("POST {} ({} field(s))", url, query.fields.len());

        let response = self
            .client
            .post(url)
            .json(query)
            .send()
            .await
            .with_context(|| format!("request to service '{}' failed", service))?
            .error_for_status()
            .with_context(|| format!("service '{}' returned an error status", service))?;

        let body: FetchResponse = response
            .json()
            .await
            .with_context(|| format!("service '{}' returned an unreadable body", service))?;

        Ok(match body {
            FetchResponse::Records(records) => records,
            FetchResponse::Wrapped { data } => data,
        })
    }
}
