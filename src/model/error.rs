use std::fmt;
use thiserror::Error;

/// Everything a join operation or the registry can fail with
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("service '{service}' has no relationship '{alias}'")]
    UnknownRelationship { service: String, alias: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("service '{0}' is already registered")]
    DuplicateService(String),

    #[error("relationship alias '{alias}' is declared more than once for service '{service}'")]
    DuplicateRelationship { service: String, alias: String },

    #[error("invalid service configuration: {0}")]
    InvalidConfig(String),

    #[error("expand path '{path}' exceeds the maximum depth of {max_depth}")]
    MaxDepthExceeded { path: String, max_depth: usize },

    #[error(transparent)]
    BranchFetch(#[from] BranchFetchError),

    #[error(transparent)]
    Aggregated(#[from] AggregatedJoinError),

    #[error("join operation was cancelled")]
    Cancelled,
}

impl JoinError {
    /// Configuration and query-shape errors, detected before any fetch is issued
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JoinError::UnknownService(_)
                | JoinError::UnknownRelationship { .. }
                | JoinError::InvalidQuery(_)
                | JoinError::MaxDepthExceeded { .. }
        )
    }

    /// Every failed fetch carried by this error, flattened
    pub fn failures(&self) -> Vec<&BranchFetchError> {
        match self {
            JoinError::BranchFetch(failure) => vec![failure],
            JoinError::Aggregated(aggregated) => aggregated.failures.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// One failed fetch call, identified by its property path
///
/// The root fetch has an empty path.
#[derive(Debug, Error)]
pub struct BranchFetchError {
    pub path: String,
    pub service: String,
    #[source]
    pub source: anyhow::Error,
}

impl fmt::Display for BranchFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(
                f,
                "root fetch from service '{}' failed: {}",
                self.service, self.source
            )
        } else {
            write!(
                f,
                "fetch for '{}' from service '{}' failed: {}",
                self.path, self.service, self.source
            )
        }
    }
}

/// All branch failures of one join operation
#[derive(Debug, Error)]
pub struct AggregatedJoinError {
    pub failures: Vec<BranchFetchError>,
}

impl AggregatedJoinError {
    pub fn paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }
}

impl fmt::Display for AggregatedJoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} expand branch(es) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(path: &str, service: &str) -> BranchFetchError {
        BranchFetchError {
            path: path.to_string(),
            service: service.to_string(),
            source: anyhow::anyhow!("connection refused"),
        }
    }

    #[test]
    fn test_aggregated_error_lists_every_path() {
        let err = JoinError::from(AggregatedJoinError {
            failures: vec![failure("items", "order-items"), failure("items.product", "products")],
        });

        let message = err.to_string();
        assert!(message.starts_with("2 expand branch(es) failed"));
        assert!(message.contains("'items' from service 'order-items'"));
        assert!(message.contains("'items.product' from service 'products'"));

        let paths: Vec<&str> = err.failures().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["items", "items.product"]);
    }

    #[test]
    fn test_root_failure_display() {
        let err = failure("", "orders");
        assert_eq!(
            err.to_string(),
            "root fetch from service 'orders' failed: connection refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(JoinError::InvalidQuery("empty".into()).is_client_error());
        assert!(JoinError::UnknownService("x".into()).is_client_error());
        assert!(!JoinError::Cancelled.is_client_error());
        assert!(!JoinError::DuplicateService("x".into()).is_client_error());
    }
}
