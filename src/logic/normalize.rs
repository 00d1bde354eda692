use crate::logic::RelationshipResolver;
use crate::model::{
    merge_arguments, Argument, ExpandNode, ExpandInput, JoinError, NormalizedQuery, Query,
    SINGLE_ARG,
};
use crate::registry::ServiceRegistry;
use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;

/// Expand node while the input is still being merged
#[derive(Debug, Default)]
struct DraftNode {
    fields: Vec<String>,
    args: Vec<Argument>,
    children: IndexMap<String, DraftNode>,
}

impl DraftNode {
    fn merge(&mut self, fields: &[String], args: &[Argument]) {
        self.fields.extend(fields.iter().cloned());
        merge_arguments(&mut self.args, args.iter().cloned());
    }
}

/// Turns raw queries into one canonical expand tree, validated against the registry
pub struct QueryNormalizer<'a> {
    registry: &'a ServiceRegistry,
    max_depth: usize,
}

impl<'a> QueryNormalizer<'a> {
    pub fn new(registry: &'a ServiceRegistry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    pub fn normalize(&self, query: &Query) -> Result<NormalizedQuery, JoinError> {
        self.registry.lookup(&query.service)?;

        let fields = dedup_fields(&query.fields)?;
        if fields.is_empty() {
            return Err(JoinError::InvalidQuery(format!(
                "query on '{}' requests no fields",
                query.service
            )));
        }

        validate_arguments(&query.args, &query.service)?;
        let mut args = Vec::new();
        merge_arguments(&mut args, query.args.iter().cloned());

        let mut drafts = IndexMap::new();
        if let Some(input) = &query.expands {
            collect(input, &mut drafts)?;
        }

        let expands = self.finalize(drafts, &query.service, "", 1)?;

        Ok(NormalizedQuery {
            service: query.service.clone(),
            fields,
            args,
            expands,
        })
    }

    fn finalize(
        &self,
        drafts: IndexMap<String, DraftNode>,
        service: &str,
        parent_path: &str,
        depth: usize,
    ) -> Result<Vec<ExpandNode>, JoinError> {
        let mut nodes = Vec::with_capacity(drafts.len());

        for (property, draft) in drafts {
            let path = child_path(parent_path, &property);
            if depth > self.max_depth {
                return Err(JoinError::MaxDepthExceeded {
                    path,
                    max_depth: self.max_depth,
                });
            }

            let resolved = self.registry.resolve_alias(service, &property)?;
            validate_arguments(&draft.args, &path)?;

            let fields = dedup_fields(&draft.fields)?;
            if fields.is_empty() && draft.children.is_empty() {
                return Err(JoinError::InvalidQuery(format!(
                    "expand '{}' requests no fields",
                    path
                )));
            }

            let mut args: Vec<Argument> = resolved
                .relationship
                .args
                .iter()
                .map(|(name, value)| Argument::new(name.clone(), value.clone()))
                .collect();
            merge_arguments(&mut args, draft.args);

            let target = resolved.relationship.service_name.clone();
            let expands = self.finalize(draft.children, &target, &path, depth + 1)?;

            nodes.push(ExpandNode {
                property,
                fields,
                args,
                expands,
            });
        }

        Ok(nodes)
    }
}

/// Resolve every alias of an already-built tree and check its depth, without fetching anything
pub fn resolve_tree(
    registry: &ServiceRegistry,
    service: &str,
    nodes: &[ExpandNode],
    max_depth: usize,
) -> Result<(), JoinError> {
    check_level(registry, service, nodes, "", 1, max_depth)
}

fn check_level(
    registry: &ServiceRegistry,
    service: &str,
    nodes: &[ExpandNode],
    parent_path: &str,
    depth: usize,
    max_depth: usize,
) -> Result<(), JoinError> {
    for node in nodes {
        let path = child_path(parent_path, &node.property);
        if depth > max_depth {
            return Err(JoinError::MaxDepthExceeded { path, max_depth });
        }
        let resolved = RelationshipResolver::resolve(registry, service, &node.property, &node.args)?;
        check_level(
            registry,
            resolved.target_service(),
            &node.expands,
            &path,
            depth + 1,
            max_depth,
        )?;
    }
    Ok(())
}

fn collect(input: &ExpandInput, into: &mut IndexMap<String, DraftNode>) -> Result<(), JoinError> {
    match input {
        ExpandInput::List(entries) => {
            for entry in entries {
                let node = descend(into, &entry.property)?;
                node.merge(&entry.fields, &entry.args);
                if let Some(nested) = &entry.expands {
                    collect(nested, &mut node.children)?;
                }
            }
        }
        ExpandInput::Nested(map) => {
            for (property, nested) in map {
                let node = descend(into, property)?;
                node.merge(&nested.fields, &nested.args);
                if let Some(children) = &nested.expands {
                    collect(children, &mut node.children)?;
                }
            }
        }
    }
    Ok(())
}

/// Walk (creating as needed) the nodes of a dotted property path
fn descend<'m>(
    map: &'m mut IndexMap<String, DraftNode>,
    path: &str,
) -> Result<&'m mut DraftNode, JoinError> {
    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    if first.is_empty() {
        return Err(invalid_path(path));
    }

    let mut node = map.entry(first.to_string()).or_default();
    for segment in segments {
        if segment.is_empty() {
            return Err(invalid_path(path));
        }
        node = node.children.entry(segment.to_string()).or_default();
    }
    Ok(node)
}

fn invalid_path(path: &str) -> JoinError {
    JoinError::InvalidQuery(format!("invalid expand property path '{}'", path))
}

fn dedup_fields(fields: &[String]) -> Result<Vec<String>, JoinError> {
    if fields.iter().any(|f| f.is_empty()) {
        return Err(JoinError::InvalidQuery(
            "field names must not be empty".to_string(),
        ));
    }
    Ok(fields.iter().unique().cloned().collect())
}

fn validate_arguments(args: &[Argument], location: &str) -> Result<(), JoinError> {
    for arg in args {
        if arg.name.is_empty() {
            return Err(JoinError::InvalidQuery(format!(
                "argument without a name on '{}'",
                location
            )));
        }
        if arg.name == SINGLE_ARG && !matches!(arg.value, Some(Value::Bool(_))) {
            return Err(JoinError::InvalidQuery(format!(
                "argument '{}' on '{}' must be a boolean",
                SINGLE_ARG, location
            )));
        }
    }
    Ok(())
}

pub(crate) fn child_path(parent: &str, property: &str) -> String {
    if parent.is_empty() {
        property.to_string()
    } else {
        format!("{}.{}", parent, property)
    }
}
