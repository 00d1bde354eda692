use crate::logic::ResolvedRelationship;
use crate::model::{join_key, ExpandNode, Record};
use serde_json::Value;
use std::collections::HashMap;

/// Merges fetched child records back onto their parents
pub struct ResultAssembler;

impl ResultAssembler {
    /// Attach `children` under `node.property` on every parent
    ///
    /// Children must already carry their own nested expands. They are grouped by their join key
    /// before being projected, so key fields the caller did not ask for never leak into the output.
    pub fn attach(
        parents: &mut [Record],
        children: Vec<Record>,
        resolved: &ResolvedRelationship,
        node: &ExpandNode,
    ) {
        Self::attach_all(parents, vec![(node, resolved, children)]);
    }

    /// Attach every sibling branch of one level
    ///
    /// All parent keys are read before any property is written, so an alias that shadows a
    /// sibling's join field cannot change what that sibling matches.
    pub fn attach_all(
        parents: &mut [Record],
        branches: Vec<(&ExpandNode, &ResolvedRelationship, Vec<Record>)>,
    ) {
        let columns: Vec<(&ExpandNode, Vec<Value>)> = {
            let snapshot: &[Record] = parents;
            branches
                .into_iter()
                .map(|(node, resolved, children)| {
                    (node, Self::values_for(snapshot, children, resolved, node))
                })
                .collect()
        };

        for (node, values) in columns {
            for (parent, value) in parents.iter_mut().zip(values) {
                parent.insert(node.property.clone(), value);
            }
        }
    }

    /// Value each parent receives under `node.property`, in parent order
    fn values_for(
        parents: &[Record],
        children: Vec<Record>,
        resolved: &ResolvedRelationship,
        node: &ExpandNode,
    ) -> Vec<Value> {
        let groups = Self::group_by_key(children, resolved.child_key(), node);
        let parent_key = resolved.parent_key();

        parents
            .iter()
            .map(|parent| {
                let matches = parent
                    .get(parent_key)
                    .and_then(join_key)
                    .and_then(|key| groups.get(&key));

                if resolved.is_single() {
                    matches
                        .and_then(|group| group.first())
                        .map(|child| Value::Object(child.clone()))
                        .unwrap_or(Value::Null)
                } else {
                    Value::Array(
                        matches
                            .map(|group| group.iter().cloned().map(Value::Object).collect())
                            .unwrap_or_default(),
                    )
                }
            })
            .collect()
    }

    /// Children keyed by their join key, in fetch order within each key
    fn group_by_key(
        children: Vec<Record>,
        child_key: &str,
        node: &ExpandNode,
    ) -> HashMap<String, Vec<Record>> {
        let mut groups: HashMap<String, Vec<Record>> = HashMap::new();

        for child in children {
            let Some(key) = child.get(child_key).and_then(join_key) else {
                continue;
            };
            groups
                .entry(key)
                .or_default()
                .push(Self::project(child, &node.fields, &node.expands));
        }

        groups
    }

    /// Keep only the requested fields (in request order) and the expanded properties
    ///
    /// Requested fields missing from the record are left out rather than set to null.
    pub fn project(mut record: Record, fields: &[String], expands: &[ExpandNode]) -> Record {
        let mut projected = Record::new();

        for field in fields {
            if let Some(value) = record.remove(field) {
                projected.insert(field.clone(), value);
            }
        }
        for node in expands {
            if let Some(value) = record.remove(&node.property) {
                projected.insert(node.property.clone(), value);
            }
        }

        projected
    }
}
