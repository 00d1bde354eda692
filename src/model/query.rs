use crate::model::{Argument, JoinError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A join request against a root service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub service: String,

    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Argument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expands: Option<ExpandInput>,
}

/// Expands in either of the two accepted input forms
///
/// Both forms may nest further expands of either form at every level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpandInput {
    /// `[{ "property": "items.product", "fields": [...] }, ...]`
    List(Vec<ExpandEntry>),
    /// `{ "items": { "fields": [...], "expands": { "product": {...} } } }`
    Nested(IndexMap<String, NestedExpand>),
}

/// One entry of the flat list form; `property` may be a dotted path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandEntry {
    pub property: String,

    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Argument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expands: Option<ExpandInput>,
}

/// Value of the nested mapping form, keyed by property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedExpand {
    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Argument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expands: Option<ExpandInput>,
}

/// Canonical expand tree node produced by normalization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandNode {
    pub property: String,
    pub fields: Vec<String>,
    pub args: Vec<Argument>,
    pub expands: Vec<ExpandNode>,
}

impl ExpandNode {
    /// Node without fields that only exists to reach nested expands
    pub fn is_structural(&self) -> bool {
        self.fields.is_empty() && !self.expands.is_empty()
    }
}

impl From<ExpandNode> for ExpandEntry {
    fn from(node: ExpandNode) -> Self {
        let expands = if node.expands.is_empty() {
            None
        } else {
            Some(ExpandInput::List(
                node.expands.into_iter().map(ExpandEntry::from).collect(),
            ))
        };

        Self {
            property: node.property,
            fields: node.fields,
            args: node.args,
            expands,
        }
    }
}

/// Query after normalization: aliases resolved, arguments merged, one canonical tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedQuery {
    pub service: String,
    pub fields: Vec<String>,
    pub args: Vec<Argument>,
    pub expands: Vec<ExpandNode>,
}

impl From<NormalizedQuery> for Query {
    fn from(normalized: NormalizedQuery) -> Self {
        let expands = if normalized.expands.is_empty() {
            None
        } else {
            Some(ExpandInput::List(
                normalized
                    .expands
                    .into_iter()
                    .map(ExpandEntry::from)
                    .collect(),
            ))
        };

        Self {
            service: normalized.service,
            fields: normalized.fields,
            args: normalized.args,
            expands,
        }
    }
}

/// Request sent to one remote service by the joiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuery {
    pub fields: Vec<String>,

    #[serde(default)]
    pub args: Vec<Argument>,

    /// Name of the argument in `args` that carries the join key filter, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
}

impl SubQuery {
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.args.iter().find(|arg| arg.name == name)
    }

    /// The join key filter as `(field, values)`
    pub fn key_filter(&self) -> Option<(&str, &[Value])> {
        let field = self.key_field.as_deref()?;
        match self.argument(field)?.value.as_ref()? {
            Value::Array(values) => Some((field, values.as_slice())),
            _ => None,
        }
    }
}

impl Query {
    pub fn new(service: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            service: service.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            args: Vec::new(),
            expands: None,
        }
    }

    pub fn with_arg(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    /// Append a flat-form expand entry, converting any existing nested mapping first
    pub fn with_expand(mut self, property: &str, fields: &[&str]) -> Self {
        let entry = ExpandEntry {
            property: property.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            args: Vec::new(),
            expands: None,
        };
        self.push_expand(entry);
        self
    }

    pub fn with_expand_entry(mut self, entry: ExpandEntry) -> Self {
        self.push_expand(entry);
        self
    }

    fn push_expand(&mut self, entry: ExpandEntry) {
        match self.expands.take() {
            None => self.expands = Some(ExpandInput::List(vec![entry])),
            Some(ExpandInput::List(mut entries)) => {
                entries.push(entry);
                self.expands = Some(ExpandInput::List(entries));
            }
            Some(ExpandInput::Nested(map)) => {
                let mut entries: Vec<ExpandEntry> = map
                    .into_iter()
                    .map(|(property, nested)| ExpandEntry {
                        property,
                        fields: nested.fields,
                        args: nested.args,
                        expands: nested.expands,
                    })
                    .collect();
                entries.push(entry);
                self.expands = Some(ExpandInput::List(entries));
            }
        }
    }

    /// Parse a raw JSON request body, reporting shape problems as `InvalidQuery`
    pub fn from_json(value: Value) -> Result<Self, JoinError> {
        serde_json::from_value(value)
            .map_err(|e| JoinError::InvalidQuery(format!("malformed query: {}", e)))
    }
}
