use crate::model::SINGLE_ARG;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Directed edge from the declaring service to `service_name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Name used in queries to request this expand
    pub alias: String,

    /// Field holding the reference
    pub foreign_key: String,

    /// Field being referenced
    pub primary_key: String,

    /// The other service
    pub service_name: String,

    /// When true the foreign key lives on the other service and the primary key on the
    /// declaring one
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inverse: bool,

    /// Default arguments merged into every sub-query generated for this relationship
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

impl Relationship {
    pub fn new(
        alias: impl Into<String>,
        service_name: impl Into<String>,
        foreign_key: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            foreign_key: foreign_key.into(),
            primary_key: primary_key.into(),
            service_name: service_name.into(),
            inverse: false,
            args: Map::new(),
        }
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.insert(name.into(), value);
        self
    }

    /// The configured `single` default, if any
    pub fn single(&self) -> Option<bool> {
        self.args.get(SINGLE_ARG).and_then(Value::as_bool)
    }
}

/// Grafts `resolve` onto the alias namespace of `service_name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub service_name: String,
    pub resolve: Relationship,
}

/// Identity and relationships of one data-owning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub service_name: String,

    /// Ordered set of fields forming the record identity
    pub primary_keys: Vec<String>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<Extension>,
}

impl ServiceConfig {
    pub fn new(service_name: impl Into<String>, primary_keys: &[&str]) -> Self {
        Self {
            service_name: service_name.into(),
            primary_keys: primary_keys.iter().map(|k| k.to_string()).collect(),
            relationships: Vec::new(),
            extends: Vec::new(),
        }
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_extension(mut self, service_name: impl Into<String>, resolve: Relationship) -> Self {
        self.extends.push(Extension {
            service_name: service_name.into(),
            resolve,
        });
        self
    }

    pub fn relationship(&self, alias: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.alias == alias)
    }
}
