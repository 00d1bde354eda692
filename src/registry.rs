use crate::model::{JoinError, Relationship, ServiceConfig, SINGLE_ARG};
use anyhow::Context;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// Where an alias on a service actually comes from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAlias {
    /// Service that declared the relationship (differs from the queried service for extensions)
    pub owner: String,
    pub relationship: Relationship,
    pub via_extension: bool,
}

/// Collects service configurations before the registry is sealed
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    services: IndexMap<String, ServiceConfig>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one service; names and relationship aliases must be unique
    pub fn register(&mut self, config: ServiceConfig) -> Result<&mut Self, JoinError> {
        if self.services.contains_key(&config.service_name) {
            return Err(JoinError::DuplicateService(config.service_name));
        }
        if config.service_name.is_empty() {
            return Err(JoinError::InvalidConfig(
                "service name must not be empty".to_string(),
            ));
        }
        if config.primary_keys.is_empty() {
            return Err(JoinError::InvalidConfig(format!(
                "service '{}' declares no primary keys",
                config.service_name
            )));
        }

        let declared = config
            .relationships
            .iter()
            .chain(config.extends.iter().map(|ext| &ext.resolve));
        for relationship in declared {
            validate_relationship(&config.service_name, relationship)?;
        }

        for (i, relationship) in config.relationships.iter().enumerate() {
            if config.relationships[..i]
                .iter()
                .any(|r| r.alias == relationship.alias)
            {
                return Err(JoinError::DuplicateRelationship {
                    service: config.service_name.clone(),
                    alias: relationship.alias.clone(),
                });
            }
        }

        self.services.insert(config.service_name.clone(), config);
        Ok(self)
    }

    pub fn register_all(
        &mut self,
        configs: impl IntoIterator<Item = ServiceConfig>,
    ) -> Result<&mut Self, JoinError> {
        for config in configs {
            self.register(config)?;
        }
        Ok(self)
    }

    /// Seal the registry, flattening direct relationships and extensions into one alias table
    pub fn build(self) -> Result<ServiceRegistry, JoinError> {
        let mut aliases: HashMap<String, HashMap<String, ResolvedAlias>> = self
            .services
            .keys()
            .map(|name| (name.clone(), HashMap::new()))
            .collect();

        for config in self.services.values() {
            for relationship in &config.relationships {
                self.require_service(&relationship.service_name)?;
                if let Some(table) = aliases.get_mut(&config.service_name) {
                    table.insert(
                        relationship.alias.clone(),
                        ResolvedAlias {
                            owner: config.service_name.clone(),
                            relationship: relationship.clone(),
                            via_extension: false,
                        },
                    );
                }
            }
        }

        for config in self.services.values() {
            for extension in &config.extends {
                self.require_service(&extension.service_name)?;
                self.require_service(&extension.resolve.service_name)?;

                let table = aliases
                    .get_mut(&extension.service_name)
                    .ok_or_else(|| JoinError::UnknownService(extension.service_name.clone()))?;
                if table.contains_key(&extension.resolve.alias) {
                    return Err(JoinError::DuplicateRelationship {
                        service: extension.service_name.clone(),
                        alias: extension.resolve.alias.clone(),
                    });
                }

                log::debug!(
                    "service '{}' extends '{}' with alias '{}'",
                    config.service_name,
                    extension.service_name,
                    extension.resolve.alias
                );
                table.insert(
                    extension.resolve.alias.clone(),
                    ResolvedAlias {
                        owner: config.service_name.clone(),
                        relationship: extension.resolve.clone(),
                        via_extension: true,
                    },
                );
            }
        }

        log::info!("Service registry sealed with {} service(s)", self.services.len());

        Ok(ServiceRegistry {
            services: self.services,
            aliases,
        })
    }

    fn require_service(&self, name: &str) -> Result<(), JoinError> {
        if self.services.contains_key(name) {
            Ok(())
        } else {
            Err(JoinError::UnknownService(name.to_string()))
        }
    }
}

fn validate_relationship(service: &str, relationship: &Relationship) -> Result<(), JoinError> {
    let missing = [
        ("alias", &relationship.alias),
        ("foreignKey", &relationship.foreign_key),
        ("primaryKey", &relationship.primary_key),
        ("serviceName", &relationship.service_name),
    ]
    .into_iter()
    .find(|(_, value)| value.is_empty());

    if let Some((name, _)) = missing {
        return Err(JoinError::InvalidConfig(format!(
            "relationship '{}' on service '{}' has an empty {}",
            relationship.alias, service, name
        )));
    }

    if let Some(single) = relationship.args.get(SINGLE_ARG) {
        if !single.is_boolean() {
            return Err(JoinError::InvalidConfig(format!(
                "relationship '{}' on service '{}' has a non-boolean '{}' default: {}",
                relationship.alias, service, SINGLE_ARG, single
            )));
        }
    }
    Ok(())
}

/// Sealed, read-only service topology shared by every join operation
#[derive(Debug)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceConfig>,
    aliases: HashMap<String, HashMap<String, ResolvedAlias>>,
}

impl ServiceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn from_configs(
        configs: impl IntoIterator<Item = ServiceConfig>,
    ) -> Result<Self, JoinError> {
        let mut builder = RegistryBuilder::new();
        builder.register_all(configs)?;
        builder.build()
    }

    /// Load a JSON array of service configurations
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading service topology {}", path.display()))?;
        let configs: Vec<ServiceConfig> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing service topology {}", path.display()))?;
        Ok(Self::from_configs(configs)?)
    }

    pub fn lookup(&self, service_name: &str) -> Result<&ServiceConfig, JoinError> {
        self.services
            .get(service_name)
            .ok_or_else(|| JoinError::UnknownService(service_name.to_string()))
    }

    /// Find the relationship behind `alias` on `service_name`, directly or via an extension
    pub fn resolve_alias(
        &self,
        service_name: &str,
        alias: &str,
    ) -> Result<&ResolvedAlias, JoinError> {
        let table = self
            .aliases
            .get(service_name)
            .ok_or_else(|| JoinError::UnknownService(service_name.to_string()))?;

        table
            .get(alias)
            .ok_or_else(|| JoinError::UnknownRelationship {
                service: service_name.to_string(),
                alias: alias.to_string(),
            })
    }

    /// Services in registration order
    pub fn services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> ServiceConfig {
        ServiceConfig::new("orders", &["id"])
            .with_relationship(Relationship::new("items", "order-items", "order_id", "id").inverse())
    }

    fn order_items() -> ServiceConfig {
        ServiceConfig::new("order-items", &["id"])
            .with_relationship(Relationship::new("order", "orders", "order_id", "id"))
    }

    #[test]
    fn test_register_rejects_duplicate_service() {
        let mut builder = ServiceRegistry::builder();
        builder.register(orders()).unwrap();

        let err = builder.register(orders()).unwrap_err();
        assert!(matches!(err, JoinError::DuplicateService(name) if name == "orders"));
    }

    #[test]
    fn test_register_rejects_empty_primary_keys() {
        let err = ServiceRegistry::builder()
            .register(ServiceConfig::new("orders", &[]))
            .unwrap_err();
        assert!(matches!(err, JoinError::InvalidConfig(_)));
    }

    #[test]
    fn test_register_rejects_non_boolean_single_default() {
        let config = ServiceConfig::new("orders", &["id"]).with_relationship(
            Relationship::new("items", "order-items", "order_id", "id")
                .inverse()
                .with_arg("single", serde_json::json!("yes")),
        );
        let err = ServiceRegistry::builder().register(config).unwrap_err();
        assert!(matches!(err, JoinError::InvalidConfig(ref msg) if msg.contains("single")));

        // extensions go through the same check
        let config = ServiceConfig::new("stock", &["id"]).with_extension(
            "orders",
            Relationship::new("stock", "stock", "order_id", "id").with_arg("single", serde_json::json!(1)),
        );
        let err = ServiceRegistry::builder().register(config).unwrap_err();
        assert!(matches!(err, JoinError::InvalidConfig(_)));
    }

    #[test]
    fn test_register_rejects_duplicate_alias() {
        let config = orders()
            .with_relationship(Relationship::new("items", "order-items", "order_id", "id"));
        let err = ServiceRegistry::builder().register(config).unwrap_err();
        assert!(matches!(
            err,
            JoinError::DuplicateRelationship { ref alias, .. } if alias == "items"
        ));
    }

    #[test]
    fn test_lookup_and_resolve_direct_alias() {
        let registry = ServiceRegistry::from_configs(vec![orders(), order_items()]).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("orders").unwrap().primary_keys, vec!["id"]);
        assert!(matches!(
            registry.lookup("payments"),
            Err(JoinError::UnknownService(_))
        ));

        let resolved = registry.resolve_alias("orders", "items").unwrap();
        assert_eq!(resolved.owner, "orders");
        assert!(!resolved.via_extension);
        assert!(resolved.relationship.inverse);

        let err = registry.resolve_alias("orders", "payments").unwrap_err();
        assert!(matches!(
            err,
            JoinError::UnknownRelationship { ref service, ref alias }
                if service == "orders" && alias == "payments"
        ));
    }

    #[test]
    fn test_extension_is_flattened_onto_target_service() {
        let inventory = ServiceConfig::new("inventory", &["id"]).with_extension(
            "order-items",
            Relationship::new("stock", "inventory", "sku", "sku").inverse(),
        );
        let registry =
            ServiceRegistry::from_configs(vec![orders(), order_items(), inventory]).unwrap();

        let resolved = registry.resolve_alias("order-items", "stock").unwrap();
        assert_eq!(resolved.owner, "inventory");
        assert!(resolved.via_extension);
        assert_eq!(resolved.relationship.service_name, "inventory");

        // the alias only exists on the extended service
        assert!(registry.resolve_alias("inventory", "stock").is_err());
    }

    #[test]
    fn test_build_rejects_unknown_targets() {
        let err = ServiceRegistry::from_configs(vec![orders()]).unwrap_err();
        assert!(matches!(err, JoinError::UnknownService(name) if name == "order-items"));

        let inventory = ServiceConfig::new("inventory", &["id"]).with_extension(
            "warehouses",
            Relationship::new("stock", "inventory", "sku", "sku"),
        );
        let err = ServiceRegistry::from_configs(vec![inventory]).unwrap_err();
        assert!(matches!(err, JoinError::UnknownService(name) if name == "warehouses"));
    }

    #[test]
    fn test_build_rejects_extension_shadowing_direct_alias() {
        let shadow = ServiceConfig::new("shadow", &["id"]).with_extension(
            "orders",
            Relationship::new("items", "shadow", "order_id", "id").inverse(),
        );
        let err = ServiceRegistry::from_configs(vec![orders(), order_items(), shadow]).unwrap_err();
        assert!(matches!(
            err,
            JoinError::DuplicateRelationship { ref service, ref alias }
                if service == "orders" && alias == "items"
        ));
    }

    #[test]
    fn test_services_keep_registration_order() {
        let registry = ServiceRegistry::from_configs(vec![order_items(), orders()]).unwrap();
        let names: Vec<&str> = registry
            .services()
            .map(|s| s.service_name.as_str())
            .collect();
        assert_eq!(names, vec!["order-items", "orders"]);
    }
}
