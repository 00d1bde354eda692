use crate::model::{Argument, JoinError, Relationship, SINGLE_ARG};
use crate::registry::ServiceRegistry;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Attached as one record or `null`
    Single,
    /// Attached as a (possibly empty) list of records
    Many,
}

/// Join shape of one expand, as seen from the parent service
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRelationship {
    pub relationship: Relationship,
    pub via_extension: bool,
    pub cardinality: Cardinality,
}

impl ResolvedRelationship {
    /// Service the child records are fetched from
    pub fn target_service(&self) -> &str {
        &self.relationship.service_name
    }

    /// Field read from parent records to build the key filter
    pub fn parent_key(&self) -> &str {
        if self.relationship.inverse {
            &self.relationship.primary_key
        } else {
            &self.relationship.foreign_key
        }
    }

    /// Field on child records the key filter applies to
    pub fn child_key(&self) -> &str {
        if self.relationship.inverse {
            &self.relationship.foreign_key
        } else {
            &self.relationship.primary_key
        }
    }

    pub fn is_single(&self) -> bool {
        self.cardinality == Cardinality::Single
    }
}

pub struct RelationshipResolver;

impl RelationshipResolver {
    /// Resolve `property` on `service`, taking cardinality overrides from `args`
    pub fn resolve(
        registry: &ServiceRegistry,
        service: &str,
        property: &str,
        args: &[Argument],
    ) -> Result<ResolvedRelationship, JoinError> {
        let resolved = registry.resolve_alias(service, property)?;

        if resolved.via_extension {
            log::debug!(
                "'{}.{}' resolved through extension declared by '{}'",
                service,
                property,
                resolved.owner
            );
        }

        Ok(ResolvedRelationship {
            relationship: resolved.relationship.clone(),
            via_extension: resolved.via_extension,
            cardinality: Self::cardinality(&resolved.relationship, args),
        })
    }

    /// Per-query `single` wins, then the relationship default, then the structural shape
    pub fn cardinality(relationship: &Relationship, args: &[Argument]) -> Cardinality {
        let single = args
            .iter()
            .rev()
            .find(|arg| arg.name == SINGLE_ARG)
            .and_then(Argument::as_bool)
            .or_else(|| relationship.single())
            .unwrap_or(!relationship.inverse);

        if single {
            Cardinality::Single
        } else {
            Cardinality::Many
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceConfig;
    use serde_json::json;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::from_configs(vec![
            ServiceConfig::new("orders", &["id"])
                .with_relationship(
                    Relationship::new("items", "order-items", "order_id", "id").inverse(),
                )
                .with_relationship(Relationship::new(
                    "customer",
                    "customers",
                    "customer_id",
                    "id",
                ))
                .with_relationship(
                    Relationship::new("shipment", "shipments", "order_id", "id")
                        .inverse()
                        .with_arg("single", json!(true)),
                ),
            ServiceConfig::new("order-items", &["id"]),
            ServiceConfig::new("customers", &["id"]),
            ServiceConfig::new("shipments", &["id"]),
            ServiceConfig::new("reviews", &["id"]).with_extension(
                "customers",
                Relationship::new("reviews", "reviews", "customer_id", "id").inverse(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_inverse_relationship_is_many_and_filters_on_foreign_key() {
        let resolved =
            RelationshipResolver::resolve(&registry(), "orders", "items", &[]).unwrap();

        assert_eq!(resolved.cardinality, Cardinality::Many);
        assert_eq!(resolved.target_service(), "order-items");
        assert_eq!(resolved.parent_key(), "id");
        assert_eq!(resolved.child_key(), "order_id");
    }

    #[test]
    fn test_plain_reference_is_single_and_filters_on_primary_key() {
        let resolved =
            RelationshipResolver::resolve(&registry(), "orders", "customer", &[]).unwrap();

        assert!(resolved.is_single());
        assert_eq!(resolved.parent_key(), "customer_id");
        assert_eq!(resolved.child_key(), "id");
    }

    #[test]
    fn test_single_argument_precedence() {
        let registry = registry();

        // config default forces single on an inverse relationship
        let shipment = RelationshipResolver::resolve(&registry, "orders", "shipment", &[]).unwrap();
        assert!(shipment.is_single());

        // per-query value beats the config default
        let args = vec![Argument::new("single", json!(false))];
        let shipment =
            RelationshipResolver::resolve(&registry, "orders", "shipment", &args).unwrap();
        assert_eq!(shipment.cardinality, Cardinality::Many);

        // and beats structural inference
        let args = vec![Argument::new("single", json!(true))];
        let items = RelationshipResolver::resolve(&registry, "orders", "items", &args).unwrap();
        assert!(items.is_single());
    }

    #[test]
    fn test_extension_alias_joins_from_the_declaring_relationship() {
        let resolved =
            RelationshipResolver::resolve(&registry(), "customers", "reviews", &[]).unwrap();

        assert!(resolved.via_extension);
        assert_eq!(resolved.target_service(), "reviews");
        assert_eq!(resolved.parent_key(), "id");
        assert_eq!(resolved.child_key(), "customer_id");
    }

    #[test]
    fn test_unknown_alias() {
        let err = RelationshipResolver::resolve(&registry(), "orders", "refunds", &[]).unwrap_err();
        assert!(matches!(err, JoinError::UnknownRelationship { .. }));
    }
}
