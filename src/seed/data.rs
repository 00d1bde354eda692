use crate::fetch::InMemoryFetcher;
use crate::model::{JoinError, Relationship, ServiceConfig};
use crate::registry::ServiceRegistry;
use serde_json::{json, Value};

/// Helper to declare a plain foreign-key reference (single-valued)
fn reference(alias: &str, service: &str, foreign_key: &str) -> Relationship {
    Relationship::new(alias, service, foreign_key, "id")
}

/// Helper to declare the inverse side of a reference (array-valued)
fn collection(alias: &str, service: &str, foreign_key: &str) -> Relationship {
    Relationship::new(alias, service, foreign_key, "id").inverse()
}

/// Small commerce topology: customers place orders, orders hold items, items point at
/// products, and the inventory service grafts stock levels onto products
pub fn demo_topology() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("customers", &["id"]).with_relationship(collection(
            "orders",
            "orders",
            "customer_id",
        )),
        ServiceConfig::new("orders", &["id"])
            .with_relationship(collection("items", "order-items", "order_id"))
            .with_relationship(reference("customer", "customers", "customer_id")),
        ServiceConfig::new("order-items", &["id"])
            .with_relationship(reference("product", "products", "product_id"))
            .with_relationship(reference("order", "orders", "order_id")),
        ServiceConfig::new("products", &["id"]),
        ServiceConfig::new("inventory", &["id"]).with_extension(
            "products",
            collection("inventory", "inventory", "product_id").with_arg("single", json!(true)),
        ),
    ]
}

pub fn demo_registry() -> Result<ServiceRegistry, JoinError> {
    ServiceRegistry::from_configs(demo_topology())
}

fn customers() -> Vec<Value> {
    vec![
        json!({"id": "cus_01", "email": "ada@example.com", "name": "Ada"}),
        json!({"id": "cus_02", "email": "linus@example.com", "name": "Linus"}),
        json!({"id": "cus_03", "email": "grace@example.com", "name": "Grace"}),
    ]
}

fn orders() -> Vec<Value> {
    vec![
        json!({"id": "ord_01", "customer_id": "cus_01", "status": "completed", "total": 4200}),
        json!({"id": "ord_02", "customer_id": "cus_01", "status": "pending", "total": 1500}),
        json!({"id": "ord_03", "customer_id": "cus_02", "status": "completed", "total": 990}),
        json!({"id": "ord_04", "customer_id": null, "status": "draft", "total": 0}),
    ]
}

fn order_items() -> Vec<Value> {
    vec![
        json!({"id": "item_01", "order_id": "ord_01", "product_id": "prod_01", "quantity": 2}),
        json!({"id": "item_02", "order_id": "ord_01", "product_id": "prod_02", "quantity": 1}),
        json!({"id": "item_03", "order_id": "ord_02", "product_id": "prod_01", "quantity": 1}),
        json!({"id": "item_04", "order_id": "ord_03", "product_id": "prod_03", "quantity": 3}),
    ]
}

fn products() -> Vec<Value> {
    vec![
        json!({"id": "prod_01", "title": "Espresso Cup", "sku": "CUP-ESP"}),
        json!({"id": "prod_02", "title": "Milk Jug", "sku": "JUG-MLK"}),
        json!({"id": "prod_03", "title": "Grinder", "sku": "GRN-001"}),
    ]
}

fn inventory() -> Vec<Value> {
    vec![
        json!({"id": "inv_01", "product_id": "prod_01", "stocked_quantity": 120}),
        json!({"id": "inv_02", "product_id": "prod_02", "stocked_quantity": 0}),
    ]
}

/// In-memory fetcher loaded with records for every service of `demo_topology`
pub fn demo_fetcher() -> InMemoryFetcher {
    InMemoryFetcher::new()
        .with_records("customers", customers())
        .with_records("orders", orders())
        .with_records("order-items", order_items())
        .with_records("products", products())
        .with_records("inventory", inventory())
}
