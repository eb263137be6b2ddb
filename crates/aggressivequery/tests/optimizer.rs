//! Join, prefetch and column directives emitted for a selection.

mod common;

use aggressivequery::{PlannerConfig, QuerySet, Select, build_optimized_query};
use common::{Fixture, strict};

fn optimize(fixture: &Fixture, base: Select, selection: &[&str], config: PlannerConfig) -> Select {
    build_optimized_query(&fixture.extractor, base, selection, config)
        .unwrap()
        .into_query()
        .unwrap()
}

fn lookups(query: &Select) -> Vec<&str> {
    query.prefetches().iter().map(|p| p.lookup.as_str()).collect()
}

#[test]
fn to_many_costs_exactly_one_more_round_trip() {
    let shop = Fixture::shop();
    let query = optimize(
        &shop,
        shop.select("order"),
        &["name", "items__name"],
        PlannerConfig::default(),
    );
    assert!(query.joins().is_empty());
    assert_eq!(lookups(&query), vec!["items"]);
    assert_eq!(query.round_trips().unwrap(), 2);

    let statements = query.statements().unwrap();
    assert_eq!(statements[0], "SELECT \"order\".\"id\", \"order\".\"name\" FROM \"order\"");
    assert_eq!(
        statements[1],
        "SELECT \"item\".\"id\", \"item\".\"name\", \"item\".\"price\", \"item\".\"order_id\" FROM \"item\""
    );
}

#[test]
fn column_restriction_follows_the_mode() {
    let shop = Fixture::shop();

    let strict_sql = optimize(&shop, shop.select("customer"), &["name"], strict())
        .to_sql()
        .unwrap();
    assert_eq!(
        strict_sql,
        "SELECT \"customer\".\"id\", \"customer\".\"name\" FROM \"customer\""
    );
    assert!(!strict_sql.contains("memo"));

    let loose_sql = optimize(&shop, shop.select("customer"), &["name"], PlannerConfig::default())
        .to_sql()
        .unwrap();
    assert!(loose_sql.contains("\"customer\".\"memo\""));
}

#[test]
fn reverse_one_to_one_is_joined_with_every_column() {
    let shop = Fixture::shop();
    let query = optimize(&shop, shop.select("customer"), &["karma__karma"], strict());
    assert_eq!(query.joins(), ["karma"]);
    assert!(query.prefetches().is_empty());
    assert_eq!(query.round_trips().unwrap(), 1);
    assert_eq!(
        query.to_sql().unwrap(),
        "SELECT \"customer\".\"id\", \"karma\".\"id\" AS \"karma__id\", \
         \"karma\".\"karma\" AS \"karma__karma\", \"karma\".\"memo3\" AS \"karma__memo3\" \
         FROM \"customer\" \
         LEFT JOIN \"customerkarma\" AS \"karma\" ON \"karma\".\"customer_id\" = \"customer\".\"id\""
    );
}

#[test]
fn forward_one_to_one_is_joined_with_selected_columns() {
    let shop = Fixture::shop();
    let query = optimize(&shop, shop.select("customerkarma"), &["customer__name"], strict());
    assert_eq!(query.joins(), ["customer"]);
    let sql = query.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT \"customerkarma\".\"id\", \"customer\".\"name\" AS \"customer__name\", \
         \"customer\".\"id\" AS \"customer__id\" FROM \"customerkarma\" \
         LEFT JOIN \"customer\" AS \"customer\" ON \"customerkarma\".\"customer_id\" = \"customer\".\"id\""
    );
    assert!(!sql.contains("memo"));
}

#[test]
fn bare_forward_relation_keeps_its_foreign_key() {
    let shop = Fixture::shop();
    let query = optimize(&shop, shop.select("item"), &["name", "order"], strict());
    assert!(query.joins().is_empty());
    assert_eq!(
        query.to_sql().unwrap(),
        "SELECT \"item\".\"id\", \"item\".\"name\", \"item\".\"order_id\" FROM \"item\""
    );
}

#[test]
fn prefetch_sub_query_keeps_the_stitch_column() {
    let shop = Fixture::shop();
    let query = optimize(&shop, shop.select("order"), &["items__name"], strict());
    assert_eq!(query.to_sql().unwrap(), "SELECT \"order\".\"id\" FROM \"order\"");

    let prefetch = &query.prefetches()[0];
    assert_eq!(prefetch.lookup, "items");
    assert_eq!(prefetch.to_attr, None);
    let sub = prefetch.query.as_ref().unwrap();
    assert_eq!(sub.model(), "item");
    assert_eq!(
        sub.to_sql().unwrap(),
        "SELECT \"item\".\"id\", \"item\".\"name\", \"item\".\"order_id\" FROM \"item\""
    );
}

#[test]
fn nested_to_one_chain_becomes_nested_joins() {
    let shop = Fixture::shop();
    let query = optimize(&shop, shop.select("subitem"), &["item__order__name"], strict());
    assert_eq!(query.joins(), ["item", "item__order"]);
    assert_eq!(
        query.to_sql().unwrap(),
        "SELECT \"subitem\".\"id\", \"item__order\".\"name\" AS \"item__order__name\", \
         \"item\".\"id\" AS \"item__id\", \"item__order\".\"id\" AS \"item__order__id\" \
         FROM \"subitem\" \
         LEFT JOIN \"item\" AS \"item\" ON \"subitem\".\"item_id\" = \"item\".\"id\" \
         LEFT JOIN \"order\" AS \"item__order\" ON \"item\".\"order_id\" = \"item__order\".\"id\""
    );
}

#[test]
fn to_many_behind_a_join_is_prefetched_from_the_root() {
    let shop = Fixture::shop();
    let query = optimize(
        &shop,
        shop.select("customerposition"),
        &["position", "customer__orders__name"],
        PlannerConfig::default(),
    );
    assert_eq!(query.joins(), ["customer"]);
    assert_eq!(lookups(&query), vec!["customer__orders"]);
    assert_eq!(query.round_trips().unwrap(), 2);
    let sub = query.prefetches()[0].query.as_ref().unwrap();
    assert_eq!(sub.model(), "order");
}

#[test]
fn nested_prefetches_are_flattened() {
    let shop = Fixture::shop();
    let query = optimize(
        &shop,
        shop.select("customer"),
        &["orders__items__name"],
        PlannerConfig::default(),
    );
    assert!(query.joins().is_empty());
    assert_eq!(lookups(&query), vec!["orders", "orders__items"]);
    assert_eq!(query.round_trips().unwrap(), 3);
}

#[test]
fn optimizer_replaces_prior_configuration() {
    let shop = Fixture::shop();
    let base = shop
        .select("item")
        .set_joins(vec!["order".to_string()])
        .set_prefetches(vec![aggressivequery::Prefetch::new("subitems")]);
    assert_eq!(base.round_trips().unwrap(), 2);

    let query = optimize(&shop, base, &["name"], PlannerConfig::default());
    assert!(query.joins().is_empty());
    assert!(query.prefetches().is_empty());
    assert_eq!(query.round_trips().unwrap(), 1);
}

#[test]
fn unsorted_mode_keeps_selection_order_in_the_projection() {
    let shop = Fixture::shop();
    let query = optimize(
        &shop,
        shop.select("item"),
        &["price", "name"],
        strict().sorted(false),
    );
    assert_eq!(query.columns(), Some(&["price".to_string(), "name".to_string()][..]));
}
