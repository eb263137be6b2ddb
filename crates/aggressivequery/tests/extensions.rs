//! prefetch_filter, skip_filter and custom_prefetch.

mod common;

use aggressivequery::{
    AggressiveQuery, ExtensionArgs, ExtensionKind, ExtensionRegistry, Expr, PlannerConfig,
    Prefetch, QuerySet, Select, SkipFilterExtension, build_optimized_query,
};
use common::{Fixture, strict};

fn bind(fixture: &Fixture, root: &'static str, selection: &[&str], config: PlannerConfig) -> AggressiveQuery<Select> {
    build_optimized_query(&fixture.extractor, fixture.select(root), selection, config).unwrap()
}

fn lookups(query: &Select) -> Vec<&str> {
    query.prefetches().iter().map(|p| p.lookup.as_str()).collect()
}

// ============================================================================
// prefetch_filter
// ============================================================================

#[test]
fn prefetch_filters_compose_in_registration_order() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["name", "items__name"], PlannerConfig::default())
        .prefetch_filter("items", |q: Select| q.filter(Expr::col("price").ge(0)))
        .unwrap()
        .prefetch_filter("items", |q: Select| q.filter(Expr::col("name").eq("x")))
        .unwrap();

    let optimized = query.to_query().unwrap();
    let (sql, params) = optimized.prefetches()[0].query.as_ref().unwrap().build().unwrap();
    assert!(sql.ends_with(" WHERE \"item\".\"price\" >= $1 AND \"item\".\"name\" = $2"));
    assert_eq!(params.len(), 2);
    assert!(!optimized.to_sql().unwrap().contains("WHERE"));
}

#[test]
fn prefetch_filter_applies_to_nested_paths_only() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["items__subitems__name"], PlannerConfig::default())
        .prefetch_filter("items__subitems", |q: Select| q.filter(Expr::col("name").ne("")))
        .unwrap()
        .into_query()
        .unwrap();

    assert_eq!(lookups(&query), vec!["items", "items__subitems"]);
    let items = query.prefetches()[0].query.as_ref().unwrap();
    let subitems = query.prefetches()[1].query.as_ref().unwrap();
    assert!(items.where_clause().is_none());
    assert!(subitems.to_sql().unwrap().contains("WHERE \"subitem\".\"name\" <> $1"));
}

#[test]
fn prefetch_filter_resolves_aliases() {
    let shop = Fixture::shop();
    let query = bind(&shop, "customer", &["customerposition__position"], PlannerConfig::default())
        .prefetch_filter("customerposition", |q: Select| q.filter(Expr::col("position").gt(1)))
        .unwrap()
        .into_query()
        .unwrap();
    assert_eq!(lookups(&query), vec!["customerposition_set"]);
    assert!(query.prefetches()[0].query.as_ref().unwrap().where_clause().is_some());
}

#[test]
fn configuring_leaves_the_receiver_untouched() {
    let shop = Fixture::shop();
    let base = bind(&shop, "order", &["items__name"], PlannerConfig::default());
    let before = base.to_query().unwrap().clone();

    let filtered = base
        .prefetch_filter("items", |q: Select| q.filter(Expr::col("price").gt(10)))
        .unwrap();
    assert!(filtered.to_query().unwrap().prefetches()[0]
        .query
        .as_ref()
        .unwrap()
        .where_clause()
        .is_some());

    let after = base.to_query().unwrap();
    assert!(after.prefetches()[0].query.as_ref().unwrap().where_clause().is_none());
    assert_eq!(after.statements().unwrap(), before.statements().unwrap());
}

// ============================================================================
// skip_filter
// ============================================================================

#[test]
fn skipping_a_leaf_keeps_its_parent() {
    let shop = Fixture::shop();
    let query = bind(
        &shop,
        "customer",
        &["name", "orders__name", "orders__items__name"],
        strict(),
    )
    .skip_filter(&["orders__items"])
    .unwrap()
    .into_query()
    .unwrap();
    assert_eq!(lookups(&query), vec!["orders"]);
}

#[test]
fn skipping_a_relation_drops_its_directive() {
    let shop = Fixture::shop();
    let query = bind(&shop, "customer", &["name", "orders__items__name"], strict())
        .skip_filter(&["orders"])
        .unwrap()
        .into_query()
        .unwrap();
    assert!(query.prefetches().is_empty());
    assert_eq!(query.round_trips().unwrap(), 1);
}

#[test]
fn skipping_the_sole_reason_for_a_join_drops_the_join() {
    let shop = Fixture::shop();
    let bound = bind(
        &shop,
        "customer",
        &["name", "karma__karma", "orders__name"],
        strict(),
    );
    assert_eq!(bound.to_query().unwrap().joins(), ["karma"]);

    let skipped = bound.skip_filter(&["karma__karma"]).unwrap();
    let query = skipped.to_query().unwrap();
    assert!(query.joins().is_empty());
    assert_eq!(lookups(query), vec!["orders"]);
    assert!(!query.to_sql().unwrap().contains("karma"));

    // the extracted tree is reported before the filter runs
    assert!(skipped.result().unwrap().subresult("karma").is_some());
}

#[test]
fn skipping_a_field_keeps_the_relation_when_others_remain() {
    let shop = Fixture::shop();
    let query = bind(&shop, "customer", &["karma__karma", "karma__memo3"], strict())
        .skip_filter(&["karma__memo3"])
        .unwrap()
        .into_query()
        .unwrap();
    assert_eq!(query.joins(), ["karma"]);
}

#[test]
fn skip_paths_resolve_aliases() {
    let shop = Fixture::shop();
    let query = bind(&shop, "customer", &["name", "customerposition__position"], strict())
        .skip_filter(&["customerposition"])
        .unwrap()
        .into_query()
        .unwrap();
    assert!(query.prefetches().is_empty());
}

#[test]
fn malformed_skip_path_is_rejected() {
    let shop = Fixture::shop();
    let err = bind(&shop, "customer", &["name"], strict())
        .skip_filter(&["orders____items"])
        .unwrap_err();
    assert!(err.is_invalid_selection());
}

// ============================================================================
// custom_prefetch
// ============================================================================

fn positive_items(shop: &Fixture) -> Prefetch<Select> {
    Prefetch::new("items")
        .query(shop.select("item").filter(Expr::col("price").gt(0)))
        .to_attr("positive_items")
}

#[test]
fn custom_prefetch_replaces_the_sub_query() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["name", "positive_items__name"], PlannerConfig::default())
        .custom_prefetch("positive_items", positive_items(&shop))
        .unwrap();

    let result = query.result().unwrap();
    assert_eq!(
        result.reverse_related[0].to_string(),
        "CustomHint(name='positive_items')"
    );

    let optimized = query.to_query().unwrap();
    assert_eq!(optimized.round_trips().unwrap(), 2);
    let prefetch = &optimized.prefetches()[0];
    assert_eq!(prefetch.lookup, "items");
    assert_eq!(prefetch.to_attr.as_deref(), Some("positive_items"));
    assert_eq!(prefetch.attribute(), "positive_items");
    let (sql, _) = prefetch.query.as_ref().unwrap().build().unwrap();
    assert!(sql.ends_with("FROM \"item\" WHERE \"item\".\"price\" > $1"));
}

#[test]
fn custom_prefetch_restricts_columns_and_keeps_the_stitch() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["positive_items__name"], strict())
        .custom_prefetch("positive_items", positive_items(&shop))
        .unwrap()
        .into_query()
        .unwrap();
    let sub = query.prefetches()[0].query.as_ref().unwrap();
    assert_eq!(
        sub.to_sql().unwrap(),
        "SELECT \"item\".\"id\", \"item\".\"name\", \"item\".\"order_id\" FROM \"item\" \
         WHERE \"item\".\"price\" > $1"
    );
}

#[test]
fn selections_under_a_custom_prefetch_use_its_name() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["positive_items__subitems__name"], PlannerConfig::default())
        .custom_prefetch("positive_items", positive_items(&shop))
        .unwrap()
        .into_query()
        .unwrap();
    assert_eq!(lookups(&query), vec!["items", "positive_items__subitems"]);
    assert_eq!(query.prefetches()[1].query.as_ref().unwrap().model(), "subitem");
    assert_eq!(query.round_trips().unwrap(), 3);
}

#[test]
fn unselected_override_is_not_fetched() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["name"], PlannerConfig::default())
        .custom_prefetch("positive_items", positive_items(&shop))
        .unwrap()
        .into_query()
        .unwrap();
    assert!(query.prefetches().is_empty());
}

#[test]
fn wildcards_never_reach_an_override() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["*__name"], PlannerConfig::default())
        .custom_prefetch("positive_items", positive_items(&shop))
        .unwrap()
        .into_query()
        .unwrap();
    assert_eq!(lookups(&query), vec!["customers", "items"]);
}

#[test]
fn nested_override_resolves_its_parent_path() {
    let shop = Fixture::shop();
    let named = Prefetch::new("subitems")
        .query(shop.select("subitem").filter(Expr::col("name").eq("x")))
        .to_attr("named_subitems");
    let query = bind(&shop, "order", &["items__named_subitems__name"], PlannerConfig::default())
        .custom_prefetch("items__named_subitems", named)
        .unwrap()
        .into_query()
        .unwrap();

    assert_eq!(lookups(&query), vec!["items", "items__subitems"]);
    let prefetch = &query.prefetches()[1];
    assert_eq!(prefetch.to_attr.as_deref(), Some("named_subitems"));
    assert!(prefetch.query.as_ref().unwrap().where_clause().is_some());
}

#[test]
fn override_without_sub_query_fetches_the_whole_target() {
    let shop = Fixture::shop();
    let query = bind(&shop, "order", &["all_items__name"], PlannerConfig::default())
        .custom_prefetch("all_items", Prefetch::new("items").to_attr("all_items"))
        .unwrap()
        .into_query()
        .unwrap();
    let sub = query.prefetches()[0].query.as_ref().unwrap();
    assert_eq!(sub.model(), "item");
    assert!(sub.where_clause().is_none());
}

#[test]
fn forward_override_keeps_the_parent_foreign_key() {
    let shop = Fixture::shop();
    let named = Prefetch::new("order")
        .query(shop.select("order").filter(Expr::col("name").ne("")))
        .to_attr("named_order");
    let query = bind(&shop, "item", &["name", "named_order__name"], strict())
        .custom_prefetch("named_order", named)
        .unwrap()
        .into_query()
        .unwrap();

    assert!(query.joins().is_empty());
    assert_eq!(lookups(&query), vec!["order"]);
    assert_eq!(
        query.to_sql().unwrap(),
        "SELECT \"item\".\"id\", \"item\".\"name\", \"item\".\"order_id\" FROM \"item\""
    );
}

#[test]
fn custom_sub_query_keeps_its_own_joins() {
    let shop = Fixture::shop();
    let joined = Prefetch::new("items")
        .query(shop.select("item").set_joins(vec!["order".to_string()]))
        .to_attr("joined_items");
    let query = bind(&shop, "order", &["joined_items__name"], PlannerConfig::default())
        .custom_prefetch("joined_items", joined)
        .unwrap()
        .into_query()
        .unwrap();
    let sub = query.prefetches()[0].query.as_ref().unwrap();
    assert_eq!(sub.joins(), ["order"]);
}

#[test]
fn invalid_overrides_are_rejected_at_setup() {
    let shop = Fixture::shop();
    let bound = bind(&shop, "order", &["name"], PlannerConfig::default());
    let cases = [
        ("positive_items", Prefetch::new("items")),
        ("positive_items", Prefetch::new("items").to_attr("other_items")),
        ("positive_items", Prefetch::new("name").to_attr("positive_items")),
        ("positive_items", Prefetch::new("ghost").to_attr("positive_items")),
        ("ghost__positive_items", Prefetch::new("items").to_attr("positive_items")),
        (
            "positive_items",
            Prefetch::new("items")
                .query(shop.select("subitem"))
                .to_attr("positive_items"),
        ),
    ];
    for (path, prefetch) in cases {
        let err = bound.custom_prefetch(path, prefetch).unwrap_err();
        assert!(err.is_extension_configuration(), "{path}: {err}");
    }
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn unknown_extension_name_is_rejected() {
    let shop = Fixture::shop();
    let err = bind(&shop, "order", &["name"], PlannerConfig::default())
        .extend("nope", ExtensionArgs::Paths(Vec::new()))
        .unwrap_err();
    assert!(err.is_extension_configuration());
}

#[test]
fn mismatched_arguments_are_rejected() {
    let shop = Fixture::shop();
    let err = bind(&shop, "order", &["name"], PlannerConfig::default())
        .extend("skip_filter", ExtensionArgs::Prefetches(Vec::new()))
        .unwrap_err();
    assert!(err.is_extension_configuration());
}

#[test]
fn registry_indexes_by_name_and_kind() {
    let mut registry = ExtensionRegistry::<Select>::with_defaults();
    assert_eq!(
        registry.names(),
        vec!["prefetch_filter", "skip_filter", "custom_prefetch"]
    );
    assert_eq!(registry.with_kind(ExtensionKind::Optimizer).count(), 1);
    assert_eq!(
        registry
            .with_name("custom_prefetch")
            .map(|e| e.kind()),
        Some(ExtensionKind::Extraction)
    );

    let err = registry
        .register(Box::new(SkipFilterExtension::default()))
        .unwrap_err();
    assert!(err.is_extension_configuration());

    registry.replace(Box::new(SkipFilterExtension::default()));
    assert_eq!(registry.names().len(), 3);
    assert_eq!(registry.with_kind(ExtensionKind::Optimizer).count(), 1);
}

#[test]
fn empty_registry_disables_extensions() {
    let shop = Fixture::shop();
    let query = aggressivequery::build_optimized_query_with_extensions(
        &shop.extractor,
        shop.select("order"),
        &["items__name"],
        PlannerConfig::default(),
        ExtensionRegistry::new(),
    )
    .unwrap();
    assert!(query.skip_filter(&["items"]).is_err());
    assert_eq!(query.to_query().unwrap().round_trips().unwrap(), 2);
}
