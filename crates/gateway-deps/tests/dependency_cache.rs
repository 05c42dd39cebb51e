//! Integration tests for the dependency cache kept current from entity events.

use gateway_deps::app::App;
use gateway_deps::config::{DEPENDENCY_CACHE_ENABLED_PROPERTY, GatewayDepsConfig};
use gateway_deps::domain::{
    Assertion, Entity, EntityHeader, EntityType, POLICY_TYPE_PROPERTY, SearchDepth,
    SearchOptions,
};
use gateway_deps::error::Error;
use gateway_deps::events::{EntityOperation, GatewayEvent, InvalidationEvent};
use gateway_deps::store::InMemoryEntityStore;
use rstest::{fixture, rstest};
use std::time::Duration;

mod common;
use common::{header, sample_entities};

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Fixtures
// ============================================================================

fn config() -> GatewayDepsConfig {
    let mut config = GatewayDepsConfig::default();
    config.dependency_cache.event_poll_interval_ms = 10;
    config
}

fn warm_app(entities: Vec<Entity>) -> App {
    let app = App::new(config(), InMemoryEntityStore::from_entities(entities));
    app.warm_cache().expect("cache should build");
    app
}

/// The sample gateway with a built cache
#[fixture]
fn app() -> App {
    warm_app(sample_entities())
}

fn usage_ids(app: &App, header: &EntityHeader) -> Vec<String> {
    let mut ids: Vec<String> = app
        .cache()
        .find_usages(header)
        .expect("usages should resolve")
        .dependencies()
        .expect("usages are always explored")
        .map(|user| user.dependent().internal_id.clone())
        .collect();
    ids.sort();
    ids
}

fn settle(app: &App) {
    assert!(app.cache().wait_until_idle(WAIT), "cache did not catch up with events");
}

// ============================================================================
// Usages
// ============================================================================

#[test]
fn test_usages_follow_deletes_end_to_end() {
    let app = warm_app(vec![
        Entity::new(EntityType::Service, "x").with_reference(header(EntityType::Policy, "p")),
        Entity::new(EntityType::Policy, "p").with_reference(header(EntityType::JdbcConnection, "c")),
        Entity::new(EntityType::JdbcConnection, "c"),
    ]);
    let connection = header(EntityType::JdbcConnection, "c");

    assert_eq!(usage_ids(&app, &connection), vec!["p"]);
    assert_eq!(usage_ids(&app, &header(EntityType::Policy, "p")), vec!["x"]);

    app.store().delete(&connection).unwrap();
    settle(&app);

    assert!(matches!(
        app.cache().find_usages(&connection),
        Err(Error::EntityNotFound(_))
    ));
    assert_eq!(app.cache().cached_len().unwrap(), 2);
}

#[rstest]
fn test_usages_cover_every_cached_user(app: App) {
    assert_eq!(
        usage_ids(&app, &header(EntityType::JdbcConnection, "db")),
        vec!["auth", "billing-policy"]
    );
    assert_eq!(usage_ids(&app, &header(EntityType::Folder, "root")).len(), 5);
    assert!(usage_ids(&app, &header(EntityType::Service, "orders")).is_empty());
}

#[rstest]
fn test_usages_result_is_one_level(app: App) {
    let usages = app
        .cache()
        .find_usages(&header(EntityType::Policy, "auth"))
        .unwrap();
    assert_eq!(usages.options().depth, SearchDepth::Levels(1));
    for user in usages.dependencies().unwrap() {
        assert!(user.dependencies().is_none());
    }
}

// ============================================================================
// Cached Queries
// ============================================================================

#[rstest]
#[case::unbounded(SearchOptions::default())]
#[case::roots_only(SearchOptions::with_depth(SearchDepth::Levels(0)))]
#[case::one_level(SearchOptions::with_depth(SearchDepth::Levels(1)))]
#[case::two_levels(SearchOptions::with_depth(SearchDepth::Levels(2)))]
#[case::policies_and_folders(SearchOptions::default().only_types([EntityType::Policy, EntityType::Folder]))]
#[case::connections(SearchOptions::default().only_types([EntityType::JdbcConnection]))]
fn test_cached_results_match_live_discovery(app: App, #[case] options: SearchOptions) {
    let roots = [
        header(EntityType::Service, "orders"),
        header(EntityType::Service, "billing"),
        header(EntityType::Policy, "p1"),
    ];
    let cached = app.cache().get_dependencies(&roots, &options).unwrap();
    let live = app.finder().get_dependencies(&roots, &options).unwrap();
    assert_eq!(cached, live);

    let cached_all = app.cache().get_dependencies(&[], &options).unwrap();
    let live_all = app.finder().get_dependencies(&[], &options).unwrap();
    assert_eq!(cached_all, live_all);
}

#[rstest]
fn test_cached_query_for_unknown_entity_fails(app: App) {
    let err = app
        .cache()
        .get_dependencies(&[header(EntityType::Service, "gone")], &SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::EntityNotFound(_)));
}

// ============================================================================
// Events
// ============================================================================

#[rstest]
fn test_update_moves_usages(app: App) {
    app.store()
        .save(Entity::new(EntityType::Policy, "auth").with_name("Auth").in_folder("root"))
        .unwrap();
    settle(&app);

    assert_eq!(
        usage_ids(&app, &header(EntityType::JdbcConnection, "db")),
        vec!["billing-policy"]
    );

    let options = SearchOptions::default();
    let roots = [header(EntityType::Service, "orders")];
    assert_eq!(
        app.cache().get_dependencies(&roots, &options).unwrap(),
        app.finder().get_dependencies(&roots, &options).unwrap()
    );
}

#[rstest]
fn test_created_entity_joins_usages(app: App) {
    app.store()
        .save(
            Entity::new(EntityType::Service, "search")
                .in_folder("apps")
                .with_reference(header(EntityType::Policy, "auth")),
        )
        .unwrap();
    settle(&app);

    assert_eq!(
        usage_ids(&app, &header(EntityType::Policy, "auth")),
        vec!["orders", "search"]
    );
}

#[rstest]
fn test_private_policy_change_refreshes_owning_service(app: App) {
    app.store()
        .save(
            Entity::new(EntityType::Policy, "billing-policy")
                .with_property(POLICY_TYPE_PROPERTY, "private-service"),
        )
        .unwrap();
    settle(&app);

    assert_eq!(
        usage_ids(&app, &header(EntityType::Policy, "billing-policy")),
        vec!["billing"]
    );
    assert_eq!(
        usage_ids(&app, &header(EntityType::JdbcConnection, "db")),
        vec!["auth"]
    );
}

#[rstest]
fn test_private_policy_change_matches_live_discovery(app: App) {
    app.store()
        .save(Entity::new(EntityType::Resource, "r").in_folder("root"))
        .unwrap();
    app.store()
        .save(
            Entity::new(EntityType::Policy, "billing-policy")
                .with_property(POLICY_TYPE_PROPERTY, "private-service")
                .with_reference(header(EntityType::Resource, "r")),
        )
        .unwrap();
    settle(&app);

    let options = SearchOptions::default();
    for root in [
        header(EntityType::Service, "billing"),
        header(EntityType::Policy, "billing-policy"),
    ] {
        let roots = [root];
        assert_eq!(
            app.cache().get_dependencies(&roots, &options).unwrap(),
            app.finder().get_dependencies(&roots, &options).unwrap()
        );
    }
    assert_eq!(
        usage_ids(&app, &header(EntityType::Resource, "r")),
        vec!["billing-policy"]
    );
}

#[rstest]
fn test_renamed_entity_keeps_one_cache_entry(app: App) {
    let before = app.cache().cached_len().unwrap();
    app.store()
        .save(
            Entity::new(EntityType::Policy, "auth")
                .with_name("Authentication")
                .in_folder("root")
                .with_assertion(
                    Assertion::new("JdbcQuery")
                        .with_reference(header(EntityType::JdbcConnection, "db")),
                ),
        )
        .unwrap();
    settle(&app);

    assert_eq!(app.cache().cached_len().unwrap(), before);
    assert_eq!(usage_ids(&app, &header(EntityType::Policy, "auth")), vec!["orders"]);

    let users = app
        .cache()
        .find_usages(&header(EntityType::JdbcConnection, "db"))
        .unwrap();
    let auth = users
        .dependencies()
        .unwrap()
        .find(|user| user.dependent().internal_id == "auth")
        .expect("renamed policy still uses the connection");
    assert_eq!(auth.dependent().name.as_deref(), Some("Authentication"));
}

#[rstest]
fn test_ignored_types_do_not_enter_the_cache(app: App) {
    let before = app.cache().cached_len().unwrap();
    app.store()
        .save(Entity::new(EntityType::PolicyVersion, "auth-v2").in_folder("root"))
        .unwrap();
    settle(&app);
    assert_eq!(app.cache().cached_len().unwrap(), before);
}

#[rstest]
fn test_invalidation_delete_removes_by_id(app: App) {
    let event = InvalidationEvent::new(
        EntityType::JdbcConnection,
        vec!["db".to_string()],
        vec![EntityOperation::Delete],
    )
    .unwrap();
    app.bus().publish(&GatewayEvent::Invalidation(event));
    settle(&app);

    assert!(usage_ids(&app, &header(EntityType::JdbcConnection, "db")).is_empty());
}

#[rstest]
fn test_invalidation_update_refreshes_from_store(app: App) {
    let invalidate = |operation| {
        let event =
            InvalidationEvent::new(EntityType::Policy, vec!["p2".to_string()], vec![operation])
                .unwrap();
        app.bus().publish(&GatewayEvent::Invalidation(event));
        settle(&app);
    };

    invalidate(EntityOperation::Delete);
    assert!(usage_ids(&app, &header(EntityType::Policy, "p1")).is_empty());

    invalidate(EntityOperation::Update);
    assert_eq!(usage_ids(&app, &header(EntityType::Policy, "p1")), vec!["p2"]);
}

// ============================================================================
// Enable / Disable
// ============================================================================

#[rstest]
fn test_disabled_cache_falls_back_to_live_discovery(app: App) {
    app.properties().set(DEPENDENCY_CACHE_ENABLED_PROPERTY, "false");
    assert!(!app.cache().is_enabled());
    assert!(matches!(
        app.cache().find_usages(&header(EntityType::Policy, "auth")),
        Err(Error::CacheNotEnabled)
    ));

    let roots = [header(EntityType::Service, "orders")];
    let options = SearchOptions::default();
    assert_eq!(
        app.cache().get_dependencies(&roots, &options).unwrap(),
        app.finder().get_dependencies(&roots, &options).unwrap()
    );
}

#[rstest]
fn test_reenabling_rebuilds_from_current_state(app: App) {
    app.properties().set(DEPENDENCY_CACHE_ENABLED_PROPERTY, "false");
    app.store().delete(&header(EntityType::Service, "orders")).unwrap();

    app.properties().set(DEPENDENCY_CACHE_ENABLED_PROPERTY, "true");
    app.cache().wait_for_build().unwrap();
    assert!(app.cache().is_enabled());
    assert!(usage_ids(&app, &header(EntityType::Policy, "auth")).is_empty());
}
