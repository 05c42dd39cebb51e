//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use gateway_deps::domain::{Assertion, Entity, EntityHeader, EntityType, POLICY_TYPE_PROPERTY};
use gateway_deps::store::EntitySnapshot;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Run the gwdeps binary in the specified directory
pub fn run_gwdeps_in_dir(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gwdeps"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute gwdeps binary")
}

/// Stdout of a run that must have succeeded
pub fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "gwdeps failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Shorthand for a header
pub fn header(entity_type: EntityType, id: &str) -> EntityHeader {
    EntityHeader::new(entity_type, id)
}

/// A small gateway:
///
/// ```text
/// service orders (folder apps, zone dmz) -> policy auth
/// policy auth (folder root) -> assertion -> jdbc-connection db
/// jdbc-connection db (folder root)
/// folder apps (folder root)
/// policy p1 <-> policy p2
/// service billing -> private policy billing-policy -> jdbc-connection db
/// ```
pub fn sample_entities() -> Vec<Entity> {
    vec![
        Entity::new(EntityType::SecurityZone, "dmz").with_name("DMZ"),
        Entity::new(EntityType::Folder, "root").with_name("Root"),
        Entity::new(EntityType::Folder, "apps")
            .with_name("Apps")
            .in_folder("root"),
        Entity::new(EntityType::JdbcConnection, "db")
            .with_name("Orders DB")
            .in_folder("root"),
        Entity::new(EntityType::Policy, "auth")
            .with_name("Auth")
            .in_folder("root")
            .with_assertion(
                Assertion::new("JdbcQuery").with_reference(header(EntityType::JdbcConnection, "db")),
            ),
        Entity::new(EntityType::Service, "orders")
            .with_name("Orders")
            .in_folder("apps")
            .in_zone("dmz")
            .with_reference(header(EntityType::Policy, "auth")),
        Entity::new(EntityType::Policy, "p1")
            .in_folder("root")
            .with_reference(header(EntityType::Policy, "p2")),
        Entity::new(EntityType::Policy, "p2")
            .in_folder("root")
            .with_reference(header(EntityType::Policy, "p1")),
        Entity::new(EntityType::Service, "billing")
            .in_folder("apps")
            .with_reference(header(EntityType::Policy, "billing-policy")),
        Entity::new(EntityType::Policy, "billing-policy")
            .with_property(POLICY_TYPE_PROPERTY, "private-service")
            .with_reference(header(EntityType::JdbcConnection, "db")),
    ]
}

/// Write the sample gateway to `entities.yaml` in `dir`
pub fn write_sample_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("entities.yaml");
    EntitySnapshot {
        entities: sample_entities(),
    }
    .save(&path)
    .expect("Failed to write snapshot");
    path
}
