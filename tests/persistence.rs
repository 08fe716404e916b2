//! Re-association of entities with their schemas across registry restarts

use std::sync::Arc;
use std::thread;

use signed_schemas::config::{BackendKind, ReferenceConfig};
use signed_schemas::{
    Capability, FieldDefinition, FieldType, SchemaDefinition, SchemaRegistry, SchemaStoreConfig,
    SignedEntity,
};
use tempfile::tempdir;

fn file_config(dir: &std::path::Path) -> SchemaStoreConfig {
    let mut config = SchemaStoreConfig::default();
    config.store.backend = BackendKind::File;
    config.store.path = dir.join("schemas.json");
    config
}

fn contact() -> SchemaDefinition {
    SchemaDefinition::new()
        .with_field(FieldDefinition::new("email", FieldType::Text).required())
        .with_field(FieldDefinition::new("vip", FieldType::Bool).with_default(false))
}

#[test]
fn entity_resolves_its_schema_after_restart() {
    let dir = tempdir().unwrap();
    let config = file_config(dir.path());

    let saved = {
        let registry = SchemaRegistry::open(&config).unwrap();
        let entity = SignedEntity::in_context(&registry, contact()).unwrap();
        serde_json::to_string(&entity).unwrap()
    };

    let registry = SchemaRegistry::open(&config).unwrap();
    assert!(registry.cache().is_empty());

    let entity: SignedEntity = serde_json::from_str(&saved).unwrap();
    let sig = entity.signature().cloned().unwrap();
    let schema = entity.schema(&registry).unwrap();
    assert_eq!(schema.read().field_names(), vec!["email", "vip"]);
    assert!(entity.provided(&registry).unwrap().contains(&Capability::for_signature(&sig)));
}

#[test]
fn open_preloads_and_resolves_configured_references() {
    let dir = tempdir().unwrap();
    let definition_path = dir.path().join("contact.json");
    std::fs::write(
        &definition_path,
        r#"{"fields":[{"name":"email","type":"text","required":true}]}"#,
    )
    .unwrap();

    let mut config = file_config(dir.path());
    config.cache.preload = true;
    config.references.push(ReferenceConfig {
        name: "app.schemas.Contact".to_string(),
        path: definition_path,
    });

    {
        let registry = SchemaRegistry::open(&config).unwrap();
        registry.add(contact()).unwrap();
        let mut entity = SignedEntity::new();
        entity
            .sign(&registry, SchemaDefinition::named("app.schemas.Contact"), true)
            .unwrap();
    }

    let registry = SchemaRegistry::open(&config).unwrap();
    assert_eq!(registry.cache_stats().entries, 3);
    assert!(registry.contains("app.schemas.Contact").unwrap());
}

#[test]
fn invalid_reference_name_in_config_is_rejected() {
    let dir = tempdir().unwrap();
    let mut config = file_config(dir.path());
    config.references.push(ReferenceConfig {
        name: "NotDotted".to_string(),
        path: dir.path().join("missing.json"),
    });
    assert!(SchemaRegistry::open(&config).is_err());
}

#[test]
fn shared_registry_hands_out_one_object_per_signature() {
    let registry = Arc::new(SchemaRegistry::open(&SchemaStoreConfig::in_memory()).unwrap());
    let sig = registry.add(contact()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let sig = sig.clone();
            thread::spawn(move || registry.materialize(sig.as_str()).unwrap())
        })
        .collect();
    let objects: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(objects.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn archive_files_round_trip_and_evict_stale_objects() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("schemas.jsonl");

    let source = SchemaRegistry::open(&file_config(dir.path())).unwrap();
    let sig = source.add(contact()).unwrap();
    assert_eq!(source.dump_to_path(&archive).unwrap(), 2);

    let target = SchemaRegistry::open(&SchemaStoreConfig::in_memory()).unwrap();
    let placeholder = target.materialize_or_placeholder(sig.as_str()).unwrap();
    assert!(placeholder.read().is_empty());

    assert_eq!(target.restore_from_path(&archive).unwrap(), 1);
    let restored = target.materialize(sig.as_str()).unwrap();
    assert_eq!(restored.read().field_names(), vec!["email", "vip"]);

    // a broken tail still evicts the entries written before it
    std::fs::write(
        &archive,
        format!(
            "{{\"signature\":\"{}\",\"blob\":\"{{\\\"fields\\\":[]}}\"}}\nnot json\n",
            sig
        ),
    )
    .unwrap();
    assert!(target.restore_from_path(&archive).is_err());
    let reloaded = target.materialize(sig.as_str()).unwrap();
    assert!(!Arc::ptr_eq(&restored, &reloaded));
    assert!(reloaded.read().is_empty());
}
