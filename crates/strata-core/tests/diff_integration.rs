//! Integration tests for inference, diffing and DDL generation.
//!
//! These tests evolve a content model through several versions, diff each
//! version against the previous one and verify the resulting plans and the
//! SQL every dialect generates for them.

use strata_core::config::{BrickConfig, CollectionConfig, FieldConfig};
use strata_core::dialect::{DialectAdapter, MysqlAdapter, PostgresAdapter, SqliteAdapter};
use strata_core::diff::diff_schemas;
use strata_core::fields::FieldRegistry;
use strata_core::infer::infer_schema;
use strata_core::plan::TableOperation;
use strata_core::schema::CollectionSchema;
use strata_core::state::apply_executable;

// =============================================================================
// Content model versions
// =============================================================================

fn article_v1() -> CollectionConfig {
    CollectionConfig::new("article")
        .field(FieldConfig::new("title", "text").required())
        .field(FieldConfig::new("published", "checkbox"))
}

/// Adds a field and a brick with a nested repeater.
fn article_v2() -> CollectionConfig {
    article_v1()
        .field(FieldConfig::new("summary", "textarea"))
        .brick(
            BrickConfig::new("gallery").field(FieldConfig::repeater(
                "images",
                vec![
                    FieldConfig::new("image", "media"),
                    FieldConfig::repeater("credits", vec![FieldConfig::new("author", "user")]),
                ],
            )),
        )
}

/// Drops `summary` and changes `title` to be unique.
fn article_v3() -> CollectionConfig {
    let mut config = article_v2();
    config.fields.retain(|f| f.key != "summary");
    config.fields[0].unique = true;
    config
}

fn adapters() -> Vec<Box<dyn DialectAdapter>> {
    vec![
        Box::new(SqliteAdapter::new()),
        Box::new(PostgresAdapter::new()),
        Box::new(MysqlAdapter::new()),
    ]
}

fn infer(config: &CollectionConfig, adapter: &dyn DialectAdapter) -> CollectionSchema {
    infer_schema(config, adapter, &FieldRegistry::default()).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_initial_migration_creates_all_tables() {
    for adapter in adapters() {
        let target = infer(&article_v1(), adapter.as_ref());
        let diff = diff_schemas(&target, &CollectionSchema::new("article"));

        assert_eq!(diff.plan.tables.len(), 3, "{}", adapter.name());
        for op in &diff.plan.tables {
            let sql = adapter.generate_sql(op);
            assert_eq!(sql.len(), 1);
            assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS"), "{}", sql[0]);
        }
    }
}

#[test]
fn test_v1_to_v2_is_additive() {
    for adapter in adapters() {
        let v1 = infer(&article_v1(), adapter.as_ref());
        let v2 = infer(&article_v2(), adapter.as_ref());
        let diff = diff_schemas(&v2, &v1);

        let created: Vec<&str> = diff.plan.created_tables().collect();
        assert_eq!(
            created,
            vec![
                "strata__document__article__gallery",
                "strata__document__article__gallery__images",
                "strata__document__article__gallery__images__credits",
            ]
        );
        assert_eq!(diff.plan.added_column_count(), 1);
        assert!(diff.inactive_tables.is_empty());
        assert!(diff
            .plan
            .tables
            .iter()
            .all(|op| !matches!(op, TableOperation::ModifyColumns { .. })));

        let add_sql: Vec<String> = diff
            .plan
            .tables
            .iter()
            .filter(|op| matches!(op, TableOperation::AddColumns { .. }))
            .flat_map(|op| adapter.generate_sql(op))
            .collect();
        assert_eq!(add_sql.len(), 1);
        assert!(add_sql[0].contains("ADD COLUMN"));
        assert!(add_sql[0].contains("_summary"));
    }
}

#[test]
fn test_v2_to_v3_reports_without_dropping() {
    let adapter = PostgresAdapter::new();
    let v2 = infer(&article_v2(), &adapter);
    let v3 = infer(&article_v3(), &adapter);
    let diff = diff_schemas(&v3, &v2);

    assert_eq!(diff.inactive_columns.len(), 1);
    assert_eq!(diff.inactive_columns[0].column, "_summary");
    assert_eq!(diff.plan.tables.len(), 1);

    let TableOperation::ModifyColumns { table, changes } = &diff.plan.tables[0] else {
        panic!("expected ModifyColumns, got {:?}", diff.plan.tables[0]);
    };
    assert_eq!(table, "strata__document__article__fields");
    assert_eq!(changes[0].column, "_title");
    assert_eq!(changes[0].attributes(), vec!["unique"]);

    // Nothing in the plan is executable.
    assert!(!diff.plan.has_executable());
    for op in &diff.plan.tables {
        assert!(adapter.generate_sql(op).is_empty());
    }
}

#[test]
fn test_repeated_migration_is_idempotent() {
    for adapter in adapters() {
        let target = infer(&article_v2(), adapter.as_ref());
        let mut live = CollectionSchema::new("article");

        let first = diff_schemas(&target, &live);
        live = apply_executable(&live, &first.plan).unwrap();
        let second = diff_schemas(&target, &live);

        assert!(second.plan.is_empty(), "{}: {:?}", adapter.name(), second.plan);
    }
}

#[test]
fn test_nested_repeater_sql_references_parents() {
    let adapter = SqliteAdapter::new();
    let target = infer(&article_v2(), &adapter);
    let credits = target
        .table("strata__document__article__gallery__images__credits")
        .unwrap();
    let sql = adapter.create_table(credits);

    assert!(sql.contains(
        "\"brick_id\" INTEGER NOT NULL REFERENCES \"strata__document__article__gallery\" (\"id\") ON DELETE CASCADE"
    ));
    assert!(sql.contains(
        "\"parent_id\" INTEGER REFERENCES \"strata__document__article__gallery__images\" (\"id\") ON DELETE CASCADE"
    ));
    assert!(sql.contains(
        "\"_author\" INTEGER REFERENCES \"strata__users\" (\"id\") ON DELETE SET NULL"
    ));
}
