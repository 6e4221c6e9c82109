//! Integration tests for wizard construction, query callbacks, terminal
//! operations and configuration.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use parking_lot::Mutex;
use scout_wizard::manifest::Manifest;
use scout_wizard::{
    ModelSchema, ParameterNames, RelationalQuery, RequestSnapshot, Schema, ScopeFilter,
    ScoutQueryHandler, ScoutQueryWizard, Searchable, WizardConfig, WizardError,
};
use scout_wizard_test_utils::{TestBackend, ids, names, test_row};

fn wizard(backend: &TestBackend, query: &str) -> ScoutQueryWizard {
    let request = RequestSnapshot::from_query_str(query, &WizardConfig::default());
    let search = backend.search("TestModel").expect("failed to start search");
    ScoutQueryWizard::for_subject(search, request).expect("failed to create wizard")
}

// -------------------------------------------------------------------------
// Subjects
// -------------------------------------------------------------------------

/// Test that a relational query is not accepted as a subject.
#[test]
fn rejects_a_relational_query_subject() {
    let backend = TestBackend::new();
    let model = backend.schema.model("TestModel").unwrap();
    let query = RelationalQuery::new(backend.schema.clone(), model);

    let Err(err) = ScoutQueryWizard::for_subject(query, RequestSnapshot::new()) else {
        panic!("expected an invalid subject error");
    };

    assert!(matches!(err, WizardError::InvalidSubject(_)));
    assert!(err.to_string().contains("relational query"));
}

/// Test that a model without a table is not accepted as a subject.
#[test]
fn rejects_a_model_without_a_table() {
    let backend = TestBackend::new();
    let schema = Arc::new(Schema::new().with_model(ModelSchema::new("Tableless", "")));
    let searchable = Searchable::new(
        schema,
        "Tableless",
        backend.engine.clone(),
        backend.store.clone(),
    )
    .unwrap();

    let result = ScoutQueryWizard::for_subject(searchable.search(""), RequestSnapshot::new());

    assert!(matches!(result, Err(WizardError::InvalidSubject(_))));
}

// -------------------------------------------------------------------------
// Handling
// -------------------------------------------------------------------------

/// Test that handling a request twice applies it once.
#[test]
fn handles_a_request_once() {
    let backend = TestBackend::seeded();
    let request = RequestSnapshot::new().with_sort("-name");
    let mut handler = ScoutQueryHandler::new(
        backend.search("TestModel").unwrap(),
        request,
        WizardConfig::default(),
    )
    .unwrap();
    handler.allow_list_mut().set_allowed_sorts(["name"]);

    handler.handle().unwrap();
    handler.handle().unwrap();

    assert_eq!(handler.subject().orders().len(), 1);
}

/// Test that refinements run once per executed query.
#[test]
fn runs_refinements_once_per_execution() {
    let backend = TestBackend::seeded();
    let calls = Arc::new(Mutex::new(0_usize));
    let counter = calls.clone();

    let query = wizard(&backend, "include=relatedModels")
        .set_allowed_includes(["relatedModels"])
        .query(move |_query| {
            *counter.lock() += 1;
            Ok(())
        })
        .build()
        .unwrap();

    query.get().unwrap();
    query.get().unwrap();

    assert_eq!(*calls.lock(), 2);
    assert_eq!(backend.store.queries().len(), 2);
    assert_eq!(backend.store.last_query().unwrap().eager_loads().len(), 1);
}

/// Test constraining the hydration query with a callback.
#[test]
fn constrains_the_query_with_a_callback() {
    let backend = TestBackend::seeded();

    let records = wizard(&backend, "")
        .query(|query| {
            let column = query.qualify_column("name");
            query.where_eq(column, "Alice");
            Ok(())
        })
        .build()
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(names(&records), ["Alice"]);
}

/// Test that a hook set on the search before the wizard still runs.
#[test]
fn keeps_an_existing_search_hook() {
    let backend = TestBackend::seeded();
    let mut search = backend.search("TestModel").unwrap();
    search.query(|query| {
        let column = query.qualify_column("is_visible");
        query.where_eq(column, true);
        Ok(())
    });
    let request = RequestSnapshot::from_query_str("filter[named]=Carol", &WizardConfig::default());

    let hidden = ScoutQueryWizard::for_subject(search.clone(), request)
        .unwrap()
        .set_allowed_filters([ScopeFilter::new("named")])
        .build()
        .unwrap()
        .get()
        .unwrap();
    assert!(hidden.is_empty());

    let request = RequestSnapshot::from_query_str("filter[named]=Bob", &WizardConfig::default());
    let visible = ScoutQueryWizard::for_subject(search, request)
        .unwrap()
        .set_allowed_filters([ScopeFilter::new("named")])
        .build()
        .unwrap()
        .get()
        .unwrap();
    assert_eq!(names(&visible), ["Bob"]);
}

/// Test that the refined query can be inspected without running it.
#[test]
fn exposes_the_refined_query() {
    let backend = TestBackend::seeded();

    let query = wizard(&backend, "fields[test_models]=id&include=relatedModelsCount")
        .set_allowed_fields(["id"])
        .set_allowed_includes(["relatedModels"])
        .build()
        .unwrap();

    let refined = query.refined_query().unwrap();
    assert_eq!(refined.columns(), ["test_models.id"]);
    assert_eq!(refined.counts(), ["relatedModels"]);
    assert!(backend.store.queries().is_empty());
}

// -------------------------------------------------------------------------
// Terminal operations
// -------------------------------------------------------------------------

/// Test a length-aware page.
#[test]
fn paginates_results() {
    let backend = TestBackend::seeded();

    let page = wizard(&backend, "sort=id")
        .set_allowed_sorts(["id"])
        .build()
        .unwrap()
        .paginate(2, 2)
        .unwrap();

    assert_eq!(ids(page.items()), [3, 4]);
    assert_eq!(page.total(), Some(5));
    assert_eq!(page.last_page(), Some(3));
    assert!(page.has_more_pages());
}

/// Test a simple page.
#[test]
fn simple_paginates_results() {
    let backend = TestBackend::seeded();

    let page = wizard(&backend, "sort=id")
        .set_allowed_sorts(["id"])
        .build()
        .unwrap()
        .simple_paginate(2, 3)
        .unwrap();

    assert_eq!(ids(page.items()), [5]);
    assert!(!page.has_more_pages());
}

/// Test that the built search can still be changed.
#[test]
fn forwards_to_the_search_after_building() {
    let backend = TestBackend::seeded();
    trash_another_row(&backend);

    let search = ScoutQueryWizard::for_subject(
        backend.search("SoftDeleteModel").unwrap(),
        RequestSnapshot::new(),
    )
    .unwrap()
    .build()
    .unwrap()
    .into_search();
    assert_eq!(search.get().unwrap().len(), 2);

    let mut search = search;
    search.with_trashed();
    assert_eq!(search.get().unwrap().len(), 4);
}

fn trash_another_row(backend: &TestBackend) {
    backend.db.insert(
        "soft_delete_models",
        test_row(4)
            .with_name("trashed-4")
            .trashed("2024-07-01"),
    );
}

// -------------------------------------------------------------------------
// Configuration
// -------------------------------------------------------------------------

/// Test custom parameter names, separator, and count suffix.
#[test]
fn reads_configured_parameter_names() {
    let backend = TestBackend::seeded();
    let config = WizardConfig {
        count_suffix: "Total".to_string(),
        parameters: ParameterNames {
            filter: "where".to_string(),
            include: "with".to_string(),
            ..ParameterNames::default()
        },
        array_separator: '|',
        ..WizardConfig::default()
    };
    let request = RequestSnapshot::from_query_str("where[id]=1|3&with=relatedModelsTotal", &config);

    let records = ScoutQueryWizard::with_config(backend.search("TestModel").unwrap(), request, config)
        .unwrap()
        .set_allowed_filters(["id"])
        .set_allowed_includes(["relatedModels"])
        .build()
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(ids(&records), [1, 3]);
    assert_eq!(records[0].get("related_models_count"), Some(&serde_json::json!(2)));
}

/// Test that a default-named parameter is ignored under custom names.
#[test]
fn ignores_default_parameter_names_when_renamed() {
    let config = WizardConfig {
        parameters: ParameterNames {
            filter: "where".to_string(),
            ..ParameterNames::default()
        },
        ..WizardConfig::default()
    };

    let request = RequestSnapshot::from_query_str("filter[id]=1", &config);

    assert!(request.filters().is_empty());
}

/// Test that an absurdly nested filter key is dropped from the request.
#[test]
fn drops_over_nested_request_parameters() {
    let query = format!("filter[id]=1&filter{}=x", "[deep]".repeat(50_000));

    let request = RequestSnapshot::from_query_str(&query, &WizardConfig::default());

    assert_eq!(request.filters().len(), 1);
    assert!(request.filters().contains_key("id"));
}

/// Test configuring a wizard from a manifest.
#[test]
fn configures_a_wizard_from_a_manifest() {
    let backend = TestBackend::seeded();
    let manifest = Manifest::from_toml_str(
        r#"
        model = "TestModel"

        [[models]]
        name = "TestModel"
        table = "test_models"

        [allow]
        filters = ["is_visible"]
        scope_filters = ["named"]
        sorts = ["name"]

        [defaults]
        sorts = ["-name"]

        [defaults.filters]
        is_visible = true
        "#,
    )
    .unwrap();

    let query = manifest.configure(wizard(&backend, "")).build().unwrap();
    assert_eq!(names(&query.get().unwrap()), ["John Testing Doe", "Dave", "Bob"]);

    let Err(err) = manifest.configure(wizard(&backend, "sort=id")).build() else {
        panic!("expected an invalid sort error");
    };
    assert_eq!(err.allowed(), ["name"]);
}
