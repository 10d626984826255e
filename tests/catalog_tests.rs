use std::fs;

use a3ocr_to_fields::{load_catalog, validate_catalog, Catalog, CatalogError, FieldDef, Page};

fn field(name: &str) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        rect: [0.0, 0.0, 100.0, 100.0],
        field_type: "text".to_string(),
        multiline: true,
        fontsize: 10.0,
    }
}

#[test]
fn load_catalog_reads_pages_and_defaults() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("field_positions.json");
    fs::write(
        &path,
        r#"{
  "_metadata": {"template": "A3 Goals blank", "defined_on": [842, 1191]},
  "page_1": [
    {"name": "dangers_to_eliminate", "rect": [50, 200, 280, 300], "type": "text", "multiline": true, "fontsize": 9},
    {"name": "additional_notes", "rect": [320, 500, 550, 600]}
  ],
  "page_2": [
    {"name": "money_goals", "rect": [50, 150, 160, 250], "type": "text", "multiline": true}
  ]
}"#,
    )
    .unwrap();

    let catalog = load_catalog(&path).expect("valid catalog");
    assert_eq!(catalog.page_1.len(), 2);
    assert_eq!(catalog.page_2.len(), 1);
    assert_eq!(catalog.fields(Page::Page1)[0].name, "dangers_to_eliminate");
    assert_eq!(catalog.fields(Page::Page1)[0].fontsize, 9.0);
    // defaults fill in omitted populator attributes
    let notes = &catalog.fields(Page::Page1)[1];
    assert_eq!(notes.field_type, "text");
    assert!(!notes.multiline);
    assert_eq!(notes.fontsize, 10.0);
}

#[test]
fn load_catalog_rejects_malformed_json() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("field_positions.json");
    fs::write(&path, "{not json").unwrap();

    let err = load_catalog(&path).unwrap_err();
    assert!(matches!(err, CatalogError::Parse(_)));
}

#[test]
fn validate_catalog_rejects_duplicate_names_within_page() {
    let catalog = Catalog {
        page_1: vec![field("dangers_to_eliminate"), field("dangers_to_eliminate")],
        page_2: vec![],
    };
    let err = validate_catalog(&catalog).unwrap_err();
    match err {
        CatalogError::Duplicate { page, name } => {
            assert_eq!(page, "page_1");
            assert_eq!(name, "dangers_to_eliminate");
        }
        other => panic!("expected Duplicate, got {other:?}"),
    }
}

#[test]
fn validate_catalog_allows_same_name_across_pages() {
    let catalog = Catalog {
        page_1: vec![field("notes")],
        page_2: vec![field("notes")],
    };
    validate_catalog(&catalog).expect("cross-page reuse is fine");
}

#[test]
fn validate_catalog_rejects_fully_empty_catalog() {
    let err = validate_catalog(&Catalog::default()).unwrap_err();
    assert!(matches!(err, CatalogError::Empty));
}
