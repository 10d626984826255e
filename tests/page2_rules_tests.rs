use a3ocr_to_fields::{match_page2_field, FieldDef};

fn field(name: &str) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        rect: [0.0, 0.0, 100.0, 100.0],
        field_type: "text".to_string(),
        multiline: true,
        fontsize: 10.0,
    }
}

fn page2_catalog() -> Vec<FieldDef> {
    let mut fields = Vec::new();
    for category in ["money", "business", "leisure", "health", "family"] {
        for stage in ["goals", "now", "todo"] {
            fields.push(field(&format!("{}_{}", category, stage)));
        }
    }
    fields
}

#[test]
fn manual_position_table_matches_exact_location() {
    let fields = page2_catalog();
    let m = match_page2_field("GOALS - save for deposit", "second row left", &fields);
    assert_eq!(m.as_deref(), Some("money_goals"));
}

#[test]
fn manual_position_table_covers_all_rows() {
    let fields = page2_catalog();
    assert_eq!(
        match_page2_field("x", "third row right", &fields).as_deref(),
        Some("family_now")
    );
    assert_eq!(
        match_page2_field("x", "fourth row center", &fields).as_deref(),
        Some("leisure_todo")
    );
}

#[test]
fn manual_position_table_tolerates_missing_hyphen() {
    let fields = page2_catalog();
    assert_eq!(
        match_page2_field("x", "third row center-right", &fields).as_deref(),
        Some("health_now")
    );
    assert_eq!(
        match_page2_field("x", "third row center right", &fields).as_deref(),
        Some("health_now")
    );
}

#[test]
fn compound_column_keys_win_over_plain_center() {
    let fields = page2_catalog();
    assert_eq!(
        match_page2_field("x", "fourth row center left", &fields).as_deref(),
        Some("business_todo")
    );
}

#[test]
fn position_table_beats_content_inference() {
    let fields = page2_catalog();
    // content says family, location table says money
    let m = match_page2_field("spend time with family", "second row left", &fields);
    assert_eq!(m.as_deref(), Some("money_goals"));
}

#[test]
fn category_and_stage_inferred_from_content() {
    let fields = page2_catalog();
    let m = match_page2_field("Goal: save $50,000 for house deposit", "somewhere", &fields);
    assert_eq!(m.as_deref(), Some("money_goals"));
}

#[test]
fn stage_falls_back_to_vertical_position_words() {
    let fields = page2_catalog();
    let m = match_page2_field("Save $500 every month", "bottom left area", &fields);
    assert_eq!(m.as_deref(), Some("money_todo"));
}

#[test]
fn inferred_name_must_exist_in_catalog() {
    let fields = vec![field("money_goals")];
    let m = match_page2_field("Gym membership for fitness", "middle", &fields);
    // health_now is not defined here, so the rule chain yields nothing
    assert_eq!(m, None);
}

#[test]
fn column_position_fallback_composes_from_location_only() {
    let fields = page2_catalog();
    let m = match_page2_field("mystery scribble", "center right middle", &fields);
    assert_eq!(m.as_deref(), Some("health_now"));
}

#[test]
fn column_position_fallback_is_validated_against_catalog() {
    // The composed name is only returned when the catalog defines it; an
    // unknown composition falls through to the caller's generic fallback.
    let fields = vec![field("money_goals")];
    let m = match_page2_field("mystery scribble", "center right middle", &fields);
    assert_eq!(m, None);
}
