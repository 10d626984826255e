use a3ocr_to_fields::{filter_fragments, PageFragments, TextFragment};

fn frag(text: &str, location: &str) -> TextFragment {
    TextFragment {
        text: text.to_string(),
        location: location.to_string(),
        confidence: None,
    }
}

fn page(page_number: u32, sections: Vec<TextFragment>) -> PageFragments {
    PageFragments { success: true, page_number, sections }
}

#[test]
fn page1_branding_and_headings_are_dropped() {
    let pages = vec![page(
        1,
        vec![
            frag("Dangers to be eliminated", "left upper label"),
            frag(
                "More4Life Financial Services Pty Ltd ABN 68 126 525 737 AFSL No 316809",
                "bottom center",
            ),
            frag("Need to eliminate debt and financial risks", "left circle"),
        ],
    )];
    let (filtered, stats) = filter_fragments(&pages);
    assert_eq!(filtered[0].sections.len(), 1);
    assert_eq!(filtered[0].sections[0].text, "Need to eliminate debt and financial risks");
    assert_eq!(stats.removed_headings, 1);
    assert_eq!(stats.removed_branding, 1);
    assert_eq!(stats.removed_samples.len(), 2);
}

#[test]
fn page2_instructions_and_labels_are_dropped() {
    let pages = vec![page(
        2,
        vec![
            frag(
                "Now it is time to eliminate dangers ...\nPlease turn the page to complete",
                "bottom",
            ),
            frag("money", "top row left"),
            frag("GOALS", "second row left"),
            frag("GOALS - save for deposit", "second row left"),
        ],
    )];
    let (filtered, stats) = filter_fragments(&pages);
    assert_eq!(filtered[0].sections.len(), 1);
    assert_eq!(filtered[0].sections[0].text, "GOALS - save for deposit");
    assert_eq!(stats.removed_instructions, 1);
    assert_eq!(stats.removed_labels, 2);
}

#[test]
fn empty_fragments_pass_through_for_the_engine_to_count() {
    let pages = vec![page(1, vec![frag("   ", "left")])];
    let (filtered, stats) = filter_fragments(&pages);
    assert_eq!(filtered[0].sections.len(), 1);
    assert_eq!(stats.removed_samples.len(), 0);
}

#[test]
fn unknown_pages_only_lose_company_boilerplate() {
    let pages = vec![page(
        3,
        vec![
            frag("Email info@m4lfs.com.au Web www.m4lfs.com.au", "footer"),
            frag("keep this", "somewhere"),
        ],
    )];
    let (filtered, stats) = filter_fragments(&pages);
    assert_eq!(filtered[0].sections.len(), 1);
    assert_eq!(filtered[0].sections[0].text, "keep this");
    assert_eq!(stats.removed_branding, 1);
}

#[test]
fn fragment_order_is_preserved() {
    let pages = vec![page(
        2,
        vec![frag("first", "second row left"), frag("second", "second row left")],
    )];
    let (filtered, _) = filter_fragments(&pages);
    let texts: Vec<&str> = filtered[0].sections.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}
