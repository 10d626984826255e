use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use globwalk::GlobWalkerBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsResult {
    pub ok: bool,
    pub missing: Vec<String>,
}

/// Check CLI dependencies of the upstream rasterizer.
/// - Required: pdftoppm (Poppler, renders scanned pages for the OCR step)
/// - Optional: pdfinfo (page counting)
/// Returns a DepsResult. `ok` is true iff required deps are present.
pub fn check_deps() -> DepsResult {
    let mut missing = Vec::new();

    // required
    let has_pdftoppm = which::which("pdftoppm").is_ok();
    if !has_pdftoppm {
        missing.push("pdftoppm".to_string());
    }

    // optional
    if which::which("pdfinfo").is_err() {
        missing.push("pdfinfo".to_string());
    }

    DepsResult { ok: has_pdftoppm, missing }
}

/// Render apt installation help for missing deps.
pub fn apt_help_for(missing: &[String]) -> String {
    let mut pkgs: Vec<&str> = Vec::new();
    if missing.iter().any(|m| m == "pdftoppm" || m == "pdfinfo") {
        pkgs.push("poppler-utils");
    }

    if pkgs.is_empty() {
        return String::new();
    }

    format!(
        "Dependency missing. Install via apt:\n  sudo apt install {}",
        pkgs.join(" ")
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRoot {
    pub id: String,
    #[serde(default)]
    pub datasources: Option<Vec<JobDatasource>>,
    #[serde(default)]
    pub outputs: Option<JobOutputs>,
    #[serde(default)]
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDatasource {
    pub name: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutputs {
    pub dir: Option<String>,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to read job.yaml: {0}")]
    Read(String),
    #[error("Failed to parse job.yaml: {0}")]
    Parse(String),
    #[error("Invalid job: {0}")]
    Invalid(String),
}

/// Minimal validation for job.yaml: id, input dump glob and output dir must be set.
pub fn validate_job(job_path: &Path) -> Result<JobRoot, JobError> {
    let raw = std::fs::read_to_string(job_path).map_err(|e| JobError::Read(e.to_string()))?;
    let job: JobRoot = serde_yaml::from_str(&raw).map_err(|e| JobError::Parse(e.to_string()))?;

    if job.id.trim().is_empty() {
        return Err(JobError::Invalid("missing id".into()));
    }

    let has_ds_glob = job
        .datasources
        .as_ref()
        .and_then(|ds| ds.first())
        .and_then(|d| d.path.clone())
        .is_some();
    let has_out_dir = job.outputs.as_ref().and_then(|o| o.dir.clone()).is_some();
    if !has_ds_glob || !has_out_dir {
        return Err(JobError::Invalid("missing datasources.path or outputs.dir".into()));
    }

    Ok(job)
}

impl JobRoot {
    pub fn input_glob(&self) -> String {
        self.datasources
            .as_ref()
            .and_then(|d| d.first())
            .and_then(|d| d.path.clone())
            .unwrap_or_else(|| "./input/**/*.json".to_string())
    }
    pub fn output_dir(&self) -> String {
        self.outputs
            .as_ref()
            .and_then(|o| o.dir.clone())
            .unwrap_or_else(|| "./output".to_string())
    }
    pub fn catalog_path(&self) -> String {
        self.catalog
            .clone()
            .unwrap_or_else(|| "./config/field_positions.json".to_string())
    }
}

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("NoFilesFound")]
    NoFilesFound { guidance: String },
}

/// Enumerate OCR dump files using a glob pattern (e.g., "./input/**/*.json").
/// Returns a sorted list of paths.
pub fn enumerate_dumps(glob_pattern: &str) -> Result<Vec<PathBuf>, EnumerateError> {
    let root = if Path::new(glob_pattern).is_absolute() { "/" } else { "." };
    let mut pat = glob_pattern.to_string();
    if pat.starts_with("./") { pat = pat.trim_start_matches("./").to_string(); }
    let mut paths: Vec<PathBuf> = GlobWalkerBuilder::from_patterns(root, &[pat.as_str()])
        .case_insensitive(false)
        .follow_links(false)
        .max_depth(usize::MAX)
        .build()
        .map_err(|_| EnumerateError::NoFilesFound { guidance: folder_guidance() })?
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .collect();

    paths.sort();
    paths.retain(|p| p.is_file());

    if paths.is_empty() {
        return Err(EnumerateError::NoFilesFound { guidance: folder_guidance() });
    }

    Ok(paths)
}

fn folder_guidance() -> String {
    let guide = r#"No OCR dumps match the pattern ./input/**/*.json
Suggested layout:
  ./input/<client>/<document>.json
Each dump is the per-document OCR result written by the extraction step.
Example: ./input/smith/a3-goals-2026.json"#;
    guide.to_string()
}

/// Logical page of the A3 source document. Only two pages carry rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Page {
    #[serde(rename = "page_1")]
    Page1,
    #[serde(rename = "page_2")]
    Page2,
}

impl Page {
    pub fn from_number(n: u32) -> Option<Page> {
        match n {
            1 => Some(Page::Page1),
            2 => Some(Page::Page2),
            _ => None,
        }
    }
    pub fn key(&self) -> &'static str {
        match self {
            Page::Page1 => "page_1",
            Page::Page2 => "page_2",
        }
    }
}

fn default_field_type() -> String {
    "text".to_string()
}

fn default_fontsize() -> f64 {
    10.0
}

/// One placement target on the output PDF form. The mapping engine only reads
/// `name`; rect/type/multiline/fontsize are consumed by the PDF populator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub rect: [f64; 4],
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub multiline: bool,
    #[serde(default = "default_fontsize")]
    pub fontsize: f64,
}

/// The page -> field-definition configuration. User-editable JSON keyed
/// `page_1` / `page_2`; extra keys such as `_metadata` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub page_1: Vec<FieldDef>,
    #[serde(default)]
    pub page_2: Vec<FieldDef>,
}

impl Catalog {
    pub fn fields(&self, page: Page) -> &[FieldDef] {
        match page {
            Page::Page1 => &self.page_1,
            Page::Page2 => &self.page_2,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.page_1.is_empty() && self.page_2.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read field config: {0}")]
    Read(String),
    #[error("Failed to parse field config: {0}")]
    Parse(String),
    #[error("Empty catalog: no fields defined on any page")]
    Empty,
    #[error("Duplicate field name on {page}: {name}")]
    Duplicate { page: String, name: String },
}

/// Load and validate the field catalog JSON.
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Read(e.to_string()))?;
    let catalog: Catalog = serde_json::from_str(&raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

/// Fail fast on configuration problems: an entirely empty catalog or a field
/// name repeated within one page.
pub fn validate_catalog(catalog: &Catalog) -> Result<(), CatalogError> {
    if catalog.is_empty() {
        return Err(CatalogError::Empty);
    }
    for page in [Page::Page1, Page::Page2] {
        let mut seen: HashSet<&str> = HashSet::new();
        for field in catalog.fields(page) {
            if !seen.insert(field.name.as_str()) {
                return Err(CatalogError::Duplicate {
                    page: page.key().to_string(),
                    name: field.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// One OCR-extracted snippet with its free-text spatial description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub confidence: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One page's worth of OCR output as written by the extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFragments {
    #[serde(default = "default_true")]
    pub success: bool,
    pub page_number: u32,
    #[serde(default)]
    pub sections: Vec<TextFragment>,
}

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Failed to read OCR dump: {0}")]
    Read(String),
    #[error("Failed to parse OCR dump: {0}")]
    Parse(String),
}

/// Load a per-document OCR dump: a list of page objects with their sections.
pub fn load_fragment_dump(path: &Path) -> Result<Vec<PageFragments>, DumpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| DumpError::Read(e.to_string()))?;
    let pages: Vec<PageFragments> =
        serde_json::from_str(&raw).map_err(|e| DumpError::Parse(e.to_string()))?;
    Ok(pages)
}

static COMPANY_INFO_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)more4life financial services pty ltd",
        r"(?i)\bABN \d+ \d+ \d+ \d+",
        r"(?i)\bAFSL No \d+",
        r"(?i)dale street brookvale",
        r"(?i)\bTel \d+ \d+ \d+",
        r"(?i)\bFax \d+ \d+ \d+",
        r"(?i)info@m4lfs\.com\.au",
        r"(?i)www\.m4lfs\.com\.au",
        r"(?i)more4life\s*financial services",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// Printed section headings and artwork on the page-1 template.
const PAGE1_PRINTED_HEADINGS: &[&str] = &[
    "dos conversation",
    "dangers to be eliminated",
    "opportunities to be focused on",
    "strengths to be reinforced",
    "money business leisure health family",
];

const PAGE2_CATEGORY_LABELS: &[&str] = &["money", "business", "leisure", "health", "family"];

const PAGE2_STAGE_LABELS: &[&str] = &["GOALS", "NOW", "TO DO", "TODO"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterStats {
    pub removed_headings: usize,
    pub removed_branding: usize,
    pub removed_labels: usize,
    pub removed_instructions: usize,
    pub removed_samples: Vec<String>,
}

fn is_company_info(text: &str) -> bool {
    COMPANY_INFO_RES.iter().any(|re| re.is_match(text))
}

fn is_page_instruction(text_lc: &str) -> bool {
    text_lc.contains("now it is time to eliminate dangers")
        || text_lc.contains("please turn the page to complete")
        || (text_lc.contains("turn the page") && text_lc.contains("complete"))
}

/// Drop printed template artwork from OCR fragments before mapping:
/// page-1 section headings and company branding, page-2 turn-page
/// instructions and bare category/stage labels. Empty fragments pass
/// through untouched so the engine can count them.
pub fn filter_fragments(pages: &[PageFragments]) -> (Vec<PageFragments>, FilterStats) {
    let mut stats = FilterStats::default();
    let mut out: Vec<PageFragments> = Vec::with_capacity(pages.len());

    for page in pages {
        let mut kept: Vec<TextFragment> = Vec::new();
        for frag in &page.sections {
            let trimmed = frag.text.trim();
            if trimmed.is_empty() {
                kept.push(frag.clone());
                continue;
            }
            let text_lc = trimmed.to_lowercase();
            let loc_lc = frag.location.to_lowercase();

            let mut drop = false;
            match page.page_number {
                1 => {
                    if PAGE1_PRINTED_HEADINGS.iter().any(|h| text_lc.contains(h)) {
                        drop = true;
                        stats.removed_headings += 1;
                    } else if is_company_info(trimmed) {
                        drop = true;
                        stats.removed_branding += 1;
                    }
                }
                2 => {
                    if is_page_instruction(&text_lc) {
                        drop = true;
                        stats.removed_instructions += 1;
                    } else if loc_lc.contains("top")
                        && PAGE2_CATEGORY_LABELS.contains(&text_lc.as_str())
                    {
                        drop = true;
                        stats.removed_labels += 1;
                    } else if PAGE2_STAGE_LABELS.contains(&trimmed.to_uppercase().as_str()) {
                        drop = true;
                        stats.removed_labels += 1;
                    }
                }
                _ => {
                    // Unknown page: only strip company boilerplate.
                    if is_company_info(trimmed) {
                        drop = true;
                        stats.removed_branding += 1;
                    }
                }
            }

            if drop {
                if stats.removed_samples.len() < 5 {
                    stats.removed_samples.push(trimmed.to_string());
                }
                continue;
            }
            kept.push(frag.clone());
        }
        out.push(PageFragments {
            success: page.success,
            page_number: page.page_number,
            sections: kept,
        });
    }

    (out, stats)
}

// Page-1 themed content rules: keyword set -> both name tokens must appear in
// the field name (e.g. "dangers_to_eliminate").
const PAGE1_THEME_RULES: &[(&[&str], (&str, &str))] = &[
    (&["danger", "risk", "threat"], ("danger", "eliminate")),
    (&["opportunit", "chance"], ("opportunit", "focus")),
    (&["strength", "strong", "reinforce"], ("strength", "reinforce")),
];

// Page-1 right-column placements: vertical word -> fixed field name.
const PAGE1_RIGHT_COLUMN: &[(&str, &str)] = &[
    ("top", "financial_info"),
    ("upper", "financial_info"),
    ("middle", "career_plans"),
    ("bottom", "additional_notes"),
    ("lower", "additional_notes"),
];

// Organization signature tokens found in printed branding blocks.
const ORG_SIGNATURE_TOKENS: &[&str] = &[
    "more4life",
    "financial services",
    "abn",
    "afsl",
    "brookvale",
    "dale street",
    "m4lfs",
];

const ORG_FIELD_TOKENS: &[&str] = &["more4life", "branding"];

// Page-2 manual position table, checked top-to-bottom; compound column keys
// precede their plain substrings ("center-left" before "center").
const PAGE2_POSITION_TABLE: &[(&str, &str)] = &[
    ("second row center-left", "business_goals"),
    ("second row center left", "business_goals"),
    ("second row center-right", "health_goals"),
    ("second row center right", "health_goals"),
    ("second row center", "leisure_goals"),
    ("second row left", "money_goals"),
    ("second row right", "family_goals"),
    ("third row center-left", "business_now"),
    ("third row center left", "business_now"),
    ("third row center-right", "health_now"),
    ("third row center right", "health_now"),
    ("third row center", "leisure_now"),
    ("third row left", "money_now"),
    ("third row right", "family_now"),
    ("fourth row center-left", "business_todo"),
    ("fourth row center left", "business_todo"),
    ("fourth row center-right", "health_todo"),
    ("fourth row center right", "health_todo"),
    ("fourth row center", "leisure_todo"),
    ("fourth row left", "money_todo"),
    ("fourth row right", "family_todo"),
];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("money", &["money", "financial", "finance", "$"]),
    ("business", &["business", "work", "career", "job"]),
    ("leisure", &["leisure", "hobby", "fun", "travel"]),
    ("health", &["health", "fitness", "medical"]),
    ("family", &["family", "child", "parent"]),
];

const STAGE_KEYWORDS: &[(&str, &[&str])] = &[
    ("goals", &["goal", "want", "wish"]),
    ("now", &["now", "current", "today"]),
    ("todo", &["todo", "to do", "action", "plan"]),
];

const VERTICAL_STAGES: &[(&str, &str)] = &[
    ("top", "goals"),
    ("upper", "goals"),
    ("middle", "now"),
    ("bottom", "todo"),
    ("lower", "todo"),
];

// Column words crossed with rows on the page-2 grid; compound keys first.
const HORIZONTAL_CATEGORIES: &[(&str, &str)] = &[
    ("center-left", "business"),
    ("center left", "business"),
    ("center-right", "health"),
    ("center right", "health"),
    ("center", "leisure"),
    ("left", "money"),
    ("right", "family"),
];

const GENERIC_FIELD_TOKENS: &[&str] = &["note", "additional", "other", "general", "misc"];

/// Per-page catalog view precomputed once per mapping call.
struct PageIndex<'a> {
    fields: &'a [FieldDef],
    lower: Vec<String>,
    names: HashSet<&'a str>,
}

impl<'a> PageIndex<'a> {
    fn new(fields: &'a [FieldDef]) -> PageIndex<'a> {
        PageIndex {
            fields,
            lower: fields.iter().map(|f| f.name.to_lowercase()).collect(),
            names: fields.iter().map(|f| f.name.as_str()).collect(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// First field, in catalog order, whose lowercased name contains both tokens.
    fn find_with_tokens(&self, a: &str, b: &str) -> Option<&'a str> {
        self.lower
            .iter()
            .position(|n| n.contains(a) && n.contains(b))
            .map(|i| self.fields[i].name.as_str())
    }

    /// First field, in catalog order, whose lowercased name contains any token.
    fn find_with_any_token(&self, tokens: &[&str]) -> Option<&'a str> {
        self.lower
            .iter()
            .position(|n| tokens.iter().any(|t| n.contains(t)))
            .map(|i| self.fields[i].name.as_str())
    }
}

fn match_page1(text_lc: &str, loc_lc: &str, idx: &PageIndex) -> Option<String> {
    // 1) Themed content keywords; the field must name both the theme and its
    //    qualifier and be present in the catalog.
    for (keywords, (theme, qualifier)) in PAGE1_THEME_RULES {
        if keywords.iter().any(|k| text_lc.contains(k) || loc_lc.contains(k)) {
            if let Some(name) = idx.find_with_tokens(theme, qualifier) {
                return Some(name.to_string());
            }
        }
    }

    // 2) Right-column placement from the location description.
    if loc_lc.contains("right") {
        for (vertical, field) in PAGE1_RIGHT_COLUMN {
            if loc_lc.contains(vertical) && idx.contains(field) {
                return Some((*field).to_string());
            }
        }
    }

    // 3) Organization branding blocks land in the branding field when one exists.
    if ORG_SIGNATURE_TOKENS.iter().any(|t| text_lc.contains(t)) {
        if let Some(name) = idx.find_with_any_token(ORG_FIELD_TOKENS) {
            return Some(name.to_string());
        }
    }

    None
}

/// First keyword table entry whose keywords hit the haystack.
fn keyword_lookup(haystack: &str, table: &[(&'static str, &[&str])]) -> Option<&'static str> {
    for (name, keywords) in table {
        if keywords.iter().any(|k| haystack.contains(*k)) {
            return Some(*name);
        }
    }
    None
}

/// First position-word table entry contained in the location string.
fn position_lookup(loc_lc: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    for (word, name) in table {
        if loc_lc.contains(*word) {
            return Some(*name);
        }
    }
    None
}

fn match_page2(text_lc: &str, loc_lc: &str, idx: &PageIndex) -> Option<String> {
    // 1) Manual position table takes precedence over all content inference.
    for (key, field) in PAGE2_POSITION_TABLE {
        if loc_lc.contains(*key) {
            if idx.contains(field) {
                return Some((*field).to_string());
            }
            break;
        }
    }

    // 2) Category from content, stage from content or vertical position.
    let category = keyword_lookup(text_lc, CATEGORY_KEYWORDS);
    let stage = keyword_lookup(text_lc, STAGE_KEYWORDS)
        .or_else(|| position_lookup(loc_lc, VERTICAL_STAGES));

    if let (Some(category), Some(stage)) = (category, stage) {
        let name = format!("{}_{}", category, stage);
        if idx.contains(&name) {
            return Some(name);
        }
    }

    // 3) Pure column-position fallback when content gave no category. The
    //    composed name is validated against the catalog like every other rule.
    if category.is_none() {
        let column = position_lookup(loc_lc, HORIZONTAL_CATEGORIES);
        let row = position_lookup(loc_lc, VERTICAL_STAGES);
        if let (Some(column), Some(row)) = (column, row) {
            let name = format!("{}_{}", column, row);
            if idx.contains(&name) {
                return Some(name);
            }
        }
    }

    None
}

/// Run the page-1 rule set against one fragment. Text and location are
/// lower-cased internally; the returned name always exists in `fields`.
pub fn match_page1_field(text: &str, location: &str, fields: &[FieldDef]) -> Option<String> {
    let idx = PageIndex::new(fields);
    match_page1(&text.to_lowercase(), &location.to_lowercase(), &idx)
}

/// Run the page-2 rule set against one fragment.
pub fn match_page2_field(text: &str, location: &str, fields: &[FieldDef]) -> Option<String> {
    let idx = PageIndex::new(fields);
    match_page2(&text.to_lowercase(), &location.to_lowercase(), &idx)
}

/// Pick the generic fallback field for a page: prefer a notes-like name,
/// otherwise the first field in catalog order.
pub fn generic_fallback_field(fields: &[FieldDef]) -> Option<&str> {
    for field in fields {
        let lower = field.name.to_lowercase();
        if GENERIC_FIELD_TOKENS.iter().any(|t| lower.contains(t)) {
            return Some(field.name.as_str());
        }
    }
    fields.first().map(|f| f.name.as_str())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingStats {
    pub mapped: usize,
    pub fallback: usize,
    pub unmapped: usize,
    pub skipped_empty: usize,
    pub skipped_failed_pages: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingOutcome {
    pub fields: BTreeMap<String, String>,
    pub stats: MappingStats,
}

fn append_field(fields: &mut BTreeMap<String, String>, name: &str, text: &str) {
    match fields.get_mut(name) {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(text);
        }
        None => {
            fields.insert(name.to_string(), text.to_string());
        }
    }
}

/// Map OCR fragments onto named form fields, page by page, fragments in
/// arrival order. Every non-empty fragment lands in its best-matching field
/// or the page's generic fallback; repeated hits on one field concatenate
/// with a newline. Fragments on a page with no fields (or a page outside
/// 1/2) are counted as unmapped, never an error.
pub fn map_fragments_to_fields(
    pages: &[PageFragments],
    catalog: &Catalog,
) -> Result<MappingOutcome, CatalogError> {
    validate_catalog(catalog)?;

    let idx1 = PageIndex::new(&catalog.page_1);
    let idx2 = PageIndex::new(&catalog.page_2);

    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut stats = MappingStats::default();

    for page in pages {
        if !page.success {
            stats.skipped_failed_pages += 1;
            continue;
        }
        let idx = match Page::from_number(page.page_number) {
            Some(Page::Page1) => Some(&idx1),
            Some(Page::Page2) => Some(&idx2),
            None => None,
        };
        for frag in &page.sections {
            let trimmed = frag.text.trim();
            if trimmed.is_empty() {
                stats.skipped_empty += 1;
                continue;
            }
            let Some(idx) = idx else {
                stats.unmapped += 1;
                continue;
            };
            let text_lc = trimmed.to_lowercase();
            let loc_lc = frag.location.to_lowercase();
            let matched = match page.page_number {
                1 => match_page1(&text_lc, &loc_lc, idx),
                _ => match_page2(&text_lc, &loc_lc, idx),
            };
            match matched {
                Some(name) => {
                    append_field(&mut fields, &name, trimmed);
                    stats.mapped += 1;
                }
                None => match generic_fallback_field(idx.fields) {
                    Some(name) => {
                        append_field(&mut fields, name, trimmed);
                        stats.fallback += 1;
                    }
                    None => {
                        stats.unmapped += 1;
                    }
                },
            }
        }
    }

    Ok(MappingOutcome { fields, stats })
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("WriteFailed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitPaths {
    pub fields_path: String,
    pub meta_path: String,
}

/// Atomically write the field mapping and meta JSON into outdir with doc_id stem.
pub fn emit_mapping(
    mapping: &BTreeMap<String, String>,
    meta: &serde_json::Value,
    outdir: &str,
    doc_id: &str,
) -> Result<EmitPaths, EmitError> {
    std::fs::create_dir_all(outdir).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    let fields_path = Path::new(outdir).join(format!("{}.fields.json", doc_id));
    let meta_path = Path::new(outdir).join(format!("{}.meta.json", doc_id));

    // Write temp files then rename
    let pid = std::process::id();
    let fields_tmp = Path::new(outdir).join(format!("{}.fields.json.tmp.{}", doc_id, pid));
    let meta_tmp = Path::new(outdir).join(format!("{}.meta.json.tmp.{}", doc_id, pid));

    let fields_bytes =
        serde_json::to_vec_pretty(mapping).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::write(&fields_tmp, fields_bytes).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    let meta_bytes =
        serde_json::to_vec_pretty(meta).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::write(&meta_tmp, meta_bytes).map_err(|e| EmitError::WriteFailed(e.to_string()))?;

    std::fs::rename(&fields_tmp, &fields_path).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::rename(&meta_tmp, &meta_path).map_err(|e| EmitError::WriteFailed(e.to_string()))?;

    Ok(EmitPaths {
        fields_path: fields_path.to_string_lossy().to_string(),
        meta_path: meta_path.to_string_lossy().to_string(),
    })
}

// Utility to compute sha256 hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}
