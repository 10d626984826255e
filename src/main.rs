use std::collections::HashSet;
use std::path::Path;

use a3ocr_to_fields::{
    apt_help_for, check_deps, emit_mapping, enumerate_dumps, filter_fragments, load_catalog,
    load_fragment_dump, map_fragments_to_fields, sha256_hex, validate_job, DepsResult,
};

fn main() {
    // Simple CLI flags parsing
    let args: Vec<String> = std::env::args().collect();
    let strict = args.iter().any(|a| a == "--strict");
    let mut filter_on = true; // default on
    if let Some(val) = args.iter().find(|a| a.starts_with("--filter")) {
        if let Some(eqpos) = val.find('=') {
            let v = &val[eqpos + 1..];
            filter_on = v != "off";
        }
    }
    let mut per_doc_dir_on = true; // default on
    if let Some(val) = args.iter().find(|a| a.starts_with("--per-doc-dir")) {
        if let Some(eqpos) = val.find('=') {
            let v = &val[eqpos + 1..];
            per_doc_dir_on = v != "off";
        }
    }
    let mut catalog_override: Option<String> = None;
    if let Some(pos) = args.iter().position(|a| a == "--catalog") {
        if let Some(val) = args.get(pos + 1) {
            if !val.starts_with("--") {
                catalog_override = Some(val.clone());
            }
        }
    }

    // Track used slugs for uniqueness
    let mut used_doc_ids: HashSet<String> = HashSet::new();

    fn slugify(base: &str) -> String {
        let lower = base.to_lowercase();
        let mut s = String::with_capacity(lower.len());
        for ch in lower.chars() {
            if ch.is_ascii_alphanumeric() {
                s.push(ch);
            } else {
                s.push('-');
            }
        }
        let trimmed = s.trim_matches('-').to_string();
        let mut collapsed = String::with_capacity(trimmed.len());
        let mut prev_dash = false;
        for ch in trimmed.chars() {
            if ch == '-' {
                if !prev_dash {
                    collapsed.push(ch);
                }
                prev_dash = true;
            } else {
                prev_dash = false;
                collapsed.push(ch);
            }
        }
        if collapsed.is_empty() {
            "doc".to_string()
        } else {
            collapsed
        }
    }

    fn unique_slug(slug_in: String, used: &mut HashSet<String>) -> String {
        if !used.contains(&slug_in) {
            used.insert(slug_in.clone());
            return slug_in;
        }
        let mut i = 1;
        loop {
            let candidate = format!("{}-{}", slug_in, i);
            if !used.contains(&candidate) {
                used.insert(candidate.clone());
                return candidate;
            }
            i += 1;
        }
    }

    // 1) Read and validate job.yaml
    let job_path = Path::new("job.yaml");
    let job = match validate_job(job_path) {
        Ok(j) => j,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "validate_job",
                    "file": "job.yaml",
                    "error": e.to_string()
                })
            );
            std::process::exit(3);
        }
    };

    let catalog_path = catalog_override.unwrap_or_else(|| job.catalog_path());

    eprintln!(
        "{}",
        serde_json::json!({
            "tool":"validate_job",
            "file":"job.yaml",
            "status":"ok",
            "input_glob": job.input_glob(),
            "output_dir": job.output_dir(),
            "catalog": catalog_path
        })
    );

    // 2) Rasterizer deps are an upstream concern; report but keep going.
    let deps: DepsResult = check_deps();
    eprintln!(
        "{}",
        serde_json::json!({
            "tool":"check_deps",
            "status": if deps.ok { "ok" } else { "warn" },
            "missing": deps.missing
        })
    );
    if !deps.missing.is_empty() {
        let help = apt_help_for(&deps.missing);
        if !help.is_empty() {
            eprintln!("{}", help);
        }
    }

    // 3) Load and validate the field catalog; configuration errors are fatal
    //    before any document is touched.
    let catalog = match load_catalog(Path::new(&catalog_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool":"load_catalog",
                    "file": catalog_path,
                    "error": e.to_string(),
                    "error_code": 2
                })
            );
            std::process::exit(2);
        }
    };
    eprintln!(
        "{}",
        serde_json::json!({
            "tool":"load_catalog",
            "file": catalog_path,
            "status":"ok",
            "page_1_fields": catalog.page_1.len(),
            "page_2_fields": catalog.page_2.len()
        })
    );

    // 4) Enumerate OCR dumps on the configured glob
    let input_glob = job.input_glob();

    match enumerate_dumps(&input_glob) {
        Ok(files) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool":"enumerate_dumps",
                    "count": files.len(),
                })
            );

            for file in files {
                let started_ms = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i128)
                    .unwrap_or(0);
                let fname = file.file_name().and_then(|s| s.to_str()).unwrap_or("doc.json").to_string();
                let base = fname.trim_end_matches(".json");
                let doc_id = unique_slug(slugify(base), &mut used_doc_ids);
                let base_output = job.output_dir();
                let doc_outdir = if per_doc_dir_on {
                    format!("{}/{}", base_output, doc_id)
                } else {
                    base_output.clone()
                };

                let pages = match load_fragment_dump(&file) {
                    Ok(p) => p,
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool":"load_fragment_dump",
                                "file": file,
                                "error": e.to_string(),
                                "error_code": 4
                            })
                        );
                        std::process::exit(4);
                    }
                };
                let total_sections: usize = pages.iter().map(|p| p.sections.len()).sum();
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool":"load_fragment_dump",
                        "file": file,
                        "pages": pages.len(),
                        "sections": total_sections
                    })
                );

                // 5) Strip printed template artwork before mapping
                let (pages, filter_stats) = if filter_on {
                    let (filtered, stats) = filter_fragments(&pages);
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "tool":"filter_fragments",
                            "file": file,
                            "removed_headings": stats.removed_headings,
                            "removed_branding": stats.removed_branding,
                            "removed_labels": stats.removed_labels,
                            "removed_instructions": stats.removed_instructions
                        })
                    );
                    (filtered, Some(stats))
                } else {
                    (pages, None)
                };

                // 6) Mapping engine
                let outcome = match map_fragments_to_fields(&pages, &catalog) {
                    Ok(o) => o,
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool":"map_fragments_to_fields",
                                "file": file,
                                "error": e.to_string(),
                                "error_code": 2
                            })
                        );
                        std::process::exit(2);
                    }
                };
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool":"map_fragments_to_fields",
                        "file": file,
                        "fields_populated": outcome.fields.len(),
                        "mapped": outcome.stats.mapped,
                        "fallback": outcome.stats.fallback,
                        "unmapped": outcome.stats.unmapped,
                        "skipped_empty": outcome.stats.skipped_empty
                    })
                );

                if strict && outcome.stats.unmapped > 0 {
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "tool":"map_fragments_to_fields",
                            "file": file,
                            "error":"UnmappedFragments",
                            "error_code": 5,
                            "unmapped": outcome.stats.unmapped
                        })
                    );
                    std::process::exit(5);
                }

                // 7) Emit mapping + meta (atomic)
                let finished_ms = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i128)
                    .unwrap_or(0);
                let meta = serde_json::json!({
                    "doc_id": doc_id,
                    "engine": "rules",
                    "page_count": pages.len(),
                    "section_count": total_sections,
                    "fields_populated": outcome.fields.len(),
                    "stats": outcome.stats,
                    "filter": filter_stats,
                    "timestamps": {"started_ms": started_ms, "finished_ms": finished_ms},
                });
                // Compute meta_fingerprint (normalized meta without timestamps)
                let mut meta_norm = meta.clone();
                if let Some(obj) = meta_norm.as_object_mut() {
                    obj.remove("timestamps");
                }
                let meta_norm_bytes = serde_json::to_vec(&meta_norm).unwrap_or_default();
                let fingerprint = sha256_hex(&meta_norm_bytes);
                let mut meta_full = meta.as_object().cloned().unwrap_or_default();
                meta_full.insert("meta_fingerprint".to_string(), serde_json::json!(fingerprint));
                let meta = serde_json::Value::Object(meta_full);

                match emit_mapping(&outcome.fields, &meta, doc_outdir.as_str(), &doc_id) {
                    Ok(paths) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool":"emit_mapping",
                                "file": file,
                                "fields_path": paths.fields_path,
                                "meta_path": paths.meta_path
                            })
                        );
                    }
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool":"emit_mapping",
                                "file": file,
                                "error": e.to_string(),
                                "error_code": 6
                            })
                        );
                        std::process::exit(6);
                    }
                }
            }
        }
        Err(err) => {
            let guidance = match err {
                a3ocr_to_fields::EnumerateError::NoFilesFound { guidance } => guidance,
            };
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool":"enumerate_dumps",
                    "error":"NoFilesFound",
                    "error_code":1
                })
            );
            eprintln!("{}", guidance);
            std::process::exit(1);
        }
    }
}
