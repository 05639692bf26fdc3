//! Filing-code list import
//!
//! Code lists are plain text, one `CODE - description` per line, split at the
//! first ` - `. Blank lines and `//` comments are skipped. The parent of a
//! code is derived from its shape: `B` is a root, `B8` belongs to `B`, `B8.1`
//! belongs to `B8`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::database::{TagChange, TagDatabase};
use super::taxonomy::{Tag, Taxonomy};
use crate::error::Result;

/// Rank given to imported tags that do not exist yet
pub const IMPORTED_RANK: i32 = 1;

lazy_static! {
    static ref LETTER_PREFIX: Regex = Regex::new(r"^([A-Za-z]+)\d").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingCode {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: usize,
}

pub fn parse_filing_codes(text: &str) -> Vec<FilingCode> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .filter_map(|line| {
            let (code, description) = line.split_once(" - ")?;
            let (code, description) = (code.trim(), description.trim());
            (!code.is_empty()).then(|| FilingCode {
                code: code.to_string(),
                description: description.to_string(),
            })
        })
        .collect()
}

/// Parent code implied by a code's shape, `None` for roots.
pub fn parent_code(code: &str) -> Option<String> {
    if code.len() == 1 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if let Some((head, _)) = code.split_once('.') {
        return (!head.is_empty()).then(|| head.to_string());
    }
    LETTER_PREFIX.captures(code).map(|caps| caps[1].to_string())
}

fn depth(code: &str) -> usize {
    let mut depth = 0;
    let mut current = parent_code(code);
    while let Some(parent) = current {
        depth += 1;
        current = parent_code(&parent);
    }
    depth
}

/// Import codes into the catalog, parents before children, in one batch.
///
/// New codes get rank 1 and the default floor; existing codes have their
/// description and parent refreshed when they differ. If any code is
/// rejected nothing is written and `taxonomy` is left untouched.
pub fn import_filing_codes(
    db: &TagDatabase<'_>,
    taxonomy: &mut Taxonomy,
    codes: &[FilingCode],
) -> Result<ImportReport> {
    let mut ordered: Vec<&FilingCode> = codes.iter().collect();
    ordered.sort_by_key(|c| depth(&c.code));

    let mut planned = taxonomy.clone();
    let mut changes = Vec::new();
    let mut report = ImportReport::default();
    for code in ordered {
        let parent = parent_code(&code.code);

        let change = match planned.get(&code.code).cloned() {
            Some(existing) => {
                if existing.description.as_deref() == Some(code.description.as_str())
                    && existing.parent_label == parent
                {
                    report.unchanged += 1;
                    continue;
                }
                let updated = Tag {
                    parent_label: parent,
                    description: Some(code.description.clone()),
                    ..existing
                };
                planned.update_tag(updated.clone())?;
                report.updated.push(code.code.clone());
                TagChange::Update(updated)
            }
            None => {
                let mut tag = Tag::new(code.code.clone())
                    .with_description(code.description.clone())
                    .with_rank(IMPORTED_RANK)
                    .with_floor(planned.default_floor());
                tag.parent_label = parent;
                planned.add_tag(tag.clone())?;
                report.added.push(code.code.clone());
                TagChange::Add(tag)
            }
        };
        changes.push(change);
    }

    db.apply(taxonomy, changes)?;
    tracing::info!(
        added = report.added.len(),
        updated = report.updated.len(),
        unchanged = report.unchanged,
        "imported filing codes"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    const CODES: &str = r#"
// Filing codes
B8.1 - Utility bills
A - Administration
A1 - Contracts
B - Finance

B8 - Household
not a code line
GEN 2 - General - misc
"#;

    #[test]
    fn test_parse_skips_comments_and_noise() {
        let codes = parse_filing_codes(CODES);
        let names: Vec<&str> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(names, vec!["B8.1", "A", "A1", "B", "B8", "GEN 2"]);
        assert_eq!(codes[0].description, "Utility bills");
        // Only the first separator splits
        assert_eq!(codes[5].description, "General - misc");
    }

    #[test]
    fn test_parent_code_rules() {
        assert_eq!(parent_code("A"), None);
        assert_eq!(parent_code("A1").as_deref(), Some("A"));
        assert_eq!(parent_code("B12").as_deref(), Some("B"));
        assert_eq!(parent_code("B8.1").as_deref(), Some("B8"));
        assert_eq!(parent_code("GEN").as_deref(), None);
    }

    #[test]
    fn test_import_orders_parents_first() {
        let store = Store::open_in_memory().unwrap();
        let db = TagDatabase::new(&store);
        let mut taxonomy = Taxonomy::default();

        let report = import_filing_codes(&db, &mut taxonomy, &parse_filing_codes(CODES)).unwrap();
        assert_eq!(report.added.len(), 6);
        assert!(taxonomy.ancestors_of("GEN 2").unwrap().is_empty());
        assert_eq!(taxonomy.ancestors_of("B8.1").unwrap(), vec!["B8", "B"]);
        assert_eq!(taxonomy.importance_rank("A1").unwrap(), Some(IMPORTED_RANK));

        let again = parse_filing_codes("A1 - Contracts and leases\nA - Administration");
        let report = import_filing_codes(&db, &mut taxonomy, &again).unwrap();
        assert_eq!(report.updated, vec!["A1"]);
        assert_eq!(report.unchanged, 1);
        assert_eq!(
            db.get_tag("A1").unwrap().unwrap().description.as_deref(),
            Some("Contracts and leases")
        );
    }

    #[test]
    fn test_rejected_import_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let db = TagDatabase::new(&store);
        let mut taxonomy = Taxonomy::default();

        let codes = parse_filing_codes("A - Admin\nB8.1 - Bills");
        assert!(matches!(
            import_filing_codes(&db, &mut taxonomy, &codes),
            Err(crate::error::Error::UnknownTag(ref t)) if t == "B8"
        ));
        assert!(db.get_tag("A").unwrap().is_none());
        assert!(taxonomy.is_empty());
        assert!(db.load(0.6).unwrap().is_empty());
    }
}
