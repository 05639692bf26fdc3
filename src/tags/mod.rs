//! Filing-tag taxonomy
//!
//! # Components
//!
//! - `taxonomy`: in-memory hierarchy with ancestor/descendant walks
//! - `database`: persistence of `filing_tags`
//! - `cache`: shared, periodically refreshed taxonomy snapshot
//! - `codes`: filing-code list import

pub mod cache;
pub mod codes;
pub mod database;
pub mod taxonomy;

pub use cache::TaxonomyCache;
pub use codes::{import_filing_codes, parse_filing_codes, FilingCode, ImportReport};
pub use database::{TagChange, TagDatabase};
pub use taxonomy::{Tag, Taxonomy};
