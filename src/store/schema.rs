//! Catalog table definitions
//!
//! Vectors are stored as little-endian f32 BLOBs. `tag_prototypes` is keyed by
//! model as well as (tag, prototype_id) so both encoders can hold centroids for
//! the same tag.

pub(super) const TABLES: [&str; 8] = [
    "files",
    "filing_tags",
    "file_tag_labels",
    "file_embeddings",
    "tag_prototypes",
    "prototype_runs",
    "prototype_members",
    "prototype_run_metrics",
];

pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    hash TEXT NOT NULL UNIQUE,
    size INTEGER,
    extension TEXT
);

CREATE TABLE IF NOT EXISTS filing_tags (
    label TEXT PRIMARY KEY,
    parent_label TEXT REFERENCES filing_tags(label),
    description TEXT,
    importance_rank INTEGER,
    confidence_floor REAL DEFAULT 0.60
);

CREATE TABLE IF NOT EXISTS file_tag_labels (
    file_id INTEGER NOT NULL REFERENCES files(id),
    file_hash TEXT NOT NULL REFERENCES files(hash),
    tag TEXT NOT NULL REFERENCES filing_tags(label),
    is_primary INTEGER NOT NULL DEFAULT 1,
    label_source TEXT NOT NULL DEFAULT 'human',
    split TEXT NOT NULL DEFAULT 'train',
    PRIMARY KEY (file_id, tag)
);

CREATE TABLE IF NOT EXISTS file_embeddings (
    file_hash TEXT PRIMARY KEY REFERENCES files(hash) ON DELETE CASCADE,
    source_text TEXT,
    text_length INTEGER,
    minilm_model TEXT,
    minilm_emb BLOB,
    mpnet_model TEXT,
    mpnet_emb BLOB,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tag_prototypes (
    tag TEXT NOT NULL REFERENCES filing_tags(label) ON DELETE CASCADE,
    prototype_id INTEGER NOT NULL DEFAULT 0,
    model_name TEXT NOT NULL,
    embedding BLOB NOT NULL,
    doc_count INTEGER,
    updated_at TEXT NOT NULL,
    notes TEXT,
    PRIMARY KEY (tag, model_name, prototype_id)
);

CREATE TABLE IF NOT EXISTS prototype_runs (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_name TEXT NOT NULL,
    model_version TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    hyperparams TEXT,
    tag_filter TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prototype_members (
    run_id INTEGER NOT NULL REFERENCES prototype_runs(run_id) ON DELETE CASCADE,
    tag TEXT NOT NULL REFERENCES filing_tags(label) ON DELETE CASCADE,
    prototype_id INTEGER NOT NULL DEFAULT 0,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    PRIMARY KEY (run_id, tag, prototype_id, file_id)
);

CREATE TABLE IF NOT EXISTS prototype_run_metrics (
    run_id INTEGER NOT NULL REFERENCES prototype_runs(run_id) ON DELETE CASCADE,
    metric_name TEXT NOT NULL,
    split TEXT NOT NULL,
    value REAL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (run_id, metric_name, split)
);

CREATE INDEX IF NOT EXISTS idx_filing_tags_parent ON filing_tags(parent_label);
CREATE INDEX IF NOT EXISTS idx_file_tag_labels_tag ON file_tag_labels(tag);
CREATE INDEX IF NOT EXISTS idx_file_tag_labels_hash ON file_tag_labels(file_hash);
"#;
