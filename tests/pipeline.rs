//! Import codes, label files, embed, build prototypes, classify

use std::time::Duration;

use filing_tags::classify::{NeighborVote, PrototypeClassifier};
use filing_tags::core::{Config, FileIdentity};
use filing_tags::labels::{LabelSource, LabelStore, Split};
use filing_tags::search::{EmbeddingIndex, EncoderModel, IvfIndex};
use filing_tags::store::Store;
use filing_tags::tags::{import_filing_codes, parse_filing_codes, TagDatabase};

const CODES: &str = "\
F - Finance
F1 - Banking
F2 - Taxes
H - Household
H1 - Utilities
";

fn unit(dim: usize, hot: &[(usize, f32)]) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    for &(i, x) in hot {
        v[i] = x;
    }
    v
}

#[test]
fn file_backed_classification_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.index.lists = 2;
    let store = Store::open(&config.db_path(dir.path()), Duration::from_secs(5)).unwrap();

    let db = TagDatabase::new(&store);
    let mut taxonomy = db.load(config.taxonomy.default_confidence_floor).unwrap();
    let report = import_filing_codes(&db, &mut taxonomy, &parse_filing_codes(CODES)).unwrap();
    assert_eq!(report.added.len(), 5);
    assert_eq!(taxonomy.ancestors_of("F2").unwrap(), vec!["F".to_string()]);

    let dim = EncoderModel::Minilm.dimension();
    let index = EmbeddingIndex::new(&store, &config.models);
    let labels = LabelStore::new(&store, &taxonomy);
    let training = [
        (1, "a1", "F1", unit(dim, &[(0, 1.0), (1, 0.1)])),
        (2, "a2", "F1", unit(dim, &[(0, 1.0), (2, 0.1)])),
        (3, "b1", "F2", unit(dim, &[(3, 1.0)])),
        (4, "c1", "H1", unit(dim, &[(5, 1.0), (6, 0.2)])),
    ];
    for (id, hash, tag, vector) in &training {
        let file = FileIdentity::new(*id, hash).unwrap();
        store.register_file(&file, None, Some("pdf")).unwrap();
        index
            .upsert_embedding(hash, &format!("document {}", id), EncoderModel::Minilm, vector)
            .unwrap();
        labels
            .assign_primary(&file, tag, LabelSource::Human, Split::Train)
            .unwrap();
    }

    let classifier = PrototypeClassifier::new(&store, &taxonomy, &config);
    let summary = classifier.recompute_all(EncoderModel::Minilm, Some(Split::Train)).unwrap();
    assert_eq!(summary.len(), 3);

    // New file close to the banking documents
    let newcomer = FileIdentity::new(9, "ffee").unwrap();
    store.register_file(&newcomer, None, Some("pdf")).unwrap();
    index
        .upsert_embedding(
            "ffee",
            "statement",
            EncoderModel::Minilm,
            &unit(dim, &[(0, 0.9), (1, 0.1), (3, 0.1)]),
        )
        .unwrap();

    let candidates: Vec<String> = taxonomy.leaves().into_iter().map(String::from).collect();
    let assigned = classifier
        .label_file(&newcomer, EncoderModel::Minilm, &candidates, Split::Test)
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].tag, "F1");
    assert!(assigned[0].similarity >= assigned[0].confidence_floor);

    let tags: Vec<(String, bool, LabelSource)> = labels
        .labels_for(9)
        .unwrap()
        .into_iter()
        .map(|l| (l.tag, l.is_primary, l.source))
        .collect();
    assert!(tags.contains(&("F1".to_string(), true, LabelSource::Model)));
    assert!(tags.contains(&("F".to_string(), false, LabelSource::Model)));

    // Neighbor vote agrees, ignoring the newcomer's own model label
    let query = index.vector_for("ffee", EncoderModel::Minilm).unwrap().unwrap();
    let votes = NeighborVote::new(&store, &config.models, 2)
        .with_split(Split::Train)
        .vote(EncoderModel::Minilm, &query, Some("ffee"))
        .unwrap();
    assert_eq!(votes[0].tag, "F1");
    assert_eq!(votes[0].neighbors, 2);

    // IVF snapshot with every list probed matches the exact scan
    let ivf = index.build_ivf(EncoderModel::Minilm, &config.index, 10).unwrap();
    let path = dir.path().join("index").join("minilm.ivf");
    ivf.save(&path).unwrap();
    let ivf = IvfIndex::load(&path).unwrap();
    let exact = index
        .nearest_neighbors(EncoderModel::Minilm, &query, 3, None)
        .unwrap();
    assert_eq!(ivf.search(&query, 3, ivf.list_count(), None).unwrap(), exact);
    assert_eq!(exact[0].file_hash, "ffee");
}
