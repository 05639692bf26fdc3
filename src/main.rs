mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter environment variable (tracing `EnvFilter` syntax)
const LOG_ENV: &str = "FILING_LOG";

#[derive(Parser)]
#[command(name = "filing")]
#[command(about = "Hierarchical filing tags with embedding search and prototype classification", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create filing.json and the catalog database
    Init {
        #[arg(long, help = "Overwrite an existing filing.json with defaults")]
        force: bool,
    },
    /// Manage the tag taxonomy
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },
    /// Register files in the catalog
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
    /// Assign and inspect file labels
    Labels {
        #[command(subcommand)]
        action: LabelsAction,
    },
    /// Store a precomputed embedding for a file
    Embed {
        /// File content hash
        hash: String,
        #[arg(short, long, help = "Encoder model (minilm, mpnet)")]
        model: String,
        #[arg(long, help = "Text the vector was computed from")]
        text: String,
        #[arg(long, help = "JSON file holding the vector as an array of numbers")]
        vector: PathBuf,
    },
    /// Nearest-neighbor search over stored embeddings
    Search {
        #[arg(long, help = "JSON file holding the query vector")]
        vector: PathBuf,
        #[arg(short, long, default_value = "minilm")]
        model: String,
        #[arg(short = 'k', long, default_value = "10", help = "Number of results")]
        limit: usize,
        #[arg(long, help = "Minimum cosine similarity")]
        min: Option<f32>,
        #[arg(long, help = "Search the saved IVF snapshot instead of scanning")]
        ivf: bool,
        #[arg(long, help = "IVF lists to probe (default from config)")]
        probes: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Approximate search index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Tag prototypes
    Prototypes {
        #[command(subcommand)]
        action: PrototypesAction,
    },
    /// Classify a vector or a catalogued file against candidate tags
    Classify {
        /// Candidate tags (default: every leaf tag)
        candidates: Vec<String>,
        #[arg(short, long, default_value = "minilm")]
        model: String,
        #[arg(long, conflicts_with = "file", help = "JSON file holding the vector")]
        vector: Option<PathBuf>,
        #[arg(long, num_args = 2, value_names = ["ID", "HASH"], help = "Classify a file's stored vector")]
        file: Option<Vec<String>>,
        #[arg(long, requires = "file", help = "Record the best match as a model label")]
        assign: bool,
        #[arg(long, help = "Split for assigned labels (default from config)")]
        split: Option<String>,
        #[arg(long, help = "Vote with the k nearest labeled files instead of prototypes")]
        knn: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Catalog overview
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Add a tag, or update it with --update
    Add {
        label: String,
        #[arg(short, long)]
        parent: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, help = "Importance rank (lower ranks first)")]
        rank: Option<i32>,
        #[arg(long, help = "Confidence floor in 0.0..=1.0")]
        floor: Option<f32>,
        #[arg(long, help = "Replace an existing tag")]
        update: bool,
    },
    /// Import a filing-code list ("CODE - Description" per line)
    Import {
        path: PathBuf,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Print the taxonomy as a tree
    Tree {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show one tag with its ancestors and children
    Show {
        label: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Remove an unused tag
    Remove { label: String },
}

#[derive(Subcommand)]
enum FilesAction {
    /// Register a file identity
    Add {
        id: i64,
        hash: String,
        #[arg(long)]
        size: Option<i64>,
        #[arg(long)]
        ext: Option<String>,
    },
}

#[derive(Subcommand)]
enum LabelsAction {
    /// Label a file with a primary tag (ancestors are added)
    Assign {
        id: i64,
        hash: String,
        tag: String,
        #[arg(long, help = "human, rule or model (default from config)")]
        source: Option<String>,
        #[arg(long, help = "train, test or val (default from config)")]
        split: Option<String>,
    },
    /// Remove a primary label and the ancestors it implied
    Remove { id: i64, tag: String },
    /// List a file's labels
    List {
        id: i64,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build and save an IVF snapshot for a model
    Build {
        #[arg(short, long, default_value = "minilm")]
        model: String,
        #[arg(long, help = "Inverted lists (default from config)")]
        lists: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PrototypesAction {
    /// Recompute centroids from labeled files
    Recompute {
        #[arg(short, long, default_value = "minilm")]
        model: String,
        #[arg(short, long, help = "Only this tag (default: every labeled tag)")]
        tag: Option<String>,
        #[arg(long, help = "Only files labeled in this split")]
        split: Option<String>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show a tag's stored prototypes
    Show {
        tag: String,
        #[arg(short, long, default_value = "minilm")]
        model: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Score current prototypes on held-out labeled files and record metrics
    Evaluate {
        #[arg(short, long, default_value = "minilm")]
        model: String,
        #[arg(long, default_value = "test", help = "Split to evaluate (test or val)")]
        split: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => commands::init::run(force),
        Commands::Tags { action } => match action {
            TagsAction::Add {
                label,
                parent,
                description,
                rank,
                floor,
                update,
            } => commands::tags::run_add(&label, parent, description, rank, floor, update),
            TagsAction::Import { path, json } => commands::tags::run_import(&path, json),
            TagsAction::Tree { json } => commands::tags::run_tree(json),
            TagsAction::Show { label, json } => commands::tags::run_show(&label, json),
            TagsAction::Remove { label } => commands::tags::run_remove(&label),
        },
        Commands::Files { action } => match action {
            FilesAction::Add {
                id,
                hash,
                size,
                ext,
            } => commands::files::run_add(id, &hash, size, ext.as_deref()),
        },
        Commands::Labels { action } => match action {
            LabelsAction::Assign {
                id,
                hash,
                tag,
                source,
                split,
            } => commands::labels::run_assign(id, &hash, &tag, source.as_deref(), split.as_deref()),
            LabelsAction::Remove { id, tag } => commands::labels::run_remove(id, &tag),
            LabelsAction::List { id, json } => commands::labels::run_list(id, json),
        },
        Commands::Embed {
            hash,
            model,
            text,
            vector,
        } => commands::embed::run(&hash, &model, &text, &vector),
        Commands::Search {
            vector,
            model,
            limit,
            min,
            ivf,
            probes,
            json,
        } => commands::search::run(&vector, &model, limit, min, ivf, probes, json),
        Commands::Index { action } => match action {
            IndexAction::Build { model, lists, json } => {
                commands::index::run_build(&model, lists, json)
            }
        },
        Commands::Prototypes { action } => match action {
            PrototypesAction::Recompute {
                model,
                tag,
                split,
                json,
            } => commands::prototypes::run_recompute(&model, tag.as_deref(), split.as_deref(), json),
            PrototypesAction::Show { tag, model, json } => {
                commands::prototypes::run_show(&tag, &model, json)
            }
            PrototypesAction::Evaluate { model, split, json } => {
                commands::prototypes::run_evaluate(&model, &split, json)
            }
        },
        Commands::Classify {
            candidates,
            model,
            vector,
            file,
            assign,
            split,
            knn,
            json,
        } => commands::classify::run(commands::classify::ClassifyArgs {
            candidates,
            model,
            vector,
            file,
            assign,
            split,
            knn,
            json,
        }),
        Commands::Status { json } => commands::status::run(json),
    }
}
