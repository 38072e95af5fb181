//! Command-line entry point
//!
//! Subcommands cover the full lifecycle: `train` fits a classifier and
//! checkpoints the best epoch, `evaluate` scores a checkpoint against a
//! labeled dataset, `export` flattens a checkpoint into a portable
//! inference graph, and `predict` classifies ad-hoc requirement texts.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use secreq::data::{train_validation_split, RequirementDataset, RiskCategory};
use secreq::export::export_graph;
use secreq::features::{Embedder, EncoderConfig, FeatureComposer, OnnxEncoder, TfidfVectorizer};
use secreq::nn::{Adam, ClassifierConfig, RiskClassifier};
use secreq::training::{evaluate, EvalMetrics, Trainer, TrainerConfig, TrainingResult};

#[derive(Parser)]
#[command(name = "secreq", version, about = "Security-risk classification for software requirements")]
struct Cli {
    /// Log filter, e.g. `info` or `secreq=debug` (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the classifier on a labeled requirements dataset
    Train(TrainArgs),
    /// Evaluate a saved checkpoint on a labeled dataset
    Evaluate(EvaluateArgs),
    /// Export a trained checkpoint as a portable inference graph
    Export(ExportArgs),
    /// Classify requirement texts with a trained checkpoint
    Predict(PredictArgs),
}

/// Flags shared by every command that embeds text.
#[derive(Args)]
struct EmbedderArgs {
    /// Exported ONNX encoder; enables the transformer strategy
    #[arg(long)]
    encoder_model: Option<PathBuf>,

    /// WordPiece vocabulary matching the ONNX encoder
    #[arg(long)]
    encoder_vocab: Option<PathBuf>,

    /// Hidden width the ONNX encoder is expected to produce
    #[arg(long, default_value_t = 768)]
    encoder_hidden: usize,
}

#[derive(Args)]
struct TrainArgs {
    /// Labeled requirements CSV
    #[arg(long, default_value = "data/requirements.csv")]
    data: PathBuf,

    /// Augmented corpus, preferred over the raw CSV when present
    #[arg(long, default_value = "data/requirements_augmented.csv")]
    augmented: PathBuf,

    /// Where the best checkpoint is written
    #[arg(long, default_value = "models/classifier.json")]
    model: PathBuf,

    /// Where the fitted TF-IDF vocabulary is written (lexical strategy)
    #[arg(long, default_value = "models/vectorizer.json")]
    vectorizer: PathBuf,

    /// Where the run summary is written
    #[arg(long, default_value = "models/summary.json")]
    summary: PathBuf,

    #[arg(long, default_value_t = 100)]
    epochs: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,

    /// Non-improving epochs tolerated before stopping early
    #[arg(long, default_value_t = 10)]
    patience: usize,

    /// Decision cutoff for the reported metrics
    #[arg(long, default_value_t = 0.5)]
    threshold: f64,

    /// Fraction of rows held out for validation
    #[arg(long, default_value_t = 0.2)]
    val_ratio: f64,

    /// Seed for the train/validation split
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Hidden block widths
    #[arg(long, value_delimiter = ',', default_values_t = [512, 256, 128])]
    hidden: Vec<usize>,

    #[arg(long, default_value_t = 0.3)]
    dropout: f64,

    /// Vocabulary cap for the TF-IDF fallback
    #[arg(long, default_value_t = 500)]
    max_features: usize,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Labeled requirements CSV to score against
    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value = "models/classifier.json")]
    model: PathBuf,

    /// Fitted TF-IDF vocabulary from training (lexical strategy)
    #[arg(long, default_value = "models/vectorizer.json")]
    vectorizer: PathBuf,

    #[arg(long, default_value_t = 0.5)]
    threshold: f64,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long, default_value = "models/classifier.json")]
    model: PathBuf,

    /// Where the inference graph is written
    #[arg(long, default_value = "models/classifier_graph.json")]
    output: PathBuf,
}

#[derive(Args)]
struct PredictArgs {
    #[arg(long, default_value = "models/classifier.json")]
    model: PathBuf,

    /// Fitted TF-IDF vocabulary from training (lexical strategy)
    #[arg(long, default_value = "models/vectorizer.json")]
    vectorizer: PathBuf,

    #[arg(long, default_value_t = 0.5)]
    threshold: f64,

    /// Requirement text to classify; repeatable
    #[arg(long)]
    text: Vec<String>,

    /// File of requirement texts, one per line
    #[arg(long)]
    input: Option<PathBuf>,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

/// How to obtain the TF-IDF vectorizer when no encoder is configured.
enum LexicalInit<'a> {
    /// Fresh vectorizer to be fitted on the training corpus.
    Fresh { max_features: usize },
    /// Previously fitted vocabulary saved during training.
    Saved { path: &'a Path },
}

fn build_embedder(args: &EmbedderArgs, lexical: LexicalInit<'_>) -> Result<Embedder> {
    match (&args.encoder_model, &args.encoder_vocab) {
        (Some(model_path), Some(vocab_path)) => {
            let config = EncoderConfig {
                model_path: model_path.clone(),
                vocab_path: vocab_path.clone(),
                hidden_size: args.encoder_hidden,
                ..EncoderConfig::default()
            };
            Ok(Embedder::Transformer(OnnxEncoder::load(config)?))
        }
        (None, None) => {
            let vectorizer = match lexical {
                LexicalInit::Fresh { max_features } => {
                    TfidfVectorizer::new().with_max_features(max_features)
                }
                LexicalInit::Saved { path } => TfidfVectorizer::load(path)
                    .with_context(|| format!("loading vectorizer from {}", path.display()))?,
            };
            Ok(Embedder::Lexical(vectorizer))
        }
        _ => bail!("--encoder-model and --encoder-vocab must be provided together"),
    }
}

/// Machine-readable record of a completed training run.
#[derive(Serialize)]
struct TrainingSummary<'a> {
    version: &'static str,
    completed_at: chrono::DateTime<chrono::Utc>,
    feature_width: usize,
    embedding: &'static str,
    result: &'a TrainingResult,
    metrics: &'a EvalMetrics,
}

fn write_summary(path: &Path, summary: &TrainingSummary<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)?;
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    let dataset = RequirementDataset::load_preferring_augmented(&args.data, &args.augmented)?;
    for (category, positives) in RiskCategory::ALL.iter().zip(dataset.label_counts()) {
        info!(
            category = category.short_name(),
            positives,
            rows = dataset.len(),
            "label distribution"
        );
    }

    let texts = dataset.texts();
    let labels = dataset.label_matrix();

    let embedder = build_embedder(
        &args.embedder,
        LexicalInit::Fresh {
            max_features: args.max_features,
        },
    )?;
    let embedding_kind = match &embedder {
        Embedder::Transformer(_) => "transformer",
        Embedder::Lexical(_) => "tfidf",
    };

    let mut composer = FeatureComposer::new(embedder);
    composer.fit(&texts)?;
    let features = composer.features(&texts)?;
    let feature_width = composer.width()?;
    info!(rows = features.nrows(), width = feature_width, embedding = embedding_kind, "features composed");

    let (x_train, y_train, x_val, y_val) =
        train_validation_split(&features, &labels, args.val_ratio, args.seed)?;

    let config = ClassifierConfig::new(feature_width)
        .with_hidden_dims(args.hidden.clone())
        .with_dropout(args.dropout);
    let mut model = RiskClassifier::new(config)?;
    println!("{}", model.summary());

    let trainer = Trainer::new(TrainerConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        patience: args.patience,
        checkpoint_path: args.model.clone(),
        threshold: args.threshold,
    })?;
    let mut optimizer = Adam::new(args.learning_rate);

    let result = trainer.train(&mut model, &mut optimizer, &x_train, &y_train, &x_val, &y_val)?;

    // Score the checkpointed best epoch, not whatever the last epoch left
    // in memory
    let mut best = RiskClassifier::load(&args.model)?;
    let probabilities = best.predict(&x_val)?;
    let metrics = evaluate(&probabilities, &y_val, args.threshold);

    println!();
    println!(
        "training finished: {} epochs, best validation loss {:.6} at epoch {}{}",
        result.epochs_completed,
        result.best_val_loss,
        result.best_epoch,
        if result.early_stopped {
            " (stopped early)"
        } else {
            ""
        }
    );
    println!("{}", metrics.summary());
    println!("{}", metrics.per_class_table());

    if let Embedder::Lexical(vectorizer) = composer.embedder() {
        vectorizer.save(&args.vectorizer)?;
        info!(path = %args.vectorizer.display(), "vectorizer saved");
    }

    let summary = TrainingSummary {
        version: secreq::VERSION,
        completed_at: chrono::Utc::now(),
        feature_width,
        embedding: embedding_kind,
        result: &result,
        metrics: &metrics,
    };
    write_summary(&args.summary, &summary)?;
    info!(path = %args.summary.display(), "run summary saved");

    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let dataset = RequirementDataset::from_csv(&args.data)?;
    let texts = dataset.texts();
    let labels = dataset.label_matrix();

    let embedder = build_embedder(&args.embedder, LexicalInit::Saved { path: &args.vectorizer })?;
    let mut composer = FeatureComposer::new(embedder);
    let features = composer.features(&texts)?;

    let mut model = RiskClassifier::load(&args.model)?;
    let probabilities = model.predict(&features)?;
    let metrics = evaluate(&probabilities, &labels, args.threshold);

    println!("evaluated {} requirements from {}", dataset.len(), args.data.display());
    println!("{}", metrics.summary());
    println!("{}", metrics.per_class_table());

    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    let mut model = RiskClassifier::load(&args.model)?;
    let graph = export_graph(&model);
    graph.verify_against(&mut model, 8)?;
    graph.save(&args.output)?;

    info!(
        input = %graph.input_name,
        output = %graph.output_name,
        ops = graph.ops.len(),
        path = %args.output.display(),
        "inference graph exported"
    );
    println!(
        "exported {} ops ({} -> {} wide) to {}",
        graph.ops.len(),
        graph.input_dim,
        graph.output_dim,
        args.output.display()
    );

    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let mut texts = args.text.clone();
    if let Some(path) = &args.input {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        texts.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }
    if texts.is_empty() {
        bail!("no requirement texts given; use --text or --input");
    }

    let embedder = build_embedder(&args.embedder, LexicalInit::Saved { path: &args.vectorizer })?;
    let mut composer = FeatureComposer::new(embedder);
    let features = composer.features(&texts)?;

    let mut model = RiskClassifier::load(&args.model)?;
    let probabilities = model.predict(&features)?;

    for (i, text) in texts.iter().enumerate() {
        let flagged: Vec<String> = RiskCategory::ALL
            .iter()
            .enumerate()
            .filter(|(j, _)| probabilities[[i, *j]] > args.threshold)
            .map(|(j, category)| format!("{} {:.2}", category.short_name(), probabilities[[i, j]]))
            .collect();

        println!("{}", text);
        if flagged.is_empty() {
            println!("  no risks flagged");
        } else {
            println!("  {}", flagged.join(", "));
        }
    }

    Ok(())
}

fn init_logging(filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    info!(version = secreq::VERSION, "secreq starting");

    match cli.command {
        Command::Train(args) => run_train(args),
        Command::Evaluate(args) => run_evaluate(args),
        Command::Export(args) => run_export(args),
        Command::Predict(args) => run_predict(args),
    }
}
