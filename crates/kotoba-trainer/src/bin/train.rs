use std::path::PathBuf;

use anyhow::Context;
use candle_core::Device;
use clap::Parser;

use kotoba_core::ModelConfig;
use kotoba_trainer::{build_vocabulary, load_corpus, TrainOptions, Trainer};

/// Train a BiLSTM-CRF tagger on a `token tag` corpus.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Training corpus: one `token tag` pair per line, blank line between
    /// sentences.
    corpus: PathBuf,

    /// Model hyperparameter JSON (word_dim, char_dim, hidden dims, dropout).
    #[arg(long)]
    config: PathBuf,

    /// Checkpoint output directory.
    #[arg(long, default_value = "model")]
    out: PathBuf,

    #[arg(long, default_value_t = 10)]
    epochs: usize,

    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    lr: f64,

    /// Seed for the epoch shuffle and the dropout masks.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config: ModelConfig = serde_json::from_str(
        &std::fs::read_to_string(&args.config)
            .with_context(|| format!("cannot read config {}", args.config.display()))?,
    )?;

    let corpus = load_corpus(&args.corpus)?;
    tracing::info!(sentences = corpus.len(), "corpus loaded");
    let vocab = build_vocabulary(&corpus);
    tracing::info!(
        words = vocab.num_words(),
        chars = vocab.num_chars(),
        tags = vocab.num_tags(),
        "vocabulary built"
    );

    let mut trainer = Trainer::new(config, vocab, &Device::Cpu)?;
    trainer.train(
        &corpus,
        &TrainOptions {
            epochs: args.epochs,
            batch_size: args.batch_size,
            learning_rate: args.lr,
            seed: args.seed,
        },
    )?;
    trainer.save(&args.out)?;

    Ok(())
}
