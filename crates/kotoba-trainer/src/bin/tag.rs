use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use candle_core::Device;
use clap::Parser;

use kotoba_core::{write_prediction, DatasetTransformer};
use kotoba_trainer::{load_corpus, Trainer};

/// Tag a corpus with a trained checkpoint and write `token gold_tag
/// predicted_tag` lines, blank line between sentences.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Corpus to tag, in the same `token tag` format as training data.
    corpus: PathBuf,

    /// Checkpoint directory written by `train`.
    #[arg(long)]
    model: PathBuf,

    /// Prediction output file.
    #[arg(long, default_value = "predictions.txt")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let trainer = Trainer::load(&args.model, &Device::Cpu)?;
    let corpus = load_corpus(&args.corpus)?;
    let transformer = DatasetTransformer::new(trainer.vocab());

    let mut out = BufWriter::new(File::create(&args.out)?);
    for sentence in &corpus {
        let encoded = transformer.encode(&sentence.tokens, &sentence.tags)?;
        let paths = trainer.model().predict(std::slice::from_ref(&encoded))?;
        let predicted = paths[0]
            .iter()
            .map(|&id| trainer.vocab().tag(id).map(str::to_string))
            .collect::<kotoba_core::Result<Vec<String>>>()?;
        write_prediction(&mut out, &sentence.tokens, &sentence.tags, &predicted)?;
    }
    out.flush()?;
    tracing::info!(sentences = corpus.len(), out = %args.out.display(), "predictions written");

    Ok(())
}
