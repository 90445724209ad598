//! Training loop and checkpointing for the tagger.

use std::fs;
use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};

use kotoba_core::{DatasetTransformer, EncodedSentence, ModelConfig, Tagger, Vocabulary};

use crate::data::RawSentence;

/// Knobs of one training run.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seeds both the epoch shuffle and the model's dropout masks.
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 8,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// Owns a [`Tagger`] together with the `VarMap` its parameters live in, so
/// the optimizer and the checkpoint see the same flat parameter set.
pub struct Trainer {
    varmap: VarMap,
    model: Tagger,
    config: ModelConfig,
    vocab: Vocabulary,
}

impl Trainer {
    /// Build a fresh model sized to the vocabulary.
    pub fn new(config: ModelConfig, vocab: Vocabulary, device: &Device) -> anyhow::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Tagger::new(
            &config,
            vocab.num_words(),
            vocab.num_chars(),
            vocab.num_tags(),
            vb,
        )?;
        Ok(Self {
            varmap,
            model,
            config,
            vocab,
        })
    }

    pub fn model(&self) -> &Tagger {
        &self.model
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Run the epoch loop: shuffled mini-batches, AdamW steps on the mean
    /// per-batch negative log-likelihood, per-epoch token accuracy.
    pub fn train(&mut self, corpus: &[RawSentence], options: &TrainOptions) -> anyhow::Result<()> {
        anyhow::ensure!(!corpus.is_empty(), "training corpus is empty");

        let transformer = DatasetTransformer::new(&self.vocab);
        let encoded = corpus
            .iter()
            .map(|s| transformer.encode(&s.tokens, &s.tags))
            .collect::<kotoba_core::Result<Vec<EncodedSentence>>>()?;

        self.model.set_seed(options.seed);
        let mut rng = oorandom::Rand32::new(options.seed);
        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: options.learning_rate,
                ..Default::default()
            },
        )?;

        let batch_size = options.batch_size.max(1);
        let mut indices: Vec<usize> = (0..encoded.len()).collect();

        for epoch in 1..=options.epochs {
            shuffle(&mut indices, &mut rng);

            let mut total_loss = 0.0f64;
            let mut batches = 0usize;
            for chunk in indices.chunks(batch_size) {
                let batch: Vec<EncodedSentence> =
                    chunk.iter().map(|&i| encoded[i].clone()).collect();
                let loss = self.model.loss(&batch)?;
                optimizer.backward_step(&loss)?;
                total_loss += f64::from(loss.to_scalar::<f32>()?);
                batches += 1;
            }

            let accuracy = self.token_accuracy(&encoded)?;
            tracing::info!(
                epoch,
                epochs = options.epochs,
                mean_loss = total_loss / batches as f64,
                accuracy_pct = accuracy * 100.0,
                "epoch complete"
            );
        }

        Ok(())
    }

    /// Token-level accuracy of greedy re-tagging, for progress reporting.
    fn token_accuracy(&self, encoded: &[EncodedSentence]) -> anyhow::Result<f64> {
        let mut correct = 0usize;
        let mut total = 0usize;
        for sentence in encoded {
            let paths = self.model.predict(std::slice::from_ref(sentence))?;
            for (predicted, gold) in paths[0].iter().zip(&sentence.tags) {
                if predicted == gold {
                    correct += 1;
                }
                total += 1;
            }
        }
        Ok(if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        })
    }

    /// Write the checkpoint directory: all learned parameters as safetensors
    /// plus the config and vocabulary needed to rebuild the model.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.varmap.save(dir.join("model.safetensors"))?;
        fs::write(
            dir.join("config.json"),
            serde_json::to_string_pretty(&self.config)?,
        )?;
        self.vocab.save(dir.join("vocab.json"))?;
        tracing::info!(dir = %dir.display(), "checkpoint saved");
        Ok(())
    }

    /// Restore a checkpoint written by [`Trainer::save`].
    pub fn load<P: AsRef<Path>>(dir: P, device: &Device) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let config: ModelConfig =
            serde_json::from_str(&fs::read_to_string(dir.join("config.json"))?)?;
        let vocab = Vocabulary::load(dir.join("vocab.json"))?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        // Registers every parameter with its shape; load then fills them in.
        let model = Tagger::new(
            &config,
            vocab.num_words(),
            vocab.num_chars(),
            vocab.num_tags(),
            vb,
        )?;
        varmap.load(dir.join("model.safetensors"))?;

        Ok(Self {
            varmap,
            model,
            config,
            vocab,
        })
    }
}

/// Fisher-Yates with the run's seeded RNG.
fn shuffle(indices: &mut [usize], rng: &mut oorandom::Rand32) {
    for i in (1..indices.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        indices.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::build_vocabulary;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn toy_corpus() -> Vec<RawSentence> {
        vec![
            RawSentence {
                tokens: strings(&["John", "lives"]),
                tags: strings(&["B-PER", "O"]),
            },
            RawSentence {
                tokens: strings(&["Paris"]),
                tags: strings(&["B-LOC"]),
            },
        ]
    }

    fn toy_config() -> ModelConfig {
        ModelConfig {
            word_dim: Some(8),
            char_dim: Some(4),
            word_hidden_dim: 6,
            char_hidden_dim: 3,
            dropout_rate: 0.25,
        }
    }

    #[test]
    fn training_runs_and_predicts_full_length_paths() {
        let corpus = toy_corpus();
        let vocab = build_vocabulary(&corpus);
        let mut trainer = Trainer::new(toy_config(), vocab, &Device::Cpu).unwrap();

        let options = TrainOptions {
            epochs: 2,
            batch_size: 2,
            learning_rate: 1e-2,
            seed: 7,
        };
        trainer.train(&corpus, &options).unwrap();

        let transformer = DatasetTransformer::new(trainer.vocab());
        let encoded = transformer
            .encode(&corpus[0].tokens, &corpus[0].tags)
            .unwrap();
        let paths = trainer.model().predict(&[encoded]).unwrap();
        assert_eq!(paths[0].len(), 2);
    }

    #[test]
    fn checkpoint_round_trips_predictions() {
        let corpus = toy_corpus();
        let vocab = build_vocabulary(&corpus);
        let mut trainer = Trainer::new(toy_config(), vocab, &Device::Cpu).unwrap();
        trainer
            .train(
                &corpus,
                &TrainOptions {
                    epochs: 1,
                    batch_size: 2,
                    learning_rate: 1e-2,
                    seed: 7,
                },
            )
            .unwrap();

        let dir = std::env::temp_dir().join(format!("kotoba-trainer-test-{}", std::process::id()));
        trainer.save(&dir).unwrap();
        let restored = Trainer::load(&dir, &Device::Cpu).unwrap();
        let _ = fs::remove_dir_all(&dir);

        let transformer = DatasetTransformer::new(trainer.vocab());
        let encoded = transformer
            .encode(&corpus[0].tokens, &corpus[0].tags)
            .unwrap();
        let before = trainer.model().predict(std::slice::from_ref(&encoded)).unwrap();
        let after = restored.model().predict(&[encoded]).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let mut a: Vec<usize> = (0..10).collect();
        let mut b: Vec<usize> = (0..10).collect();
        let mut rng_a = oorandom::Rand32::new(3);
        let mut rng_b = oorandom::Rand32::new(3);
        shuffle(&mut a, &mut rng_a);
        shuffle(&mut b, &mut rng_b);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let vocab = build_vocabulary(&[]);
        // An empty vocabulary has no tags, so the model itself cannot be
        // built either; construct from a real vocabulary instead.
        assert_eq!(vocab.num_tags(), 0);

        let corpus = toy_corpus();
        let vocab = build_vocabulary(&corpus);
        let mut trainer = Trainer::new(toy_config(), vocab, &Device::Cpu).unwrap();
        assert!(trainer.train(&[], &TrainOptions::default()).is_err());
    }
}
