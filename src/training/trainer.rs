// Copyright 2018 The naive-nmt Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::hparams::{HParams, OptimizerType};
use crate::inputters::{Batch, Inputter, Mode};
use crate::models::{BasicModel, LossOutput, SequenceToSequence};
use crate::{Config, NmtError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::nn::OptimizerConfig;
use tch::{nn, Device};

pub const MODEL_CHECKPOINT: &str = "model.ot";
pub const HPARAMS_FILE: &str = "hparams.json";

/// Statistics of a single training step.
#[derive(Debug, Clone, Copy)]
pub struct StepOutput {
    /// Loss of the batch (summed over tokens, divided by the batch size)
    pub loss: f64,
    pub predict_count: i64,
    pub batch_size: i64,
}

/// Accumulates step statistics between two reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrainingStats {
    total_loss: f64,
    predict_count: i64,
    num_sentences: i64,
    num_steps: i64,
}

impl TrainingStats {
    pub fn update(&mut self, step: &StepOutput) {
        self.total_loss += step.loss * step.batch_size as f64;
        self.predict_count += step.predict_count;
        self.num_sentences += step.batch_size;
        self.num_steps += 1;
    }

    /// Average per-sentence loss.
    pub fn loss(&self) -> f64 {
        if self.num_sentences > 0 {
            self.total_loss / self.num_sentences as f64
        } else {
            f64::NAN
        }
    }

    pub fn perplexity(&self) -> f64 {
        perplexity(self.total_loss, self.predict_count)
    }

    pub fn num_steps(&self) -> i64 {
        self.num_steps
    }
}

/// `exp(total_loss / predict_count)`, infinite when nothing was predicted.
pub fn perplexity(total_loss: f64, predict_count: i64) -> f64 {
    if predict_count > 0 {
        (total_loss / predict_count as f64).exp()
    } else {
        f64::INFINITY
    }
}

/// # Training loop
/// Owns the model, the variable store of the encoder and decoder, and one optimizer per
/// variable store (model and embeddings).
pub struct Trainer<I: Inputter> {
    model: SequenceToSequence<I>,
    var_store: nn::VarStore,
    optimizers: Vec<nn::Optimizer>,
    hparams: HParams,
}

fn build_optimizer(
    var_store: &nn::VarStore,
    hparams: &HParams,
) -> Result<nn::Optimizer, NmtError> {
    let optimizer = match hparams.optimizer {
        OptimizerType::Sgd => nn::Sgd::default().build(var_store, hparams.learning_rate)?,
        OptimizerType::Adam => nn::Adam::default().build(var_store, hparams.learning_rate)?,
    };
    Ok(optimizer)
}

impl<I: Inputter> Trainer<I> {
    /// Builds the optimizers for `var_store` and for the embedding variable stores of `model`.
    pub fn new(
        model: SequenceToSequence<I>,
        var_store: nn::VarStore,
        hparams: &HParams,
    ) -> Result<Trainer<I>, NmtError> {
        let mut optimizers = vec![build_optimizer(&var_store, hparams)?];
        for embedding_store in model.embedding().var_stores() {
            optimizers.push(build_optimizer(embedding_store, hparams)?);
        }
        tracing::info!(
            "{:?} optimizer over {} variable stores, learning rate {}",
            hparams.optimizer,
            optimizers.len(),
            hparams.learning_rate
        );
        Ok(Trainer {
            model,
            var_store,
            optimizers,
            hparams: hparams.clone(),
        })
    }

    pub fn model(&self) -> &SequenceToSequence<I> {
        &self.model
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    pub fn into_parts(self) -> (SequenceToSequence<I>, nn::VarStore) {
        (self.model, self.var_store)
    }

    /// Forward pass, backward pass and parameter update on one batch. Gradients are clipped to
    /// `max_gradient_norm` before the update.
    pub fn train_step(&mut self, batch: &Batch) -> Result<StepOutput, NmtError> {
        let logits = self.model.forward_t(batch, true)?;
        let LossOutput {
            loss,
            predict_count,
        } = self.model.compute_loss(&logits, batch)?;

        for optimizer in self.optimizers.iter_mut() {
            optimizer.zero_grad();
        }
        loss.backward();
        for optimizer in self.optimizers.iter_mut() {
            if self.hparams.max_gradient_norm > 0.0 {
                optimizer.clip_grad_norm(self.hparams.max_gradient_norm);
            }
            optimizer.step();
        }

        Ok(StepOutput {
            loss: loss.double_value(&[]),
            predict_count,
            batch_size: batch.batch_size(),
        })
    }

    /// Perplexity of the model over the batches of `mode`, without dropout.
    pub fn evaluate(&self, mode: Mode) -> Result<f64, NmtError> {
        let mut stats = TrainingStats::default();
        for batch in self.model.inputter().iterator(mode, &self.hparams, 0)? {
            let step = tch::no_grad(|| -> Result<StepOutput, NmtError> {
                let logits = self.model.forward_t(&batch, false)?;
                let output = self.model.compute_loss(&logits, &batch)?;
                Ok(StepOutput {
                    loss: output.loss.double_value(&[]),
                    predict_count: output.predict_count,
                    batch_size: batch.batch_size(),
                })
            })?;
            stats.update(&step);
        }
        if stats.num_steps() == 0 {
            return Err(NmtError::ValueError(format!(
                "no {:?} batches to evaluate",
                mode
            )));
        }
        Ok(stats.perplexity())
    }

    /// Runs `num_train_steps` steps, cycling over the training data. Statistics are logged
    /// every `steps_per_stats` steps; every `steps_per_external_eval` steps the dev set is
    /// evaluated (when configured) and a checkpoint is written to `out_dir`.
    pub fn train(&mut self) -> Result<TrainingStats, NmtError> {
        let mut epoch = 0;
        let mut batches = self.model.inputter().iterator(Mode::Train, &self.hparams, epoch)?;
        if batches.len() == 0 {
            return Err(NmtError::ValueError("no training batches".into()));
        }
        let has_dev_data =
            self.hparams.source_dev_file.is_some() && self.hparams.target_dev_file.is_some();

        let mut overall = TrainingStats::default();
        let mut window = TrainingStats::default();
        let mut window_start = Instant::now();
        for global_step in 1..=self.hparams.num_train_steps {
            let batch = match batches.next() {
                Some(batch) => batch,
                None => {
                    epoch += 1;
                    tracing::info!("starting epoch {} at step {}", epoch, global_step);
                    batches = self
                        .model
                        .inputter()
                        .iterator(Mode::Train, &self.hparams, epoch)?;
                    batches
                        .next()
                        .ok_or_else(|| NmtError::ValueError("no training batches".into()))?
                }
            };

            let step = self.train_step(&batch)?;
            tracing::debug!(
                "step {} batch {} loss {:.4}",
                global_step,
                step.batch_size,
                step.loss
            );
            overall.update(&step);
            window.update(&step);

            if self.hparams.steps_per_stats > 0 && global_step % self.hparams.steps_per_stats == 0
            {
                tracing::info!(
                    "step {} epoch {} loss {:.2} ppl {:.2} step-time {:.3}s",
                    global_step,
                    epoch,
                    window.loss(),
                    window.perplexity(),
                    window_start.elapsed().as_secs_f64() / window.num_steps() as f64
                );
                window = TrainingStats::default();
                window_start = Instant::now();
            }

            if self.hparams.steps_per_external_eval > 0
                && global_step % self.hparams.steps_per_external_eval == 0
            {
                if has_dev_data {
                    let dev_ppl = self.evaluate(Mode::Eval)?;
                    tracing::info!("step {} dev ppl {:.2}", global_step, dev_ppl);
                }
                self.save(&self.hparams.out_dir)?;
            }
        }

        self.save(&self.hparams.out_dir)?;
        tracing::info!(
            "done training {} steps, loss {:.2} ppl {:.2}",
            overall.num_steps(),
            overall.loss(),
            overall.perplexity()
        );
        Ok(overall)
    }

    /// Writes `model.ot`, the embedding checkpoints and `hparams.json` to `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), NmtError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.var_store.save(dir.join(MODEL_CHECKPOINT))?;
        self.model.embedding().save(dir)?;
        self.hparams.to_file(dir.join(HPARAMS_FILE))?;
        tracing::info!("saved checkpoint to {}", dir.display());
        Ok(())
    }
}

/// Restores a `BasicModel` written by [`Trainer::save`].
///
/// # Arguments
///
/// * `checkpoint_dir` - directory holding `model.ot`, the embeddings and `hparams.json`
/// * `device` - device of the encoder and decoder
/// * `infer_file` - file to translate with `BasicModel::infer_file`
pub fn load_basic_model<P: AsRef<Path>>(
    checkpoint_dir: P,
    device: Device,
    infer_file: Option<PathBuf>,
) -> Result<(BasicModel, nn::VarStore), NmtError> {
    let checkpoint_dir = checkpoint_dir.as_ref();
    let hparams = HParams::from_file(checkpoint_dir.join(HPARAMS_FILE))?;
    let mut var_store = nn::VarStore::new(device);
    let mut model = BasicModel::new(var_store.root(), &hparams, infer_file)?;
    var_store.load(checkpoint_dir.join(MODEL_CHECKPOINT))?;
    model.embedding_mut().load(checkpoint_dir)?;
    tracing::info!("loaded model from {}", checkpoint_dir.display());
    Ok((model, var_store))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn perplexity_of_uniform_predictions() {
        let loss_per_token = (4f64).ln();
        assert!((perplexity(loss_per_token * 10.0, 10) - 4.0).abs() < 1e-9);
        assert!(perplexity(1.0, 0).is_infinite());
    }

    #[test]
    fn stats_weight_losses_by_batch_size() {
        let mut stats = TrainingStats::default();
        stats.update(&StepOutput {
            loss: 2.0,
            predict_count: 4,
            batch_size: 1,
        });
        stats.update(&StepOutput {
            loss: 1.0,
            predict_count: 4,
            batch_size: 3,
        });
        assert_eq!(stats.num_steps(), 2);
        assert!((stats.loss() - 1.25).abs() < 1e-12);
        assert!((stats.perplexity() - (5.0f64 / 8.0).exp()).abs() < 1e-12);
    }
}
