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

use crate::rnn::CellState;
use crate::NmtError;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::convert::TryFrom;
use tch::{Device, Kind, Tensor};

/// Length normalization of a hypothesis score: `((5 + length) / 6) ^ weight`.
pub fn length_penalty(length: usize, weight: f64) -> f64 {
    ((5.0 + length as f64) / 6.0).powf(weight)
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<i64>,
    log_prob: f64,
    finished: bool,
    /// Row of the previous step this hypothesis extends
    parent: i64,
}

impl Hypothesis {
    fn score(&self, length_penalty_weight: f64) -> f64 {
        self.log_prob / length_penalty(self.tokens.len(), length_penalty_weight)
    }
}

/// # Beam search settings
#[derive(Debug, Clone, Copy)]
pub struct BeamSearch {
    pub beam_width: i64,
    pub length_penalty_weight: f64,
    pub sos_id: i64,
    pub eos_id: i64,
    pub max_iterations: i64,
}

impl BeamSearch {
    /// Runs the search over a batch.
    ///
    /// Rows are laid out as `batch_index * beam_width + beam_index`: `initial_state` is tiled
    /// accordingly and `step` receives the last token of every row with the row states, and
    /// returns log-probabilities of shape `[batch * beam_width, vocab_size]` with the new
    /// states. Hypotheses are ranked by their length-penalized score and a finished hypothesis
    /// stays in the beam without being extended.
    ///
    /// # Returns
    ///
    /// * ids of the best hypothesis of every batch element, shape `[batch, length]`, padded
    ///   with `eos_id`
    pub fn search<F>(
        &self,
        initial_state: &[CellState],
        batch_size: i64,
        device: Device,
        mut step: F,
    ) -> Result<Tensor, NmtError>
    where
        F: FnMut(&Tensor, &[CellState]) -> (Tensor, Vec<CellState>),
    {
        let beam_width = self.beam_width.max(1);
        let num_rows = batch_size * beam_width;
        let mut states: Vec<CellState> = initial_state
            .iter()
            .map(|state| state.tile(beam_width))
            .collect();
        let mut beams: Vec<Vec<Hypothesis>> = (0..batch_size)
            .map(|batch_index| {
                vec![Hypothesis {
                    tokens: vec![],
                    log_prob: 0.0,
                    finished: false,
                    parent: batch_index * beam_width,
                }]
            })
            .collect();

        for _ in 0..self.max_iterations {
            if beams.iter().flatten().all(|hypothesis| hypothesis.finished) {
                break;
            }
            let mut input_ids = vec![self.sos_id; num_rows as usize];
            for (batch_index, beam) in beams.iter().enumerate() {
                for (beam_index, hypothesis) in beam.iter().enumerate() {
                    if let Some(last) = hypothesis.tokens.last() {
                        input_ids[batch_index * beam_width as usize + beam_index] = *last;
                    }
                }
            }
            let input_ids = Tensor::from_slice(&input_ids).to_device(device);

            let (log_probs, new_states) = step(&input_ids, &states);
            // a beam wider than the vocabulary expands every token
            let (_, vocab_size) = log_probs.size2()?;
            let num_expansions = beam_width.min(vocab_size).max(1);
            let (top_log_probs, top_ids) = log_probs.f_topk(num_expansions, -1, true, true)?;
            let top_log_probs = Vec::<f64>::try_from(
                &top_log_probs
                    .to_kind(Kind::Double)
                    .to_device(Device::Cpu)
                    .view([-1]),
            )?;
            let top_ids = Vec::<i64>::try_from(&top_ids.to_device(Device::Cpu).view([-1]))?;

            let mut parents = Vec::with_capacity(num_rows as usize);
            for (batch_index, beam) in beams.iter_mut().enumerate() {
                let mut candidates = Vec::with_capacity((beam_width * num_expansions) as usize);
                for (beam_index, hypothesis) in beam.iter().enumerate() {
                    let row = batch_index as i64 * beam_width + beam_index as i64;
                    if hypothesis.finished {
                        candidates.push(Hypothesis {
                            parent: row,
                            ..hypothesis.clone()
                        });
                        continue;
                    }
                    for rank in 0..num_expansions {
                        let position = (row * num_expansions + rank) as usize;
                        let token = top_ids[position];
                        let mut tokens = hypothesis.tokens.clone();
                        tokens.push(token);
                        candidates.push(Hypothesis {
                            tokens,
                            log_prob: hypothesis.log_prob + top_log_probs[position],
                            finished: token == self.eos_id,
                            parent: row,
                        });
                    }
                }
                candidates.sort_by_key(|hypothesis| {
                    Reverse(OrderedFloat(hypothesis.score(self.length_penalty_weight)))
                });
                candidates.truncate(beam_width as usize);

                let first_parent = candidates[0].parent;
                parents.extend(candidates.iter().map(|hypothesis| hypothesis.parent));
                parents.extend(
                    std::iter::repeat(first_parent).take(beam_width as usize - candidates.len()),
                );
                *beam = candidates;
            }

            let parents = Tensor::from_slice(&parents).to_device(device);
            states = new_states
                .iter()
                .map(|state| state.index_select(&parents))
                .collect();
        }

        let best: Vec<Vec<i64>> = beams
            .iter()
            .map(|beam| {
                beam.iter()
                    .max_by_key(|hypothesis| {
                        OrderedFloat(hypothesis.score(self.length_penalty_weight))
                    })
                    .map(|hypothesis| hypothesis.tokens.clone())
                    .unwrap_or_default()
            })
            .collect();
        Ok(pad_ids(&best, self.eos_id, device))
    }
}

/// Stacks id sequences into a `[batch, max_length]` tensor padded with `pad_id`.
pub fn pad_ids(sequences: &[Vec<i64>], pad_id: i64, device: Device) -> Tensor {
    let max_length = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(sequences.len() * max_length);
    for sequence in sequences {
        flat.extend_from_slice(sequence);
        flat.extend(std::iter::repeat(pad_id).take(max_length - sequence.len()));
    }
    Tensor::from_slice(&flat)
        .view([sequences.len() as i64, max_length as i64])
        .to_device(device)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn length_penalty_is_one_without_weight() {
        assert_eq!(length_penalty(7, 0.0), 1.0);
        assert!((length_penalty(7, 1.0) - 2.0).abs() < 1e-12);
    }

    // vocabulary: 0 = sos, 1 = eos, 2 and 3 regular tokens.
    // Greedy picks 2 first (0.6), but 3 followed by eos (0.4 * 1.0) beats 2 followed by
    // anything (0.6 * 0.5).
    fn toy_step(input_ids: &Tensor, states: &[CellState]) -> (Tensor, Vec<CellState>) {
        let rows: Vec<Tensor> = Vec::<i64>::try_from(input_ids)
            .unwrap()
            .into_iter()
            .map(|last| {
                let probs: [f32; 4] = match last {
                    0 => [1e-6, 1e-6, 0.6, 0.4],
                    2 => [1e-6, 0.5, 0.25, 0.25],
                    _ => [1e-6, 1.0, 1e-6, 1e-6],
                };
                Tensor::from_slice(&probs).log()
            })
            .collect();
        let states = states.iter().map(CellState::shallow_clone).collect();
        (Tensor::stack(&rows, 0), states)
    }

    fn toy_search(beam_width: i64) -> anyhow::Result<Tensor> {
        let search = BeamSearch {
            beam_width,
            length_penalty_weight: 0.0,
            sos_id: 0,
            eos_id: 1,
            max_iterations: 5,
        };
        let state = CellState::Gru(Tensor::zeros([1, 1], (Kind::Float, Device::Cpu)));
        Ok(search.search(&[state], 1, Device::Cpu, toy_step)?)
    }

    #[test]
    fn beam_search_finds_the_most_likely_sequence() -> anyhow::Result<()> {
        let ids = toy_search(2)?;

        assert_eq!(ids.size(), vec![1, 2]);
        assert_eq!(ids.int64_value(&[0, 0]), 3);
        assert_eq!(ids.int64_value(&[0, 1]), 1);
        Ok(())
    }

    #[test]
    fn beam_wider_than_vocabulary() -> anyhow::Result<()> {
        let ids = toy_search(5)?;

        assert_eq!(ids.size(), vec![1, 2]);
        assert_eq!(ids.int64_value(&[0, 0]), 3);
        assert_eq!(ids.int64_value(&[0, 1]), 1);
        Ok(())
    }

    #[test]
    fn pad_ids_fills_with_pad_token() {
        let ids = pad_ids(&[vec![4, 5, 6], vec![7]], 1, Device::Cpu);
        assert_eq!(ids.size(), vec![2, 3]);
        assert_eq!(ids.int64_value(&[1, 0]), 7);
        assert_eq!(ids.int64_value(&[1, 2]), 1);
    }
}
