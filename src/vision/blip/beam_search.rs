// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Beam search over decoder logits
//!
//! The search only sees a step function that maps the current beams to
//! next-token logits, so it is independent of the ONNX session and can be
//! driven by scripted logits in tests.

use anyhow::Result;
use tracing::debug;

use crate::vision::provider::GenerationOptions;

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f32,
}

/// Finished hypotheses, capped at `num_beams`
struct Hypotheses {
    num_beams: usize,
    length_penalty: f32,
    early_stopping: bool,
    beams: Vec<(f32, Vec<u32>)>,
    worst_score: f32,
}

impl Hypotheses {
    fn new(options: &GenerationOptions, num_beams: usize) -> Self {
        Self {
            num_beams,
            length_penalty: options.length_penalty,
            early_stopping: options.early_stopping,
            beams: Vec::with_capacity(num_beams + 1),
            worst_score: f32::INFINITY,
        }
    }

    fn len(&self) -> usize {
        self.beams.len()
    }

    fn normalized(&self, sum_logprobs: f32, length: usize) -> f32 {
        sum_logprobs / (length.max(1) as f32).powf(self.length_penalty)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f32) {
        let score = self.normalized(sum_logprobs, tokens.len());
        if self.beams.len() < self.num_beams || score > self.worst_score {
            self.beams.push((score, tokens));
            if self.beams.len() > self.num_beams {
                let worst = self
                    .beams
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                    .map(|(i, _)| i);
                if let Some(i) = worst {
                    self.beams.swap_remove(i);
                }
            }
            self.worst_score = self
                .beams
                .iter()
                .map(|(s, _)| *s)
                .fold(f32::INFINITY, f32::min);
        }
    }

    fn is_done(&self, best_sum_logprobs: f32, cur_len: usize) -> bool {
        if self.beams.len() < self.num_beams {
            return false;
        }
        if self.early_stopping {
            return true;
        }
        self.normalized(best_sum_logprobs, cur_len) <= self.worst_score
    }

    fn best(self) -> Option<Vec<u32>> {
        self.beams
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, tokens)| tokens)
    }
}

/// Run beam search starting from `[bos]`
///
/// `step` receives the running sequences (all the same length) and must
/// return one logit row per sequence. The returned tokens start with
/// `bos` and never contain `eos`.
///
/// # Errors
/// Propagates step failures, and fails if the step returns the wrong
/// number of rows or no hypothesis survives.
pub fn beam_search<F>(options: &GenerationOptions, bos: u32, eos: u32, mut step: F) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    let num_beams = options.num_beams.max(1);
    let mut running = vec![Beam {
        tokens: vec![bos],
        score: 0.0,
    }];
    let mut hypotheses = Hypotheses::new(options, num_beams);
    let mut done = false;

    while running[0].tokens.len() < options.max_length {
        let cur_len = running[0].tokens.len();
        let sequences: Vec<Vec<u32>> = running.iter().map(|b| b.tokens.clone()).collect();
        let logits = step(&sequences)?;
        if logits.len() != running.len() {
            anyhow::bail!(
                "Decoder returned {} logit rows for {} beams",
                logits.len(),
                running.len()
            );
        }

        // Candidates as (total score, beam index, token)
        let mut candidates: Vec<(f32, usize, u32)> = Vec::new();
        for (beam_idx, (beam, row)) in running.iter().zip(logits.iter()).enumerate() {
            let mut scores = log_softmax(row);
            if cur_len < options.min_length {
                if let Some(s) = scores.get_mut(eos as usize) {
                    *s = f32::NEG_INFINITY;
                }
            }
            for banned in banned_ngram_tokens(&beam.tokens, options.no_repeat_ngram_size) {
                if let Some(s) = scores.get_mut(banned as usize) {
                    *s = f32::NEG_INFINITY;
                }
            }
            for (token, logprob) in top_k(&scores, 2 * num_beams) {
                candidates.push((beam.score + logprob, beam_idx, token as u32));
            }
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(2 * num_beams);

        let best_candidate = match candidates.first() {
            Some(c) => c.0,
            None => break,
        };

        let mut next = Vec::with_capacity(num_beams);
        for (rank, (score, beam_idx, token)) in candidates.into_iter().enumerate() {
            if token == eos {
                if rank < num_beams {
                    hypotheses.add(running[beam_idx].tokens.clone(), score);
                }
                continue;
            }
            let mut tokens = running[beam_idx].tokens.clone();
            tokens.push(token);
            next.push(Beam { tokens, score });
            if next.len() == num_beams {
                break;
            }
        }

        if hypotheses.is_done(best_candidate, cur_len) {
            debug!("Beam search converged at length {}", cur_len);
            done = true;
            break;
        }
        if next.is_empty() {
            break;
        }
        running = next;
    }

    if !done {
        for beam in running {
            hypotheses.add(beam.tokens, beam.score);
        }
    }

    debug!("Beam search finished with {} hypotheses", hypotheses.len());
    hypotheses
        .best()
        .ok_or_else(|| anyhow::anyhow!("Beam search produced no hypothesis"))
}

/// Tokens that would repeat an n-gram already present in `tokens`
pub fn banned_ngram_tokens(tokens: &[u32], ngram_size: usize) -> Vec<u32> {
    if ngram_size == 0 || tokens.len() + 1 < ngram_size {
        return Vec::new();
    }
    let prefix = &tokens[tokens.len() + 1 - ngram_size..];
    tokens
        .windows(ngram_size)
        .filter(|window| &window[..ngram_size - 1] == prefix)
        .map(|window| window[ngram_size - 1])
        .collect()
}

/// Numerically stable log-softmax
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|&x| x - log_sum).collect()
}

/// The `k` largest finite scores with their indices, best first
fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .collect();
    if indexed.len() > k && k > 0 {
        indexed.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
    }
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed
}
