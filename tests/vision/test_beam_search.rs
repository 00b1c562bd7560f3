// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Beam search driven by a scripted next-token table

use anyhow::Result;
use fabstir_caption_node::vision::blip::beam_search::beam_search;
use fabstir_caption_node::vision::GenerationOptions;
use std::collections::HashSet;

const BOS: u32 = 1;
const EOS: u32 = 2;
const VOCAB: usize = 8;

// 3 "a", 4 "dog", 5 "on", 6 "the", 7 "beach"
fn preferred_next(last: u32) -> u32 {
    match last {
        BOS => 3,
        3 => 4,
        4 => 5,
        5 => 6,
        6 => 7,
        _ => EOS,
    }
}

fn scripted(seqs: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
    Ok(seqs
        .iter()
        .map(|seq| {
            // EOS is only ever likely where the script puts it
            let mut row = vec![0.0; VOCAB];
            row[EOS as usize] = -30.0;
            let last = *seq.last().unwrap_or(&BOS);
            row[preferred_next(last) as usize] = 10.0;
            row
        })
        .collect())
}

fn assert_no_repeated_bigram(tokens: &[u32]) {
    let mut seen = HashSet::new();
    for pair in tokens.windows(2) {
        assert!(seen.insert((pair[0], pair[1])), "bigram repeated in {:?}", tokens);
    }
}

#[test]
fn test_follows_script_to_eos() {
    let options = GenerationOptions {
        min_length: 1,
        ..GenerationOptions::for_max_length(20)
    };
    let tokens = beam_search(&options, BOS, EOS, scripted).unwrap();
    assert_eq!(tokens, vec![BOS, 3, 4, 5, 6, 7]);
}

#[test]
fn test_caption_options_force_longer_output() {
    // min_length is 10 for a bound of 20, so the early EOS is suppressed
    let options = GenerationOptions::for_max_length(20);
    let tokens = beam_search(&options, BOS, EOS, scripted).unwrap();

    assert!(tokens.len() >= options.min_length, "{:?}", tokens);
    assert!(tokens.len() <= options.max_length, "{:?}", tokens);
    assert!(!tokens.contains(&EOS));
    assert_eq!(tokens[0], BOS);
    assert_no_repeated_bigram(&tokens);
}

#[test]
fn test_every_bound_in_range_terminates() {
    for max_length in [20, 50, 100] {
        let options = GenerationOptions::for_max_length(max_length);
        let mut steps = 0;
        let tokens = beam_search(&options, BOS, EOS, |seqs: &[Vec<u32>]| -> Result<Vec<Vec<f32>>> {
            steps += 1;
            scripted(seqs)
        })
        .unwrap();

        assert!(tokens.len() <= max_length);
        assert!(steps < max_length);
        assert_no_repeated_bigram(&tokens);
    }
}

#[test]
fn test_step_error_propagates() {
    let options = GenerationOptions::default();
    let result = beam_search(&options, BOS, EOS, |_seqs: &[Vec<u32>]| -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("session failed")
    });
    assert!(result.unwrap_err().to_string().contains("session failed"));
}
