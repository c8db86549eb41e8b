//! The individual sampling stages, in the order the pipeline runs them.
//!
//! Ordering ties between equal scores always resolves to the lowest token id.

use std::cmp::Ordering;
use std::collections::HashMap;

use parley_abi::Token;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub token: Token,
    pub logit: f32,
}

/// Repetition, frequency and presence penalties over raw scores.
///
/// For each distinct token `t` in `window`: positive scores are divided by
/// `repeat`, others multiplied by it; then `count(t) * frequency` and
/// `presence` are subtracted. Tokens outside `logits` are ignored.
pub fn apply_penalties(
    logits: &mut [f32],
    window: &[Token],
    repeat: f32,
    frequency: f32,
    presence: f32,
) {
    let mut counts: HashMap<Token, usize> = HashMap::with_capacity(window.len());
    for &t in window {
        *counts.entry(t).or_insert(0) += 1;
    }
    for (token, count) in counts {
        let Some(slot) = token.index().and_then(|i| logits.get_mut(i)) else {
            continue;
        };
        if *slot > 0.0 {
            *slot /= repeat;
        } else {
            *slot *= repeat;
        }
        *slot -= count as f32 * frequency;
        *slot -= presence;
    }
}

/// One candidate per finite score, in token-id order.
pub fn candidates_from(logits: &[f32]) -> Vec<Candidate> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .map(|(i, &logit)| Candidate {
            token: Token(i as i32),
            logit,
        })
        .collect()
}

#[inline]
fn by_score_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.logit
        .partial_cmp(&a.logit)
        .unwrap_or(Ordering::Equal)
        .then(a.token.cmp(&b.token))
}

pub fn sort_desc(cands: &mut [Candidate]) {
    cands.sort_by(by_score_desc);
}

/// Keep the `k` best candidates. No-op for `k == 0` or `k >= len`.
pub fn top_k(cands: &mut Vec<Candidate>, k: usize) {
    if k == 0 || k >= cands.len() {
        return;
    }
    sort_desc(cands);
    cands.truncate(k);
}

/// Keep the smallest best-first prefix whose probability mass reaches `p`
/// (always at least one candidate). No-op for `p >= 1.0`.
pub fn top_p(cands: &mut Vec<Candidate>, p: f32) {
    if p >= 1.0 || cands.is_empty() {
        return;
    }
    sort_desc(cands);
    let probs = softmax(cands);
    let target = f64::from(p);
    let mut cum = 0.0;
    let mut keep = cands.len();
    for (i, prob) in probs.iter().enumerate() {
        cum += prob;
        if cum >= target {
            keep = i + 1;
            break;
        }
    }
    cands.truncate(keep.max(1));
}

pub fn apply_temperature(cands: &mut [Candidate], temperature: f32) {
    for c in cands {
        c.logit /= temperature;
    }
}

/// Highest score, lowest id on ties.
pub fn greedy(cands: &[Candidate]) -> Option<Candidate> {
    cands.iter().copied().min_by(by_score_desc)
}

/// Normalized probabilities for `cands`, same order.
pub fn softmax(cands: &[Candidate]) -> Vec<f64> {
    let max = cands
        .iter()
        .map(|c| f64::from(c.logit))
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = cands
        .iter()
        .map(|c| (f64::from(c.logit) - max).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![1.0 / cands.len() as f64; cands.len()]
    }
}
