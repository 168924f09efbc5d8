use std::collections::HashSet;

use rand::rngs::OsRng;
use rand::Rng;

use crate::config::CheckMode;
use crate::playlist::SegmentRef;

/// Reduce a variant's segments to the ones that will be fetched.
///
/// `random` draws `min(sample, len)` distinct positions from the OS CSPRNG;
/// the picks keep playlist order.
pub fn select_segments(segments: &[SegmentRef], mode: CheckMode, sample: usize) -> Vec<SegmentRef> {
    if segments.is_empty() {
        return Vec::new();
    }
    match mode {
        CheckMode::All => segments.to_vec(),
        CheckMode::FirstLast => {
            let mut picked = vec![segments[0].clone()];
            if segments.len() > 1 {
                picked.push(segments[segments.len() - 1].clone());
            }
            picked
        }
        CheckMode::Random => {
            let mut indices: Vec<usize> = random_indices(segments.len(), sample).into_iter().collect();
            indices.sort_unstable();
            indices.into_iter().map(|i| segments[i].clone()).collect()
        }
    }
}

fn random_indices(len: usize, sample: usize) -> HashSet<usize> {
    let want = sample.min(len);
    let mut rng = OsRng;
    let mut picked = HashSet::with_capacity(want);
    while picked.len() < want {
        picked.insert(rng.gen_range(0..len));
    }
    picked
}
