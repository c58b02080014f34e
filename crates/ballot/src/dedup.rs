//! Optional near-duplicate filter over ballot candidates.
//!
//! Disabled by default: ballots tolerate visually duplicate submissions
//! unless `ballot.dedup_enabled` is set.

use contest_core::types::Photo;

/// Hamming distance between two 64-bit perceptual hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Keep the first photo of every group of near-duplicates, preserving order.
/// Photos without a hash are always kept.
pub fn drop_near_duplicates(candidates: Vec<Photo>, max_distance: u32) -> Vec<Photo> {
    let mut kept_hashes: Vec<u64> = Vec::new();
    candidates
        .into_iter()
        .filter(|photo| match photo.phash {
            None => true,
            Some(hash) => {
                if kept_hashes
                    .iter()
                    .any(|&kept| hamming_distance(kept, hash) <= max_distance)
                {
                    false
                } else {
                    kept_hashes.push(hash);
                    true
                }
            }
        })
        .collect()
}
