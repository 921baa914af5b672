//! Merging detector outputs into one canonical library list.
//!
//! Candidates group by lowercase name and the maximum under a strict
//! (version-presence, source-kind) ranking wins, so the result is
//! deterministic regardless of detector execution order. Version presence
//! dominates: a concrete version from any source beats the "unknown"
//! sentinel from any other. Among equal version-presence, sources rank
//! runtime > signature-content > signature-file > static-url. Candidates of
//! equal rank keep the first-seen entry, preserving the historical
//! first-wins tie-break for same-rank detections.

use crate::types::{DetectionSource, LibraryCandidate};
use std::collections::HashMap;

/// Merge detector outputs (static, runtime, signature, in that order) into
/// at most one candidate per case-insensitive name. Output preserves the
/// order in which names were first seen.
pub fn merge_candidates(candidates: Vec<LibraryCandidate>) -> Vec<LibraryCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, LibraryCandidate> = HashMap::new();

    for candidate in candidates {
        let key = candidate.name.to_lowercase();
        match by_name.get(&key) {
            None => {
                order.push(key.clone());
                by_name.insert(key, candidate);
            }
            Some(retained) => {
                if rank(&candidate) > rank(retained) {
                    by_name.insert(key, candidate);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_name.remove(&key))
        .collect()
}

/// Replacement ranking: version presence first, then source kind.
fn rank(candidate: &LibraryCandidate) -> (bool, u8) {
    (candidate.has_version(), source_rank(candidate.source))
}

fn source_rank(source: DetectionSource) -> u8 {
    match source {
        DetectionSource::Runtime => 3,
        DetectionSource::SignatureContent => 2,
        DetectionSource::SignatureFile => 1,
        DetectionSource::StaticUrl => 0,
    }
}
