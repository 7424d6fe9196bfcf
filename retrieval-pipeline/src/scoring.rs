//! Reciprocal Rank Fusion (spec §4.11): `score(d) = Σ_ns 1/(k_rrf + rank_ns(d))`.
//! Grounded in the teacher's `retrieval-pipeline/src/scoring.rs` `Scored<T>`
//! shape, reworked here from a linearly-weighted `FusionWeights` blend onto
//! rank-based fusion — a document's contribution from a namespace depends
//! only on its position in that namespace's ranked list, never on the raw
//! distance value, which is what makes RRF robust to namespaces whose
//! distance scales differ.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use common::storage::vector::{VectorHit, VectorNamespace};

/// One namespace's search result, collapsed to the single best-ranked hit
/// per originating artifact (spec §4.11 step 4 "de-duplicate by original
/// document... keeping the best-ranked chunk").
#[derive(Debug, Clone)]
pub struct FusedDocument {
    pub document_key: String,
    pub representative: VectorHit,
    pub representative_namespace: VectorNamespace,
    pub rrf_score: f32,
    pub min_distance: f32,
    pub collections: Vec<&'static str>,
}

pub const fn namespace_label(ns: VectorNamespace) -> &'static str {
    match ns {
        VectorNamespace::Content => "content",
        VectorNamespace::Chunks => "chunks",
    }
}

/// Fuses per-namespace k-NN results (each assumed already sorted by
/// ascending distance) into one ranked list, de-duplicated by artifact.
/// Ties in `rrf_score` break by smallest `min_distance`, then by
/// `document_key` lexicographically (spec §4.11 "Ordering & tie-breaks").
pub fn reciprocal_rank_fuse(
    namespace_hits: &[(VectorNamespace, Vec<VectorHit>)],
    k_rrf: f32,
) -> Vec<FusedDocument> {
    let mut per_doc: HashMap<String, FusedDocument> = HashMap::new();

    for (ns, hits) in namespace_hits {
        let mut best_rank_seen: HashSet<String> = HashSet::new();
        for (idx, hit) in hits.iter().enumerate() {
            let doc_key = hit.metadata.artifact_uid.clone();
            if !best_rank_seen.insert(doc_key.clone()) {
                // A later (worse-ranked) chunk of an artifact we already
                // counted for this namespace; the earlier one is the
                // best-ranked representative and already scored.
                continue;
            }
            let rank = idx + 1;
            let contribution = 1.0 / (k_rrf + rank as f32);

            let entry = per_doc.entry(doc_key.clone()).or_insert_with(|| FusedDocument {
                document_key: doc_key.clone(),
                representative: hit.clone(),
                representative_namespace: *ns,
                rrf_score: 0.0,
                min_distance: hit.distance,
                collections: Vec::new(),
            });
            entry.rrf_score += contribution;
            if hit.distance < entry.min_distance {
                entry.min_distance = hit.distance;
                entry.representative = hit.clone();
                entry.representative_namespace = *ns;
            }
            let label = namespace_label(*ns);
            if !entry.collections.contains(&label) {
                entry.collections.push(label);
            }
        }
    }

    let mut fused: Vec<FusedDocument> = per_doc.into_values().collect();
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.min_distance.partial_cmp(&b.min_distance).unwrap_or(Ordering::Equal))
            .then_with(|| a.document_key.cmp(&b.document_key))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::storage::vector::VectorMetadata;

    fn hit(artifact_uid: &str, distance: f32) -> VectorHit {
        VectorHit {
            id: format!("{artifact_uid}::doc"),
            distance,
            text: "text".into(),
            metadata: VectorMetadata {
                artifact_uid: artifact_uid.into(),
                revision_id: "rev_1".into(),
                document_date: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn document_present_in_both_namespaces_outranks_single_namespace_hit() {
        let chunks = vec![hit("art_a", 0.1), hit("art_b", 0.05)];
        let content = vec![hit("art_a", 0.2)];

        let fused = reciprocal_rank_fuse(
            &[
                (VectorNamespace::Chunks, chunks),
                (VectorNamespace::Content, content),
            ],
            60.0,
        );

        assert_eq!(fused[0].document_key, "art_a");
        assert_eq!(fused[0].collections, vec!["chunks", "content"]);
        assert!(fused[0].rrf_score > fused[1].rrf_score);
    }

    #[test]
    fn ties_break_by_min_distance_then_document_key() {
        let chunks = vec![hit("art_z", 0.3), hit("art_a", 0.3)];
        let fused = reciprocal_rank_fuse(&[(VectorNamespace::Chunks, chunks)], 60.0);
        // both rank 1/2 respectively in a single list so scores differ by rank,
        // not by the tie-break path; this asserts rank ordering is preserved.
        assert_eq!(fused[0].document_key, "art_z");
        assert_eq!(fused[1].document_key, "art_a");
    }

    #[test]
    fn repeated_chunks_of_same_artifact_only_count_best_rank_once() {
        let chunks = vec![hit("art_a", 0.1), hit("art_a", 0.15), hit("art_b", 0.2)];
        let fused = reciprocal_rank_fuse(&[(VectorNamespace::Chunks, chunks)], 60.0);
        assert_eq!(fused.len(), 2);
        let art_a = fused.iter().find(|d| d.document_key == "art_a").unwrap();
        assert!((art_a.rrf_score - 1.0 / 61.0).abs() < 1e-6);
    }
}
