//! Nearest-neighbor matching of probe embeddings against the gallery.

use thiserror::Error;

use crate::types::{Embedding, GalleryEntry, MatchResult};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(
        "embedding dimension mismatch: probe has {probe} values, \
         gallery entry '{label}' has {entry}"
    )]
    DimensionMismatch {
        probe: usize,
        entry: usize,
        label: String,
    },
}

/// Strategy for classifying a probe embedding against the gallery.
pub trait Matcher {
    fn classify(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean nearest-neighbor matcher over a full linear scan.
///
/// Always iterates every entry, no early exit. Ties on distance keep the
/// first entry encountered, so gallery load order decides between
/// equally-distant candidates.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn classify(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        if gallery.is_empty() {
            return Ok(MatchResult::unknown());
        }

        let mut best_distance = f32::INFINITY;
        let mut best: Option<&GalleryEntry> = None;

        for entry in gallery {
            if entry.embedding.dim() != probe.dim() {
                return Err(MatchError::DimensionMismatch {
                    probe: probe.dim(),
                    entry: entry.embedding.dim(),
                    label: entry.label.clone(),
                });
            }

            let distance = probe.euclidean_distance(&entry.embedding);
            if distance < best_distance {
                best_distance = distance;
                best = Some(entry);
            }
        }

        match best {
            Some(entry) if best_distance <= threshold => {
                // Exact match short-circuits to full confidence; this also
                // keeps the division NaN-free when threshold is zero.
                let confidence = if best_distance == 0.0 {
                    1.0
                } else {
                    (1.0 - best_distance / threshold).clamp(0.0, 1.0)
                };
                Ok(MatchResult {
                    label: entry.label.clone(),
                    confidence,
                })
            }
            _ => Ok(MatchResult::unknown()),
        }
    }
}
