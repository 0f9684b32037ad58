//! Reference gallery loaded from a directory of labeled face images.
//!
//! Layout: one subdirectory per person, named after the person, containing
//! any number of jpg/jpeg/png images. Built once at startup, read-only after.

use crate::types::{FaceAnalyzer, GalleryEntry};
use std::path::Path;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// In-memory reference set for matching. Append-only during load, immutable after.
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Build the gallery from `dir`, one subdirectory per label.
    ///
    /// Never fails: a missing or unreadable directory yields an empty gallery
    /// and the session degrades to labeling every face Unknown. Unreadable
    /// images and images with no detectable face are skipped. When an image
    /// contains several faces, the largest by bounding-box area is kept.
    ///
    /// Directories and files are visited in lexicographic order so entry
    /// order is stable across runs.
    pub fn load(dir: &Path, analyzer: &mut dyn FaceAnalyzer) -> Self {
        let mut entries = Vec::new();

        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(err) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %err,
                    "reference directory unreadable, starting with an empty gallery"
                );
                return Self { entries };
            }
        };

        let mut person_dirs: Vec<_> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        person_dirs.sort();

        for person_dir in &person_dirs {
            let Some(label) = person_dir.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };

            let mut image_paths: Vec<_> = match std::fs::read_dir(person_dir) {
                Ok(rd) => rd
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && is_image_file(p))
                    .collect(),
                Err(err) => {
                    tracing::warn!(
                        dir = %person_dir.display(),
                        error = %err,
                        "person directory unreadable, skipping"
                    );
                    continue;
                }
            };
            image_paths.sort();

            for image_path in &image_paths {
                let image = match image::open(image_path) {
                    Ok(img) => img.to_rgb8(),
                    Err(err) => {
                        tracing::warn!(
                            path = %image_path.display(),
                            error = %err,
                            "reference image unreadable, skipping"
                        );
                        continue;
                    }
                };

                let (width, height) = image.dimensions();
                let faces = match analyzer.analyze(image.as_raw(), width, height) {
                    Ok(faces) => faces,
                    Err(err) => {
                        tracing::warn!(
                            path = %image_path.display(),
                            error = %err,
                            "face analysis failed for reference image, skipping"
                        );
                        continue;
                    }
                };

                // Several faces in one reference photo: keep the largest.
                let best = faces.into_iter().max_by(|a, b| {
                    a.bbox
                        .area()
                        .partial_cmp(&b.bbox.area())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                match best {
                    Some(face) => {
                        tracing::debug!(
                            label = %label,
                            path = %image_path.display(),
                            confidence = face.bbox.confidence,
                            "gallery entry added"
                        );
                        entries.push(GalleryEntry {
                            label: label.clone(),
                            embedding: face.embedding,
                        });
                    }
                    None => {
                        tracing::debug!(
                            path = %image_path.display(),
                            "no face found in reference image, skipping"
                        );
                    }
                }
            }
        }

        let people = person_dirs.len();
        tracing::info!(entries = entries.len(), people, "gallery loaded");

        Self { entries }
    }

    /// Build a gallery from pre-computed entries.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct labels in load order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !labels.contains(&entry.label.as_str()) {
                labels.push(&entry.label);
            }
        }
        labels
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
