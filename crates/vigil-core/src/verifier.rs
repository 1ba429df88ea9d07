//! Verification orchestration: decode → detect → extract → compare → decide.
//!
//! Every expected failure mode is a typed outcome; nothing here panics
//! across the public boundary or retries. A failed verification requires a
//! new client-submitted image.
//!
//! Per-call flow:
//! `Start → Decoded → { NoFaceDetected | FaceDetected →
//! RepresentationExtracted → Compared → { Verified | NotVerified } }`,
//! with any backend failure short-circuiting into the byte-similarity
//! fallback instead of propagating an error.

use crate::backend::FaceBackend;
use crate::fallback;
use crate::normalize::{DecodeCache, EncodedImage};
use crate::quality;
use crate::types::{
    Embedding, EnrollOutcome, ExtractOutcome, PresenceOutcome, Representation, StoredReference,
    VerificationOutcome,
};

/// Cosine-similarity tolerance used when the caller does not supply one.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Model label recorded on raw-image references stored while the backend
/// was unavailable.
pub const RAW_CAPTURE_LABEL: &str = "raw-capture";

const DECODE_CACHE_CAPACITY: usize = 32;

/// Decides whether a candidate image depicts the same person as a user's
/// stored references.
pub struct Verifier {
    backend: Box<dyn FaceBackend>,
    cache: DecodeCache,
    tolerance: f32,
}

impl Verifier {
    pub fn new(backend: Box<dyn FaceBackend>) -> Self {
        Self {
            backend,
            cache: DecodeCache::new(DECODE_CACHE_CAPACITY),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend.label()
    }

    /// Whether any face is present in the image.
    ///
    /// Used to short-circuit before expensive comparison and to distinguish
    /// "user stepped away" from "wrong face" during continuous monitoring.
    /// When the backend cannot run, degrades to the coarse payload-size
    /// heuristic rather than failing.
    pub fn detect_presence(&self, image: &EncodedImage) -> PresenceOutcome {
        let decoded = match self.cache.decode(image) {
            Ok(d) => d,
            Err(e) => return PresenceOutcome::InputInvalid { reason: e.to_string() },
        };

        match self.backend.detect_presence(&decoded) {
            Ok(true) => PresenceOutcome::FacePresent,
            Ok(false) => PresenceOutcome::NoFaceDetected,
            Err(err) => {
                tracing::warn!(error = %err, "presence check degraded to payload heuristic");
                if fallback::presumed_face_present(image.as_bytes()) {
                    PresenceOutcome::FacePresent
                } else {
                    PresenceOutcome::NoFaceDetected
                }
            }
        }
    }

    /// Extract the embedding for the most confident face in the image.
    pub fn extract_representation(&self, image: &EncodedImage) -> ExtractOutcome {
        let decoded = match self.cache.decode(image) {
            Ok(d) => d,
            Err(e) => return ExtractOutcome::InputInvalid { reason: e.to_string() },
        };

        match self.backend.extract(&decoded) {
            Ok(Some(embedding)) => ExtractOutcome::Extracted { embedding },
            Ok(None) => ExtractOutcome::NoFaceDetected,
            Err(err) => {
                tracing::warn!(error = %err, "extraction unavailable");
                ExtractOutcome::BackendUnavailable
            }
        }
    }

    /// Compare a candidate image against every active stored reference.
    ///
    /// Matching is a logical OR: the first reference within tolerance wins
    /// and no ranking among matches is surfaced. Embedding references are
    /// compared by cosine similarity; raw-image references (and the whole
    /// call, when the backend is down) go through the byte-similarity
    /// fallback, and any match from that path is flagged `via_fallback`.
    pub fn verify(
        &self,
        references: &[StoredReference],
        candidate: &EncodedImage,
        tolerance: f32,
    ) -> VerificationOutcome {
        let active: Vec<&StoredReference> = references.iter().filter(|r| r.active).collect();
        if active.is_empty() {
            return VerificationOutcome::NoReferences;
        }

        let decoded = match self.cache.decode(candidate) {
            Ok(d) => d,
            Err(e) => return VerificationOutcome::InputInvalid { reason: e.to_string() },
        };

        let embedding = match self.backend.detect_presence(&decoded) {
            Ok(false) => return VerificationOutcome::NoFaceDetected,
            Ok(true) => match self.backend.extract(&decoded) {
                Ok(Some(e)) => Some(e),
                Ok(None) => return VerificationOutcome::NoFaceDetected,
                Err(err) => {
                    tracing::warn!(error = %err, "extraction failed; using byte-similarity fallback");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "backend unavailable; using byte-similarity fallback");
                None
            }
        };

        match embedding {
            Some(emb) => self.compare_embedding(&active, &emb, candidate, tolerance),
            None => self.compare_fallback(&active, candidate),
        }
    }

    fn compare_embedding(
        &self,
        active: &[&StoredReference],
        candidate: &Embedding,
        encoded: &EncodedImage,
        tolerance: f32,
    ) -> VerificationOutcome {
        let mut best = f32::NEG_INFINITY;

        for reference in active {
            match &reference.representation {
                Representation::Embedding(stored) => {
                    if stored.values.len() != candidate.values.len() {
                        // Stale reference from an older model; not an error,
                        // just not comparable.
                        tracing::debug!(
                            reference = %reference.id,
                            stored_dims = stored.values.len(),
                            candidate_dims = candidate.values.len(),
                            "skipping dimension-mismatched reference"
                        );
                        continue;
                    }
                    let similarity = stored.similarity(candidate);
                    if similarity >= tolerance {
                        return VerificationOutcome::Verified {
                            similarity,
                            reference_id: reference.id.clone(),
                            via_fallback: false,
                        };
                    }
                    best = best.max(similarity);
                }
                Representation::RawImage(stored_bytes) => {
                    // Degraded reference: only byte comparison is possible.
                    if let Some(similarity) =
                        fallback::byte_similarity(stored_bytes, encoded.as_bytes())
                    {
                        if similarity >= fallback::MATCH_THRESHOLD {
                            return VerificationOutcome::Verified {
                                similarity,
                                reference_id: reference.id.clone(),
                                via_fallback: true,
                            };
                        }
                        best = best.max(similarity);
                    }
                }
            }
        }

        VerificationOutcome::NotVerified {
            best_similarity: if best == f32::NEG_INFINITY { 0.0 } else { best },
            via_fallback: false,
        }
    }

    fn compare_fallback(
        &self,
        active: &[&StoredReference],
        candidate: &EncodedImage,
    ) -> VerificationOutcome {
        let mut best = 0.0f32;
        let mut any_comparable = false;

        for reference in active {
            let Representation::RawImage(stored_bytes) = &reference.representation else {
                continue; // embeddings cannot be compared without the backend
            };
            any_comparable = true;

            if let Some(similarity) = fallback::byte_similarity(stored_bytes, candidate.as_bytes())
            {
                if similarity >= fallback::MATCH_THRESHOLD {
                    return VerificationOutcome::Verified {
                        similarity,
                        reference_id: reference.id.clone(),
                        via_fallback: true,
                    };
                }
                best = best.max(similarity);
            }
        }

        if !any_comparable {
            // Backend down and only embedding references on file: nothing to
            // compare, and guessing either way would be wrong.
            return VerificationOutcome::BackendUnavailable;
        }

        VerificationOutcome::NotVerified { best_similarity: best, via_fallback: true }
    }

    /// Prepare a representation for enrollment from a submitted image.
    ///
    /// Prefers a real embedding; when the backend is unavailable the encoded
    /// capture itself is stored, explicitly tagged as `RawImage` so later
    /// verification knows it can only match via the fallback comparator.
    pub fn prepare_enrollment(&self, image: &EncodedImage) -> EnrollOutcome {
        let decoded = match self.cache.decode(image) {
            Ok(d) => d,
            Err(e) => return EnrollOutcome::InputInvalid { reason: e.to_string() },
        };

        let score = quality::quality_score(&decoded);

        match self.backend.detect_presence(&decoded) {
            Ok(false) => EnrollOutcome::NoFaceDetected,
            Ok(true) => {
                if score < quality::MIN_ENROLL_QUALITY {
                    return EnrollOutcome::LowQuality { score };
                }
                match self.backend.extract(&decoded) {
                    Ok(Some(embedding)) => EnrollOutcome::Ready {
                        representation: Representation::Embedding(embedding),
                        model_label: self.backend.label().to_string(),
                        quality: score,
                    },
                    Ok(None) => EnrollOutcome::NoFaceDetected,
                    Err(err) => {
                        tracing::warn!(error = %err, "extraction failed at enrollment; storing raw capture");
                        self.raw_enrollment(image, score)
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "backend unavailable at enrollment; storing raw capture");
                if !fallback::presumed_face_present(image.as_bytes()) {
                    return EnrollOutcome::NoFaceDetected;
                }
                if score < quality::MIN_ENROLL_QUALITY {
                    return EnrollOutcome::LowQuality { score };
                }
                self.raw_enrollment(image, score)
            }
        }
    }

    fn raw_enrollment(&self, image: &EncodedImage, score: f32) -> EnrollOutcome {
        EnrollOutcome::Ready {
            representation: Representation::RawImage(image.as_bytes().to_vec()),
            model_label: RAW_CAPTURE_LABEL.to_string(),
            quality: score,
        }
    }
}
