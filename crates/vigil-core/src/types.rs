use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Always processes all dimensions; no early return on mismatch.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// What a stored reference actually holds.
///
/// `RawImage` exists only for degraded enrollments made while the inference
/// backend was unavailable; it can only ever match via the byte-similarity
/// fallback and is tagged explicitly so it is never mistaken for an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Representation {
    /// A real face embedding produced by the inference backend.
    Embedding(Embedding),
    /// The encoded image payload, stored verbatim when extraction was impossible.
    RawImage(Vec<u8>),
}

impl Representation {
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Representation::Embedding(_) => RepresentationKind::Embedding,
            Representation::RawImage(_) => RepresentationKind::RawImage,
        }
    }
}

/// Discriminant for [`Representation`], used as the storage tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationKind {
    Embedding,
    RawImage,
}

impl RepresentationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepresentationKind::Embedding => "embedding",
            RepresentationKind::RawImage => "raw_image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "embedding" => Some(RepresentationKind::Embedding),
            "raw_image" => Some(RepresentationKind::RawImage),
            _ => None,
        }
    }
}

/// A stored face reference for one user.
///
/// A user may hold several active references (capture variance at
/// enrollment); verification succeeds if the candidate matches any of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReference {
    pub id: String,
    pub user: String,
    /// Which backend/model produced the representation (e.g. "arcface-w600k_r50",
    /// "raw-capture").
    pub model_label: String,
    pub representation: Representation,
    /// Cleared instead of deleting the row when a reference is superseded.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of one verification call. In-memory only; translated into audit
/// rows and HTTP responses by the caller, never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// The candidate matched a stored reference within tolerance.
    /// `via_fallback` marks a lower-confidence byte-similarity match.
    Verified {
        similarity: f32,
        reference_id: String,
        via_fallback: bool,
    },
    /// No stored reference matched.
    NotVerified {
        best_similarity: f32,
        via_fallback: bool,
    },
    /// The image decoded but contains no detectable face.
    NoFaceDetected,
    /// The user has no active stored references to compare against.
    NoReferences,
    /// The submitted payload could not be decoded into an image.
    InputInvalid { reason: String },
    /// The backend is down and no reference was comparable by fallback.
    BackendUnavailable,
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }

    /// Short action name for audit rows.
    pub fn audit_action(&self) -> &'static str {
        match self {
            VerificationOutcome::Verified { .. } => "face_verification_success",
            VerificationOutcome::NotVerified { .. } => "face_verification_failed",
            VerificationOutcome::NoFaceDetected => "no_face_detected",
            VerificationOutcome::NoReferences => "no_references",
            VerificationOutcome::InputInvalid { .. } => "input_invalid",
            VerificationOutcome::BackendUnavailable => "backend_unavailable",
        }
    }
}

/// Result of a standalone presence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PresenceOutcome {
    FacePresent,
    NoFaceDetected,
    InputInvalid { reason: String },
}

/// Result of a standalone representation extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractOutcome {
    Extracted { embedding: Embedding },
    NoFaceDetected,
    InputInvalid { reason: String },
    BackendUnavailable,
}

/// Result of preparing an enrollment from a submitted image.
#[derive(Debug, Clone)]
pub enum EnrollOutcome {
    /// A representation is ready to be stored.
    Ready {
        representation: Representation,
        model_label: String,
        quality: f32,
    },
    NoFaceDetected,
    /// The capture is too small, too dark, or too flat to enroll.
    LowQuality { score: f32 },
    InputInvalid { reason: String },
}
