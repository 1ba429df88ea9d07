//! vigil-core — Face verification engine for workforce presence monitoring.
//!
//! Decodes client-submitted images, detects faces with SCRFD, extracts
//! ArcFace embeddings (both via ONNX Runtime), and decides whether a
//! candidate image depicts the same person as a user's stored references.
//! When the inference backend is unavailable, verification degrades to a
//! coarse byte-similarity comparison instead of failing the request.

pub mod alignment;
pub mod backend;
pub mod detector;
pub mod fallback;
pub mod normalize;
pub mod quality;
pub mod recognizer;
pub mod types;
pub mod verifier;

pub use backend::{BackendError, DisabledBackend, FaceBackend, OnnxBackend};
pub use normalize::{EncodedImage, NormalizeError, NormalizedImage};
pub use types::{
    BoundingBox, Embedding, EnrollOutcome, ExtractOutcome, PresenceOutcome, Representation,
    RepresentationKind, StoredReference, VerificationOutcome,
};
pub use verifier::Verifier;
