//! Pluggable face-analysis backend.
//!
//! The verifier talks to a [`FaceBackend`] capability, selected at
//! configuration time: the real ONNX pipeline, or a disabled stand-in for
//! deployments without the models. Backend failures are typed and never
//! cross the verifier boundary as panics.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::detector::{DetectorError, FaceDetector};
use crate::normalize::NormalizedImage;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;

/// Filename of the SCRFD detection model inside the model dir.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// Filename of the ArcFace recognition model inside the model dir.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<DetectorError> for BackendError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::ModelNotFound(_) => BackendError::Unavailable(e.to_string()),
            other => BackendError::Inference(other.to_string()),
        }
    }
}

impl From<RecognizerError> for BackendError {
    fn from(e: RecognizerError) -> Self {
        match e {
            RecognizerError::ModelNotFound(_) => BackendError::Unavailable(e.to_string()),
            other => BackendError::Inference(other.to_string()),
        }
    }
}

/// Face detection and embedding extraction capability.
///
/// Implementations own the distance metric convention too: embeddings they
/// produce are compared by cosine similarity against a tolerance.
pub trait FaceBackend: Send + Sync {
    /// Label recorded on stored references produced through this backend.
    fn label(&self) -> &'static str;

    /// Whether any face is present in the image.
    fn detect_presence(&self, image: &NormalizedImage) -> Result<bool, BackendError>;

    /// Embedding for the most confident detected face, or `None` when the
    /// image contains no detectable face.
    fn extract(&self, image: &NormalizedImage) -> Result<Option<Embedding>, BackendError>;
}

struct Models {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

/// The primary backend: SCRFD detection + ArcFace embeddings via ONNX Runtime.
///
/// Model sessions are heavyweight, so they load lazily on first use. The
/// `Mutex<Option<..>>` is the initialize-once guard: concurrent first calls
/// serialize on the lock and only the first loads the sessions; it also
/// serializes inference, which needs `&mut` access to the sessions.
pub struct OnnxBackend {
    detector_path: PathBuf,
    recognizer_path: PathBuf,
    models: Mutex<Option<Models>>,
}

impl OnnxBackend {
    /// Create a backend reading `det_10g.onnx` and `w600k_r50.onnx` from
    /// `model_dir`. Nothing is loaded until the first call.
    pub fn new(model_dir: &Path) -> Self {
        Self {
            detector_path: model_dir.join(DETECTOR_MODEL_FILE),
            recognizer_path: model_dir.join(RECOGNIZER_MODEL_FILE),
            models: Mutex::new(None),
        }
    }

    /// Eagerly load both models (fail-fast startup path for the CLI).
    pub fn preload(&self) -> Result<(), BackendError> {
        self.with_models(|_| Ok(()))
    }

    fn with_models<T>(
        &self,
        f: impl FnOnce(&mut Models) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut guard = self.models.lock().unwrap_or_else(|e| e.into_inner());

        if guard.is_none() {
            let detector = FaceDetector::load(&self.detector_path.to_string_lossy())?;
            let recognizer = FaceRecognizer::load(&self.recognizer_path.to_string_lossy())?;
            tracing::info!(
                detector = %self.detector_path.display(),
                recognizer = %self.recognizer_path.display(),
                "ONNX backend initialized"
            );
            *guard = Some(Models { detector, recognizer });
        }

        match guard.as_mut() {
            Some(models) => f(models),
            None => Err(BackendError::Unavailable("model initialization failed".into())),
        }
    }
}

impl FaceBackend for OnnxBackend {
    fn label(&self) -> &'static str {
        "arcface-w600k_r50"
    }

    fn detect_presence(&self, image: &NormalizedImage) -> Result<bool, BackendError> {
        self.with_models(|models| {
            let faces = models.detector.detect(image)?;
            Ok(!faces.is_empty())
        })
    }

    fn extract(&self, image: &NormalizedImage) -> Result<Option<Embedding>, BackendError> {
        self.with_models(|models| {
            let faces = models.detector.detect(image)?;
            let Some(face) = faces.first() else {
                return Ok(None);
            };
            let embedding = models.recognizer.extract(image, face)?;
            Ok(Some(embedding))
        })
    }
}

/// The "no real recognition" bypass: every operation reports the backend as
/// unavailable, so the verifier degrades to the byte-similarity fallback.
pub struct DisabledBackend;

impl FaceBackend for DisabledBackend {
    fn label(&self) -> &'static str {
        "disabled"
    }

    fn detect_presence(&self, _image: &NormalizedImage) -> Result<bool, BackendError> {
        Err(BackendError::Unavailable("recognition disabled".into()))
    }

    fn extract(&self, _image: &NormalizedImage) -> Result<Option<Embedding>, BackendError> {
        Err(BackendError::Unavailable("recognition disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_image() -> NormalizedImage {
        NormalizedImage { width: 2, height: 2, pixels: vec![0; 12] }
    }

    #[test]
    fn test_disabled_backend_reports_unavailable() {
        let backend = DisabledBackend;
        assert!(matches!(
            backend.detect_presence(&blank_image()),
            Err(BackendError::Unavailable(_))
        ));
        assert!(matches!(
            backend.extract(&blank_image()),
            Err(BackendError::Unavailable(_))
        ));
        assert_eq!(backend.label(), "disabled");
    }

    #[test]
    fn test_onnx_backend_missing_models_is_unavailable() {
        // No model files at this path: first use must report Unavailable,
        // not panic, so the verifier can fall back.
        let backend = OnnxBackend::new(Path::new("/nonexistent/model/dir"));
        assert!(matches!(
            backend.detect_presence(&blank_image()),
            Err(BackendError::Unavailable(_))
        ));
        assert!(matches!(backend.preload(), Err(BackendError::Unavailable(_))));
    }

    #[test]
    fn test_model_not_found_maps_to_unavailable() {
        let err: BackendError = DetectorError::ModelNotFound("x.onnx".into()).into();
        assert!(matches!(err, BackendError::Unavailable(_)));

        let err: BackendError = RecognizerError::NoLandmarks.into();
        assert!(matches!(err, BackendError::Inference(_)));
    }
}
