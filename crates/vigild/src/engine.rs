use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::types::{EnrollOutcome, PresenceOutcome, StoredReference, VerificationOutcome};
use vigil_core::{EncodedImage, Verifier};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Verify {
        references: Vec<StoredReference>,
        image: EncodedImage,
        tolerance: f32,
        reply: oneshot::Sender<VerificationOutcome>,
    },
    Enroll {
        image: EncodedImage,
        reply: oneshot::Sender<EnrollOutcome>,
    },
    Detect {
        image: EncodedImage,
        reply: oneshot::Sender<PresenceOutcome>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Compare a candidate image against the user's stored references.
    pub async fn verify(
        &self,
        references: Vec<StoredReference>,
        image: EncodedImage,
        tolerance: f32,
    ) -> Result<VerificationOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                references,
                image,
                tolerance,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Prepare an enrollment representation from a submitted image.
    pub async fn enroll(&self, image: EncodedImage) -> Result<EnrollOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Standalone presence check.
    pub async fn detect(&self, image: EncodedImage) -> Result<PresenceOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The ONNX sessions need exclusive access, so one thread owns the verifier
/// and serializes all inference; handlers queue requests over the channel.
/// Nothing heavy runs at spawn time — models load on first use.
pub fn spawn_engine(verifier: Verifier) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!(backend = verifier.backend_label(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify {
                        references,
                        image,
                        tolerance,
                        reply,
                    } => {
                        let outcome = verifier.verify(&references, &image, tolerance);
                        let _ = reply.send(outcome);
                    }
                    EngineRequest::Enroll { image, reply } => {
                        let _ = reply.send(verifier.prepare_enrollment(&image));
                    }
                    EngineRequest::Detect { image, reply } => {
                        let _ = reply.send(verifier.detect_presence(&image));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::DisabledBackend;

    fn disabled_engine() -> EngineHandle {
        spawn_engine(Verifier::new(Box::new(DisabledBackend)))
    }

    fn png_image() -> EncodedImage {
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 3) as u8, (y * 5) as u8, ((x + y) * 2) as u8])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        EncodedImage::from_bytes(out.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let engine = disabled_engine();
        let outcome = engine
            .verify(Vec::new(), png_image(), 0.6)
            .await
            .unwrap();
        assert_eq!(outcome, VerificationOutcome::NoReferences);
    }

    #[tokio::test]
    async fn test_engine_detect_degrades_without_backend() {
        let engine = disabled_engine();
        // Disabled backend + real-sized payload: coarse heuristic presumes a face.
        let outcome = engine.detect(png_image()).await.unwrap();
        assert_eq!(outcome, PresenceOutcome::FacePresent);
    }

    #[tokio::test]
    async fn test_engine_serializes_concurrent_requests() {
        let engine = disabled_engine();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.verify(Vec::new(), png_image(), 0.6).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), VerificationOutcome::NoReferences);
        }
    }
}
