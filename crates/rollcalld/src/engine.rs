use image::RgbImage;
use rollcall_core::{CapabilityError, DetectedFace, EmbeddingCapability};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("embedding failed: {0}")]
    Capability(#[from] CapabilityError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Embed {
        image: Arc<RgbImage>,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, CapabilityError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect and embed every face in `image`.
    ///
    /// Requests are served in arrival order, one photo at a time.
    pub async fn embed(&self, image: Arc<RgbImage>) -> Result<Vec<DetectedFace>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Embed {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the capability (ONNX sessions need exclusive access) and
/// serves requests one at a time; callers await replies without blocking the
/// runtime.
pub fn spawn_engine<C>(mut capability: C) -> Result<EngineHandle, EngineError>
where
    C: EmbeddingCapability + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Embed { image, reply } => {
                        let result = capability.embed(&image);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "embedding failed");
                        }
                        // Receiver gone means the request timed out; nothing to do.
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
