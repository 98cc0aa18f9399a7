//! Cooperative QR detection loop.
//!
//! One detection attempt per frame tick. The loop halts when it finds a code,
//! when the capture session goes inactive, or when its [`CancelToken`] is
//! cancelled. The token is checked before every detection and before every
//! reschedule. A `detect` call already underway when the token is cancelled
//! runs to completion and its result is discarded.

use crate::capture::{CaptureSession, Frame, FrameRead};
use crate::error::DetectionError;
use futures::Stream;
use gatecheck_core::CancelToken;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Platform QR decoder
pub trait CodeDetector: Send + Sync {
    /// Decode every QR code visible in `frame`, in the platform's order
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the frame could not be processed.
    fn detect(
        &self,
        frame: Frame,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, DetectionError>> + Send + '_>>;
}

/// Whether automatic detection is available
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionSupport {
    /// A detector is installed
    Supported,
    /// No detector; operators use manual entry
    Unsupported,
}

impl DetectionSupport {
    /// Capability query: support is the presence of a detector
    #[must_use]
    pub const fn of(detector: Option<&Arc<dyn CodeDetector>>) -> Self {
        if detector.is_some() {
            Self::Supported
        } else {
            Self::Unsupported
        }
    }
}

/// Outcome of one loop iteration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopStep {
    /// Cancelled or capture inactive; do not reschedule
    Halted,
    /// Stream has no frame yet
    NotReady,
    /// Frame decoded, no code in view
    Nothing,
    /// First code found in the frame
    Detected(String),
    /// Detection failed for this frame
    Failed(DetectionError),
}

/// What the loop reports to its owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopEvent {
    /// Transient failure; the loop keeps going
    Advisory(DetectionError),
    /// A code was found; the loop has halted
    Detected(String),
}

/// The per-frame detection loop
pub struct DetectionLoop {
    capture: Arc<CaptureSession>,
    detector: Arc<dyn CodeDetector>,
    frame_interval: Duration,
    token: CancelToken,
}

impl DetectionLoop {
    /// Build a loop over `capture`, stopped by `token`
    #[must_use]
    pub fn new(
        capture: Arc<CaptureSession>,
        detector: Arc<dyn CodeDetector>,
        frame_interval: Duration,
        token: CancelToken,
    ) -> Self {
        Self {
            capture,
            detector,
            frame_interval,
            token,
        }
    }

    /// Run a single iteration
    pub async fn poll_once(&self) -> LoopStep {
        if self.token.is_cancelled() {
            return LoopStep::Halted;
        }

        let frame = match self.capture.current_frame() {
            FrameRead::Inactive => return LoopStep::Halted,
            FrameRead::NotReady => return LoopStep::NotReady,
            FrameRead::Ready(frame) => frame,
        };
        // Reading the frame can race a stop on another worker
        if self.token.is_cancelled() {
            return LoopStep::Halted;
        }

        let detected = self.detector.detect(frame).await;
        if self.token.is_cancelled() {
            return LoopStep::Halted;
        }

        match detected {
            Ok(codes) => codes
                .into_iter()
                .find(|code| !code.trim().is_empty())
                .map_or(LoopStep::Nothing, LoopStep::Detected),
            Err(error) => LoopStep::Failed(error),
        }
    }

    /// Drive the loop until it halts
    ///
    /// Yields an [`LoopEvent::Advisory`] for each failed frame, and ends after
    /// yielding at most one [`LoopEvent::Detected`].
    pub fn run(self) -> impl Stream<Item = LoopEvent> + Send {
        async_stream::stream! {
            tracing::debug!(interval_ms = self.frame_interval.as_millis(), "Detection loop started");
            loop {
                match self.poll_once().await {
                    LoopStep::Halted => break,
                    LoopStep::Detected(code) => {
                        tracing::debug!(code = %code, "Code detected");
                        yield LoopEvent::Detected(code);
                        break;
                    },
                    LoopStep::Failed(error) => {
                        tracing::debug!(error = %error, "Frame detection failed");
                        yield LoopEvent::Advisory(error);
                    },
                    LoopStep::NotReady | LoopStep::Nothing => {},
                }

                if self.token.is_cancelled() || !self.capture.is_active() {
                    break;
                }
                tokio::time::sleep(self.frame_interval).await;
            }
            tracing::debug!("Detection loop halted");
        }
    }
}
