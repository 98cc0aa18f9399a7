//! Camera capture session.
//!
//! [`CaptureSession`] owns at most one live [`MediaStream`] and the binding of
//! that stream to the preview surface. Release is deterministic: [`stop`]
//! stops every track and unbinds the surface, whatever the reason it was
//! called, and dropping the session does the same.
//!
//! A `start` that is overtaken by a `stop` (the operator closed the view while
//! the permission prompt was open) releases the late stream as soon as it
//! arrives.
//!
//! Callers that issue `start` and `stop` from separate tasks reserve a
//! [`SessionTicket`] for each request at the moment they decide on it. The
//! session honours tickets in reservation order, whatever order the tasks
//! happen to run in: a request holding an older ticket than one already
//! applied is stale and does nothing.
//!
//! [`stop`]: CaptureSession::stop

use crate::error::AcquisitionError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Preferred camera direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointing away from the operator
    #[default]
    Environment,
    /// Front camera
    User,
}

/// One decoded video frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel data in the platform's native layout
    pub data: Arc<[u8]>,
}

/// A live camera stream
pub trait MediaStream: Send + Sync {
    /// The most recent frame, or `None` while the stream has no decodable frame yet
    fn latest_frame(&self) -> Option<Frame>;

    /// Stop every track of the stream. Must be idempotent.
    fn stop_tracks(&self);

    /// Number of tracks still running
    fn active_tracks(&self) -> usize;
}

/// Platform camera access
pub trait Camera: Send + Sync {
    /// Request a video stream
    ///
    /// # Errors
    ///
    /// Returns a classified [`AcquisitionError`] if no stream can be opened.
    fn request_stream(
        &self,
        facing: FacingMode,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn MediaStream>, AcquisitionError>> + Send + '_>>;
}

/// Camera for hosts without camera access, such as a terminal
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCamera;

impl Camera for NoCamera {
    fn request_stream(
        &self,
        _facing: FacingMode,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn MediaStream>, AcquisitionError>> + Send + '_>>
    {
        Box::pin(async { Err(AcquisitionError::Unsupported) })
    }
}

/// What the detection loop sees when it asks for a frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameRead {
    /// No stream: the session was stopped or never started
    Inactive,
    /// Stream is live but has no frame yet
    NotReady,
    /// A frame to run detection on
    Ready(Frame),
}

/// Position of a start or stop request in the order it was decided on
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionTicket(u64);

struct Inner {
    stream: Option<Box<dyn MediaStream>>,
    surface_bound: bool,
    last_error: Option<AcquisitionError>,
    // Newest ticket applied; a start holding any other ticket was overtaken.
    current: SessionTicket,
}

impl Inner {
    fn release(&mut self) -> bool {
        self.surface_bound = false;
        match self.stream.take() {
            Some(stream) => {
                stream.stop_tracks();
                true
            },
            None => false,
        }
    }
}

/// Owner of the camera stream and preview binding
pub struct CaptureSession {
    camera: Arc<dyn Camera>,
    facing: FacingMode,
    tickets: AtomicU64,
    inner: Mutex<Inner>,
}

impl CaptureSession {
    /// Create an inactive session that prefers the rear camera
    #[must_use]
    pub fn new(camera: Arc<dyn Camera>) -> Self {
        Self::with_facing(camera, FacingMode::Environment)
    }

    /// Create an inactive session with an explicit facing preference
    #[must_use]
    pub fn with_facing(camera: Arc<dyn Camera>, facing: FacingMode) -> Self {
        Self {
            camera,
            facing,
            tickets: AtomicU64::new(1),
            inner: Mutex::new(Inner {
                stream: None,
                surface_bound: false,
                last_error: None,
                current: SessionTicket(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the next ticket for a [`Self::start_with`] or [`Self::stop_with`]
    pub fn ticket(&self) -> SessionTicket {
        SessionTicket(self.tickets.fetch_add(1, Ordering::SeqCst))
    }

    /// Acquire the camera and bind it to the preview surface
    ///
    /// Any previous stream is released first.
    ///
    /// # Errors
    ///
    /// Returns the classified [`AcquisitionError`] and records it as
    /// [`Self::last_error`]. The session stays inactive. Returns
    /// [`AcquisitionError::Interrupted`] if `stop` ran while the request was
    /// pending.
    pub async fn start(&self) -> Result<(), AcquisitionError> {
        self.start_with(self.ticket()).await
    }

    /// [`Self::start`] under a reserved ticket
    ///
    /// The future must be driven to completion: a stream that arrives after
    /// a newer ticket was applied is released here and nowhere else.
    ///
    /// # Errors
    ///
    /// As [`Self::start`]. Also returns [`AcquisitionError::Interrupted`]
    /// without requesting a stream when a newer ticket was already applied.
    pub async fn start_with(&self, ticket: SessionTicket) -> Result<(), AcquisitionError> {
        {
            let mut inner = self.lock();
            if ticket < inner.current {
                tracing::debug!(?ticket, current = ?inner.current, "Stale camera start skipped");
                return Err(AcquisitionError::Interrupted);
            }
            if inner.release() {
                tracing::debug!("Released previous camera stream before restart");
            }
            inner.last_error = None;
            inner.current = ticket;
        }

        tracing::info!(facing = ?self.facing, "Requesting camera stream");
        let requested = self.camera.request_stream(self.facing).await;

        let mut inner = self.lock();
        if inner.current != ticket {
            if let Ok(stream) = requested {
                stream.stop_tracks();
                tracing::debug!("Camera stream arrived after stop; released");
            }
            return Err(AcquisitionError::Interrupted);
        }

        match requested {
            Ok(stream) => {
                inner.stream = Some(stream);
                inner.surface_bound = true;
                tracing::info!("Camera stream active");
                Ok(())
            },
            Err(error) => {
                tracing::warn!(error = %error, "Camera acquisition failed");
                inner.last_error = Some(error.clone());
                Err(error)
            },
        }
    }

    /// Release the camera
    ///
    /// Stops all tracks, unbinds the preview and clears the stream. Idempotent,
    /// and cancels any `start` still waiting for its stream.
    pub fn stop(&self) {
        self.stop_with(self.ticket());
    }

    /// [`Self::stop`] under a reserved ticket
    ///
    /// Does nothing if a newer ticket was already applied, since that start
    /// released this session's stream itself.
    pub fn stop_with(&self, ticket: SessionTicket) {
        let mut inner = self.lock();
        if ticket < inner.current {
            tracing::debug!(?ticket, current = ?inner.current, "Stale camera stop skipped");
            return;
        }
        inner.current = ticket;
        if inner.release() {
            tracing::info!("Camera stream released");
        }
    }

    /// Whether a stream is held
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().stream.is_some()
    }

    /// Whether the preview surface is bound to a stream
    #[must_use]
    pub fn is_surface_bound(&self) -> bool {
        self.lock().surface_bound
    }

    /// Tracks still running on the held stream
    #[must_use]
    pub fn active_tracks(&self) -> usize {
        self.lock()
            .stream
            .as_ref()
            .map_or(0, |stream| stream.active_tracks())
    }

    /// The failure of the most recent `start`, if it failed
    #[must_use]
    pub fn last_error(&self) -> Option<AcquisitionError> {
        self.lock().last_error.clone()
    }

    /// Read the current frame for detection
    #[must_use]
    pub fn current_frame(&self) -> FrameRead {
        match self.lock().stream.as_ref() {
            None => FrameRead::Inactive,
            Some(stream) => stream
                .latest_frame()
                .map_or(FrameRead::NotReady, FrameRead::Ready),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.release();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CaptureSession")
            .field("facing", &self.facing)
            .field("active", &inner.stream.is_some())
            .field("surface_bound", &inner.surface_bound)
            .field("last_error", &inner.last_error)
            .finish_non_exhaustive()
    }
}
