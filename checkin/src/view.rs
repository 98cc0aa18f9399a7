//! Scanner console shell over the [`Store`].
//!
//! Owns a store running [`ScannerReducer`] and exposes the operator commands
//! as async methods. Commands that start a request wait for its effects, so
//! the result is in state when the method returns.

use crate::capture::CaptureSession;
use crate::detection::{CodeDetector, DetectionSupport};
use crate::error::AcquisitionError;
use crate::presenter::{BulkSummary, Notice, OutcomeCard};
use crate::protocol::CheckInClient;
use crate::refresh::RefreshMailbox;
use crate::scanner::{
    ScanPhase, ScannerAction, ScannerEnvironment, ScannerReducer, ScannerState,
};
use crate::types::{EventId, ScanMode};
use gatecheck_core::environment::{Clock, SystemClock};
use gatecheck_runtime::store::Store;
use gatecheck_runtime::{EffectHandle, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// Store type behind the console
pub type ScannerStore = Store<ScannerState, ScannerAction, ScannerEnvironment, ScannerReducer>;

/// Builder for [`ScannerView`]
pub struct ScannerViewBuilder {
    capture: Arc<CaptureSession>,
    client: CheckInClient,
    detector: Option<Arc<dyn CodeDetector>>,
    clock: Arc<dyn Clock>,
    refresh: RefreshMailbox,
    frame_interval: Duration,
    mode: ScanMode,
    event: Option<EventId>,
}

impl ScannerViewBuilder {
    /// Platform QR detector; without one the console defaults to manual entry
    #[must_use]
    pub fn detector(mut self, detector: Arc<dyn CodeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Clock used to stamp scan attempts
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mailbox shared with the dashboard
    #[must_use]
    pub fn refresh(mut self, refresh: RefreshMailbox) -> Self {
        self.refresh = refresh;
        self
    }

    /// Pause between detection attempts
    #[must_use]
    pub const fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Single-shot or continuous scanning
    #[must_use]
    pub const fn mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Initially selected event
    #[must_use]
    pub const fn event(mut self, event: Option<EventId>) -> Self {
        self.event = event;
        self
    }

    /// Build the console
    #[must_use]
    pub fn build(self) -> ScannerView {
        let detection = DetectionSupport::of(self.detector.as_ref());
        if detection == DetectionSupport::Unsupported {
            tracing::info!("No QR detector available; manual entry only");
        }
        let state = ScannerState::new(self.mode, detection).with_event(self.event);
        let env = ScannerEnvironment {
            capture: self.capture,
            detector: self.detector,
            client: self.client,
            clock: self.clock,
            refresh: self.refresh,
            frame_interval: self.frame_interval,
        };
        ScannerView {
            store: Store::new(state, ScannerReducer::new(), env),
        }
    }
}

/// The scanner console
#[derive(Clone)]
pub struct ScannerView {
    store: ScannerStore,
}

impl ScannerView {
    /// Start building a console over `capture` and `client`
    #[must_use]
    pub fn builder(capture: Arc<CaptureSession>, client: CheckInClient) -> ScannerViewBuilder {
        ScannerViewBuilder {
            capture,
            client,
            detector: None,
            clock: Arc::new(SystemClock),
            refresh: RefreshMailbox::new(),
            frame_interval: Duration::from_millis(16),
            mode: ScanMode::SingleShot,
            event: None,
        }
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &ScannerStore {
        &self.store
    }

    /// Start the camera
    ///
    /// Returns once the start request is issued; the camera result arrives as
    /// a later action.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn start(&self) -> Result<EffectHandle, StoreError> {
        self.store.send(ScannerAction::StartScanning).await
    }

    /// Start the camera and wait until it is live or has failed
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the camera neither starts nor
    /// fails within `timeout`.
    pub async fn start_and_wait(&self, timeout: Duration) -> Result<ScanPhase, StoreError> {
        self.store
            .send_and_wait_for(
                ScannerAction::StartScanning,
                // A superseded start reports `Interrupted`; keep waiting for ours
                |action| match action {
                    ScannerAction::CameraReady(_) => true,
                    ScannerAction::CameraFailed { error, .. } => {
                        *error != AcquisitionError::Interrupted
                    },
                    _ => false,
                },
                timeout,
            )
            .await?;
        Ok(self.phase().await)
    }

    /// Stop scanning and release the camera before returning
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn stop(&self) -> Result<(), StoreError> {
        let mut handle = self.store.send(ScannerAction::StopScanning).await?;
        handle.wait().await;
        Ok(())
    }

    /// Close the console: release the camera and wait for outstanding work
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// after `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<(), StoreError> {
        let mut handle = self.store.send(ScannerAction::ViewClosed).await?;
        handle.wait().await;
        self.store.shutdown(timeout).await
    }

    /// Verify a typed ticket number and wait for the result
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn verify(&self, raw: &str) -> Result<(), StoreError> {
        let mut handle = self
            .store
            .send(ScannerAction::ManualEntered(raw.to_string()))
            .await?;
        handle.wait().await;
        Ok(())
    }

    /// Submit a batch, one ticket number per line, and wait for the result
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn bulk(&self, text: &str) -> Result<(), StoreError> {
        let mut handle = self
            .store
            .send(ScannerAction::BulkSubmitted(text.to_string()))
            .await?;
        handle.wait().await;
        Ok(())
    }

    /// Pick the event for manual and bulk check-in
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn select_event(&self, event: Option<EventId>) -> Result<(), StoreError> {
        self.store.send(ScannerAction::SelectEvent(event)).await?;
        Ok(())
    }

    /// Dismiss the outcome card
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn dismiss(&self) -> Result<(), StoreError> {
        self.store.send(ScannerAction::Dismiss).await?;
        Ok(())
    }

    /// Take every pending notice, oldest first
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::close`].
    pub async fn drain_notices(&self) -> Result<Vec<Notice>, StoreError> {
        let notices: Vec<Notice> = self.store.state(|s| s.notices.iter().cloned().collect()).await;
        if let Some(last) = notices.last() {
            self.store
                .send(ScannerAction::NoticesShown { through: last.id })
                .await?;
        }
        Ok(notices)
    }

    /// Current phase
    pub async fn phase(&self) -> ScanPhase {
        self.store.state(|s| s.phase).await
    }

    /// Card for the last camera result
    pub async fn camera_card(&self) -> Option<OutcomeCard> {
        self.store
            .state(|s| {
                s.last_outcome
                    .as_ref()
                    .map(|o| OutcomeCard::new(o, self.store.environment().client.camera_gate()))
            })
            .await
    }

    /// Card for the last manual verification
    pub async fn manual_card(&self) -> Option<OutcomeCard> {
        self.store
            .state(|s| {
                s.manual_result
                    .as_ref()
                    .map(|o| OutcomeCard::new(o, self.store.environment().client.camera_gate()))
            })
            .await
    }

    /// Summary of the last bulk check-in
    pub async fn bulk_summary(&self) -> Option<BulkSummary> {
        self.store
            .state(|s| s.bulk_result.as_ref().map(BulkSummary::new))
            .await
    }

    /// Read arbitrary state
    pub async fn snapshot<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ScannerState) -> T,
    {
        self.store.state(f).await
    }
}

impl std::fmt::Debug for ScannerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerView")
            .field("environment", self.store.environment())
            .finish_non_exhaustive()
    }
}
