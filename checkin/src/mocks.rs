//! In-memory implementations of the platform and service traits.
//!
//! Used by unit tests, the integration tests under `tests/`, and anyone
//! wiring a scanner without real hardware.

use crate::capture::{Camera, FacingMode, Frame, MediaStream};
use crate::detection::CodeDetector;
use crate::error::{AcquisitionError, DetectionError, NetworkError};
use crate::protocol::{BulkRequest, CheckInService, ScanRequest};
use crate::types::{BulkCheckInResult, CheckInOutcome, CheckInStatus, ScanSource, TicketCode};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted camera that counts the tracks it hands out
#[derive(Debug, Default)]
pub struct MockCamera {
    failure: Option<AcquisitionError>,
    latency: Duration,
    warmup_frames: usize,
    detached: bool,
    live_tracks: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    facing: Mutex<Option<FacingMode>>,
}

impl MockCamera {
    /// Camera that always grants a one-track stream
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera that always fails with `error`
    #[must_use]
    pub fn failing(error: AcquisitionError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Delay before the stream (or failure) is delivered
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `latest_frame` calls answered with `None` per stream
    #[must_use]
    pub const fn with_warmup_frames(mut self, frames: usize) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Finish acquisition on a spawned task, as platform cameras do
    ///
    /// The stream is opened after the latency even if the caller stopped
    /// waiting for it. A stream nobody receives is never stopped and stays
    /// counted in [`Self::live_tracks`].
    #[must_use]
    pub const fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Tracks started and not yet stopped, across all streams
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    /// Streams granted so far
    #[must_use]
    pub fn streams_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Facing mode of the last request
    #[must_use]
    pub fn requested_facing(&self) -> Option<FacingMode> {
        *lock(&self.facing)
    }
}

impl Camera for MockCamera {
    fn request_stream(
        &self,
        facing: FacingMode,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn MediaStream>, AcquisitionError>> + Send + '_>>
    {
        *lock(&self.facing) = Some(facing);
        let acquisition = Acquisition {
            failure: self.failure.clone(),
            latency: self.latency,
            warmup_frames: self.warmup_frames,
            live_tracks: Arc::clone(&self.live_tracks),
            opened: Arc::clone(&self.opened),
        };
        if !self.detached {
            return Box::pin(acquisition.run());
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            // A dropped receiver leaks the stream, as an abandoned platform request would
            let _ = tx.send(acquisition.run().await);
        });
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(AcquisitionError::Other("acquisition task lost".into())))
        })
    }
}

struct Acquisition {
    failure: Option<AcquisitionError>,
    latency: Duration,
    warmup_frames: usize,
    live_tracks: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl Acquisition {
    async fn run(self) -> Result<Box<dyn MediaStream>, AcquisitionError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.failure {
            return Err(error);
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        let stream: Box<dyn MediaStream> = Box::new(MockStream {
            live_tracks: self.live_tracks,
            running: Mutex::new(true),
            warmup_left: AtomicUsize::new(self.warmup_frames),
        });
        Ok(stream)
    }
}

struct MockStream {
    live_tracks: Arc<AtomicUsize>,
    running: Mutex<bool>,
    warmup_left: AtomicUsize,
}

impl MediaStream for MockStream {
    fn latest_frame(&self) -> Option<Frame> {
        if !*lock(&self.running) {
            return None;
        }
        let warming = self
            .warmup_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        (!warming).then(|| Frame {
            width: 4,
            height: 4,
            data: Arc::from(vec![0_u8; 16]),
        })
    }

    fn stop_tracks(&self) {
        let mut running = lock(&self.running);
        if *running {
            *running = false;
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(*lock(&self.running))
    }
}

/// Detector that replays scripted results
///
/// Each `detect` call pops the next scripted result. When the script is empty
/// it answers with whatever [`Self::show`] put in view (nothing by default).
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Result<Vec<String>, DetectionError>>>,
    in_view: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    /// Detector that sees nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of a future `detect` call
    pub fn push(&self, result: Result<Vec<String>, DetectionError>) {
        lock(&self.script).push_back(result);
    }

    /// Queue one detection of `code`
    pub fn push_code(&self, code: &str) {
        self.push(Ok(vec![code.to_string()]));
    }

    /// Keep `code` in view once the script runs out; empty clears the view
    pub fn show(&self, code: &str) {
        let mut in_view = lock(&self.in_view);
        in_view.clear();
        if !code.is_empty() {
            in_view.push(code.to_string());
        }
    }

    /// Number of `detect` calls so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeDetector for ScriptedDetector {
    fn detect(
        &self,
        _frame: Frame,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, DetectionError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Ok(lock(&self.in_view).clone()));
        Box::pin(async move { next })
    }
}

/// A request as seen by [`MockCheckInService`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedRequest {
    /// Single validation
    Scan(ScanRequest),
    /// Bulk validation
    Bulk(BulkRequest),
}

/// Check-in service with scripted verdicts
///
/// Unknown codes are VALID. Records every request and the peak number of
/// concurrent calls.
#[derive(Debug, Default)]
pub struct MockCheckInService {
    verdicts: Mutex<HashMap<String, CheckInStatus>>,
    failures: Mutex<VecDeque<NetworkError>>,
    omit_from_bulk: Mutex<Vec<String>>,
    latency: Duration,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockCheckInService {
    /// Service that admits everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer `code` with `status`
    #[must_use]
    pub fn with_verdict(self, code: &str, status: CheckInStatus) -> Self {
        lock(&self.verdicts).insert(code.to_string(), status);
        self
    }

    /// Fail the next call with `error`
    pub fn fail_next(&self, error: NetworkError) {
        lock(&self.failures).push_back(error);
    }

    /// Leave `code` out of bulk responses
    #[must_use]
    pub fn omitting_from_bulk(self, code: &str) -> Self {
        lock(&self.omit_from_bulk).push(code.to_string());
        self
    }

    /// All requests received, in arrival order
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Codes of single requests, in arrival order
    #[must_use]
    pub fn scanned_codes(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::Scan(req) => Some(req.attempt.code.to_string()),
                RecordedRequest::Bulk(_) => None,
            })
            .collect()
    }

    /// Highest number of calls that were outstanding at once
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn outcome_for(&self, code: &TicketCode, gate: &str) -> CheckInOutcome {
        let status = lock(&self.verdicts)
            .get(code.as_str())
            .cloned()
            .unwrap_or(CheckInStatus::Valid);
        CheckInOutcome {
            status,
            ticket_number: Some(code.to_string()),
            attendee_name: Some("Test Attendee".to_string()),
            attendee_email: Some("attendee@example.com".to_string()),
            event_title: Some("Test Event".to_string()),
            gate: Some(gate.to_string()),
            scanned_at: Some(fixed_time()),
            message: None,
        }
    }

    async fn call<T>(&self, respond: impl FnOnce() -> T) -> Result<T, NetworkError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = lock(&self.failures).pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match failure {
            Some(error) => Err(error),
            None => Ok(respond()),
        }
    }
}

impl CheckInService for MockCheckInService {
    fn validate_scan(
        &self,
        request: ScanRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CheckInOutcome, NetworkError>> + Send + '_>> {
        lock(&self.requests).push(RecordedRequest::Scan(request.clone()));
        Box::pin(async move {
            self.call(|| self.outcome_for(&request.attempt.code, &request.gate))
                .await
        })
    }

    fn validate_bulk(
        &self,
        request: BulkRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BulkCheckInResult, NetworkError>> + Send + '_>> {
        lock(&self.requests).push(RecordedRequest::Bulk(request.clone()));
        Box::pin(async move {
            self.call(|| {
                let omitted = lock(&self.omit_from_bulk).clone();
                let outcomes = request
                    .codes
                    .iter()
                    .filter(|code| !omitted.iter().any(|o| o == code.as_str()))
                    .map(|code| self.outcome_for(code, &request.gate))
                    .collect();
                crate::protocol::align_bulk(request.codes.clone(), outcomes)
            })
            .await
        })
    }
}

/// Timestamp stamped on every mock outcome (2025-01-01 19:30 UTC)
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_759_800, 0).unwrap_or_default()
}

/// Whether the request came from the camera path
#[must_use]
pub fn is_camera(request: &RecordedRequest) -> bool {
    matches!(request, RecordedRequest::Scan(r) if r.attempt.source == ScanSource::Camera)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_stream_counts_tracks() {
        let camera = MockCamera::new();
        let stream = camera.request_stream(FacingMode::User).await.unwrap();
        assert_eq!(camera.live_tracks(), 1);
        assert_eq!(stream.active_tracks(), 1);
        stream.stop_tracks();
        stream.stop_tracks();
        assert_eq!(camera.live_tracks(), 0);
        assert_eq!(stream.active_tracks(), 0);
        assert_eq!(stream.latest_frame(), None);
    }

    #[tokio::test]
    async fn test_scripted_detector_falls_back_to_view() {
        let detector = ScriptedDetector::new();
        let frame = Frame {
            width: 1,
            height: 1,
            data: Arc::from(vec![0_u8]),
        };
        detector.push_code("A");
        detector.show("B");
        assert_eq!(detector.detect(frame.clone()).await.unwrap(), vec!["A"]);
        assert_eq!(detector.detect(frame.clone()).await.unwrap(), vec!["B"]);
        detector.show("");
        assert!(detector.detect(frame).await.unwrap().is_empty());
        assert_eq!(detector.calls(), 3);
    }

    #[test]
    fn test_fixed_time() {
        assert_eq!(fixed_time().to_rfc3339(), "2025-01-01T19:30:00+00:00");
    }
}
