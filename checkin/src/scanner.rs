//! The scanner console as a reducer.
//!
//! Every operator command and every asynchronous result is a
//! [`ScannerAction`]. Camera acquisition, the detection loop and validation
//! calls are returned as effects and run by the store. The detection loop runs
//! under a cancel token held in [`ScannerState`], so stopping the scanner
//! discards anything it produces afterwards.
//!
//! Camera start and release are never cancelled: a start always runs to the
//! end so [`CaptureSession`] can release a stream that arrives late. Each
//! start and release carries a [`SessionTicket`] reserved while reducing, and
//! camera results for any ticket but the newest are ignored.
//!
//! Phase transitions:
//!
//! ```text
//! Idle ──start──▶ Starting ──ready──▶ Scanning ──code──▶ Processing ──result──▶ Resolved
//!   ▲                │                   │                                      │
//!   └────failure─────┘◀──────stop────────┘◀────────────dismiss / restart────────┘
//! ```

use crate::capture::{CaptureSession, SessionTicket};
use crate::detection::{CodeDetector, DetectionLoop, DetectionSupport, LoopEvent};
use crate::dispatcher::{Admission, ScanDispatcher, Settlement};
use crate::error::{AcquisitionError, DetectionError, InputError, NetworkError};
use crate::presenter::{self, Notice, NoticeLevel};
use crate::protocol::CheckInClient;
use crate::refresh::RefreshMailbox;
use crate::types::{
    BulkCheckInResult, CheckInOutcome, EventId, ScanAttempt, ScanMode, ScanSource, TicketCode,
    Verdict, parse_batch,
};
use futures::StreamExt;
use gatecheck_core::environment::Clock;
use gatecheck_core::{CancelToken, SmallVec, effect::Effect, reducer::Reducer, smallvec};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Pause before detection resumes after a failed camera validation in
/// continuous mode
pub const RESUME_AFTER_FAILURE: Duration = Duration::from_secs(1);

/// Notices kept before the oldest is dropped
pub const MAX_NOTICES: usize = 16;

/// Where the camera pipeline is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanPhase {
    /// Camera off
    Idle,
    /// Waiting for the camera
    Starting,
    /// Camera live, looking for codes
    Scanning,
    /// A camera code is being validated
    Processing,
    /// A camera validation finished
    Resolved(Verdict),
}

/// Scanner console state
#[derive(Clone, Debug)]
pub struct ScannerState {
    /// Camera pipeline phase
    pub phase: ScanPhase,
    /// Single-shot or continuous scanning
    pub mode: ScanMode,
    /// Whether frames can be decoded on this device
    pub detection: DetectionSupport,
    /// Dedupe guard and in-flight slot
    pub dispatcher: ScanDispatcher,
    /// Event manual and bulk check-ins are recorded against
    pub selected_event: Option<EventId>,
    /// Outcome card of the last camera validation
    pub last_outcome: Option<CheckInOutcome>,
    /// Result of the last manual verification
    pub manual_result: Option<CheckInOutcome>,
    /// Result of the last bulk check-in
    pub bulk_result: Option<BulkCheckInResult>,
    /// Why the camera could not start
    pub camera_error: Option<AcquisitionError>,
    /// Persistent line under the preview
    pub scanner_message: Option<String>,
    /// Camera stream held
    pub camera_live: bool,
    /// Undisplayed notices, oldest first
    pub notices: VecDeque<Notice>,
    next_notice_id: u64,
    camera_ticket: Option<SessionTicket>,
    loop_token: CancelToken,
}

impl ScannerState {
    /// Idle console
    #[must_use]
    pub fn new(mode: ScanMode, detection: DetectionSupport) -> Self {
        Self {
            phase: ScanPhase::Idle,
            mode,
            detection,
            dispatcher: ScanDispatcher::new(),
            selected_event: None,
            last_outcome: None,
            manual_result: None,
            bulk_result: None,
            camera_error: None,
            scanner_message: None,
            camera_live: false,
            notices: VecDeque::new(),
            next_notice_id: 0,
            camera_ticket: None,
            loop_token: CancelToken::new(),
        }
    }

    /// Preselect an event
    #[must_use]
    pub const fn with_event(mut self, event: Option<EventId>) -> Self {
        self.selected_event = event;
        self
    }

    /// Whether the detection loop may still deliver codes
    #[must_use]
    pub fn detection_running(&self) -> bool {
        self.camera_live && !self.loop_token.is_cancelled()
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.next_notice_id += 1;
        self.notices.push_back(Notice {
            id: self.next_notice_id,
            level,
            text: text.into(),
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    /// Cancel the detection loop, issuing a fresh token
    fn cancel_detection(&mut self) {
        self.loop_token.cancel();
        self.loop_token = CancelToken::new();
    }

    /// Whether a camera result belongs to the newest start or release
    fn is_current(&self, ticket: SessionTicket) -> bool {
        self.camera_ticket == Some(ticket)
    }
}

/// Everything the scanner can be told
#[derive(Clone, Debug)]
pub enum ScannerAction {
    /// Operator pressed start (or "Scan Next Ticket")
    StartScanning,
    /// Camera stream acquired for the start holding `ticket`
    CameraReady(SessionTicket),
    /// Camera acquisition failed
    CameraFailed {
        /// Ticket of the start that failed
        ticket: SessionTicket,
        /// Why
        error: AcquisitionError,
    },
    /// The detection loop decoded a code and halted
    CodeDetected(String),
    /// A frame failed to decode; the loop keeps going
    DetectionAdvisory(DetectionError),
    /// Restart the detection loop
    ResumeDetection,
    /// Operator typed a ticket number
    ManualEntered(String),
    /// Operator pasted a batch, one ticket number per line
    BulkSubmitted(String),
    /// A single validation finished
    ValidationCompleted {
        /// The attempt that was validated
        attempt: ScanAttempt,
        /// Outcome, or why none arrived
        result: Result<CheckInOutcome, NetworkError>,
    },
    /// The bulk check-in finished
    BulkCompleted(Result<BulkCheckInResult, NetworkError>),
    /// Operator pressed stop
    StopScanning,
    /// The console is going away
    ViewClosed,
    /// Operator dismissed the outcome card
    Dismiss,
    /// Operator picked an event
    SelectEvent(Option<EventId>),
    /// Notices up to and including `through` were displayed
    NoticesShown {
        /// Highest displayed notice id
        through: u64,
    },
}

/// Injected dependencies
#[derive(Clone)]
pub struct ScannerEnvironment {
    /// Camera ownership
    pub capture: Arc<CaptureSession>,
    /// Platform QR detector, `None` when the device has none
    pub detector: Option<Arc<dyn CodeDetector>>,
    /// Validation API
    pub client: CheckInClient,
    /// Stamps scan attempts
    pub clock: Arc<dyn Clock>,
    /// Roster refresh signal for other views
    pub refresh: RefreshMailbox,
    /// Pause between detection attempts
    pub frame_interval: Duration,
}

impl std::fmt::Debug for ScannerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerEnvironment")
            .field("capture", &self.capture)
            .field("detection", &DetectionSupport::of(self.detector.as_ref()))
            .field("client", &self.client)
            .field("frame_interval", &self.frame_interval)
            .finish_non_exhaustive()
    }
}

/// Reducer for the scanner console
#[derive(Clone, Copy, Debug, Default)]
pub struct ScannerReducer;

impl ScannerReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

type Effects = SmallVec<[Effect<ScannerAction>; 4]>;

impl Reducer for ScannerReducer {
    type State = ScannerState;
    type Action = ScannerAction;
    type Environment = ScannerEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut ScannerState,
        action: ScannerAction,
        env: &ScannerEnvironment,
    ) -> Effects {
        match action {
            ScannerAction::StartScanning => {
                if matches!(state.phase, ScanPhase::Starting | ScanPhase::Processing) {
                    tracing::debug!(phase = ?state.phase, "Start ignored");
                    return smallvec![Effect::None];
                }

                state.cancel_detection();
                state.dispatcher.reset_session();
                state.phase = ScanPhase::Starting;
                state.camera_live = false;
                state.last_outcome = None;
                state.camera_error = None;
                state.scanner_message = None;

                let ticket = env.capture.ticket();
                state.camera_ticket = Some(ticket);

                tracing::info!(mode = ?state.mode, ?ticket, "Starting scanner");
                let capture = Arc::clone(&env.capture);
                smallvec![Effect::Future(Box::pin(async move {
                    Some(match capture.start_with(ticket).await {
                        Ok(()) => ScannerAction::CameraReady(ticket),
                        Err(error) => ScannerAction::CameraFailed { ticket, error },
                    })
                }))]
            },

            ScannerAction::CameraReady(ticket) => {
                if state.phase != ScanPhase::Starting || !state.is_current(ticket) {
                    tracing::debug!(?ticket, phase = ?state.phase, "Stale camera start ignored");
                    return smallvec![Effect::None];
                }
                state.phase = ScanPhase::Scanning;
                state.camera_live = true;

                if state.detection == DetectionSupport::Unsupported {
                    state.scanner_message =
                        Some(presenter::CAMERA_READY_WITHOUT_DETECTION.to_string());
                    state.notify(NoticeLevel::Info, presenter::DETECTION_UNSUPPORTED);
                    return smallvec![Effect::None];
                }
                smallvec![start_detection(state, env)]
            },

            ScannerAction::CameraFailed { ticket, error } => {
                if error == AcquisitionError::Interrupted
                    || state.phase != ScanPhase::Starting
                    || !state.is_current(ticket)
                {
                    tracing::debug!(?ticket, error = %error, "Stale camera failure ignored");
                    return smallvec![Effect::None];
                }
                state.phase = ScanPhase::Idle;
                state.camera_live = false;
                state.notify(NoticeLevel::Error, presenter::acquisition_message(&error));
                state.camera_error = Some(error);
                smallvec![Effect::None]
            },

            ScannerAction::CodeDetected(raw) => {
                let accepting = match state.phase {
                    ScanPhase::Scanning => true,
                    ScanPhase::Resolved(_) => state.mode == ScanMode::Continuous,
                    ScanPhase::Idle | ScanPhase::Starting | ScanPhase::Processing => false,
                };
                if !accepting || !state.camera_live {
                    return smallvec![Effect::None];
                }
                if state.scanner_message.as_deref() == Some(presenter::DETECTION_ADVISORY) {
                    state.scanner_message = None;
                }

                let Ok(code) = TicketCode::parse(&raw) else {
                    return smallvec![start_detection(state, env)];
                };
                match state.dispatcher.admit(code, ScanSource::Camera, env.clock.now()) {
                    Admission::Accepted(attempt) => {
                        state.phase = ScanPhase::Processing;
                        smallvec![validate(attempt, state.selected_event, env)]
                    },
                    Admission::Dropped(_) | Admission::Rejected(_) => {
                        smallvec![start_detection(state, env)]
                    },
                }
            },

            ScannerAction::DetectionAdvisory(error) => {
                tracing::debug!(error = %error, "Detection advisory");
                if state.scanner_message.as_deref() != Some(presenter::DETECTION_ADVISORY) {
                    state.scanner_message = Some(presenter::DETECTION_ADVISORY.to_string());
                    state.notify(NoticeLevel::Warning, presenter::DETECTION_ADVISORY);
                }
                smallvec![Effect::None]
            },

            ScannerAction::ResumeDetection => {
                if state.phase != ScanPhase::Scanning || !state.camera_live {
                    return smallvec![Effect::None];
                }
                smallvec![start_detection(state, env)]
            },

            ScannerAction::ManualEntered(raw) => {
                let code = match TicketCode::parse(&raw) {
                    Ok(code) => code,
                    Err(error) => return refuse(state, error, ScanSource::Manual),
                };
                if state.selected_event.is_none() {
                    return refuse(state, InputError::NoEventSelected, ScanSource::Manual);
                }
                match state.dispatcher.admit(code, ScanSource::Manual, env.clock.now()) {
                    Admission::Accepted(attempt) => {
                        state.manual_result = None;
                        smallvec![validate(attempt, state.selected_event, env)]
                    },
                    Admission::Rejected(error) => refuse(state, error, ScanSource::Manual),
                    Admission::Dropped(_) => smallvec![Effect::None],
                }
            },

            ScannerAction::BulkSubmitted(text) => {
                let codes = match parse_batch(&text) {
                    Ok(codes) => codes,
                    Err(error) => return refuse(state, error, ScanSource::BulkItem),
                };
                let Some(event) = state.selected_event else {
                    return refuse(state, InputError::NoEventSelected, ScanSource::BulkItem);
                };
                if let Err(error) = state.dispatcher.admit_bulk(&codes) {
                    return refuse(state, error, ScanSource::BulkItem);
                }

                state.bulk_result = None;
                let client = env.client.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    Some(ScannerAction::BulkCompleted(
                        client.validate_bulk(codes, event).await,
                    ))
                }))]
            },

            ScannerAction::ValidationCompleted { attempt, result } => {
                let source = attempt.source;
                let mut effects: Effects = SmallVec::new();

                match result {
                    Ok(outcome) => {
                        state.dispatcher.settle(Settlement::Resolved);
                        let (level, text) = presenter::outcome_notice(&outcome, source);
                        state.notify(level, text);
                        effects.push(post_refresh(env));

                        if source == ScanSource::Camera {
                            if state.phase == ScanPhase::Processing {
                                state.phase = ScanPhase::Resolved(outcome.verdict());
                                effects.push(after_camera_result(state, env));
                            }
                            state.last_outcome = Some(outcome);
                        } else {
                            state.manual_result = Some(outcome);
                        }
                    },
                    Err(error) => {
                        state.dispatcher.settle(Settlement::Failed);
                        tracing::debug!(code = %attempt.code, error = %error, "Validation did not complete");
                        state.notify(NoticeLevel::Error, presenter::transport_notice(source));

                        if source == ScanSource::Camera && state.phase == ScanPhase::Processing {
                            match state.mode {
                                ScanMode::SingleShot => {
                                    state.phase = ScanPhase::Idle;
                                    effects.push(release_camera(state, env));
                                },
                                ScanMode::Continuous => {
                                    state.phase = ScanPhase::Scanning;
                                    effects.push(
                                        Effect::Delay {
                                            duration: RESUME_AFTER_FAILURE,
                                            action: Box::new(ScannerAction::ResumeDetection),
                                        }
                                        .cancellable(state.loop_token.clone()),
                                    );
                                },
                            }
                        }
                    },
                }

                if effects.is_empty() {
                    effects.push(Effect::None);
                }
                effects
            },

            ScannerAction::BulkCompleted(result) => match result {
                Ok(result) => {
                    state.dispatcher.settle(Settlement::Resolved);
                    for (level, text) in presenter::bulk_notices(result.counts()) {
                        state.notify(level, text);
                    }
                    state.bulk_result = Some(result);
                    smallvec![post_refresh(env)]
                },
                Err(error) => {
                    state.dispatcher.settle(Settlement::Failed);
                    tracing::warn!(error = %error, "Bulk check-in did not complete");
                    state.notify(
                        NoticeLevel::Error,
                        presenter::transport_notice(ScanSource::BulkItem),
                    );
                    smallvec![Effect::None]
                },
            },

            ScannerAction::StopScanning | ScannerAction::ViewClosed => {
                tracing::info!(phase = ?state.phase, "Stopping scanner");
                state.dispatcher.reset_session();
                state.scanner_message = None;
                state.phase = ScanPhase::Idle;
                smallvec![release_camera(state, env)]
            },

            ScannerAction::Dismiss => {
                if !matches!(state.phase, ScanPhase::Resolved(_) | ScanPhase::Idle) {
                    return smallvec![Effect::None];
                }
                state.last_outcome = None;
                state.phase = if state.mode == ScanMode::Continuous && state.camera_live {
                    ScanPhase::Scanning
                } else {
                    ScanPhase::Idle
                };
                smallvec![Effect::None]
            },

            ScannerAction::SelectEvent(event) => {
                state.selected_event = event;
                state.manual_result = None;
                state.bulk_result = None;
                smallvec![Effect::None]
            },

            ScannerAction::NoticesShown { through } => {
                state.notices.retain(|notice| notice.id > through);
                smallvec![Effect::None]
            },
        }
    }
}

/// Start a fresh detection loop, cancelling any previous one
fn start_detection(state: &mut ScannerState, env: &ScannerEnvironment) -> Effect<ScannerAction> {
    let Some(detector) = env.detector.clone() else {
        return Effect::None;
    };
    state.loop_token.cancel();
    state.loop_token = CancelToken::new();

    let events = DetectionLoop::new(
        Arc::clone(&env.capture),
        detector,
        env.frame_interval,
        state.loop_token.clone(),
    )
    .run()
    .map(|event| match event {
        LoopEvent::Advisory(error) => ScannerAction::DetectionAdvisory(error),
        LoopEvent::Detected(code) => ScannerAction::CodeDetected(code),
    });
    Effect::Stream(Box::pin(events)).cancellable(state.loop_token.clone())
}

/// Stop detection and release the camera, superseding any pending start
fn release_camera(state: &mut ScannerState, env: &ScannerEnvironment) -> Effect<ScannerAction> {
    state.cancel_detection();
    state.camera_live = false;
    let ticket = env.capture.ticket();
    state.camera_ticket = Some(ticket);
    let capture = Arc::clone(&env.capture);
    Effect::Future(Box::pin(async move {
        capture.stop_with(ticket);
        None
    }))
}

/// Single-shot releases the camera after each result; continuous keeps looking
fn after_camera_result(state: &mut ScannerState, env: &ScannerEnvironment) -> Effect<ScannerAction> {
    match state.mode {
        ScanMode::SingleShot => release_camera(state, env),
        ScanMode::Continuous => start_detection(state, env),
    }
}

/// Validation call; not cancellable, so the in-flight slot always settles
fn validate(
    attempt: ScanAttempt,
    event: Option<EventId>,
    env: &ScannerEnvironment,
) -> Effect<ScannerAction> {
    let client = env.client.clone();
    Effect::Future(Box::pin(async move {
        let result = client.validate(attempt.clone(), event).await;
        Some(ScannerAction::ValidationCompleted { attempt, result })
    }))
}

fn post_refresh(env: &ScannerEnvironment) -> Effect<ScannerAction> {
    let refresh = env.refresh.clone();
    Effect::Future(Box::pin(async move {
        refresh.post();
        None
    }))
}

fn refuse(state: &mut ScannerState, error: InputError, source: ScanSource) -> Effects {
    tracing::debug!(error = %error, source = source.as_str(), "Input refused");
    state.notify(NoticeLevel::Warning, presenter::input_notice(error, source));
    smallvec![Effect::None]
}
