//! # Gatecheck
//!
//! Door-side ticket check-in: camera capture, QR detection, scan dispatch,
//! validation against the check-in API, and the result state machine that
//! drives the operator console.
//!
//! ## Layout
//!
//! - [`capture`]: owns the camera stream and releases it deterministically
//! - [`detection`]: the cancellable per-frame detection loop
//! - [`dispatcher`]: repeat suppression and the single in-flight slot
//! - [`protocol`]: the validation API client and its wire format
//! - [`scanner`]: the reducer tying it all together
//! - [`presenter`]: outcome cards, notices and operator text
//! - [`view`]: an async shell over the store for front ends
//!
//! ## Example
//!
//! ```ignore
//! let config = Config::from_env()?;
//! let service = Arc::new(HttpCheckInService::from_config(&config)?);
//! let view = ScannerView::builder(
//!     Arc::new(CaptureSession::new(Arc::new(NoCamera))),
//!     CheckInClient::new(service, &config),
//! )
//! .event(config.event_id)
//! .build();
//!
//! view.verify("TCK-000123").await?;
//! if let Some(card) = view.manual_card().await {
//!     println!("{card}");
//! }
//! ```

pub mod capture;
pub mod config;
pub mod detection;
pub mod dispatcher;
pub mod error;
pub mod mocks;
pub mod presenter;
pub mod protocol;
pub mod refresh;
pub mod scanner;
pub mod types;
pub mod view;

pub use capture::{Camera, CaptureSession, MediaStream, NoCamera, SessionTicket};
pub use config::Config;
pub use detection::CodeDetector;
pub use error::{AcquisitionError, DetectionError, InputError, NetworkError};
pub use protocol::http::HttpCheckInService;
pub use protocol::{CheckInClient, CheckInService};
pub use refresh::RefreshMailbox;
pub use scanner::{ScanPhase, ScannerAction, ScannerReducer, ScannerState};
pub use types::{CheckInOutcome, CheckInStatus, EventId, ScanMode, StaffId, TicketCode, Verdict};
pub use view::ScannerView;
