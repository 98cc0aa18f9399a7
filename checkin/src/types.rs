//! Domain types for ticket check-in.
//!
//! Outcomes are plain data: a duplicate or invalid ticket is a normal result,
//! not an error. Transport failures live in [`crate::error::NetworkError`].

use crate::error::InputError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A candidate ticket code: trimmed and non-empty
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TicketCode(String);

impl TicketCode {
    /// Parse raw operator or detector input
    ///
    /// # Errors
    ///
    /// Returns [`InputError::EmptyTicketNumber`] if nothing is left after trimming.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::EmptyTicketNumber);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The code as sent to the validation service
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a pasted batch into ticket codes
///
/// Lines are split on `\n` or `\r\n`, trimmed, and blank lines dropped.
/// Repeats are kept: every line is a distinct batch item.
///
/// # Errors
///
/// Returns [`InputError::EmptyBatch`] if no code remains.
pub fn parse_batch(text: &str) -> Result<Vec<TicketCode>, InputError> {
    let codes: Vec<TicketCode> = text
        .lines()
        .filter_map(|line| TicketCode::parse(line).ok())
        .collect();
    if codes.is_empty() {
        return Err(InputError::EmptyBatch);
    }
    Ok(codes)
}

/// Where a scan attempt came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanSource {
    /// Decoded from the live camera feed
    Camera,
    /// Typed by the operator
    Manual,
    /// One line of a bulk submission
    BulkItem,
}

impl ScanSource {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Manual => "manual",
            Self::BulkItem => "bulk",
        }
    }
}

/// One code submitted for validation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanAttempt {
    /// The code
    pub code: TicketCode,
    /// Origin of the code
    pub source: ScanSource,
    /// When the dispatcher accepted it
    pub submitted_at: DateTime<Utc>,
}

/// When a duplicate ticket was previously admitted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviousScan {
    /// The server reported the earlier scan time
    At(DateTime<Utc>),
    /// Duplicate, details unknown
    Unknown,
}

/// Tri-state validation verdict, without duplicate details
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Admitted
    Valid,
    /// Already admitted before
    Duplicate,
    /// Not admissible
    Invalid,
}

impl Verdict {
    /// Lowercase label (`valid`, `duplicate`, `invalid`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Duplicate => "duplicate",
            Self::Invalid => "invalid",
        }
    }
}

/// Validation status of a ticket
///
/// Only duplicates carry previous-scan details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckInStatus {
    /// Ticket admitted
    Valid,
    /// Ticket was already admitted
    Duplicate {
        /// Previous admission
        previous: PreviousScan,
        /// Number of re-entry attempts reported by the server
        re_entry_count: Option<u32>,
    },
    /// Ticket rejected
    Invalid,
}

impl CheckInStatus {
    /// The verdict without details
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        match self {
            Self::Valid => Verdict::Valid,
            Self::Duplicate { .. } => Verdict::Duplicate,
            Self::Invalid => Verdict::Invalid,
        }
    }
}

/// The result of validating one code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckInOutcome {
    /// Verdict and duplicate details
    pub status: CheckInStatus,
    /// Ticket number as known to the server
    pub ticket_number: Option<String>,
    /// Attendee display name
    pub attendee_name: Option<String>,
    /// Attendee email
    pub attendee_email: Option<String>,
    /// Event title
    pub event_title: Option<String>,
    /// Gate that recorded the scan
    pub gate: Option<String>,
    /// Server timestamp of this scan
    pub scanned_at: Option<DateTime<Utc>>,
    /// Server message for the operator
    pub message: Option<String>,
}

impl CheckInOutcome {
    /// An INVALID outcome for `code` with no server details
    #[must_use]
    pub fn invalid(code: &TicketCode, message: impl Into<String>) -> Self {
        Self {
            status: CheckInStatus::Invalid,
            ticket_number: Some(code.to_string()),
            attendee_name: None,
            attendee_email: None,
            event_title: None,
            gate: None,
            scanned_at: None,
            message: Some(message.into()),
        }
    }

    /// Shorthand for `self.status.verdict()`
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        self.status.verdict()
    }

    /// Previous scan details, for duplicates only
    #[must_use]
    pub const fn previous_scan(&self) -> Option<PreviousScan> {
        match self.status {
            CheckInStatus::Duplicate { previous, .. } => Some(previous),
            _ => None,
        }
    }
}

/// Tally of a bulk result
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkCounts {
    /// VALID outcomes
    pub successful: usize,
    /// DUPLICATE outcomes
    pub duplicates: usize,
    /// INVALID outcomes
    pub invalid: usize,
}

/// Result of a bulk check-in
///
/// One outcome per submitted code, in submission order. Counts are derived
/// from the outcomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkCheckInResult {
    submitted: Vec<TicketCode>,
    outcomes: Vec<CheckInOutcome>,
}

impl BulkCheckInResult {
    /// Pair codes with outcomes
    ///
    /// Missing outcomes become INVALID; surplus outcomes are dropped.
    #[must_use]
    pub fn new(submitted: Vec<TicketCode>, mut outcomes: Vec<CheckInOutcome>) -> Self {
        outcomes.truncate(submitted.len());
        for code in &submitted[outcomes.len()..] {
            outcomes.push(CheckInOutcome::invalid(code, MISSING_RESULT));
        }
        Self {
            submitted,
            outcomes,
        }
    }

    /// The codes as submitted
    #[must_use]
    pub fn submitted_codes(&self) -> &[TicketCode] {
        &self.submitted
    }

    /// Per-item outcomes, aligned with [`Self::submitted_codes`]
    #[must_use]
    pub fn outcomes(&self) -> &[CheckInOutcome] {
        &self.outcomes
    }

    /// `(code, outcome)` pairs in submission order
    pub fn items(&self) -> impl Iterator<Item = (&TicketCode, &CheckInOutcome)> {
        self.submitted.iter().zip(&self.outcomes)
    }

    /// Count outcomes by verdict
    #[must_use]
    pub fn counts(&self) -> BulkCounts {
        self.outcomes
            .iter()
            .fold(BulkCounts::default(), |mut counts, outcome| {
                match outcome.verdict() {
                    Verdict::Valid => counts.successful += 1,
                    Verdict::Duplicate => counts.duplicates += 1,
                    Verdict::Invalid => counts.invalid += 1,
                }
                counts
            })
    }
}

/// Message attached to a batch item the server did not report on
pub const MISSING_RESULT: &str = "No result was returned for this ticket.";

/// Backend id of the signed-in staff member
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StaffId(pub i64);

/// Backend id of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the camera does after a camera scan resolves
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Release the camera; the operator starts the next scan
    #[default]
    SingleShot,
    /// Keep the camera live and resume detection
    Continuous,
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "single-shot" | "singleshot" => Ok(Self::SingleShot),
            "continuous" => Ok(Self::Continuous),
            other => Err(format!("unknown scan mode `{other}`")),
        }
    }
}
