//! Operator-facing view models and messages.
//!
//! Pure functions from outcomes and errors to the text the console shows.

use crate::error::{AcquisitionError, InputError};
use crate::types::{
    BulkCheckInResult, BulkCounts, CheckInOutcome, CheckInStatus, PreviousScan, ScanSource,
    Verdict,
};
use chrono::{DateTime, Utc};
use std::fmt;

/// Shown while a frame fails to decode
pub const DETECTION_ADVISORY: &str = "Scanning error. Please steady the camera and try again.";

/// Shown when the platform has no QR detector
pub const DETECTION_UNSUPPORTED: &str =
    "Automatic QR detection is not supported on this device. Use manual verification if needed.";

/// Shown when the camera starts without a detector
pub const CAMERA_READY_WITHOUT_DETECTION: &str =
    "Camera ready. This device does not support automatic QR detection.";

/// Placeholder for a missing or unparseable time
pub const NO_TIME: &str = "--:--";

/// Severity of a notice
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Neutral information
    Info,
    /// Ticket admitted or batch checked in
    Success,
    /// Needs attention, nothing failed
    Warning,
    /// Rejected ticket or failed call
    Error,
}

/// A transient message for the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Monotonic id, used to acknowledge shown notices
    pub id: u64,
    /// Severity
    pub level: NoticeLevel,
    /// Text
    pub text: String,
}

/// Format a timestamp as `Jan 5, 07:30 PM`, or [`NO_TIME`]
#[must_use]
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || NO_TIME.to_string(),
        |t| t.format("%b %-d, %I:%M %p").to_string(),
    )
}

/// Notice for a resolved single validation
///
/// The server message wins; defaults depend on where the code came from.
#[must_use]
pub fn outcome_notice(outcome: &CheckInOutcome, source: ScanSource) -> (NoticeLevel, String) {
    let (level, default) = match (outcome.verdict(), source) {
        (Verdict::Valid, _) => (NoticeLevel::Success, "Ticket verified successfully."),
        (Verdict::Duplicate, ScanSource::Camera) => {
            (NoticeLevel::Warning, "Duplicate scan detected.")
        },
        (Verdict::Duplicate, _) => (NoticeLevel::Warning, "Ticket already checked in."),
        (Verdict::Invalid, ScanSource::Camera) => (NoticeLevel::Error, "Invalid ticket detected."),
        (Verdict::Invalid, _) => (NoticeLevel::Error, "Ticket could not be verified."),
    };
    let text = outcome
        .message
        .clone()
        .unwrap_or_else(|| default.to_string());
    (level, text)
}

/// Notice for a validation call that could not complete
#[must_use]
pub const fn transport_notice(source: ScanSource) -> &'static str {
    match source {
        ScanSource::Camera => "Unable to validate ticket. Please try again.",
        ScanSource::Manual => "Unable to verify ticket. Please try again.",
        ScanSource::BulkItem => "Unable to complete bulk check-in.",
    }
}

/// Notices summarising a bulk result, omitting zero counts
#[must_use]
pub fn bulk_notices(counts: BulkCounts) -> Vec<(NoticeLevel, String)> {
    let mut notices = Vec::new();
    if counts.successful > 0 {
        let n = counts.successful;
        notices.push((
            NoticeLevel::Success,
            format!("Checked in {n} ticket{}.", if n == 1 { "" } else { "s" }),
        ));
    }
    if counts.duplicates > 0 {
        let n = counts.duplicates;
        notices.push((
            NoticeLevel::Warning,
            format!(
                "{n} duplicate ticket{} already checked in.",
                if n == 1 { " was" } else { "s were" }
            ),
        ));
    }
    if counts.invalid > 0 {
        let n = counts.invalid;
        notices.push((
            NoticeLevel::Error,
            format!("{n} ticket{} invalid.", if n == 1 { " was" } else { "s were" }),
        ));
    }
    notices
}

/// Operator text for refused input
#[must_use]
pub const fn input_notice(error: InputError, source: ScanSource) -> &'static str {
    match (error, source) {
        (InputError::EmptyTicketNumber, _) => "Enter a ticket number to verify.",
        (InputError::EmptyBatch, _) => "Enter at least one ticket number.",
        (InputError::NoEventSelected, ScanSource::BulkItem) => {
            "Select an event before running bulk check-in."
        },
        (InputError::NoEventSelected, _) => "Select an event before verifying tickets.",
        (InputError::Busy, _) => "A validation is already in progress. Please wait.",
    }
}

/// Operator text for a camera failure
#[must_use]
pub const fn acquisition_message(error: &AcquisitionError) -> &'static str {
    match error {
        AcquisitionError::PermissionDenied => {
            "Camera permission denied. Allow camera access and try again."
        },
        AcquisitionError::NoDevice => "No camera found. Connect a camera or use manual entry.",
        AcquisitionError::DeviceBusy => {
            "The camera is in use by another application. Close it and try again."
        },
        AcquisitionError::Unsupported => "Camera access is not supported on this device.",
        AcquisitionError::Interrupted => "Camera start was cancelled.",
        AcquisitionError::Other(_) => {
            "Unable to access the camera. Please check permissions and try again."
        },
    }
}

/// Attendee details shown for VALID and DUPLICATE outcomes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttendeeDetails {
    /// Attendee name or `Guest`
    pub attendee: String,
    /// Email or an em dash
    pub email: String,
    /// Ticket number or an em dash
    pub ticket_number: String,
    /// Event title or `Event TBD`
    pub event: String,
    /// Gate, defaulting to the camera gate
    pub gate: String,
    /// Formatted scan time
    pub scanned_at: String,
}

/// Duplicate-only panel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicatePanel {
    /// Formatted previous scan time, `None` when the server gave none
    pub last_scanned: Option<String>,
    /// Re-entry attempts, at least 1; a missing count shows as 1
    pub re_entry_attempts: u32,
}

/// Result card for one validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeCard {
    /// `Valid Ticket`, `Duplicate Scan` or `Invalid Ticket`
    pub title: &'static str,
    /// `VALID`, `DUPLICATE` or `INVALID`
    pub badge: &'static str,
    /// Server message
    pub message: Option<String>,
    /// Hidden for INVALID outcomes
    pub details: Option<AttendeeDetails>,
    /// Present for DUPLICATE outcomes
    pub duplicate: Option<DuplicatePanel>,
    /// Heading of the guidance box
    pub guidance_heading: &'static str,
    /// Body of the guidance box
    pub guidance: &'static str,
}

impl OutcomeCard {
    /// Build the card for `outcome`; `default_gate` fills a missing gate
    #[must_use]
    pub fn new(outcome: &CheckInOutcome, default_gate: &str) -> Self {
        let verdict = outcome.verdict();
        let (title, guidance_heading, guidance) = match verdict {
            Verdict::Valid => (
                "Valid Ticket",
                "Access Granted",
                "Welcome to the event! Enjoy your experience.",
            ),
            Verdict::Duplicate => (
                "Duplicate Scan",
                "Already scanned",
                "This ticket was already admitted. Direct the attendee to the help desk.",
            ),
            Verdict::Invalid => (
                "Invalid Ticket",
                "Invalid Ticket",
                "This ticket could not be verified. Direct the attendee to the help desk.",
            ),
        };
        let badge = match verdict {
            Verdict::Valid => "VALID",
            Verdict::Duplicate => "DUPLICATE",
            Verdict::Invalid => "INVALID",
        };

        let or = |value: &Option<String>, fallback: &str| {
            value.clone().unwrap_or_else(|| fallback.to_string())
        };
        let details = (verdict != Verdict::Invalid).then(|| AttendeeDetails {
            attendee: or(&outcome.attendee_name, "Guest"),
            email: or(&outcome.attendee_email, "—"),
            ticket_number: or(&outcome.ticket_number, "—"),
            event: or(&outcome.event_title, "Event TBD"),
            gate: or(&outcome.gate, default_gate),
            scanned_at: format_time(outcome.scanned_at),
        });

        let duplicate = match &outcome.status {
            CheckInStatus::Duplicate {
                previous,
                re_entry_count,
            } => Some(DuplicatePanel {
                last_scanned: match previous {
                    PreviousScan::At(at) => Some(format_time(Some(*at))),
                    PreviousScan::Unknown => None,
                },
                re_entry_attempts: re_entry_count.unwrap_or(1).max(1),
            }),
            CheckInStatus::Valid | CheckInStatus::Invalid => None,
        };

        Self {
            title,
            badge,
            message: outcome.message.clone(),
            details,
            duplicate,
            guidance_heading,
            guidance,
        }
    }
}

impl fmt::Display for OutcomeCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.title, self.badge)?;
        if let Some(message) = &self.message {
            writeln!(f, "  {message}")?;
        }
        if let Some(d) = &self.details {
            writeln!(f, "  Attendee:      {}", d.attendee)?;
            writeln!(f, "  Email:         {}", d.email)?;
            writeln!(f, "  Ticket Number: {}", d.ticket_number)?;
            writeln!(f, "  Event:         {}", d.event)?;
            writeln!(f, "  Gate:          {}", d.gate)?;
            writeln!(f, "  Scanned At:    {}", d.scanned_at)?;
        }
        if let Some(dup) = &self.duplicate {
            match &dup.last_scanned {
                Some(at) => writeln!(f, "  Last scanned: {at}")?,
                None => writeln!(f, "  Last scanned: unknown")?,
            }
            writeln!(f, "  Re-entry attempts: {}", dup.re_entry_attempts)?;
        }
        write!(f, "  {}: {}", self.guidance_heading, self.guidance)
    }
}

/// Bulk result rendering: counts plus per-item lines in submission order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkSummary {
    /// Derived counts
    pub counts: BulkCounts,
    /// `(ticket number, badge, message)` per submitted code
    pub items: Vec<(String, &'static str, String)>,
}

impl BulkSummary {
    /// Summarise `result`
    #[must_use]
    pub fn new(result: &BulkCheckInResult) -> Self {
        let items = result
            .items()
            .map(|(code, outcome)| {
                let card = OutcomeCard::new(outcome, "");
                let (_, message) = outcome_notice(outcome, ScanSource::BulkItem);
                (code.to_string(), card.badge, message)
            })
            .collect();
        Self {
            counts: result.counts(),
            items,
        }
    }
}

impl fmt::Display for BulkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Successful: {}  Duplicates: {}  Invalid: {}",
            self.counts.successful, self.counts.duplicates, self.counts.invalid
        )?;
        for (code, badge, message) in &self.items {
            writeln!(f, "  {code:<20} {badge:<10} {message}")?;
        }
        Ok(())
    }
}
