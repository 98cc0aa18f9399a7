//! JSON request and response bodies of the validation API.

use crate::types::{CheckInOutcome, CheckInStatus, EventId, PreviousScan, StaffId};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /tickets/scan`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody<'a> {
    /// Decoded QR payload
    pub qr_code: &'a str,
    /// Staff member, `null` when unknown
    pub staff_user_id: Option<StaffId>,
    /// Gate name
    pub gate: &'a str,
}

/// `POST /tickets/manual-verify`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualVerifyBody<'a> {
    /// Typed ticket number
    pub ticket_number: &'a str,
    /// Staff member, `null` when unknown
    pub staff_user_id: Option<StaffId>,
    /// Gate name
    pub gate: &'a str,
    /// Selected event
    pub event_id: Option<EventId>,
}

/// `POST /tickets/bulk-check-in`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCheckInBody<'a> {
    /// Ticket numbers in submission order
    pub ticket_numbers: Vec<&'a str>,
    /// Staff member, `null` when unknown
    pub staff_user_id: Option<StaffId>,
    /// Gate name
    pub gate: &'a str,
    /// Event the batch belongs to
    pub event_id: EventId,
}

/// Single validation response
///
/// Every field is optional on the wire; see [`Self::into_outcome`] for how
/// gaps are filled.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationResponse {
    /// `valid`, `duplicate` or `invalid`, any case
    pub status: Option<String>,
    /// Ticket number
    pub ticket_number: Option<String>,
    /// Attendee display name
    pub attendee_name: Option<String>,
    /// Attendee email
    pub attendee_email: Option<String>,
    /// Event title
    pub event_title: Option<String>,
    /// Gate name
    pub gate: Option<String>,
    /// Timestamp of this scan
    pub scanned_at: Option<String>,
    /// Timestamp of the earlier admission, duplicates only
    pub previous_scan_at: Option<String>,
    /// Re-entry attempts, duplicates only
    pub re_entry_count: Option<i64>,
    /// Operator-facing message
    pub message: Option<String>,
}

impl ValidationResponse {
    /// Normalize into an outcome
    ///
    /// Unknown or missing status is INVALID. Unparseable timestamps are
    /// dropped; a duplicate without a usable previous scan time becomes
    /// [`PreviousScan::Unknown`].
    #[must_use]
    pub fn into_outcome(self) -> CheckInOutcome {
        let status = match self
            .status
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("valid") => CheckInStatus::Valid,
            Some("duplicate") => CheckInStatus::Duplicate {
                previous: self
                    .previous_scan_at
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map_or(PreviousScan::Unknown, PreviousScan::At),
                re_entry_count: self
                    .re_entry_count
                    .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
            },
            other => {
                if let Some(unknown) = other.filter(|s| *s != "invalid") {
                    tracing::debug!(status = unknown, "Unknown validation status treated as invalid");
                }
                CheckInStatus::Invalid
            },
        };

        CheckInOutcome {
            status,
            ticket_number: non_blank(self.ticket_number),
            attendee_name: non_blank(self.attendee_name),
            attendee_email: non_blank(self.attendee_email),
            event_title: non_blank(self.event_title),
            gate: non_blank(self.gate),
            scanned_at: self.scanned_at.as_deref().and_then(parse_timestamp),
            message: non_blank(self.message),
        }
    }
}

/// Bulk validation response
///
/// The server's own tallies are ignored; counts are derived from `results`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BulkCheckInResponse {
    /// Per-item results
    pub results: Vec<ValidationResponse>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse an RFC 3339 timestamp, or an offset-less ISO-8601 date-time as UTC
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
