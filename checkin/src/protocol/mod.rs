//! Check-in protocol client.
//!
//! [`CheckInService`] is the transport seam: the HTTP implementation lives in
//! [`http`], an in-memory one in [`crate::mocks`]. [`CheckInClient`] adds the
//! console context (staff member, gates) and picks the request shape for the
//! attempt's source.
//!
//! A rejected ticket is `Ok` with an INVALID or DUPLICATE outcome; only a call
//! that could not complete is `Err`. Nothing here retries.

pub mod http;
pub mod wire;

use crate::config::Config;
use crate::error::NetworkError;
use crate::types::{
    BulkCheckInResult, CheckInOutcome, EventId, ScanAttempt, ScanSource, StaffId, TicketCode,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One code to validate, with request context
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRequest {
    /// The accepted attempt; its source selects the endpoint
    pub attempt: ScanAttempt,
    /// Signed-in staff member
    pub staff: Option<StaffId>,
    /// Gate recording the scan
    pub gate: String,
    /// Selected event, sent with manual verification
    pub event: Option<EventId>,
}

/// A batch to validate in one call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkRequest {
    /// Codes in submission order, repeats included
    pub codes: Vec<TicketCode>,
    /// Signed-in staff member
    pub staff: Option<StaffId>,
    /// Gate recording the scans
    pub gate: String,
    /// Event the batch belongs to
    pub event: EventId,
}

/// Remote ticket validation
pub trait CheckInService: Send + Sync {
    /// Validate one code
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the call could not complete.
    fn validate_scan(
        &self,
        request: ScanRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CheckInOutcome, NetworkError>> + Send + '_>>;

    /// Validate a batch; outcomes are aligned with `request.codes`
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the call could not complete.
    fn validate_bulk(
        &self,
        request: BulkRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BulkCheckInResult, NetworkError>> + Send + '_>>;
}

/// Align server outcomes with the submitted codes
///
/// When the server returns one outcome per code and every outcome either names
/// its code or names none, outcomes are taken positionally. Otherwise each code
/// takes the first unused outcome naming it. Codes left without an outcome get
/// an INVALID one.
#[must_use]
pub fn align_bulk(codes: Vec<TicketCode>, outcomes: Vec<CheckInOutcome>) -> BulkCheckInResult {
    let positional = outcomes.len() == codes.len()
        && codes.iter().zip(&outcomes).all(|(code, outcome)| {
            outcome
                .ticket_number
                .as_deref()
                .is_none_or(|number| number.trim() == code.as_str())
        });
    if positional {
        return BulkCheckInResult::new(codes, outcomes);
    }

    tracing::debug!(
        submitted = codes.len(),
        returned = outcomes.len(),
        "Bulk results out of step with submission; matching by ticket number"
    );
    let mut pool: Vec<Option<CheckInOutcome>> = outcomes.into_iter().map(Some).collect();
    let aligned = codes
        .iter()
        .map(|code| {
            pool.iter_mut()
                .find(|slot| {
                    slot.as_ref().is_some_and(|o| {
                        o.ticket_number.as_deref().map(str::trim) == Some(code.as_str())
                    })
                })
                .and_then(Option::take)
                .unwrap_or_else(|| CheckInOutcome::invalid(code, crate::types::MISSING_RESULT))
        })
        .collect();
    BulkCheckInResult::new(codes, aligned)
}

/// Validation client with console context
#[derive(Clone)]
pub struct CheckInClient {
    service: Arc<dyn CheckInService>,
    staff: Option<StaffId>,
    camera_gate: String,
    desk_gate: String,
}

impl CheckInClient {
    /// Wrap `service` with the staff member and gates from `config`
    #[must_use]
    pub fn new(service: Arc<dyn CheckInService>, config: &Config) -> Self {
        Self {
            service,
            staff: config.staff_id,
            camera_gate: config.camera_gate.clone(),
            desk_gate: config.desk_gate.clone(),
        }
    }

    /// Gate reported for camera scans
    #[must_use]
    pub fn camera_gate(&self) -> &str {
        &self.camera_gate
    }

    /// Validate one accepted attempt
    ///
    /// Camera attempts are reported at the camera gate, everything else at
    /// the desk gate.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the call could not complete.
    pub async fn validate(
        &self,
        attempt: ScanAttempt,
        event: Option<EventId>,
    ) -> Result<CheckInOutcome, NetworkError> {
        let source = attempt.source;
        let gate = match source {
            ScanSource::Camera => self.camera_gate.clone(),
            ScanSource::Manual | ScanSource::BulkItem => self.desk_gate.clone(),
        };
        let code = attempt.code.clone();
        let request = ScanRequest {
            attempt,
            staff: self.staff,
            gate,
            event,
        };

        let result = self.service.validate_scan(request).await;
        match &result {
            Ok(outcome) => {
                let verdict = outcome.verdict().as_str();
                tracing::info!(code = %code, source = source.as_str(), verdict, "Ticket validated");
                metrics::counter!("checkin.outcomes", "status" => verdict).increment(1);
            },
            Err(error) => {
                tracing::warn!(code = %code, source = source.as_str(), error = %error, "Validation failed");
                metrics::counter!("checkin.outcomes", "status" => "error").increment(1);
            },
        }
        result
    }

    /// Validate a batch at the desk gate
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the call could not complete.
    pub async fn validate_bulk(
        &self,
        codes: Vec<TicketCode>,
        event: EventId,
    ) -> Result<BulkCheckInResult, NetworkError> {
        let submitted = codes.len();
        let request = BulkRequest {
            codes,
            staff: self.staff,
            gate: self.desk_gate.clone(),
            event,
        };

        let result = self.service.validate_bulk(request).await;
        match &result {
            Ok(bulk) => {
                let counts = bulk.counts();
                tracing::info!(
                    event = %event,
                    submitted,
                    successful = counts.successful,
                    duplicates = counts.duplicates,
                    invalid = counts.invalid,
                    "Bulk check-in completed"
                );
                for outcome in bulk.outcomes() {
                    metrics::counter!("checkin.outcomes", "status" => outcome.verdict().as_str())
                        .increment(1);
                }
            },
            Err(error) => {
                tracing::warn!(event = %event, submitted, error = %error, "Bulk check-in failed");
                metrics::counter!("checkin.outcomes", "status" => "error").increment(1);
            },
        }
        result
    }
}

impl std::fmt::Debug for CheckInClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInClient")
            .field("staff", &self.staff)
            .field("camera_gate", &self.camera_gate)
            .field("desk_gate", &self.desk_gate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockCheckInService, RecordedRequest};
    use crate::types::{CheckInStatus, PreviousScan, Verdict};
    use gatecheck_testing::test_clock;
    use gatecheck_core::environment::Clock;
    use proptest::prelude::*;

    fn code(s: &str) -> TicketCode {
        TicketCode::parse(s).unwrap()
    }

    fn named(number: Option<&str>, status: CheckInStatus) -> CheckInOutcome {
        CheckInOutcome {
            status,
            ticket_number: number.map(str::to_string),
            ..CheckInOutcome::invalid(&code("_"), "")
        }
    }

    fn dup() -> CheckInStatus {
        CheckInStatus::Duplicate {
            previous: PreviousScan::Unknown,
            re_entry_count: None,
        }
    }

    #[test]
    fn test_align_positional() {
        let result = align_bulk(
            vec![code("A"), code("B"), code("C")],
            vec![
                named(Some("A"), CheckInStatus::Valid),
                named(None, dup()),
                named(Some("C"), CheckInStatus::Valid),
            ],
        );
        let verdicts: Vec<Verdict> = result.outcomes().iter().map(CheckInOutcome::verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Valid, Verdict::Duplicate, Verdict::Valid]);
    }

    #[test]
    fn test_align_by_ticket_number_when_reordered_or_short() {
        let result = align_bulk(
            vec![code("A"), code("B"), code("C")],
            vec![named(Some("C"), dup()), named(Some("A"), CheckInStatus::Valid)],
        );
        let verdicts: Vec<Verdict> = result.outcomes().iter().map(CheckInOutcome::verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Valid, Verdict::Invalid, Verdict::Duplicate]);
        assert_eq!(result.outcomes()[1].ticket_number.as_deref(), Some("B"));
    }

    #[test]
    fn test_align_repeated_codes_consume_distinct_outcomes() {
        let result = align_bulk(
            vec![code("A"), code("A")],
            vec![
                named(Some("A"), CheckInStatus::Valid),
                named(Some("X"), CheckInStatus::Invalid),
                named(Some("A"), dup()),
            ],
        );
        let verdicts: Vec<Verdict> = result.outcomes().iter().map(CheckInOutcome::verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Valid, Verdict::Duplicate]);
    }

    proptest! {
        #[test]
        fn prop_bulk_alignment_preserves_length_and_counts(
            codes in prop::collection::vec("[A-D]{1,2}", 1..12),
            returned in prop::collection::vec(("[A-D]{1,2}", 0..3_u8), 0..14),
        ) {
            let codes: Vec<TicketCode> = codes.iter().map(|c| code(c)).collect();
            let outcomes = returned
                .iter()
                .map(|(number, kind)| {
                    let status = match kind {
                        0 => CheckInStatus::Valid,
                        1 => dup(),
                        _ => CheckInStatus::Invalid,
                    };
                    named(Some(number.as_str()), status)
                })
                .collect();

            let result = align_bulk(codes.clone(), outcomes);
            let counts = result.counts();
            prop_assert_eq!(result.outcomes().len(), codes.len());
            prop_assert_eq!(result.submitted_codes(), codes.as_slice());
            prop_assert_eq!(counts.successful + counts.duplicates + counts.invalid, codes.len());
        }
    }

    #[tokio::test]
    async fn test_client_routes_gates_by_source() {
        let service = Arc::new(MockCheckInService::new());
        let config = Config {
            staff_id: Some(StaffId(9)),
            ..Config::default()
        };
        let client = CheckInClient::new(service.clone(), &config);
        let now = test_clock().now();

        let camera = ScanAttempt {
            code: code("TCK-1"),
            source: ScanSource::Camera,
            submitted_at: now,
        };
        let manual = ScanAttempt {
            source: ScanSource::Manual,
            ..camera.clone()
        };
        client.validate(camera, None).await.unwrap();
        client.validate(manual, Some(EventId(3))).await.unwrap();

        let requests = service.requests();
        let gates: Vec<(&str, Option<EventId>)> = requests
            .iter()
            .map(|r| match r {
                RecordedRequest::Scan(req) => (req.gate.as_str(), req.event),
                RecordedRequest::Bulk(req) => (req.gate.as_str(), Some(req.event)),
            })
            .collect();
        assert_eq!(
            gates,
            vec![("Main Gate", None), ("Ticket Validation Gate", Some(EventId(3)))]
        );
        assert!(requests.iter().all(|r| matches!(
            r,
            RecordedRequest::Scan(ScanRequest { staff: Some(StaffId(9)), .. })
        )));
    }
}
