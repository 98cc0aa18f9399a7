//! Scan dispatcher: deduplication and in-flight exclusivity.
//!
//! At most one validation request is outstanding at a time, across camera,
//! manual and bulk input. Camera codes arriving while a request is
//! outstanding are dropped silently; manual and bulk submissions are refused
//! with [`InputError::Busy`] so the operator can resubmit.
//!
//! Immediate-repeat suppression applies to camera codes only. A code typed
//! twice is validated twice.

use crate::error::InputError;
use crate::types::{ScanAttempt, ScanSource, TicketCode};
use chrono::{DateTime, Utc};

/// What is currently awaiting a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InFlight {
    /// A single camera or manual attempt
    Single(ScanSource),
    /// A bulk batch
    Bulk,
}

/// Last accepted code and the outstanding request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DedupeGuard {
    last_accepted: Option<TicketCode>,
    in_flight: Option<InFlight>,
}

impl DedupeGuard {
    /// The most recently accepted code, if it still suppresses camera repeats
    #[must_use]
    pub const fn last_accepted(&self) -> Option<&TicketCode> {
        self.last_accepted.as_ref()
    }

    /// The outstanding request, if any
    #[must_use]
    pub const fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }
}

/// Why a camera code was not dispatched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Another request is outstanding
    InFlight,
    /// Same code as the one just accepted
    Repeat,
}

impl DropReason {
    /// Label used in metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InFlight => "in_flight",
            Self::Repeat => "repeat",
        }
    }
}

/// Result of offering a code to the dispatcher
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Dispatch this attempt
    Accepted(ScanAttempt),
    /// Camera code ignored
    Dropped(DropReason),
    /// Operator submission refused
    Rejected(InputError),
}

/// How the outstanding request ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// A response arrived; the code is consumed
    Resolved,
    /// The call failed; the code may be submitted again
    Failed,
}

/// Gatekeeper between code sources and the protocol client
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanDispatcher {
    guard: DedupeGuard,
}

impl ScanDispatcher {
    /// Empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current guard state
    #[must_use]
    pub const fn guard(&self) -> &DedupeGuard {
        &self.guard
    }

    /// Whether a request is outstanding
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.guard.in_flight.is_some()
    }

    /// Offer a single code
    pub fn admit(&mut self, code: TicketCode, source: ScanSource, now: DateTime<Utc>) -> Admission {
        if self.is_busy() {
            return match source {
                ScanSource::Camera => self.drop_code(&code, DropReason::InFlight),
                ScanSource::Manual | ScanSource::BulkItem => {
                    tracing::debug!(code = %code, source = source.as_str(), "Submission refused: busy");
                    Admission::Rejected(InputError::Busy)
                },
            };
        }

        if source == ScanSource::Camera && self.guard.last_accepted.as_ref() == Some(&code) {
            return self.drop_code(&code, DropReason::Repeat);
        }

        tracing::debug!(code = %code, source = source.as_str(), "Scan accepted");
        self.guard.last_accepted = Some(code.clone());
        self.guard.in_flight = Some(InFlight::Single(source));
        Admission::Accepted(ScanAttempt {
            code,
            source,
            submitted_at: now,
        })
    }

    /// Offer a batch
    ///
    /// # Errors
    ///
    /// - [`InputError::EmptyBatch`] if `codes` is empty
    /// - [`InputError::Busy`] if a request is outstanding
    pub fn admit_bulk(&mut self, codes: &[TicketCode]) -> Result<(), InputError> {
        if codes.is_empty() {
            return Err(InputError::EmptyBatch);
        }
        if self.is_busy() {
            tracing::debug!(codes = codes.len(), "Bulk submission refused: busy");
            return Err(InputError::Busy);
        }
        tracing::debug!(codes = codes.len(), "Bulk submission accepted");
        self.guard.in_flight = Some(InFlight::Bulk);
        Ok(())
    }

    /// Record the end of the outstanding request
    ///
    /// A failed single attempt un-consumes its code so the same ticket can be
    /// presented again.
    pub fn settle(&mut self, settlement: Settlement) {
        let finished = self.guard.in_flight.take();
        if settlement == Settlement::Failed && matches!(finished, Some(InFlight::Single(_))) {
            self.guard.last_accepted = None;
        }
    }

    /// Forget the last accepted code; called when a capture session restarts
    pub fn reset_session(&mut self) {
        self.guard.last_accepted = None;
    }

    fn drop_code(&self, code: &TicketCode, reason: DropReason) -> Admission {
        tracing::trace!(code = %code, reason = reason.as_str(), "Camera code dropped");
        metrics::counter!("checkin.dispatch.dropped", "reason" => reason.as_str()).increment(1);
        Admission::Dropped(reason)
    }
}
