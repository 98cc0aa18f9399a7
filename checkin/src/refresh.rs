//! Single-slot "roster refresh needed" mailbox.
//!
//! The scanner posts after every resolved validation; the dashboard takes the
//! message when it next renders and reloads its counts. Posting twice before a
//! take still yields one message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key under which the pending-refresh flag is exposed to other views
pub const REFRESH_KEY: &str = "gatecheck:pending-roster-refresh";

/// Shared single-slot mailbox
#[derive(Clone, Debug, Default)]
pub struct RefreshMailbox {
    pending: Arc<AtomicBool>,
}

impl RefreshMailbox {
    /// Empty mailbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a refresh request
    pub fn post(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!(key = REFRESH_KEY, "Roster refresh requested");
        }
    }

    /// Take the pending request, if any. At most one caller sees `true` per post.
    #[must_use]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Peek without consuming
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
