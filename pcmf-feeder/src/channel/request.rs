//! Fill-query correlation
//!
//! Each query gets the next id from a monotonic counter. At most one query
//! with a callback may be outstanding; its callback runs once when the
//! matching update arrives and is then dropped.

use crate::error::{Error, Result};
use tracing::trace;

/// One-shot callback receiving the reported fill (frames)
pub type FillCallback = Box<dyn FnOnce(usize) + Send>;

/// Pending fill query slot
#[derive(Default)]
pub struct FillQueryTracker {
    next_id: u64,
    pending: Option<(u64, FillCallback)>,
}

impl std::fmt::Debug for FillQueryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillQueryTracker")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending.as_ref().map(|(id, _)| *id))
            .finish()
    }
}

impl FillQueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback and allocate its request id
    pub fn begin(&mut self, callback: FillCallback) -> Result<u64> {
        if let Some((id, _)) = &self.pending {
            return Err(Error::FillQueryPending(*id));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some((id, callback));
        Ok(id)
    }

    /// Drop a registration whose request never went out
    pub fn abandon(&mut self, request_id: u64) {
        if matches!(&self.pending, Some((id, _)) if *id == request_id) {
            self.pending = None;
        }
    }

    /// Deliver an update; runs the pending callback if the id matches
    pub fn resolve(&mut self, request_id: Option<u64>, fill: usize) -> bool {
        let Some(request_id) = request_id else {
            return false;
        };

        match self.pending.take() {
            Some((id, callback)) if id == request_id => {
                trace!("Fill query {} resolved: {} frames", id, fill);
                callback(fill);
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    pub fn pending_id(&self) -> Option<u64> {
        self.pending.as_ref().map(|(id, _)| *id)
    }
}
