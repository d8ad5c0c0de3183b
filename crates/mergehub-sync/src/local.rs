//! In-process pair sync between two replicas.

use mergehub_core::Replica;

use crate::error::{Result, SyncError};

/// Upper bound on alternations before giving up.
const MAX_PAIR_PASSES: usize = 1000;

/// Message counts from a [`sync_pair`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairReport {
    pub a_to_b: usize,
    pub b_to_a: usize,
    pub passes: usize,
}

/// Alternate draining each side into the other until neither produces a
/// message.
pub fn sync_pair<R: Replica>(
    a: &mut R,
    state_a: &mut R::SyncState,
    b: &mut R,
    state_b: &mut R::SyncState,
) -> Result<PairReport> {
    let mut report = PairReport::default();

    while report.passes < MAX_PAIR_PASSES {
        report.passes += 1;
        let mut progressed = false;

        while let Some(message) = a.generate_message(state_a) {
            b.receive_message(state_b, &message)?;
            report.a_to_b += 1;
            progressed = true;
        }
        while let Some(message) = b.generate_message(state_b) {
            a.receive_message(state_a, &message)?;
            report.b_to_a += 1;
            progressed = true;
        }

        if !progressed {
            return Ok(report);
        }
    }

    Err(SyncError::ProtocolViolation(format!(
        "pair sync still exchanging after {MAX_PAIR_PASSES} passes"
    )))
}
