/// One in-flight logical send
///
/// A task owns its payload until it reaches a terminal outcome, at which point
/// the payload is handed back to the caller through the completion callback.

use crate::transport::abstraction::PeerId;
use crate::TransferError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Engine-assigned identifier, increasing in enqueue order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Software throttling for links without native flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Pause length in milliseconds
    pub delay_ms: u64,
    /// Pause each time the cursor crosses a multiple of this many bytes
    pub bytes_between_delay: usize,
}

impl Pacing {
    pub fn new(delay_ms: u64, bytes_between_delay: usize) -> Self {
        Self {
            delay_ms,
            bytes_between_delay,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// A zero interval or zero delay disables pacing
    pub fn is_active(&self) -> bool {
        self.delay_ms > 0 && self.bytes_between_delay > 0
    }
}

/// Terminal report for one task, delivered exactly once
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub id: TransferId,
    pub payload: Vec<u8>,
    pub destination: PeerId,
    pub result: Result<(), TransferError>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Single-shot completion callback
pub type CompletionCallback = Box<dyn FnOnce(TransferOutcome) + Send>;

/// Mutable record of one logical send
pub struct TransferTask {
    pub(crate) id: TransferId,
    payload: Vec<u8>,
    destination: PeerId,
    /// Bytes of `payload ‖ marker` already accepted by the link
    offset: usize,
    pacing: Option<Pacing>,
    next_pace_at: usize,
    on_complete: Option<CompletionCallback>,
    created_at: Instant,
}

impl TransferTask {
    /// Create a task delivering `payload` to `destination`
    pub fn new<F>(payload: Vec<u8>, destination: PeerId, on_complete: F) -> Self
    where
        F: FnOnce(TransferOutcome) + Send + 'static,
    {
        Self {
            id: TransferId(0),
            payload,
            destination,
            offset: 0,
            pacing: None,
            next_pace_at: 0,
            on_complete: Some(Box::new(on_complete)),
            created_at: Instant::now(),
        }
    }

    /// Throttle this task; inactive pacing values are ignored
    pub fn with_pacing(mut self, pacing: Option<Pacing>) -> Self {
        self.pacing = pacing.filter(Pacing::is_active);
        self.next_pace_at = self.pacing.map(|p| p.bytes_between_delay).unwrap_or(0);
        self
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn destination(&self) -> &PeerId {
        &self.destination
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn pacing(&self) -> Option<Pacing> {
        self.pacing
    }

    /// Payload bytes handed to the link, `0 ≤ cursor ≤ payload.len()`
    pub fn cursor(&self) -> usize {
        self.offset.min(self.payload.len())
    }

    /// Stream offset including marker bytes
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn advance(&mut self, accepted: usize) {
        self.offset += accepted;
    }

    /// Delay owed before the next packet, if the cursor crossed a pacing boundary
    pub(crate) fn pacing_due(&self) -> Option<Duration> {
        let pacing = self.pacing?;
        if self.cursor() >= self.next_pace_at {
            Some(pacing.delay())
        } else {
            None
        }
    }

    /// Record that the delay for the current boundary was served
    pub(crate) fn mark_paced(&mut self) {
        if let Some(pacing) = self.pacing {
            let step = pacing.bytes_between_delay;
            self.next_pace_at = (self.cursor() / step + 1) * step;
        }
    }

    /// Consume the task and fire its callback
    pub(crate) fn finish(mut self, result: Result<(), TransferError>) {
        let elapsed = self.created_at.elapsed();
        let outcome = TransferOutcome {
            id: self.id,
            payload: std::mem::take(&mut self.payload),
            destination: self.destination.clone(),
            result,
        };
        tracing::debug!(
            "Transfer {} to {} finished in {:?}: {:?}",
            outcome.id,
            outcome.destination,
            elapsed,
            outcome.result
        );
        if let Some(callback) = self.on_complete.take() {
            callback(outcome);
        }
    }
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("len", &self.payload.len())
            .field("offset", &self.offset)
            .field("pacing", &self.pacing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_cursor_is_clamped_to_payload() {
        let mut task = TransferTask::new(vec![0u8; 10], PeerId::from("p"), |_| {});
        task.advance(10);
        assert_eq!(task.cursor(), 10);
        task.advance(3);
        assert_eq!(task.cursor(), 10);
        assert_eq!(task.offset(), 13);
    }

    #[test]
    fn test_pacing_due_on_boundaries() {
        let mut task = TransferTask::new(vec![0u8; 100], PeerId::from("p"), |_| {})
            .with_pacing(Some(Pacing::new(5, 40)));

        assert!(task.pacing_due().is_none());
        task.advance(20);
        assert!(task.pacing_due().is_none());
        task.advance(20);
        assert_eq!(task.pacing_due(), Some(Duration::from_millis(5)));

        task.mark_paced();
        assert!(task.pacing_due().is_none());

        // 40 → 90 skips past 80 without landing on it
        task.advance(50);
        assert!(task.pacing_due().is_some());
        task.mark_paced();
        assert!(task.pacing_due().is_none());
    }

    #[test]
    fn test_inactive_pacing_is_dropped() {
        let task = TransferTask::new(vec![0u8; 10], PeerId::from("p"), |_| {})
            .with_pacing(Some(Pacing::new(0, 4)));
        assert!(task.pacing().is_none());

        let task = TransferTask::new(vec![0u8; 10], PeerId::from("p"), |_| {})
            .with_pacing(Some(Pacing::new(10, 0)));
        assert!(task.pacing().is_none());
    }

    #[test]
    fn test_finish_hands_back_payload() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let task = TransferTask::new(b"hello".to_vec(), PeerId::from("p"), move |outcome| {
            *sink.lock().unwrap() = Some(outcome);
        });

        task.finish(Err(TransferError::Disconnected));

        let outcome = seen.lock().unwrap().take().expect("callback fired");
        assert_eq!(outcome.payload, b"hello".to_vec());
        assert_eq!(outcome.destination, PeerId::from("p"));
        assert!(!outcome.is_success());
    }
}
