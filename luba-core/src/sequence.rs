//! Per-direction sequence counters and the acknowledgement tracker.
//!
//! Each counter wraps at 256. The read side is lenient: a frame whose
//! sequence differs from the expected one is reported as an anomaly and
//! the counter jumps to follow the device, so a lost notification never
//! wedges the session.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::LubaError;

// ── SequenceCounter ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    next: u8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current value and advance, wrapping 255 → 0.
    pub fn next_sequence(&mut self) -> u8 {
        let current = self.next;
        self.next = self.next.wrapping_add(1);
        current
    }

    /// The value the next call to [`next_sequence`](Self::next_sequence) returns.
    pub fn peek(&self) -> u8 {
        self.next
    }

    /// Check an observed read sequence against the expected one.
    ///
    /// On a match the counter advances. On a mismatch the counter is
    /// resynchronized so that `observed + 1` is expected next, and the
    /// anomaly is returned for the caller to log.
    pub fn observe(&mut self, observed: u8) -> Result<(), LubaError> {
        let expected = self.next;
        self.next = observed.wrapping_add(1);
        if observed == expected {
            Ok(())
        } else {
            Err(LubaError::SequenceAnomaly { expected, observed })
        }
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

// ── Acknowledgements ─────────────────────────────────────────────

/// Value pushed when an ack frame arrives without a payload byte.
pub const EMPTY_ACK: u16 = 256;

/// Extract the acknowledged sequence from a control ack payload.
pub fn parse_ack(payload: &[u8]) -> u16 {
    payload.first().map(|b| *b as u16).unwrap_or(EMPTY_ACK)
}

/// Producer half, held by the inbound notification path.
#[derive(Debug, Clone)]
pub struct AckSender {
    tx: mpsc::Sender<u16>,
}

impl AckSender {
    /// Push an ack value without blocking the notification path.
    ///
    /// Acks that nobody is waiting for pile up to the channel bound
    /// and are then dropped.
    pub fn push(&self, ack: u16) {
        if self.tx.try_send(ack).is_err() {
            debug!(ack, "ack queue full or closed; dropping ack");
        }
    }
}

/// Consumer half, owned by the post pipeline.
#[derive(Debug)]
pub struct AckTracker {
    rx: mpsc::Receiver<u16>,
    tx: mpsc::Sender<u16>,
}

impl AckTracker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self { rx, tx }
    }

    pub fn sender(&self) -> AckSender {
        AckSender {
            tx: self.tx.clone(),
        }
    }

    /// Discard acks left over from an earlier post.
    pub fn drain_stale(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Wait up to `timeout` for the next ack and compare it to `expected`.
    pub async fn wait_for(&mut self, expected: u8, timeout: Duration) -> Result<(), LubaError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(ack)) if ack == expected as u16 => Ok(()),
            Ok(Some(ack)) => Err(LubaError::AckMismatch {
                expected,
                received: ack,
            }),
            // The tracker keeps its own sender alive, so this arm is
            // unreachable in practice.
            Ok(None) => Err(LubaError::ChannelClosed),
            Err(_) => Err(LubaError::AckTimeout(timeout)),
        }
    }
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_sequence_wraps_after_256() {
        let mut counter = SequenceCounter::new();
        let first = counter.next_sequence();
        for _ in 0..255 {
            counter.next_sequence();
        }
        assert_eq!(counter.next_sequence(), first);
    }

    #[test]
    fn observe_in_order() {
        let mut counter = SequenceCounter::new();
        for seq in 0..=255u8 {
            counter.observe(seq).unwrap();
        }
        counter.observe(0).unwrap();
    }

    #[test]
    fn observe_gap_resynchronizes() {
        let mut counter = SequenceCounter::new();
        counter.observe(0).unwrap();
        let err = counter.observe(5).unwrap_err();
        assert!(matches!(
            err,
            LubaError::SequenceAnomaly {
                expected: 1,
                observed: 5
            }
        ));
        // Follows the device from here on.
        counter.observe(6).unwrap();
        assert_eq!(counter.peek(), 7);
    }

    #[test]
    fn parse_ack_payloads() {
        assert_eq!(parse_ack(&[7]), 7);
        assert_eq!(parse_ack(&[255, 1]), 255);
        assert_eq!(parse_ack(&[]), EMPTY_ACK);
    }

    #[tokio::test]
    async fn ack_matches_expected() {
        let mut tracker = AckTracker::new();
        tracker.sender().push(3);
        tracker.wait_for(3, Duration::from_millis(50)).await.unwrap();
    }

    #[tokio::test]
    async fn ack_mismatch_fails() {
        let mut tracker = AckTracker::new();
        tracker.sender().push(EMPTY_ACK);
        let err = tracker
            .wait_for(3, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LubaError::AckMismatch {
                expected: 3,
                received: 256
            }
        ));
    }

    #[tokio::test]
    async fn ack_wait_is_bounded() {
        let mut tracker = AckTracker::new();
        let err = tracker
            .wait_for(0, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LubaError::AckTimeout(_)));
    }

    #[tokio::test]
    async fn drain_stale_acks() {
        let mut tracker = AckTracker::new();
        let sender = tracker.sender();
        sender.push(1);
        sender.push(2);
        assert_eq!(tracker.drain_stale(), 2);
        assert!(tracker.wait_for(1, Duration::from_millis(10)).await.is_err());
    }
}
