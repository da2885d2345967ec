//! Batch-synchronising sample buffer between the periodic producer and the
//! processing loop.
//!
//! The producer half never blocks: once `capacity` samples are waiting, new
//! samples are dropped and counted. The consumer half hands out exactly
//! `capacity` samples per drain, in arrival order, and has no partial reads.

use crate::signal::{RawSample, SampleBatch};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The producing side disconnected before a full batch arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sample producer disconnected")]
pub struct BufferClosed;

/// Create a linked producer/consumer pair holding at most `capacity` samples.
pub fn sample_buffer(capacity: usize) -> (SampleProducer, SampleBuffer) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let producer = SampleProducer {
        tx,
        dropped: Arc::clone(&dropped),
    };
    let buffer = SampleBuffer {
        rx,
        capacity,
        dropped,
        reported_drops: 0,
    };
    (producer, buffer)
}

/// Write half, owned by the periodic acquisition context.
#[derive(Clone)]
pub struct SampleProducer {
    tx: Sender<RawSample>,
    dropped: Arc<AtomicU64>,
}

impl SampleProducer {
    /// Offer one sample without blocking. Returns `false` when the buffer
    /// already holds a full unread batch and the sample was dropped.
    pub fn enqueue(&self, sample: RawSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Wait up to `timeout` for room instead of dropping. Returns `Ok(false)`
    /// if the sample was not queued in time. Only for unpaced sources such as
    /// file replay; a timed producer must use [`enqueue`](Self::enqueue).
    pub fn enqueue_wait(
        &self,
        sample: RawSample,
        timeout: Duration,
    ) -> Result<bool, BufferClosed> {
        match self.tx.send_timeout(sample, timeout) {
            Ok(()) => Ok(true),
            Err(SendTimeoutError::Timeout(_)) => Ok(false),
            Err(SendTimeoutError::Disconnected(_)) => Err(BufferClosed),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Read half, owned by the cooperative processing loop.
pub struct SampleBuffer {
    rx: Receiver<RawSample>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
    reported_drops: u64,
}

impl SampleBuffer {
    /// Samples currently waiting to be drained.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Total samples dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Block until a full batch is available and return it.
    pub fn drain_batch(&mut self) -> Result<SampleBatch, BufferClosed> {
        let mut samples = Vec::with_capacity(self.capacity);
        while samples.len() < self.capacity {
            let sample = self.rx.recv().map_err(|_| BufferClosed)?;
            samples.push(sample);
        }
        self.report_drops();
        Ok(SampleBatch::new(samples))
    }

    /// Throw away whatever is waiting, e.g. samples taken while processing
    /// was paused. Returns how many were discarded.
    pub fn discard_pending(&mut self) -> usize {
        self.rx.try_iter().count()
    }

    fn report_drops(&mut self) {
        let total = self.dropped();
        if total > self.reported_drops {
            debug!(
                "{} samples dropped while the buffer was full",
                total - self.reported_drops
            );
            self.reported_drops = total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_exactly_one_batch_in_order() {
        let (producer, mut buffer) = sample_buffer(4);
        for sample in [1, 2, 3, 4] {
            assert!(producer.enqueue(sample));
        }
        let batch = buffer.drain_batch().unwrap();
        assert_eq!(batch.samples(), &[1, 2, 3, 4]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn drops_samples_once_full() {
        let (producer, mut buffer) = sample_buffer(3);
        assert!(producer.enqueue(10));
        assert!(producer.enqueue(11));
        assert!(producer.enqueue(12));
        assert!(!producer.enqueue(13));
        assert!(!producer.enqueue(14));
        assert_eq!(buffer.dropped(), 2);
        let batch = buffer.drain_batch().unwrap();
        assert_eq!(batch.samples(), &[10, 11, 12]);
        assert!(producer.enqueue(15));
    }

    #[test]
    fn drain_waits_for_producer_thread() {
        let (producer, mut buffer) = sample_buffer(100);
        let handle = std::thread::spawn(move || {
            for sample in 0..100u16 {
                assert!(producer.enqueue_wait(sample, Duration::from_secs(5)).unwrap());
            }
        });
        let batch = buffer.drain_batch().unwrap();
        handle.join().unwrap();
        assert_eq!(batch.len(), 100);
        assert_eq!(batch.samples()[99], 99);
    }

    #[test]
    fn partial_batch_is_not_returned_when_producer_leaves() {
        let (producer, mut buffer) = sample_buffer(5);
        producer.enqueue(1);
        producer.enqueue(2);
        drop(producer);
        assert_eq!(buffer.drain_batch(), Err(BufferClosed));
    }

    #[test]
    fn waiting_enqueue_times_out_when_full() {
        let (producer, _buffer) = sample_buffer(1);
        assert_eq!(producer.enqueue_wait(1, Duration::from_millis(5)), Ok(true));
        assert_eq!(producer.enqueue_wait(2, Duration::from_millis(5)), Ok(false));
        assert_eq!(producer.dropped(), 0);
    }

    #[test]
    fn discard_pending_empties_the_buffer() {
        let (producer, mut buffer) = sample_buffer(4);
        producer.enqueue(1);
        producer.enqueue(2);
        assert_eq!(buffer.discard_pending(), 2);
        assert_eq!(buffer.pending(), 0);
        for sample in [7, 8, 9, 10] {
            producer.enqueue(sample);
        }
        assert_eq!(buffer.drain_batch().unwrap().samples(), &[7, 8, 9, 10]);
    }
}
