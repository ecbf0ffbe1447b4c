//! Per-entity job serialization
//!
//! Each contract address gets one FIFO worker. Jobs for the same address
//! run one at a time in submission order; different addresses interleave.

use std::future::Future;
use std::pin::Pin;

use alloy_primitives::Address;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
pub struct EntitySequencer {
    lanes: DashMap<Address, mpsc::UnboundedSender<Job>>,
}

impl EntitySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job` behind every job already submitted for `key`.
    pub fn submit<F>(&self, key: Address, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let lane = self.lanes.entry(key).or_insert_with(|| spawn_lane(key));
        if lane.send(Box::pin(job)).is_err() {
            tracing::error!(%key, "Sequencer lane closed, job dropped");
        }
    }

    /// Wait until every job submitted for `key` so far has finished.
    pub async fn flush(&self, key: Address) {
        let (tx, rx) = oneshot::channel();
        self.submit(key, async move {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }
}

fn spawn_lane(key: Address) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            // A panicking job only takes down its own task
            if let Err(e) = tokio::spawn(job).await {
                if e.is_panic() {
                    tracing::error!(%key, "Sequenced job panicked");
                }
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_jobs_run_in_order_per_key() {
        let sequencer = EntitySequencer::new();
        let key = Address::repeat_byte(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u64 {
            let seen = seen.clone();
            sequencer.submit(key, async move {
                // Later jobs sleep less; order must still hold
                tokio::time::sleep(Duration::from_millis(10 - 2 * i)).await;
                seen.lock().await.push(i);
            });
        }
        sequencer.flush(key).await;

        assert_eq!(*seen.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_keys_do_not_block_each_other() {
        let sequencer = EntitySequencer::new();
        let slow = Address::repeat_byte(1);
        let fast = Address::repeat_byte(2);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        sequencer.submit(slow, async move {
            let _ = release_rx.await;
        });
        // The fast lane completes while the slow lane is still parked
        sequencer.flush(fast).await;
        assert_eq!(sequencer.lanes(), 2);

        let _ = release_tx.send(());
        sequencer.flush(slow).await;
    }

    #[tokio::test]
    async fn test_panicking_job_is_isolated() {
        let sequencer = EntitySequencer::new();
        let key = Address::repeat_byte(3);
        let ran = Arc::new(Mutex::new(false));

        sequencer.submit(key, async { panic!("handler bug") });
        let flag = ran.clone();
        sequencer.submit(key, async move {
            *flag.lock().await = true;
        });
        sequencer.flush(key).await;

        assert!(*ran.lock().await);
    }
}
