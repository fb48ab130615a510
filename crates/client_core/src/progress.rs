//! Cosmetic progress indicator shown while an extraction call is outstanding.
//!
//! The percentage is not tied to backend progress. It creeps towards
//! [`PROGRESS_CAP`] and only reaches 100 when [`ExtractionProgress::finish`]
//! is called.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant},
};

pub const PROGRESS_TICK: Duration = Duration::from_millis(300);
pub const CAPTION_TICK: Duration = Duration::from_secs(2);
pub const PROGRESS_STEP: u8 = 10;
pub const PROGRESS_CAP: u8 = 90;

pub const INITIAL_CAPTION: &str = "Processing document...";
pub const CAPTIONS: [&str; 3] = [
    "Reading PDF document...",
    "Analyzing with AI...",
    "Extracting policy data...",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub caption: &'static str,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            percent: 0,
            caption: INITIAL_CAPTION,
        }
    }
}

/// Owns the two timer tasks. Dropping it (or calling `finish`) aborts them.
pub struct ExtractionProgress {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
    ticker: JoinHandle<()>,
    captions: JoinHandle<()>,
}

impl ExtractionProgress {
    /// Must be called from within a tokio runtime.
    pub fn start() -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        let tx = Arc::new(tx);

        let ticker = {
            let tx = Arc::clone(&tx);
            tokio::spawn(async move {
                let mut interval = interval_at(Instant::now() + PROGRESS_TICK, PROGRESS_TICK);
                loop {
                    interval.tick().await;
                    tx.send_if_modified(|snapshot| {
                        if snapshot.percent >= PROGRESS_CAP {
                            return false;
                        }
                        snapshot.percent = (snapshot.percent + PROGRESS_STEP).min(PROGRESS_CAP);
                        true
                    });
                }
            })
        };

        let captions = {
            let tx = Arc::clone(&tx);
            tokio::spawn(async move {
                let mut interval = interval_at(Instant::now() + CAPTION_TICK, CAPTION_TICK);
                let mut index = 0;
                loop {
                    interval.tick().await;
                    index = (index + 1) % CAPTIONS.len();
                    tx.send_modify(|snapshot| snapshot.caption = CAPTIONS[index]);
                }
            })
        };

        Self {
            tx,
            ticker,
            captions,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.tx.borrow()
    }

    /// Stops the timers and reports completion.
    pub fn finish(self) -> ProgressSnapshot {
        self.stop();
        self.tx.send_modify(|snapshot| snapshot.percent = 100);
        self.snapshot()
    }

    fn stop(&self) {
        self.ticker.abort();
        self.captions.abort();
    }
}

impl Drop for ExtractionProgress {
    fn drop(&mut self) {
        self.stop();
    }
}
