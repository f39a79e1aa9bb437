//! Due-Soon Scanner
//!
//! Background sweep that opens reader-to-reader handovers ahead of due dates.
//! A pass only touches entries with no successor yet, so repeated passes are
//! idempotent.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::effects::{Notifier, SideEffects};
use super::error::CirculationError;
use super::handover::{open_successor_thread, pair_successor};
use super::store::CirculationStore;
use super::types::ReadingHistory;

/// Configuration for the due-soon scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// How far ahead of the due date a handover opens
    pub look_ahead_days: u32,
    /// How often to scan
    pub scan_interval: Duration,
    /// Maximum entries to process per scan
    pub batch_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            look_ahead_days: 7,
            scan_interval: Duration::from_secs(3600),
            batch_size: 100,
        }
    }
}

pub struct DueSoonScanner {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn Notifier>,
    config: ScannerConfig,
}

impl DueSoonScanner {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn Notifier>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Run the scanner loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            look_ahead_days = self.config.look_ahead_days,
            "Starting due-soon scanner"
        );

        loop {
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "Due-soon scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// One pass; returns the number of threads opened
    pub async fn scan_once(&self) -> Result<usize, CirculationError> {
        self.scan_at(Utc::now()).await
    }

    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<usize, CirculationError> {
        let until = now + ChronoDuration::days(i64::from(self.config.look_ahead_days));
        let due = self
            .store
            .due_soon(now, until, self.config.batch_size)
            .await?;

        if due.is_empty() {
            debug!("No reading entries due soon");
            return Ok(0);
        }
        debug!(count = due.len(), "Reading entries due soon");

        let mut opened = 0;
        for history in &due {
            match self.process(history).await {
                Ok(true) => opened += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        history_id = %history.id,
                        book_id = %history.book_id,
                        error = %e,
                        "Failed to open handover for due entry"
                    );
                }
            }
        }

        if opened > 0 {
            info!(count = opened, "Handover threads opened this scan");
        }
        Ok(opened)
    }

    async fn process(&self, history: &ReadingHistory) -> Result<bool, CirculationError> {
        let Some(book) = self.store.get_book(history.book_id).await? else {
            return Ok(false);
        };
        let Some(next) = pair_successor(self.store.as_ref(), history).await? else {
            return Ok(false);
        };

        let mut paired = history.clone();
        paired.next_reader_id = Some(next);
        let Some(thread) = open_successor_thread(self.store.as_ref(), &book, &paired, next).await?
        else {
            return Ok(false);
        };

        let mut effects = SideEffects::new();
        effects.push(
            "notify_handover_thread_created",
            self.notifier.notify_handover_thread_created(
                thread.current_holder_id,
                thread.next_holder_id,
                book.id,
                &book.title,
            ),
        );
        effects.run().await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_config_default() {
        let config = ScannerConfig::default();
        assert_eq!(config.look_ahead_days, 7);
        assert_eq!(config.scan_interval, Duration::from_secs(3600));
        assert_eq!(config.batch_size, 100);
    }
}
