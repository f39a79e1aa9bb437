//! Service wiring
//!
//! One `Library` per process: every service shares the same store and
//! notifier.

use std::sync::Arc;

use crate::circulation::{
    AdminAdjudicator, CirculationDesk, CirculationStore, DueSoonScanner, HandoverCoordinator,
    Notifier, ReadingHistoryLedger, RequestLedger,
};
use crate::config::CirculationConfig;

pub struct Library {
    pub desk: CirculationDesk,
    pub requests: RequestLedger,
    pub history: ReadingHistoryLedger,
    pub handover: HandoverCoordinator,
    pub admin: AdminAdjudicator,
    pub scanner: DueSoonScanner,
}

impl Library {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn Notifier>,
        config: &CirculationConfig,
    ) -> Self {
        Self {
            desk: CirculationDesk::new(store.clone())
                .with_default_reading_days(config.default_reading_days),
            requests: RequestLedger::new(store.clone()).with_policy(config.request_policy),
            history: ReadingHistoryLedger::new(store.clone()),
            handover: HandoverCoordinator::new(store.clone(), notifier.clone()),
            admin: AdminAdjudicator::new(store.clone(), notifier.clone()),
            scanner: DueSoonScanner::new(store, notifier, config.scanner()),
        }
    }
}
