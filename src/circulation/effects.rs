//! Best-effort collaborators
//!
//! Notifications and score adjustments never decide the outcome of a
//! circulation operation. They run after the state change is committed and
//! their failures are logged, not returned.

use std::future::Future;

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};

use super::types::{BookId, UserId};

/// Outbound member notifications (fire-and-forget)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_request_approved(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()>;

    async fn notify_request_rejected(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()>;

    /// Previous reader finished, the book is on its way to `user_id`
    async fn notify_book_in_transit(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()>;

    /// The successor confirmed receipt; sent to the outgoing holder
    async fn notify_book_delivered(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()>;

    async fn notify_handover_thread_created(
        &self,
        holder_id: UserId,
        next_holder_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()>;

    async fn notify_handover_message(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()>;
}

/// Notifier that only emits tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_request_approved(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(user_id, %book_id, title, "notify: request approved");
        Ok(())
    }

    async fn notify_request_rejected(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(user_id, %book_id, title, "notify: request rejected");
        Ok(())
    }

    async fn notify_book_in_transit(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(user_id, %book_id, title, "notify: book in transit");
        Ok(())
    }

    async fn notify_book_delivered(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(user_id, %book_id, title, "notify: book delivered");
        Ok(())
    }

    async fn notify_handover_thread_created(
        &self,
        holder_id: UserId,
        next_holder_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            holder_id,
            next_holder_id,
            %book_id,
            title,
            "notify: handover thread created"
        );
        Ok(())
    }

    async fn notify_handover_message(
        &self,
        user_id: UserId,
        book_id: BookId,
        title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(user_id, %book_id, title, "notify: new handover message");
        Ok(())
    }
}

/// Success-score accounting, owned elsewhere
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn adjust_score(
        &self,
        user_id: UserId,
        delta: i32,
        reason: &str,
        reference_type: &str,
        reference_id: &str,
    ) -> anyhow::Result<()>;
}

pub const RETURN_ON_TIME_POINTS: i32 = 10;
pub const RETURN_LATE_POINTS: i32 = -15;
pub const LOST_BOOK_POINTS: i32 = -50;

/// Score adjustments for circulation events.
///
/// Not called by the circulation services yet; callers that track return
/// punctuality invoke these directly.
pub struct ScoreHooks<S: Scorer + ?Sized> {
    scorer: std::sync::Arc<S>,
}

impl<S: Scorer + ?Sized> ScoreHooks<S> {
    pub fn new(scorer: std::sync::Arc<S>) -> Self {
        Self { scorer }
    }

    pub async fn process_return_on_time(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> anyhow::Result<()> {
        self.scorer
            .adjust_score(
                user_id,
                RETURN_ON_TIME_POINTS,
                "Returned book on time",
                "book",
                &book_id.to_string(),
            )
            .await
    }

    pub async fn process_return_late(&self, user_id: UserId, book_id: BookId) -> anyhow::Result<()> {
        self.scorer
            .adjust_score(
                user_id,
                RETURN_LATE_POINTS,
                "Returned book late",
                "book",
                &book_id.to_string(),
            )
            .await
    }

    pub async fn process_lost_book(&self, user_id: UserId, book_id: BookId) -> anyhow::Result<()> {
        self.scorer
            .adjust_score(
                user_id,
                LOST_BOOK_POINTS,
                "Lost book",
                "book",
                &book_id.to_string(),
            )
            .await
    }
}

/// Queue of best-effort effects gathered during an operation
#[derive(Default)]
pub struct SideEffects<'a> {
    tasks: Vec<(&'static str, BoxFuture<'a, anyhow::Result<()>>)>,
}

impl<'a> SideEffects<'a> {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn push(
        &mut self,
        label: &'static str,
        effect: impl Future<Output = anyhow::Result<()>> + Send + 'a,
    ) {
        self.tasks.push((label, Box::pin(effect)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every effect; returns how many failed
    pub async fn run(self) -> usize {
        let (labels, effects): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(effects).await;

        let mut failed = 0;
        for (label, result) in labels.into_iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                tracing::error!(effect = label, error = %e, "Side effect failed");
            }
        }
        failed
    }
}

/// Recording collaborators for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Notification {
        RequestApproved { user_id: UserId, book_id: BookId },
        RequestRejected { user_id: UserId, book_id: BookId },
        BookInTransit { user_id: UserId, book_id: BookId },
        BookDelivered { user_id: UserId, book_id: BookId },
        ThreadCreated {
            holder_id: UserId,
            next_holder_id: UserId,
            book_id: BookId,
        },
        HandoverMessage { user_id: UserId, book_id: BookId },
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Notifications are still recorded while failing
        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }

        pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
            self.sent.lock().unwrap().iter().filter(|n| pred(n)).count()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }

        fn record(&self, notification: Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("Mock notifier failure");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_request_approved(
            &self,
            user_id: UserId,
            book_id: BookId,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record(Notification::RequestApproved { user_id, book_id })
        }

        async fn notify_request_rejected(
            &self,
            user_id: UserId,
            book_id: BookId,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record(Notification::RequestRejected { user_id, book_id })
        }

        async fn notify_book_in_transit(
            &self,
            user_id: UserId,
            book_id: BookId,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record(Notification::BookInTransit { user_id, book_id })
        }

        async fn notify_book_delivered(
            &self,
            user_id: UserId,
            book_id: BookId,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record(Notification::BookDelivered { user_id, book_id })
        }

        async fn notify_handover_thread_created(
            &self,
            holder_id: UserId,
            next_holder_id: UserId,
            book_id: BookId,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record(Notification::ThreadCreated {
                holder_id,
                next_holder_id,
                book_id,
            })
        }

        async fn notify_handover_message(
            &self,
            user_id: UserId,
            book_id: BookId,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record(Notification::HandoverMessage { user_id, book_id })
        }
    }

    #[derive(Default)]
    pub struct RecordingScorer {
        adjustments: Mutex<Vec<(UserId, i32, String)>>,
    }

    impl RecordingScorer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn adjustments(&self) -> Vec<(UserId, i32, String)> {
            self.adjustments.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scorer for RecordingScorer {
        async fn adjust_score(
            &self,
            user_id: UserId,
            delta: i32,
            reason: &str,
            _reference_type: &str,
            _reference_id: &str,
        ) -> anyhow::Result<()> {
            self.adjustments
                .lock()
                .unwrap()
                .push((user_id, delta, reason.to_string()));
            Ok(())
        }
    }
}
