use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One unit of post-response work: goal tracking plus memory extraction
/// for the turn that just finished streaming.
#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub personality_id: Uuid,
    pub user_message: String,
    pub detected_emotion: Option<String>,
}

struct QueueInner {
    jobs: Mutex<VecDeque<BackgroundJob>>,
    notify: Notify,
    capacity: usize,
}

/// Bounded queue feeding the background worker.
///
/// A turn never blocks on analysis: when the queue is full the oldest
/// pending job is dropped to make room.
#[derive(Clone)]
pub struct BackgroundQueue {
    inner: Arc<QueueInner>,
}

impl BackgroundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn submit(&self, job: BackgroundJob) {
        {
            let mut jobs = self.inner.jobs.lock().unwrap();
            if jobs.len() >= self.inner.capacity {
                let dropped = jobs.pop_front();
                warn!(
                    conversation_id = ?dropped.map(|j| j.conversation_id),
                    "background queue saturated, dropped oldest job"
                );
            }
            jobs.push_back(job);
        }
        self.inner.notify.notify_one();
    }

    pub async fn next(&self) -> BackgroundJob {
        loop {
            if let Some(job) = self.inner.jobs.lock().unwrap().pop_front() {
                return job;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Supervised worker: drains the queue for the life of the process.
/// Job failures are logged and never surfaced to any turn.
pub async fn run_worker(queue: BackgroundQueue, ctx: Arc<crate::context::ChatContext>) {
    info!("background analysis worker started");
    loop {
        let job = queue.next().await;
        run_job(&ctx, &job).await;
    }
}

async fn run_job(ctx: &crate::context::ChatContext, job: &BackgroundJob) {
    debug!(conversation_id = %job.conversation_id, "running background analysis");

    // Goal tracking
    if let Err(e) = ctx
        .goals
        .detect_and_track(
            &ctx.goal_detector,
            job.user_id,
            &job.user_message,
            Some(job.conversation_id),
            job.detected_emotion.as_deref(),
        )
        .await
    {
        warn!(error = %e, "background goal tracking failed");
    }

    // Memory extraction over the current buffer window
    let recent = ctx.buffer.recent(job.conversation_id, None).await;
    match ctx.extractor.extract_and_store(job.conversation_id, &recent).await {
        Ok(count) if count > 0 => {
            info!(conversation_id = %job.conversation_id, count, "extracted memories");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "background memory extraction failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(n: u32) -> BackgroundJob {
        BackgroundJob {
            conversation_id: Uuid::from_u128(n as u128),
            user_id: Uuid::new_v4(),
            personality_id: Uuid::new_v4(),
            user_message: format!("message {n}"),
            detected_emotion: None,
        }
    }

    #[tokio::test]
    async fn saturation_drops_oldest() {
        let queue = BackgroundQueue::new(2);
        queue.submit(job(1));
        queue.submit(job(2));
        queue.submit(job(3));

        assert_eq!(queue.len(), 2);
        let first = queue.next().await;
        assert_eq!(first.conversation_id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn next_waits_for_submission() {
        let queue = BackgroundQueue::new(4);
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.next().await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        queue.submit(job(7));

        let received = handle.await.unwrap();
        assert_eq!(received.conversation_id, Uuid::from_u128(7));
    }
}
