//! §4.4: `WaitForInstruments` — a countdown latch shared by one
//! `ArriveAtLatchTask` per named instrument, used to synchronize several
//! instruments at a rendezvous point.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use labcore_error::Result;
use tokio::sync::Notify;

use crate::task::{AbortSignal, Task, TaskBody, TaskOutcome};
use crate::task_queue::TaskQueue;

/// A countdown latch: [`Latch::wait`] returns once [`Latch::arrive`] has
/// been called `count` times.
pub struct Latch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl Latch {
    #[must_use]
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        })
    }

    pub fn arrive(&self) {
        if self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            Some(n.saturating_sub(1))
        }) == Ok(1)
        {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        loop {
            if self.remaining.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.remaining.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements a [`Latch`] on execution; as a safety net, also decrements it
/// on drop if it never ran (§4.4: "the task arrives at the latch when
/// executed or ... when destroyed without having run"), so an abort path
/// can never deadlock `WaitForInstruments`.
pub struct ArriveAtLatchTask {
    latch: Arc<Latch>,
    arrived: AtomicBool,
}

impl ArriveAtLatchTask {
    #[must_use]
    pub fn new(latch: Arc<Latch>) -> Self {
        Self {
            latch,
            arrived: AtomicBool::new(false),
        }
    }

    fn arrive_once(&self) {
        if !self.arrived.swap(true, Ordering::SeqCst) {
            self.latch.arrive();
        }
    }
}

#[async_trait]
impl TaskBody for ArriveAtLatchTask {
    async fn run_child(&mut self, _abort: &AbortSignal) -> Result<TaskOutcome> {
        self.arrive_once();
        Ok(TaskOutcome::Continue)
    }
}

impl Drop for ArriveAtLatchTask {
    fn drop(&mut self) {
        self.arrive_once();
    }
}

/// Enqueues one [`ArriveAtLatchTask`] on each instrument's queue and blocks
/// until every one of them has arrived — by running or by being discarded.
pub async fn wait_for_instruments(queues: &[&TaskQueue]) -> Result<()> {
    let latch = Latch::new(queues.len());
    for queue in queues {
        let body = ArriveAtLatchTask::new(Arc::clone(&latch));
        queue.enqueue(Arc::new(Task::new(Box::new(body), false, None)))?;
    }
    latch.wait().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latch_releases_once_every_participant_arrives() {
        let latch = Latch::new(2);
        let waiter = Arc::clone(&latch);
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        latch.arrive();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        latch.arrive();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_an_unrun_task_still_arrives_at_the_latch() {
        let latch = Latch::new(1);
        let task = Task::new(Box::new(ArriveAtLatchTask::new(Arc::clone(&latch))), false, None);
        drop(task);
        tokio::time::timeout(std::time::Duration::from_millis(50), latch.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_two_queues_completes_once_both_tasks_run() {
        let q1 = TaskQueue::new(16);
        let q2 = TaskQueue::new(16);

        async fn drain(q: &TaskQueue) {
            for _ in 0..20 {
                if let Some(task) = q.pop_next() {
                    task.run().await;
                    q.retire(task);
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        }

        let waited = tokio::join!(
            wait_for_instruments(&[&q1, &q2]),
            drain(&q1),
            drain(&q2),
        )
        .0;
        waited.unwrap();
    }
}
