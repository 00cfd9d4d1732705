use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use concurrent_queue::ConcurrentQueue;
use tokio::sync::Notify;

/// Work queue shared by a fixed set of workers.
///
/// Every `put` raises the outstanding count and every `task_done` lowers it;
/// `join` resolves once the count is back at zero, whichever worker finished last.
#[derive(Debug)]
pub struct TaskQueue<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    items: ConcurrentQueue<T>,
    unfinished: AtomicUsize,
    drained: Notify,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: ConcurrentQueue::unbounded(),
                unfinished: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    pub fn put(&self, value: T) -> anyhow::Result<()> {
        self.inner.unfinished.fetch_add(1, Ordering::SeqCst);
        if self.inner.items.push(value).is_err() {
            self.task_done();
            anyhow::bail!("task queue is closed");
        }
        Ok(())
    }

    /// Takes the next item, `None` once the queue is empty.
    pub fn get(&self) -> Option<T> {
        self.inner.items.pop().ok()
    }

    /// Hands out a guard that marks one task done when dropped, so a panicking
    /// worker still releases the barrier.
    pub fn ticket(&self) -> TaskTicket<'_, T> {
        TaskTicket { queue: self }
    }

    pub fn task_done(&self) {
        let previous = self
            .inner
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_else(|n| n);
        if previous <= 1 {
            self.inner.drained.notify_waiters();
        }
    }

    pub async fn join(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn qsize(&self) -> usize {
        self.inner.items.len()
    }

    pub fn unfinished(&self) -> usize {
        self.inner.unfinished.load(Ordering::SeqCst)
    }
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Display for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<TaskQueue {} queued, {} unfinished>",
            self.qsize(),
            self.unfinished()
        )
    }
}

pub struct TaskTicket<'a, T> {
    queue: &'a TaskQueue<T>,
}

impl<T> Drop for TaskTicket<'_, T> {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}
