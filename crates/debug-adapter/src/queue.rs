//! FIFO serialization of breakpoint work.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Completion signal of one slot. A slot dropped before its turn hands its own
/// predecessor on, so the successor keeps waiting on whatever is still ahead of it.
#[derive(Debug)]
struct Handoff(Option<oneshot::Receiver<Handoff>>);

/// Runs queued operations one at a time in the order they were enqueued.
///
/// The slot is taken when [`SerialQueue::run`] is called, not when the returned future is
/// first polled. An operation that fails releases the next one. An operation whose caller
/// goes away before it starts passes its place to the next one without releasing it early.
#[derive(Debug, Default)]
pub struct SerialQueue {
    tail: Mutex<Option<oneshot::Receiver<Handoff>>>,
}

struct Slot {
    waiting: Option<oneshot::Receiver<Handoff>>,
    done: Option<oneshot::Sender<Handoff>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Handoff(self.waiting.take()));
        }
    }
}

impl SerialQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<F, T>(&self, work: F) -> impl Future<Output = T>
    where
        F: Future<Output = T>,
    {
        let (done, done_rx) = oneshot::channel::<Handoff>();
        let previous = self.tail.lock().replace(done_rx);
        let mut slot = Slot {
            waiting: previous,
            done: Some(done),
        };
        async move {
            loop {
                let next = match slot.waiting.as_mut() {
                    // Err only if the predecessor went away without a handoff
                    Some(waiting) => waiting.await.ok().and_then(|handoff| handoff.0),
                    None => break,
                };
                slot.waiting = next;
            }
            let output = work.await;
            drop(slot);
            output
        }
    }

    /// Detaches the queue from everything already enqueued. Operations enqueued afterwards
    /// start without waiting for them.
    pub fn reset(&self) {
        self.tail.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_in_enqueue_order() {
        let queue = SerialQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = Arc::clone(&log);
            queue.run(async move {
                log.lock().push("slow:start");
                tokio::time::sleep(Duration::from_millis(30)).await;
                log.lock().push("slow:end");
            })
        };
        let fast = {
            let log = Arc::clone(&log);
            queue.run(async move {
                log.lock().push("fast");
            })
        };
        // poll the later one first; it must still wait
        let (_, _) = tokio::join!(fast, slow);
        assert_eq!(*log.lock(), vec!["slow:start", "slow:end", "fast"]);
    }

    #[tokio::test]
    async fn failure_does_not_block_successors() {
        let queue = SerialQueue::new();
        let first = queue.run(async { Err::<(), &str>("boom") });
        let second = queue.run(async { Ok::<u8, &str>(7) });
        assert_eq!(first.await, Err("boom"));
        assert_eq!(second.await, Ok(7));
    }

    #[tokio::test]
    async fn dropped_operation_releases_the_next() {
        let queue = SerialQueue::new();
        let abandoned = queue.run(async {});
        let next = queue.run(async { 1 });
        drop(abandoned);
        assert_eq!(next.await, 1);
    }

    #[tokio::test]
    async fn dropped_waiter_keeps_its_successor_behind_the_running_one() {
        let queue = SerialQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let running = {
            let log = Arc::clone(&log);
            tokio::spawn(queue.run(async move {
                log.lock().push("a:start");
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().push("a:end");
            }))
        };
        let abandoned = {
            let log = Arc::clone(&log);
            queue.run(async move {
                log.lock().push("b");
            })
        };
        let last = {
            let log = Arc::clone(&log);
            queue.run(async move {
                log.lock().push("c");
            })
        };
        tokio::task::yield_now().await;
        drop(abandoned);
        last.await;
        running.await.expect("first operation");
        assert_eq!(*log.lock(), vec!["a:start", "a:end", "c"]);
    }

    #[tokio::test]
    async fn reset_skips_stale_operations() {
        let queue = SerialQueue::new();
        let (_hold, held) = oneshot::channel::<()>();
        let stuck = queue.run(async move {
            let _ = held.await;
        });
        let stuck = tokio::spawn(stuck);
        queue.reset();
        let fresh = tokio::time::timeout(Duration::from_millis(200), queue.run(async { "ran" }))
            .await
            .expect("fresh operation must not wait");
        assert_eq!(fresh, "ran");
        stuck.abort();
    }
}
