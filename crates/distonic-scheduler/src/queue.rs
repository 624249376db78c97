//! In-memory order queue with a coalescing bell.

use distonic_core::Order;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

/// FIFO queue between watchers and workers.
///
/// Any number of producers may call [`schedule`](Self::schedule); exactly one
/// task runs [`dispatch`](Self::dispatch). The bell holds at most one pending
/// ring, so bursts of orders wake the dispatcher once and it drains them all.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: Mutex<VecDeque<Order>>,
    bell: Notify,
    closed: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order and ring the bell. Never waits on workers.
    pub fn schedule(&self, order: Order) {
        if self.closed.load(Ordering::Acquire) {
            warn!(order = %order, "Queue is closed, dropping order");
            return;
        }

        debug!(order = %order, "Scheduling order");
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(order);
        self.bell.notify_one();
    }

    /// Stop accepting orders. The dispatch loop returns once the queue is
    /// drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.bell.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of orders waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn pop(&self) -> Option<Order> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Move orders into `workers` until the queue is closed and empty.
    ///
    /// Waits while `workers` is full, which is the only point where the pool
    /// pushes back. Dropping `workers` on return closes the channel.
    pub async fn dispatch(&self, workers: mpsc::Sender<Order>) {
        info!("Dispatch loop started");
        loop {
            while self.pending() > 0 {
                // Take a slot before popping so a blocked send never holds an
                // order outside the queue.
                let Ok(slot) = workers.reserve().await else {
                    warn!(pending = self.pending(), "All workers are gone, stopping dispatch");
                    return;
                };
                if let Some(order) = self.pop() {
                    debug!(order = %order, "Dispatching order");
                    slot.send(order);
                }
            }

            if self.is_closed() && self.pending() == 0 {
                info!("Queue closed and drained, dispatch loop finished");
                return;
            }

            self.bell.notified().await;
        }
    }
}
