//! Bounded, drop-oldest event queue. When the queue is at capacity, the
//! oldest queued event is discarded to make room for the incoming one: the
//! sidecar's whole design favors recency over completeness under load, and
//! a caller publishing an event must never block behind a full queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

pub struct Observer<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> Observer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Enqueues `item`, returning the dropped item if the queue was already
    /// full. A zero-capacity queue drops every item handed to it: there is
    /// no room to evict anything into, so the incoming item itself is the
    /// one returned as dropped.
    pub fn enqueue(&self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let dropped = {
            let mut queue = self.inner.lock().expect("queue mutex poisoned");
            let dropped = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(item);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    pub async fn dequeue(&self) -> T {
        loop {
            {
                let mut queue = self.inner.lock().expect("queue mutex poisoned");
                if let Some(item) = queue.pop_front() {
                    return item;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn try_dequeue(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len() as f64 / self.capacity as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_drops_oldest_when_full() {
        let queue: Observer<i32> = Observer::new(2);
        assert_eq!(queue.enqueue(1), None);
        assert_eq!(queue.enqueue(2), None);
        assert_eq!(queue.enqueue(3), Some(1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_zero_capacity_drops_every_enqueue() {
        let queue: Observer<i32> = Observer::new(0);
        assert_eq!(queue.enqueue(1), Some(1));
        assert_eq!(queue.enqueue(2), Some(2));
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
        assert_eq!(queue.try_dequeue(), None);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_an_item() {
        let queue: std::sync::Arc<Observer<i32>> = std::sync::Arc::new(Observer::new(4));
        let consumer = queue.clone();
        let handle = tokio::spawn(async move { consumer.dequeue().await });
        tokio::task::yield_now().await;
        queue.enqueue(42);
        assert_eq!(handle.await.unwrap(), 42);
    }
}
