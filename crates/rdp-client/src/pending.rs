//! FIFO correlation of requests with their replies.
//!
//! Packets carry no request id, so an actor pairs the Nth reply of a kind with
//! the Nth request of that kind.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::{RdpError, Result};

type Responder<T> = oneshot::Sender<Result<T>>;

/// Outstanding requests of one kind on one actor.
pub(crate) struct PendingRequests<T> {
    queue: VecDeque<Responder<T>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<T> PendingRequests<T> {
    pub fn enqueue(&mut self) -> oneshot::Receiver<Result<T>> {
        let (tx, rx) = oneshot::channel();
        self.queue.push_back(tx);
        rx
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Resolve the oldest request. Returns `false` when nothing was pending.
    pub fn resolve_one(&mut self, value: T) -> bool {
        match self.queue.pop_front() {
            Some(tx) => {
                // The caller may have stopped waiting; that is not an error here.
                let _ = tx.send(Ok(value));
                true
            }
            None => false,
        }
    }

    pub fn reject_one(&mut self, err: RdpError) -> bool {
        match self.queue.pop_front() {
            Some(tx) => {
                let _ = tx.send(Err(err));
                true
            }
            None => false,
        }
    }

    pub fn reject_all(&mut self, err: RdpError) {
        for tx in self.queue.drain(..) {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

impl<T: Clone> PendingRequests<T> {
    pub fn resolve_all(&mut self, value: T) {
        for tx in self.queue.drain(..) {
            let _ = tx.send(Ok(value.clone()));
        }
    }
}

/// Wait for the reply to a request enqueued with [`PendingRequests::enqueue`].
///
/// A dropped responder means the owning actor was torn down with the
/// connection.
pub(crate) async fn settle<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    rx.await.map_err(|_| RdpError::ConnectionClosed)?
}

/// Send order of the request kinds an actor is still waiting on.
///
/// Used to route a generic error reply to the request it answers: replies of
/// one actor arrive in request order, so the error belongs to the oldest
/// outstanding kind.
pub(crate) struct RequestOrder<K> {
    kinds: VecDeque<K>,
}

impl<K> Default for RequestOrder<K> {
    fn default() -> Self {
        Self {
            kinds: VecDeque::new(),
        }
    }
}

impl<K: Copy + PartialEq> RequestOrder<K> {
    pub fn push(&mut self, kind: K) {
        self.kinds.push_back(kind);
    }

    pub fn remove_first(&mut self, kind: K) {
        if let Some(pos) = self.kinds.iter().position(|k| *k == kind) {
            self.kinds.remove(pos);
        }
    }

    pub fn remove_all(&mut self, kind: K) {
        self.kinds.retain(|k| *k != kind);
    }

    pub fn pop_oldest(&mut self) -> Option<K> {
        self.kinds.pop_front()
    }

    pub fn clear(&mut self) {
        self.kinds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_in_enqueue_order() {
        let mut pending = PendingRequests::<u32>::default();
        let first = pending.enqueue();
        let second = pending.enqueue();
        let third = pending.enqueue();

        assert!(pending.resolve_one(1));
        assert!(pending.resolve_one(2));
        assert!(pending.resolve_one(3));
        assert!(!pending.resolve_one(4));

        assert_eq!(settle(first).await, Ok(1));
        assert_eq!(settle(second).await, Ok(2));
        assert_eq!(settle(third).await, Ok(3));
    }

    #[tokio::test]
    async fn reject_all_drains_every_waiter() {
        let mut pending = PendingRequests::<()>::default();
        let a = pending.enqueue();
        let b = pending.enqueue();
        pending.reject_all(RdpError::WrongState);

        assert!(pending.is_empty());
        assert_eq!(settle(a).await, Err(RdpError::WrongState));
        assert_eq!(settle(b).await, Err(RdpError::WrongState));
    }

    #[tokio::test]
    async fn dropped_queue_reports_connection_closed() {
        let mut pending = PendingRequests::<()>::default();
        let rx = pending.enqueue();
        drop(pending);
        assert_eq!(settle(rx).await, Err(RdpError::ConnectionClosed));
    }

    #[test]
    fn request_order_tracks_oldest_outstanding_kind() {
        let mut order = RequestOrder::default();
        order.push('a');
        order.push('b');
        order.push('a');

        order.remove_first('a');
        assert_eq!(order.pop_oldest(), Some('b'));
        assert_eq!(order.pop_oldest(), Some('a'));
        assert_eq!(order.pop_oldest(), None);

        order.push('a');
        order.push('c');
        order.push('a');
        order.remove_all('a');
        assert_eq!(order.pop_oldest(), Some('c'));
    }
}
