//! Event subscriptions

use halot_protocol::{Event, EventKind};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Ordered stream of client events, optionally filtered by kind
pub struct EventSubscription {
    rx: broadcast::Receiver<Event>,
    kinds: Option<Vec<EventKind>>,
}

impl EventSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<Event>, kinds: Option<Vec<EventKind>>) -> Self {
        Self { rx, kinds }
    }

    fn accepts(&self, event: &Event) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(&event.kind()),
            None => true,
        }
    }

    /// Next matching event; `None` once the client is gone
    ///
    /// A subscriber that falls more than the configured capacity behind loses
    /// the oldest events; this is logged and delivery continues.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }

    /// Next matching event if one is already buffered
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filtering() {
        let (tx, rx) = broadcast::channel(16);
        let mut sub = EventSubscription::new(rx, Some(vec![EventKind::Version]));

        tx.send(Event::Connected).unwrap();
        tx.send(Event::Version("1.0".to_string())).unwrap();

        assert_eq!(sub.recv().await, Some(Event::Version("1.0".to_string())));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_continues() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = EventSubscription::new(rx, None);

        for i in 0..5 {
            tx.send(Event::Version(i.to_string())).unwrap();
        }

        assert_eq!(sub.recv().await, Some(Event::Version("3".to_string())));
        assert_eq!(sub.recv().await, Some(Event::Version("4".to_string())));
    }

    #[tokio::test]
    async fn test_closed() {
        let (tx, rx) = broadcast::channel::<Event>(4);
        let mut sub = EventSubscription::new(rx, None);
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout() {
        let (_tx, rx) = broadcast::channel::<Event>(4);
        let mut sub = EventSubscription::new(rx, None);
        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).await, None);
    }
}
