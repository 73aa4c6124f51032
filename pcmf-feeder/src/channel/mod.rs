//! Cross-context message channels
//!
//! A [`MessagePort`] is one end of a bidirectional channel built from two
//! unbounded tokio mpsc queues. Every message owns its payload, so nothing is
//! shared between contexts. Delivery is in order per direction; there is no
//! ordering between the two directions.
//!
//! The render side only ever calls [`MessagePort::try_recv`], which never
//! blocks.

pub mod messages;
pub mod request;

pub use messages::{ControlMessage, ProcessorEvent, ProtocolChannel, WireCommand};
pub use request::{FillCallback, FillQueryTracker};

use crate::error::{Error, Result};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Controller end: sends commands, receives processor events
pub type ControllerPort = MessagePort<ControlMessage, ProcessorEvent>;

/// Processor end: sends events, receives commands
pub type ProcessorPort = MessagePort<ProcessorEvent, ControlMessage>;

/// One end of a bidirectional channel
#[derive(Debug)]
pub struct MessagePort<Out, In> {
    tx: UnboundedSender<Out>,
    rx: UnboundedReceiver<In>,
}

/// Create a connected pair of ports
pub fn port_pair<A, B>() -> (MessagePort<A, B>, MessagePort<B, A>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    (
        MessagePort { tx: a_tx, rx: b_rx },
        MessagePort { tx: b_tx, rx: a_rx },
    )
}

impl<Out, In> MessagePort<Out, In> {
    /// Send a message to the peer
    pub fn post(&self, message: Out) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::ChannelClosed("peer port dropped or closed".to_string()))
    }

    /// Take the next pending message without blocking
    pub fn try_recv(&mut self) -> Option<In> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next message (async contexts)
    pub async fn recv(&mut self) -> Option<In> {
        self.rx.recv().await
    }

    /// Wait for the next message (plain threads, never inside a runtime)
    pub fn blocking_recv(&mut self) -> Option<In> {
        self.rx.blocking_recv()
    }

    /// Independent sending handle for the outgoing direction
    pub fn sender(&self) -> PortSender<Out> {
        PortSender(self.tx.clone())
    }

    /// Stop accepting messages; the peer's posts fail from now on
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// True once the peer can no longer receive
    pub fn is_peer_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Cloneable sending half of a port
#[derive(Debug)]
pub struct PortSender<T>(UnboundedSender<T>);

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> PortSender<T> {
    pub fn post(&self, message: T) -> Result<()> {
        self.0
            .send(message)
            .map_err(|_| Error::ChannelClosed("peer port dropped or closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_both_directions_in_order() {
        let (mut left, mut right) = port_pair::<u32, &'static str>();

        left.post(1).unwrap();
        left.post(2).unwrap();
        right.post("a").unwrap();

        assert_eq!(right.try_recv(), Some(1));
        assert_eq!(right.try_recv(), Some(2));
        assert_eq!(right.try_recv(), None);
        assert_eq!(left.try_recv(), Some("a"));
    }

    #[test]
    fn test_close_fails_peer_posts() {
        let (left, mut right) = port_pair::<u32, u32>();
        right.close();

        assert!(left.is_peer_closed());
        assert!(matches!(left.post(7), Err(Error::ChannelClosed(_))));
    }

    #[test]
    fn test_sender_outlives_borrow() {
        let (left, mut right) = port_pair::<u32, ()>();
        let sender = left.sender();
        let clone = sender.clone();

        sender.post(5).unwrap();
        clone.post(6).unwrap();
        assert_eq!(right.try_recv(), Some(5));
        assert_eq!(right.try_recv(), Some(6));
    }

    #[tokio::test]
    async fn test_async_recv() {
        let (left, mut right) = port_pair::<String, ()>();
        left.post("hello".to_string()).unwrap();

        assert_eq!(right.recv().await.as_deref(), Some("hello"));
    }
}
