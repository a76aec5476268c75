//! Network Link
//!
//! The asynchronous boundary between a networked room and whatever transport
//! carries its traffic. Inbound frames are queued as text with their arrival
//! instant and decoded at the start of the next tick; outbound messages are
//! queued for the transport to pick up.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use super::protocol::{ClientMessage, ServerMessage};

/// Smallest gap between two drained frame stamps (seconds).
pub const MIN_STAMP_GAP: f64 = 1e-6;

/// A received text frame.
#[derive(Debug)]
struct InboundFrame {
    received: Instant,
    text: String,
}

/// Room side of the link.
#[derive(Debug)]
pub struct NetworkLink {
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    last_stamp: f64,
}

/// Transport side of the link.
#[derive(Debug)]
pub struct TransportEndpoint {
    inbound: mpsc::UnboundedSender<InboundFrame>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
}

/// Create a connected pair.
pub fn link() -> (NetworkLink, TransportEndpoint) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        NetworkLink {
            inbound: in_rx,
            outbound: out_tx,
            last_stamp: f64::NEG_INFINITY,
        },
        TransportEndpoint {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

impl NetworkLink {
    /// Decode everything received since the last drain. Undecodable frames
    /// are logged and dropped.
    ///
    /// Each message is stamped on the room clock: `now` minus the time the
    /// frame spent queued. Stamps are strictly increasing across drains.
    pub fn drain_inbound(&mut self, now: f64) -> Vec<(f64, ServerMessage)> {
        let drained_at = Instant::now();
        let mut messages = Vec::new();
        while let Ok(frame) = self.inbound.try_recv() {
            let msg = match ServerMessage::from_json(&frame.text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed server message");
                    continue;
                }
            };
            let queued = drained_at.saturating_duration_since(frame.received).as_secs_f64();
            let stamp = (now - queued).max(self.last_stamp + MIN_STAMP_GAP);
            self.last_stamp = stamp;
            messages.push((stamp, msg));
        }
        messages
    }

    /// Queue a message for the server. A closed transport is logged, not
    /// fatal.
    pub fn send(&self, msg: ClientMessage) {
        if self.outbound.send(msg).is_err() {
            warn!("Transport closed; dropping outbound message");
        }
    }
}

impl TransportEndpoint {
    /// Hand a received text frame to the room.
    pub fn deliver(&self, frame: impl Into<String>) -> bool {
        let frame = InboundFrame {
            received: Instant::now(),
            text: frame.into(),
        };
        self.inbound.send(frame).is_ok()
    }

    /// Encode and deliver a message (tests, local loopback).
    pub fn deliver_message(&self, msg: &ServerMessage) -> bool {
        match msg.to_json() {
            Ok(json) => self.deliver(json),
            Err(_) => false,
        }
    }

    /// Next outbound message, waiting for one.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.outbound.recv().await
    }

    /// Next outbound message if one is queued.
    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.outbound.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_malformed_frames_dropped() {
        let (mut link, transport) = link();
        assert!(transport.deliver("not json"));
        assert!(transport.deliver(r#"{"type":"playerJoined","count":2}"#));
        let msgs: Vec<ServerMessage> = link.drain_inbound(1.0).into_iter().map(|(_, m)| m).collect();
        assert_eq!(msgs, vec![ServerMessage::PlayerJoined { count: 2 }]);
        assert!(link.drain_inbound(1.0).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_stamped_by_arrival() {
        let (mut link, transport) = link();
        transport.deliver(r#"{"type":"playerJoined","count":2}"#);
        tokio::time::advance(Duration::from_millis(50)).await;
        transport.deliver(r#"{"type":"playerJoined","count":3}"#);
        tokio::time::advance(Duration::from_millis(10)).await;

        let stamps: Vec<f64> = link.drain_inbound(2.0).into_iter().map(|(t, _)| t).collect();
        assert_eq!(stamps.len(), 2);
        assert!((stamps[0] - 1.94).abs() < 1e-6);
        assert!((stamps[1] - 1.99).abs() < 1e-6);
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let (mut link, transport) = link();
        for count in 0..3 {
            transport.deliver_message(&ServerMessage::PlayerJoined { count });
        }
        let first: Vec<f64> = link.drain_inbound(1.0).into_iter().map(|(t, _)| t).collect();
        assert!(first.windows(2).all(|w| w[0] < w[1]));

        transport.deliver_message(&ServerMessage::PlayerLeft { count: 1 });
        let later = link.drain_inbound(0.5);
        assert!(later[0].0 > first[2]);
    }

    #[tokio::test]
    async fn test_outbound_roundtrip() {
        let (link, mut transport) = link();
        link.send(ClientMessage::Move { vx: 1.0, vy: 2.0 });
        assert_eq!(transport.recv().await, Some(ClientMessage::Move { vx: 1.0, vy: 2.0 }));
        assert!(transport.try_recv().is_none());
    }

    #[test]
    fn test_send_after_transport_dropped() {
        let (link, transport) = link();
        drop(transport);
        link.send(ClientMessage::Move { vx: 0.0, vy: 0.0 });
    }
}
