//! Delivery channel selection: push the output as it is produced, or let
//! the client poll for it chunk by chunk.
//!
//! The two modes are mutually exclusive per instance. Push setup failures
//! downgrade the instance to poll mode permanently; they are never surfaced
//! to the client, and the ring buffer remains the source of truth either
//! way.

use std::sync::Arc;
use tracing::{debug, warn};

use conterm_common::TransportError;

use crate::info::ChannelMode;

/// The transport seam: accepts bytes for unsolicited delivery to the
/// client. Implementations live with the networking collaborator.
pub trait PushEndpoint: Send + Sync {
    fn send(&self, data: &str) -> Result<(), TransportError>;
}

/// Per-instance channel state. Owned by the supervisor and mutated only
/// under its lock; actual `send` calls happen outside (see
/// [`DeliveryChannel::push_target`]).
pub struct DeliveryChannel {
    mode: ChannelMode,
    endpoint: Option<Arc<dyn PushEndpoint>>,
    connected: bool,
}

impl DeliveryChannel {
    pub fn new(mode: ChannelMode) -> Self {
        Self {
            mode,
            endpoint: None,
            connected: false,
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Register the transport endpoint used in push mode.
    pub fn set_endpoint(&mut self, endpoint: Arc<dyn PushEndpoint>) {
        self.endpoint = Some(endpoint);
    }

    pub fn connection_opened(&mut self) {
        self.connected = true;
    }

    /// Connection loss does not change the mode; the transport may
    /// reconnect and resume pushing.
    pub fn connection_closed(&mut self) {
        self.connected = false;
    }

    /// The endpoint to push through right now, or `None` when this chunk
    /// should simply wait in the buffer for the next poll.
    pub fn push_target(&self) -> Option<Arc<dyn PushEndpoint>> {
        if self.mode == ChannelMode::Push && self.connected {
            self.endpoint.clone()
        } else {
            None
        }
    }

    /// Graceful degradation after a failed push: switch to poll mode going
    /// forward. Buffered content is untouched.
    pub fn downgrade_to_poll(&mut self) {
        if self.mode == ChannelMode::Push {
            warn!("push delivery failed, downgrading to poll mode");
            self.mode = ChannelMode::Poll;
        } else {
            debug!("downgrade requested while already in poll mode");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingEndpoint {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingEndpoint {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl PushEndpoint for RecordingEndpoint {
        fn send(&self, data: &str) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::DeliveryFailed("simulated".into()));
            }
            self.sent.lock().unwrap().push(data.to_string());
            Ok(())
        }
    }

    #[test]
    fn poll_mode_never_yields_a_push_target() {
        let mut channel = DeliveryChannel::new(ChannelMode::Poll);
        channel.set_endpoint(RecordingEndpoint::new(false));
        channel.connection_opened();
        assert!(channel.push_target().is_none());
    }

    #[test]
    fn push_mode_requires_connection_and_endpoint() {
        let mut channel = DeliveryChannel::new(ChannelMode::Push);
        assert!(channel.push_target().is_none());

        channel.connection_opened();
        assert!(channel.push_target().is_none(), "no endpoint registered");

        channel.set_endpoint(RecordingEndpoint::new(false));
        assert!(channel.push_target().is_some());
    }

    #[test]
    fn connection_loss_keeps_push_mode() {
        let mut channel = DeliveryChannel::new(ChannelMode::Push);
        channel.set_endpoint(RecordingEndpoint::new(false));
        channel.connection_opened();
        channel.connection_closed();

        assert_eq!(channel.mode(), ChannelMode::Push);
        assert!(channel.push_target().is_none());

        channel.connection_opened();
        assert!(channel.push_target().is_some());
    }

    #[test]
    fn downgrade_switches_to_poll_permanently() {
        let mut channel = DeliveryChannel::new(ChannelMode::Push);
        channel.set_endpoint(RecordingEndpoint::new(true));
        channel.connection_opened();

        let endpoint = channel.push_target().unwrap();
        assert!(endpoint.send("data").is_err());
        channel.downgrade_to_poll();

        assert_eq!(channel.mode(), ChannelMode::Poll);
        assert!(channel.push_target().is_none());

        // Repeated downgrade is a no-op.
        channel.downgrade_to_poll();
        assert_eq!(channel.mode(), ChannelMode::Poll);
    }

    #[test]
    fn endpoint_records_successful_sends() {
        let endpoint = RecordingEndpoint::new(false);
        let mut channel = DeliveryChannel::new(ChannelMode::Push);
        channel.set_endpoint(endpoint.clone());
        channel.connection_opened();

        channel.push_target().unwrap().send("chunk-1").unwrap();
        assert_eq!(*endpoint.sent.lock().unwrap(), vec!["chunk-1"]);
    }
}
