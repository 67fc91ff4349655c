//! Event loop.

use std::time::Duration;
use tracing::info;

use super::{now_ms, Node, NodeError, NodeState};

impl Node {
    /// Run the event loop.
    ///
    /// Processes events until a `Shutdown` event arrives or every event
    /// sender is dropped, and runs [`Node::tick`] every
    /// `node.tick_interval_ms`.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        let mut events = self.events.take().ok_or(NodeError::AlreadyRunning)?;
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.config.node.tick_interval_ms));

        self.state = NodeState::Running;
        info!("Event loop started");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            if !self.handle_event(event, now_ms()) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.tick(now_ms());
                }
            }
        }

        self.state = NodeState::Stopped;
        let stats = self.dispatcher.stats();
        info!(
            sessions = self.dispatcher.sessions().len(),
            to_tunnel = stats.to_tunnel,
            to_control = stats.to_control,
            to_switch = stats.to_switch,
            dropped = stats.dropped(),
            "Event loop stopped"
        );
        Ok(())
    }
}
