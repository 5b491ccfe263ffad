//! In-process state bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use remoteswitch_domain::switch::Device;

/// Carries switch snapshots from drivers and proxies to their consumers
/// (the hub forwarder, service hosts).
///
/// Publishing never blocks: each consumer owns a bounded queue and a slow
/// consumer loses the oldest snapshots, which it is told about through
/// [`broadcast::error::RecvError::Lagged`].
#[derive(Clone)]
pub struct StateBus {
    sender: broadcast::Sender<Device>,
}

impl StateBus {
    /// Create a new bus with the given per-consumer queue capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to snapshots published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Device> {
        self.sender.subscribe()
    }

    /// Publish a snapshot to all current consumers.
    pub fn publish(&self, device: Device) {
        // send only fails when nobody listens, the snapshot is simply dropped.
        if self.sender.send(device).is_err() {
            tracing::trace!("state published without consumers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str) -> Device {
        Device::new(name, 0, vec![])
    }

    #[tokio::test]
    async fn should_deliver_snapshot_to_every_consumer() {
        let bus = StateBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(device("Stack"));

        assert_eq!(rx1.recv().await.unwrap().name, "Stack");
        assert_eq!(rx2.recv().await.unwrap().name, "Stack");
    }

    #[test]
    fn should_accept_publish_without_consumers() {
        let bus = StateBus::new(16);
        bus.publish(device("Stack"));
    }

    #[tokio::test]
    async fn should_drop_oldest_snapshots_for_slow_consumer() {
        let bus = StateBus::new(2);
        let mut rx = bus.subscribe();

        bus.publish(device("one"));
        bus.publish(device("two"));
        bus.publish(device("three"));

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().name, "two");
        assert_eq!(rx.recv().await.unwrap().name, "three");
    }
}
