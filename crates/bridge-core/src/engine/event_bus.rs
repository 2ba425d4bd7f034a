//! Broadcast channel for transfer events.

use bridge_types::TransferEvent;
use tokio::sync::broadcast;

/// Fan-out of [`TransferEvent`]s to any number of subscribers.
///
/// Subscribers that fall more than `capacity` events behind miss the oldest
/// ones and observe a lag error on their next receive.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<TransferEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
		self.sender.subscribe()
	}

	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: TransferEvent,
	) -> Result<usize, broadcast::error::SendError<TransferEvent>> {
		self.sender.send(event)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
