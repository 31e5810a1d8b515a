use std::time::Duration;

use entity_sorter::{Clock, EntityId, InstanceId, MessageSorter, RequestMessage, Uuid};
use tokio::task::yield_now;

use crate::transport::{Incoming, Outgoing};

/// Signal `to` with `add 1`, `add 2`, … `add n`.
pub async fn produce(
    from: InstanceId,
    to: InstanceId,
    n: u32,
    window: Duration,
    mut outgoing: Outgoing,
) {
    let clock = Clock::new();
    let mut sorter = MessageSorter::new();
    let execution = Uuid::new_v4().to_string();

    for i in 1..=n {
        let mut message = RequestMessage::signal("add", Some(i.to_string()))
            .from_parent(from.clone(), Some(execution.clone()));
        sorter.label_outgoing(&mut message, &to, clock.now(), window);

        tracing::debug!(%message, label = ?message.label, "sending");
        outgoing.send(message);
        yield_now().await;
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    pub total: u64,
    pub applied: Vec<u32>,
    pub sorter: MessageSorter,
}

impl Counter {
    fn apply(&mut self, message: &RequestMessage) {
        let (Some("add"), Some(Ok(n))) = (
            message.operation.as_deref(),
            message.input.as_deref().map(str::parse::<u32>),
        ) else {
            tracing::warn!(%message, "unknown operation");
            return;
        };

        self.total += u64::from(n);
        self.applied.push(n);
    }
}

/// Run the counter entity until the transport closes.
pub async fn consume(id: EntityId, window: Duration, mut incoming: Incoming) -> Counter {
    let mut counter = Counter::default();

    while let Some(message) = incoming.recv().await {
        // scheduled messages carry no ordering guarantee
        let batch = if message.is_scheduled() {
            vec![message]
        } else {
            counter.sorter.receive_in_order(message, window)
        };
        tracing::trace!(entity = %id, ready = batch.len(), buffered = counter.sorter.number_buffered());

        for message in batch {
            counter.apply(&message);
        }
    }

    tracing::info!(
        entity = %id,
        buffered = counter.sorter.number_buffered(),
        stats = ?counter.sorter.stats(),
        "transport closed"
    );
    counter
}
