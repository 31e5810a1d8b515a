use std::collections::{btree_map::Entry, BTreeMap};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{instrument, Level};

use super::MIN_COLLECTION_INTERVAL;
use crate::{
    id::InstanceId,
    message::{Label, RequestMessage},
    time::Timestamp,
};

/// The receiving half of a [`MessageSorter`][super::MessageSorter]: holds back
/// messages which arrive before their predecessor, and drops duplicates, until
/// the sender’s reorder window has passed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "camelCase")
)]
pub struct Inbox {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    received: BTreeMap<InstanceId, ReceiveBuffer>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Timestamp::is_zero"))]
    horizon: Timestamp,
    #[cfg_attr(feature = "serde", serde(skip))]
    counts: Option<(usize, usize)>,
}

/// Per-sender receive state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "camelCase")
)]
struct ReceiveBuffer {
    /// The timestamp of the last message released, or `None`.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    last: Option<Timestamp>,
    /// The sender’s execution ID, as of the last message.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    execution: Option<String>,
    /// Messages waiting for their predecessor, keyed by predecessor.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    buffered: BTreeMap<Timestamp, RequestMessage>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a message (which may be a duplicate, arrive out of order, or
    /// arrive late), and return the messages which can now be processed, in
    /// the order they were sent.
    ///
    /// Within the reorder window of its sender, each message is returned
    /// exactly once, and only after every message sent before it to this
    /// receiver. Past the window, messages are returned immediately as they
    /// arrive, even if they are duplicates; processing must tolerate that.
    ///
    /// If `window` is zero, or the message is [not sortable][RequestMessage::is_sortable],
    /// it is returned as-is.
    #[cfg_attr(feature = "tracing", instrument(level = Level::TRACE, skip_all, fields(message = %message.id, sender = ?message.parent)))]
    pub fn receive(&mut self, message: RequestMessage, window: Duration) -> Vec<RequestMessage> {
        if window.is_zero() || !message.is_sortable() {
            return vec![message];
        }

        debug_assert!(
            message.label.is_some(),
            "{message} was not labeled by its sender"
        );
        let (Some(sender), Some(label)) = (message.parent.clone(), message.label) else {
            return vec![message];
        };

        let mut delivered = Vec::new();

        let collecting = self.horizon + window + MIN_COLLECTION_INTERVAL < label.timestamp;
        if collecting {
            self.collect(label.timestamp - window, &mut delivered);
        }

        if label.timestamp < self.horizon {
            #[cfg(feature = "tracing")]
            tracing::trace!(timestamp = ?label.timestamp, horizon = ?self.horizon, "past reorder window");

            delivered.push(message);
        } else {
            self.sort(sender, label, message, &mut delivered);
        }

        self.counts = collecting.then(|| (self.received.len(), self.number_buffered()));
        delivered
    }

    fn sort(
        &mut self,
        sender: InstanceId,
        label: Label,
        message: RequestMessage,
        delivered: &mut Vec<RequestMessage>,
    ) {
        let horizon = self.horizon;

        let buffer = match self.received.entry(sender) {
            Entry::Vacant(entry) => entry.insert(ReceiveBuffer::new(message.parent_execution.clone())),
            Entry::Occupied(entry) => {
                let buffer = entry.into_mut();
                if buffer.execution != message.parent_execution {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        previous = ?buffer.execution,
                        execution = ?message.parent_execution,
                        released = buffer.buffered.len(),
                        "sender restarted"
                    );

                    buffer.restart(message.parent_execution.clone(), delivered);
                }
                buffer
            }
        };

        if buffer.last.is_some_and(|last| label.timestamp <= last) {
            #[cfg(feature = "tracing")]
            tracing::trace!(timestamp = ?label.timestamp, "dropping duplicate");

            return;
        }

        let waiting = label
            .predecessor
            .filter(|&predecessor| Some(predecessor) > buffer.last && predecessor >= horizon);

        match waiting {
            Some(predecessor) => {
                buffer.buffered.insert(predecessor, message);
            }
            None => {
                buffer.advance(label.timestamp, horizon);
                delivered.push(message);
                buffer.release(horizon, delivered);
            }
        }
    }

    /// Move the horizon forward, and release any messages which were waiting
    /// on a predecessor from before the new horizon.
    fn collect(&mut self, horizon: Timestamp, delivered: &mut Vec<RequestMessage>) {
        self.horizon = horizon;

        #[cfg(feature = "tracing")]
        let before = delivered.len();
        self.received.retain(|_, buffer| {
            if buffer.last.is_some_and(|last| last < horizon) {
                buffer.last = None;
            }

            buffer.release(horizon, delivered);

            buffer.last.is_some() || !buffer.buffered.is_empty()
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(
            ?horizon,
            released = delivered.len() - before,
            sources = self.received.len(),
            "advanced receive horizon"
        );
    }

    /// The number of messages held back across all senders.
    pub fn number_buffered(&self) -> usize {
        self.received.values().map(|b| b.buffered.len()).sum()
    }

    /// The number of senders with receive state, and the number of messages
    /// buffered, if counted by the most recent [`receive`][Inbox::receive]
    /// call.
    #[inline]
    pub fn counts(&self) -> Option<(usize, usize)> {
        self.counts
    }
}

impl ReceiveBuffer {
    fn new(execution: Option<String>) -> Self {
        Self {
            last: None,
            execution,
            buffered: BTreeMap::new(),
        }
    }

    /// Record the release of a message sent at `timestamp`.
    #[inline]
    fn advance(&mut self, timestamp: Timestamp, horizon: Timestamp) {
        self.last = (timestamp >= horizon).then_some(timestamp);
    }

    /// Release buffered messages whose predecessor has been released or has
    /// fallen behind the horizon, in order.
    fn release(&mut self, horizon: Timestamp, delivered: &mut Vec<RequestMessage>) {
        while let Some(entry) = self.buffered.first_entry() {
            let predecessor = *entry.key();
            if Some(predecessor) > self.last && predecessor >= horizon {
                break;
            }

            let message = entry.remove();
            let Some(Label { timestamp, .. }) = message.label else {
                continue;
            };
            if self.last.is_some_and(|last| timestamp <= last) {
                // overtaken by the cursor: a duplicate of a released message
                continue;
            }

            self.advance(timestamp, horizon);
            delivered.push(message);
        }
    }

    /// Start over for a new execution of the sender, releasing everything
    /// buffered from the previous one.
    fn restart(&mut self, execution: Option<String>, delivered: &mut Vec<RequestMessage>) {
        delivered.extend(std::mem::take(&mut self.buffered).into_values());
        self.last = None;
        self.execution = execution;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Inbox;
    use crate::{InstanceId, Label, RequestMessage, Timestamp};

    const T: Timestamp = Timestamp::new(1_701_648_000_000_000_000);
    const WINDOW: Duration = Duration::from_secs(10);

    fn labeled(
        sender: &str,
        execution: &str,
        timestamp: Timestamp,
        predecessor: Option<Timestamp>,
    ) -> RequestMessage {
        let mut message = RequestMessage::signal("op", None)
            .from_parent(InstanceId::new(sender), Some(execution.to_owned()));
        message.label = Some(Label::new(timestamp, predecessor, WINDOW));
        message
    }

    fn ids(messages: &[RequestMessage]) -> Vec<uuid::Uuid> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn client_messages_pass_through() {
        let mut inbox = Inbox::new();
        let message = RequestMessage::signal("op", None);

        assert_eq!(inbox.receive(message.clone(), WINDOW), vec![message.clone()]);
        assert_eq!(inbox.receive(message.clone(), WINDOW), vec![message]);
        assert_eq!(inbox, Inbox::new());
    }

    #[test]
    fn disabled() {
        let mut inbox = Inbox::new();
        let message = labeled("a", "e1", T + Duration::from_secs(1), Some(T));

        assert_eq!(inbox.receive(message.clone(), Duration::ZERO), vec![message]);
        assert_eq!(inbox.number_buffered(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "was not labeled by its sender")]
    fn unlabeled_message_from_parent() {
        let message = RequestMessage::signal("op", None).from_parent(InstanceId::new("a"), None);
        Inbox::new().receive(message, WINDOW);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn unlabeled_message_from_parent() {
        let mut inbox = Inbox::new();
        let message = RequestMessage::signal("op", None).from_parent(InstanceId::new("a"), None);

        assert_eq!(inbox.receive(message.clone(), WINDOW), vec![message]);
        assert_eq!(inbox, Inbox::new());
    }

    #[test]
    fn senders_are_independent() {
        let mut inbox = Inbox::new();
        let t1 = T + Duration::from_millis(1);

        let a2 = labeled("a", "e1", t1, Some(T));
        let b1 = labeled("b", "e1", T, None);
        let a1 = labeled("a", "e1", T, None);

        assert!(inbox.receive(a2.clone(), WINDOW).is_empty());
        assert_eq!(ids(&inbox.receive(b1.clone(), WINDOW)), ids(&[b1]));
        assert_eq!(inbox.number_buffered(), 1);
        assert_eq!(ids(&inbox.receive(a1.clone(), WINDOW)), ids(&[a1, a2]));
        assert_eq!(inbox.number_buffered(), 0);
    }

    #[test]
    fn restarted_sender_releases_buffer() {
        let mut inbox = Inbox::new();
        let t = |ms| T + Duration::from_millis(ms);

        let old2 = labeled("a", "e1", t(2), Some(t(1)));
        let old3 = labeled("a", "e1", t(3), Some(t(2)));
        let new1 = labeled("a", "e2", t(4), None);

        assert!(inbox.receive(old3.clone(), WINDOW).is_empty());
        assert!(inbox.receive(old2.clone(), WINDOW).is_empty());
        assert_eq!(
            ids(&inbox.receive(new1.clone(), WINDOW)),
            ids(&[old2, old3, new1])
        );
        assert_eq!(inbox.number_buffered(), 0);
    }

    #[test]
    fn horizon_releases_stranded_messages() {
        let mut inbox = Inbox::new();
        let t = |secs| T + Duration::from_secs(secs);

        // the predecessor of `stranded` never arrives
        let first = labeled("a", "e1", t(0), None);
        let stranded = labeled("a", "e1", t(2), Some(t(1)));
        let later = labeled("b", "e1", t(60), None);

        assert_eq!(inbox.receive(first, WINDOW).len(), 1);
        assert!(inbox.receive(stranded.clone(), WINDOW).is_empty());
        assert_eq!(inbox.number_buffered(), 1);

        assert_eq!(ids(&inbox.receive(later.clone(), WINDOW)), ids(&[stranded, later]));
        assert_eq!(inbox.number_buffered(), 0);
        assert_eq!(inbox.counts(), Some((1, 0)));
    }
}
