//! Ordering and deduplication of messages sent to entities, from other
//! entities or from orchestrations.
//!
//! Messages between instances travel over a transport which may reorder,
//! duplicate or delay them. The sender [labels][Outbox::label] each message
//! with a timestamp and the timestamp of its predecessor, forming a chain per
//! (sender, receiver) pair; the receiver [reassembles][Inbox::receive] the
//! chain, holding back messages whose predecessor has not arrived and dropping
//! messages it has already released.
//!
//! Reordering only applies within a *reorder window* of the time a message was
//! sent. Messages which turn up later than that are passed straight through,
//! and may therefore be processed out of order or more than once.
//!
//! None of this is synchronized: each sorter must be driven by one task at a
//! time, like the rest of an entity’s state.

use std::time::Duration;

use crate::{
    id::InstanceId,
    message::{Label, RequestMessage},
    time::Timestamp,
};

mod inbox;
mod outbox;

pub use self::{inbox::Inbox, outbox::Outbox};

/// Horizons are advanced (and stale state collected) at most this often, in
/// terms of message timestamps.
pub const MIN_COLLECTION_INTERVAL: Duration = Duration::from_secs(10);

/// The sorting state of one instance, which both sends and receives messages.
///
/// With the `serde` feature, a `MessageSorter` can be persisted alongside the
/// rest of the instance’s state.
///
/// ```
/// use std::time::Duration;
/// use entity_sorter::{InstanceId, MessageSorter, RequestMessage, Timestamp};
///
/// let window = Duration::from_secs(30 * 60);
/// let (a, b) = (InstanceId::new("@counter@a"), InstanceId::new("@counter@b"));
/// let (mut sender, mut receiver) = (MessageSorter::new(), MessageSorter::new());
///
/// let now = Timestamp::now();
/// let mut messages: Vec<_> = ["1", "2", "3"]
///     .into_iter()
///     .map(|input| {
///         let mut message = RequestMessage::signal("add", Some(input.to_owned()))
///             .from_parent(a.clone(), None);
///         sender.label_outgoing(&mut message, &b, now, window);
///         message
///     })
///     .collect();
///
/// // delivered in reverse: nothing comes out until the first message arrives
/// let third = messages.pop().unwrap();
/// let second = messages.pop().unwrap();
/// let first = messages.pop().unwrap();
/// assert!(receiver.receive_in_order(third, window).is_empty());
/// assert!(receiver.receive_in_order(second, window).is_empty());
///
/// let inputs: Vec<_> = receiver
///     .receive_in_order(first, window)
///     .into_iter()
///     .filter_map(|message| message.input)
///     .collect();
/// assert_eq!(inputs, ["1", "2", "3"]);
/// assert_eq!(receiver.number_buffered(), 0);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "camelCase")
)]
pub struct MessageSorter {
    #[cfg_attr(feature = "serde", serde(default))]
    pub outbox: Outbox,
    #[cfg_attr(feature = "serde", serde(default))]
    pub inbox: Inbox,
}

impl MessageSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label a message about to be sent to `destination`; see [`Outbox::label`].
    #[inline]
    pub fn label_outgoing(
        &mut self,
        message: &mut RequestMessage,
        destination: &InstanceId,
        now: Timestamp,
        window: Duration,
    ) -> Option<Label> {
        self.outbox.label(message, destination, now, window)
    }

    /// Accept a received message, and return the messages which are now ready
    /// to process, in order; see [`Inbox::receive`].
    #[inline]
    pub fn receive_in_order(
        &mut self,
        message: RequestMessage,
        window: Duration,
    ) -> Vec<RequestMessage> {
        self.inbox.receive(message, window)
    }

    /// The number of received messages being held back, across all senders.
    #[inline]
    pub fn number_buffered(&self) -> usize {
        self.inbox.number_buffered()
    }

    /// Diagnostic counts, as of the last operations.
    pub fn stats(&self) -> Stats {
        let (sources, messages) = self.inbox.counts().unzip();

        Stats {
            messages,
            sources,
            destinations: self.outbox.destinations(),
        }
    }
}

/// Sizes of a [`MessageSorter`]’s state.
///
/// Counting happens only when a horizon advances, so each field is `None`
/// unless the most recent call on that half of the sorter did so.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Stats {
    /// Messages buffered by the receiving half.
    pub messages: Option<usize>,
    /// Senders tracked by the receiving half.
    pub sources: Option<usize>,
    /// Destinations tracked by the sending half.
    pub destinations: Option<usize>,
}
