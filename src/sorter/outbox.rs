use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{instrument, Level};

use super::MIN_COLLECTION_INTERVAL;
use crate::{
    id::InstanceId,
    message::{Label, RequestMessage},
    time::Timestamp,
};

/// The sending half of a [`MessageSorter`][super::MessageSorter]: remembers
/// the last timestamp sent to each destination, and [labels][Outbox::label]
/// outgoing messages so the receiver can put them back in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "camelCase")
)]
pub struct Outbox {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "HashMap::is_empty"))]
    last_sent: HashMap<InstanceId, Timestamp>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Timestamp::is_zero"))]
    horizon: Timestamp,
    #[cfg_attr(feature = "serde", serde(skip))]
    destinations: Option<usize>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in the [label][Label] of a message about to be sent to
    /// `destination`, and return it.
    ///
    /// The label’s timestamp is `now`, unless that would not be later than the
    /// previous message to `destination`, in which case it is one tick after
    /// the previous timestamp. The label’s predecessor is that previous
    /// timestamp.
    ///
    /// Each message must be labeled exactly once: a redelivered copy must
    /// carry the original label. If `window` is zero, sorting is disabled and
    /// the message is left unlabeled.
    #[cfg_attr(feature = "tracing", instrument(level = Level::TRACE, skip_all, fields(message = %message.id, %destination)))]
    pub fn label(
        &mut self,
        message: &mut RequestMessage,
        destination: &InstanceId,
        now: Timestamp,
        window: Duration,
    ) -> Option<Label> {
        if window.is_zero() {
            return None;
        }

        let collecting = self.horizon + window + MIN_COLLECTION_INTERVAL < now;
        if collecting {
            self.collect(now - window);
        }

        let predecessor = self.last_sent.get(destination).copied();
        let timestamp = match predecessor {
            Some(last) if now <= last => last.next(),
            _ => now,
        };

        let label = Label::new(timestamp, predecessor, window);
        message.label = Some(label);
        self.last_sent.insert(destination.clone(), timestamp);

        self.destinations = collecting.then_some(self.last_sent.len());
        Some(label)
    }

    /// The timestamp of the last message labeled for `destination`, if it is
    /// still tracked.
    pub fn last_sent(&self, destination: &InstanceId) -> Option<Timestamp> {
        self.last_sent.get(destination).copied()
    }

    /// The number of tracked destinations, if counted by the most recent
    /// [`label`][Outbox::label] call.
    #[inline]
    pub fn destinations(&self) -> Option<usize> {
        self.destinations
    }

    /// Forget destinations which have not been sent anything since `horizon`.
    fn collect(&mut self, horizon: Timestamp) {
        self.horizon = horizon;
        self.last_sent.retain(|_, last| *last >= horizon);

        #[cfg(feature = "tracing")]
        tracing::trace!(?horizon, destinations = self.last_sent.len(), "advanced send horizon");
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Outbox;
    use crate::{InstanceId, RequestMessage, Timestamp};

    const T: Timestamp = Timestamp::new(1_701_648_000_000_000_000);
    const WINDOW: Duration = Duration::from_secs(30 * 60);

    fn message() -> RequestMessage {
        RequestMessage::signal("op", None).from_parent(InstanceId::new("a"), None)
    }

    #[test]
    fn chain() {
        let mut outbox = Outbox::new();
        let b = InstanceId::new("b");

        let first = outbox.label(&mut message(), &b, T, WINDOW).unwrap();
        assert_eq!(first.timestamp, T);
        assert_eq!(first.predecessor, None);
        assert_eq!(first.expires, T + WINDOW);

        let second = outbox.label(&mut message(), &b, T + Duration::from_secs(1), WINDOW).unwrap();
        assert_eq!(second.timestamp, T + Duration::from_secs(1));
        assert_eq!(second.predecessor, Some(first.timestamp));
        assert_eq!(outbox.last_sent(&b), Some(second.timestamp));
    }

    #[test]
    fn clock_going_backwards() {
        let mut outbox = Outbox::new();
        let b = InstanceId::new("b");

        let mut previous = None;
        for i in 0..5u64 {
            let now = T - Duration::from_secs(i);
            let label = outbox.label(&mut message(), &b, now, WINDOW).unwrap();

            assert!(Some(label.timestamp) > previous);
            assert_eq!(label.predecessor, previous);
            previous = Some(label.timestamp);
        }

        assert_eq!(previous, Some(Timestamp::new(T.into_raw() + 4)));
    }

    #[test]
    fn destinations_are_independent() {
        let mut outbox = Outbox::new();
        let (b, c) = (InstanceId::new("b"), InstanceId::new("C"));

        outbox.label(&mut message(), &b, T, WINDOW);
        let to_c = outbox.label(&mut message(), &c, T, WINDOW).unwrap();
        assert_eq!(to_c.timestamp, T);
        assert_eq!(to_c.predecessor, None);

        let to_c = outbox.label(&mut message(), &InstanceId::new("c"), T, WINDOW).unwrap();
        assert_eq!(to_c.predecessor, Some(T));
    }

    #[test]
    fn disabled() {
        let mut outbox = Outbox::new();
        let mut message = message();

        assert_eq!(outbox.label(&mut message, &InstanceId::new("b"), T, Duration::ZERO), None);
        assert_eq!(message.label, None);
        assert_eq!(outbox, Outbox::new());
    }

    #[test]
    fn forgets_idle_destinations() {
        let mut outbox = Outbox::new();
        let (b, c) = (InstanceId::new("b"), InstanceId::new("c"));

        outbox.label(&mut message(), &b, T, WINDOW);
        assert_eq!(outbox.destinations(), Some(1));

        let later = T + WINDOW + Duration::from_secs(60);
        let label = outbox.label(&mut message(), &c, later, WINDOW).unwrap();
        assert_eq!(label.predecessor, None);
        assert_eq!(outbox.destinations(), Some(1));
        assert_eq!(outbox.last_sent(&b), None);

        // within the collection interval, nothing is counted
        outbox.label(&mut message(), &b, later, WINDOW);
        assert_eq!(outbox.destinations(), None);
        assert_eq!(outbox.last_sent(&b), Some(later));
    }
}
