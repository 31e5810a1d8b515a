use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::{id::EntityId, id::InstanceId, time::Timestamp};

/// A message sent to an entity: an operation call, a one-way signal, or a
/// lock request.
///
/// Messages are sent by orchestrations and other entities (which set
/// [`parent`][RequestMessage::parent]) or by clients (which don’t).
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "camelCase")
)]
pub struct RequestMessage {
    /// Identifies this message. Assigned once, when the message is created, so
    /// redelivered copies share it.
    pub id: Uuid,

    /// The name of the operation to run, or `None` for a lock request.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "op", default, skip_serializing_if = "Option::is_none")
    )]
    pub operation: Option<String>,

    /// Whether this is a one-way message.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "is_false"))]
    pub signal: bool,

    /// The operation input, as opaque (usually JSON) text.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub input: Option<String>,

    /// The instance which sent this message.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub parent: Option<InstanceId>,

    /// The execution of the [parent][RequestMessage::parent] which sent this
    /// message.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub parent_execution: Option<String>,

    /// If set, the message should not be processed before this time.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "due", default, skip_serializing_if = "Option::is_none")
    )]
    pub scheduled_time: Option<Timestamp>,

    /// For lock requests, the (sorted, duplicate-free) set of entities to lock.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "lockset", default, skip_serializing_if = "Option::is_none")
    )]
    pub lock_set: Option<Vec<EntityId>>,

    /// For lock requests, the index of the entity within the
    /// [lock set][RequestMessage::lock_set] this message was forwarded to.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "pos", default, skip_serializing_if = "is_zero")
    )]
    pub position: u32,

    /// Ordering metadata, filled in by [`Outbox::label`][crate::Outbox::label].
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub label: Option<Label>,
}

impl RequestMessage {
    /// Create an operation call.
    pub fn call(operation: impl Into<String>, input: impl Into<Option<String>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: Some(operation.into()),
            signal: false,
            input: input.into(),
            parent: None,
            parent_execution: None,
            scheduled_time: None,
            lock_set: None,
            position: 0,
            label: None,
        }
    }

    /// Create a one-way signal.
    pub fn signal(operation: impl Into<String>, input: impl Into<Option<String>>) -> Self {
        Self {
            signal: true,
            ..Self::call(operation, input)
        }
    }

    /// Create a request to acquire the locks in `lock_set`, starting with the
    /// entity at `position`.
    pub fn lock(lock_set: Vec<EntityId>, position: u32) -> Self {
        debug_assert!(!lock_set.is_empty(), "lock set must not be empty");
        debug_assert!(
            lock_set.windows(2).all(|w| w[0] < w[1]),
            "lock set must be sorted without repetitions"
        );

        Self {
            operation: None,
            lock_set: Some(lock_set),
            position,
            ..Self::call(String::new(), None)
        }
    }

    /// Record the sending instance (and its execution).
    pub fn from_parent(
        mut self,
        parent: impl Into<InstanceId>,
        execution: impl Into<Option<String>>,
    ) -> Self {
        self.parent = Some(parent.into());
        self.parent_execution = execution.into();
        self
    }

    /// Delay processing of the message until `due`.
    pub fn scheduled_at(mut self, due: Timestamp) -> Self {
        self.scheduled_time = Some(due);
        self
    }

    #[inline]
    pub fn is_lock_request(&self) -> bool {
        self.lock_set.is_some()
    }

    /// Whether the message carries a [scheduled time][RequestMessage::scheduled_time].
    ///
    /// There is no FIFO guarantee for scheduled messages; receivers should not
    /// pass them through a [sorter][crate::MessageSorter].
    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.scheduled_time.is_some()
    }

    /// Whether the message takes part in reordering and deduplication.
    ///
    /// Messages from clients (without a parent) and lock requests forwarded
    /// along a lock set (position > 0) are always passed through.
    #[inline]
    pub fn is_sortable(&self) -> bool {
        self.parent.is_some() && self.position == 0
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parent = self.parent.as_ref().map(InstanceId::as_str).unwrap_or("");
        let execution = self.parent_execution.as_deref().unwrap_or("");

        if self.is_lock_request() {
            write!(
                f,
                "[Request lock {} by {parent} {execution}, position {}]",
                self.id, self.position
            )
        } else {
            write!(
                f,
                "[{} '{}' operation {} by {parent} {execution}]",
                if self.signal { "Signal" } else { "Call" },
                self.operation.as_deref().unwrap_or(""),
                self.id,
            )
        }
    }
}

/// Ordering metadata attached to a message by its sender.
///
/// Labels sent from one instance to another form a chain: every label’s
/// [`predecessor`][Label::predecessor] is the [`timestamp`][Label::timestamp]
/// of the label sent just before it.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "camelCase")
)]
pub struct Label {
    /// The (strictly increasing, per destination) send time.
    pub timestamp: Timestamp,
    /// The `timestamp` of the previous message to the same destination, if
    /// any.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub predecessor: Option<Timestamp>,
    /// The end of the reorder window advertised by the sender. Advisory:
    /// receivers judge lateness against their own horizon instead.
    pub expires: Timestamp,
}

impl Label {
    pub fn new(timestamp: Timestamp, predecessor: Option<Timestamp>, window: Duration) -> Self {
        debug_assert!(predecessor < Some(timestamp), "labels must be monotonic");

        Self {
            timestamp,
            predecessor,
            expires: timestamp + window,
        }
    }
}

#[cfg(feature = "serde")]
fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(feature = "serde")]
fn is_zero(value: &u32) -> bool {
    *value == 0
}
