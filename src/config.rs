use std::time::Duration;

#[cfg(feature = "environment")]
use crate::error::Error;

/// Settings for [message sorting][crate::MessageSorter], as supplied by the
/// embedding orchestration engine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Config {
    /// How long after a message is sent its receiver will still reorder and
    /// deduplicate it.
    pub reorder_window: Duration,

    /// Set when the underlying transport already delivers messages in order,
    /// exactly once; sorting is then disabled.
    pub ordered_delivery: bool,
}

impl Config {
    /// The default [reorder window][Config::reorder_window]: 30 minutes.
    pub const DEFAULT_REORDER_WINDOW: Duration = Duration::from_secs(30 * 60);

    /// The longest accepted reorder window: 100 years. Timestamps one window
    /// past the present must still fit in a [`Timestamp`][crate::Timestamp].
    pub const MAX_REORDER_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    /// Environment variable overriding the reorder window, in whole minutes.
    pub const REORDER_WINDOW_VAR: &'static str = "ENTITY_MESSAGE_REORDER_WINDOW_MINUTES";

    /// Environment variable declaring that the transport delivers in order.
    pub const ORDERED_DELIVERY_VAR: &'static str = "ENTITY_ORDERED_DELIVERY";

    /// The reorder window to pass to [`MessageSorter`][crate::MessageSorter]
    /// operations; zero if sorting is disabled.
    pub fn window(&self) -> Duration {
        if self.ordered_delivery {
            Duration::ZERO
        } else {
            self.reorder_window
        }
    }

    /// Read a [`Config`] from the environment, using defaults for unset
    /// variables.
    #[cfg(feature = "environment")]
    #[cfg_attr(docsrs, doc(cfg(feature = "environment")))]
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    #[cfg(feature = "environment")]
    fn from_vars(var: impl Fn(&'static str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(value) = var(Self::REORDER_WINDOW_VAR) {
            let seconds = value
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|minutes| minutes.checked_mul(60))
                .filter(|&seconds| seconds <= Self::MAX_REORDER_WINDOW.as_secs())
                .ok_or_else(|| Error::Config {
                    name: Self::REORDER_WINDOW_VAR,
                    value: value.clone(),
                })?;
            config.reorder_window = Duration::from_secs(seconds);
        }

        if let Some(value) = var(Self::ORDERED_DELIVERY_VAR) {
            config.ordered_delivery = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "" | "0" | "false" | "no" => false,
                _ => {
                    return Err(Error::Config {
                        name: Self::ORDERED_DELIVERY_VAR,
                        value,
                    })
                }
            };
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reorder_window: Self::DEFAULT_REORDER_WINDOW,
            ordered_delivery: false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Config;
    #[cfg(feature = "environment")]
    use crate::{Error, InstanceId, MessageSorter, RequestMessage, Timestamp};

    #[test]
    fn window() {
        let config = Config::default();
        assert_eq!(config.window(), Duration::from_secs(1800));

        let ordered = Config {
            ordered_delivery: true,
            ..config
        };
        assert_eq!(ordered.window(), Duration::ZERO);
    }

    #[cfg(feature = "environment")]
    #[test]
    fn from_vars() {
        let config = Config::from_vars(|name| match name {
            Config::REORDER_WINDOW_VAR => Some(" 5 ".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.reorder_window, Duration::from_secs(300));
        assert!(!config.ordered_delivery);

        let config = Config::from_vars(|name| match name {
            Config::ORDERED_DELIVERY_VAR => Some("TRUE".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.window(), Duration::ZERO);

        assert_eq!(Config::from_vars(|_| None).unwrap(), Config::default());
    }

    #[cfg(feature = "environment")]
    #[test]
    fn invalid_vars() {
        let err = Config::from_vars(|name| match name {
            Config::REORDER_WINDOW_VAR => Some("half an hour".to_owned()),
            _ => None,
        })
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid value \"half an hour\" for $ENTITY_MESSAGE_REORDER_WINDOW_MINUTES"
        );

        for minutes in ["400000000", "52560001", "-5"] {
            let err = Config::from_vars(|name| match name {
                Config::REORDER_WINDOW_VAR => Some(minutes.to_owned()),
                _ => None,
            })
            .unwrap_err();
            assert_eq!(
                err,
                Error::Config {
                    name: Config::REORDER_WINDOW_VAR,
                    value: minutes.to_owned(),
                }
            );
        }

        let longest = Config::from_vars(|name| match name {
            Config::REORDER_WINDOW_VAR => Some("52560000".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(longest.window(), Config::MAX_REORDER_WINDOW);

        let (a, b) = (InstanceId::new("a"), InstanceId::new("b"));
        let mut message = RequestMessage::signal("op", None).from_parent(a, None);
        let mut sorter = MessageSorter::new();
        let label = sorter
            .label_outgoing(&mut message, &b, Timestamp::now(), longest.window())
            .unwrap();
        assert_eq!(sorter.receive_in_order(message, longest.window()).len(), 1);
        assert!(label.expires > label.timestamp);

        assert!(Config::from_vars(|name| match name {
            Config::ORDERED_DELIVERY_VAR => Some("maybe".to_owned()),
            _ => None,
        })
        .is_err());
    }
}
