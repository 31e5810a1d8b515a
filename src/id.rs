//! [Instance][InstanceId] and [entity][EntityId] ID's, naming the peers that
//! exchange messages.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::error::Error;

/// The ID of an orchestration or entity instance that sends or receives
/// messages.
///
/// Instance ID's compare, order and hash ignoring ASCII case, so `"@Counter@x"`
/// and `"@counter@x"` name the same peer.
#[derive(Clone)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        assert!(!id.is_empty(), "instance ID must not be empty");
        Self(id)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for InstanceId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for InstanceId {}

impl PartialOrd for InstanceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InstanceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(other.folded())
    }
}

impl Hash for InstanceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.folded() {
            state.write_u8(b);
        }
        state.write_u8(0xff);
    }
}

impl FromStr for InstanceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(Error::InvalidInstanceId),
            s => Ok(Self(s.to_owned())),
        }
    }
}

impl From<EntityId> for InstanceId {
    fn from(value: EntityId) -> Self {
        Self(value.to_string())
    }
}

impl From<&EntityId> for InstanceId {
    fn from(value: &EntityId) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({:?})", self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for InstanceId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for InstanceId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let string = String::deserialize(d)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}

/// The ID of a durable entity: an entity name (stored lowercase) and a key.
///
/// As an [`InstanceId`], an entity is addressed as `@name@key`.
///
/// ```
/// use entity_sorter::EntityId;
///
/// let id = EntityId::new("Counter", "tally");
/// assert_eq!(id.to_string(), "@counter@tally");
/// assert_eq!("@counter@tally".parse::<EntityId>().unwrap(), id);
/// ```
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EntityId {
    pub name: String,
    pub key: String,
}

impl EntityId {
    pub fn new(name: impl AsRef<str>, key: impl Into<String>) -> Self {
        let name = name.as_ref();
        assert!(!name.is_empty(), "entity name must not be empty");

        Self {
            name: name.to_lowercase(),
            key: key.into(),
        }
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidEntityId(s.to_owned());

        let rest = s.strip_prefix('@').ok_or_else(invalid)?;
        let (name, key) = rest.split_once('@').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(name, key))
    }
}

impl TryFrom<&InstanceId> for EntityId {
    type Error = Error;

    fn try_from(value: &InstanceId) -> Result<Self, Self::Error> {
        value.as_str().parse()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}@{}", self.name, self.key)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::{EntityId, InstanceId};
    use crate::Error;

    #[test]
    fn instance_id_ignores_case() {
        let a = InstanceId::new("@Counter@A");
        let b = InstanceId::new("@counter@a");

        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
        assert_eq!(HashSet::from([a.clone(), b]).len(), 1);
        assert_eq!(a.to_string(), "@Counter@A");
    }

    #[test]
    fn empty_instance_id() {
        assert_eq!("".parse::<InstanceId>().unwrap_err(), Error::InvalidInstanceId);
    }

    #[test]
    fn entity_id() {
        let id: EntityId = "@Counter@key@with@ats".parse().unwrap();
        assert_eq!(id, EntityId::new("counter", "key@with@ats"));
        assert_eq!(InstanceId::from(&id).as_str(), "@counter@key@with@ats");

        let empty_key: EntityId = "@counter@".parse().unwrap();
        assert_eq!(empty_key.key, "");
    }

    #[test]
    fn invalid_entity_id() {
        for s in ["counter@a", "@counter", "@@a", ""] {
            assert_eq!(
                s.parse::<EntityId>().unwrap_err(),
                Error::InvalidEntityId(s.to_owned()),
            );
        }
    }
}
