/// An error in parsing an identifier or loading [configuration][crate::Config].
///
/// The sorting operations themselves never fail; see [`MessageSorter`][crate::MessageSorter].
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid entity ID {0:?}: expected \"@name@key\" with a non-empty name")]
    InvalidEntityId(String),
    #[error("invalid instance ID: must not be empty")]
    InvalidInstanceId,
    #[error("invalid value {value:?} for ${name}")]
    Config { name: &'static str, value: String },
}
