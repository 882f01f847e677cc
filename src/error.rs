use thiserror::Error;

/// A datagram that could not be decoded into a request.
///
/// Protocol errors are always recoverable: the broker logs them, drops the
/// datagram, and keeps listening.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    #[error("empty datagram")]
    Empty,

    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("need at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },

    #[error("attribute list is empty")]
    EmptyAttributes,

    #[error("value list length {values} does not match attribute list length {attributes}")]
    LengthMismatch { attributes: usize, values: usize },

    #[error("insert requires exactly {expected} attributes, got {got}")]
    InsertArity { expected: usize, got: usize },

    #[error("unknown control message: {0:?}")]
    UnknownControl(String),

    #[error("invalid agent id in reply row: {0:?}")]
    InvalidAgentId(String),
}

/// A well-formed request that could not be mapped to a store operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("command {0:?} is handled by the receiver and never reaches the translator")]
    NotTranslatable(crate::protocol::Command),

    #[error("unknown column: {0:?}")]
    UnknownColumn(String),

    #[error("invalid filter condition {condition:?}: {reason}")]
    InvalidFilter { condition: String, reason: String },

    #[error("{0:?} requires a value list")]
    MissingValues(crate::protocol::Command),
}

/// A failure reported by the store while applying an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate key (tick={tick}, aid={aid})")]
    DuplicateKey { tick: i64, aid: i64 },

    #[error("value {value:?} is not valid for column {column}")]
    InvalidValue { column: &'static str, value: String },

    #[error("insert assigns column {0} more than once")]
    DuplicateColumn(&'static str),

    #[error("insert does not assign column {0}")]
    MissingColumn(&'static str),

    #[error("lost connection to the store: {0}")]
    Connection(String),
}

impl StoreError {
    /// Connection loss aborts the executor; everything else is logged and
    /// the next operation is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Socket and file I/O. A bind failure at startup is fatal: the broker
    /// never enters the listening state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
