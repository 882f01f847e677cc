//! Wire codec for the broker's datagram protocol.
//!
//! Requests travel as `#`-delimited text with `|`-delimited sub-lists:
//!
//! ```text
//! CMD#COND#ATTR1|ATTR2|...#VAL1|VAL2|...
//! ```
//!
//! `T` (terminate) and `R` (register listener) are complete requests on
//! their own. Select replies use one datagram per result row,
//! `AID#ATTR1|...#VAL1|...`, and broker-to-listener control messages are a
//! single byte: `P`, `C` or `T`.
//!
//! Decoding never panics; every malformed input maps to a
//! [`ProtocolError`] that the caller logs before dropping the datagram.

use crate::error::ProtocolError;
use crate::store::COLUMN_COUNT;
use std::fmt;

const FIELD_SEP: char = '#';
const LIST_SEP: char = '|';

/// Request command, one byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Terminate,
    RegisterListener,
    Select,
    Update,
    Insert,
}

impl Command {
    pub fn code(&self) -> char {
        match self {
            Command::Terminate => 'T',
            Command::RegisterListener => 'R',
            Command::Select => 'S',
            Command::Update => 'U',
            Command::Insert => 'I',
        }
    }

    fn from_field(field: &str) -> Result<Self, ProtocolError> {
        match field {
            "T" => Ok(Command::Terminate),
            "R" => Ok(Command::RegisterListener),
            "S" => Ok(Command::Select),
            "U" => Ok(Command::Update),
            "I" => Ok(Command::Insert),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A decoded request, consumed exactly once by the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Filter condition; an empty wire field decodes to `None`.
    pub condition: Option<String>,
    pub attributes: Vec<String>,
    /// Present iff the command is `Update` or `Insert`.
    pub values: Option<Vec<String>>,
}

impl Request {
    pub fn terminate() -> Self {
        Self {
            command: Command::Terminate,
            condition: None,
            attributes: Vec::new(),
            values: None,
        }
    }

    pub fn register_listener() -> Self {
        Self {
            command: Command::RegisterListener,
            condition: None,
            attributes: Vec::new(),
            values: None,
        }
    }

    pub fn select(condition: Option<&str>, attributes: &[&str]) -> Self {
        Self {
            command: Command::Select,
            condition: condition.map(String::from),
            attributes: attributes.iter().map(|s| s.to_string()).collect(),
            values: None,
        }
    }

    pub fn update(condition: Option<&str>, assignments: &[(&str, &str)]) -> Self {
        Self {
            command: Command::Update,
            condition: condition.map(String::from),
            attributes: assignments.iter().map(|(a, _)| a.to_string()).collect(),
            values: Some(assignments.iter().map(|(_, v)| v.to_string()).collect()),
        }
    }

    pub fn insert(attributes: &[&str], values: &[&str]) -> Self {
        Self {
            command: Command::Insert,
            condition: None,
            attributes: attributes.iter().map(|s| s.to_string()).collect(),
            values: Some(values.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// Encode a request into its wire representation.
pub fn encode(request: &Request) -> String {
    match request.command {
        Command::Terminate | Command::RegisterListener => request.command.code().to_string(),
        _ => {
            let mut out = format!(
                "{}{FIELD_SEP}{}{FIELD_SEP}{}",
                request.command.code(),
                request.condition.as_deref().unwrap_or(""),
                request.attributes.join(&LIST_SEP.to_string()),
            );
            if let Some(values) = &request.values {
                out.push(FIELD_SEP);
                out.push_str(&values.join(&LIST_SEP.to_string()));
            }
            out
        }
    }
}

/// Decode a datagram payload into a [`Request`].
///
/// Fields past the ones a command needs are ignored, as in the reference
/// protocol. `T` and `R` are recognized from the command field alone.
pub fn decode(payload: &[u8]) -> Result<Request, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let fields: Vec<&str> = text.split(FIELD_SEP).collect();
    let command = Command::from_field(fields[0])?;

    match command {
        Command::Terminate => Ok(Request::terminate()),
        Command::RegisterListener => Ok(Request::register_listener()),
        Command::Select | Command::Update | Command::Insert => {
            if fields.len() < 3 {
                return Err(ProtocolError::MissingFields {
                    expected: 3,
                    got: fields.len(),
                });
            }
            let condition = if fields[1].is_empty() {
                None
            } else {
                Some(fields[1].to_string())
            };
            if fields[2].is_empty() {
                return Err(ProtocolError::EmptyAttributes);
            }
            let attributes: Vec<String> =
                fields[2].split(LIST_SEP).map(String::from).collect();

            let values = match command {
                Command::Select => None,
                _ => {
                    if fields.len() < 4 {
                        return Err(ProtocolError::MissingFields {
                            expected: 4,
                            got: fields.len(),
                        });
                    }
                    let values: Vec<String> =
                        fields[3].split(LIST_SEP).map(String::from).collect();
                    if values.len() != attributes.len() {
                        return Err(ProtocolError::LengthMismatch {
                            attributes: attributes.len(),
                            values: values.len(),
                        });
                    }
                    Some(values)
                }
            };

            if command == Command::Insert && attributes.len() != COLUMN_COUNT {
                return Err(ProtocolError::InsertArity {
                    expected: COLUMN_COUNT,
                    got: attributes.len(),
                });
            }

            Ok(Request {
                command,
                condition,
                attributes,
                values,
            })
        }
    }
}

/// Broker-to-listener control message, one byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Pause,
    Continue,
    Terminate,
}

impl ControlMessage {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            ControlMessage::Pause => b"P",
            ControlMessage::Continue => b"C",
            ControlMessage::Terminate => b"T",
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        match payload {
            b"P" => Ok(ControlMessage::Pause),
            b"C" => Ok(ControlMessage::Continue),
            b"T" => Ok(ControlMessage::Terminate),
            other => Err(ProtocolError::UnknownControl(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            ControlMessage::Pause => 'P',
            ControlMessage::Continue => 'C',
            ControlMessage::Terminate => 'T',
        };
        write!(f, "{c}")
    }
}

/// One row of a Select reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRow {
    pub aid: i64,
    pub attributes: Vec<String>,
    pub values: Vec<String>,
}

/// Encode one result row as `AID#ATTR1|...#VAL1|...`.
pub fn encode_row(aid: i64, attributes: &[&str], values: &[&str]) -> String {
    format!(
        "{aid}{FIELD_SEP}{}{FIELD_SEP}{}",
        attributes.join(&LIST_SEP.to_string()),
        values.join(&LIST_SEP.to_string()),
    )
}

/// Decode a reply-row datagram. Used by producer clients.
pub fn decode_row(payload: &[u8]) -> Result<ReplyRow, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
    let fields: Vec<&str> = text.split(FIELD_SEP).collect();
    if fields.len() < 3 {
        return Err(ProtocolError::MissingFields {
            expected: 3,
            got: fields.len(),
        });
    }
    let aid = fields[0]
        .parse::<i64>()
        .map_err(|_| ProtocolError::InvalidAgentId(fields[0].to_string()))?;
    let attributes: Vec<String> = fields[1].split(LIST_SEP).map(String::from).collect();
    let values: Vec<String> = fields[2].split(LIST_SEP).map(String::from).collect();
    if values.len() != attributes.len() {
        return Err(ProtocolError::LengthMismatch {
            attributes: attributes.len(),
            values: values.len(),
        });
    }
    Ok(ReplyRow {
        aid,
        attributes,
        values,
    })
}
