//! Wire envelopes exchanged between clients and the relay.
//!
//! Every frame is a JSON record `{"type": .., "payload": ..}`. The payload
//! shape is chosen by `type`, so decoding happens in two steps: the outer
//! record first, then the payload once the kind has been validated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const STOP: &str = "STOP";
pub const CLIENTS_LIST: &str = "CLIENTS_LIST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Message,
    Command,
    Clients,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Message => "message",
            Kind::Command => "command",
            Kind::Clients => "clients",
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "message" => Ok(Kind::Message),
            "command" => Ok(Kind::Command),
            "clients" => Ok(Kind::Clients),
            other => Err(Error::Validation(other.to_string())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    Stop,
    ClientsList,
    Unknown(String),
}

impl From<String> for Command {
    fn from(name: String) -> Self {
        match name.as_str() {
            STOP => Command::Stop,
            CLIENTS_LIST => Command::ClientsList,
            _ => Command::Unknown(name),
        }
    }
}

impl From<Command> for String {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Stop => STOP.to_string(),
            Command::ClientsList => CLIENTS_LIST.to_string(),
            Command::Unknown(name) => name,
        }
    }
}

/// A directed message. The recipient is resolved by `id` when one is given,
/// otherwise by `ip` (the peer's remote address).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub text: String,
}

/// Read-only projection of a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientsPayload {
    #[serde(rename = "Clients", default)]
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Envelope {
    Message(MessagePayload),
    Command(Command),
    Clients(ClientsPayload),
}

impl Envelope {
    pub fn stop() -> Self {
        Envelope::Command(Command::Stop)
    }

    pub fn list_request() -> Self {
        Envelope::Command(Command::ClientsList)
    }

    pub fn clients(clients: Vec<ClientSummary>) -> Self {
        Envelope::Clients(ClientsPayload { clients })
    }

    pub fn kind(&self) -> Kind {
        match self {
            Envelope::Message(_) => Kind::Message,
            Envelope::Command(_) => Kind::Command,
            Envelope::Clients(_) => Kind::Clients,
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Rejects any `type` outside `message`, `command` and `clients`.
pub fn validate_kind(kind: &str) -> Result<Kind> {
    kind.parse()
}

pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let raw: RawEnvelope = serde_json::from_slice(bytes)?;

    let envelope = match validate_kind(&raw.kind)? {
        Kind::Message => Envelope::Message(serde_json::from_value(raw.payload)?),
        Kind::Command => Envelope::Command(serde_json::from_value(raw.payload)?),
        Kind::Clients => Envelope::Clients(serde_json::from_value(raw.payload)?),
    };

    Ok(envelope)
}

/// Compact JSON, no trailing newline.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}
