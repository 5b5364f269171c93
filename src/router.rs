use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{Command, Envelope, MessagePayload};
use crate::registry::{Client, Registry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A reply was written back to the sender.
    Replied,
    /// The raw frame was written to the client with this id.
    Forwarded { to: String },
    Ignored,
}

/// Applies one validated envelope from `sender`.
///
/// `raw` is the frame exactly as received; directed messages are forwarded
/// without re-encoding. A write failure on the recipient side is logged and
/// the message dropped.
pub async fn dispatch(
    registry: &Registry,
    sender: &Client,
    envelope: &Envelope,
    raw: &[u8],
) -> Result<Outcome> {
    match envelope {
        Envelope::Command(Command::ClientsList) => {
            let reply = Envelope::clients(registry.snapshot());

            if let Err(e) = sender.peer.send_envelope(&reply).await {
                warn!(client = %sender.address, error = %e, "failed to send clients list");
            }

            Ok(Outcome::Replied)
        }

        Envelope::Command(Command::Stop) => {
            info!(client = %sender.address, "STOP received from client, nothing to do on server");
            Ok(Outcome::Ignored)
        }

        Envelope::Command(Command::Unknown(name)) => {
            warn!(client = %sender.address, command = %name, "unknown command");
            Ok(Outcome::Ignored)
        }

        Envelope::Message(payload) => {
            let recipient = resolve(registry, payload)?;

            debug!(from = %sender.address, to = %recipient.address, "forwarding message");

            if let Err(e) = recipient.peer.send_frame(raw).await {
                warn!(to = %recipient.address, error = %e, "failed to deliver message");
            }

            Ok(Outcome::Forwarded { to: recipient.id })
        }

        Envelope::Clients(_) => {
            debug!(client = %sender.address, "ignoring inbound clients envelope");
            Ok(Outcome::Ignored)
        }
    }
}

/// A non-empty id is looked up by id only; the address is used when the id
/// is empty.
pub fn resolve(registry: &Registry, payload: &MessagePayload) -> Result<Client> {
    if !payload.id.is_empty() {
        return registry.lookup_by_id(&payload.id);
    }

    if !payload.ip.is_empty() {
        return registry.lookup_by_address(&payload.ip);
    }

    Err(Error::NotFound(String::new()))
}
