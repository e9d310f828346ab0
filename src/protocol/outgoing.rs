//! Typed outbound messages.

use bytes::Bytes;

use crate::core::composer::PacketComposer;
use crate::error::FrameError;
use crate::protocol::headers::outgoing as headers;

pub trait OutgoingMessage {
    const HEADER: u16;

    /// Write the message fields after the header.
    fn append_data(&self, composer: &mut PacketComposer) -> Result<(), FrameError>;

    fn compose(&self) -> Result<PacketComposer, FrameError> {
        let mut composer = PacketComposer::new(Self::HEADER);
        self.append_data(&mut composer)?;
        Ok(composer)
    }

    /// Finished wire frame.
    fn to_frame(&self) -> Result<Bytes, FrameError> {
        Ok(self.compose()?.finish())
    }
}

/// Signed DH parameters, sent in answer to the parameter request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitDiffieHandshakeEvent {
    pub signed_prime: String,
    pub signed_generator: String,
}

impl OutgoingMessage for InitDiffieHandshakeEvent {
    const HEADER: u16 = headers::INIT_DIFFIE_HANDSHAKE;

    fn append_data(&self, composer: &mut PacketComposer) -> Result<(), FrameError> {
        composer
            .append_string(&self.signed_prime)?
            .append_string(&self.signed_generator)?;
        Ok(())
    }
}

/// The server's signed DH public value. Always sent before RC4 is armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteDiffieHandshakeEvent {
    pub server_public_key: String,
}

impl OutgoingMessage for CompleteDiffieHandshakeEvent {
    const HEADER: u16 = headers::COMPLETE_DIFFIE_HANDSHAKE;

    fn append_data(&self, composer: &mut PacketComposer) -> Result<(), FrameError> {
        composer.append_string(&self.server_public_key)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::codec::decode;

    #[test]
    fn init_event_carries_both_strings() {
        let frame = InitDiffieHandshakeEvent {
            signed_prime: "ab".into(),
            signed_generator: "cd".into(),
        }
        .to_frame()
        .unwrap();

        let mut packet = decode(&frame).unwrap();
        assert_eq!(packet.header(), 771);
        assert_eq!(packet.pop_string(), "ab");
        assert_eq!(packet.pop_string(), "cd");
    }

    #[test]
    fn complete_event_header() {
        let frame = CompleteDiffieHandshakeEvent {
            server_public_key: "ff".into(),
        }
        .to_frame()
        .unwrap();
        assert_eq!(&frame[4..6], &3777u16.to_be_bytes());
    }
}
