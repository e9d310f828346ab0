//! Typed inbound messages.
//!
//! Each message knows its header id and how to pop its fields off a
//! [`ClientPacket`]. Parsing never fails: missing fields come back as zero or
//! empty, exactly like the underlying readers.

use serde::Serialize;

use crate::core::packet::ClientPacket;
use crate::protocol::headers::incoming as headers;

/// A message the dispatcher can decode by header id.
pub trait IncomingMessage: Clone + Send + Sync + Into<InboundMessage> + 'static {
    const HEADER: u16;
    const NAME: &'static str;

    fn parse(packet: &mut ClientPacket) -> Self;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientHello {
    pub release_version: String,
    pub client_type: String,
}

impl IncomingMessage for ClientHello {
    const HEADER: u16 = headers::CLIENT_HELLO;
    const NAME: &'static str = "ClientHello";

    fn parse(packet: &mut ClientPacket) -> Self {
        Self {
            release_version: packet.pop_string(),
            client_type: packet.pop_string(),
        }
    }
}

/// Empty request for the DH parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitDiffieHandshake {}

impl IncomingMessage for InitDiffieHandshake {
    const HEADER: u16 = headers::INIT_DIFFIE_HANDSHAKE;
    const NAME: &'static str = "InitDiffieHandshake";

    fn parse(_packet: &mut ClientPacket) -> Self {
        Self {}
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteDiffieHandshake {
    /// RSA-wrapped, hex encoded client DH public value.
    pub client_public_key: String,
}

impl IncomingMessage for CompleteDiffieHandshake {
    const HEADER: u16 = headers::COMPLETE_DIFFIE_HANDSHAKE;
    const NAME: &'static str = "CompleteDiffieHandshake";

    fn parse(packet: &mut ClientPacket) -> Self {
        Self {
            client_public_key: packet.pop_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SsoTicket {
    pub ticket: String,
    pub elapsed_ms: i32,
}

impl IncomingMessage for SsoTicket {
    const HEADER: u16 = headers::SSO_TICKET;
    const NAME: &'static str = "SsoTicket";

    fn parse(packet: &mut ClientPacket) -> Self {
        Self {
            ticket: packet.pop_string(),
            elapsed_ms: packet.pop_int(),
        }
    }
}

/// Client diagnostics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceLog {
    pub report_id: i32,
    pub client_type: String,
    pub client_version: String,
    pub operating_system: String,
    pub flash_version: String,
    pub is_web_client: bool,
    pub memory_usage: i32,
    pub average_fps: i32,
    pub report_count: i32,
    pub unknown_value: i32,
    pub additional_value: i32,
}

impl IncomingMessage for PerformanceLog {
    const HEADER: u16 = headers::PERFORMANCE_LOG;
    const NAME: &'static str = "PerformanceLog";

    fn parse(packet: &mut ClientPacket) -> Self {
        Self {
            report_id: packet.pop_int(),
            client_type: packet.pop_string(),
            client_version: packet.pop_string(),
            operating_system: packet.pop_string(),
            flash_version: packet.pop_string(),
            is_web_client: packet.pop_boolean(),
            memory_usage: packet.pop_int(),
            average_fps: packet.pop_int(),
            report_count: packet.pop_int(),
            unknown_value: packet.pop_int(),
            additional_value: packet.pop_int(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueId {
    pub machine_id: String,
    pub fingerprint: String,
    pub client_info: String,
}

impl IncomingMessage for UniqueId {
    const HEADER: u16 = headers::UNIQUE_ID;
    const NAME: &'static str = "UniqueId";

    fn parse(packet: &mut ClientPacket) -> Self {
        Self {
            machine_id: packet.pop_string(),
            fingerprint: packet.pop_string(),
            client_info: packet.pop_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionCheck {
    /// Opaque client value, meaning unknown.
    pub client_id: i32,
    pub client_path: String,
    pub external_variables_url: String,
}

impl IncomingMessage for VersionCheck {
    const HEADER: u16 = headers::VERSION_CHECK;
    const NAME: &'static str = "VersionCheck";

    fn parse(packet: &mut ClientPacket) -> Self {
        Self {
            client_id: packet.pop_int(),
            client_path: packet.pop_string(),
            external_variables_url: packet.pop_string(),
        }
    }
}

/// Any parsed inbound message, as published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ClientHello(ClientHello),
    InitDiffieHandshake(InitDiffieHandshake),
    CompleteDiffieHandshake(CompleteDiffieHandshake),
    SsoTicket(SsoTicket),
    PerformanceLog(PerformanceLog),
    UniqueId(UniqueId),
    VersionCheck(VersionCheck),
}

macro_rules! impl_from_message {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for InboundMessage {
                fn from(message: $variant) -> Self {
                    InboundMessage::$variant(message)
                }
            }
        )*
    };
}

impl_from_message!(
    ClientHello,
    InitDiffieHandshake,
    CompleteDiffieHandshake,
    SsoTicket,
    PerformanceLog,
    UniqueId,
    VersionCheck,
);

impl InboundMessage {
    pub fn header(&self) -> u16 {
        match self {
            InboundMessage::ClientHello(_) => ClientHello::HEADER,
            InboundMessage::InitDiffieHandshake(_) => InitDiffieHandshake::HEADER,
            InboundMessage::CompleteDiffieHandshake(_) => CompleteDiffieHandshake::HEADER,
            InboundMessage::SsoTicket(_) => SsoTicket::HEADER,
            InboundMessage::PerformanceLog(_) => PerformanceLog::HEADER,
            InboundMessage::UniqueId(_) => UniqueId::HEADER,
            InboundMessage::VersionCheck(_) => VersionCheck::HEADER,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::composer::PacketComposer;
    use crate::core::codec::decode;

    fn packet(composer: PacketComposer) -> ClientPacket {
        decode(&composer.finish()).unwrap()
    }

    #[test]
    fn performance_log_reads_every_field() {
        let mut c = PacketComposer::new(PerformanceLog::HEADER);
        c.append_int(3);
        for s in ["FLASH", "v1", "linux", "32,0"] {
            c.append_string(s).unwrap();
        }
        c.append_boolean(true)
            .append_int(512)
            .append_int(60)
            .append_int(2)
            .append_int(0)
            .append_int(9);

        let log = PerformanceLog::parse(&mut packet(c));
        assert_eq!(log.report_id, 3);
        assert_eq!(log.operating_system, "linux");
        assert!(log.is_web_client);
        assert_eq!(log.average_fps, 60);
        assert_eq!(log.additional_value, 9);
    }

    #[test]
    fn short_sso_ticket_defaults_missing_fields() {
        let mut c = PacketComposer::new(SsoTicket::HEADER);
        c.append_string("abc").unwrap();
        let sso = SsoTicket::parse(&mut packet(c));
        assert_eq!(sso.ticket, "abc");
        assert_eq!(sso.elapsed_ms, 0);
    }

    #[test]
    fn events_carry_their_header() {
        let event: InboundMessage = UniqueId {
            machine_id: "m".into(),
            fingerprint: "f".into(),
            client_info: "c".into(),
        }
        .into();
        assert_eq!(event.header(), 1390);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unique_id");
        assert_eq!(json["fingerprint"], "f");
    }
}
