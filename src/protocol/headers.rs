//! Message ids used by the authentication bootstrap.

/// Client to server.
pub mod incoming {
    pub const CLIENT_HELLO: u16 = 4000;
    pub const INIT_DIFFIE_HANDSHAKE: u16 = 586;
    pub const COMPLETE_DIFFIE_HANDSHAKE: u16 = 2616;
    pub const SSO_TICKET: u16 = 53;
    pub const PERFORMANCE_LOG: u16 = 747;
    pub const UNIQUE_ID: u16 = 1390;
    pub const VERSION_CHECK: u16 = 2602;
}

/// Server to client.
pub mod outgoing {
    pub const INIT_DIFFIE_HANDSHAKE: u16 = 771;
    pub const COMPLETE_DIFFIE_HANDSHAKE: u16 = 3777;
}
