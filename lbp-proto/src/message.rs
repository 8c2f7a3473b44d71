//! Message id classification.
//!
//! Ids `0x00..=0x0F` are reserved by the protocol and answered by the
//! link endpoint itself; everything from [`FIRST_APPLICATION_ID`] up is
//! left to the application. Several reserved requests have an
//! asynchronous reply counterpart at `id + 1`.

/// Negative acknowledgement; also the reply to unsupported commands.
pub const NACK: u8 = 0x01;
/// Identification request.
pub const IDENTIFY: u8 = 0x02;
/// Asynchronous identification reply.
pub const IDENTIFY_ASYNC_REPLY: u8 = 0x03;
/// Paged extended identification request (synchronous only).
pub const EXTENDED_IDENTIFY: u8 = 0x03;
/// Network discovery; answered by routers, end devices Nack it.
pub const NETWORK_DISCOVERY: u8 = 0x04;
/// Asynchronous network discovery reply.
pub const NETWORK_DISCOVERY_ASYNC_REPLY: u8 = 0x05;
/// Status request.
pub const STATUS_REQUEST: u8 = 0x06;
/// Asynchronous status reply.
pub const STATUS_REQUEST_ASYNC_REPLY: u8 = 0x07;

/// First id available to applications.
pub const FIRST_APPLICATION_ID: u8 = 0x10;

/// Reserved protocol commands understood by every end device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReservedCommand {
    Nack,
    Identify,
    ExtendedIdentify,
    NetworkDiscovery,
    StatusRequest,
    /// Reserved id this device does not implement.
    Unrecognized(u8),
}

/// A raw message id sorted into the reserved or application range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageId {
    Reserved(ReservedCommand),
    Application(u8),
}

impl From<u8> for MessageId {
    fn from(id: u8) -> Self {
        if id >= FIRST_APPLICATION_ID {
            return Self::Application(id);
        }
        Self::Reserved(match id {
            NACK => ReservedCommand::Nack,
            IDENTIFY => ReservedCommand::Identify,
            EXTENDED_IDENTIFY => ReservedCommand::ExtendedIdentify,
            NETWORK_DISCOVERY => ReservedCommand::NetworkDiscovery,
            STATUS_REQUEST => ReservedCommand::StatusRequest,
            other => ReservedCommand::Unrecognized(other),
        })
    }
}
