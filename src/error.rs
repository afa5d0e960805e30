//! The error taxonomy shared by every layer of the crate.

use thiserror::Error;

/// Everything that can go wrong while talking to an HCI controller or
/// while driving a test scenario against one.
#[derive(Debug, Error)]
pub enum HciError {
    #[error("not enough bytes to decode a {what}: needed {needed}, had {had}")]
    Underflow {
        what: &'static str,
        needed: usize,
        had: usize,
    },

    #[error("malformed {what}: {reason}")]
    ParseError { what: &'static str, reason: String },

    #[error("packet type byte {0:#04x} is not one of command/acl/sco/event")]
    ProtocolError(u8),

    #[error("event code {code:#04x} has no decoder")]
    EventNotImplemented { code: u8 },

    #[error("LE meta sub-event code {subcode:#04x} has no decoder")]
    LeEventNotImplemented { subcode: u8 },

    #[error("command complete for opcode {opcode:#06x} has no return-parameter parser")]
    CommandCompleteNotImplemented { opcode: u16 },

    #[error("command {opcode:#06x} failed with status {status:#04x}")]
    CommandError { opcode: u16, status: u8 },

    #[error("invalid parameters for command {opcode:#06x}: {reason}")]
    InvalidCommandParameters { opcode: u16, reason: String },

    #[error("timed out waiting for {what}")]
    Timeout { what: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("os error: {0}")]
    Nix(#[from] nix::Error),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("test failure: {0}")]
    TestError(String),

    /// Raised out of a coordinator-side blocking call (`recv`/`wait`) when
    /// a sibling worker reported failure or the process received SIGINT.
    #[error("aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, HciError>;
