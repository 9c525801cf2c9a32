//! Gateway command lines and response patterns.
//!
//! The gateway is an interactive `gatttool` session. Commands are single
//! text lines; responses are recognised by a fixed set of patterns searched
//! for in the session output:
//!
//! - Ready prompt: `[LE]>`
//! - Connect acknowledgment: `Connection successful`
//! - Link indicator: `[CON]`
//! - Descriptor listing: `handle: 0x000f, uuid: 00002902-...`
//! - Notification: `Notification handle = 0x000e value: 10 41 00 04`

use std::ops::Range;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::uuids::uuid_from_class;
use crate::utils::{parse_hex_bytes, to_hex_string};

/// Value written to a Client Characteristic Configuration descriptor to enable notifications.
pub const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

const PROMPT_MARKER: &str = "[LE]>";
const CONNECTION_SUCCESSFUL: &str = "Connection successful";
const LINK_CONNECTED: &str = "[CON]";
const DESCRIPTOR_PREFIX: &str = "handle: ";
const DESCRIPTOR_UUID_SEPARATOR: &str = ", uuid: ";
const NOTIFICATION_PREFIX: &str = "Notification handle = ";
const NOTIFICATION_VALUE_SEPARATOR: &str = " value: ";

/// An ATT attribute handle.
///
/// Parsed from `0x000e` or bare hex and displayed the way the gateway
/// prints it (`0x%04x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeHandle(u16);

impl AttributeHandle {
    /// Create a handle from its numeric value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl From<u16> for AttributeHandle {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl FromStr for AttributeHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        u16::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| Error::InvalidParameter {
                name: "handle".to_string(),
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A command line sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to the configured device.
    Connect,
    /// List all characteristic descriptors.
    DescribeCharacteristics,
    /// Write a value to a handle and wait for the write response.
    WriteRequest {
        /// Target handle.
        handle: AttributeHandle,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Leave the interactive session.
    Quit,
}

impl Command {
    /// Build the request enabling notifications through a CCC descriptor.
    pub fn enable_notifications(handle: AttributeHandle) -> Self {
        Self::WriteRequest {
            handle,
            value: ENABLE_NOTIFICATIONS.to_vec(),
        }
    }

    /// The text line for this command, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Connect => "connect".to_string(),
            Self::DescribeCharacteristics => "char-desc".to_string(),
            Self::WriteRequest { handle, value } => {
                format!("char-write-req {} {}", handle, to_hex_string(value))
            }
            Self::Quit => "quit".to_string(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// A characteristic descriptor line from the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Attribute handle.
    pub handle: AttributeHandle,
    /// UUID built from the listed 32-bit class.
    pub uuid: Uuid,
}

/// A notification line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Handle the value was pushed from.
    pub handle: AttributeHandle,
    /// Raw value text, space separated hex bytes.
    pub value: String,
}

impl Notification {
    /// Decode the value text into bytes.
    pub fn payload(&self) -> Result<Vec<u8>> {
        parse_hex_bytes(&self.value)
    }
}

/// A recognised gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The session prompt.
    Prompt,
    /// Explicit connect acknowledgment.
    ConnectionSuccessful,
    /// Low-level link-connected indicator.
    LinkConnected,
    /// A descriptor listing line.
    Descriptor(Descriptor),
    /// A notification line.
    Notification(Notification),
}

/// A response pattern to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// The session prompt.
    Prompt,
    /// `Connection successful`.
    ConnectionSuccessful,
    /// `[CON]`.
    LinkConnected,
    /// Any descriptor listing line.
    Descriptor,
    /// A notification from the given handle.
    Notification(AttributeHandle),
}

impl Pattern {
    /// Find the first occurrence of this pattern in `text`.
    ///
    /// Returns the byte range of the match and the parsed response.
    pub fn find(&self, text: &str) -> Option<(Range<usize>, Response)> {
        match self {
            Self::Prompt => find_literal(text, PROMPT_MARKER, Response::Prompt),
            Self::ConnectionSuccessful => {
                find_literal(text, CONNECTION_SUCCESSFUL, Response::ConnectionSuccessful)
            }
            Self::LinkConnected => find_literal(text, LINK_CONNECTED, Response::LinkConnected),
            Self::Descriptor => find_descriptor(text),
            Self::Notification(handle) => find_notification(text, *handle),
        }
    }
}

fn find_literal(text: &str, literal: &str, response: Response) -> Option<(Range<usize>, Response)> {
    text.find(literal)
        .map(|start| (start..start + literal.len(), response))
}

/// Length of a run of ASCII hex digits at the start of `s`.
fn hex_run(s: &str) -> usize {
    s.bytes().take_while(|b| b.is_ascii_hexdigit()).count()
}

/// Parse `0x<hex>` at the start of `s`, returning the handle and bytes consumed.
fn parse_handle_prefix(s: &str) -> Option<(AttributeHandle, usize)> {
    let digits = s.strip_prefix("0x")?;
    let len = hex_run(digits);
    if len == 0 {
        return None;
    }
    let value = u16::from_str_radix(&digits[..len], 16).ok()?;
    Some((AttributeHandle(value), 2 + len))
}

fn find_descriptor(text: &str) -> Option<(Range<usize>, Response)> {
    for (start, _) in text.match_indices(DESCRIPTOR_PREFIX) {
        let mut cursor = start + DESCRIPTOR_PREFIX.len();

        let Some((handle, consumed)) = parse_handle_prefix(&text[cursor..]) else {
            continue;
        };
        cursor += consumed;

        let Some(rest) = text[cursor..].strip_prefix(DESCRIPTOR_UUID_SEPARATOR) else {
            continue;
        };
        cursor += DESCRIPTOR_UUID_SEPARATOR.len();

        if hex_run(rest) < 8 {
            continue;
        }
        let Ok(class) = u32::from_str_radix(&rest[..8], 16) else {
            continue;
        };
        cursor += 8;

        let descriptor = Descriptor {
            handle,
            uuid: uuid_from_class(class),
        };
        return Some((start..cursor, Response::Descriptor(descriptor)));
    }
    None
}

fn find_notification(text: &str, wanted: AttributeHandle) -> Option<(Range<usize>, Response)> {
    for (start, _) in text.match_indices(NOTIFICATION_PREFIX) {
        let mut cursor = start + NOTIFICATION_PREFIX.len();

        let Some((handle, consumed)) = parse_handle_prefix(&text[cursor..]) else {
            continue;
        };
        if handle != wanted {
            continue;
        }
        cursor += consumed;

        let Some(rest) = text[cursor..].strip_prefix(NOTIFICATION_VALUE_SEPARATOR) else {
            continue;
        };
        cursor += NOTIFICATION_VALUE_SEPARATOR.len();

        // The value runs to the end of the line; wait for the terminator so a
        // partially received line is never decoded.
        let Some(line_len) = rest.find(['\r', '\n']) else {
            continue;
        };
        let value = rest[..line_len].trim().to_string();
        cursor += line_len;

        let notification = Notification { handle, value };
        return Some((start..cursor, Response::Notification(notification)));
    }
    None
}
