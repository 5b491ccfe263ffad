//! Remotebox line protocol.
//!
//! Every message is one ASCII line terminated by `\n` (often `\r\n`).

use std::collections::HashMap;

use crate::error::RemoteboxError;
use crate::model::ANTENNA_ADDRESSES;

/// Request the two device-info lines.
pub const DEVICE_INFO: &[u8] = b"O\n";
/// Request the configuration dump.
pub const CONFIG_DUMP: &[u8] = b"FI\n";
/// Number of lines answering [`CONFIG_DUMP`].
pub const CONFIG_LINES: usize = 16;
/// Request the status of every port.
pub const STATUS: &[u8] = b"S\n";

/// Configuration memory of the box: address → byte.
pub type ConfigMap = HashMap<String, u8>;

/// Parse the `AA:HH` tuples of the configuration dump.
///
/// # Errors
///
/// Returns [`RemoteboxError::Config`] for a tuple that is not
/// `address:hex-byte`.
pub fn parse_config<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<ConfigMap, RemoteboxError> {
    let mut map = HashMap::new();
    for tuple in lines.into_iter().flat_map(str::split_whitespace) {
        let (address, value) = tuple
            .split_once(':')
            .ok_or_else(|| RemoteboxError::Config(format!("malformed tuple {tuple:?}")))?;
        let byte = u8::from_str_radix(value, 16)
            .map_err(|_| RemoteboxError::Config(format!("malformed value in {tuple:?}")))?;
        map.insert(address.to_string(), byte);
    }
    Ok(map)
}

/// Name of antenna `antenna` (0-based) as shown on the box's display,
/// surrounding blanks removed.
///
/// # Errors
///
/// Returns [`RemoteboxError::Config`] when a character address is missing
/// from the dump.
pub fn antenna_name(config: &ConfigMap, antenna: usize) -> Result<String, RemoteboxError> {
    let addresses = ANTENNA_ADDRESSES
        .get(antenna)
        .ok_or_else(|| RemoteboxError::Config(format!("no antenna {}", antenna + 1)))?;
    let mut name = String::with_capacity(4);
    for address in addresses {
        let byte = config
            .get(*address)
            .ok_or_else(|| RemoteboxError::Config(format!("missing address {address}")))?;
        name.push(char::from(*byte));
    }
    Ok(name.trim().to_string())
}

/// A parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// `SW1: 0,1,0,0,0,0;`: one flag per terminal.
    Terminals { port: String, states: Vec<bool> },
    /// `SQ1: 3;`: the 1-based selected terminal.
    Selected { port: String, terminal: usize },
}

/// Parse a status line. Lines that are not status reports yield `None`.
///
/// # Errors
///
/// Returns [`RemoteboxError::Status`] for a status line with an unreadable
/// body.
pub fn parse_status(line: &str) -> Result<Option<Status>, RemoteboxError> {
    let invalid = || RemoteboxError::Status(line.to_string());

    let Some(kind) = line.get(0..2) else {
        return Ok(None);
    };
    if !matches!(kind, "SW" | "ST" | "SQ") {
        return Ok(None);
    }
    let port = line.get(0..3).ok_or_else(invalid)?.to_string();
    let body = line
        .len()
        .checked_sub(1)
        .and_then(|end| line.get(5..end))
        .ok_or_else(invalid)?;

    if kind == "SQ" {
        let terminal: usize = body.trim().parse().map_err(|_| invalid())?;
        if terminal == 0 {
            return Err(invalid());
        }
        return Ok(Some(Status::Selected { port, terminal }));
    }

    let states = body
        .split(',')
        .map(|flag| match flag.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Status::Terminals { port, states }))
}

/// Command selecting terminal `terminal` on port `port` (both 1-based).
/// Terminals 10 to 12 are sent as `A` to `C`.
#[must_use]
pub fn select_command(port: i32, terminal: i32) -> String {
    let terminal = match terminal {
        10 => "A".to_string(),
        11 => "B".to_string(),
        12 => "C".to_string(),
        other => other.to_string(),
    };
    format!("{port}R{terminal}1\n")
}
