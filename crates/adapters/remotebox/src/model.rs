//! Remotebox models and device identification.

use std::fmt;

use crate::error::RemoteboxError;

/// Firmware versions that omit the `EA4TX` identification line.
const LEGACY_FIRMWARE: [&str; 4] = ["1.3d", "1.3b", "1.2p", "1.2l"];

/// Configuration addresses holding the four display characters of each
/// antenna, in antenna order.
pub const ANTENNA_ADDRESSES: [[&str; 4]; 12] = [
    ["10", "11", "12", "13"],
    ["14", "15", "16", "17"],
    ["18", "19", "1A", "1B"],
    ["1C", "1D", "1E", "1F"],
    ["20", "21", "22", "23"],
    ["24", "25", "26", "27"],
    ["28", "29", "2A", "2B"],
    ["2C", "2D", "2E", "2F"],
    ["46", "47", "48", "49"],
    ["4A", "4B", "4C", "4D"],
    ["4E", "4F", "50", "51"],
    ["52", "53", "54", "55"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Rb1x6,
    Rb2x6,
    Rb1x8,
    Rb2x8,
    Rb4Sq,
    Rb2x12,
    Rb4SqPlus,
    Relay,
    Rb1x3,
}

impl Model {
    pub const ALL: [Self; 9] = [
        Self::Rb1x6,
        Self::Rb2x6,
        Self::Rb1x8,
        Self::Rb2x8,
        Self::Rb4Sq,
        Self::Rb2x12,
        Self::Rb4SqPlus,
        Self::Relay,
        Self::Rb1x3,
    ];

    /// Id reported in the `Firm:` field of the device info.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Rb1x6 => 1,
            Self::Rb2x6 => 2,
            Self::Rb1x8 => 3,
            Self::Rb2x8 => 4,
            Self::Rb4Sq => 5,
            Self::Rb2x12 => 6,
            Self::Rb4SqPlus => 7,
            Self::Relay => 8,
            Self::Rb1x3 => 9,
        }
    }

    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.id() == id)
    }

    /// Prefix of the port names, also the prefix of status lines.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Rb4Sq | Self::Rb4SqPlus => "SQ",
            Self::Rb1x3 => "ST",
            _ => "SW",
        }
    }

    #[must_use]
    pub const fn ports(self) -> usize {
        match self {
            Self::Rb2x6 | Self::Rb2x8 | Self::Rb2x12 => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub const fn antennas(self) -> usize {
        match self {
            Self::Rb1x6 | Self::Rb2x6 => 6,
            Self::Rb1x8 | Self::Rb2x8 | Self::Relay => 8,
            Self::Rb4Sq | Self::Rb4SqPlus => 4,
            Self::Rb2x12 => 12,
            Self::Rb1x3 => 3,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rb1x6 => "1x6",
            Self::Rb2x6 => "2x6",
            Self::Rb1x8 => "1x8",
            Self::Rb2x8 => "2x8",
            Self::Rb4Sq => "4SQ",
            Self::Rb2x12 => "2x12",
            Self::Rb4SqPlus => "4SQ+",
            Self::Relay => "Relay",
            Self::Rb1x3 => "1x3",
        };
        f.write_str(name)
    }
}

/// Identify the box from the two lines answering `O`.
///
/// Current firmware sends `EA4TX <model>` followed by
/// `Ver<firmware> Firm:<id>..`; legacy firmware sends only the version line,
/// in which case `line2` is empty.
///
/// # Errors
///
/// Returns [`RemoteboxError::DeviceInfo`] for malformed lines and
/// [`RemoteboxError::UnsupportedModel`] for an unknown model id.
pub fn parse_device_info(line1: &str, line2: &str) -> Result<(Model, String), RemoteboxError> {
    let malformed = || RemoteboxError::DeviceInfo(format!("{line1} / {line2}"));

    let version_line = if line2.len() <= 1 { line1 } else { line2 };
    let fields: Vec<&str> = version_line.split_whitespace().collect();
    let [version, firm] = fields.as_slice() else {
        return Err(malformed());
    };

    let firmware = version.get(3..).ok_or_else(malformed)?.to_lowercase();
    let id: u8 = firm
        .get(5..6)
        .and_then(|digit| digit.parse().ok())
        .ok_or_else(malformed)?;
    let model = Model::from_id(id).ok_or(RemoteboxError::UnsupportedModel(id))?;

    if !LEGACY_FIRMWARE.contains(&firmware.as_str()) && !line1.contains("EA4TX") {
        return Err(malformed());
    }
    Ok((model, firmware))
}
