//! Sensor reading data structures.
//!
//! The record produced by a gather and the decode table for the light mode.

use chrono::{DateTime, Utc};

use crate::utils::hex_code_to_byte;

/// The two measurements a LILO exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Measurement {
    /// Time characteristic.
    Time,
    /// Light mode characteristic.
    Light,
}

impl Measurement {
    /// Key used for this measurement in the record.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Light => "light",
        }
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Lighting program reported by the light characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightMode {
    /// Lamp off.
    Off,
    /// Full brightness for taking pictures.
    PhotoMode,
    /// Spring program.
    Spring,
    /// Summer program.
    Summer,
}

impl LightMode {
    /// Decode the raw light byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Off),
            0x01 => Some(Self::PhotoMode),
            0x02 => Some(Self::Spring),
            0x03 => Some(Self::Summer),
            _ => None,
        }
    }

    /// Decode the two-character hex code devices report (`"00"` through `"03"`).
    pub fn from_hex_code(code: &str) -> Option<Self> {
        hex_code_to_byte(code).and_then(Self::from_byte)
    }

    /// Raw byte for this mode.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Off => 0x00,
            Self::PhotoMode => 0x01,
            Self::Spring => 0x02,
            Self::Summer => 0x03,
        }
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::PhotoMode => "Photo mode",
            Self::Spring => "Spring",
            Self::Summer => "Summer",
        }
    }
}

impl std::fmt::Display for LightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest values read from a LILO.
///
/// Starts with every field absent. A successful gather replaces the whole
/// record at once, so `time` and `light` always come from the same read cycle.
/// Only the first byte of each characteristic payload is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    /// First byte of the time characteristic.
    pub time: Option<u8>,
    /// First byte of the light characteristic.
    pub light: Option<u8>,
    /// When the record was last updated.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SensorReading {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a complete record from one read cycle.
    pub(crate) fn from_cycle(time: u8, light: u8, updated_at: DateTime<Utc>) -> Self {
        Self {
            time: Some(time),
            light: Some(light),
            updated_at: Some(updated_at),
        }
    }

    /// Get a measurement by key.
    pub fn get(&self, measurement: Measurement) -> Option<u8> {
        match measurement {
            Measurement::Time => self.time,
            Measurement::Light => self.light,
        }
    }

    /// Iterate over `(measurement, value)` in record order.
    pub fn iter(&self) -> impl Iterator<Item = (Measurement, Option<u8>)> + '_ {
        [Measurement::Time, Measurement::Light]
            .into_iter()
            .map(move |m| (m, self.get(m)))
    }

    /// Whether any read has completed yet.
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.light.is_none()
    }

    /// Decoded light mode, if the raw byte is a known code.
    pub fn light_mode(&self) -> Option<LightMode> {
        self.light.and_then(LightMode::from_byte)
    }
}

impl std::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_value = |value: Option<u8>| match value {
            Some(v) => format!("{:#04x}", v),
            None => "-".to_string(),
        };
        write!(
            f,
            "time: {}, light: {}",
            fmt_value(self.time),
            fmt_value(self.light)
        )
    }
}
