//! Declarative per-sensor field layout.
//!
//! The table is configuration, not code: it maps a subpacket sensor id to
//! the ordered fields inside that sensor's raw bytes, so a new sensor is
//! added by declaring it here and naming one of the known conversions.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::calibration::Conversion;
use crate::protocol::MAX_SUBPACKET_SIZE;

const BUILTIN_SPEC: &str = include_str!("../assets/sensors.toml");

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("failed to read specification {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed specification: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("sensor entry #{index} has no id")]
    MissingSensorId { index: usize },

    #[error("sensor {sensor_id:#04X} has no params list")]
    MissingParams { sensor_id: u8 },

    #[error("sensor {sensor_id:#04X} param #{index} is missing `{attribute}`")]
    MissingAttribute {
        sensor_id: u8,
        index: usize,
        attribute: &'static str,
    },

    #[error("sensor {sensor_id:#04X} param `{name}`: unknown format `{format}`")]
    UnknownFormat {
        sensor_id: u8,
        name: String,
        format: String,
    },

    #[error("sensor {sensor_id:#04X} param `{name}`: unknown conversion `{conversion}`")]
    UnknownConversion {
        sensor_id: u8,
        name: String,
        conversion: String,
    },

    #[error("sensor {sensor_id:#04X} param `{name}`: length {length} is not valid for {format}")]
    InvalidLength {
        sensor_id: u8,
        name: String,
        length: usize,
        format: Format,
    },

    #[error("sensor {sensor_id:#04X} param `{name}`: open-ended bytes field must be last")]
    OpenLengthNotLast { sensor_id: u8, name: String },

    #[error("sensor {0:#04X} is declared twice")]
    DuplicateSensor(u8),
}

/// A subpacket whose sensor id has no registered layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no specification registered for sensor {sensor_id:#04X}")]
pub struct UnknownSensorError {
    pub sensor_id: u8,
}

/// How the bytes of one field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Unsigned big-endian integer.
    Uint,
    /// Two's complement big-endian integer.
    Int,
    UintLe,
    IntLe,
    /// Two's complement big-endian with 8 fractional bits.
    Fixed,
    /// Opaque bytes, passed through untouched.
    Bytes,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Uint => "uint",
            Format::Int => "int",
            Format::UintLe => "uint_le",
            Format::IntLe => "int_le",
            Format::Fixed => "fixed",
            Format::Bytes => "bytes",
        }
    }

    pub fn accepts_length(&self, length: usize) -> bool {
        match self {
            Format::Uint | Format::Int | Format::UintLe | Format::IntLe => {
                matches!(length, 1 | 2 | 4)
            }
            Format::Fixed => matches!(length, 2 | 4),
            Format::Bytes => length <= MAX_SUBPACKET_SIZE,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint" => Ok(Format::Uint),
            "int" => Ok(Format::Int),
            "uint_le" => Ok(Format::UintLe),
            "int_le" => Ok(Format::IntLe),
            "fixed" => Ok(Format::Fixed),
            "bytes" => Ok(Format::Bytes),
            _ => Err(()),
        }
    }
}

/// One declared field within a sensor's raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Output field key.
    pub name: Box<str>,
    /// Byte width. Zero on a `bytes` field means "the rest of the subpacket".
    pub length: usize,
    pub format: Format,
    pub conversion: Conversion,
}

impl ParamSpec {
    pub fn is_open_ended(&self) -> bool {
        self.format == Format::Bytes && self.length == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    pub id: u8,
    pub label: Option<Box<str>>,
    pub params: Box<[ParamSpec]>,
}

/// Immutable sensor id to field layout table.
#[derive(Debug, Clone, Default)]
pub struct SpecRegistry {
    sensors: HashMap<u8, SensorSpec>,
}

#[derive(Deserialize)]
struct SpecFile {
    #[serde(default, rename = "sensor")]
    sensors: Vec<SensorEntry>,
}

#[derive(Deserialize)]
struct SensorEntry {
    id: Option<u8>,
    label: Option<String>,
    params: Option<Vec<ParamEntry>>,
}

#[derive(Deserialize)]
struct ParamEntry {
    name: Option<String>,
    length: Option<usize>,
    format: Option<String>,
    conversion: Option<String>,
}

impl SpecRegistry {
    /// Parses a TOML specification table.
    pub fn load(source: &str) -> Result<Self, SpecError> {
        let file: SpecFile = toml::from_str(source)?;
        let mut sensors = HashMap::with_capacity(file.sensors.len());

        for (index, entry) in file.sensors.into_iter().enumerate() {
            let sensor = entry.into_spec(index)?;

            if sensors.contains_key(&sensor.id) {
                return Err(SpecError::DuplicateSensor(sensor.id));
            }
            sensors.insert(sensor.id, sensor);
        }

        Ok(Self { sensors })
    }

    pub fn from_path(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::load(&content)
    }

    /// The table shipped with this crate, parsed on first use.
    pub fn builtin() -> Result<&'static Self, &'static SpecError> {
        static BUILTIN: OnceLock<Result<SpecRegistry, SpecError>> = OnceLock::new();

        BUILTIN.get_or_init(|| Self::load(BUILTIN_SPEC)).as_ref()
    }

    /// Ordered field layout for `sensor_id`.
    pub fn get(&self, sensor_id: u8) -> Result<&[ParamSpec], UnknownSensorError> {
        self.sensors
            .get(&sensor_id)
            .map(|sensor| &*sensor.params)
            .ok_or(UnknownSensorError { sensor_id })
    }

    pub fn sensor(&self, sensor_id: u8) -> Option<&SensorSpec> {
        self.sensors.get(&sensor_id)
    }

    pub fn sensor_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.sensors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl SensorEntry {
    fn into_spec(self, index: usize) -> Result<SensorSpec, SpecError> {
        let id = self.id.ok_or(SpecError::MissingSensorId { index })?;
        let entries = self.params.ok_or(SpecError::MissingParams { sensor_id: id })?;

        let mut params = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            params.push(entry.into_spec(id, index)?);
        }

        // an open-ended field has no fixed end, so nothing may follow it
        if let Some(open) = params[..params.len().saturating_sub(1)]
            .iter()
            .find(|param| param.is_open_ended())
        {
            return Err(SpecError::OpenLengthNotLast {
                sensor_id: id,
                name: open.name.to_string(),
            });
        }

        Ok(SensorSpec {
            id,
            label: self.label.map(String::into_boxed_str),
            params: params.into_boxed_slice(),
        })
    }
}

impl ParamEntry {
    fn into_spec(self, sensor_id: u8, index: usize) -> Result<ParamSpec, SpecError> {
        let missing = |attribute| SpecError::MissingAttribute {
            sensor_id,
            index,
            attribute,
        };

        let name = self.name.ok_or_else(|| missing("name"))?;
        let length = self.length.ok_or_else(|| missing("length"))?;
        let format = self.format.ok_or_else(|| missing("format"))?;
        let conversion = self.conversion.ok_or_else(|| missing("conversion"))?;

        let format: Format = format.parse().map_err(|_| SpecError::UnknownFormat {
            sensor_id,
            name: name.clone(),
            format,
        })?;

        let conversion: Conversion =
            conversion
                .parse()
                .map_err(|_| SpecError::UnknownConversion {
                    sensor_id,
                    name: name.clone(),
                    conversion,
                })?;

        if !format.accepts_length(length) {
            return Err(SpecError::InvalidLength {
                sensor_id,
                name,
                length,
                format,
            });
        }

        Ok(ParamSpec {
            name: name.into_boxed_str(),
            length,
            format,
            conversion,
        })
    }
}

/// Parses a specification table; see [`SpecRegistry::load`].
pub fn load_spec(source: &str) -> Result<SpecRegistry, SpecError> {
    SpecRegistry::load(source)
}
