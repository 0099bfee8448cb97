//! Conversions from decoded register values to unit-tagged readings.
//!
//! Every conversion is a pure function of its raw input; the only shared
//! state is the chemical sensor calibration table, loaded on first use.

mod chemsense;
mod humidity;
mod light;
mod rainfall;
mod sound;
mod table;
mod temperature;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::field::RawValue;

pub use chemsense::GasChannel;
pub use table::{
    CalibrationEntry, CalibrationError, CalibrationSource, CalibrationStore, CalibrationTable,
    ChannelConstants,
};

/// Units used by calibrated readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "%RH")]
    RelativeHumidity,
    #[serde(rename = "hPa")]
    HectoPascal,
    #[serde(rename = "inch")]
    Inch,
    #[serde(rename = "ohm")]
    Ohm,
    #[serde(rename = "dB")]
    Decibel,
    #[serde(rename = "ppm")]
    Ppm,
    /// The register value itself, reported next to a derived quantity.
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "")]
    Unitless,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Celsius => "C",
            Unit::RelativeHumidity => "%RH",
            Unit::HectoPascal => "hPa",
            Unit::Inch => "inch",
            Unit::Ohm => "ohm",
            Unit::Decibel => "dB",
            Unit::Ppm => "ppm",
            Unit::Raw => "raw",
            Unit::Unitless => "",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(Box<str>),
    Bytes(Box<[u8]>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) | Value::Bytes(_) => None,
        }
    }
}

impl From<&RawValue> for Value {
    fn from(raw: &RawValue) -> Self {
        match raw {
            RawValue::Unsigned(v) => match i64::try_from(*v) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Float(*v as f64),
            },
            RawValue::Signed(v) => Value::Int(*v),
            RawValue::Fixed(v) => Value::Float(*v),
            RawValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
        }
    }
}

/// A `(value, unit)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: Value,
    pub unit: Unit,
}

impl Measurement {
    pub fn new(value: Value, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn float(value: f64, unit: Unit) -> Self {
        Self::new(Value::Float(value), unit)
    }
}

/// Final output for one named field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reading {
    Calibrated(Measurement),
    /// Several quantities derived from one raw field, in emission order.
    Series(Box<[Measurement]>),
    /// Uncalibrated value: passthrough fields and every degraded path.
    Raw(Value),
}

impl Reading {
    pub fn is_raw(&self) -> bool {
        matches!(self, Reading::Raw(_))
    }

    /// The calibrated measurement, when there is exactly one.
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            Reading::Calibrated(measurement) => Some(measurement),
            _ => None,
        }
    }
}

/// A chemical sensor instance with no calibration constants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no calibration constants for instance `{instance_id}`")]
pub struct CalibrationLookupMiss {
    pub instance_id: Box<str>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("{conversion} expects {expected} input")]
    UnexpectedInput {
        conversion: Conversion,
        expected: &'static str,
    },

    #[error("{conversion} cannot evaluate input: {reason}")]
    OutOfDomain {
        conversion: Conversion,
        reason: &'static str,
    },

    #[error(transparent)]
    LookupMiss(#[from] CalibrationLookupMiss),
}

/// Named conversion applied to a field after it has been sliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    /// Pass the decoded value through as a raw reading.
    None,
    /// TMP112 12-bit temperature.
    Tmp112,
    /// HIH4030 linear humidity at 5 V.
    Hih4030,
    /// Onset tipping bucket rain gauge.
    OnsetRain,
    /// PDV-P8103 photocell in a 23 kOhm divider.
    Photocell,
    /// SPV1840LR5H-B microphone sample block.
    Spv1840,
    /// Chemsense `key=value` text block.
    Chemsense,
}

impl Conversion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conversion::None => "none",
            Conversion::Tmp112 => "tmp112",
            Conversion::Hih4030 => "hih4030",
            Conversion::OnsetRain => "onset_rain",
            Conversion::Photocell => "photocell",
            Conversion::Spv1840 => "spv1840lr5h-b",
            Conversion::Chemsense => "chemsense",
        }
    }

    /// Converts one field. Most conversions emit a single reading under
    /// the field's own name; chemsense fans one block out into many.
    pub fn apply(
        &self,
        name: &str,
        raw: &RawValue,
        calibration: &CalibrationStore,
    ) -> Result<Vec<(Box<str>, Reading)>, ConversionError> {
        let reading = match self {
            Conversion::None => Reading::Raw(raw.into()),
            Conversion::Tmp112 => {
                let raw = self.integer(raw)?;
                Reading::Calibrated(Measurement::float(
                    temperature::tmp112(raw as u16),
                    Unit::Celsius,
                ))
            }
            Conversion::Hih4030 => Reading::Calibrated(Measurement::float(
                humidity::hih4030(self.number(raw)?),
                Unit::RelativeHumidity,
            )),
            Conversion::OnsetRain => Reading::Calibrated(Measurement::float(
                rainfall::onset_rain(self.number(raw)?),
                Unit::Inch,
            )),
            Conversion::Photocell => {
                let ohms = light::photocell(self.number(raw)?).ok_or(
                    ConversionError::OutOfDomain {
                        conversion: *self,
                        reason: "zero divider voltage",
                    },
                )?;
                Reading::Calibrated(Measurement::new(Value::Int(ohms), Unit::Ohm))
            }
            Conversion::Spv1840 => {
                let level = sound::spv1840(self.bytes(raw)?).ok_or(
                    ConversionError::OutOfDomain {
                        conversion: *self,
                        reason: "no samples",
                    },
                )?;
                Reading::Calibrated(Measurement::float(level, Unit::Decibel))
            }
            Conversion::Chemsense => {
                return Ok(chemsense::convert(self.bytes(raw)?, calibration.table()));
            }
        };

        Ok(vec![(name.into(), reading)])
    }

    fn integer(&self, raw: &RawValue) -> Result<i64, ConversionError> {
        raw.as_i64().ok_or(ConversionError::UnexpectedInput {
            conversion: *self,
            expected: "integer",
        })
    }

    fn number(&self, raw: &RawValue) -> Result<f64, ConversionError> {
        raw.as_f64().ok_or(ConversionError::UnexpectedInput {
            conversion: *self,
            expected: "numeric",
        })
    }

    fn bytes<'a>(&self, raw: &'a RawValue) -> Result<&'a [u8], ConversionError> {
        raw.as_bytes().ok_or(ConversionError::UnexpectedInput {
            conversion: *self,
            expected: "bytes",
        })
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Conversion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Conversion::None),
            "tmp112" => Ok(Conversion::Tmp112),
            "hih4030" => Ok(Conversion::Hih4030),
            "onset_rain" => Ok(Conversion::OnsetRain),
            "photocell" => Ok(Conversion::Photocell),
            "spv1840lr5h-b" => Ok(Conversion::Spv1840),
            "chemsense" => Ok(Conversion::Chemsense),
            _ => Err(()),
        }
    }
}

/// Rounds to `places` decimals on the exact binary value, ties to even:
/// `25.125` becomes `25.12`, `25.375` becomes `25.38`.
pub(crate) fn round_to(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}
