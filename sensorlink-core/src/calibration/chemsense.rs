use std::fmt;

use super::{
    CalibrationEntry, CalibrationLookupMiss, CalibrationTable, Conversion, ConversionError,
    Measurement, Reading, Unit, Value, round_to,
};

// block text: whitespace separated KEY=VALUE tokens, e.g.
// "BAD=5410EC38E5F0 SQN=4f IRR=-1153 AT0=2543 ..."

const OUTPUT_PREFIX: &str = "chemsense_";
const INSTANCE_KEY: &str = "BAD";
const SEQUENCE_KEY: &str = "SQN";
const TEMPERATURE_KEYS: [&str; 4] = ["AT0", "AT1", "AT2", "AT3"];

const ENVIRONMENT_MARKERS: [&str; 5] = ["SH", "HD", "LP", "AT", "LT"];
const COUNTER_MARKERS: [&str; 7] = ["SVL", "SIR", "SUV", "AC", "GY", "VIX", "OIX"];

/// Reference temperature of the baseline constants, C.
const T_ZERO: f64 = 40.0;

/// Electrochemical channels with calibration constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasChannel {
    Irr,
    Iaq,
    So2,
    H2s,
    Ozo,
    No2,
    Cmo,
}

impl GasChannel {
    /// Column order of the calibration table.
    pub const ALL: [GasChannel; 7] = [
        GasChannel::Irr,
        GasChannel::Iaq,
        GasChannel::So2,
        GasChannel::H2s,
        GasChannel::Ozo,
        GasChannel::No2,
        GasChannel::Cmo,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            GasChannel::Irr => "IRR",
            GasChannel::Iaq => "IAQ",
            GasChannel::So2 => "SO2",
            GasChannel::H2s => "H2S",
            GasChannel::Ozo => "OZO",
            GasChannel::No2 => "NO2",
            GasChannel::Cmo => "CMO",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.key() == key)
    }
}

impl fmt::Display for GasChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Expands one chemsense text block into its sub-readings, in the order
/// the keys first appear.
pub(crate) fn convert(raw: &[u8], table: &CalibrationTable) -> Vec<(Box<str>, Reading)> {
    let text = String::from_utf8_lossy(raw);
    let pairs = parse_pairs(&text);

    let board = Board {
        calibration: lookup(&pairs, table),
        mean_temperature: mean_temperature(&pairs),
    };

    pairs
        .iter()
        .map(|&(key, value)| (output_name(key), board.reading(key, value)))
        .collect()
}

/// Splits `KEY=VALUE` tokens. A repeated key keeps its first position
/// and its last value.
fn parse_pairs(text: &str) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();

    for token in text.split_whitespace() {
        let Some((key, value)) = token.rsplit_once('=') else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }

        match pairs.iter_mut().find(|(existing, _)| *existing == key) {
            Some(pair) => pair.1 = value,
            None => pairs.push((key, value)),
        }
    }

    pairs
}

fn output_name(key: &str) -> Box<str> {
    if key == INSTANCE_KEY {
        return format!("{OUTPUT_PREFIX}id").into();
    }
    format!("{OUTPUT_PREFIX}{}", key.to_lowercase()).into()
}

fn lookup<'t>(
    pairs: &[(&str, &str)],
    table: &'t CalibrationTable,
) -> Result<&'t CalibrationEntry, ConversionError> {
    let instance_id = value_of(pairs, INSTANCE_KEY).ok_or(ConversionError::OutOfDomain {
        conversion: Conversion::Chemsense,
        reason: "block carries no instance id",
    })?;

    table.get(instance_id).ok_or_else(|| {
        CalibrationLookupMiss {
            instance_id: instance_id.to_lowercase().into(),
        }
        .into()
    })
}

fn mean_temperature(pairs: &[(&str, &str)]) -> Option<f64> {
    let mut sum = 0.0;
    for key in TEMPERATURE_KEYS {
        sum += value_of(pairs, key)?.parse::<f64>().ok()?;
    }
    // four sensors reporting hundredths of a degree
    Some(sum / 400.0)
}

fn value_of<'a>(pairs: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(existing, _)| *existing == key)
        .map(|&(_, value)| value)
}

/// The board counts `SQN` in hex.
fn sequence(text: &str) -> Value {
    match i64::from_str_radix(text, 16) {
        Ok(v) => Value::Int(v),
        Err(_) => Value::Text(text.into()),
    }
}

fn number(text: &str) -> Value {
    if let Ok(v) = text.parse::<i64>() {
        return Value::Int(v);
    }
    match text.parse::<f64>() {
        Ok(v) => Value::Float(v),
        Err(_) => Value::Text(text.into()),
    }
}

struct Board<'t> {
    calibration: Result<&'t CalibrationEntry, ConversionError>,
    mean_temperature: Option<f64>,
}

impl Board<'_> {
    fn reading(&self, key: &str, value: &str) -> Reading {
        if key == INSTANCE_KEY {
            return Reading::Calibrated(Measurement::new(
                Value::Text(value.to_lowercase().into()),
                Unit::Unitless,
            ));
        }

        if key == SEQUENCE_KEY {
            return Reading::Raw(sequence(value));
        }

        if ENVIRONMENT_MARKERS.iter().any(|marker| key.contains(marker)) {
            return environment(key, value);
        }

        if COUNTER_MARKERS.iter().any(|marker| key.contains(marker)) {
            return match value.parse::<i64>() {
                Ok(count) => Reading::Raw(Value::Int(count)),
                Err(_) => Reading::Raw(Value::Text(value.into())),
            };
        }

        match GasChannel::from_key(key) {
            Some(channel) => self.gas(channel, value).unwrap_or_else(|error| {
                tracing::warn!(%channel, %error, "gas channel left uncalibrated");
                Reading::Raw(number(value))
            }),
            None => Reading::Raw(Value::Text(value.into())),
        }
    }

    fn gas(&self, channel: GasChannel, value: &str) -> Result<Reading, ConversionError> {
        let entry = self.calibration.as_ref().map_err(Clone::clone)?;
        let constants = entry.channel(channel);

        let mean_temperature = self.mean_temperature.ok_or(ConversionError::OutOfDomain {
            conversion: Conversion::Chemsense,
            reason: "AT0-AT3 temperatures missing",
        })?;
        let picoamps = value.parse::<f64>().map_err(|_| ConversionError::UnexpectedInput {
            conversion: Conversion::Chemsense,
            expected: "numeric current",
        })?;

        let drift = ((mean_temperature - T_ZERO) / constants.m_value).exp();
        let nanoamps = picoamps / 1000.0 - constants.baseline40 * drift;
        let ppm = nanoamps / constants.sensitivity;

        if !ppm.is_finite() {
            return Err(ConversionError::OutOfDomain {
                conversion: Conversion::Chemsense,
                reason: "concentration is not finite",
            });
        }

        Ok(Reading::Series(Box::new([
            Measurement::new(number(value), Unit::Raw),
            Measurement::float(round_to(ppm, 6), Unit::Ppm),
        ])))
    }
}

fn environment(key: &str, value: &str) -> Reading {
    let Ok(v) = value.parse::<f64>() else {
        return Reading::Raw(Value::Text(value.into()));
    };

    let unit = if key.contains('T') {
        Unit::Celsius
    } else if key.contains('P') {
        Unit::HectoPascal
    } else {
        Unit::RelativeHumidity
    };

    Reading::Series(Box::new([
        Measurement::float(v, Unit::Raw),
        Measurement::float(v / 100.0, unit),
    ]))
}
