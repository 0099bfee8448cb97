use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::calibration::{CalibrationStore, Reading, Value};
use crate::field::{FieldLengthError, decode_fields};
use crate::protocol::{FramingError, Packet, Subpacket, decode_packet};
use crate::spec::{SpecError, SpecRegistry, UnknownSensorError};

/// Why a subpacket was surfaced as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubpacketError {
    #[error(transparent)]
    UnknownSensor(#[from] UnknownSensorError),

    #[error(transparent)]
    FieldLength(#[from] FieldLengthError),
}

/// Calibrated output of one subpacket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReadings {
    pub sensor_id: u8,
    pub valid: bool,
    pub fields: Vec<(Box<str>, Reading)>,
    #[serde(skip)]
    pub error: Option<SubpacketError>,
}

impl SensorReadings {
    pub fn get(&self, name: &str) -> Option<&Reading> {
        self.fields
            .iter()
            .find(|(field, _)| &**field == name)
            .map(|(_, reading)| reading)
    }

    /// Raw output name used when a subpacket cannot be decoded.
    pub fn raw_field_name(sensor_id: u8) -> Box<str> {
        format!("sensor_{sensor_id}").into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub packet: Packet,
    pub sensors: Vec<SensorReadings>,
}

impl DecodedPacket {
    /// Every reading of the frame by field name. A name repeated by a
    /// later subpacket replaces the earlier one.
    pub fn readings(&self) -> BTreeMap<&str, &Reading> {
        self.sensors
            .iter()
            .flat_map(|sensor| sensor.fields.iter())
            .map(|(name, reading)| (&**name, reading))
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = (u8, &SubpacketError)> {
        self.sensors
            .iter()
            .filter_map(|sensor| sensor.error.as_ref().map(|e| (sensor.sensor_id, e)))
    }
}

/// Frame to calibrated readings.
///
/// Holds no per-frame state; a single decoder can be shared across
/// threads and used for any number of frames.
#[derive(Debug)]
pub struct Decoder {
    specs: Arc<SpecRegistry>,
    calibration: CalibrationStore,
}

impl Decoder {
    pub fn new(specs: Arc<SpecRegistry>, calibration: CalibrationStore) -> Self {
        Self { specs, calibration }
    }

    /// Decoder over the built-in sensor table and calibration sample.
    pub fn builtin() -> Result<Self, &'static SpecError> {
        let specs = SpecRegistry::builtin()?;
        Ok(Self::new(Arc::new(specs.clone()), CalibrationStore::default()))
    }

    pub fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    /// Validates `frame` and calibrates every subpacket in it.
    ///
    /// Only framing failures are returned; anything wrong inside a
    /// subpacket is recorded on that subpacket.
    pub fn decode(&self, frame: &[u8]) -> Result<DecodedPacket, FramingError> {
        let packet = decode_packet(frame)?;
        let sensors = packet
            .subpackets()
            .iter()
            .map(|subpacket| self.decode_subpacket(subpacket))
            .collect();

        Ok(DecodedPacket { packet, sensors })
    }

    pub fn decode_subpacket(&self, subpacket: &Subpacket) -> SensorReadings {
        let sensor_id = subpacket.sensor_id;

        let fields = self
            .specs
            .get(sensor_id)
            .map_err(SubpacketError::from)
            .and_then(|specs| decode_fields(&subpacket.raw, specs).map_err(SubpacketError::from));

        let fields = match fields {
            Ok(fields) => fields,
            Err(error) => {
                tracing::warn!(sensor_id, %error, "subpacket surfaced as raw bytes");
                return SensorReadings {
                    sensor_id,
                    valid: subpacket.valid,
                    fields: vec![(
                        SensorReadings::raw_field_name(sensor_id),
                        Reading::Raw(Value::Bytes(subpacket.raw.clone())),
                    )],
                    error: Some(error),
                };
            }
        };

        let mut readings = Vec::with_capacity(fields.len());
        for field in fields {
            let spec = field.spec;
            match spec.conversion.apply(&spec.name, &field.value, &self.calibration) {
                Ok(converted) => readings.extend(converted),
                Err(error) => {
                    tracing::warn!(
                        sensor_id,
                        field = %spec.name,
                        conversion = %spec.conversion,
                        %error,
                        "conversion failed, keeping raw value"
                    );
                    readings.push((spec.name.clone(), Reading::Raw((&field.value).into())));
                }
            }
        }

        SensorReadings {
            sensor_id,
            valid: subpacket.valid,
            fields: readings,
            error: None,
        }
    }
}
