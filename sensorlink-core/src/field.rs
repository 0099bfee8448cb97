use crate::spec::{Format, ParamSpec};

/// Declared field lengths run past the subpacket's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}` needs bytes {offset}..{end}, subpacket carries {available}")]
pub struct FieldLengthError {
    pub field: Box<str>,
    pub offset: usize,
    pub end: usize,
    pub available: usize,
}

/// A field value before calibration.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Unsigned(u64),
    Signed(i64),
    Fixed(f64),
    Bytes(Box<[u8]>),
}

impl RawValue {
    /// Integer view of a numeric value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Unsigned(v) => i64::try_from(*v).ok(),
            RawValue::Signed(v) => Some(*v),
            RawValue::Fixed(_) | RawValue::Bytes(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Unsigned(v) => Some(*v as f64),
            RawValue::Signed(v) => Some(*v as f64),
            RawValue::Fixed(v) => Some(*v),
            RawValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RawValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// One sliced and interpreted field, still tied to its declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField<'a> {
    pub spec: &'a ParamSpec,
    pub value: RawValue,
}

/// Slices `raw` into the declared fields, in declaration order.
///
/// Bytes past the last declared field are left alone.
pub fn decode_fields<'a>(
    raw: &[u8],
    specs: &'a [ParamSpec],
) -> Result<Vec<RawField<'a>>, FieldLengthError> {
    let mut fields = Vec::with_capacity(specs.len());
    let mut offset = 0;

    for spec in specs {
        let end = if spec.is_open_ended() {
            raw.len().max(offset)
        } else {
            offset + spec.length
        };

        if end > raw.len() {
            return Err(FieldLengthError {
                field: spec.name.clone(),
                offset,
                end,
                available: raw.len(),
            });
        }

        fields.push(RawField {
            spec,
            value: interpret(&raw[offset..end], spec.format),
        });

        offset = end;
    }

    if offset < raw.len() {
        tracing::debug!(
            trailing = raw.len() - offset,
            "raw bytes past the last declared field ignored"
        );
    }

    Ok(fields)
}

fn interpret(bytes: &[u8], format: Format) -> RawValue {
    match format {
        Format::Uint => RawValue::Unsigned(unsigned_be(bytes)),
        Format::Int => RawValue::Signed(sign_extend(unsigned_be(bytes), bytes.len())),
        Format::UintLe => RawValue::Unsigned(unsigned_le(bytes)),
        Format::IntLe => RawValue::Signed(sign_extend(unsigned_le(bytes), bytes.len())),
        Format::Fixed => {
            let whole = sign_extend(unsigned_be(bytes), bytes.len());
            RawValue::Fixed(whole as f64 / 256.0)
        }
        Format::Bytes => RawValue::Bytes(bytes.into()),
    }
}

fn unsigned_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | b as u64)
}

fn unsigned_le(bytes: &[u8]) -> u64 {
    bytes.iter().rev().fold(0, |acc, &b| (acc << 8) | b as u64)
}

fn sign_extend(value: u64, width: usize) -> i64 {
    let bits = (width * 8) as u32;
    if bits == 0 || bits >= 64 {
        return value as i64;
    }

    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}
