use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::GasChannel;

const BUILTIN_TABLE: &str = include_str!("../../assets/chemsense_calibration.csv");

const FIELD_SEPARATOR: char = ';';
const MIN_ROW_FIELDS: usize = 43;
const SENSITIVITY_FROM_END: usize = 42;
const BASELINE_FROM_END: usize = 21;
const M_VALUE_FROM_END: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("failed to read calibration table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected at least {min} fields, found {found}")]
    ShortRow {
        line: usize,
        found: usize,
        min: usize,
    },

    #[error("line {line}: {channel} {constant} `{value}` is not a number")]
    InvalidNumber {
        line: usize,
        channel: GasChannel,
        constant: &'static str,
        value: Box<str>,
    },
}

/// Per-channel calibration constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConstants {
    /// Sensitivity, nA per ppm.
    pub sensitivity: f64,
    /// Zero current at 40 C, nA.
    pub baseline40: f64,
    /// Temperature coefficient of the baseline.
    pub m_value: f64,
}

/// Constants for every gas channel of one chemical sensor instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEntry {
    channels: [ChannelConstants; GasChannel::ALL.len()],
}

impl CalibrationEntry {
    pub fn new(channels: [ChannelConstants; GasChannel::ALL.len()]) -> Self {
        Self { channels }
    }

    pub fn channel(&self, channel: GasChannel) -> &ChannelConstants {
        &self.channels[channel as usize]
    }
}

/// Calibration constants keyed by lowercase instance id.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    entries: HashMap<Box<str>, CalibrationEntry>,
}

impl CalibrationTable {
    pub fn parse(source: &str) -> Result<Self, CalibrationError> {
        let mut entries = HashMap::new();

        for (index, row) in source.lines().enumerate() {
            let row = row.trim();
            if row.is_empty() || row.starts_with('#') {
                continue;
            }

            let line = index + 1;
            let fields: Vec<&str> = row.split(FIELD_SEPARATOR).map(str::trim).collect();
            if fields.len() < MIN_ROW_FIELDS {
                return Err(CalibrationError::ShortRow {
                    line,
                    found: fields.len(),
                    min: MIN_ROW_FIELDS,
                });
            }

            let from_end = |offset: usize, channel: GasChannel, constant: &'static str| {
                let value = fields[fields.len() - offset + channel as usize];
                value
                    .parse::<f64>()
                    .map_err(|_| CalibrationError::InvalidNumber {
                        line,
                        channel,
                        constant,
                        value: value.into(),
                    })
            };

            let mut channels = [ChannelConstants {
                sensitivity: 0.0,
                baseline40: 0.0,
                m_value: 0.0,
            }; GasChannel::ALL.len()];

            for channel in GasChannel::ALL {
                channels[channel as usize] = ChannelConstants {
                    sensitivity: from_end(SENSITIVITY_FROM_END, channel, "sensitivity")?,
                    baseline40: from_end(BASELINE_FROM_END, channel, "baseline40")?,
                    m_value: from_end(M_VALUE_FROM_END, channel, "m_value")?,
                };
            }

            let instance_id = fields[1].to_lowercase().into_boxed_str();
            if entries
                .insert(instance_id.clone(), CalibrationEntry::new(channels))
                .is_some()
            {
                tracing::debug!(%instance_id, line, "calibration row replaces an earlier one");
            }
        }

        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self, CalibrationError> {
        let source = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&source)
    }

    /// Looks up an instance id, case-insensitively.
    pub fn get(&self, instance_id: &str) -> Option<&CalibrationEntry> {
        self.entries.get(instance_id.to_lowercase().as_str())
    }

    pub fn insert(&mut self, instance_id: &str, entry: CalibrationEntry) {
        self.entries
            .insert(instance_id.to_lowercase().into_boxed_str(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the calibration table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationSource {
    /// The sample table bundled with this crate.
    Builtin,
    File(PathBuf),
    Text(Box<str>),
    /// No constants; every gas channel reports raw.
    Empty,
}

impl CalibrationSource {
    fn load(&self) -> Result<CalibrationTable, CalibrationError> {
        match self {
            CalibrationSource::Builtin => CalibrationTable::parse(BUILTIN_TABLE),
            CalibrationSource::File(path) => CalibrationTable::from_path(path),
            CalibrationSource::Text(text) => CalibrationTable::parse(text),
            CalibrationSource::Empty => Ok(CalibrationTable::default()),
        }
    }
}

/// Calibration table loaded on first use.
///
/// A table that fails to load is logged once and replaced by an empty
/// one, so gas channels degrade to raw instead of failing decodes.
#[derive(Debug)]
pub struct CalibrationStore {
    source: CalibrationSource,
    table: OnceLock<CalibrationTable>,
}

impl CalibrationStore {
    pub fn new(source: CalibrationSource) -> Self {
        Self {
            source,
            table: OnceLock::new(),
        }
    }

    /// Wraps an already built table.
    pub fn with_table(table: CalibrationTable) -> Self {
        Self {
            source: CalibrationSource::Empty,
            table: OnceLock::from(table),
        }
    }

    pub fn source(&self) -> &CalibrationSource {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn table(&self) -> &CalibrationTable {
        self.table.get_or_init(|| match self.source.load() {
            Ok(table) => {
                tracing::debug!(instances = table.len(), "calibration table loaded");
                table
            }
            Err(error) => {
                tracing::error!(%error, source = ?self.source, "calibration table unavailable");
                CalibrationTable::default()
            }
        })
    }
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new(CalibrationSource::Builtin)
    }
}
