use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::eyre;
use sensorlink_core::{CalibrationSource, CalibrationStore, Decoder, SpecRegistry};
use serde::Deserialize;

const NODE_ID_WIDTH: usize = 16;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    pub publish: PublishConfig,
    pub edge: EdgeConfig,
}

#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// Node identifier stamped on every published batch
    pub id: String,
}

impl NodeConfig {
    /// The id left-padded with `0` to sixteen characters.
    pub fn padded_id(&self) -> String {
        format!("{:0>width$}", self.id, width = NODE_ID_WIDTH)
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecoderConfig {
    /// Sensor table to use instead of the built-in one
    pub spec_path: Option<PathBuf>,
    /// Chemical sensor calibration table to use instead of the built-in sample
    pub calibration_path: Option<PathBuf>,
}

impl DecoderConfig {
    pub fn build(&self) -> color_eyre::Result<Decoder> {
        let specs = match &self.spec_path {
            Some(path) => SpecRegistry::from_path(path)?,
            None => SpecRegistry::builtin()
                .map_err(|e| eyre!("built-in sensor table is invalid: {e}"))?
                .clone(),
        };

        let calibration = match &self.calibration_path {
            Some(path) => CalibrationSource::File(path.clone()),
            None => CalibrationSource::Builtin,
        };

        Ok(Decoder::new(Arc::new(specs), CalibrationStore::new(calibration)))
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishConfig {
    /// Interval in seconds between publish attempts
    pub interval_secs: u64,
    /// Most measurements handed to the sink in one batch
    pub max_batch: usize,
    pub sink: SinkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Stdout,
    Memory,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EdgeConfig {
    Mock {
        /// Interval in milliseconds between frames from each board
        frame_interval_millis: u64,
        /// Number of simulated boards
        board_count: usize,
    },
    Tcp {
        addr: SocketAddr,
    },
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                id: "1".to_string(),
            },
            server: ServerConfig {
                http_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            },
            decoder: DecoderConfig::default(),
            publish: PublishConfig {
                interval_secs: 10,
                max_batch: 512,
                sink: SinkConfig::Stdout,
            },
            edge: EdgeConfig::Mock {
                frame_interval_millis: 1000,
                board_count: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [node]
        id = "0001e06107d5"

        [server]
        http_addr = "127.0.0.1:8090"

        [decoder]
        spec_path = "/etc/sensorlink/sensors.toml"

        [publish]
        interval_secs = 30
        max_batch = 100
        sink = { type = "memory" }

        [edge]
        type = "tcp"
        addr = "0.0.0.0:7000"
    "#;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.node.padded_id(), "00000001e06107d5");
        assert_eq!(config.server.http_addr.port(), 8090);
        assert_eq!(
            config.decoder.spec_path.as_deref(),
            Some(Path::new("/etc/sensorlink/sensors.toml"))
        );
        assert!(config.decoder.calibration_path.is_none());
        assert_eq!(config.publish.max_batch, 100);
        assert!(matches!(config.publish.sink, SinkConfig::Memory));
        assert!(matches!(config.edge, EdgeConfig::Tcp { addr } if addr.port() == 7000));
    }

    #[test]
    fn decoder_section_is_optional() {
        let source = SAMPLE.replace("[decoder]", "").replace(
            "spec_path = \"/etc/sensorlink/sensors.toml\"",
            "",
        );
        let config: Config = toml::from_str(&source).unwrap();

        assert!(config.decoder.spec_path.is_none());
    }

    #[test]
    fn long_ids_are_not_truncated() {
        let node = NodeConfig {
            id: "0123456789abcdef01".into(),
        };
        assert_eq!(node.padded_id(), "0123456789abcdef01");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.publish.interval_secs, 30);
    }

    #[test]
    fn builds_decoder_from_files() {
        let mut spec = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            spec,
            r#"
            [[sensor]]
            id = 3
            params = [{{ name = "rain", length = 2, format = "uint", conversion = "onset_rain" }}]
            "#
        )
        .unwrap();

        let decoder = DecoderConfig {
            spec_path: Some(spec.path().to_path_buf()),
            calibration_path: None,
        }
        .build()
        .unwrap();

        assert_eq!(decoder.specs().len(), 1);
        assert_eq!(decoder.calibration().source(), &CalibrationSource::Builtin);
    }

    #[test]
    fn default_decoder_uses_builtin_tables() {
        let decoder = DecoderConfig::default().build().unwrap();
        assert!(decoder.specs().sensor(0x2A).is_some());
    }
}
