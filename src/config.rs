//! Configuration types for the header engine.

use crate::error::{HeaderError, Result};
use crate::version::MessageVersion;
use serde::{Deserialize, Serialize};

/// Main configuration for the header engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderEngineConfig {
    /// Config version
    pub version: String,

    /// Envelope and addressing versions collections are bound to
    pub message_version: MessageVersion,

    /// Limits applied to buffered XML
    pub quotas: ReaderQuotas,

    /// Lazy materialization budget
    pub materialize: MaterializeConfig,
}

impl Default for HeaderEngineConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            message_version: MessageVersion::default(),
            quotas: ReaderQuotas::default(),
            materialize: MaterializeConfig::default(),
        }
    }
}

impl HeaderEngineConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| HeaderError::Config(e.to_string()))
    }
}

/// Reader quotas for buffered XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderQuotas {
    /// Maximum size of the whole header block (bytes)
    pub max_size_of_headers: usize,

    /// Maximum element depth inside a captured header
    pub max_depth: usize,

    /// Maximum length of a single text node (bytes)
    pub max_string_content_length: usize,
}

impl Default for ReaderQuotas {
    fn default() -> Self {
        Self {
            max_size_of_headers: 65_536, // 64KB
            max_depth: 32,
            max_string_content_length: 8_192,
        }
    }
}

impl ReaderQuotas {
    /// Quotas that never trigger.
    pub fn unbounded() -> Self {
        Self {
            max_size_of_headers: usize::MAX,
            max_depth: usize::MAX,
            max_string_content_length: usize::MAX,
        }
    }
}

/// Ceilings on the work spent re-positioning cursors over the shared buffer.
///
/// Once either ceiling is crossed the next buffered lookup captures every
/// remaining buffered header in one pass and releases the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeConfig {
    /// Maximum cumulative element nodes skipped
    pub max_buffered_header_nodes: usize,

    /// Maximum cumulative attributes skipped
    pub max_buffered_header_attributes: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            max_buffered_header_nodes: 4096,
            max_buffered_header_attributes: 2048,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{AddressingVersion, EnvelopeVersion};

    #[test]
    fn test_default_config() {
        let config = HeaderEngineConfig::default();
        assert_eq!(config.message_version, MessageVersion::SOAP12_WSA10);
        assert_eq!(config.quotas.max_size_of_headers, 65_536);
        assert_eq!(config.materialize.max_buffered_header_nodes, 4096);
        assert_eq!(config.materialize.max_buffered_header_attributes, 2048);
    }

    #[test]
    fn test_config_serialization() {
        let config = HeaderEngineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = HeaderEngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.quotas, config.quotas);
        assert_eq!(parsed.message_version, config.message_version);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
message_version:
  envelope: "1.1"
  addressing: "2004"
quotas:
  max_depth: 8
materialize:
  max_buffered_header_nodes: 16
"#;
        let config = HeaderEngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.message_version.envelope, EnvelopeVersion::Soap11);
        assert_eq!(config.message_version.addressing, AddressingVersion::August2004);
        assert_eq!(config.quotas.max_depth, 8);
        assert_eq!(config.quotas.max_string_content_length, 8_192);
        assert_eq!(config.materialize.max_buffered_header_nodes, 16);
        assert_eq!(config.materialize.max_buffered_header_attributes, 2048);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = HeaderEngineConfig::from_yaml("message_version:\n  envelope: \"3.0\"\n");
        assert!(matches!(result, Err(HeaderError::Config(_))));
    }
}
