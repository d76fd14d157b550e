//! SOAP envelope header collection engine for Zentinel
//!
//! Stores, classifies, lazily materializes, mutates and re-serializes the header
//! block of a SOAP message.
//!
//! # Features
//!
//! - One-pass scan of a received header block, recording positions instead of content
//! - WS-Addressing header classification with cardinality and version rules
//! - Lazy, one-way materialization of buffered headers with a skip budget
//! - Safe structural edits that never leave stale buffer positions behind
//! - MustUnderstand tracking and SOAP fault generation
//! - Zero-copy forwarding of unchanged headers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zentinel_soap_headers::{HeaderCollection, HeaderEngineConfig, MessageVersion, XmlBuffer};
//!
//! let buffer = Arc::new(XmlBuffer::new(message_bytes));
//! let mut headers = HeaderCollection::from_buffered_message(
//!     MessageVersion::SOAP12_WSA10,
//!     buffer,
//!     &HeaderEngineConfig::default(),
//! )?;
//! let action = headers.action()?;
//! headers.set_to(Some("http://backend/orders"))?;
//! let block = headers.header_block_string()?;
//! ```

pub mod addressing;
pub mod buffer;
pub mod classify;
pub mod collection;
pub mod config;
pub mod error;
pub mod header;
pub mod materialize;
pub mod parser;
pub mod report;
pub mod understood;
pub mod version;
pub mod write;

pub use addressing::{AddressingHeader, AddressingValue, EndpointAddress};
pub use buffer::{BufferedMessageData, CapturedHeader, HeaderCursor, SkipCounter, XmlBuffer};
pub use classify::{classify, HeaderKind};
pub use collection::{HeaderCollection, HeaderEntry, Representation};
pub use config::{HeaderEngineConfig, MaterializeConfig, ReaderQuotas};
pub use error::{must_understand_fault, HeaderError, Result};
pub use header::{HeaderId, HeaderInfo, MessageHeader, TextHeader, XmlWriter};
pub use parser::detect_envelope_version;
pub use report::HeaderReport;
pub use understood::HeaderProcessing;
pub use version::{AddressingVersion, EnvelopeVersion, MessageVersion, VersionPolicy};
