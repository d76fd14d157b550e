//! Scanning of received messages into header collections.
//!
//! Uses quick-xml which never expands entities; DOCTYPE declarations are rejected outright.

use crate::addressing::AddressingValue;
use crate::buffer::{BufferedMessageData, HeaderBlock, HeaderCursor};
use crate::classify::classify;
use crate::collection::{HeaderCollection, HeaderEntry, Representation};
use crate::config::HeaderEngineConfig;
use crate::error::{xml_error, HeaderError, Result};
use crate::header::HeaderInfo;
use crate::version::{AddressingVersion, EnvelopeVersion, MessageVersion, ADDRESSING_NONE_NS};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::sync::Arc;
use tracing::debug;

impl HeaderCollection {
    /// Populate a collection with one scan over the header block of `buffer`.
    ///
    /// Each header is classified and recorded by position; only well-known
    /// addressing headers have their values read. Duplicate singleton headers
    /// fail the scan.
    pub fn from_buffered_message(
        version: MessageVersion,
        buffer: Arc<dyn BufferedMessageData>,
        config: &HeaderEngineConfig,
    ) -> Result<Self> {
        let mut headers = Self::with_config(version, config.materialize);
        if version.envelope == EnvelopeVersion::None {
            return Ok(headers);
        }

        let quotas = buffer.quotas();
        headers.buffer = Some(Arc::clone(&buffer));

        if let Some(mut block) = HeaderBlock::open(buffer.message_bytes(), version.envelope)? {
            let block_start = block.position();
            let mut slot = 0;
            while let Some((start, empty)) = block.next_element()? {
                let entry = block.with_cursor(start, empty, |cursor| scan_entry(cursor, slot, version))?;
                headers.check_unique(&entry, None)?;
                headers.entries.push(entry);
                slot += 1;

                let size = block.position() - block_start;
                if size > quotas.max_size_of_headers {
                    return Err(HeaderError::QuotaExceeded(format!(
                        "header block size exceeds maximum {} bytes",
                        quotas.max_size_of_headers
                    )));
                }
            }
        }

        if headers.entries.is_empty() {
            headers.buffer = None;
        }
        headers.mutation_count = 0;

        debug!(
            version = %version,
            headers = headers.entries.len(),
            well_known = headers.entries.iter().filter(|e| e.kind.is_well_known()).count(),
            must_understand = headers.entries.iter().filter(|e| e.info.must_understand).count(),
            "Scanned message headers"
        );

        Ok(headers)
    }
}

fn scan_entry(cursor: &mut HeaderCursor<'_>, slot: usize, version: MessageVersion) -> Result<HeaderEntry> {
    let info = HeaderInfo::from_cursor(cursor, version);
    if version.addressing == AddressingVersion::None && info.namespace == ADDRESSING_NONE_NS {
        return Err(HeaderError::VersionIncompatible(format!(
            "header '{}' uses namespace '{}' which cannot be read from a message",
            info.name, ADDRESSING_NONE_NS
        )));
    }

    let kind = classify(&info.name, &info.namespace, &info.actor, version)?;
    let addressing = AddressingValue::read(kind, cursor, version.addressing)?;
    Ok(HeaderEntry::new(
        kind,
        info,
        Representation::Buffered { slot },
        addressing,
    ))
}

/// Detect the envelope version from the root element of a message.
///
/// Messages whose root is not a SOAP envelope are reported as [`EnvelopeVersion::None`].
pub fn detect_envelope_version(data: &[u8]) -> Result<EnvelopeVersion> {
    let mut reader = NsReader::from_reader(data);
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => {
                let (result, local) = reader.resolve_element(e.name());
                if local.as_ref() != b"Envelope" {
                    return Ok(EnvelopeVersion::None);
                }
                let version = match result {
                    ResolveResult::Bound(ns) => {
                        EnvelopeVersion::from_namespace(&String::from_utf8_lossy(ns.as_ref()))
                    }
                    _ => None,
                };
                return Ok(version.unwrap_or(EnvelopeVersion::None));
            }
            Event::DocType(_) => {
                return Err(HeaderError::XmlParse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ))
            }
            Event::Eof => return Err(HeaderError::XmlParse("message is empty".to_string())),
            _ => {}
        }
    }
}
