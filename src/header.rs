//! Header metadata, identities and the trait implemented by writable headers.

use crate::addressing::AddressingHeader;
use crate::buffer::HeaderCursor;
use crate::error::{write_error, Result};
use crate::materialize::capture_writable;
use crate::version::{EnvelopeVersion, MessageVersion};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Writer handed to [`MessageHeader`] implementations.
pub type XmlWriter<'w> = Writer<&'w mut dyn Write>;

/// Identity of a header entry.
///
/// Preserved when a header is copied into another collection, so understood
/// state can be tracked across copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HeaderId(u64);

static NEXT_HEADER_ID: AtomicU64 = AtomicU64::new(1);

impl HeaderId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HEADER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HeaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What is known about a header without reading its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderInfo {
    pub name: String,
    pub namespace: String,
    /// Targeted actor (SOAP 1.1) or role (SOAP 1.2), empty for the default
    pub actor: String,
    pub must_understand: bool,
    pub relay: bool,
    pub is_reference_parameter: bool,
}

impl HeaderInfo {
    pub fn from_header(header: &dyn MessageHeader) -> Self {
        Self {
            name: header.name().to_string(),
            namespace: header.namespace().to_string(),
            actor: header.actor().to_string(),
            must_understand: header.must_understand(),
            relay: header.relay(),
            is_reference_parameter: header.is_reference_parameter(),
        }
    }

    /// Read the header attributes at a cursor's start element.
    pub fn from_cursor(cursor: &HeaderCursor<'_>, version: MessageVersion) -> Self {
        let envelope_ns = version.envelope.namespace();
        let flag = |local: &str, ns: &str| cursor.attribute(local, ns).map(is_true).unwrap_or(false);

        Self {
            name: cursor.local_name().to_string(),
            namespace: cursor.namespace().to_string(),
            actor: cursor
                .attribute(version.envelope.actor_attribute(), envelope_ns)
                .unwrap_or_default()
                .to_string(),
            must_understand: flag("mustUnderstand", envelope_ns),
            relay: version.envelope == EnvelopeVersion::Soap12 && flag("relay", envelope_ns),
            is_reference_parameter: version.addressing.marks_reference_parameters()
                && flag("IsReferenceParameter", version.addressing.namespace()),
        }
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

/// A header that serializes itself.
pub trait MessageHeader: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn namespace(&self) -> &str;

    fn actor(&self) -> &str {
        ""
    }

    fn must_understand(&self) -> bool {
        false
    }

    fn relay(&self) -> bool {
        false
    }

    fn is_reference_parameter(&self) -> bool {
        false
    }

    fn is_message_version_supported(&self, _version: MessageVersion) -> bool {
        true
    }

    /// Namespace prefix used for the header element.
    fn prefix(&self) -> &str {
        "h"
    }

    /// The header's start tag, including the envelope attributes for `version`.
    fn start_element(&self, version: MessageVersion) -> BytesStart<'static> {
        standard_start_element(self, version)
    }

    /// Write everything between the start and end tags.
    fn write_header_contents(&self, writer: &mut XmlWriter<'_>, version: MessageVersion) -> Result<()>;

    /// Write the whole header element.
    fn write_header(&self, writer: &mut XmlWriter<'_>, version: MessageVersion) -> Result<()> {
        let start = self.start_element(version);
        writer
            .write_event(Event::Start(start.clone()))
            .map_err(write_error)?;
        self.write_header_contents(writer, version)?;
        writer
            .write_event(Event::End(start.to_end()))
            .map_err(write_error)
    }

    /// Downcast used by the typed addressing accessors.
    fn as_addressing(&self) -> Option<&AddressingHeader> {
        None
    }
}

/// Start tag carrying the namespace declaration and the envelope's header attributes.
pub(crate) fn standard_start_element<H: MessageHeader + ?Sized>(
    header: &H,
    version: MessageVersion,
) -> BytesStart<'static> {
    let prefix = header.prefix();
    let mut start = BytesStart::new(format!("{}:{}", prefix, header.name()));
    start.push_attribute((format!("xmlns:{}", prefix).as_str(), header.namespace()));

    let envelope = version.envelope;
    if envelope != EnvelopeVersion::None {
        let actor = header.actor();
        let relay = header.relay() && envelope == EnvelopeVersion::Soap12;
        if !actor.is_empty() || header.must_understand() || relay {
            start.push_attribute(("xmlns:s", envelope.namespace()));
        }
        if !actor.is_empty() {
            start.push_attribute((format!("s:{}", envelope.actor_attribute()).as_str(), actor));
        }
        if header.must_understand() {
            start.push_attribute(("s:mustUnderstand", "1"));
        }
        if relay {
            start.push_attribute(("s:relay", "1"));
        }
    }

    if header.is_reference_parameter() && version.addressing.marks_reference_parameters() {
        start.push_attribute(("xmlns:wsa", version.addressing.namespace()));
        start.push_attribute(("wsa:IsReferenceParameter", "true"));
    }

    start
}

/// A custom header with text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextHeader {
    name: String,
    namespace: String,
    value: String,
    actor: String,
    must_understand: bool,
    relay: bool,
}

impl TextHeader {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            value: value.into(),
            actor: String::new(),
            must_understand: false,
            relay: false,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_must_understand(mut self, must_understand: bool) -> Self {
        self.must_understand = must_understand;
        self
    }

    pub fn with_relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl MessageHeader for TextHeader {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn actor(&self) -> &str {
        &self.actor
    }

    fn must_understand(&self) -> bool {
        self.must_understand
    }

    fn relay(&self) -> bool {
        self.relay
    }

    fn write_header_contents(&self, writer: &mut XmlWriter<'_>, _version: MessageVersion) -> Result<()> {
        writer
            .write_event(Event::Text(BytesText::new(&self.value)))
            .map_err(write_error)
    }
}

/// Serialize a writable header into a standalone XML string.
pub fn header_to_string(header: &dyn MessageHeader, version: MessageVersion) -> Result<String> {
    capture_writable(header, version).map(|captured| captured.to_xml_string())
}
