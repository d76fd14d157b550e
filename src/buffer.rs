//! Backing message buffers, header cursors and standalone captures.
//!
//! A buffered header is never parsed up front. It is located on demand by opening a
//! fresh reader over the shared message bytes, stepping into `Envelope/Header` and
//! skipping the sibling elements that precede it. Captures copy one header into a
//! private buffer, carrying the namespace declarations inherited from its ancestors
//! so the copy reads the same without the envelope around it.

use crate::config::ReaderQuotas;
use crate::error::{write_error, xml_error, HeaderError, Result};
use crate::version::EnvelopeVersion;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::{NsReader, Writer};
use std::io::Write;

/// Access to the raw bytes of a received message.
///
/// Implemented by whatever owns the message on the transport side. The header
/// collection only ever reads through this trait and drops its reference once no
/// entry points into the buffer.
pub trait BufferedMessageData: Send + Sync {
    /// The complete envelope, starting at (or before) the `Envelope` element.
    fn message_bytes(&self) -> &[u8];

    /// Quotas applied when headers are captured out of the buffer.
    fn quotas(&self) -> ReaderQuotas;
}

/// An owned message buffer.
#[derive(Debug, Clone)]
pub struct XmlBuffer {
    bytes: Vec<u8>,
    quotas: ReaderQuotas,
}

impl XmlBuffer {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_quotas(bytes, ReaderQuotas::default())
    }

    pub fn with_quotas(bytes: impl Into<Vec<u8>>, quotas: ReaderQuotas) -> Self {
        Self {
            bytes: bytes.into(),
            quotas,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl BufferedMessageData for XmlBuffer {
    fn message_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn quotas(&self) -> ReaderQuotas {
        self.quotas
    }
}

/// An `xmlns` declaration in scope for a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    /// `None` for the default namespace
    pub prefix: Option<String>,
    pub uri: String,
}

/// A resolved attribute of a header's start element. Namespace declarations are not included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderAttribute {
    /// Namespace URI, empty for unqualified attributes
    pub namespace: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

/// Nodes and attributes stepped over while positioning cursors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounter {
    pub nodes: usize,
    pub attributes: usize,
}

impl SkipCounter {
    fn visit(&mut self, start: &BytesStart<'_>) {
        self.nodes += 1;
        self.attributes += start.attributes().count();
    }
}

/// A header serialized into its own buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedHeader {
    xml: Vec<u8>,
}

impl CapturedHeader {
    pub(crate) fn from_bytes(xml: Vec<u8>) -> Self {
        Self { xml }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.xml
    }

    pub fn to_xml_string(&self) -> String {
        String::from_utf8_lossy(&self.xml).into_owned()
    }

    /// Open a cursor at the captured header element.
    pub fn cursor(&self) -> Result<HeaderCursor<'_>> {
        let input = self.xml.as_slice();
        let mut reader = NsReader::from_reader(input);
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => return Ok(HeaderCursor::new(reader, input, e, false, &[])),
                Event::Empty(e) => return Ok(HeaderCursor::new(reader, input, e, true, &[])),
                Event::Eof => {
                    return Err(HeaderError::XmlParse(
                        "captured header contains no element".to_string(),
                    ))
                }
                _ => {}
            }
        }
    }
}

/// Reader positioned inside a message's `Header` element.
pub(crate) struct HeaderBlock<'a> {
    reader: NsReader<&'a [u8]>,
    input: &'a [u8],
    bindings: Vec<NamespaceBinding>,
}

impl<'a> HeaderBlock<'a> {
    /// Step into `Envelope/Header`. Returns `None` when the message has no header block.
    pub(crate) fn open(input: &'a [u8], envelope: EnvelopeVersion) -> Result<Option<Self>> {
        let mut reader = NsReader::from_reader(input);
        let mut bindings = Vec::new();

        let envelope_start = loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => break e,
                Event::DocType(_) => return Err(doctype_error()),
                Event::Empty(_) | Event::Eof => {
                    return Err(HeaderError::XmlParse(
                        "message contains no envelope content".to_string(),
                    ))
                }
                _ => {}
            }
        };

        let (ns, local) = resolve_element(&reader, envelope_start.name());
        if local != "Envelope" || ns != envelope.namespace() {
            return Err(HeaderError::XmlParse(format!(
                "expected Envelope in namespace '{}', found '{}' in namespace '{}'",
                envelope.namespace(),
                local,
                ns
            )));
        }
        collect_bindings(&envelope_start, &mut bindings);

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => {
                    let (ns, local) = resolve_element(&reader, e.name());
                    if local == "Header" && ns == envelope.namespace() {
                        collect_bindings(&e, &mut bindings);
                        return Ok(Some(Self {
                            reader,
                            input,
                            bindings,
                        }));
                    }
                    return Ok(None);
                }
                Event::DocType(_) => return Err(doctype_error()),
                Event::Empty(_) | Event::End(_) | Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Byte offset of the reader inside the message.
    pub(crate) fn position(&self) -> usize {
        self.reader.buffer_position() as usize
    }

    /// Advance to the next header element, or `None` at the end of the header block.
    pub(crate) fn next_element(&mut self) -> Result<Option<(BytesStart<'a>, bool)>> {
        loop {
            match self.reader.read_event().map_err(xml_error)? {
                Event::Start(e) => return Ok(Some((e, false))),
                Event::Empty(e) => return Ok(Some((e, true))),
                Event::End(_) | Event::Eof => return Ok(None),
                Event::Text(t) if !t.iter().all(u8::is_ascii_whitespace) => {
                    return Err(HeaderError::XmlParse(
                        "unexpected text between header elements".to_string(),
                    ))
                }
                Event::DocType(_) => return Err(doctype_error()),
                _ => {}
            }
        }
    }

    /// Skip the element just returned by `next_element`, counting what was stepped over.
    pub(crate) fn skip_element(
        &mut self,
        start: &BytesStart<'a>,
        empty: bool,
        counter: &mut SkipCounter,
    ) -> Result<()> {
        counter.visit(start);
        if empty {
            return Ok(());
        }

        let mut depth = 1usize;
        while depth > 0 {
            match self.reader.read_event().map_err(xml_error)? {
                Event::Start(e) => {
                    depth += 1;
                    counter.visit(&e);
                }
                Event::Empty(e) => counter.visit(&e),
                Event::End(_) => {
                    depth -= 1;
                    counter.nodes += 1;
                }
                Event::Eof => return Err(unexpected_eof()),
                _ => counter.nodes += 1,
            }
        }
        Ok(())
    }

    /// Run `f` with a cursor over the element just returned by `next_element`.
    /// Whatever `f` leaves unread is skipped, so the block is positioned after the element.
    pub(crate) fn with_cursor<T>(
        &mut self,
        start: BytesStart<'a>,
        empty: bool,
        f: impl FnOnce(&mut HeaderCursor<'a>) -> Result<T>,
    ) -> Result<T> {
        let detached: &'a [u8] = &[];
        let reader = std::mem::replace(&mut self.reader, NsReader::from_reader(detached));
        let mut cursor = HeaderCursor::new(reader, self.input, start, empty, &self.bindings);
        let result = f(&mut cursor).and_then(|value| cursor.skip_to_end().map(|_| value));
        self.reader = cursor.into_reader();
        result
    }

    /// Turn the block into a cursor over the element just returned by `next_element`.
    pub(crate) fn into_cursor(self, start: BytesStart<'a>, empty: bool) -> HeaderCursor<'a> {
        HeaderCursor::new(self.reader, self.input, start, empty, &self.bindings)
    }
}

/// A read-only cursor over one header element.
///
/// The cursor borrows the buffer it reads from; dropping it releases the buffer.
pub struct HeaderCursor<'a> {
    reader: NsReader<&'a [u8]>,
    input: &'a [u8],
    start: BytesStart<'a>,
    local_name: String,
    namespace: String,
    attributes: Vec<HeaderAttribute>,
    inherited: Vec<NamespaceBinding>,
    empty: bool,
    depth: usize,
}

impl<'a> HeaderCursor<'a> {
    fn new(
        reader: NsReader<&'a [u8]>,
        input: &'a [u8],
        start: BytesStart<'a>,
        empty: bool,
        ancestors: &[NamespaceBinding],
    ) -> Self {
        let (namespace, local_name) = resolve_element(&reader, start.name());

        let mut declared: Vec<Option<String>> = Vec::new();
        let mut attributes = Vec::new();
        for attr in start.attributes().flatten() {
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                declared.push(None);
                continue;
            }
            if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                declared.push(Some(String::from_utf8_lossy(prefix).into_owned()));
                continue;
            }

            let (result, local) = reader.resolve_attribute(attr.key);
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attributes.push(HeaderAttribute {
                namespace: namespace_of(result),
                local_name: String::from_utf8_lossy(local.as_ref()).into_owned(),
                qualified_name: String::from_utf8_lossy(key).into_owned(),
                value,
            });
        }

        let mut inherited: Vec<NamespaceBinding> = Vec::new();
        for binding in ancestors {
            inherited.retain(|b| b.prefix != binding.prefix);
            inherited.push(binding.clone());
        }
        inherited.retain(|b| !declared.contains(&b.prefix));

        Self {
            reader,
            input,
            start,
            local_name,
            namespace,
            attributes,
            inherited,
            empty,
            depth: if empty { 0 } else { 1 },
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Namespace URI of the header element, empty when unqualified.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn qualified_name(&self) -> String {
        String::from_utf8_lossy(self.start.name().as_ref()).into_owned()
    }

    pub fn is_empty_element(&self) -> bool {
        self.empty
    }

    pub fn attributes(&self) -> &[HeaderAttribute] {
        &self.attributes
    }

    /// Value of the attribute `local_name` in `namespace` (empty for unqualified).
    pub fn attribute(&self, local_name: &str, namespace: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name && a.namespace == namespace)
            .map(|a| a.value.as_str())
    }

    /// Resolve an element name read from this cursor. Valid right after the event was returned.
    pub fn resolve(&self, name: QName<'_>) -> (String, String) {
        resolve_element(&self.reader, name)
    }

    /// Next event inside the header, or `None` once the header's end tag is consumed.
    pub fn next_event(&mut self) -> Result<Option<Event<'a>>> {
        if self.depth == 0 {
            return Ok(None);
        }

        let event = self.reader.read_event().map_err(xml_error)?;
        match &event {
            Event::Start(_) => self.depth += 1,
            Event::End(_) => {
                self.depth -= 1;
                if self.depth == 0 {
                    return Ok(None);
                }
            }
            Event::Eof => return Err(unexpected_eof()),
            _ => {}
        }
        Ok(Some(event))
    }

    /// Read the text content of the innermost open element and consume its end tag.
    ///
    /// Called right after opening the cursor this reads the header's own content;
    /// called after `next_event` returned a start tag it reads that child.
    pub fn read_text(&mut self) -> Result<String> {
        if self.depth == 0 {
            return Ok(String::new());
        }

        let mut text = String::new();
        loop {
            match self.reader.read_event().map_err(xml_error)? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(xml_error)?),
                Event::CData(c) => text.push_str(std::str::from_utf8(&c).map_err(xml_error)?),
                Event::Start(e) | Event::Empty(e) => {
                    return Err(HeaderError::XmlParse(format!(
                        "unexpected element '{}' in text content",
                        String::from_utf8_lossy(e.name().as_ref())
                    )))
                }
                Event::End(_) => {
                    self.depth -= 1;
                    break;
                }
                Event::Eof => return Err(unexpected_eof()),
                _ => {}
            }
        }
        Ok(text.trim().to_string())
    }

    /// Raw markup between `start` (just returned by `next_event`) and its end tag.
    pub fn read_inner_xml(&mut self, start: &BytesStart<'_>) -> Result<String> {
        let span = self.reader.read_to_end(start.name()).map_err(xml_error)?;
        self.depth -= 1;
        let range = span.start as usize..span.end as usize;
        std::str::from_utf8(&self.input[range])
            .map(|s| s.trim().to_string())
            .map_err(xml_error)
    }

    /// Skip the child element `start` just returned by `next_event`.
    pub fn skip_child(&mut self, start: &BytesStart<'_>) -> Result<()> {
        self.reader.read_to_end(start.name()).map_err(xml_error)?;
        self.depth -= 1;
        Ok(())
    }

    /// Consume everything up to and including the header's end tag.
    pub fn skip_to_end(&mut self) -> Result<()> {
        while self.next_event()?.is_some() {}
        Ok(())
    }

    /// The header's start tag, carrying the namespace declarations it inherits.
    pub fn start_element(&self) -> BytesStart<'static> {
        let mut start = self.start.clone().into_owned();
        for binding in &self.inherited {
            let key = match &binding.prefix {
                Some(prefix) => format!("xmlns:{}", prefix),
                None => "xmlns".to_string(),
            };
            start.push_attribute((key.as_str(), binding.uri.as_str()));
        }
        start
    }

    /// Copy the remaining content of the header, up to but excluding its end tag.
    pub fn write_contents<W: Write>(
        &mut self,
        writer: &mut Writer<W>,
        quotas: Option<&ReaderQuotas>,
    ) -> Result<()> {
        let mut depth = 1usize;
        while let Some(event) = self.next_event()? {
            if let Some(quotas) = quotas {
                match &event {
                    Event::Start(_) => {
                        depth += 1;
                        check_depth(depth, quotas)?;
                    }
                    Event::Empty(_) => check_depth(depth + 1, quotas)?,
                    Event::End(_) => depth -= 1,
                    Event::Text(t) if t.len() > quotas.max_string_content_length => {
                        return Err(HeaderError::QuotaExceeded(format!(
                            "string content length {} exceeds maximum {}",
                            t.len(),
                            quotas.max_string_content_length
                        )))
                    }
                    _ => {}
                }
            }
            writer.write_event(event).map_err(write_error)?;
        }
        Ok(())
    }

    /// Copy the whole header element.
    pub fn write_element<W: Write>(
        &mut self,
        writer: &mut Writer<W>,
        quotas: Option<&ReaderQuotas>,
    ) -> Result<()> {
        let start = self.start_element();
        if self.empty {
            return writer.write_event(Event::Empty(start)).map_err(write_error);
        }

        writer
            .write_event(Event::Start(start.clone()))
            .map_err(write_error)?;
        self.write_contents(writer, quotas)?;
        writer
            .write_event(Event::End(start.to_end()))
            .map_err(write_error)
    }

    /// Capture the header into a standalone buffer. The cursor must be unread.
    pub fn capture(&mut self, quotas: Option<&ReaderQuotas>) -> Result<CapturedHeader> {
        let mut writer = Writer::new(Vec::new());
        self.write_element(&mut writer, quotas)?;
        Ok(CapturedHeader::from_bytes(writer.into_inner()))
    }

    fn into_reader(self) -> NsReader<&'a [u8]> {
        self.reader
    }
}

fn check_depth(depth: usize, quotas: &ReaderQuotas) -> Result<()> {
    if depth > quotas.max_depth {
        return Err(HeaderError::QuotaExceeded(format!(
            "element depth {} exceeds maximum {}",
            depth, quotas.max_depth
        )));
    }
    Ok(())
}

fn collect_bindings(start: &BytesStart<'_>, into: &mut Vec<NamespaceBinding>) {
    for attr in start.attributes().flatten() {
        let key = attr.key.as_ref();
        let prefix = if key == b"xmlns" {
            None
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            Some(String::from_utf8_lossy(prefix).into_owned())
        } else {
            continue;
        };
        let uri = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        into.retain(|b| b.prefix != prefix);
        into.push(NamespaceBinding { prefix, uri });
    }
}

fn resolve_element(reader: &NsReader<&[u8]>, name: QName<'_>) -> (String, String) {
    let (result, local) = reader.resolve_element(name);
    (
        namespace_of(result),
        String::from_utf8_lossy(local.as_ref()).into_owned(),
    )
}

fn namespace_of(result: ResolveResult<'_>) -> String {
    match result {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        _ => String::new(),
    }
}

fn doctype_error() -> HeaderError {
    HeaderError::XmlParse("DOCTYPE declarations are not allowed".to_string())
}

fn unexpected_eof() -> HeaderError {
    HeaderError::XmlParse("unexpected end of input inside header".to_string())
}
