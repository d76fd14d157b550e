//! Outbound serialization of headers.
//!
//! Writable headers serialize themselves without being captured. Buffered headers
//! are copied event by event from the shared buffer.

use crate::buffer::{HeaderBlock, SkipCounter};
use crate::collection::{HeaderCollection, Representation};
use crate::error::{write_error, HeaderError, Result};
use crate::header::XmlWriter;
use crate::version::EnvelopeVersion;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Write;

impl HeaderCollection {
    /// Write the start tag of the header at `index`.
    pub fn write_start_header<W: Write>(&mut self, index: usize, out: &mut W) -> Result<()> {
        self.check_index(index)?;
        let mut writer: XmlWriter<'_> = Writer::new(out as &mut dyn Write);

        let start = match &self.entries[index].repr {
            Representation::Writable(header) => header.start_element(self.version),
            _ => self.reader_at(index)?.start_element(),
        };
        writer.write_event(Event::Start(start)).map_err(write_error)
    }

    /// Write the content of the header at `index`, without its start and end tags.
    pub fn write_header_contents<W: Write>(&mut self, index: usize, out: &mut W) -> Result<()> {
        self.check_index(index)?;
        let mut writer: XmlWriter<'_> = Writer::new(out as &mut dyn Write);

        if let Representation::Writable(header) = &self.entries[index].repr {
            return header.write_header_contents(&mut writer, self.version);
        }
        let mut cursor = self.reader_at(index)?;
        cursor.write_contents(&mut writer, None)
    }

    /// Write the header element at `index`.
    pub fn write_header<W: Write>(&mut self, index: usize, out: &mut W) -> Result<()> {
        self.check_index(index)?;
        let mut writer: XmlWriter<'_> = Writer::new(out as &mut dyn Write);

        if let Representation::Writable(header) = &self.entries[index].repr {
            return header.write_header(&mut writer, self.version);
        }
        let mut cursor = self.reader_at(index)?;
        cursor.write_element(&mut writer, None)
    }

    /// Write the whole `Header` element in one pass over the shared buffer.
    ///
    /// Nothing is written for an empty collection or a message without envelope.
    pub fn write_header_block<W: Write>(&self, out: &mut W) -> Result<()> {
        let envelope = self.version.envelope;
        if envelope == EnvelopeVersion::None || self.entries.is_empty() {
            return Ok(());
        }

        let mut writer: XmlWriter<'_> = Writer::new(out as &mut dyn Write);
        let mut start = BytesStart::new("s:Header");
        start.push_attribute(("xmlns:s", envelope.namespace()));
        writer.write_event(Event::Start(start)).map_err(write_error)?;

        let buffer = self.buffer.clone();
        let mut block = match &buffer {
            Some(buffer) => HeaderBlock::open(buffer.message_bytes(), envelope)?,
            None => None,
        };
        let mut ordinal = 0;
        let mut scratch = SkipCounter::default();

        for entry in &self.entries {
            match &entry.repr {
                Representation::Writable(header) => header.write_header(&mut writer, self.version)?,
                Representation::Readable(captured) => captured.cursor()?.write_element(&mut writer, None)?,
                Representation::Buffered { slot } => {
                    let block = block.as_mut().ok_or_else(|| {
                        HeaderError::XmlParse("message has no header block".to_string())
                    })?;
                    loop {
                        let (start, empty) = block.next_element()?.ok_or_else(|| {
                            HeaderError::XmlParse(format!("buffered header {} not found in message", slot))
                        })?;
                        let current = ordinal;
                        ordinal += 1;
                        if current == *slot {
                            block.with_cursor(start, empty, |cursor| cursor.write_element(&mut writer, None))?;
                            break;
                        }
                        block.skip_element(&start, empty, &mut scratch)?;
                    }
                }
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new("s:Header")))
            .map_err(write_error)
    }

    /// The serialized header block as a string.
    pub fn header_block_string(&self) -> Result<String> {
        let mut out = Vec::new();
        self.write_header_block(&mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use crate::addressing::AddressingHeader;
    use crate::buffer::XmlBuffer;
    use crate::collection::HeaderCollection;
    use crate::config::HeaderEngineConfig;
    use crate::header::TextHeader;
    use crate::version::{AddressingVersion, MessageVersion};
    use std::sync::Arc;

    const MESSAGE: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing"><s:Header><a:To s:mustUnderstand="1">http://svc</a:To><h:X xmlns:h="urn:x">1</h:X></s:Header><s:Body/></s:Envelope>"#;

    fn scan() -> HeaderCollection {
        HeaderCollection::from_buffered_message(
            MessageVersion::SOAP12_WSA10,
            Arc::new(XmlBuffer::new(MESSAGE)),
            &HeaderEngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_write_buffered_header_is_standalone() {
        let mut headers = scan();
        let mut out = Vec::new();
        headers.write_header(0, &mut out).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.starts_with("<a:To"));
        assert!(xml.contains(r#"xmlns:a="http://www.w3.org/2005/08/addressing""#));
        assert!(xml.contains(r#"xmlns:s="http://www.w3.org/2003/05/soap-envelope""#));
        assert!(xml.ends_with("http://svc</a:To>"));
        assert!(headers.is_buffered(0).unwrap());
    }

    #[test]
    fn test_write_start_and_contents() {
        let mut headers = scan();
        let mut start = Vec::new();
        headers.write_start_header(1, &mut start).unwrap();
        assert!(String::from_utf8(start).unwrap().starts_with("<h:X"));

        let mut contents = Vec::new();
        headers.write_header_contents(1, &mut contents).unwrap();
        assert_eq!(String::from_utf8(contents).unwrap(), "1");
    }

    #[test]
    fn test_write_writable_does_not_capture() {
        let mut headers = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
        headers.add(TextHeader::new("X", "urn:x", "v")).unwrap();
        let mut out = Vec::new();
        headers.write_header(0, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"<h:X xmlns:h="urn:x">v</h:X>"#);
        assert_eq!(headers.get(0).unwrap().representation().name(), "writable");
        assert_eq!(headers.mutation_count(), 1);
    }

    #[test]
    fn test_header_block_mixes_representations() {
        let mut headers = scan();
        headers
            .insert(0, Arc::new(AddressingHeader::action(AddressingVersion::WsAddressing10, "urn:op")))
            .unwrap();
        headers.add(TextHeader::new("Y", "urn:y", "2")).unwrap();

        let block = headers.header_block_string().unwrap();
        assert!(block.starts_with(r#"<s:Header xmlns:s="http://www.w3.org/2003/05/soap-envelope">"#));
        let action = block.find("<a:Action").unwrap();
        let to = block.find("<a:To").unwrap();
        let x = block.find("<h:X").unwrap();
        let y = block.find("<h:Y").unwrap();
        assert!(action < to && to < x && x < y);
        assert!(block.ends_with("</s:Header>"));
    }

    #[test]
    fn test_header_block_single_pass_over_buffer() {
        let headers = scan();
        let block = headers.header_block_string().unwrap();
        assert!(block.contains("http://svc</a:To>"));
        assert!(block.contains(r#"<h:X xmlns:h="urn:x""#));
        assert_eq!(headers.skip_usage().nodes, 0);
        assert!(headers.contains_only_buffered_headers());
    }

    #[test]
    fn test_empty_collection_writes_nothing() {
        let headers = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
        assert_eq!(headers.header_block_string().unwrap(), "");
    }
}
