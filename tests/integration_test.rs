//! Integration tests for the zentinel-soap-headers crate.
//!
//! These tests exercise the public API surface end-to-end, combining
//! scanning, lazy materialization, edits, understood tracking and writing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zentinel_soap_headers::version::{SOAP_12_NS, WSA_10_NS};
use zentinel_soap_headers::{
    AddressingHeader, AddressingVersion, BufferedMessageData, EndpointAddress, HeaderCollection,
    HeaderEngineConfig, HeaderError, HeaderKind, HeaderReport, MessageVersion, ReaderQuotas,
    TextHeader, XmlBuffer,
};

const WSA: AddressingVersion = AddressingVersion::WsAddressing10;

// ============================================================================
// Helpers: message builders and a buffer that counts reads
// ============================================================================

fn envelope(headers: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{}" xmlns:a="{}">
  <s:Header>
    {}
  </s:Header>
  <s:Body>
    <m:GetUser xmlns:m="http://example.org/users"><m:UserId>123</m:UserId></m:GetUser>
  </s:Body>
</s:Envelope>"#,
        SOAP_12_NS, WSA_10_NS, headers
    )
}

fn numbered(count: usize) -> String {
    (0..count)
        .map(|i| format!(r#"<h:H{i} xmlns:h="urn:h">v{i}</h:H{i}>"#))
        .collect::<Vec<_>>()
        .join("\n    ")
}

fn scan(xml: &str) -> HeaderCollection {
    HeaderCollection::from_buffered_message(
        MessageVersion::SOAP12_WSA10,
        Arc::new(XmlBuffer::new(xml)),
        &HeaderEngineConfig::default(),
    )
    .unwrap()
}

struct CountingBuffer {
    bytes: Vec<u8>,
    reads: AtomicUsize,
}

impl CountingBuffer {
    fn new(xml: &str) -> Self {
        Self {
            bytes: xml.as_bytes().to_vec(),
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl BufferedMessageData for CountingBuffer {
    fn message_bytes(&self) -> &[u8] {
        self.reads.fetch_add(1, Ordering::SeqCst);
        &self.bytes
    }

    fn quotas(&self) -> ReaderQuotas {
        ReaderQuotas::default()
    }
}

// ============================================================================
// Singleton and RelatesTo invariants
// ============================================================================

#[test]
fn test_duplicate_to_rejected_without_side_effects() {
    let mut headers = scan(&envelope(&format!(
        "<a:To s:mustUnderstand=\"1\">http://svc</a:To>\n    {}",
        numbered(2)
    )));

    let err = headers
        .insert(0, Arc::new(AddressingHeader::to(WSA, "http://other")))
        .unwrap_err();
    assert!(matches!(err, HeaderError::DuplicateHeader { .. }));
    assert_eq!(headers.len(), 3);
    assert!(headers.iter().all(|e| e.is_buffered()));
    assert!(headers.contains_only_buffered_headers());
}

#[test]
fn test_relates_to_by_relationship_type() {
    let mut headers = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
    headers.add(AddressingHeader::relates_to(WSA, "urn:uuid:1")).unwrap();
    headers
        .add(AddressingHeader::relates_to_with(WSA, "urn:rel:b", "urn:uuid:2"))
        .unwrap();
    assert!(matches!(
        headers.add(AddressingHeader::relates_to_with(WSA, "urn:rel:b", "urn:uuid:3")),
        Err(HeaderError::DuplicateHeader { .. })
    ));
    assert_eq!(headers.len(), 2);
}

#[test]
fn test_scanned_relates_to_conflicts_with_insert() {
    let mut headers = scan(&envelope("<a:RelatesTo>urn:uuid:1</a:RelatesTo>"));
    assert_eq!(headers.relates_to().unwrap().as_deref(), Some("urn:uuid:1"));
    assert!(matches!(
        headers.add(AddressingHeader::relates_to(WSA, "urn:uuid:2")),
        Err(HeaderError::DuplicateHeader { .. })
    ));
    headers
        .add(AddressingHeader::relates_to_with(WSA, "urn:rel:other", "urn:uuid:2"))
        .unwrap();
}

// ============================================================================
// Version gating
// ============================================================================

#[test]
fn test_addressing_none_accepts_only_routing_headers() {
    let mut headers = HeaderCollection::new(MessageVersion::SOAP12);
    headers
        .add(AddressingHeader::action(AddressingVersion::None, "urn:op"))
        .unwrap();
    headers.add(TextHeader::new("X", "urn:x", "1")).unwrap();
    for header in [
        AddressingHeader::message_id(AddressingVersion::None, "urn:uuid:1"),
        AddressingHeader::reply_to(AddressingVersion::None, EndpointAddress::new("http://c")),
    ] {
        assert!(matches!(
            headers.add(header),
            Err(HeaderError::VersionIncompatible(_))
        ));
    }
}

#[test]
fn test_envelope_none_accepts_only_to_and_action() {
    let mut headers = HeaderCollection::new(MessageVersion::NONE);
    headers
        .add(AddressingHeader::to(AddressingVersion::None, "http://svc"))
        .unwrap();
    headers
        .add(AddressingHeader::action(AddressingVersion::None, "urn:op"))
        .unwrap();
    assert!(matches!(
        headers.add(TextHeader::new("X", "urn:x", "1")),
        Err(HeaderError::VersionIncompatible(_))
    ));
    assert_eq!(headers.header_block_string().unwrap(), "");
}

// ============================================================================
// Lazy materialization
// ============================================================================

#[test]
fn test_materialized_header_no_longer_reads_buffer() {
    let buffer = Arc::new(CountingBuffer::new(&envelope(&numbered(3))));
    let mut headers = HeaderCollection::from_buffered_message(
        MessageVersion::SOAP12_WSA10,
        buffer.clone(),
        &HeaderEngineConfig::default(),
    )
    .unwrap();

    headers.materialize_at(1).unwrap();
    let after_materialize = buffer.reads();

    assert_eq!(headers.header_text(1).unwrap(), "v1");
    assert_eq!(headers.header_text(1).unwrap(), "v1");
    assert_eq!(buffer.reads(), after_materialize);

    assert_eq!(headers.header_text(0).unwrap(), "v0");
    assert_eq!(buffer.reads(), after_materialize + 1);
}

#[test]
fn test_insert_materializes_only_entries_after_position() {
    let mut headers = scan(&envelope(&numbered(4)));
    headers
        .insert(2, Arc::new(TextHeader::new("New", "urn:new", "n")))
        .unwrap();

    let buffered: Vec<bool> = headers.iter().map(|e| e.is_buffered()).collect();
    assert_eq!(buffered, vec![true, true, false, false, false]);
    assert!(headers.has_buffer());

    let texts: Vec<String> = (0..headers.len())
        .map(|i| headers.header_text(i).unwrap())
        .collect();
    assert_eq!(texts, vec!["v0", "v1", "n", "v2", "v3"]);
}

#[test]
fn test_remove_and_replace_respect_position() {
    let mut headers = scan(&envelope(&numbered(4)));
    headers.remove_at(1).unwrap();
    let buffered: Vec<bool> = headers.iter().map(|e| e.is_buffered()).collect();
    assert_eq!(buffered, vec![true, false, false]);
    assert_eq!(headers.header_text(0).unwrap(), "v0");
    assert_eq!(headers.header_text(1).unwrap(), "v2");

    headers
        .replace_at(0, Arc::new(TextHeader::new("R", "urn:r", "r")))
        .unwrap();
    assert!(!headers.has_buffer());
    assert_eq!(headers.header_text(0).unwrap(), "r");
    assert_eq!(headers.header_text(2).unwrap(), "v3");
}

#[test]
fn test_mutation_count_strictly_increases() {
    let mut headers = scan(&envelope(&numbered(2)));
    let mut last = headers.mutation_count();
    assert_eq!(last, 0);

    headers.add(TextHeader::new("A", "urn:a", "a")).unwrap();
    assert!(headers.mutation_count() > last);
    last = headers.mutation_count();

    headers.materialize_at(0).unwrap();
    assert!(headers.mutation_count() > last);
    last = headers.mutation_count();

    headers.remove_at(2).unwrap();
    assert!(headers.mutation_count() > last);
    last = headers.mutation_count();

    headers.clear();
    assert!(headers.mutation_count() > last);
}

#[test]
fn test_copy_survives_dropping_source_buffer() {
    let buffer = Arc::new(CountingBuffer::new(&envelope(&format!(
        "<a:Action s:mustUnderstand=\"1\">urn:op</a:Action>\n    {}",
        numbered(2)
    ))));
    let source = HeaderCollection::from_buffered_message(
        MessageVersion::SOAP12_WSA10,
        buffer.clone(),
        &HeaderEngineConfig::default(),
    )
    .unwrap();

    let mut copy = HeaderCollection::copy_of(&source).unwrap();
    assert!(source.contains_only_buffered_headers());
    assert_eq!(source.mutation_count(), 0);
    drop(source);
    assert_eq!(Arc::strong_count(&buffer), 1);
    drop(buffer);

    assert!(!copy.has_buffer());
    assert_eq!(copy.mutation_count(), 0);
    assert_eq!(copy.action().unwrap().as_deref(), Some("urn:op"));
    assert_eq!(copy.header_text(2).unwrap(), "v1");
}

#[test]
fn test_single_header_copy_survives_dropping_source() {
    let buffer = Arc::new(CountingBuffer::new(&envelope(&numbered(3))));
    let mut source = HeaderCollection::from_buffered_message(
        MessageVersion::SOAP12_WSA10,
        buffer.clone(),
        &HeaderEngineConfig::default(),
    )
    .unwrap();

    let mut copy = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
    copy.copy_header_from(&mut source, 1).unwrap();
    assert!(!source.is_buffered(1).unwrap());
    assert!(source.is_buffered(0).unwrap());
    assert_eq!(copy.header_id(0).unwrap(), source.header_id(1).unwrap());

    drop(source);
    assert_eq!(Arc::strong_count(&buffer), 1);
    let reads = buffer.reads();
    drop(buffer);

    assert!(reads > 0);
    assert!(!copy.has_buffer());
    assert!(!copy.is_buffered(0).unwrap());
    assert_eq!(copy.header_text(0).unwrap(), "v1");
}

// ============================================================================
// Understood tracking
// ============================================================================

#[test]
fn test_to_action_and_unknown_must_understand() {
    let mut headers = scan(&envelope(
        r#"<a:To s:mustUnderstand="1">http://svc</a:To>
    <a:Action s:mustUnderstand="1">urn:op</a:Action>
    <x:X xmlns:x="urn:x" s:mustUnderstand="true">1</x:X>"#,
    ));
    let x = headers.header_id(2).unwrap();
    assert_eq!(headers.get(2).unwrap().kind(), HeaderKind::Unknown);
    assert_eq!(headers.headers_not_understood(), vec![x]);

    let fault = headers.not_understood_fault().unwrap();
    assert!(fault.contains(r#"<s:NotUnderstood qname="h:X" xmlns:h="urn:x"/>"#));

    headers.mark_understood_id(x).unwrap();
    assert!(headers.headers_not_understood().is_empty());
    assert!(headers.mandatory_headers_understood());
    assert!(headers.not_understood_fault().is_none());
}

#[test]
fn test_marking_is_not_idempotent() {
    let mut headers = scan(&envelope(r#"<x:X xmlns:x="urn:x" s:mustUnderstand="1">1</x:X>"#));
    headers.mark_understood(0).unwrap();
    assert!(matches!(
        headers.mark_understood(0),
        Err(HeaderError::UnderstoodStateMisuse(_))
    ));

    let id = headers.header_id(0).unwrap();
    headers.unmark_understood(id).unwrap();
    assert!(matches!(
        headers.unmark_understood(id),
        Err(HeaderError::UnderstoodStateMisuse(_))
    ));
    assert_eq!(headers.headers_not_understood(), vec![id]);
}

// ============================================================================
// End-to-end: scan, edit, write, rescan
// ============================================================================

#[test]
fn test_e2e_forward_with_rewritten_addressing() {
    let mut headers = scan(&envelope(&format!(
        r#"<a:Action s:mustUnderstand="1">urn:op</a:Action>
    <a:MessageID>urn:uuid:41</a:MessageID>
    <a:ReplyTo><a:Address>http://client/reply</a:Address><a:ReferenceParameters><p:Session xmlns:p="urn:p">9</p:Session></a:ReferenceParameters></a:ReplyTo>
    {}"#,
        numbered(1)
    )));

    headers.set_to(Some("http://backend/users")).unwrap();
    headers.set_message_id(Some("urn:uuid:42")).unwrap();

    let block = headers.header_block_string().unwrap();
    let forwarded = format!(
        r#"<s:Envelope xmlns:s="{}">{}<s:Body/></s:Envelope>"#,
        SOAP_12_NS, block
    );
    let mut rescanned = scan(&forwarded);

    assert_eq!(rescanned.len(), 5);
    assert_eq!(rescanned.to().unwrap().as_deref(), Some("http://backend/users"));
    assert_eq!(rescanned.action().unwrap().as_deref(), Some("urn:op"));
    assert_eq!(rescanned.message_id().unwrap().as_deref(), Some("urn:uuid:42"));
    let reply_to = rescanned.reply_to().unwrap().unwrap();
    assert_eq!(reply_to.address, "http://client/reply");
    assert!(reply_to
        .reference_parameters
        .unwrap()
        .contains("<p:Session xmlns:p=\"urn:p\">9</p:Session>"));
    assert_eq!(rescanned.header_text(3).unwrap(), "v0");
}

#[test]
fn test_e2e_report_json() {
    let mut headers = scan(&envelope(
        r#"<a:To s:mustUnderstand="1">http://svc</a:To>
    <x:Audit xmlns:x="urn:audit" s:mustUnderstand="1" s:role="http://www.w3.org/2003/05/soap-envelope/role/next">on</x:Audit>"#,
    ));

    let report = HeaderReport::build(&mut headers).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["addressing"]["to"], "http://svc");
    assert_eq!(json["headers"][0]["kind"], "To");
    assert_eq!(json["headers"][1]["actor"], "http://www.w3.org/2003/05/soap-envelope/role/next");
    assert_eq!(json["not_understood"][0]["name"], "Audit");
    assert_eq!(json["mandatory_headers_understood"], false);
    assert!(json["fault"].as_str().unwrap().contains("MustUnderstand"));
}

#[test]
fn test_e2e_config_drives_scan() {
    let config = HeaderEngineConfig::from_yaml(
        r#"
message_version:
  envelope: "1.2"
  addressing: "2005"
materialize:
  max_buffered_header_nodes: 2
"#,
    )
    .unwrap();

    let mut headers = HeaderCollection::from_buffered_message(
        config.message_version,
        Arc::new(XmlBuffer::with_quotas(envelope(&numbered(3)), config.quotas)),
        &config,
    )
    .unwrap();

    assert_eq!(headers.header_text(2).unwrap(), "v2");
    assert_eq!(headers.header_text(0).unwrap(), "v0");
    assert!(!headers.has_buffer());
}
