//! Error types for the SOAP header engine.

use crate::header::HeaderInfo;
use crate::version::EnvelopeVersion;
use quick_xml::escape::{escape, partial_escape};
use thiserror::Error;

/// Header collection errors.
///
/// Every variant is a local, synchronous condition surfaced to the caller of the
/// operation that detected it. "Not understood" headers are reported as data
/// (see [`crate::HeaderCollection::headers_not_understood`]), never as an error.
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Multiple headers with name '{name}' and namespace '{namespace}'{}", fmt_actor(.actor))]
    DuplicateHeader {
        name: String,
        namespace: String,
        actor: Option<String>,
    },

    #[error("Version incompatible: {0}")]
    VersionIncompatible(String),

    #[error("Header '{name}' from namespace '{namespace}' not found")]
    HeaderNotFound { name: String, namespace: String },

    #[error("Understood state misuse: {0}")]
    UnderstoodStateMisuse(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("XML write error: {0}")]
    Write(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn fmt_actor(actor: &Option<String>) -> String {
    match actor {
        Some(actor) => format!(" for actor '{}'", actor),
        None => String::new(),
    }
}

impl HeaderError {
    pub(crate) fn index_out_of_range(index: usize, count: usize) -> Self {
        Self::InvalidArgument(format!(
            "index {} is out of range, value must be in range [0, {})",
            index, count
        ))
    }

    pub(crate) fn duplicate(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::DuplicateHeader {
            name: name.into(),
            namespace: namespace.into(),
            actor: None,
        }
    }
}

/// Result type alias using HeaderError.
pub type Result<T> = std::result::Result<T, HeaderError>;

pub(crate) fn xml_error(e: impl std::fmt::Display) -> HeaderError {
    HeaderError::XmlParse(e.to_string())
}

pub(crate) fn write_error(e: impl std::fmt::Display) -> HeaderError {
    HeaderError::Write(e.to_string())
}

/// Generate the MustUnderstand SOAP fault for headers that were not understood.
///
/// Returns `None` when there is nothing to report or the envelope version has no
/// fault representation.
pub fn must_understand_fault(not_understood: &[&HeaderInfo], version: EnvelopeVersion) -> Option<String> {
    if not_understood.is_empty() {
        return None;
    }

    match version {
        EnvelopeVersion::Soap11 => Some(soap_11_fault(not_understood)),
        EnvelopeVersion::Soap12 => Some(soap_12_fault(not_understood)),
        EnvelopeVersion::None => None,
    }
}

fn fault_reason(headers: &[&HeaderInfo]) -> String {
    headers
        .iter()
        .map(|h| format!("The header '{}' from the namespace '{}' was not understood by the recipient of this message, causing the message to not be processed.", h.name, h.namespace))
        .collect::<Vec<_>>()
        .join(" ")
}

fn soap_11_fault(headers: &[&HeaderInfo]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:MustUnderstand</faultcode>
      <faultstring>{}</faultstring>
    </s:Fault>
  </s:Body>
</s:Envelope>"#,
        partial_escape(fault_reason(headers).as_str())
    )
}

fn soap_12_fault(headers: &[&HeaderInfo]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header>
{}
  </s:Header>
  <s:Body>
    <s:Fault>
      <s:Code>
        <s:Value>s:MustUnderstand</s:Value>
      </s:Code>
      <s:Reason>
        <s:Text xml:lang="en">{}</s:Text>
      </s:Reason>
    </s:Fault>
  </s:Body>
</s:Envelope>"#,
        headers
            .iter()
            .map(|h| format!(
                "    <s:NotUnderstood qname=\"h:{}\" xmlns:h=\"{}\"/>",
                escape(h.name.as_str()),
                escape(h.namespace.as_str())
            ))
            .collect::<Vec<_>>()
            .join("\n"),
        partial_escape(fault_reason(headers).as_str())
    )
}
