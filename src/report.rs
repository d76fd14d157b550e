//! Serializable summary of a header collection.

use crate::addressing::EndpointAddress;
use crate::classify::HeaderKind;
use crate::collection::HeaderCollection;
use crate::error::Result;
use crate::header::{HeaderId, HeaderInfo};
use crate::understood::HeaderProcessing;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HeaderReport {
    pub version: String,
    pub headers: Vec<HeaderSummary>,
    pub addressing: AddressingSummary,
    pub not_understood: Vec<HeaderInfo>,
    pub mandatory_headers_understood: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub index: usize,
    pub id: HeaderId,
    pub kind: HeaderKind,
    #[serde(flatten)]
    pub info: HeaderInfo,
    pub understood: bool,
    pub representation: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AddressingSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relates_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<EndpointAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<EndpointAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_to: Option<EndpointAddress>,
}

impl HeaderReport {
    /// Summarize `headers`. Reading the addressing properties may materialize entries.
    pub fn build(headers: &mut HeaderCollection) -> Result<Self> {
        let addressing = AddressingSummary {
            to: headers.to()?,
            action: headers.action()?,
            message_id: headers.message_id()?,
            relates_to: headers.relates_to()?,
            reply_to: headers.reply_to()?,
            from: headers.from()?,
            fault_to: headers.fault_to()?,
        };

        let summaries = headers
            .iter()
            .enumerate()
            .map(|(index, entry)| HeaderSummary {
                index,
                id: entry.id(),
                kind: entry.kind(),
                info: entry.info().clone(),
                understood: entry.processing().contains(HeaderProcessing::UNDERSTOOD),
                representation: entry.representation().name(),
            })
            .collect();

        let not_understood = headers
            .iter()
            .filter(|e| e.processing().is_not_understood())
            .map(|e| e.info().clone())
            .collect();

        Ok(Self {
            version: headers.version().to_string(),
            headers: summaries,
            addressing,
            not_understood,
            mandatory_headers_understood: headers.mandatory_headers_understood(),
            fault: headers.not_understood_fault(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::AddressingHeader;
    use crate::header::TextHeader;
    use crate::version::{AddressingVersion, MessageVersion};

    #[test]
    fn test_report_lists_headers_and_fault() {
        let mut headers = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
        headers
            .add(AddressingHeader::to(AddressingVersion::WsAddressing10, "http://svc"))
            .unwrap();
        headers
            .add(TextHeader::new("X", "urn:x", "1").with_must_understand(true))
            .unwrap();

        let report = HeaderReport::build(&mut headers).unwrap();
        assert_eq!(report.headers.len(), 2);
        assert_eq!(report.headers[0].kind, HeaderKind::To);
        assert!(report.headers[0].understood);
        assert_eq!(report.addressing.to.as_deref(), Some("http://svc"));
        assert_eq!(report.not_understood.len(), 1);
        assert!(!report.mandatory_headers_understood);
        assert!(report.fault.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["headers"][1]["name"], "X");
        assert_eq!(json["headers"][1]["representation"], "writable");
        assert!(json["addressing"].get("action").is_none());
    }
}
