//! Tracking of which headers the processing node has understood.

use crate::collection::HeaderCollection;
use crate::error::{must_understand_fault, HeaderError, Result};
use crate::header::{HeaderId, HeaderInfo};
use tracing::{trace, warn};

bitflags::bitflags! {
    /// Processing flags of a header entry.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct HeaderProcessing: u8 {
        const MUST_UNDERSTAND = 0b0000_0001;
        const UNDERSTOOD = 0b0000_0010;
    }
}

impl HeaderProcessing {
    /// MustUnderstand and not Understood.
    pub fn is_not_understood(self) -> bool {
        self.contains(Self::MUST_UNDERSTAND) && !self.contains(Self::UNDERSTOOD)
    }
}

impl HeaderCollection {
    pub fn mark_understood(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.set_understood(index)
    }

    pub fn mark_understood_id(&mut self, id: HeaderId) -> Result<()> {
        let index = self.index_of_id(id)?;
        self.set_understood(index)
    }

    pub fn unmark_understood(&mut self, id: HeaderId) -> Result<()> {
        let index = self.index_of_id(id)?;
        let entry = &mut self.entries[index];
        if !entry.processing.contains(HeaderProcessing::UNDERSTOOD) {
            return Err(HeaderError::UnderstoodStateMisuse(format!(
                "header '{}' from namespace '{}' is not marked as understood",
                entry.info.name, entry.info.namespace
            )));
        }

        if entry.kind.is_well_known() {
            warn!(
                header = %entry.info.name,
                namespace = %entry.info.namespace,
                "Unmarking understood addressing header"
            );
        }
        entry.processing.remove(HeaderProcessing::UNDERSTOOD);
        self.understood_modified = true;
        Ok(())
    }

    pub fn is_understood(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.entries[index]
            .processing
            .contains(HeaderProcessing::UNDERSTOOD))
    }

    pub fn is_understood_id(&self, id: HeaderId) -> Result<bool> {
        let index = self.index_of_id(id)?;
        Ok(self.entries[index]
            .processing
            .contains(HeaderProcessing::UNDERSTOOD))
    }

    pub fn understood_headers(&self) -> Vec<HeaderId> {
        self.entries
            .iter()
            .filter(|e| e.processing.contains(HeaderProcessing::UNDERSTOOD))
            .map(|e| e.id)
            .collect()
    }

    /// MustUnderstand headers that were never marked understood, in wire order.
    pub fn headers_not_understood(&self) -> Vec<HeaderId> {
        self.entries
            .iter()
            .filter(|e| e.processing.is_not_understood())
            .map(|e| e.id)
            .collect()
    }

    /// True when every MustUnderstand header targeted at one of `actors` is understood.
    pub fn all_mandatory_understood(&self, actors: &[&str]) -> bool {
        !self
            .entries
            .iter()
            .any(|e| e.processing.is_not_understood() && actors.contains(&e.info.actor.as_str()))
    }

    /// `all_mandatory_understood` over the actors this node plays for the envelope version.
    pub fn mandatory_headers_understood(&self) -> bool {
        self.all_mandatory_understood(self.version.envelope.must_understand_actors())
    }

    pub fn understood_modified(&self) -> bool {
        self.understood_modified
    }

    /// The MustUnderstand fault for the headers not understood, if any.
    pub fn not_understood_fault(&self) -> Option<String> {
        let infos: Vec<&HeaderInfo> = self
            .entries
            .iter()
            .filter(|e| e.processing.is_not_understood())
            .map(|e| &e.info)
            .collect();
        must_understand_fault(&infos, self.version.envelope)
    }

    fn set_understood(&mut self, index: usize) -> Result<()> {
        let entry = &mut self.entries[index];
        if entry.processing.contains(HeaderProcessing::UNDERSTOOD) {
            return Err(HeaderError::UnderstoodStateMisuse(format!(
                "header '{}' from namespace '{}' is already marked as understood",
                entry.info.name, entry.info.namespace
            )));
        }

        entry.processing.insert(HeaderProcessing::UNDERSTOOD);
        trace!(
            id = %entry.id,
            header = %entry.info.name,
            namespace = %entry.info.namespace,
            "Header understood"
        );
        self.understood_modified = true;
        Ok(())
    }

    fn index_of_id(&self, id: HeaderId) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| HeaderError::InvalidArgument(format!("header {} is not in this collection", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::AddressingHeader;
    use crate::header::TextHeader;
    use crate::version::{AddressingVersion, MessageVersion, SOAP_12_NEXT_ROLE};

    fn collection() -> HeaderCollection {
        let mut headers = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
        headers
            .add(AddressingHeader::to(AddressingVersion::WsAddressing10, "http://svc"))
            .unwrap();
        headers
            .add(TextHeader::new("X", "urn:x", "1").with_must_understand(true))
            .unwrap();
        headers.add(TextHeader::new("Y", "urn:y", "2")).unwrap();
        headers
    }

    #[test]
    fn test_processing_flags() {
        let mut flags = HeaderProcessing::MUST_UNDERSTAND;
        assert!(flags.is_not_understood());
        flags.insert(HeaderProcessing::UNDERSTOOD);
        assert!(!flags.is_not_understood());
        assert_eq!(flags.bits(), 3);
        flags.remove(HeaderProcessing::UNDERSTOOD);
        assert!(flags.is_not_understood());
        assert!(!HeaderProcessing::empty().is_not_understood());
    }

    #[test]
    fn test_addressing_headers_start_understood() {
        let headers = collection();
        assert!(headers.is_understood(0).unwrap());
        assert!(!headers.is_understood(1).unwrap());
        assert!(!headers.is_understood(2).unwrap());
        assert!(!headers.understood_modified());
    }

    #[test]
    fn test_mark_twice_is_misuse() {
        let mut headers = collection();
        headers.mark_understood(1).unwrap();
        assert!(matches!(
            headers.mark_understood(1),
            Err(HeaderError::UnderstoodStateMisuse(_))
        ));
        assert!(matches!(
            headers.mark_understood(0),
            Err(HeaderError::UnderstoodStateMisuse(_))
        ));
        assert!(headers.understood_modified());
    }

    #[test]
    fn test_unmark_requires_mark() {
        let mut headers = collection();
        let id = headers.header_id(2).unwrap();
        assert!(matches!(
            headers.unmark_understood(id),
            Err(HeaderError::UnderstoodStateMisuse(_))
        ));
        headers.mark_understood_id(id).unwrap();
        assert!(headers.is_understood_id(id).unwrap());
        headers.unmark_understood(id).unwrap();
        assert!(!headers.is_understood_id(id).unwrap());
    }

    #[test]
    fn test_not_understood_and_fault() {
        let mut headers = collection();
        let x = headers.header_id(1).unwrap();
        assert_eq!(headers.headers_not_understood(), vec![x]);
        assert!(!headers.mandatory_headers_understood());
        let fault = headers.not_understood_fault().unwrap();
        assert!(fault.contains(r#"qname="h:X""#));

        headers.mark_understood(1).unwrap();
        assert!(headers.headers_not_understood().is_empty());
        assert!(headers.mandatory_headers_understood());
        assert!(headers.not_understood_fault().is_none());
    }

    #[test]
    fn test_mandatory_understood_respects_actors() {
        let mut headers = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
        headers
            .add(
                TextHeader::new("Hop", "urn:hop", "1")
                    .with_actor("urn:elsewhere")
                    .with_must_understand(true),
            )
            .unwrap();
        assert!(headers.mandatory_headers_understood());
        assert!(!headers.all_mandatory_understood(&["urn:elsewhere"]));

        headers
            .add(
                TextHeader::new("Next", "urn:next", "1")
                    .with_actor(SOAP_12_NEXT_ROLE)
                    .with_must_understand(true),
            )
            .unwrap();
        assert!(!headers.mandatory_headers_understood());
    }

    #[test]
    fn test_unknown_id() {
        let headers = collection();
        let other = HeaderCollection::new(MessageVersion::SOAP12_WSA10);
        let id = headers.header_id(0).unwrap();
        assert!(matches!(
            other.is_understood_id(id),
            Err(HeaderError::InvalidArgument(_))
        ));
    }
}
