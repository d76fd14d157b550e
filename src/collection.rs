//! The ordered header store.
//!
//! Entries are kept in wire order. Each entry is either a slot in the shared message
//! buffer, a standalone capture, or a writable header object. Structural edits at a
//! position first capture the buffered entries at and after that position, so no
//! buffered slot is ever looked up against a shifted collection.

use crate::addressing::{AddressingHeader, AddressingValue, EndpointAddress};
use crate::buffer::{BufferedMessageData, CapturedHeader, HeaderCursor, SkipCounter};
use crate::classify::{classify, HeaderKind};
use crate::config::{HeaderEngineConfig, MaterializeConfig};
use crate::error::{xml_error, HeaderError, Result};
use crate::header::{HeaderId, HeaderInfo, MessageHeader};
use crate::materialize::{capture_writable, open_buffered};
use crate::understood::HeaderProcessing;
use crate::version::MessageVersion;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Storage of a header entry.
#[derive(Debug, Clone)]
pub enum Representation {
    /// Ordinal of the element inside the shared buffer's header block
    Buffered { slot: usize },
    /// Standalone capture
    Readable(Arc<CapturedHeader>),
    /// Object that serializes itself
    Writable(Arc<dyn MessageHeader>),
}

impl Representation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buffered { .. } => "buffered",
            Self::Readable(_) => "readable",
            Self::Writable(_) => "writable",
        }
    }
}

/// One header of a collection.
#[derive(Debug, Clone)]
pub struct HeaderEntry {
    pub(crate) id: HeaderId,
    pub(crate) kind: HeaderKind,
    pub(crate) info: HeaderInfo,
    pub(crate) repr: Representation,
    pub(crate) processing: HeaderProcessing,
    pub(crate) addressing: Option<AddressingValue>,
}

impl HeaderEntry {
    pub(crate) fn new(
        kind: HeaderKind,
        info: HeaderInfo,
        repr: Representation,
        addressing: Option<AddressingValue>,
    ) -> Self {
        let mut processing = HeaderProcessing::empty();
        if info.must_understand {
            processing.insert(HeaderProcessing::MUST_UNDERSTAND);
        }
        if kind.is_well_known() {
            processing.insert(HeaderProcessing::UNDERSTOOD);
        }

        Self {
            id: HeaderId::next(),
            kind,
            info,
            repr,
            processing,
            addressing,
        }
    }

    pub fn id(&self) -> HeaderId {
        self.id
    }

    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    pub fn info(&self) -> &HeaderInfo {
        &self.info
    }

    pub fn processing(&self) -> HeaderProcessing {
        self.processing
    }

    pub fn representation(&self) -> &Representation {
        &self.repr
    }

    /// Cached value of a well-known addressing header.
    pub fn addressing_value(&self) -> Option<&AddressingValue> {
        self.addressing.as_ref()
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.repr, Representation::Buffered { .. })
    }
}

/// The headers of one message, bound to one message version.
pub struct HeaderCollection {
    pub(crate) version: MessageVersion,
    pub(crate) entries: Vec<HeaderEntry>,
    pub(crate) mutation_count: u64,
    pub(crate) buffer: Option<Arc<dyn BufferedMessageData>>,
    pub(crate) budget: MaterializeConfig,
    pub(crate) skip_usage: SkipCounter,
    pub(crate) understood_modified: bool,
}

impl fmt::Debug for HeaderCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderCollection")
            .field("version", &self.version)
            .field("entries", &self.entries)
            .field("mutation_count", &self.mutation_count)
            .field("has_buffer", &self.buffer.is_some())
            .field("skip_usage", &self.skip_usage)
            .finish()
    }
}

impl HeaderCollection {
    pub fn new(version: MessageVersion) -> Self {
        Self::with_config(version, MaterializeConfig::default())
    }

    pub fn with_config(version: MessageVersion, budget: MaterializeConfig) -> Self {
        Self {
            version,
            entries: Vec::with_capacity(4),
            mutation_count: 0,
            buffer: None,
            budget,
            skip_usage: SkipCounter::default(),
            understood_modified: false,
        }
    }

    pub fn from_config(config: &HeaderEngineConfig) -> Self {
        Self::with_config(config.message_version, config.materialize)
    }

    /// Deep copy of `source`. Buffered entries are captured so the copy never
    /// references the source's buffer. The source is left unchanged.
    pub fn copy_of(source: &HeaderCollection) -> Result<Self> {
        let mut copy = Self::with_config(source.version, source.budget);
        copy.copy_headers_from(source)?;
        copy.mutation_count = 0;
        Ok(copy)
    }

    pub fn version(&self) -> MessageVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HeaderEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    pub fn header_id(&self, index: usize) -> Result<HeaderId> {
        self.check_index(index)?;
        Ok(self.entries[index].id)
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_buffered(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.entries[index].is_buffered())
    }

    /// True while the collection is exactly what a scan produced.
    pub fn contains_only_buffered_headers(&self) -> bool {
        self.buffer.is_some() && self.mutation_count == 0
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.entries.len() {
            return Err(HeaderError::index_out_of_range(index, self.entries.len()));
        }
        Ok(())
    }

    // ---- Structural edits ----

    pub fn add(&mut self, header: impl MessageHeader + 'static) -> Result<()> {
        let index = self.entries.len();
        self.insert(index, Arc::new(header))
    }

    pub fn insert(&mut self, index: usize, header: Arc<dyn MessageHeader>) -> Result<()> {
        if index > self.entries.len() {
            return Err(HeaderError::index_out_of_range(index, self.entries.len() + 1));
        }

        let entry = self.writable_entry(header)?;
        self.check_unique(&entry, None)?;
        self.materialize_range(index, None)?;
        self.entries.insert(index, entry);
        self.mutation_count += 1;
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.materialize_range(index, Some(index))?;
        self.entries.remove(index);
        self.mutation_count += 1;
        self.release_unused_buffer();
        Ok(())
    }

    pub fn replace_at(&mut self, index: usize, header: Arc<dyn MessageHeader>) -> Result<()> {
        self.check_index(index)?;

        let entry = self.writable_entry(header)?;
        self.check_unique(&entry, Some(index))?;
        self.materialize_range(index, Some(index))?;
        self.entries[index] = entry;
        self.mutation_count += 1;
        self.release_unused_buffer();
        Ok(())
    }

    /// Remove every header named `name` in `namespace`. Returns how many were removed.
    pub fn remove_all(&mut self, name: &str, namespace: &str) -> Result<usize> {
        let mut removed = 0;
        for index in (0..self.entries.len()).rev() {
            let info = &self.entries[index].info;
            if info.name == name && info.namespace == namespace {
                self.remove_at(index)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buffer = None;
        self.mutation_count += 1;
    }

    fn writable_entry(&self, header: Arc<dyn MessageHeader>) -> Result<HeaderEntry> {
        if !header.is_message_version_supported(self.version) {
            return Err(HeaderError::InvalidArgument(format!(
                "header '{}' from namespace '{}' does not support message version {}",
                header.name(),
                header.namespace(),
                self.version
            )));
        }

        let info = HeaderInfo::from_header(header.as_ref());
        let kind = classify(&info.name, &info.namespace, &info.actor, self.version)?;
        let addressing = if kind.is_well_known() {
            header.as_addressing().map(|h| h.value().clone())
        } else {
            None
        };
        Ok(HeaderEntry::new(kind, info, Representation::Writable(header), addressing))
    }

    /// Reject `entry` if it would break the singleton or RelatesTo invariants.
    pub(crate) fn check_unique(&self, entry: &HeaderEntry, exclude: Option<usize>) -> Result<()> {
        let kind = entry.kind;
        let others = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, e)| Some(*i) != exclude && e.kind == kind)
            .map(|(_, e)| e);

        if kind.is_singleton() {
            if others.count() > 0 {
                return Err(HeaderError::duplicate(&entry.info.name, &entry.info.namespace));
            }
        } else if kind == HeaderKind::RelatesTo {
            let key = self.relates_to_key(entry)?;
            for other in others {
                if self.relates_to_key(other)? == key {
                    return Err(HeaderError::duplicate(&entry.info.name, &entry.info.namespace));
                }
            }
        }
        Ok(())
    }

    fn relates_to_key(&self, entry: &HeaderEntry) -> Result<String> {
        if let Some(rel) = entry.addressing.as_ref().and_then(|v| v.relationship_type()) {
            return Ok(rel.to_string());
        }

        let reply = self.version.addressing.reply_relationship_type();
        let key = |cursor: &HeaderCursor<'_>| {
            cursor
                .attribute("RelationshipType", "")
                .map(str::trim)
                .filter(|rel| !rel.is_empty())
                .unwrap_or(reply)
                .to_string()
        };

        match &entry.repr {
            Representation::Writable(header) => {
                let captured = capture_writable(header.as_ref(), self.version)?;
                Ok(key(&captured.cursor()?))
            }
            Representation::Readable(captured) => Ok(key(&captured.cursor()?)),
            Representation::Buffered { slot } => {
                let buffer = self.buffer.as_ref().ok_or_else(missing_buffer)?;
                let mut scratch = SkipCounter::default();
                let cursor = open_buffered(
                    buffer.message_bytes(),
                    self.version.envelope,
                    *slot,
                    &mut scratch,
                )?;
                Ok(key(&cursor))
            }
        }
    }

    // ---- Lookup ----

    /// Index of the entry of `kind`.
    ///
    /// Singleton kinds raise `DuplicateHeader` when more than one entry carries them.
    /// RelatesTo may legitimately repeat with distinct relationship types, so the first
    /// match is returned; use [`Self::relates_to_with`] to select one by type.
    pub fn find_by_kind(&self, kind: HeaderKind) -> Result<Option<usize>> {
        let mut found = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.kind != kind {
                continue;
            }
            if !kind.is_singleton() {
                return Ok(Some(index));
            }
            if found.is_some() {
                return Err(HeaderError::duplicate(
                    kind.local_name().unwrap_or_default(),
                    self.version.addressing.namespace(),
                ));
            }
            found = Some(index);
        }
        Ok(found)
    }

    /// Index of the header `name` in `namespace` targeted at the ultimate destination.
    pub fn find_header(&self, name: &str, namespace: &str) -> Result<Option<usize>> {
        if namespace == self.version.addressing.namespace() {
            self.find_matching(name, namespace, None, |e| e.kind.is_well_known())
        } else {
            let actors = self.version.envelope.ultimate_destination_actors();
            self.find_matching(name, namespace, Some(actors), |e| !e.kind.is_well_known())
        }
    }

    /// Index of the header `name` in `namespace` targeted at one of `actors`.
    pub fn find_header_with_actors(&self, name: &str, namespace: &str, actors: &[&str]) -> Result<Option<usize>> {
        self.find_matching(name, namespace, Some(actors), |_| true)
    }

    fn find_matching<F>(&self, name: &str, namespace: &str, actors: Option<&[&str]>, eligible: F) -> Result<Option<usize>>
    where
        F: Fn(&HeaderEntry) -> bool,
    {
        let mut found = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if !eligible(entry) || entry.info.name != name || entry.info.namespace != namespace {
                continue;
            }
            if let Some(actors) = actors {
                if !actors.contains(&entry.info.actor.as_str()) {
                    continue;
                }
            }

            if found.is_some() {
                let actor = match actors {
                    Some([only]) => Some(only.to_string()),
                    _ => None,
                };
                return Err(HeaderError::DuplicateHeader {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    actor,
                });
            }
            found = Some(index);
        }
        Ok(found)
    }

    // ---- Copying ----

    /// Append a copy of `source[index]`.
    ///
    /// A buffered source entry is materialized first, so the copy shares its capture
    /// and never references the source buffer.
    pub fn copy_header_from(&mut self, source: &mut HeaderCollection, index: usize) -> Result<()> {
        self.check_copy_source(source)?;
        source.check_index(index)?;
        if source.entries[index].is_buffered() {
            source.materialize_at(index)?;
        }

        let original = &source.entries[index];
        self.push_copy(original, original.repr.clone())
    }

    /// Append copies of every header of `source`.
    ///
    /// Buffered source entries are captured into the copies only. The source keeps
    /// its representations, its buffer and its mutation count.
    pub fn copy_headers_from(&mut self, source: &HeaderCollection) -> Result<()> {
        self.check_copy_source(source)?;
        let reprs = source.standalone_representations()?;
        for (original, repr) in source.entries.iter().zip(reprs) {
            self.push_copy(original, repr)?;
        }
        Ok(())
    }

    fn check_copy_source(&self, source: &HeaderCollection) -> Result<()> {
        if source.version != self.version {
            return Err(HeaderError::InvalidArgument(format!(
                "message version {} of the source does not match {}",
                source.version, self.version
            )));
        }
        Ok(())
    }

    fn push_copy(&mut self, original: &HeaderEntry, repr: Representation) -> Result<()> {
        let kind = classify(
            &original.info.name,
            &original.info.namespace,
            &original.info.actor,
            self.version,
        )?;
        let mut processing = original.processing;
        if kind.is_well_known() {
            processing.insert(HeaderProcessing::UNDERSTOOD);
        }

        let entry = HeaderEntry {
            id: original.id,
            kind,
            info: original.info.clone(),
            repr,
            processing,
            addressing: original.addressing.clone(),
        };
        self.check_unique(&entry, None)?;
        self.entries.push(entry);
        self.mutation_count += 1;
        Ok(())
    }

    // ---- Typed addressing properties ----

    pub fn to(&mut self) -> Result<Option<String>> {
        Ok(self
            .addressing_value(HeaderKind::To)?
            .and_then(|v| v.as_text().map(str::to_string)))
    }

    pub fn action(&mut self) -> Result<Option<String>> {
        Ok(self
            .addressing_value(HeaderKind::Action)?
            .and_then(|v| v.as_text().map(str::to_string)))
    }

    pub fn message_id(&mut self) -> Result<Option<String>> {
        Ok(self
            .addressing_value(HeaderKind::MessageId)?
            .and_then(|v| v.as_text().map(str::to_string)))
    }

    /// The message this one replies to.
    pub fn relates_to(&mut self) -> Result<Option<String>> {
        let reply = self.version.addressing.reply_relationship_type();
        self.relates_to_with(reply)
    }

    pub fn relates_to_with(&mut self, relationship_type: &str) -> Result<Option<String>> {
        Ok(self
            .relates_to_index(relationship_type)?
            .map(|(_, message_id)| message_id))
    }

    pub fn reply_to(&mut self) -> Result<Option<EndpointAddress>> {
        Ok(self
            .addressing_value(HeaderKind::ReplyTo)?
            .and_then(|v| v.as_endpoint().cloned()))
    }

    pub fn from(&mut self) -> Result<Option<EndpointAddress>> {
        Ok(self
            .addressing_value(HeaderKind::From)?
            .and_then(|v| v.as_endpoint().cloned()))
    }

    pub fn fault_to(&mut self) -> Result<Option<EndpointAddress>> {
        Ok(self
            .addressing_value(HeaderKind::FaultTo)?
            .and_then(|v| v.as_endpoint().cloned()))
    }

    pub fn set_to(&mut self, uri: Option<&str>) -> Result<()> {
        self.set_addressing(HeaderKind::To, uri.map(|u| AddressingValue::To(u.to_string())))
    }

    pub fn set_action(&mut self, action: Option<&str>) -> Result<()> {
        self.set_addressing(
            HeaderKind::Action,
            action.map(|a| AddressingValue::Action(a.to_string())),
        )
    }

    pub fn set_message_id(&mut self, id: Option<&str>) -> Result<()> {
        self.set_addressing(
            HeaderKind::MessageId,
            id.map(|i| AddressingValue::MessageId(i.to_string())),
        )
    }

    pub fn set_reply_to(&mut self, epr: Option<EndpointAddress>) -> Result<()> {
        self.set_addressing(HeaderKind::ReplyTo, epr.map(AddressingValue::ReplyTo))
    }

    pub fn set_from(&mut self, epr: Option<EndpointAddress>) -> Result<()> {
        self.set_addressing(HeaderKind::From, epr.map(AddressingValue::From))
    }

    pub fn set_fault_to(&mut self, epr: Option<EndpointAddress>) -> Result<()> {
        self.set_addressing(HeaderKind::FaultTo, epr.map(AddressingValue::FaultTo))
    }

    /// Set or remove the RelatesTo header of `relationship_type`.
    pub fn set_relates_to(&mut self, relationship_type: &str, id: Option<&str>) -> Result<()> {
        let existing = self.relates_to_index(relationship_type)?.map(|(index, _)| index);
        let header = id.map(|id| {
            Arc::new(AddressingHeader::relates_to_with(
                self.version.addressing,
                relationship_type,
                id,
            )) as Arc<dyn MessageHeader>
        });
        self.apply_property(existing, header)
    }

    fn set_addressing(&mut self, kind: HeaderKind, value: Option<AddressingValue>) -> Result<()> {
        let existing = self.find_by_kind(kind)?;
        let header = value.map(|value| {
            Arc::new(AddressingHeader::new(self.version.addressing, value)) as Arc<dyn MessageHeader>
        });
        self.apply_property(existing, header)
    }

    fn apply_property(&mut self, existing: Option<usize>, header: Option<Arc<dyn MessageHeader>>) -> Result<()> {
        match (existing, header) {
            (Some(index), Some(header)) => self.replace_at(index, header),
            (Some(index), None) => self.remove_at(index),
            (None, Some(header)) => self.insert(self.entries.len(), header),
            (None, None) => Ok(()),
        }
    }

    fn addressing_value(&mut self, kind: HeaderKind) -> Result<Option<AddressingValue>> {
        match self.find_by_kind(kind)? {
            Some(index) => self.cached_or_read(index),
            None => Ok(None),
        }
    }

    fn relates_to_index(&mut self, relationship_type: &str) -> Result<Option<(usize, String)>> {
        for index in 0..self.entries.len() {
            if self.entries[index].kind != HeaderKind::RelatesTo {
                continue;
            }
            if let Some(AddressingValue::RelatesTo {
                relationship_type: rel,
                message_id,
            }) = self.cached_or_read(index)?
            {
                if rel == relationship_type {
                    return Ok(Some((index, message_id)));
                }
            }
        }
        Ok(None)
    }

    fn cached_or_read(&mut self, index: usize) -> Result<Option<AddressingValue>> {
        if let Some(value) = &self.entries[index].addressing {
            return Ok(Some(value.clone()));
        }

        let kind = self.entries[index].kind;
        let addressing = self.version.addressing;
        let value = {
            let mut cursor = self.reader_at(index)?;
            AddressingValue::read(kind, &mut cursor, addressing)?
        };
        self.entries[index].addressing = value.clone();
        Ok(value)
    }

    // ---- Content reads ----

    /// Trimmed text content of the header at `index`.
    pub fn header_text(&mut self, index: usize) -> Result<String> {
        let mut cursor = self.reader_at(index)?;
        cursor.read_text()
    }

    /// Deserialize the header at `index`.
    pub fn header_value<T: DeserializeOwned>(&mut self, index: usize) -> Result<T> {
        let xml = {
            let mut cursor = self.reader_at(index)?;
            cursor.capture(None)?.to_xml_string()
        };
        quick_xml::de::from_str(&xml).map_err(xml_error)
    }

    /// Deserialize the header `name` in `namespace`.
    pub fn get_header<T: DeserializeOwned>(&mut self, name: &str, namespace: &str) -> Result<T> {
        match self.find_header(name, namespace)? {
            Some(index) => self.header_value(index),
            None => Err(HeaderError::HeaderNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
        }
    }

    /// Value of attribute `local_name` in `namespace` on every header, in wire order.
    pub fn header_attributes(&mut self, local_name: &str, namespace: &str) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(self.entries.len());
        for index in 0..self.entries.len() {
            let cursor = self.reader_at(index)?;
            values.push(cursor.attribute(local_name, namespace).map(str::to_string));
        }
        Ok(values)
    }
}

pub(crate) fn missing_buffer() -> HeaderError {
    HeaderError::InvalidArgument("buffered header has no backing message buffer".to_string())
}
