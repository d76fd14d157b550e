//! Lazy materialization of headers.
//!
//! Representation changes are one-way: buffered and writable entries become
//! standalone captures, and nothing ever returns to the buffer.

use crate::buffer::{CapturedHeader, HeaderBlock, HeaderCursor, SkipCounter};
use crate::collection::{missing_buffer, HeaderCollection, Representation};
use crate::config::ReaderQuotas;
use crate::error::{HeaderError, Result};
use crate::header::MessageHeader;
use crate::version::{EnvelopeVersion, MessageVersion};
use quick_xml::Writer;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

impl HeaderCollection {
    /// A cursor over the header at `index`.
    ///
    /// Writable headers are serialized first and permanently switch to a capture.
    /// Buffered headers are located by skipping the preceding siblings; once the
    /// skip budget is spent the whole collection is materialized instead.
    pub fn reader_at(&mut self, index: usize) -> Result<HeaderCursor<'_>> {
        self.check_index(index)?;

        let captured = match &self.entries[index].repr {
            Representation::Writable(header) => Some(capture_writable(header.as_ref(), self.version)?),
            _ => None,
        };
        if let Some(captured) = captured {
            self.entries[index].repr = Representation::Readable(Arc::new(captured));
            self.mutation_count += 1;
        }

        if self.entries[index].is_buffered() && self.budget_exceeded() {
            debug!(
                nodes = self.skip_usage.nodes,
                attributes = self.skip_usage.attributes,
                "Buffered header budget exceeded, materializing all headers"
            );
            self.materialize_all(None)?;
        }

        match &self.entries[index].repr {
            Representation::Readable(captured) => captured.cursor(),
            Representation::Buffered { slot } => {
                let buffer = self.buffer.as_ref().ok_or_else(missing_buffer)?;
                open_buffered(
                    buffer.message_bytes(),
                    self.version.envelope,
                    *slot,
                    &mut self.skip_usage,
                )
            }
            Representation::Writable(_) => Err(HeaderError::InvalidArgument(format!(
                "header {} has no readable representation",
                index
            ))),
        }
    }

    /// Switch the header at `index` to a standalone capture.
    pub fn materialize_at(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;

        let captured = match &self.entries[index].repr {
            Representation::Readable(_) => return Ok(()),
            Representation::Buffered { .. } => return self.capture_buffered(vec![index]),
            Representation::Writable(header) => capture_writable(header.as_ref(), self.version)?,
        };
        self.entries[index].repr = Representation::Readable(Arc::new(captured));
        self.mutation_count += 1;
        Ok(())
    }

    /// Capture every buffered header except `except` in one pass over the buffer.
    pub fn materialize_all(&mut self, except: Option<usize>) -> Result<()> {
        self.materialize_range(0, except)
    }

    /// Capture every buffered header and release the buffer.
    pub fn detach_buffer(&mut self) -> Result<()> {
        self.materialize_all(None)?;
        self.release_unused_buffer();
        Ok(())
    }

    /// Nodes and attributes skipped so far while positioning buffered cursors.
    pub fn skip_usage(&self) -> SkipCounter {
        self.skip_usage
    }

    /// The representation of every entry, with buffered entries captured in one
    /// pass. The collection itself is left unchanged.
    pub(crate) fn standalone_representations(&self) -> Result<Vec<Representation>> {
        let mut wanted: Vec<(usize, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry.repr {
                Representation::Buffered { slot } => Some((slot, index)),
                _ => None,
            })
            .collect();

        let mut reprs: Vec<Representation> = self.entries.iter().map(|e| e.repr.clone()).collect();
        if wanted.is_empty() {
            return Ok(reprs);
        }
        wanted.sort_unstable();

        let buffer = self.buffer.as_ref().ok_or_else(missing_buffer)?;
        let captures = capture_slots(
            buffer.message_bytes(),
            self.version.envelope,
            &buffer.quotas(),
            &wanted,
        )?;
        for (index, captured) in captures {
            reprs[index] = Representation::Readable(Arc::new(captured));
        }
        Ok(reprs)
    }

    pub(crate) fn materialize_range(&mut self, from: usize, except: Option<usize>) -> Result<()> {
        if self.buffer.is_none() {
            return Ok(());
        }

        let indices = (from..self.entries.len())
            .filter(|i| Some(*i) != except && self.entries[*i].is_buffered())
            .collect();
        self.capture_buffered(indices)
    }

    pub(crate) fn release_unused_buffer(&mut self) {
        if self.buffer.is_some() && !self.entries.iter().any(|e| e.is_buffered()) {
            self.buffer = None;
            debug!(headers = self.entries.len(), "Released message buffer");
        }
    }

    fn budget_exceeded(&self) -> bool {
        self.skip_usage.nodes > self.budget.max_buffered_header_nodes
            || self.skip_usage.attributes > self.budget.max_buffered_header_attributes
    }

    fn capture_buffered(&mut self, indices: Vec<usize>) -> Result<()> {
        let mut wanted: Vec<(usize, usize)> = indices
            .into_iter()
            .filter_map(|index| match self.entries[index].repr {
                Representation::Buffered { slot } => Some((slot, index)),
                _ => None,
            })
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        wanted.sort_unstable();

        let buffer = self.buffer.clone().ok_or_else(missing_buffer)?;
        let captures = capture_slots(
            buffer.message_bytes(),
            self.version.envelope,
            &buffer.quotas(),
            &wanted,
        )?;
        for (index, captured) in captures {
            self.entries[index].repr = Representation::Readable(Arc::new(captured));
        }
        self.mutation_count += 1;
        self.release_unused_buffer();
        Ok(())
    }
}

/// Serialize a writable header into a standalone capture.
pub(crate) fn capture_writable(header: &dyn MessageHeader, version: MessageVersion) -> Result<CapturedHeader> {
    let mut out = Vec::new();
    {
        let sink: &mut dyn Write = &mut out;
        let mut writer = Writer::new(sink);
        header.write_header(&mut writer, version)?;
    }
    Ok(CapturedHeader::from_bytes(out))
}

/// Open a cursor at header `slot` of a buffered message, counting the skipped siblings.
pub(crate) fn open_buffered<'a>(
    bytes: &'a [u8],
    envelope: EnvelopeVersion,
    slot: usize,
    counter: &mut SkipCounter,
) -> Result<HeaderCursor<'a>> {
    let mut block = HeaderBlock::open(bytes, envelope)?.ok_or_else(|| slot_missing(slot))?;
    let mut ordinal = 0;
    while let Some((start, empty)) = block.next_element()? {
        if ordinal == slot {
            return Ok(block.into_cursor(start, empty));
        }
        block.skip_element(&start, empty, counter)?;
        ordinal += 1;
    }
    Err(slot_missing(slot))
}

/// Capture the wanted `(slot, index)` pairs, sorted by slot, in one pass.
fn capture_slots(
    bytes: &[u8],
    envelope: EnvelopeVersion,
    quotas: &ReaderQuotas,
    wanted: &[(usize, usize)],
) -> Result<Vec<(usize, CapturedHeader)>> {
    let mut block = HeaderBlock::open(bytes, envelope)?.ok_or_else(|| slot_missing(wanted[0].0))?;
    let mut scratch = SkipCounter::default();
    let mut captures = Vec::with_capacity(wanted.len());
    let mut pending = wanted.iter().peekable();
    let mut ordinal = 0;

    while let Some(&&(slot, index)) = pending.peek() {
        let Some((start, empty)) = block.next_element()? else {
            return Err(slot_missing(slot));
        };
        if ordinal == slot {
            let captured = block.with_cursor(start, empty, |cursor| cursor.capture(Some(quotas)))?;
            captures.push((index, captured));
            pending.next();
        } else {
            block.skip_element(&start, empty, &mut scratch)?;
        }
        ordinal += 1;
    }
    Ok(captures)
}

fn slot_missing(slot: usize) -> HeaderError {
    HeaderError::XmlParse(format!("buffered header {} not found in message", slot))
}
