//! WS-Addressing header values and the built-in writable addressing headers.

use crate::buffer::HeaderCursor;
use crate::classify::HeaderKind;
use crate::error::{write_error, HeaderError, Result};
use crate::header::{standard_start_element, MessageHeader, XmlWriter};
use crate::version::{AddressingVersion, MessageVersion};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

/// Anonymous endpoint address for WS-Addressing 1.0.
pub const ANONYMOUS_ADDRESS_10: &str = "http://www.w3.org/2005/08/addressing/anonymous";
/// Anonymous endpoint address for the August 2004 submission.
pub const ANONYMOUS_ADDRESS_2004: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

/// An endpoint reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointAddress {
    pub address: String,
    /// Raw markup of the ReferenceParameters element, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_parameters: Option<String>,
}

impl EndpointAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reference_parameters: None,
        }
    }

    pub fn anonymous(version: AddressingVersion) -> Self {
        match version {
            AddressingVersion::August2004 => Self::new(ANONYMOUS_ADDRESS_2004),
            _ => Self::new(ANONYMOUS_ADDRESS_10),
        }
    }

    pub fn with_reference_parameters(mut self, xml: impl Into<String>) -> Self {
        self.reference_parameters = Some(xml.into());
        self
    }

    fn read(cursor: &mut HeaderCursor<'_>, version: AddressingVersion) -> Result<Self> {
        let ns = version.namespace();
        let mut address = None;
        let mut reference_parameters = None;

        while let Some(event) = cursor.next_event()? {
            match event {
                Event::Start(e) => {
                    let (child_ns, local) = cursor.resolve(e.name());
                    if child_ns == ns && local == "Address" {
                        address = Some(cursor.read_text()?);
                    } else if child_ns == ns && local == "ReferenceParameters" {
                        reference_parameters = Some(cursor.read_inner_xml(&e)?);
                    } else {
                        cursor.skip_child(&e)?;
                    }
                }
                Event::Empty(e) => {
                    let (child_ns, local) = cursor.resolve(e.name());
                    if child_ns == ns && local == "Address" {
                        address = Some(String::new());
                    }
                }
                _ => {}
            }
        }

        let address = address.ok_or_else(|| {
            HeaderError::XmlParse(format!(
                "endpoint reference '{}' has no Address element",
                cursor.local_name()
            ))
        })?;
        Ok(Self {
            address,
            reference_parameters,
        })
    }

    fn write(&self, writer: &mut XmlWriter<'_>, prefix: &str) -> Result<()> {
        write_text_element(writer, &format!("{}:Address", prefix), &self.address)?;
        if let Some(params) = &self.reference_parameters {
            let name = format!("{}:ReferenceParameters", prefix);
            writer
                .write_event(Event::Start(BytesStart::new(name.as_str())))
                .map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::from_escaped(params.as_str())))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name.as_str())))
                .map_err(write_error)?;
        }
        Ok(())
    }
}

fn write_text_element(writer: &mut XmlWriter<'_>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_error)
}

/// Parsed value of a well-known addressing header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingValue {
    To(String),
    Action(String),
    MessageId(String),
    RelatesTo {
        relationship_type: String,
        message_id: String,
    },
    ReplyTo(EndpointAddress),
    From(EndpointAddress),
    FaultTo(EndpointAddress),
}

impl AddressingValue {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Self::To(_) => HeaderKind::To,
            Self::Action(_) => HeaderKind::Action,
            Self::MessageId(_) => HeaderKind::MessageId,
            Self::RelatesTo { .. } => HeaderKind::RelatesTo,
            Self::ReplyTo(_) => HeaderKind::ReplyTo,
            Self::From(_) => HeaderKind::From,
            Self::FaultTo(_) => HeaderKind::FaultTo,
        }
    }

    /// Read the value of a header of `kind` from an unread cursor.
    pub fn read(kind: HeaderKind, cursor: &mut HeaderCursor<'_>, version: AddressingVersion) -> Result<Option<Self>> {
        let value = match kind {
            HeaderKind::To => Self::To(cursor.read_text()?),
            HeaderKind::Action => Self::Action(cursor.read_text()?),
            HeaderKind::MessageId => Self::MessageId(cursor.read_text()?),
            HeaderKind::RelatesTo => {
                let relationship_type = cursor
                    .attribute("RelationshipType", "")
                    .map(|rel| rel.trim().to_string())
                    .filter(|rel| !rel.is_empty())
                    .unwrap_or_else(|| version.reply_relationship_type().to_string());
                Self::RelatesTo {
                    relationship_type,
                    message_id: cursor.read_text()?,
                }
            }
            HeaderKind::ReplyTo => Self::ReplyTo(EndpointAddress::read(cursor, version)?),
            HeaderKind::From => Self::From(EndpointAddress::read(cursor, version)?),
            HeaderKind::FaultTo => Self::FaultTo(EndpointAddress::read(cursor, version)?),
            HeaderKind::Unknown => return Ok(None),
        };
        Ok(Some(value))
    }

    pub fn relationship_type(&self) -> Option<&str> {
        match self {
            Self::RelatesTo {
                relationship_type, ..
            } => Some(relationship_type),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::To(text) | Self::Action(text) | Self::MessageId(text) => Some(text),
            Self::RelatesTo { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    pub fn as_endpoint(&self) -> Option<&EndpointAddress> {
        match self {
            Self::ReplyTo(epr) | Self::From(epr) | Self::FaultTo(epr) => Some(epr),
            _ => None,
        }
    }
}

/// A writable well-known addressing header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressingHeader {
    version: AddressingVersion,
    value: AddressingValue,
}

impl AddressingHeader {
    pub fn new(version: AddressingVersion, value: AddressingValue) -> Self {
        Self { version, value }
    }

    pub fn to(version: AddressingVersion, uri: impl Into<String>) -> Self {
        Self::new(version, AddressingValue::To(uri.into()))
    }

    pub fn action(version: AddressingVersion, action: impl Into<String>) -> Self {
        Self::new(version, AddressingValue::Action(action.into()))
    }

    pub fn message_id(version: AddressingVersion, id: impl Into<String>) -> Self {
        Self::new(version, AddressingValue::MessageId(id.into()))
    }

    /// RelatesTo with the version's reply relationship.
    pub fn relates_to(version: AddressingVersion, id: impl Into<String>) -> Self {
        Self::relates_to_with(version, version.reply_relationship_type(), id)
    }

    pub fn relates_to_with(
        version: AddressingVersion,
        relationship_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::new(
            version,
            AddressingValue::RelatesTo {
                relationship_type: relationship_type.into(),
                message_id: id.into(),
            },
        )
    }

    pub fn reply_to(version: AddressingVersion, epr: EndpointAddress) -> Self {
        Self::new(version, AddressingValue::ReplyTo(epr))
    }

    pub fn from(version: AddressingVersion, epr: EndpointAddress) -> Self {
        Self::new(version, AddressingValue::From(epr))
    }

    pub fn fault_to(version: AddressingVersion, epr: EndpointAddress) -> Self {
        Self::new(version, AddressingValue::FaultTo(epr))
    }

    pub fn value(&self) -> &AddressingValue {
        &self.value
    }

    pub fn kind(&self) -> HeaderKind {
        self.value.kind()
    }

    pub fn addressing_version(&self) -> AddressingVersion {
        self.version
    }
}

impl MessageHeader for AddressingHeader {
    fn name(&self) -> &str {
        self.kind().local_name().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.version.namespace()
    }

    fn must_understand(&self) -> bool {
        matches!(self.value, AddressingValue::To(_) | AddressingValue::Action(_))
    }

    fn is_message_version_supported(&self, version: MessageVersion) -> bool {
        version.addressing == self.version
    }

    fn prefix(&self) -> &str {
        "a"
    }

    fn start_element(&self, version: MessageVersion) -> BytesStart<'static> {
        let mut start = standard_start_element(self, version);
        if let AddressingValue::RelatesTo {
            relationship_type, ..
        } = &self.value
        {
            if relationship_type != self.version.reply_relationship_type() {
                start.push_attribute(("RelationshipType", relationship_type.as_str()));
            }
        }
        start
    }

    fn write_header_contents(&self, writer: &mut XmlWriter<'_>, _version: MessageVersion) -> Result<()> {
        match &self.value {
            AddressingValue::To(text) | AddressingValue::Action(text) | AddressingValue::MessageId(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error),
            AddressingValue::RelatesTo { message_id, .. } => writer
                .write_event(Event::Text(BytesText::new(message_id)))
                .map_err(write_error),
            AddressingValue::ReplyTo(epr) | AddressingValue::From(epr) | AddressingValue::FaultTo(epr) => {
                epr.write(writer, self.prefix())
            }
        }
    }

    fn as_addressing(&self) -> Option<&AddressingHeader> {
        Some(self)
    }
}
