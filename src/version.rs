//! Envelope and addressing versions, and the policy deciding which header kinds
//! each (envelope, addressing) pair admits.

use crate::classify::HeaderKind;
use crate::error::{HeaderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// Namespace used for messages that carry no envelope.
pub const ENVELOPE_NONE_NS: &str = "http://schemas.microsoft.com/ws/2005/05/envelope/none";

/// WS-Addressing August 2004 namespace.
pub const WSA_2004_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
/// WS-Addressing 1.0 namespace.
pub const WSA_10_NS: &str = "http://www.w3.org/2005/08/addressing";
/// Namespace for in-memory addressing headers with addressing disabled.
pub const ADDRESSING_NONE_NS: &str = "http://schemas.microsoft.com/ws/2005/05/addressing/none";

/// SOAP 1.1 "next" actor.
pub const SOAP_11_NEXT_ACTOR: &str = "http://schemas.xmlsoap.org/soap/actor/next";
/// SOAP 1.2 "next" role.
pub const SOAP_12_NEXT_ROLE: &str = "http://www.w3.org/2003/05/soap-envelope/role/next";
/// SOAP 1.2 "ultimateReceiver" role.
pub const SOAP_12_ULTIMATE_RECEIVER_ROLE: &str =
    "http://www.w3.org/2003/05/soap-envelope/role/ultimateReceiver";

/// SOAP envelope versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EnvelopeVersion {
    /// No envelope (plain XML over the transport)
    #[serde(rename = "none")]
    None,
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[default]
    #[serde(rename = "1.2")]
    Soap12,
}

impl EnvelopeVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            Self::None => ENVELOPE_NONE_NS,
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Local name of the targeting attribute.
    pub fn actor_attribute(self) -> &'static str {
        match self {
            Self::Soap12 => "role",
            Self::Soap11 | Self::None => "actor",
        }
    }

    /// Actor values that address the ultimate receiver of the message.
    pub fn ultimate_destination_actors(self) -> &'static [&'static str] {
        match self {
            Self::None | Self::Soap11 => &[""],
            Self::Soap12 => &["", SOAP_12_ULTIMATE_RECEIVER_ROLE],
        }
    }

    /// Actor values for which this node must understand MustUnderstand headers.
    pub fn must_understand_actors(self) -> &'static [&'static str] {
        match self {
            Self::None => &[""],
            Self::Soap11 => &["", SOAP_11_NEXT_ACTOR],
            Self::Soap12 => &["", SOAP_12_ULTIMATE_RECEIVER_ROLE, SOAP_12_NEXT_ROLE],
        }
    }

    pub fn is_ultimate_destination_actor(self, actor: &str) -> bool {
        self.ultimate_destination_actors().contains(&actor)
    }

    /// Look up a version from its envelope namespace URI.
    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }
}

impl fmt::Display for EnvelopeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "EnvelopeNone ({})", self.namespace()),
            Self::Soap11 => write!(f, "Soap11 ({})", self.namespace()),
            Self::Soap12 => write!(f, "Soap12 ({})", self.namespace()),
        }
    }
}

/// WS-Addressing versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressingVersion {
    /// Addressing disabled
    #[serde(rename = "none")]
    None,
    /// WS-Addressing August 2004 submission
    #[serde(rename = "2004")]
    August2004,
    /// WS-Addressing 1.0 (2005/08)
    #[default]
    #[serde(rename = "2005")]
    WsAddressing10,
}

impl AddressingVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            Self::None => ADDRESSING_NONE_NS,
            Self::August2004 => WSA_2004_NS,
            Self::WsAddressing10 => WSA_10_NS,
        }
    }

    /// Relationship type implied by a RelatesTo header without a RelationshipType attribute.
    pub fn reply_relationship_type(self) -> &'static str {
        match self {
            Self::August2004 => "http://schemas.xmlsoap.org/ws/2004/08/addressing/reply",
            Self::WsAddressing10 | Self::None => "http://www.w3.org/2005/08/addressing/reply",
        }
    }

    /// Whether reference parameters are flagged with `IsReferenceParameter`.
    pub fn marks_reference_parameters(self) -> bool {
        matches!(self, Self::WsAddressing10)
    }
}

impl fmt::Display for AddressingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "AddressingNone ({})", self.namespace()),
            Self::August2004 => write!(f, "Addressing200408 ({})", self.namespace()),
            Self::WsAddressing10 => write!(f, "Addressing10 ({})", self.namespace()),
        }
    }
}

/// The (envelope, addressing) pair a header collection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MessageVersion {
    pub envelope: EnvelopeVersion,
    pub addressing: AddressingVersion,
}

impl MessageVersion {
    pub const NONE: Self = Self::new(EnvelopeVersion::None, AddressingVersion::None);
    pub const SOAP11: Self = Self::new(EnvelopeVersion::Soap11, AddressingVersion::None);
    pub const SOAP12: Self = Self::new(EnvelopeVersion::Soap12, AddressingVersion::None);
    pub const SOAP11_WSA_2004: Self =
        Self::new(EnvelopeVersion::Soap11, AddressingVersion::August2004);
    pub const SOAP11_WSA10: Self = Self::new(EnvelopeVersion::Soap11, AddressingVersion::WsAddressing10);
    pub const SOAP12_WSA_2004: Self =
        Self::new(EnvelopeVersion::Soap12, AddressingVersion::August2004);
    pub const SOAP12_WSA10: Self = Self::new(EnvelopeVersion::Soap12, AddressingVersion::WsAddressing10);

    pub const fn new(envelope: EnvelopeVersion, addressing: AddressingVersion) -> Self {
        Self {
            envelope,
            addressing,
        }
    }
}

impl fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.envelope, self.addressing)
    }
}

/// Pure legality rules for header kinds under a message version.
pub struct VersionPolicy;

impl VersionPolicy {
    /// Whether `kind` may appear in a collection bound to `version`.
    pub fn permits(version: MessageVersion, kind: HeaderKind) -> bool {
        let routing = matches!(kind, HeaderKind::To | HeaderKind::Action);
        if version.envelope == EnvelopeVersion::None && !routing {
            return false;
        }
        if version.addressing == AddressingVersion::None && !routing && kind != HeaderKind::Unknown {
            return false;
        }
        true
    }

    /// Fail with `VersionIncompatible` unless `kind` is legal for `version`.
    pub fn validate(version: MessageVersion, kind: HeaderKind) -> Result<()> {
        if version.envelope == EnvelopeVersion::None
            && !matches!(kind, HeaderKind::To | HeaderKind::Action)
        {
            return Err(HeaderError::VersionIncompatible(format!(
                "envelope version {} does not support adding message headers",
                version.envelope
            )));
        }

        if !Self::permits(version, kind) {
            return Err(HeaderError::VersionIncompatible(format!(
                "addressing version {} does not support adding WS-Addressing headers",
                version.addressing
            )));
        }

        Ok(())
    }

    /// All kinds the version admits, in declaration order.
    pub fn legal_kinds(version: MessageVersion) -> Vec<HeaderKind> {
        HeaderKind::ALL
            .iter()
            .copied()
            .filter(|kind| Self::permits(version, *kind))
            .collect()
    }
}
