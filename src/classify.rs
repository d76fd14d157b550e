//! Classification of headers into the well-known addressing kinds.

use crate::error::Result;
use crate::version::{MessageVersion, VersionPolicy};
use serde::{Deserialize, Serialize};

/// Well-known header kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderKind {
    Action,
    FaultTo,
    From,
    MessageId,
    ReplyTo,
    RelatesTo,
    To,
    /// Anything not recognized as an addressing header
    Unknown,
}

/// Local names of the well-known kinds, indexed by `HeaderKind as usize`.
static WELL_KNOWN_NAMES: [&str; 7] = [
    "Action",
    "FaultTo",
    "From",
    "MessageID",
    "ReplyTo",
    "RelatesTo",
    "To",
];

impl HeaderKind {
    pub const ALL: [HeaderKind; 8] = [
        Self::Action,
        Self::FaultTo,
        Self::From,
        Self::MessageId,
        Self::ReplyTo,
        Self::RelatesTo,
        Self::To,
        Self::Unknown,
    ];

    /// The wire local name of a well-known kind.
    pub fn local_name(self) -> Option<&'static str> {
        WELL_KNOWN_NAMES.get(self as usize).copied()
    }

    /// Kinds limited to one entry per collection. RelatesTo is keyed by relationship type instead.
    pub fn is_singleton(self) -> bool {
        !matches!(self, Self::RelatesTo | Self::Unknown)
    }

    pub fn is_well_known(self) -> bool {
        self != Self::Unknown
    }

    /// Map an addressing-namespace local name to its kind.
    pub fn from_local_name(name: &str) -> Self {
        let candidates: &[Self] = match name.as_bytes().first() {
            Some(b'A') => &[Self::Action],
            Some(b'F') => &[Self::From, Self::FaultTo],
            Some(b'M') => &[Self::MessageId],
            Some(b'R') => &[Self::ReplyTo, Self::RelatesTo],
            Some(b'T') => &[Self::To],
            _ => return Self::Unknown,
        };

        candidates
            .iter()
            .copied()
            .find(|kind| WELL_KNOWN_NAMES[*kind as usize] == name)
            .unwrap_or(Self::Unknown)
    }
}

/// Classify a header by name, namespace and targeted actor, then check that the
/// resulting kind is legal for the version.
///
/// Only headers in the active addressing namespace that target the ultimate
/// destination are classified; everything else is `Unknown`.
pub fn classify(name: &str, namespace: &str, actor: &str, version: MessageVersion) -> Result<HeaderKind> {
    let kind = if namespace == version.addressing.namespace()
        && version.envelope.is_ultimate_destination_actor(actor)
    {
        HeaderKind::from_local_name(name)
    } else {
        HeaderKind::Unknown
    };

    VersionPolicy::validate(version, kind)?;
    Ok(kind)
}
