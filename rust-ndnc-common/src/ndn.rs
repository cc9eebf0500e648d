//! NDN packet types and structures.
//!
//! This module provides the core data structures that represent NDN packets
//! in the rust-ndnc implementation: hierarchical names, Interest and Data
//! packets, signature metadata, and the ForwardingEntry payload used by the
//! legacy prefix-registration exchange.

use crate::error::Error;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Maximum length of an NDN name component.
pub const MAX_NAME_COMPONENT_LENGTH: usize = 255;
/// Maximum size of an NDN packet.
pub const MAX_NDN_PACKET_SIZE: usize = 8800;

/* ---------------------------------------------------------------- *\
 * Name and NameComponent
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses one URI segment, resolving `%XX` percent-escapes.
    ///
    /// Malformed escapes are kept literally rather than rejected; name
    /// parsing is infallible.
    pub fn from_escaped(segment: &str) -> Self {
        fn hex_digit(b: u8) -> Option<u8> {
            match b {
                b'0'..=b'9' => Some(b - b'0'),
                b'a'..=b'f' => Some(b - b'a' + 10),
                b'A'..=b'F' => Some(b - b'A' + 10),
                _ => None,
            }
        }

        let raw = segment.as_bytes();
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'%' && i + 2 < raw.len() {
                if let (Some(hi), Some(lo)) = (hex_digit(raw[i + 1]), hex_digit(raw[i + 2])) {
                    out.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
            }
            out.push(raw[i]);
            i += 1;
        }
        Self(Bytes::from(out))
    }

    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(tlv::TLV_COMPONENT, self.0.clone())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_COMPONENT {
            return Err(Error::NdnPacket(format!(
                "Expected name component TLV type {}, got {}",
                tlv::TLV_COMPONENT,
                element.tlv_type
            )));
        }
        Ok(Self(element.value.clone()))
    }
}

impl fmt::Display for NameComponent {
    /// NDN URI form: unreserved bytes verbatim, everything else `%XX`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parses an NDN URI such as `/app/video/%00%01`.
    pub fn from_uri(uri: &str) -> Self {
        let components = uri
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(NameComponent::from_escaped)
            .collect();
        Self { components }
    }

    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// First `len` components as a new Name.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// True iff `self` is no longer than `other` and the leading components
    /// are pairwise byte-equal.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }
        TlvElement::new(tlv::TLV_NAME, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_NAME {
            return Err(Error::NdnPacket(format!(
                "Expected name TLV type {}, got {}",
                tlv::TLV_NAME,
                element.tlv_type
            )));
        }

        let mut components = Vec::new();
        let mut buf = element.value.clone();
        while buf.has_remaining() {
            let e = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&e)?);
        }
        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new()
    }
}

impl Ord for Name {
    /// Shorter names order first; names of equal length compare
    /// componentwise bytewise. Used for display and test determinism only;
    /// matching never depends on this order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.components
            .len()
            .cmp(&other.components.len())
            .then_with(|| self.components.cmp(&other.components))
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/* ---------------------------------------------------------------- *\
 * Interest
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub nonce: u32,
    /// Lifetime in milliseconds; negative means unspecified.
    pub lifetime_ms: i64,
    /// Propagation scope; `Some(1)` restricts to the local hop.
    pub scope: Option<u8>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        use std::time::{Duration, SystemTime, UNIX_EPOCH};

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        let nonce = (now.as_millis() % u32::MAX as u128) as u32;

        Self {
            name,
            nonce,
            lifetime_ms: -1,
            scope: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime_ms: i64) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }
    pub fn with_scope(mut self, scope: u8) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Interest-to-Data matching: the Interest name must be a prefix of the
    /// Data name.
    pub fn matches_name(&self, name: &Name) -> bool {
        self.name.is_prefix_of(name)
    }

    pub fn to_wire(&self) -> Result<Bytes, Error> {
        let mut inner = BytesMut::new();
        self.name.to_tlv().encode(&mut inner);

        let mut nonce = BytesMut::with_capacity(4);
        nonce.extend_from_slice(&self.nonce.to_be_bytes());
        TlvElement::new(tlv::TLV_NONCE, nonce.freeze()).encode(&mut inner);

        if let Some(scope) = self.scope {
            let mut value = BytesMut::new();
            tlv::encode_non_negative(scope as u64, &mut value);
            TlvElement::new(tlv::TLV_SCOPE, value.freeze()).encode(&mut inner);
        }

        if self.lifetime_ms >= 0 {
            let mut value = BytesMut::new();
            tlv::encode_non_negative(self.lifetime_ms as u64, &mut value);
            TlvElement::new(tlv::TLV_INTEREST_LIFETIME, value.freeze()).encode(&mut inner);
        }

        let mut buf = BytesMut::new();
        TlvElement::new(tlv::TLV_INTEREST, inner.freeze()).encode(&mut buf);
        Ok(buf.freeze())
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(bytes);
        let outer = TlvElement::decode(&mut buf)?;
        if outer.tlv_type != tlv::TLV_INTEREST {
            return Err(Error::NdnPacket(format!(
                "Expected Interest TLV type {}, got {}",
                tlv::TLV_INTEREST,
                outer.tlv_type
            )));
        }

        let mut name = None;
        let mut nonce = 0u32;
        let mut lifetime_ms = -1i64;
        let mut scope = None;

        let mut inner = outer.value.clone();
        while inner.has_remaining() {
            let element = TlvElement::decode(&mut inner)?;
            match element.tlv_type {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&element)?),
                tlv::TLV_NONCE => {
                    nonce = tlv::decode_non_negative(&element.value)? as u32;
                }
                tlv::TLV_SCOPE => {
                    scope = Some(tlv::decode_non_negative(&element.value)? as u8);
                }
                tlv::TLV_INTEREST_LIFETIME => {
                    lifetime_ms = tlv::decode_non_negative(&element.value)? as i64;
                }
                // Unrecognized fields are tolerated and skipped.
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::NdnPacket("Interest without a name".into()))?;
        Ok(Self {
            name,
            nonce,
            lifetime_ms,
            scope,
        })
    }
}

/* ---------------------------------------------------------------- *\
 * Signature metadata
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureType {
    DigestSha256,
    Sha256WithRsa,
}

impl SignatureType {
    pub fn code(self) -> u64 {
        match self {
            SignatureType::DigestSha256 => 0,
            SignatureType::Sha256WithRsa => 1,
        }
    }

    pub fn from_code(code: u64) -> Result<Self, Error> {
        match code {
            0 => Ok(SignatureType::DigestSha256),
            1 => Ok(SignatureType::Sha256WithRsa),
            other => Err(Error::NdnPacket(format!(
                "Unknown signature type: {}",
                other
            ))),
        }
    }
}

/// Key locator in its KeyDigest form: the SHA-256 digest of the signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLocator {
    pub key_digest: Bytes,
}

impl KeyLocator {
    pub fn new(key_digest: impl Into<Bytes>) -> Self {
        Self {
            key_digest: key_digest.into(),
        }
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut inner = BytesMut::new();
        TlvElement::new(tlv::TLV_KEY_DIGEST, self.key_digest.clone()).encode(&mut inner);
        TlvElement::new(tlv::TLV_KEY_LOCATOR, inner.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_KEY_LOCATOR {
            return Err(Error::NdnPacket(format!(
                "Expected key locator TLV type {}, got {}",
                tlv::TLV_KEY_LOCATOR,
                element.tlv_type
            )));
        }
        let mut inner = element.value.clone();
        let digest = TlvElement::decode(&mut inner)?;
        if digest.tlv_type != tlv::TLV_KEY_DIGEST {
            return Err(Error::NdnPacket(format!(
                "Expected key digest TLV type {}, got {}",
                tlv::TLV_KEY_DIGEST,
                digest.tlv_type
            )));
        }
        Ok(Self {
            key_digest: digest.value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: SignatureType,
    pub key_locator: Option<KeyLocator>,
}

impl SignatureInfo {
    pub fn new(signature_type: SignatureType) -> Self {
        Self {
            signature_type,
            key_locator: None,
        }
    }

    pub fn with_key_locator(mut self, key_locator: KeyLocator) -> Self {
        self.key_locator = Some(key_locator);
        self
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut inner = BytesMut::new();
        let mut code = BytesMut::new();
        tlv::encode_non_negative(self.signature_type.code(), &mut code);
        TlvElement::new(tlv::TLV_SIGNATURE_TYPE, code.freeze()).encode(&mut inner);
        if let Some(locator) = &self.key_locator {
            locator.to_tlv().encode(&mut inner);
        }
        TlvElement::new(tlv::TLV_SIGNATURE_INFO, inner.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_SIGNATURE_INFO {
            return Err(Error::NdnPacket(format!(
                "Expected signature info TLV type {}, got {}",
                tlv::TLV_SIGNATURE_INFO,
                element.tlv_type
            )));
        }
        let mut signature_type = SignatureType::DigestSha256;
        let mut key_locator = None;
        let mut inner = element.value.clone();
        while inner.has_remaining() {
            let field = TlvElement::decode(&mut inner)?;
            match field.tlv_type {
                tlv::TLV_SIGNATURE_TYPE => {
                    signature_type =
                        SignatureType::from_code(tlv::decode_non_negative(&field.value)?)?;
                }
                tlv::TLV_KEY_LOCATOR => key_locator = Some(KeyLocator::from_tlv(&field)?),
                _ => {}
            }
        }
        Ok(Self {
            signature_type,
            key_locator,
        })
    }
}

impl Default for SignatureInfo {
    fn default() -> Self {
        Self::new(SignatureType::DigestSha256)
    }
}

/* ---------------------------------------------------------------- *\
 * Data
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content: Bytes,
    /// Freshness period in milliseconds; negative means unspecified.
    pub freshness_period_ms: i64,
    pub signature_info: SignatureInfo,
    pub signature_value: Bytes,
}

impl Data {
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            freshness_period_ms: -1,
            signature_info: SignatureInfo::default(),
            signature_value: Bytes::new(),
        }
    }

    pub fn with_freshness_period(mut self, freshness_period_ms: i64) -> Self {
        self.freshness_period_ms = freshness_period_ms;
        self
    }

    pub fn with_signature(mut self, info: SignatureInfo, value: impl Into<Bytes>) -> Self {
        self.signature_info = info;
        self.signature_value = value.into();
        self
    }

    pub fn to_wire(&self) -> Result<Bytes, Error> {
        let mut inner = BytesMut::new();
        self.name.to_tlv().encode(&mut inner);

        if self.freshness_period_ms >= 0 {
            let mut meta = BytesMut::new();
            let mut period = BytesMut::new();
            tlv::encode_non_negative(self.freshness_period_ms as u64, &mut period);
            TlvElement::new(tlv::TLV_FRESHNESS_PERIOD, period.freeze()).encode(&mut meta);
            TlvElement::new(tlv::TLV_META_INFO, meta.freeze()).encode(&mut inner);
        }

        TlvElement::new(tlv::TLV_CONTENT, self.content.clone()).encode(&mut inner);
        self.signature_info.to_tlv().encode(&mut inner);
        TlvElement::new(tlv::TLV_SIGNATURE_VALUE, self.signature_value.clone())
            .encode(&mut inner);

        let mut buf = BytesMut::new();
        TlvElement::new(tlv::TLV_DATA, inner.freeze()).encode(&mut buf);
        Ok(buf.freeze())
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(bytes);
        let outer = TlvElement::decode(&mut buf)?;
        if outer.tlv_type != tlv::TLV_DATA {
            return Err(Error::NdnPacket(format!(
                "Expected Data TLV type {}, got {}",
                tlv::TLV_DATA,
                outer.tlv_type
            )));
        }

        let mut name = None;
        let mut content = Bytes::new();
        let mut freshness_period_ms = -1i64;
        let mut signature_info = SignatureInfo::default();
        let mut signature_value = Bytes::new();

        let mut inner = outer.value.clone();
        while inner.has_remaining() {
            let element = TlvElement::decode(&mut inner)?;
            match element.tlv_type {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&element)?),
                tlv::TLV_META_INFO => {
                    let mut meta = element.value.clone();
                    while meta.has_remaining() {
                        let field = TlvElement::decode(&mut meta)?;
                        if field.tlv_type == tlv::TLV_FRESHNESS_PERIOD {
                            freshness_period_ms = tlv::decode_non_negative(&field.value)? as i64;
                        }
                    }
                }
                tlv::TLV_CONTENT => content = element.value.clone(),
                tlv::TLV_SIGNATURE_INFO => {
                    signature_info = SignatureInfo::from_tlv(&element)?;
                }
                tlv::TLV_SIGNATURE_VALUE => signature_value = element.value.clone(),
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::NdnPacket("Data without a name".into()))?;
        Ok(Self {
            name,
            content,
            freshness_period_ms,
            signature_info,
            signature_value,
        })
    }
}

/* ---------------------------------------------------------------- *\
 * ForwardingEntry
\* ---------------------------------------------------------------- */

/// Flags carried in a prefix registration, mirroring the legacy forwarder
/// flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingFlags(u32);

impl ForwardingFlags {
    pub const ACTIVE: u32 = 0x01;
    pub const CHILD_INHERIT: u32 = 0x02;
    pub const CAPTURE: u32 = 0x10;
    pub const LOCAL: u32 = 0x20;

    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

impl Default for ForwardingFlags {
    fn default() -> Self {
        Self(Self::ACTIVE | Self::CHILD_INHERIT)
    }
}

/// The registration instruction a client sends to its forwarder, carried as
/// the content of a self-registration Data packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingEntry {
    pub action: String,
    pub prefix: Name,
    /// Face the registration applies to; negative means the requesting face.
    pub face_id: i64,
    pub flags: ForwardingFlags,
    /// Registration lifetime in milliseconds; negative means unspecified.
    pub freshness_period_ms: i64,
}

impl ForwardingEntry {
    pub fn to_tlv(&self) -> TlvElement {
        let mut inner = BytesMut::new();
        TlvElement::new(tlv::TLV_ACTION, Bytes::from(self.action.clone().into_bytes()))
            .encode(&mut inner);
        self.prefix.to_tlv().encode(&mut inner);
        // Negative face id and freshness mean unspecified and are omitted.
        if self.face_id >= 0 {
            let mut value = BytesMut::new();
            tlv::encode_non_negative(self.face_id as u64, &mut value);
            TlvElement::new(tlv::TLV_FACE_ID, value.freeze()).encode(&mut inner);
        }
        let mut flags = BytesMut::new();
        tlv::encode_non_negative(self.flags.bits() as u64, &mut flags);
        TlvElement::new(tlv::TLV_FORWARDING_FLAGS, flags.freeze()).encode(&mut inner);
        if self.freshness_period_ms >= 0 {
            let mut period = BytesMut::new();
            tlv::encode_non_negative(self.freshness_period_ms as u64, &mut period);
            TlvElement::new(tlv::TLV_FRESHNESS_PERIOD, period.freeze()).encode(&mut inner);
        }
        TlvElement::new(tlv::TLV_FORWARDING_ENTRY, inner.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_FORWARDING_ENTRY {
            return Err(Error::NdnPacket(format!(
                "Expected forwarding entry TLV type {}, got {}",
                tlv::TLV_FORWARDING_ENTRY,
                element.tlv_type
            )));
        }

        let mut action = String::new();
        let mut prefix = None;
        let mut face_id = -1i64;
        let mut flags = ForwardingFlags::default();
        let mut freshness_period_ms = -1i64;

        let mut inner = element.value.clone();
        while inner.has_remaining() {
            let field = TlvElement::decode(&mut inner)?;
            match field.tlv_type {
                tlv::TLV_ACTION => {
                    action = String::from_utf8_lossy(&field.value).into_owned();
                }
                tlv::TLV_NAME => prefix = Some(Name::from_tlv(&field)?),
                tlv::TLV_FACE_ID => {
                    face_id = tlv::decode_non_negative(&field.value)? as i64;
                }
                tlv::TLV_FORWARDING_FLAGS => {
                    flags = ForwardingFlags::new(tlv::decode_non_negative(&field.value)? as u32);
                }
                tlv::TLV_FRESHNESS_PERIOD => {
                    freshness_period_ms = tlv::decode_non_negative(&field.value)? as i64;
                }
                _ => {}
            }
        }

        let prefix =
            prefix.ok_or_else(|| Error::NdnPacket("ForwardingEntry without a prefix".into()))?;
        Ok(Self {
            action,
            prefix,
            face_id,
            flags,
            freshness_period_ms,
        })
    }
}
