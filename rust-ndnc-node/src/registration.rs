//! Legacy prefix self-registration protocol.
//!
//! Registering a prefix with the forwarder is a two-step exchange. The
//! client first fetches the forwarder's identity (the "ndnd-ID") with a
//! well-known probe Interest, then sends a self-registration Interest whose
//! *name* carries a wire-encoded ForwardingEntry Data packet as an opaque
//! component. The forwarder never confirms; success is assumed.

use bytes::{Bytes, BytesMut};
use rust_ndnc_common::ndn::{
    Data, ForwardingEntry, ForwardingFlags, Interest, Name, NameComponent, SignatureInfo,
    SignatureType,
};
use rust_ndnc_common::Result;

use crate::rpt::OnInterest;
use crate::DEFAULT_INTEREST_LIFETIME_MS;

/// URI of the probe Interest the local forwarder answers with its key.
pub const NDND_ID_PROBE_URI: &str = "/%C1.M.S.localhost/%C1.M.SRV/ndnd/KEY";

/// Size of the signer digest taken from the probe reply's key locator.
pub const NDND_ID_LEN: usize = 32;

/// Scope of the self-registration Interest: local hop only.
pub const SELFREG_SCOPE: u8 = 1;

/// Callback invoked once if a registration fails.
pub type OnRegisterFailed = Box<dyn FnOnce(&Name) + Send>;

/// A registration accepted from the application but still waiting for the
/// ndnd-ID exchange.
pub struct PendingRegistration {
    pub id: u64,
    pub prefix: Name,
    pub on_interest: OnInterest,
    pub on_register_failed: Option<OnRegisterFailed>,
    pub flags: ForwardingFlags,
}

/// Progress of the ndnd-ID exchange.
#[derive(Default)]
pub enum RegistrationState {
    /// No probe outstanding.
    #[default]
    Idle,
    /// Probe sent; registrations queue here until the reply or the timeout.
    AwaitingNdndId { pending: Vec<PendingRegistration> },
}

impl RegistrationState {
    pub fn is_probing(&self) -> bool {
        matches!(self, RegistrationState::AwaitingNdndId { .. })
    }

    /// Drains the queue and resets to `Idle`.
    pub fn take_pending(&mut self) -> Vec<PendingRegistration> {
        match std::mem::take(self) {
            RegistrationState::AwaitingNdndId { pending } => pending,
            RegistrationState::Idle => Vec::new(),
        }
    }
}

/// Builds the probe Interest that fetches the forwarder identity.
pub fn make_probe_interest() -> Interest {
    Interest::new(Name::from_uri(NDND_ID_PROBE_URI)).with_lifetime(DEFAULT_INTEREST_LIFETIME_MS)
}

/// Extracts the forwarder identity from a probe reply.
///
/// The reply's key locator carries the signer's public-key digest; the
/// leading [`NDND_ID_LEN`] bytes are the ndnd-ID.
pub fn extract_ndnd_id(data: &Data) -> Option<Bytes> {
    let locator = data.signature_info.key_locator.as_ref()?;
    if locator.key_digest.is_empty() {
        return None;
    }
    let len = locator.key_digest.len().min(NDND_ID_LEN);
    Some(locator.key_digest.slice(..len))
}

/// Builds the self-registration Interest for `prefix`.
///
/// The forwarding instruction travels inside the Interest name: a
/// ForwardingEntry wire-encoded as the content of a Data packet whose RSA
/// signature value is intentionally empty (forwarders of this vintage do
/// not verify), appended as an opaque component after
/// `["ndnx", ndnd_id, "selfreg"]`.
pub fn make_selfreg_interest(
    prefix: &Name,
    ndnd_id: &Bytes,
    flags: ForwardingFlags,
) -> Result<Interest> {
    let entry = ForwardingEntry {
        action: "selfreg".to_string(),
        prefix: prefix.clone(),
        face_id: -1,
        flags,
        freshness_period_ms: -1,
    };
    let mut content = BytesMut::new();
    entry.to_tlv().encode(&mut content);

    let payload = Data::new(Name::new(), content.freeze()).with_signature(
        SignatureInfo::new(SignatureType::Sha256WithRsa),
        Bytes::new(),
    );
    let encoded = payload.to_wire()?;

    let mut name = Name::new();
    name.push(NameComponent::new(&b"ndnx"[..]));
    name.push(NameComponent::new(ndnd_id.clone()));
    name.push(NameComponent::new(&b"selfreg"[..]));
    name.push(NameComponent::new(encoded));

    Ok(Interest::new(name).with_scope(SELFREG_SCOPE))
}
