//! Host selection policies
//!
//! Selection is a pure function of the listing, the preference policy and the
//! local identity. Listing order is the order the registry returned; it is
//! treated as arbitrary but stable for one response.

use crate::types::{HostPreference, HostRecord, LocalIdentity, SessionListing};

/// Trait for choosing a session to join out of a listing
pub trait HostSelector: Send + Sync {
    /// Pick a host, or `None` when nothing in the listing qualifies
    ///
    /// With `symmetry_break` set, only hosts whose identity orders strictly
    /// after `self_identity` are eligible.
    fn select<'a>(
        &self,
        listing: &'a SessionListing,
        preference: HostPreference,
        self_identity: &LocalIdentity,
        symmetry_break: bool,
    ) -> Option<&'a HostRecord>;
}

/// Selector implementing the `HostPreference` policies
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyHostSelector;

impl PolicyHostSelector {
    pub fn new() -> Self {
        Self
    }
}

impl HostSelector for PolicyHostSelector {
    fn select<'a>(
        &self,
        listing: &'a SessionListing,
        preference: HostPreference,
        self_identity: &LocalIdentity,
        symmetry_break: bool,
    ) -> Option<&'a HostRecord> {
        select_host(listing, preference, self_identity, symmetry_break)
    }
}

/// Tie-break predicate: does `candidate` win over `self_identity`?
///
/// Both sides evaluate the same total order, so for two distinct identities
/// exactly one of them yields and joins the other.
pub fn outranks(candidate: &str, self_identity: &LocalIdentity) -> bool {
    candidate != self_identity.as_str() && candidate > self_identity.as_str()
}

/// Whether `host` may be joined at all under the given tie-break setting
pub fn is_eligible(host: &HostRecord, self_identity: &LocalIdentity, symmetry_break: bool) -> bool {
    host.has_room() && (!symmetry_break || outranks(&host.identity, self_identity))
}

/// Choose a host from `listing` according to `preference`
pub fn select_host<'a>(
    listing: &'a SessionListing,
    preference: HostPreference,
    self_identity: &LocalIdentity,
    symmetry_break: bool,
) -> Option<&'a HostRecord> {
    let mut eligible = listing
        .iter()
        .filter(|host| is_eligible(host, self_identity, symmetry_break));

    match preference {
        HostPreference::FirstAvailable => eligible.next(),
        HostPreference::MostConnectedPeers => {
            // Strict comparison keeps the earliest record among equals.
            eligible.fold(None, |best: Option<&HostRecord>, host| match best {
                Some(current) if current.connected_peer_count >= host.connected_peer_count => {
                    Some(current)
                }
                _ => Some(host),
            })
        }
    }
}
