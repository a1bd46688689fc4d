//! Property tests for host selection

use peer_matchmaker::selection::{outranks, select_host};
use peer_matchmaker::types::{HostPreference, HostRecord, LocalIdentity, SessionListing};
use proptest::prelude::*;

fn host_strategy() -> impl Strategy<Value = HostRecord> {
    ("[a-f]{1,3}", 0usize..6, 1usize..6)
        .prop_map(|(identity, connected, limit)| HostRecord::new(identity, connected, limit))
}

fn listing_strategy() -> impl Strategy<Value = SessionListing> {
    prop::collection::vec(host_strategy(), 0..12).prop_map(SessionListing::new)
}

proptest! {
    #[test]
    fn first_available_picks_first_open_record(listing in listing_strategy(), me in "[a-f]{1,3}") {
        let me = LocalIdentity::from(me);
        let expected = listing.iter().find(|host| host.has_room());
        let selected = select_host(&listing, HostPreference::FirstAvailable, &me, false);
        prop_assert_eq!(selected, expected);
    }

    #[test]
    fn full_listing_selects_nothing(hosts in prop::collection::vec(("[a-f]{1,3}", 1usize..6), 0..10)) {
        let listing = SessionListing::new(
            hosts
                .into_iter()
                .map(|(identity, limit)| HostRecord::new(identity, limit, limit))
                .collect(),
        );
        let me = LocalIdentity::from("m");
        for preference in [HostPreference::FirstAvailable, HostPreference::MostConnectedPeers] {
            prop_assert!(select_host(&listing, preference, &me, false).is_none());
            prop_assert!(select_host(&listing, preference, &me, true).is_none());
        }
    }

    #[test]
    fn tie_break_is_antisymmetric(a in "[a-z0-9-]{1,8}", b in "[a-z0-9-]{1,8}") {
        prop_assume!(a != b);
        let a_id = LocalIdentity::from(a.as_str());
        let b_id = LocalIdentity::from(b.as_str());
        prop_assert_ne!(outranks(&b, &a_id), outranks(&a, &b_id));
        prop_assert!(!outranks(&a, &a_id));
    }

    #[test]
    fn symmetry_break_only_selects_higher_identities(listing in listing_strategy(), me in "[a-f]{1,3}") {
        let me = LocalIdentity::from(me);
        for preference in [HostPreference::FirstAvailable, HostPreference::MostConnectedPeers] {
            if let Some(host) = select_host(&listing, preference, &me, true) {
                prop_assert!(host.identity.as_str() > me.as_str());
                prop_assert!(host.has_room());
            }
        }
    }

    #[test]
    fn most_connected_picks_a_maximum(listing in listing_strategy(), me in "[a-f]{1,3}") {
        let me = LocalIdentity::from(me);
        let best = listing
            .iter()
            .filter(|host| host.has_room())
            .map(|host| host.connected_peer_count)
            .max();
        let selected = select_host(&listing, HostPreference::MostConnectedPeers, &me, false);
        prop_assert_eq!(selected.map(|host| host.connected_peer_count), best);
    }
}
