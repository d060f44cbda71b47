//! Property tests for tuple packing and subspaces.
//!
//! The registry and the knob store lean on these:
//!
//! 1. **Roundtrip**: `unpack(pack(t)) == t`
//! 2. **Group index order**: packed `(group, name)` pairs sort by group, then name
//! 3. **Group ranges**: the range of `(group,)` holds that group's pairs and no others
//! 4. **Optional class order**: a null class sorts before every byte-string class
//! 5. **Id order**: tombstone ids sort numerically once packed
//! 6. **Containment**: a subspace contains and strips its own keys

use proptest::prelude::*;

use crate::Element;
use crate::Subspace;
use crate::Tuple;
use crate::strinc;

// =============================================================================
// Strategies
// =============================================================================

fn arb_leaf() -> impl Strategy<Value = Element> {
    prop_oneof![
        Just(Element::Null),
        "[a-zA-Z0-9_/]{0,16}".prop_map(Element::String),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Element::Bytes),
        any::<i64>().prop_map(Element::Int),
        any::<bool>().prop_map(Element::Bool),
    ]
}

fn arb_element() -> impl Strategy<Value = Element> {
    arb_leaf().prop_recursive(2, 12, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(|elements| {
            Element::Tuple(elements.into_iter().fold(Tuple::new(), |t, e| t.push(e)))
        })
    })
}

fn arb_tuple() -> impl Strategy<Value = Tuple> {
    prop::collection::vec(arb_element(), 0..5).prop_map(|elements| elements.into_iter().fold(Tuple::new(), Tuple::push))
}

/// Names drawn from a small alphabet that includes the escaped 0x00 and 0xFF
/// bytes, so shared prefixes and escapes come up often.
fn arb_name() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![0x00u8, b'a', b'b', 0xFF]), 0..6)
}

fn group_member(group: &[u8], name: &[u8]) -> Vec<u8> {
    Tuple::new().push(group).push(name).pack()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_roundtrip(tuple in arb_tuple()) {
        let packed = tuple.pack();
        let unpacked = Tuple::unpack(&packed).expect("unpack should succeed");
        prop_assert_eq!(tuple, unpacked);
    }

    #[test]
    fn prop_group_member_ordering(
        group_a in arb_name(),
        name_a in arb_name(),
        group_b in arb_name(),
        name_b in arb_name(),
    ) {
        let expected = (&group_a, &name_a).cmp(&(&group_b, &name_b));
        prop_assert_eq!(group_member(&group_a, &name_a).cmp(&group_member(&group_b, &name_b)), expected);
    }

    #[test]
    fn prop_group_range_holds_only_its_members(group in arb_name(), other in arb_name(), name in arb_name()) {
        let (begin, end) = Tuple::new().push(group.as_slice()).range();
        let member = group_member(&other, &name);
        let inside = begin <= member && member < end;
        prop_assert_eq!(inside, group == other);
    }

    #[test]
    fn prop_optional_class_ordering(
        class_a in proptest::option::of(arb_name()),
        name_a in "[a-z_]{1,8}",
        class_b in proptest::option::of(arb_name()),
        name_b in "[a-z_]{1,8}",
    ) {
        let packed_a = Tuple::new().push(class_a.clone()).push(name_a.as_str()).pack();
        let packed_b = Tuple::new().push(class_b.clone()).push(name_b.as_str()).pack();
        // `Option` orders `None` first, like a packed null.
        prop_assert_eq!(packed_a.cmp(&packed_b), (class_a, name_a).cmp(&(class_b, name_b)));
    }

    #[test]
    fn prop_id_ordering(a in any::<i64>(), b in any::<i64>()) {
        let packed_a = Tuple::new().push(a).pack();
        let packed_b = Tuple::new().push(b).pack();
        prop_assert_eq!(a.cmp(&b), packed_a.cmp(&packed_b));
    }

    #[test]
    fn prop_subspace_contains_own_keys(
        prefix in prop::collection::vec(any::<u8>(), 0..8),
        key in arb_tuple(),
    ) {
        let subspace = Subspace::from_bytes(prefix);
        let packed = subspace.pack(&key);
        prop_assert!(subspace.contains(&packed));
        prop_assert_eq!(subspace.unpack(&packed).expect("unpack should succeed"), key);
    }

    #[test]
    fn prop_strinc_bounds_prefix(
        key in prop::collection::vec(any::<u8>(), 1..8),
        tail in prop::collection::vec(any::<u8>(), 0..8),
    ) {
        if let Some(end) = strinc(&key) {
            let mut extended = key.clone();
            extended.extend_from_slice(&tail);
            prop_assert!(key < end);
            prop_assert!(extended < end);
        }
    }
}
