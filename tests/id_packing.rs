mod common;

use common::*;
use strata::{
    component_id_of, pack, unpack_archetype, unpack_short, ComponentSet, EntityId,
};

#[test]
fn pack_unpack_round_trip() {
    for &a in &[0u16, 1, 2, 100, 4095, 8190, 8191] {
        for &s in &[0u32, 1, 2, 1023, 1024, 65535, 524_286, 524_287] {
            let eid = pack(a, s);
            assert_eq!(unpack_archetype(eid), a);
            assert_eq!(unpack_short(eid), s);
        }
    }
}

#[test]
fn packed_ids_sort_by_archetype_then_short_id() {
    let mut ids: Vec<EntityId> = vec![
        pack(2, 0),
        pack(0, 524_287),
        pack(1, 3),
        pack(0, 0),
        pack(1, 0),
        pack(2, 9),
        pack(0, 1),
    ];
    ids.sort_unstable();
    assert_eq!(
        ids,
        vec![
            pack(0, 0),
            pack(0, 1),
            pack(0, 524_287),
            pack(1, 0),
            pack(1, 3),
            pack(2, 0),
            pack(2, 9),
        ]
    );
}

#[test]
fn component_ids_are_stable_and_distinct() {
    let a1 = component_id_of::<A>();
    let b1 = component_id_of::<B>();
    let d1 = component_id_of::<D>();

    assert_ne!(a1, b1);
    assert_ne!(b1, d1);
    assert_ne!(a1, d1);

    // Re-asking returns the same ids.
    assert_eq!(component_id_of::<A>(), a1);
    assert_eq!(component_id_of::<B>(), b1);
    assert_eq!(component_id_of::<D>(), d1);
}

#[test]
fn signature_is_order_independent() {
    let abc = <(A, B, D)>::signature();
    let cba = <(D, B, A)>::signature();
    let bac = <(B, A, D)>::signature();
    assert_eq!(abc, cba);
    assert_eq!(abc, bac);

    assert!(abc.has(component_id_of::<A>()));
    assert!(abc.has(component_id_of::<B>()));
    assert!(abc.has(component_id_of::<D>()));
    assert_eq!(abc.len(), 3);

    assert_ne!(abc, <(A, B)>::signature());
    assert!(<()>::signature().is_empty());
}
