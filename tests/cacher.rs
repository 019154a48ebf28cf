mod common;

use common::*;
use strata::{Query, World};

#[test]
fn cache_seeds_from_the_query() {
    let mut w = World::new();
    bind_indexes(&w);
    let mut a1 = w.new_archetype::<(A,)>().unwrap();
    let mut a2 = w.new_archetype::<(B,)>().unwrap();
    let mut a3 = w.new_archetype::<(A, D)>().unwrap();
    let mut a4 = w.new_archetype::<(B, D)>().unwrap();

    let e1 = a1.new_entity().id();
    let _e2 = a2.new_entity().id();
    let e3 = a3.new_entity().id();
    let e4 = a4.new_entity().id();

    w.get(e3).get::<D>().unwrap().x.set(1233).unwrap();
    w.get(e4).get::<D>().unwrap().x.set(1222).unwrap();

    let mut q1 = Query::all::<(A,)>(&w);
    q1.pre_match().unwrap();
    let mut c1 = q1.cache().unwrap();
    assert_eq!(cache_ids(&mut c1), vec![e1, e3]);

    let le = INDEX1.with(|i| i.borrow().le(1222));
    let mut q2 = Query::all::<(D,)>(&w).with_filters(vec![le]);
    q2.pre_match().unwrap();
    let mut c2 = q2.cache().unwrap();
    assert_eq!(cache_ids(&mut c2), vec![e4]);

    // A filter that can match nothing yields an empty but valid cache.
    let le = INDEX1.with(|i| i.borrow().le(1222));
    let mut q3 = Query::all::<(A, D)>(&w).with_filters(vec![le]);
    q3.pre_match().unwrap();
    let mut c3 = q3.cache().unwrap();
    assert!(cache_ids(&mut c3).is_empty());
}

#[test]
fn cache_tracks_lifecycle_and_index_updates() {
    let mut w = World::new();
    bind_indexes(&w);
    let mut a1 = w.new_archetype::<(A,)>().unwrap();
    let mut a2 = w.new_archetype::<(A, D)>().unwrap();
    let mut a3 = w.new_archetype::<(B, D)>().unwrap();

    let _e1 = a1.new_entity().id();
    let e3 = a2.new_entity().id();
    let e4 = a3.new_entity().id();
    w.get(e3).get::<D>().unwrap().x.set(1233).unwrap();
    w.get(e4).get::<D>().unwrap().x.set(1222).unwrap();

    let le = INDEX1.with(|i| i.borrow().le(1222));
    let mut q = Query::all::<(D,)>(&w).with_filters(vec![le]);
    q.pre_match().unwrap();
    let mut cache = q.cache().unwrap();
    assert_eq!(cache_ids(&mut cache), vec![e4]);

    // Killing an uncached entity leaves the cache unchanged.
    w.kill(e3);
    assert_eq!(cache_ids(&mut cache), vec![e4]);

    // A newborn with a passing default value joins the cache on creation.
    let e5 = a2.new_entity().id();
    let mut got = cache_ids(&mut cache);
    got.sort_unstable();
    let mut expected = vec![e4, e5];
    expected.sort_unstable();
    assert_eq!(got, expected);

    // Mutating an indexed field out of range evicts the entity.
    w.get(e4).get::<D>().unwrap().x.set(1223).unwrap();
    assert_eq!(cache_ids(&mut cache), vec![e5]);

    // And a fresh passing entity is picked up.
    let e6 = a3.new_entity().id();
    w.get(e6).get::<D>().unwrap().x.set(1000).unwrap();
    let mut got = cache_ids(&mut cache);
    got.sort_unstable();
    let mut expected = vec![e5, e6];
    expected.sort_unstable();
    assert_eq!(got, expected);

    // Mutating back into range re-admits.
    w.get(e4).get::<D>().unwrap().x.set(5).unwrap();
    assert_eq!(cache_ids(&mut cache).len(), 3);

    // Killing a cached entity removes it.
    w.kill(e5);
    let mut got = cache_ids(&mut cache);
    got.sort_unstable();
    let mut expected = vec![e4, e6];
    expected.sort_unstable();
    assert_eq!(got, expected);
}

#[test]
fn cache_subscriptions_tear_down_on_drop() {
    let mut w = World::new();
    bind_indexes(&w);
    let mut a = w.new_archetype::<(D,)>().unwrap();
    let e = a.new_entity().id();
    w.get(e).get::<D>().unwrap().x.set(10).unwrap();

    assert_eq!(w.num_callbacks(), 0);
    {
        let le = INDEX1.with(|i| i.borrow().le(100));
        let mut q = Query::all::<(D,)>(&w).with_filters(vec![le]);
        q.pre_match().unwrap();
        let mut cache = q.cache().unwrap();
        assert_eq!(cache_ids(&mut cache), vec![e]);

        assert_eq!(w.num_callbacks(), 2);
        assert_eq!(INDEX1.with(|i| i.borrow().num_callbacks()), 1);
    }
    assert_eq!(w.num_callbacks(), 0);
    assert_eq!(INDEX1.with(|i| i.borrow().num_callbacks()), 0);
}

#[test]
fn filters_sharing_one_index_subscribe_once() {
    let mut w = World::new();
    bind_indexes(&w);
    let mut a = w.new_archetype::<(D,)>().unwrap();
    a.new_entity();

    let ge = INDEX1.with(|i| i.borrow().ge(0));
    let le = INDEX1.with(|i| i.borrow().le(100));
    let mut q = Query::all::<(D,)>(&w).with_filters(vec![ge, le]);
    q.pre_match().unwrap();
    let cache = q.cache().unwrap();
    assert_eq!(INDEX1.with(|i| i.borrow().num_callbacks()), 1);
    drop(cache);
    assert_eq!(INDEX1.with(|i| i.borrow().num_callbacks()), 0);
}

#[test]
fn unfiltered_cache_subscribes_no_index() {
    let mut w = World::new();
    bind_indexes(&w);
    let mut a = w.new_archetype::<(A,)>().unwrap();
    let e1 = a.new_entity().id();

    let mut q = Query::all::<(A,)>(&w);
    q.pre_match().unwrap();
    let mut cache = q.cache().unwrap();
    assert_eq!(cache_ids(&mut cache), vec![e1]);
    assert_eq!(w.num_callbacks(), 2);
    assert_eq!(INDEX1.with(|i| i.borrow().num_callbacks()), 0);

    let e2 = a.new_entity().id();
    assert_eq!(cache_ids(&mut cache), vec![e1, e2]);
    w.kill(e1);
    assert_eq!(cache_ids(&mut cache), vec![e2]);
}

#[test]
fn cache_iteration_reverses_and_collects() {
    let mut w = World::new();
    let mut a = w.new_archetype::<(A,)>().unwrap();
    let ids: Vec<_> = (0..4).map(|_| a.new_entity().id()).collect();

    let mut q = Query::all::<(A,)>(&w);
    q.pre_match().unwrap();
    let mut cache = q.cache().unwrap();

    assert_eq!(cache_ids(&mut cache), ids);
    assert_eq!(cache.len(), 4);

    let mut rev = Vec::new();
    cache.for_each(|e| rev.push(e.id()), true);
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(rev, expected);

    let mut collected = Vec::new();
    cache.collect(&mut collected, false);
    let got: Vec<_> = collected.iter().map(|r| r.id()).collect();
    assert_eq!(got, ids);

    let mut partial = Vec::new();
    cache.collect_until(&mut partial, |e| e.id() == ids[2], false);
    let got: Vec<_> = partial.iter().map(|r| r.id()).collect();
    assert_eq!(got, vec![ids[0], ids[1]]);
}

#[test]
fn cache_with_custom_comparator_orders_iteration() {
    let mut w = World::new();
    let mut a = w.new_archetype::<(A,)>().unwrap();
    let ids: Vec<_> = (0..4).map(|_| a.new_entity().id()).collect();

    let mut q = Query::all::<(A,)>(&w);
    q.pre_match().unwrap();
    // Descending entity-id order.
    let mut cache = q.cache_with(|a, b| b.cmp(a)).unwrap();

    let mut seen = Vec::new();
    cache.for_each(|e| seen.push(e.id()), false);
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(seen, expected);

    // Maintenance keeps the comparator order.
    let e_new = a.new_entity().id();
    let mut seen = Vec::new();
    cache.for_each(|e| seen.push(e.id()), false);
    let mut expected = ids.clone();
    expected.push(e_new);
    expected.reverse();
    assert_eq!(seen, expected);
}
