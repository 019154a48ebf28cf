use strata::Cemetery;

#[test]
fn fifo_reuse_order() {
    let mut c = Cemetery::new();
    c.add(7);
    c.add(3);
    c.add(9);
    assert_eq!(c.len(), 3);
    assert_eq!(c.pop(), Some(7));
    assert_eq!(c.pop(), Some(3));
    assert_eq!(c.pop(), Some(9));
    assert_eq!(c.pop(), None);
    assert!(c.is_empty());
}

#[test]
fn contains_mirrors_add_and_pop() {
    let mut c = Cemetery::new();
    assert!(!c.contains(0));
    assert!(!c.contains(12_345));

    c.add(0);
    c.add(1500);
    assert!(c.contains(0));
    assert!(c.contains(1500));
    assert!(!c.contains(1));
    assert!(!c.contains(1501));

    assert_eq!(c.pop(), Some(0));
    assert!(!c.contains(0));
    assert!(c.contains(1500));

    assert_eq!(c.pop(), Some(1500));
    assert!(!c.contains(1500));
}

#[test]
fn membership_blocks_grow_with_max_added_id() {
    let mut c = Cemetery::new();
    assert_eq!(c.num_blocks(), 0);

    c.add(0);
    assert_eq!(c.num_blocks(), 1);

    c.add(1023);
    assert_eq!(c.num_blocks(), 1);

    c.add(1024);
    assert_eq!(c.num_blocks(), 2);

    c.add(5000);
    assert_eq!(c.num_blocks(), 5000 / 1024 + 1);
}

#[test]
fn reserve_preallocates_blocks() {
    let mut c = Cemetery::new();
    c.reserve(3);
    assert_eq!(c.num_blocks(), 3);
    // Reserving less never shrinks.
    c.reserve(1);
    assert_eq!(c.num_blocks(), 3);

    // Ids inside the reserved range do not grow the block list further.
    c.add(2047);
    assert_eq!(c.num_blocks(), 3);
}
