use petek_cache::SegmentedLruMap;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

#[test]
fn basic_operations() {
    let mut cache = SegmentedLruMap::new();
    assert_eq!(cache.evictable(), None);
    cache.emplace(1, 100);
    assert_eq!(cache.evictable(), Some((&1, &100)));
    cache.emplace(2, 200);
    assert_eq!(cache.evictable(), Some((&1, &100)));
    cache.emplace(3, 300);
    assert_eq!(cache.evictable(), Some((&1, &100)));
    cache.touch(&1);
    assert_eq!(cache.evictable(), Some((&2, &200)));
    cache.evict();
    assert_eq!(cache.evictable(), Some((&3, &300)));
    cache.evict();
    assert_eq!(cache.evictable(), Some((&1, &100)));
}

#[test]
fn insert_find_erase_roundtrip() {
    let mut cache = SegmentedLruMap::new();
    assert_eq!(cache.find(&7), None);
    let (_, inserted) = cache.emplace(7, "seven");
    assert!(inserted);
    assert_eq!(cache.find(&7), Some(&"seven"));
    assert!(cache.erase(&7));
    assert_eq!(cache.find(&7), None);
    assert!(!cache.erase(&7));
}

#[test]
fn duplicate_emplace_touches_without_inserting() {
    let mut cache = SegmentedLruMap::new();
    cache.emplace(1, 100);
    cache.emplace(2, 200);
    let (value, inserted) = cache.emplace(1, 999);
    assert!(!inserted);
    assert_eq!(*value, 100, "existing value is kept");
    assert_eq!(cache.len(), 2);
    // The re-emplace counts as a touch: 1 is now protected, 2 evicts first.
    assert_eq!(cache.evictable(), Some((&2, &200)));
}

#[test]
fn eviction_order_is_probation_then_protected() {
    let mut cache = SegmentedLruMap::new();
    for key in 1..=5 {
        cache.emplace(key, key * 10);
    }
    cache.touch(&2);
    cache.touch(&4);
    // Probation drains in insertion order, then protected in touch order.
    let order: Vec<i32> = std::iter::from_fn(|| cache.evict().map(|(k, _)| k)).collect();
    assert_eq!(order, vec![1, 3, 5, 2, 4]);
    assert!(cache.is_empty());
}

#[test]
fn touch_reorders_protected() {
    let mut cache = SegmentedLruMap::new();
    cache.emplace(1, ());
    cache.emplace(2, ());
    cache.touch(&1);
    cache.touch(&2);
    // Both protected; 1 was touched least recently.
    assert_eq!(cache.evictable(), Some((&1, &())));
    cache.touch(&1);
    assert_eq!(cache.evictable(), Some((&2, &())));
}

#[test]
fn find_does_not_reorder() {
    let mut cache = SegmentedLruMap::new();
    cache.emplace(1, ());
    cache.emplace(2, ());
    assert!(cache.find(&1).is_some());
    assert_eq!(cache.evictable(), Some((&1, &())), "find is a pure read");
}

#[test]
fn get_mut_updates_in_place() {
    let mut cache = SegmentedLruMap::new();
    cache.emplace("key", 1);
    if let Some(value) = cache.get_mut(&"key") {
        *value = 2;
    }
    assert_eq!(cache.find(&"key"), Some(&2));
}

#[test]
fn clear_empties_everything() {
    let mut cache = SegmentedLruMap::new();
    for key in 0..100 {
        cache.emplace(key, key);
    }
    cache.touch(&50);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.evictable(), None);
    assert_eq!(cache.find(&50), None);
    // Reusable after clear.
    cache.emplace(1, 1);
    assert_eq!(cache.evictable(), Some((&1, &1)));
}

#[test]
fn iteration_covers_all_entries() {
    let mut cache = SegmentedLruMap::new();
    for key in 0..64 {
        cache.emplace(key, key * 2);
    }
    let mut seen: Vec<i32> = cache.iter().map(|(&k, _)| k).collect();
    seen.sort_unstable();
    let expected: Vec<i32> = (0..64).collect();
    assert_eq!(seen, expected);
}

#[test]
fn growth_and_deletion_stress() {
    // Probe-chain integrity under growth and backward-shift deletion,
    // checked against a model map.
    let mut rng = rand::thread_rng();
    let mut cache = SegmentedLruMap::new();
    let mut model: HashMap<u64, u64> = HashMap::new();

    for _ in 0..20_000 {
        let key = rng.gen_range(0..4096u64);
        if rng.gen_bool(0.7) {
            let value = rng.gen::<u64>();
            let (_, inserted) = cache.emplace(key, value);
            assert_eq!(inserted, !model.contains_key(&key));
            // Existing entries keep their old value.
            model.entry(key).or_insert(value);
        } else {
            assert_eq!(cache.erase(&key), model.remove(&key).is_some());
        }
        assert_eq!(cache.len(), model.len());
    }

    let keys: Vec<u64> = model.keys().copied().collect();
    for key in keys.choose_multiple(&mut rng, 200.min(model.len())) {
        assert_eq!(cache.find(key), model.get(key));
    }
}

#[test]
fn evict_drains_in_full() {
    let mut cache = SegmentedLruMap::new();
    for key in 0..1000u32 {
        cache.emplace(key, key);
        if key % 3 == 0 {
            cache.touch(&key);
        }
    }
    let mut count = 0;
    while cache.evict().is_some() {
        count += 1;
    }
    assert_eq!(count, 1000);
    assert!(cache.is_empty());
}
