use probemap::alloc::{Allocator, StepAllocator};
use probemap::{Error, HashMap, ResizeMode};

use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasherDefault, Hasher};
use std::ptr::NonNull;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

mod common;
use common::with_map;

#[test]
fn new() {
    with_map::<u64, u64>(|map| drop(map()));
}

#[test]
fn insert() {
    with_map::<u64, u64>(|map| {
        let map = map();
        let guard = map.guard();
        assert_eq!(map.insert(42, 0, &guard), Ok((&0, true)));
        assert_eq!(map.len(), 1);
    });
}

#[test]
fn get_empty() {
    with_map::<u64, u64>(|map| {
        let map = map();
        let guard = map.guard();
        assert!(map.get(&42, &guard).is_none());
        assert!(map.get(&0, &guard).is_none());
    });
}

#[test]
fn get_key_value_empty() {
    with_map::<u64, u64>(|map| {
        let map = map();
        let guard = map.guard();
        assert!(map.get_key_value(&42, &guard).is_none());
    });
}

#[test]
fn insert_and_get() {
    with_map::<u64, u64>(|map| {
        let map = map();
        map.pin().insert(42, 0).unwrap();

        let guard = map.guard();
        assert_eq!(map.get(&42, &guard), Some(&0));
        assert_eq!(map.get_key_value(&42, &guard), Some((&42, &0)));
        assert!(map.contains_key(&42, &guard));
        assert!(!map.contains_key(&43, &guard));
    });
}

#[test]
fn duplicate_keeps_first_value() {
    with_map::<u64, u64>(|map| {
        let map = map();
        let map = map.pin();

        assert_eq!(map.insert(42, 0), Ok((&0, true)));
        assert_eq!(map.insert(42, 1), Ok((&0, false)));
        assert_eq!(map.insert(42, 2), Ok((&0, false)));
        assert_eq!(map.get(&42), Some(&0));
        assert_eq!(map.len(), 1);
    });
}

#[test]
fn zero_key() {
    with_map::<i32, u64>(|map| {
        let map = map();
        let map = map.pin();

        assert_eq!(map.get(&0), None);
        assert_eq!(map.insert(0, 5), Ok((&5, true)));
        assert_eq!(map.insert(0, 6), Ok((&5, false)));
        assert_eq!(map.get(&0), Some(&5));
        assert_eq!(map.len(), 1);

        map.insert(-1, 7).unwrap();
        map.insert(1, 8).unwrap();
        assert_eq!(map.len(), 3);

        // The zero entry is yielded first, and exactly once.
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], (&0, &5));
        assert_eq!(entries.iter().filter(|(k, _)| **k == 0).count(), 1);
    });
}

#[test]
fn first_resize_at_half_capacity() {
    let map: HashMap<u64, u64> = HashMap::new();
    assert_eq!(map.capacity(), 256);
    assert_eq!(map.size_degree(), 8);

    {
        let map = map.pin();
        for i in 0..127 {
            assert_eq!(map.insert(i, i), Ok((&i, true)));
        }
        assert_eq!(map.capacity(), 256);

        // The 128th entry, counting the zero key, fills half of the table.
        assert_eq!(map.insert(127, 127), Ok((&127, true)));
        assert_eq!(map.capacity(), 1024);
    }

    assert_eq!(map.size_degree(), 10);
    assert_eq!(map.len(), 128);

    let guard = map.guard();
    for i in 0..128 {
        assert_eq!(map.get(&i, &guard), Some(&i));
    }
    assert_eq!(map.get(&128, &guard), None);
}

#[test]
fn growth_preserves_entries() {
    const ENTRIES: u64 = if cfg!(miri) { 256 } else { 1 << 14 };

    with_map::<u64, u64>(|map| {
        let map = map();

        {
            let map = map.pin();
            for i in 0..ENTRIES {
                assert_eq!(map.insert(i, i + 1), Ok((&(i + 1), true)));
            }
        }

        assert_eq!(map.len(), ENTRIES as usize);
        assert!(map.capacity() > 2 * ENTRIES as usize);
        assert!(map.capacity().is_power_of_two());

        let guard = map.guard();
        for i in 0..ENTRIES {
            assert_eq!(map.get(&i, &guard), Some(&(i + 1)));
        }
        assert_eq!(map.get(&ENTRIES, &guard), None);
    });
}

#[test]
fn with_capacity() {
    let map: HashMap<u32, u32> = HashMap::with_capacity(1000);
    let capacity = map.capacity();
    assert_eq!(capacity, 2048);

    let map_ref = map.pin();
    for i in 0..1000 {
        map_ref.insert(i, i).unwrap();
    }

    assert_eq!(map.capacity(), capacity);
}

#[test]
fn erase_unsupported() {
    with_map::<u64, u64>(|map| {
        let map = map();
        let guard = map.guard();
        map.insert(1, 1, &guard).unwrap();

        let err = Error::Unsupported { operation: "erase" };
        assert_eq!(map.erase(&1, &guard), Err(err.clone()));
        assert_eq!(map.erase(&2, &guard), Err(err));
        assert_eq!(map.get(&1, &guard), Some(&1));
        assert_eq!(map.len(), 1);
    });
}

#[test]
fn clear() {
    with_map::<u64, u64>(|map| {
        let mut map = map();
        {
            let map = map.pin();
            for i in 0..64 {
                map.insert(i, i).unwrap();
            }
        }

        let capacity = map.capacity();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);

        let map = map.pin();
        assert_eq!(map.iter().count(), 0);
        assert_eq!(map.get(&0), None);
        assert_eq!(map.get(&10), None);

        assert_eq!(map.insert(10, 20), Ok((&20, true)));
        assert_eq!(map.insert(0, 30), Ok((&30, true)));
        assert_eq!(map.len(), 2);
    });
}

#[test]
fn iter() {
    with_map::<u64, u64>(|map| {
        let map = map();
        let map = map.pin();
        for i in 0..100 {
            map.insert(i, i * 10).unwrap();
        }

        let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable();
        assert_eq!(entries, (0..100).map(|i| (i, i * 10)).collect::<Vec<_>>());

        let mut keys: Vec<_> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());

        let mut values: Vec<_> = map.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..100).map(|i| i * 10).collect::<Vec<_>>());

        assert_eq!((&map).into_iter().count(), 100);
    });
}

#[test]
fn iter_is_a_snapshot() {
    let map: HashMap<u64, u64> = HashMap::builder().size_degree(4).build();
    let guard = map.guard();
    for i in 1..=4 {
        map.insert(i, i, &guard).unwrap();
    }

    let iter = map.iter(&guard);

    // Grow the table while the iterator holds the old buffer.
    for i in 5..=64 {
        map.insert(i, i, &guard).unwrap();
    }
    assert!(map.capacity() > 16);

    // The insert that filled the old buffer landed there before the resize.
    let mut keys: Vec<_> = iter.map(|(k, _)| *k).collect();
    keys.sort_unstable();
    assert_eq!(keys, [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn colliding_hashes() {
    #[derive(Default)]
    struct ZeroHasher;

    impl Hasher for ZeroHasher {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _: &[u8]) {}
    }

    let map: HashMap<u64, u64, BuildHasherDefault<ZeroHasher>> = HashMap::builder()
        .hasher(BuildHasherDefault::<ZeroHasher>::default())
        .build();

    let map = map.pin();
    for i in 0..300 {
        assert_eq!(map.insert(i, i), Ok((&i, true)));
        assert_eq!(map.insert(i, i + 1), Ok((&i, false)));
    }

    for i in 0..300 {
        assert_eq!(map.get(&i), Some(&i));
    }
    assert_eq!(map.get(&300), None);
    assert_eq!(map.len(), 300);
}

#[test]
#[should_panic = "Attempted to access map with incorrect guard"]
fn foreign_guard() {
    let map1: HashMap<u64, u64> = HashMap::new();
    let map2: HashMap<u64, u64> = HashMap::new();

    let guard = map2.guard();
    let _ = map1.get(&1, &guard);
}

#[test]
fn pin_owned_is_shareable() {
    let map: HashMap<u64, u64> = HashMap::new();
    let map_ref = map.pin_owned();
    map_ref.insert(1, 2).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            assert_eq!(map_ref.get(&1), Some(&2));
            map_ref.insert(3, 4).unwrap();
        });
    });

    assert_eq!(map_ref.get(&3), Some(&4));
}

#[test]
fn equality_and_debug() {
    let map1: HashMap<u8, char> = HashMap::new();
    let map2: HashMap<u8, char> = HashMap::new();

    map1.pin().insert(1, 'a').unwrap();
    assert_ne!(map1, map2);

    map2.pin().insert(1, 'a').unwrap();
    assert_eq!(map1, map2);

    assert_eq!(format!("{map1:?}"), "{1: 'a'}");
    assert_eq!(format!("{:?}", map1.pin()), "{1: 'a'}");
    assert_eq!(format!("{:?}", map1.pin().keys()), "[1]");
    assert_eq!(format!("{:?}", map1.pin().values()), "['a']");
}

#[test]
fn builder_configuration() {
    let map: HashMap<u64, u64> = HashMap::builder()
        .size_degree(12)
        .resize_mode(ResizeMode::Blocking)
        .build();

    assert_eq!(map.capacity(), 4096);
    assert_eq!(map.resize_mode(), ResizeMode::Blocking);
    assert_eq!(HashMap::<u64, u64>::new().resize_mode(), ResizeMode::Drain);
}

// An allocator that refuses allocations above a size limit.
#[derive(Clone, Debug)]
struct Limited {
    limit: usize,
    inner: StepAllocator,
}

unsafe impl Allocator for Limited {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        if size > self.limit {
            return Err(Error::Alloc { size });
        }

        self.inner.allocate(size)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), Error> {
        unsafe { self.inner.release(ptr, size) }
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old: usize, new: usize) -> Result<NonNull<u8>, Error> {
        if new > self.limit {
            return Err(Error::Alloc { size: new });
        }

        unsafe { self.inner.resize(ptr, old, new) }
    }

    fn zeroed(&self) -> bool {
        self.inner.zeroed()
    }
}

#[test]
fn resize_allocation_failure() {
    let alloc = Limited {
        limit: 16 * 1024,
        inner: StepAllocator::new(),
    };

    let map: HashMap<u64, u64, _, Limited> = HashMap::builder().allocator(alloc).build();
    let map = map.pin();
    assert_eq!(map.capacity(), 256);

    for i in 1..128 {
        map.insert(i, i).unwrap();
    }

    // The insert that trips the resize keeps its entry but reports the failure.
    assert!(matches!(map.insert(128, 128), Err(Error::Alloc { .. })));
    assert_eq!(map.capacity(), 256);
    assert_eq!(map.len(), 128);
    for i in 1..=128 {
        assert_eq!(map.get(&i), Some(&i));
    }

    // Later inserts retry the resize before adding to the full table.
    assert!(matches!(map.insert(1000, 0), Err(Error::Alloc { .. })));
    assert_eq!(map.get(&1000), None);
    assert_eq!(map.len(), 128);

    // Keys that are already present need no room, so they are found as usual.
    assert_eq!(map.insert(5, 999), Ok((&5, false)));
    assert_eq!(map.insert(128, 0), Ok((&128, false)));
    assert_eq!(map.len(), 128);
}

// A hasher that stalls, keeping inserts registered while they probe.
#[derive(Default)]
struct SlowHasher(DefaultHasher);

impl Hasher for SlowHasher {
    fn finish(&self) -> u64 {
        thread::sleep(Duration::from_millis(5));
        self.0.finish()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }
}

#[test]
fn concurrent_inserts_outnumber_cells() {
    const THREADS: usize = if cfg!(miri) { 4 } else { 16 };

    for mode in [ResizeMode::Drain, ResizeMode::Blocking] {
        // Every insert passes the fill check before any of them commits, so
        // together they take more cells than the table has.
        let map: HashMap<u64, u64, BuildHasherDefault<SlowHasher>> = HashMap::builder()
            .hasher(BuildHasherDefault::<SlowHasher>::default())
            .size_degree(2)
            .resize_mode(mode)
            .build();
        let barrier = Barrier::new(THREADS);

        thread::scope(|s| {
            for t in 0..THREADS {
                let (map, barrier) = (&map, &barrier);
                s.spawn(move || {
                    let key = t as u64 + 1;
                    barrier.wait();
                    assert_eq!(map.pin().insert(key, key * 10), Ok((&(key * 10), true)));
                });
            }
        });

        assert_eq!(map.len(), THREADS);
        assert!(map.capacity() > 4);

        let map = map.pin();
        for key in 1..=THREADS as u64 {
            assert_eq!(map.get(&key), Some(&(key * 10)));
        }
    }
}

#[test]
fn initial_allocation_failure() {
    let alloc = Limited {
        limit: 64,
        inner: StepAllocator::new(),
    };

    let result = HashMap::<u64, u64>::builder().allocator(alloc).try_build();
    assert!(matches!(result, Err(Error::Alloc { .. })));
}

#[test]
fn mapped_table() {
    // Map every buffer, including the initial one.
    let map: HashMap<u32, u32, _, StepAllocator> = HashMap::builder()
        .allocator(StepAllocator::with_threshold(1))
        .size_degree(4)
        .build();

    let map = map.pin();
    for i in 0..1000 {
        map.insert(i, i * 2).unwrap();
    }

    for i in 0..1000 {
        assert_eq!(map.get(&i), Some(&(i * 2)));
    }
}
