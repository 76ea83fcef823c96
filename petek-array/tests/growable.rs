use petek_array::{GrowableArray, ReaderState};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn basics() {
    let array = GrowableArray::new();
    assert!(array.is_empty());
    assert_eq!(array.get(0), None);

    for i in 0..5000usize {
        assert_eq!(array.push_back(i), i + 1);
        if i % 500 == 0 {
            for j in 0..=i {
                assert_eq!(array[j], j);
            }
        }
    }
    assert_eq!(array.len(), 5000);
    for j in 0..5000 {
        assert_eq!(array[j], j);
    }
    assert_eq!(array.get(5000), None);
}

#[test]
fn survives_map_growth() {
    // 100_000 elements walk the block map through several doublings; every
    // previously published index must stay readable through each growth.
    let array = GrowableArray::new();
    for i in 0..100_000usize {
        array.push_back(i);
        if i % 10_007 == 0 {
            assert_eq!(array[i], i);
            assert_eq!(array[i / 2], i / 2);
            assert_eq!(array[0], 0);
        }
    }
    assert_eq!(array.len(), 100_000);
    assert_eq!(array[99_999], 99_999);
}

#[test]
fn cached_reader_view() {
    let array = GrowableArray::new();
    let mut state = ReaderState::new();
    assert_eq!(array.read(&mut state, 0), None);

    array.push_back(10);
    array.push_back(20);
    assert_eq!(array.read(&mut state, 1), Some(&20));
    // Indices below the cached size skip the size reload.
    assert_eq!(array.read(&mut state, 0), Some(&10));
    assert_eq!(array.read(&mut state, 2), None);
    array.push_back(30);
    assert_eq!(array.read(&mut state, 2), Some(&30));
}

#[test]
fn drop_releases_values() {
    use std::sync::atomic::AtomicUsize;

    struct Counted(Arc<AtomicUsize>);
    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    {
        let array = GrowableArray::new();
        // A partial last block exercises the prefix-count drop path.
        for _ in 0..777 {
            array.push_back(Counted(dropped.clone()));
        }
    }
    assert_eq!(dropped.load(Ordering::Relaxed), 777);
}

#[test]
#[cfg_attr(miri, ignore)]
fn one_writer_many_readers() {
    let total = 50_000usize;
    let array = Arc::new(GrowableArray::new());
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..8 {
        let array = array.clone();
        let done = done.clone();
        readers.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut state = ReaderState::new();
            while !done.load(Ordering::Acquire) {
                let index = rng.gen_range(0..total);
                if let Some(&value) = array.read(&mut state, index) {
                    assert_eq!(value, index, "reader observed a torn value");
                }
            }
        }));
    }

    for i in 0..total {
        array.push_back(i);
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(array.len(), total);
    for i in 0..total {
        assert_eq!(array[i], i);
    }
}
