use petek_queue::Bbq;
use std::sync::Arc;
use std::thread;

#[test]
fn fill_drain_refill() {
    let queue = Bbq::with_block_size(16, 4);
    for i in 0..16 {
        assert!(queue.push(i).is_ok(), "push {i}");
    }
    assert_eq!(queue.push(16), Err(16));
    for i in 0..16 {
        assert_eq!(queue.pop(), Some(i));
    }
    assert_eq!(queue.pop(), None);
    // A fresh revolution reuses the blocks with bumped versions.
    for i in 100..116 {
        assert!(queue.push(i).is_ok(), "push {i} after drain");
    }
    for i in 100..116 {
        assert_eq!(queue.pop(), Some(i));
    }
    assert_eq!(queue.pop(), None);
}

#[test]
fn producer_blocked_until_block_drained() {
    let queue = Bbq::with_block_size(16, 4);
    for i in 0..16 {
        assert!(queue.push(i).is_ok());
    }
    assert!(queue.push(99).is_err());

    // Draining part of a block is not enough: a producer may never enter a
    // block that still holds unconsumed data.
    assert_eq!(queue.pop(), Some(0));
    assert!(queue.push(99).is_err());

    // Draining the whole first block frees exactly one block's worth.
    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(2));
    assert_eq!(queue.pop(), Some(3));
    for i in 16..20 {
        assert!(queue.push(i).is_ok(), "push {i}");
    }
    assert!(queue.push(99).is_err());

    for i in 4..20 {
        assert_eq!(queue.pop(), Some(i));
    }
    assert_eq!(queue.pop(), None);
}

#[test]
fn many_revolutions() {
    let queue = Bbq::new(64);
    for round in 0..50u64 {
        for i in 0..64 {
            assert!(queue.push(round * 64 + i).is_ok());
        }
        assert!(queue.push(u64::MAX).is_err());
        for i in 0..64 {
            assert_eq!(queue.pop(), Some(round * 64 + i));
        }
        assert_eq!(queue.pop(), None);
    }
}

#[test]
fn drop_releases_remaining_values() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted(Arc<AtomicUsize>);
    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    {
        let queue = Bbq::with_block_size(16, 4);
        for _ in 0..10 {
            assert!(queue.push(Counted(dropped.clone())).is_ok());
        }
        drop(queue.pop());
        drop(queue.pop());
        drop(queue.pop());
    }
    assert_eq!(dropped.load(Ordering::Relaxed), 10);
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_no_loss_no_duplication() {
    let queue = Arc::new(Bbq::new(256));
    let producers = 4usize;
    let per_producer = 20_000usize;

    let mut handles = Vec::new();
    for p in 0..producers {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                let value = p * per_producer + i;
                while queue.push(value).is_err() {
                    thread::yield_now();
                }
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..producers {
        let queue = queue.clone();
        consumers.push(thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < per_producer {
                match queue.pop() {
                    Some(value) => seen.push(value),
                    None => thread::yield_now(),
                }
            }
            seen
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    let mut all: Vec<usize> = Vec::new();
    for consumer in consumers {
        all.extend(consumer.join().unwrap());
    }
    assert_eq!(queue.pop(), None);

    all.sort_unstable();
    let expected: Vec<usize> = (0..producers * per_producer).collect();
    assert_eq!(all, expected, "no loss, no duplication");
}
