use petek_queue::UnboundedQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn basic_fifo() {
    let queue = UnboundedQueue::new();
    assert!(queue.is_empty());
    assert_eq!(queue.pop(), None);
    for i in 0..1000 {
        queue.push(i);
    }
    assert!(!queue.is_empty());
    for i in 0..1000 {
        assert_eq!(queue.pop(), Some(i));
    }
    assert_eq!(queue.pop(), None);
    assert!(queue.is_empty());
}

#[test]
fn push_pop_roundtrip() {
    let queue = UnboundedQueue::new();
    queue.push(String::from("solo"));
    assert_eq!(queue.pop().as_deref(), Some("solo"));
    assert_eq!(queue.pop(), None);
}

#[test]
#[cfg_attr(miri, ignore)]
fn per_producer_fifo() {
    let queue = Arc::new(UnboundedQueue::new());
    let producers = 4usize;
    let per_producer = 10_000usize;

    let mut handles = Vec::new();
    for p in 0..producers {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                queue.push((p, i));
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..2 {
        let queue = queue.clone();
        let share = producers * per_producer / 2;
        consumers.push(thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < share {
                match queue.pop() {
                    Some(pair) => seen.push(pair),
                    None => thread::yield_now(),
                }
            }
            seen
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    let mut all = Vec::new();
    for consumer in consumers {
        let seen = consumer.join().unwrap();
        for p in 0..producers {
            let sequence: Vec<usize> = seen
                .iter()
                .filter(|(producer, _)| *producer == p)
                .map(|&(_, i)| i)
                .collect();
            for window in sequence.windows(2) {
                assert!(window[0] < window[1], "producer {p} reordered");
            }
        }
        all.extend(seen);
    }
    assert_eq!(queue.pop(), None);

    let mut sorted = all;
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), producers * per_producer);
    petek::flush();
}

#[test]
fn drop_releases_remaining_values() {
    struct Counted(Arc<AtomicUsize>);
    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    {
        let queue = UnboundedQueue::new();
        for _ in 0..50 {
            queue.push(Counted(dropped.clone()));
        }
        drop(queue.pop());
        drop(queue.pop());
    }
    // Popped values drop at the pop; the rest drop with the queue. Only
    // the retired node shells wait on reclamation.
    assert_eq!(dropped.load(Ordering::Relaxed), 50);
    petek::flush();
}
