use petek_stack::UnboundedBlockedStack;
use std::sync::Arc;
use std::thread;

#[test]
fn lifo_across_blocks() {
    // 500 values span four 128-slot blocks.
    let stack = UnboundedBlockedStack::new();
    for i in 0..500u64 {
        stack.push(i);
    }
    for i in (0..500).rev() {
        assert_eq!(stack.pop(), Some(i));
    }
    assert_eq!(stack.pop(), None);
}

#[test]
fn refill_after_drain() {
    let stack = UnboundedBlockedStack::new();
    for round in 0..4u64 {
        for i in 0..300 {
            stack.push(round * 1000 + i);
        }
        for i in (0..300).rev() {
            assert_eq!(stack.pop(), Some(round * 1000 + i));
        }
        assert_eq!(stack.pop(), None);
    }
    petek::flush();
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_push_pop() {
    let stack = Arc::new(UnboundedBlockedStack::new());
    let producers = 4u64;
    let per_producer = 10_000u64;

    let mut handles = Vec::new();
    for p in 0..producers {
        let stack = stack.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                stack.push(p * per_producer + i);
            }
        }));
    }

    let mut collectors = Vec::new();
    for _ in 0..producers {
        let stack = stack.clone();
        collectors.push(thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < per_producer as usize {
                match stack.pop() {
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
    let mut all: Vec<u64> = Vec::new();
    for collector in collectors {
        all.extend(collector.join().unwrap());
    }
    assert_eq!(stack.pop(), None);

    all.sort_unstable();
    let expected: Vec<u64> = (0..producers * per_producer).collect();
    assert_eq!(all, expected);
}
