use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segheap::{Heap, HeapConfig};
use std::ptr::NonNull;
use std::slice;

struct Live {
    ptr: NonNull<u8>,
    len: usize,
    seed: u8,
}

impl Live {
    fn write(&self) {
        let bytes = unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) };

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.seed.wrapping_add(i as u8);
        }
    }

    fn intact(&self, len: usize) -> bool {
        let bytes = unsafe { slice::from_raw_parts(self.ptr.as_ptr(), len) };

        bytes
            .iter()
            .enumerate()
            .all(|(i, byte)| *byte == self.seed.wrapping_add(i as u8))
    }

    fn span(&self) -> (usize, usize) {
        let start = self.ptr.as_ptr() as usize;

        (start, start + self.len)
    }
}

fn assert_disjoint(live: &[Live]) {
    let mut spans: Vec<_> = live.iter().map(Live::span).collect();
    spans.sort();

    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
}

fn churn(heap: &mut Heap, rng: &mut StdRng, steps: usize, max_size: usize) {
    let mut live: Vec<Live> = vec![];

    for step in 0..steps {
        match rng.gen_range(0..10) {
            0..=4 => {
                let len = rng.gen_range(1..=max_size);

                if let Some(ptr) = heap.allocate(len) {
                    let entry = Live {
                        ptr,
                        len,
                        seed: rng.gen(),
                    };
                    entry.write();
                    live.push(entry);
                }
            }
            5..=7 if !live.is_empty() => {
                let entry = live.swap_remove(rng.gen_range(0..live.len()));

                assert!(entry.intact(entry.len), "step {step}");
                unsafe { heap.release(entry.ptr.as_ptr()) };
            }
            8..=9 if !live.is_empty() => {
                let i = rng.gen_range(0..live.len());
                let len = rng.gen_range(1..=max_size);
                let kept = live[i].len.min(len);

                if let Some(ptr) = unsafe { heap.resize(live[i].ptr.as_ptr(), len) } {
                    live[i].ptr = ptr;
                    assert!(live[i].intact(kept), "step {step}");

                    live[i].len = len;
                    live[i].write();
                }
            }
            _ => {}
        }

        assert_eq!(heap.violations(), vec![], "step {step}");
    }

    assert_disjoint(&live);

    for entry in live.drain(..) {
        assert!(entry.intact(entry.len));
        unsafe { heap.release(entry.ptr.as_ptr()) };
    }

    assert_eq!(heap.check(), 0);
    assert_eq!(heap.free_block_count(), 1);
}

#[test]
fn small_block_churn() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(0x5e9_4ea9);
    let mut heap = Heap::new().unwrap();

    churn(&mut heap, &mut rng, 3_000, 128);

    assert_eq!(heap.metrics().ignored_releases, 0);
}

#[test]
fn mixed_size_churn() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(42);
    let mut heap = Heap::new().unwrap();

    churn(&mut heap, &mut rng, 2_000, 20_000);
}

#[test]
fn churn_near_capacity() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(7);
    let mut heap = Heap::with_config(HeapConfig {
        chunk_size: 512,
        arena_capacity: 1 << 15,
    })
    .unwrap();

    // failed allocations and resizes must leave everything in place
    churn(&mut heap, &mut rng, 2_000, 4_000);

    let metrics = heap.metrics();
    assert!(metrics.heap_size <= 1 << 15);
    assert_eq!(metrics.get_live_allocations(), 0);
}
