//! Walks a heap through a few allocations and prints its layout after
//! each step. Run with `RUST_LOG=trace` to see every decision the heap
//! makes.

use mmheap::{Heap, HeapConfig, Payload};

fn log_alloc(heap: &Heap, size: usize, payload: Payload) {
    println!("Requested {size} bytes of memory");
    println!(
        "Received payload at offset {} ({} usable bytes)",
        payload.offset(),
        heap.usable_size(payload)
    );
}

fn dump(heap: &Heap, step: &str) {
    println!("--- {step}");
    for block in heap.blocks() {
        let state = if block.allocated { "allocated" } else { "free" };
        println!("  {:>6}  {:>6} bytes  {state}", block.offset, block.size);
    }
    println!("  {:?}", heap.stats());
    println!(
        "  {} of {} bytes left to grow into",
        heap.source().remaining(),
        heap.config().max_heap_size()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut heap = Heap::new(HeapConfig::default().with_max_heap_size(1 << 16))?;

    let p1 = heap.allocate(8)?;
    log_alloc(&heap, 8, p1);
    let p2 = heap.allocate(16)?;
    log_alloc(&heap, 16, p2);
    let p3 = heap.allocate(200)?;
    log_alloc(&heap, 200, p3);
    dump(&heap, "three allocations");

    heap.payload_mut(p2)[..5].copy_from_slice(b"hello");
    let p2 = heap.reallocate(Some(p2), 512)?.unwrap();
    let greeting = std::str::from_utf8(&heap.payload(p2)[..5])?;
    println!("p2 moved to {} and still says {greeting:?}", p2.offset());
    dump(&heap, "after growing p2");

    heap.free(Some(p1));
    heap.free(Some(p3));
    heap.free(Some(p2));
    dump(&heap, "everything freed");

    heap.check()?;

    Ok(())
}
