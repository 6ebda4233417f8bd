use arenalloc::{Arena, ArenaConfig, ArenaError, Words};

fn log_alloc(arena: &Arena, bytes: usize) -> Result<(), ArenaError> {
    let addr = arena.allocate(bytes)?;
    let stats = arena.stats();

    println!("Requested {bytes} bytes of memory");
    println!("Received this address: {addr:?}");
    println!(
        "Regions: {} start, {} low memory, {} not allocable ({} of {} used)\n",
        stats.start_regions, stats.low_memory_regions, stats.not_allocable_regions, stats.used, stats.capacity
    );

    Ok(())
}

fn main() -> Result<(), ArenaError> {
    let config = ArenaConfig::new(Words(1024), Words(256), Words(32))?;
    let mut arena = Arena::with_config(config);

    // Leaves the first region with 124 free words: low memory.
    log_alloc(&arena, 900 * 8)?;
    // Small enough to be served by the low memory region.
    log_alloc(&arena, 20 * 8)?;
    // Too big for low memory, a new region is mapped.
    log_alloc(&arena, 80 * 8)?;
    // Bigger than a region, gets its own.
    log_alloc(&arena, 4096 * 8)?;

    println!("Resetting arena");
    arena.reset();
    log_alloc(&arena, 900 * 8)?;

    println!("Freeing arena");
    arena.free();
    println!("{:?}", arena.stats());

    Ok(())
}
