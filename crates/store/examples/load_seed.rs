use std::path::Path;
use std::time::Instant;
use store::{MemoryStore, SeedError};

fn main() -> Result<(), SeedError> {
    let data_dir = Path::new("data/seed");

    println!("Loading seed dataset...\n");

    let start = Instant::now();
    let store = MemoryStore::load_from_dir(data_dir)?;
    let elapsed = start.elapsed();

    let (users, videos, events) = store.counts();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Videos: {}", videos);
    println!("Behavior events: {}", events);
    println!("\nPerformance: {:.0} events/second",
             events as f64 / elapsed.as_secs_f64());

    Ok(())
}
