use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use allocated_rbtree::{CountingAllocator, Error, LoggingAllocator, RbTreeMap};

fn main() -> Result<(), Error> {
    TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .ok();

    let alloc = LoggingAllocator::new(CountingAllocator::default());
    let mut map = RbTreeMap::new_in(&alloc)?;

    println!("=== Inserting ===");
    for k in [5, 3, 8, 1, 4, 7, 9] {
        map.insert(k, k * 10);
    }
    println!("inserted 5 again: {}", map.insert(5, 0));
    println!("map: {map:?}");

    println!("\n=== Lookup ===");
    println!("at(4) = {}", map.at(&4)?);
    match map.at(&42) {
        Ok(v) => println!("at(42) = {v}"),
        Err(e) => println!("at(42) failed: {e}"),
    }

    println!("\n=== Index-style access ===");
    *map.get_or_insert_default(42) += 1;
    println!("after get_or_insert_default(42): {map:?}");

    println!("\n=== Walking from a found key ===");
    for (k, v) in map.find(&7) {
        println!("{k} -> {v}");
    }

    println!("\n=== Graphviz ===");
    print!("{}", map.to_dot());

    drop(map);
    println!(
        "\nallocations: {}, deallocations: {}",
        alloc.inner().n_allocations(),
        alloc.inner().n_deallocations()
    );

    Ok(())
}
