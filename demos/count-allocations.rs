use rand::Rng;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use allocated_rbtree::{AllocErrorWithLayout, CountingAllocator, LoggingAllocator, RbTreeMap};

fn main() -> Result<(), AllocErrorWithLayout> {
    // Raise to Debug to see every allocate/deallocate call.
    TermLogger::init(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .ok();

    let mut rng = rand::thread_rng();

    for run in 0..10 {
        let counts = CountingAllocator::default();
        let alloc = LoggingAllocator::new(&counts);
        let mut map = RbTreeMap::<u32, u32, _, _>::new_in(&alloc)?;

        for _ in 0..1000 {
            let k: u32 = rng.gen();
            let v: u32 = rng.gen();
            map.try_insert(k, v)?;
        }

        println!(
            "{},{},{},{}",
            run,
            map.len(),
            counts.n_allocations(),
            counts.n_bytes_allocated()
        );

        drop(map);
        assert_eq!(counts.net_allocations(), 0);
        assert_eq!(counts.net_bytes_allocated(), 0);
    }

    Ok(())
}
