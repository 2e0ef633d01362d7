use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, Write as _};
use std::rc::Rc;

use clap::Parser;

use memhier::cache::Cache;
use memhier::config::CachePolicy;
use memhier::io::open_trace;
use memhier::memory::MemoryStore;
use memhier::stats::{LevelReport, CSV_HEADER};
use memhier::trace::{Operation, TraceReader};

#[derive(Parser, Debug)]
#[command(about = String::from("Single-level cache parameter sweep"))]
struct Args {
    trace: String,

    /// Pause after each trace event until return is pressed
    #[arg(short, long)]
    single_step: bool,

    /// Dump per-event cache state
    #[arg(short, long)]
    verbose: bool,
}

/// Driver behaviour flags, threaded through explicitly
struct DriverConfig {
    single_step: bool,
    verbose: bool,
}

fn main() -> Result<(), String> {
    env_logger::init();
    let args = Args::parse();
    let driver = DriverConfig {
        single_step: args.single_step,
        verbose: args.verbose,
    };

    let csv_path = format!("{}.csv", args.trace);
    let mut csv = File::create(&csv_path)
        .map_err(|e| format!("Couldn't create the output file {csv_path}: {e}"))?;
    writeln!(csv, "{CSV_HEADER}").map_err(|e| e.to_string())?;

    let mut cache_size = 4 * 1024;
    while cache_size <= 1024 * 1024 {
        for block_size in [32, 64, 128, 256] {
            for associativity in [2, 4, 8, 16, 32] {
                if (cache_size / block_size) % associativity != 0 {
                    continue;
                }
                let report = simulate(&args.trace, &driver, cache_size, block_size, associativity)?;
                writeln!(csv, "{}", report.csv_row()).map_err(|e| e.to_string())?;
            }
        }
        cache_size *= 4;
    }

    println!("Result has been written to {csv_path}");
    Ok(())
}

/// Runs the whole trace against one cache configuration on a fresh store
fn simulate(
    trace_path: &str,
    driver: &DriverConfig,
    cache_size: u32,
    block_size: u32,
    associativity: u32,
) -> Result<LevelReport, String> {
    let policy = CachePolicy::sweep(cache_size, block_size, associativity);
    let memory = Rc::new(RefCell::new(MemoryStore::new()));
    let mut cache = Cache::new(policy, None, memory.clone()).map_err(|e| e.to_string())?;
    cache.print_info(false);

    let reader = open_trace(trace_path)
        .map_err(|e| format!("Couldn't open the trace file at path {trace_path}: {e}"))?;
    for event in TraceReader::new(reader) {
        let event = event.map_err(|e| e.to_string())?;
        if driver.verbose {
            println!("{} {:x}", event.op.symbol(), event.addr);
        }
        memory.borrow_mut().ensure_page(event.addr);
        match event.op {
            Operation::Read => {
                cache.read(event.addr);
            }
            Operation::Write => {
                cache.write(event.addr, 0);
            }
        }
        if driver.verbose {
            cache.print_info(true);
        }
        if driver.single_step {
            print!("Press Enter to Continue...");
            io::stdout().flush().map_err(|e| e.to_string())?;
            io::stdin()
                .lock()
                .read_line(&mut String::new())
                .map_err(|e| e.to_string())?;
        }
    }

    cache.print_statistics();
    Ok(LevelReport {
        level: format!("{cache_size}/{block_size}/{associativity}way"),
        statistics: cache.statistics(),
    })
}
