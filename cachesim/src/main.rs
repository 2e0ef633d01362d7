use std::fs::{self, File};
use std::io::BufReader;

use clap::Parser;

use memhier::config::HierarchyConfig;
use memhier::hierarchy::CacheHierarchy;
use memhier::io::open_trace;
use memhier::trace::TraceReader;

#[derive(Parser, Debug)]
#[command(about = String::from("Multi-level cache hierarchy simulator"))]
struct Args {
    trace: String,

    /// Enable the stride prefetcher
    #[arg(short, long)]
    prefetch: bool,

    /// Use FIFO replacement instead of LRU
    #[arg(short, long)]
    fifo: bool,

    /// Attach a victim cache to L1
    #[arg(short, long)]
    victim: bool,

    /// JSON file overriding the default cache policies
    #[arg(short, long)]
    config: Option<String>,
}

fn main() -> Result<(), String> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("Couldn't open the config file at path {path}: {e}"))?;
            serde_json::from_reader(BufReader::new(file))
                .map_err(|e| format!("Couldn't parse the config file: {e}"))?
        }
        None => HierarchyConfig::default(),
    };
    config.prefetch |= args.prefetch;
    config.fifo |= args.fifo;
    config.victim |= args.victim;

    let mut hierarchy = CacheHierarchy::new(&config).map_err(|e| e.to_string())?;
    let reader = open_trace(&args.trace)
        .map_err(|e| format!("Couldn't open the trace file at path {}: {e}", args.trace))?;
    for event in TraceReader::new(reader) {
        let event = event.map_err(|e| e.to_string())?;
        hierarchy.access(event.op, event.addr);
    }

    println!("\n=== Cache Hierarchy Statistics ===");
    hierarchy.print_statistics();

    let csv_path = format!("{}_multi_level.csv", args.trace);
    fs::write(&csv_path, hierarchy.report().to_csv())
        .map_err(|e| format!("Couldn't write the results to {csv_path}: {e}"))?;
    println!("\nResults have been written to {csv_path}");
    Ok(())
}
