// UTXO Cache Demo Binary
// Builds a parent/child cache pair, loads synthetic prevouts, spends some, commit-drains
// the child into the parent, and reports basic counts and timings.

use std::time::Instant;

use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;
use utxo_cache::UtxoCacheRegistry;

#[derive(Parser, Debug)]
#[command(author, version, about = "UTXO cache demo / micro-benchmark", long_about = None)]
struct Args {
    /// Number of synthetic prevouts to load into the parent cache
    #[arg(long, default_value_t = 100_000)]
    parent_size: usize,

    /// Number of synthetic prevouts to insert into the child cache before draining
    #[arg(long, default_value_t = 10_000)]
    child_size: usize,

    /// Fraction of the parent's entries to invalidate from the child before draining
    #[arg(long, default_value_t = 0.05)]
    spend_fraction: f64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn random_hash(rng: &mut StdRng) -> [u8; 32] {
    let mut hash = [0u8; 32];
    rng.fill(&mut hash);
    hash
}

fn main() {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let log_level = if args.debug { "debug" } else { "info" };
        EnvFilter::new(log_level)
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = UtxoCacheRegistry::init();
    let parent = registry.create_cache();
    let child = registry.create_cache();
    registry.set_master_cache(child, parent);

    let mut rng = StdRng::seed_from_u64(0);
    let mut parent_hashes = Vec::with_capacity(args.parent_size);

    info!(count = args.parent_size, "loading parent cache");
    let load_start = Instant::now();
    for i in 0..args.parent_size {
        let hash = random_hash(&mut rng);
        parent_hashes.push(hash);
        registry.cache_utxo(parent, hash, 0, i as i64);
    }
    info!(elapsed = ?load_start.elapsed(), "parent cache loaded");

    let spend_count = (parent_hashes.len() as f64 * args.spend_fraction) as usize;
    info!(spend_count, "spending a fraction of the parent's entries via the child");
    for hash in parent_hashes.iter().take(spend_count) {
        registry.invalidate_utxo(child, *hash, 0);
    }

    info!(count = args.child_size, "inserting new entries into the child cache");
    for i in 0..args.child_size {
        registry.cache_utxo(child, random_hash(&mut rng), 0, (args.parent_size + i) as i64);
    }

    info!("commit-draining child into parent");
    let drain_start = Instant::now();
    registry.commit_drain(parent, child);
    info!(elapsed = ?drain_start.elapsed(), "commit_drain complete");

    let lookup_sample = parent_hashes.len().min(1_000);
    let lookup_start = Instant::now();
    let mut hits = 0u32;
    for hash in parent_hashes.iter().take(lookup_sample) {
        if registry.get_cached_utxo(parent, *hash, 0) != utxo_cache::MISSING_OUTPUT_ID {
            hits += 1;
        }
    }
    info!(
        sample = lookup_sample,
        hits,
        elapsed = ?lookup_start.elapsed(),
        "post-drain lookup sample complete"
    );
}
