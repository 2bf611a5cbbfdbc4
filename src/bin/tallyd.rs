//! tally daemon - per-client running totals over TCP
//!
//! Thin wrapper so `cargo install tally` ships the `tallyd` binary.
//! See [`tallyd::cli`] for usage.

fn main() -> anyhow::Result<()> {
    tallyd::cli::run()
}
