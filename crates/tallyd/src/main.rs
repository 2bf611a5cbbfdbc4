//! tally daemon binary.
//!
//! See [`tallyd::cli`] for usage.

fn main() -> anyhow::Result<()> {
    tallyd::cli::run()
}
