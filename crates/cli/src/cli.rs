use clap::Parser;

/// Run a synthetic workload through a bounded-concurrency scheduler.
///
/// Submits `--tasks` sleeping tasks, waits for all of them, disposes the
/// scheduler, and reports its metrics.
#[derive(Parser, Debug)]
#[command(name = "fixpool", version, about)]
pub struct CliArgs {
    /// Path to a scheduler TOML config file.
    #[arg(long, env = "FIXPOOL_CONFIG")]
    pub config: Option<String>,

    /// Maximum worker threads (overrides config file and env).
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Number of tasks to submit.
    #[arg(long, default_value_t = 100)]
    pub tasks: usize,

    /// Lower bound of each task's sleep, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub min_sleep_ms: u64,

    /// Upper bound of each task's sleep, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub max_sleep_ms: u64,

    /// Make every Nth task panic (0 disables failure injection).
    #[arg(long, default_value_t = 0)]
    pub fail_every: usize,

    /// Print the final report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}
