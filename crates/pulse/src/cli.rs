use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets the level of tracing
    #[arg(long, global = true, ignore_case = true, default_value = "INFO")]
    pub trace: TraceLevel,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the providers on a schedule and serve the report API.
    Serve,

    /// Run a single polling pass and exit.
    Poll,

    /// Create the observations table in PostgreSQL.
    Migrate,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceLevel {
    DEBUG,
    INFO,
    WARN,
    ERROR,
}
