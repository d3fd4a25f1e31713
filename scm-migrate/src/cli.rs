use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "scm-migrate")]
#[command(about = "Capture, order, and migrate configuration entities between management systems")]
pub struct Cli {
    /// Engine configuration file. Defaults to ./migrate.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Capture a source snapshot into a configuration graph.
    Capture(CaptureArgs),
    /// Show dependency order, edges, and unresolved references.
    Deps(DepsArgs),
    /// List entities as default or custom, with the reason.
    Classify(ClassifyArgs),
    /// Plan a push against a target snapshot without writing.
    Plan(PlanArgs),
    /// Push a graph into a target snapshot.
    Push(PushArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum StrategyArg {
    Skip,
    Overwrite,
    Rename,
    Defer,
}

#[derive(Parser, Debug)]
pub struct CaptureArgs {
    /// Source snapshot (JSON) to capture from.
    #[arg(long)]
    pub source: PathBuf,
    /// Capture only these folders (repeatable). Default: discover all containers.
    #[arg(long)]
    pub folder: Vec<String>,
    /// Capture only these snippets (repeatable).
    #[arg(long)]
    pub snippet: Vec<String>,
    /// Capture only these entity types (repeatable). Default: all types.
    #[arg(long = "type")]
    pub types: Vec<String>,
    /// Leave entities classified as defaults out of the graph.
    #[arg(long)]
    pub exclude_defaults: bool,
    /// Where to write the captured graph.
    #[arg(long)]
    pub output: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Captured graph (JSON).
    pub graph: PathBuf,
    /// Also list everything that depends on this entity (<type>:<name>@<container>).
    #[arg(long)]
    pub impact: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Captured graph (JSON).
    pub graph: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Captured graph (JSON).
    pub graph: PathBuf,
    /// Target snapshot (JSON).
    #[arg(long)]
    pub target: PathBuf,
    /// Conflict strategy. Defaults to the configured strategy.
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
    /// Plan defaults too.
    #[arg(long)]
    pub include_defaults: bool,
    /// Write the plan as JSON.
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Captured graph (JSON).
    pub graph: PathBuf,
    /// Target snapshot (JSON); updated in place unless --dry-run.
    #[arg(long)]
    pub target: PathBuf,
    /// Conflict strategy. Defaults to the configured strategy.
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
    /// Walk the plan without writing anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Push defaults too.
    #[arg(long)]
    pub include_defaults: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
