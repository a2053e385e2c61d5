//! CLI argument definitions for the netconverge binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Offline inspection of what the reconciliation engine would send
#[derive(Parser, Debug)]
#[command(name = "netconverge")]
#[command(about = "netconverge: declarative configuration reconciliation for network elements")]
#[command(version)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the resource kinds of a schema document
    Schema(SchemaArgs),
    /// Print the path/value pairs a desired tree flattens to
    Flatten(FlattenArgs),
    /// Print the updates and deletes that converge an observed tree
    Diff(DiffArgs),
    /// Check the leaf references of a desired tree
    Validate(ValidateArgs),
    /// Run one reconcile cycle against a simulated element
    Plan(PlanArgs),
}

/// Where the schema document comes from.
#[derive(clap::Args, Debug)]
pub struct SchemaSource {
    /// Resource schema document (JSON)
    #[arg(short, long, env = "NETCONVERGE_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Engine config file, used for its `schema_path` when --schema is absent
    #[arg(short, long, env = "NETCONVERGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// A schema plus one resource kind from it.
#[derive(clap::Args, Debug)]
pub struct ResourceArgs {
    #[command(flatten)]
    pub source: SchemaSource,

    /// Resource kind to use from the schema
    #[arg(short, long)]
    pub kind: String,

    /// Desired tree of the resource (JSON)
    pub desired: PathBuf,
}

/// Arguments for the schema command
#[derive(clap::Args, Debug)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub source: SchemaSource,
}

/// Arguments for the flatten command
#[derive(clap::Args, Debug)]
pub struct FlattenArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    /// Keep marker fields in the output
    #[arg(long)]
    pub keep_markers: bool,
}

/// Arguments for the diff command
#[derive(clap::Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    /// Tree currently found at the resource root (JSON)
    pub observed: PathBuf,
}

/// Arguments for the validate command
#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    /// Full element configuration for the external leaf-ref rules (JSON)
    #[arg(long)]
    pub element_config: Option<PathBuf>,
}

/// Arguments for the plan command
#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    /// Tree the element holds at the resource root; absent means no data
    #[arg(long)]
    pub observed: Option<PathBuf>,

    /// Report the resource as existing on the element
    #[arg(long)]
    pub exists: bool,

    /// Report the element's cache as not ready
    #[arg(long)]
    pub cache_not_ready: bool,

    /// Full element configuration for the external leaf-ref rules (JSON)
    #[arg(long)]
    pub element_config: Option<PathBuf>,

    /// Index map persisted by the previous cycle (JSON object)
    #[arg(long)]
    pub index_map: Option<PathBuf>,
}
