use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio - inspect and edit hierarchical content trees",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Base directory relative storage folders resolve against
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Object type config (TOML); defaults to a page tree under `pages`
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the node index and list every folder
    Index,
    /// List logical keys with their storage keys and timestamps
    Keys,
    /// Show one object by logical key
    Show(KeyArgs),
    /// Show the node meta behind a storage key
    Meta(StorageKeyArgs),
    /// Print a variant file as stored
    Raw(StorageKeyArgs),
    /// Print the frontmatter of a variant file
    Frontmatter(StorageKeyArgs),
    /// Print the file path a storage key maps to
    Path(StorageKeyArgs),
    /// Create an object, or merge fields into an existing one
    Update(UpdateArgs),
    /// Delete an object by logical key
    Remove(KeyArgs),
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Args)]
pub struct StorageKeyArgs {
    /// Storage key, e.g. `03.news|item.fr`
    pub storage_key: String,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Logical key of the object to update; omit to create
    pub key: Option<String>,
    /// Fields as a JSON object
    #[arg(long)]
    pub data: String,
}
