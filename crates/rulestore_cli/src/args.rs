//! CLI argument definitions.
//!
//! Commands:
//! - rulestore --db <path> load [--ptype <ptype>]...
//! - rulestore --db <path> add <ptype> <token>...
//! - rulestore --db <path> remove <ptype> <token>...
//! - rulestore --db <path> remove-filtered <ptype> <field-index> <value>...

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and edit a policy rule store
#[derive(Parser, Debug)]
#[command(name = "rulestore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite database file, or `:memory:`
    #[arg(long, default_value = "./policy.db")]
    pub db: String,

    /// Policy table name
    #[arg(long, default_value = "casbin_rule")]
    pub table: String,

    /// Prefix prepended to the table name
    #[arg(long, default_value = "")]
    pub table_prefix: String,

    /// Give up waiting after this many milliseconds; the store work still finishes
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Absolute directory for rotated log files; logging is off when omitted
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print stored rules as JSON lines
    Load {
        /// Only print rules of these ptypes
        #[arg(long)]
        ptype: Vec<String>,
    },

    /// Store one rule (no-op when it already exists)
    Add {
        ptype: String,
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Delete one rule matching all tokens exactly
    Remove {
        ptype: String,
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Delete rules whose fields match the values from a field index on
    RemoveFiltered {
        ptype: String,
        field_index: usize,
        values: Vec<String>,
    },
}
