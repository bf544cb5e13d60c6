//! Command-line entry point over `rulestore_core`.
//!
//! # Responsibility
//! - Parse arguments, open the adapter and run exactly one command.
//! - Print errors to stderr and exit non-zero on failure.

mod args;

use args::{Cli, Command};
use clap::Parser;
use log::info;
use rulestore_core::model::policy::POLICY_SECTIONS;
use rulestore_core::model::rule::section_of;
use rulestore_core::{
    default_log_level, init_logging, AdapterConfig, AdapterError, Context, ContextAdapter,
    MemoryModel, PolicyModel, PolicyRow, RuleFilter,
};
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, &log_dir.to_string_lossy())?;
    }

    let mut config = AdapterConfig::new("sqlite", cli.db.as_str());
    config.table_name = cli.table.clone();
    config.table_prefix = cli.table_prefix.clone();
    let adapter = ContextAdapter::from_config(&config).map_err(describe)?;

    let ctx = match cli.timeout_ms {
        Some(ms) => Context::background().with_timeout(Duration::from_millis(ms)),
        None => Context::background(),
    };
    info!(
        "event=cli_command module=cli status=start command={:?}",
        cli.command
    );

    let result = match cli.command {
        Command::Load { ptype } => {
            let filter = RuleFilter::new().with_ptypes(ptype);
            let mut model = MemoryModel::new();
            adapter
                .load_filtered_policy_ctx(&ctx, &mut model, &filter)
                .await
                .and_then(|()| print_rules(&model))
        }
        Command::Add { ptype, tokens } => {
            adapter
                .add_policy_ctx(&ctx, section_of(&ptype), &ptype, &tokens)
                .await
        }
        Command::Remove { ptype, tokens } => {
            adapter
                .remove_policy_ctx(&ctx, section_of(&ptype), &ptype, &tokens)
                .await
        }
        Command::RemoveFiltered {
            ptype,
            field_index,
            values,
        } => {
            adapter
                .remove_filtered_policy_ctx(&ctx, section_of(&ptype), &ptype, field_index, &values)
                .await
        }
    };

    // A timed-out command may still be writing; let it land before exit.
    adapter.drain().await;
    result.map_err(describe)
}

fn print_rules(model: &MemoryModel) -> Result<(), AdapterError> {
    for sec in POLICY_SECTIONS {
        for (ptype, rule) in model.policy_rules(sec) {
            let row = PolicyRow::from_rule(&ptype, &rule)?;
            let line = serde_json::to_string(&row)
                .map_err(|err| AdapterError::Execution(format!("encode rule: {err}")))?;
            println!("{line}");
        }
    }
    Ok(())
}

fn describe(err: AdapterError) -> String {
    match err {
        AdapterError::Context(_) => format!("timed out: {err}"),
        other => other.to_string(),
    }
}
