//! Context-aware policy persistence adapter.
//!
//! # Responsibility
//! - Expose load/save/add/remove/remove-filtered (plus batch, update and
//!   filtered-load) policy operations to an authorization engine.
//! - Run each operation as one store transaction through the injected
//!   `Executor`, bounded by the caller's `Context`.
//!
//! # Invariants
//! - A context that has already fired is reported before input validation.
//! - Input is validated before any store work is dispatched.
//! - A fired context yields `AdapterError::Context`, never a store error.
//! - After a context error the transaction may still commit or roll back in
//!   the background; callers must not assume the store kept its prior state.
//! - Loaded rows are applied to the model only once the store read finished,
//!   so a cancelled load leaves the model untouched.
//! - The adapter adds no locking between calls. Callers serialize concurrent
//!   whole-table saves themselves when ordering matters.

use crate::config::AdapterConfig;
use crate::context::Context;
use crate::db::{open_store, StoreResult, TableName};
use crate::error::{AdapterError, AdapterResult};
use crate::execute::{BlockingExecutor, Executor};
use crate::model::filter::RuleFilter;
use crate::model::policy::{PolicyModel, POLICY_SECTIONS};
use crate::model::rule::{
    section_of, validate_field_range, validate_ptype, PolicyRow, RuleValidationError,
};
use crate::repo::rule_repo::{RuleRepository, SqliteRuleRepository};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Policy adapter over a row repository and an execution strategy.
pub struct ContextAdapter<R = SqliteRuleRepository, E = BlockingExecutor> {
    repo: Arc<R>,
    executor: E,
    filtered: AtomicBool,
}

impl ContextAdapter {
    /// Opens the store named by `driver` and `dsn` with the default table.
    ///
    /// # Errors
    /// - `Store(UnsupportedDriver)` for non-SQLite drivers.
    /// - `Store(Sqlite)` when the database cannot be opened.
    pub fn new(driver: &str, dsn: &str) -> AdapterResult<Self> {
        Self::from_config(&AdapterConfig::new(driver, dsn))
    }

    /// Opens the store using table `prefix + table_name`.
    pub fn with_table_name(
        driver: &str,
        dsn: &str,
        table_name: &str,
        table_prefix: &str,
    ) -> AdapterResult<Self> {
        let mut config = AdapterConfig::new(driver, dsn);
        config.table_name = table_name.to_string();
        config.table_prefix = table_prefix.to_string();
        Self::from_config(&config)
    }

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Self> {
        let table = TableName::new(&config.table_prefix, &config.table_name)?;
        let conn = open_store(&config.driver, &config.dsn, config.busy_timeout())?;
        Ok(Self::with_parts(
            Arc::new(SqliteRuleRepository::new(conn, table)),
            BlockingExecutor::new(),
        ))
    }
}

impl<R: RuleRepository, E: Executor> ContextAdapter<R, E> {
    /// Builds an adapter from an explicit store handle and execution strategy.
    pub fn with_parts(repo: Arc<R>, executor: E) -> Self {
        Self {
            repo,
            executor,
            filtered: AtomicBool::new(false),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns whether the last load was a filtered load.
    pub fn is_filtered(&self) -> bool {
        self.filtered.load(Ordering::Acquire)
    }

    /// Waits for operations abandoned by timed-out calls to finish.
    pub async fn drain(&self) {
        self.executor.drain().await;
    }

    /// Loads every stored rule into `model`.
    pub async fn load_policy_ctx<M>(&self, ctx: &Context, model: &mut M) -> AdapterResult<()>
    where
        M: PolicyModel + ?Sized,
    {
        let rows = self
            .run(ctx, "policy_load", |repo| repo.load_rows(None))
            .await?;
        apply_rows(model, &rows);
        self.filtered.store(false, Ordering::Release);
        Ok(())
    }

    pub async fn load_policy<M>(&self, model: &mut M) -> AdapterResult<()>
    where
        M: PolicyModel + ?Sized,
    {
        self.load_policy_ctx(&Context::background(), model).await
    }

    /// Loads only the rules selected by `filter` and marks the adapter filtered.
    pub async fn load_filtered_policy_ctx<M>(
        &self,
        ctx: &Context,
        model: &mut M,
        filter: &RuleFilter,
    ) -> AdapterResult<()>
    where
        M: PolicyModel + ?Sized,
    {
        let filter = filter.clone();
        let rows = self
            .run(ctx, "policy_load_filtered", move |repo| {
                repo.load_rows(Some(&filter))
            })
            .await?;
        apply_rows(model, &rows);
        self.filtered.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn load_filtered_policy<M>(
        &self,
        model: &mut M,
        filter: &RuleFilter,
    ) -> AdapterResult<()>
    where
        M: PolicyModel + ?Sized,
    {
        self.load_filtered_policy_ctx(&Context::background(), model, filter)
            .await
    }

    /// Replaces the stored rule set with the rules currently in `model`.
    ///
    /// # Errors
    /// - `Validation(FilteredSave)` after a filtered load.
    pub async fn save_policy_ctx<M>(&self, ctx: &Context, model: &M) -> AdapterResult<()>
    where
        M: PolicyModel + ?Sized,
    {
        ensure_live(ctx)?;
        if self.is_filtered() {
            return Err(RuleValidationError::FilteredSave.into());
        }
        let rows = collect_rows(model)?;
        self.run(ctx, "policy_save", move |repo| repo.replace_all(&rows))
            .await
    }

    pub async fn save_policy<M>(&self, model: &M) -> AdapterResult<()>
    where
        M: PolicyModel + ?Sized,
    {
        self.save_policy_ctx(&Context::background(), model).await
    }

    /// Stores one rule. Adding a rule that already exists is a no-op.
    pub async fn add_policy_ctx<S: AsRef<str>>(
        &self,
        ctx: &Context,
        sec: &str,
        ptype: &str,
        rule: &[S],
    ) -> AdapterResult<()> {
        ensure_live(ctx)?;
        let row = PolicyRow::from_rule(ptype, rule)?;
        let inserted = self
            .run(ctx, "policy_add", move |repo| {
                repo.insert_rows(std::slice::from_ref(&row))
            })
            .await?;
        if inserted == 0 {
            info!("event=policy_add module=adapter status=noop sec={sec} ptype={ptype}");
        }
        Ok(())
    }

    pub async fn add_policy<S: AsRef<str>>(
        &self,
        sec: &str,
        ptype: &str,
        rule: &[S],
    ) -> AdapterResult<()> {
        self.add_policy_ctx(&Context::background(), sec, ptype, rule)
            .await
    }

    /// Stores several rules in one transaction, skipping existing ones.
    pub async fn add_policies_ctx<S: AsRef<str>>(
        &self,
        ctx: &Context,
        _sec: &str,
        ptype: &str,
        rules: &[Vec<S>],
    ) -> AdapterResult<()> {
        ensure_live(ctx)?;
        let rows = rows_from_rules(ptype, rules)?;
        self.run(ctx, "policy_add_batch", move |repo| repo.insert_rows(&rows))
            .await
            .map(|_| ())
    }

    pub async fn add_policies<S: AsRef<str>>(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<S>],
    ) -> AdapterResult<()> {
        self.add_policies_ctx(&Context::background(), sec, ptype, rules)
            .await
    }

    /// Deletes the rows exactly matching `(ptype, rule)`. Absent rules are fine.
    pub async fn remove_policy_ctx<S: AsRef<str>>(
        &self,
        ctx: &Context,
        _sec: &str,
        ptype: &str,
        rule: &[S],
    ) -> AdapterResult<()> {
        ensure_live(ctx)?;
        let row = PolicyRow::from_rule(ptype, rule)?;
        self.run(ctx, "policy_remove", move |repo| {
            repo.delete_rows(std::slice::from_ref(&row))
        })
        .await
        .map(|_| ())
    }

    pub async fn remove_policy<S: AsRef<str>>(
        &self,
        sec: &str,
        ptype: &str,
        rule: &[S],
    ) -> AdapterResult<()> {
        self.remove_policy_ctx(&Context::background(), sec, ptype, rule)
            .await
    }

    /// Deletes several rules in one transaction.
    pub async fn remove_policies_ctx<S: AsRef<str>>(
        &self,
        ctx: &Context,
        _sec: &str,
        ptype: &str,
        rules: &[Vec<S>],
    ) -> AdapterResult<()> {
        ensure_live(ctx)?;
        let rows = rows_from_rules(ptype, rules)?;
        self.run(ctx, "policy_remove_batch", move |repo| {
            repo.delete_rows(&rows)
        })
        .await
        .map(|_| ())
    }

    pub async fn remove_policies<S: AsRef<str>>(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<S>],
    ) -> AdapterResult<()> {
        self.remove_policies_ctx(&Context::background(), sec, ptype, rules)
            .await
    }

    /// Deletes rows of `ptype` matching `field_values` from column
    /// `v{field_index}` on. Empty values leave their column unconstrained.
    ///
    /// # Errors
    /// - `Validation(FieldIndexOutOfRange)` when the values do not fit `v0..v5`.
    pub async fn remove_filtered_policy_ctx<S: AsRef<str>>(
        &self,
        ctx: &Context,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[S],
    ) -> AdapterResult<()> {
        ensure_live(ctx)?;
        validate_ptype(ptype)?;
        validate_field_range(field_index, field_values.len())?;
        let ptype = ptype.to_string();
        let values: Vec<String> = field_values
            .iter()
            .map(|value| value.as_ref().to_string())
            .collect();
        self.run(ctx, "policy_remove_filtered", move |repo| {
            repo.delete_filtered(&ptype, field_index, &values)
        })
        .await
        .map(|_| ())
    }

    pub async fn remove_filtered_policy<S: AsRef<str>>(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[S],
    ) -> AdapterResult<()> {
        self.remove_filtered_policy_ctx(&Context::background(), sec, ptype, field_index, field_values)
            .await
    }

    /// Swaps `old_rule` for `new_rule` in one transaction (delete + insert).
    pub async fn update_policy_ctx<S: AsRef<str>>(
        &self,
        ctx: &Context,
        _sec: &str,
        ptype: &str,
        old_rule: &[S],
        new_rule: &[S],
    ) -> AdapterResult<()> {
        ensure_live(ctx)?;
        let old = PolicyRow::from_rule(ptype, old_rule)?;
        let new = PolicyRow::from_rule(ptype, new_rule)?;
        self.run(ctx, "policy_update", move |repo| {
            repo.replace_rows(std::slice::from_ref(&old), std::slice::from_ref(&new))
        })
        .await
    }

    pub async fn update_policy<S: AsRef<str>>(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: &[S],
        new_rule: &[S],
    ) -> AdapterResult<()> {
        self.update_policy_ctx(&Context::background(), sec, ptype, old_rule, new_rule)
            .await
    }

    async fn run<T, F>(&self, ctx: &Context, event: &'static str, op: F) -> AdapterResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> StoreResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        let started_at = Instant::now();
        let result = self
            .executor
            .execute(ctx, move || op(repo.as_ref()).map_err(AdapterError::from))
            .await;

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!("event={event} module=adapter status=ok duration_ms={duration_ms}"),
            Err(AdapterError::Context(err)) => warn!(
                "event={event} module=adapter status=timeout duration_ms={duration_ms} reason={err}"
            ),
            Err(err) => error!(
                "event={event} module=adapter status=error duration_ms={duration_ms} error={err}"
            ),
        }
        result
    }
}

fn ensure_live(ctx: &Context) -> AdapterResult<()> {
    match ctx.err() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn apply_rows<M: PolicyModel + ?Sized>(model: &mut M, rows: &[PolicyRow]) {
    for row in rows {
        model.load_policy_line(section_of(&row.ptype), &row.ptype, row.to_rule());
    }
}

fn collect_rows<M: PolicyModel + ?Sized>(model: &M) -> AdapterResult<Vec<PolicyRow>> {
    let mut rows = Vec::new();
    for sec in POLICY_SECTIONS {
        for (ptype, rule) in model.policy_rules(sec) {
            rows.push(PolicyRow::from_rule(&ptype, &rule)?);
        }
    }
    Ok(rows)
}

fn rows_from_rules<S: AsRef<str>>(ptype: &str, rules: &[Vec<S>]) -> AdapterResult<Vec<PolicyRow>> {
    rules
        .iter()
        .map(|rule| PolicyRow::from_rule(ptype, rule).map_err(AdapterError::from))
        .collect()
}
