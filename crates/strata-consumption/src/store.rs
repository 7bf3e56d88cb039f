//! SQLite-backed consumption store.
//!
//! One connection guarded by a mutex; every public operation runs in
//! its own transaction. Window resets are lazy: the hourly and daily
//! counters reset the first time an operation observes that their
//! reset instant has passed. Period rollover is likewise checked by
//! every operation, so the first call after a month boundary archives
//! the old counters before doing anything else.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use strata_core::{OwnerId, SessionId};

use crate::error::{ConsumptionError, ConsumptionResult};
use crate::model::{
    ConsumptionLimits, ConsumptionSummary, PeriodArchiveRow, RateDecision, TurnRecord, TurnStatus,
};

/// SQLite-backed consumption store.
pub struct ConsumptionStore {
    conn: Mutex<Connection>,
    default_limits: ConsumptionLimits,
}

impl ConsumptionStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn new(path: impl AsRef<Path>, default_limits: ConsumptionLimits) -> ConsumptionResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_limits,
        })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory(default_limits: ConsumptionLimits) -> ConsumptionResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_limits,
        })
    }

    fn init_schema(conn: &Connection) -> ConsumptionResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_consumption (
                owner_id TEXT PRIMARY KEY,
                current_period TEXT NOT NULL,
                period_started_at TEXT NOT NULL,
                hour_reset_at TEXT NOT NULL,
                day_reset_at TEXT NOT NULL,
                requests_this_hour INTEGER NOT NULL DEFAULT 0,
                requests_today INTEGER NOT NULL DEFAULT 0,
                peak_requests_per_hour INTEGER NOT NULL DEFAULT 0,
                peak_requests_per_day INTEGER NOT NULL DEFAULT 0,
                prompts_per_hour_limit INTEGER NOT NULL,
                prompts_per_day_limit INTEGER NOT NULL,
                input_tokens_limit INTEGER,
                output_tokens_limit INTEGER,
                total_input_tokens INTEGER NOT NULL DEFAULT 0,
                total_output_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                total_turns INTEGER NOT NULL DEFAULT 0,
                successful_turns INTEGER NOT NULL DEFAULT 0,
                failed_turns INTEGER NOT NULL DEFAULT 0,
                rag_guided_turns INTEGER NOT NULL DEFAULT 0,
                rag_output_tokens_saved INTEGER NOT NULL DEFAULT 0,
                champion_cases_created INTEGER NOT NULL DEFAULT 0,
                estimated_cost_micro_usd INTEGER NOT NULL DEFAULT 0,
                rag_cost_saved_micro_usd INTEGER NOT NULL DEFAULT 0,
                total_sessions INTEGER NOT NULL DEFAULT 0,
                active_sessions INTEGER NOT NULL DEFAULT 0,
                sessions_last_24h INTEGER NOT NULL DEFAULT 0,
                turns_last_24h INTEGER NOT NULL DEFAULT 0,
                models_used TEXT,
                providers_used TEXT,
                first_usage_at TEXT,
                last_usage_at TEXT,
                last_updated_at TEXT
            );
            CREATE TABLE IF NOT EXISTS consumption_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                turn_number INTEGER NOT NULL,
                user_query TEXT,
                session_name TEXT,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                cost_micro_usd INTEGER NOT NULL,
                status TEXT NOT NULL,
                rag_used INTEGER NOT NULL DEFAULT 0,
                rag_tokens_saved INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_owner_session
                ON consumption_turns(owner_id, session_id);
            CREATE INDEX IF NOT EXISTS idx_turns_created
                ON consumption_turns(created_at);
            CREATE TABLE IF NOT EXISTS consumption_periods_archive (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                period TEXT NOT NULL,
                total_input_tokens INTEGER NOT NULL,
                total_output_tokens INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                successful_turns INTEGER NOT NULL,
                failed_turns INTEGER NOT NULL,
                total_turns INTEGER NOT NULL,
                rag_guided_turns INTEGER NOT NULL,
                rag_output_tokens_saved INTEGER NOT NULL,
                champion_cases_created INTEGER NOT NULL,
                estimated_cost_micro_usd INTEGER NOT NULL,
                rag_cost_saved_micro_usd INTEGER NOT NULL,
                total_sessions INTEGER NOT NULL,
                period_started_at TEXT NOT NULL,
                period_ended_at TEXT NOT NULL,
                archived_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> ConsumptionResult<T>,
    ) -> ConsumptionResult<T> {
        let mut conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Create the owner's consumption row if absent.
    fn ensure_owner_tx(
        &self,
        tx: &Transaction<'_>,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<()> {
        let limits = self.default_limits;
        tx.execute(
            "INSERT OR IGNORE INTO user_consumption (
                owner_id, current_period, period_started_at,
                hour_reset_at, day_reset_at,
                prompts_per_hour_limit, prompts_per_day_limit,
                input_tokens_limit, output_tokens_limit
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                owner_id.to_string(),
                period_of(now),
                period_start(now).to_rfc3339(),
                hour_reset_after(now).to_rfc3339(),
                day_reset_after(now).to_rfc3339(),
                limits.prompts_per_hour,
                limits.prompts_per_day,
                limits.input_tokens_per_month.map(u64_to_i64),
                limits.output_tokens_per_month.map(u64_to_i64),
            ],
        )?;
        Ok(())
    }

    /// Archive and reset the owner's counters if the month changed.
    fn rollover_tx(
        tx: &Transaction<'_>,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<bool> {
        let owner = owner_id.to_string();
        let current: Option<String> = tx
            .query_row(
                "SELECT current_period FROM user_consumption WHERE owner_id = ?1",
                params![owner],
                |row| row.get(0),
            )
            .optional()?;

        let Some(stored_period) = current else {
            return Ok(false);
        };
        let wall_period = period_of(now);
        if stored_period == wall_period {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO consumption_periods_archive (
                owner_id, period,
                total_input_tokens, total_output_tokens, total_tokens,
                successful_turns, failed_turns, total_turns,
                rag_guided_turns, rag_output_tokens_saved, champion_cases_created,
                estimated_cost_micro_usd, rag_cost_saved_micro_usd, total_sessions,
                period_started_at, period_ended_at, archived_at
            )
            SELECT owner_id, current_period,
                total_input_tokens, total_output_tokens, total_tokens,
                successful_turns, failed_turns, total_turns,
                rag_guided_turns, rag_output_tokens_saved, champion_cases_created,
                estimated_cost_micro_usd, rag_cost_saved_micro_usd, total_sessions,
                period_started_at, ?2, ?2
            FROM user_consumption WHERE owner_id = ?1",
            params![owner, now.to_rfc3339()],
        )?;

        tx.execute(
            "UPDATE user_consumption SET
                current_period = ?2,
                period_started_at = ?3,
                total_input_tokens = 0, total_output_tokens = 0, total_tokens = 0,
                successful_turns = 0, failed_turns = 0, total_turns = 0,
                rag_guided_turns = 0, rag_output_tokens_saved = 0,
                champion_cases_created = 0,
                estimated_cost_micro_usd = 0, rag_cost_saved_micro_usd = 0,
                total_sessions = 0,
                sessions_last_24h = 0, turns_last_24h = 0,
                peak_requests_per_hour = 0, peak_requests_per_day = 0,
                models_used = NULL, providers_used = NULL
            WHERE owner_id = ?1",
            params![owner, wall_period, period_start(now).to_rfc3339()],
        )?;

        info!(owner = %owner_id, from = %stored_period, to = %wall_period, "Rolled over consumption period");
        Ok(true)
    }

    /// Check hourly and daily rate limits, lazily resetting expired
    /// windows.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn check_rate(&self, owner_id: OwnerId) -> ConsumptionResult<RateDecision> {
        self.check_rate_at(owner_id, Utc::now())
    }

    /// [`Self::check_rate`] with an injectable clock.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn check_rate_at(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<RateDecision> {
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)?;
            let owner = owner_id.to_string();

            let (hour_reset, day_reset): (String, String) = tx.query_row(
                "SELECT hour_reset_at, day_reset_at FROM user_consumption WHERE owner_id = ?1",
                params![owner],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            if parse_ts(&hour_reset).is_none_or(|t| now >= t) {
                tx.execute(
                    "UPDATE user_consumption
                     SET requests_this_hour = 0, hour_reset_at = ?2
                     WHERE owner_id = ?1",
                    params![owner, hour_reset_after(now).to_rfc3339()],
                )?;
            }
            if parse_ts(&day_reset).is_none_or(|t| now >= t) {
                tx.execute(
                    "UPDATE user_consumption
                     SET requests_today = 0, day_reset_at = ?2
                     WHERE owner_id = ?1",
                    params![owner, day_reset_after(now).to_rfc3339()],
                )?;
            }

            let (this_hour, today, hour_limit, day_limit, hour_reset, day_reset): (
                u32,
                u32,
                u32,
                u32,
                String,
                String,
            ) = tx.query_row(
                "SELECT requests_this_hour, requests_today,
                        prompts_per_hour_limit, prompts_per_day_limit,
                        hour_reset_at, day_reset_at
                 FROM user_consumption WHERE owner_id = ?1",
                params![owner],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )?;

            if this_hour >= hour_limit {
                return Ok(RateDecision::reject(
                    format!("hourly limit exceeded ({hour_limit} requests/hour)"),
                    secs_until(&hour_reset, now),
                ));
            }
            if today >= day_limit {
                return Ok(RateDecision::reject(
                    format!("daily limit exceeded ({day_limit} requests/day)"),
                    secs_until(&day_reset, now),
                ));
            }
            Ok(RateDecision::allow())
        })
    }

    /// Check the monthly token quotas.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn check_quota(&self, owner_id: OwnerId) -> ConsumptionResult<RateDecision> {
        self.check_quota_at(owner_id, Utc::now())
    }

    /// [`Self::check_quota`] with an injectable clock.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn check_quota_at(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<RateDecision> {
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)?;

            let (input_used, output_used, input_limit, output_limit): (
                i64,
                i64,
                Option<i64>,
                Option<i64>,
            ) = tx.query_row(
                "SELECT total_input_tokens, total_output_tokens,
                        input_tokens_limit, output_tokens_limit
                 FROM user_consumption WHERE owner_id = ?1",
                params![owner_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

            if let Some(limit) = input_limit
                && input_used >= limit
            {
                return Ok(RateDecision::reject(
                    format!("input token quota exceeded ({limit} tokens/month)"),
                    None,
                ));
            }
            if let Some(limit) = output_limit
                && output_used >= limit
            {
                return Ok(RateDecision::reject(
                    format!("output token quota exceeded ({limit} tokens/month)"),
                    None,
                ));
            }
            Ok(RateDecision::allow())
        })
    }

    /// Increment hour/day request counters and peaks. Call at the
    /// start of each admitted request.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn increment_request(&self, owner_id: OwnerId) -> ConsumptionResult<()> {
        self.increment_request_at(owner_id, Utc::now())
    }

    /// [`Self::increment_request`] with an injectable clock.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn increment_request_at(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<()> {
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)?;
            tx.execute(
                "UPDATE user_consumption SET
                    requests_this_hour = requests_this_hour + 1,
                    requests_today = requests_today + 1,
                    peak_requests_per_hour = MAX(peak_requests_per_hour, requests_this_hour + 1),
                    peak_requests_per_day = MAX(peak_requests_per_day, requests_today + 1),
                    last_updated_at = ?2
                 WHERE owner_id = ?1",
                params![owner_id.to_string(), now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Record a completed turn: aggregate counters plus an immutable
    /// audit row.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn record_turn(&self, owner_id: OwnerId, record: &TurnRecord) -> ConsumptionResult<()> {
        self.record_turn_at(owner_id, record, Utc::now())
    }

    /// [`Self::record_turn`] with an injectable clock.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    #[allow(clippy::too_many_lines)]
    pub fn record_turn_at(
        &self,
        owner_id: OwnerId,
        record: &TurnRecord,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<()> {
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)?;
            let owner = owner_id.to_string();

            let total_tokens = record.input_tokens.saturating_add(record.output_tokens);
            let (success_inc, failure_inc) = match record.status {
                TurnStatus::Success => (1i64, 0i64),
                TurnStatus::Failure => (0, 1),
                TurnStatus::Partial => (0, 0),
            };
            let (rag_inc, rag_saved) = if record.rag_used {
                (1i64, u64_to_i64(record.rag_tokens_saved))
            } else {
                (0, 0)
            };
            // Approximate savings at the turn's own output-token rate.
            let rag_cost_saved = if record.rag_used && record.rag_tokens_saved > 0 {
                record
                    .cost_micro_usd
                    .checked_div(record.output_tokens)
                    .map_or(0, |per_token| {
                        per_token.saturating_mul(record.rag_tokens_saved)
                    })
            } else {
                0
            };

            tx.execute(
                "UPDATE user_consumption SET
                    total_input_tokens = total_input_tokens + ?2,
                    total_output_tokens = total_output_tokens + ?3,
                    total_tokens = total_tokens + ?4,
                    total_turns = total_turns + 1,
                    successful_turns = successful_turns + ?5,
                    failed_turns = failed_turns + ?6,
                    rag_guided_turns = rag_guided_turns + ?7,
                    rag_output_tokens_saved = rag_output_tokens_saved + ?8,
                    estimated_cost_micro_usd = estimated_cost_micro_usd + ?9,
                    rag_cost_saved_micro_usd = rag_cost_saved_micro_usd + ?10,
                    turns_last_24h = turns_last_24h + 1,
                    first_usage_at = COALESCE(first_usage_at, ?11),
                    last_usage_at = ?11,
                    last_updated_at = ?11
                 WHERE owner_id = ?1",
                params![
                    owner,
                    u64_to_i64(record.input_tokens),
                    u64_to_i64(record.output_tokens),
                    u64_to_i64(total_tokens),
                    success_inc,
                    failure_inc,
                    rag_inc,
                    rag_saved,
                    u64_to_i64(record.cost_micro_usd),
                    u64_to_i64(rag_cost_saved),
                    now.to_rfc3339(),
                ],
            )?;

            // Per-model and per-provider tallies live in JSON columns.
            let (models_json, providers_json): (Option<String>, Option<String>) = tx.query_row(
                "SELECT models_used, providers_used FROM user_consumption WHERE owner_id = ?1",
                params![owner],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let models = bump_tally(models_json.as_deref(), &record.model, "models_used")?;
            let providers =
                bump_tally(providers_json.as_deref(), &record.provider, "providers_used")?;
            tx.execute(
                "UPDATE user_consumption SET models_used = ?2, providers_used = ?3
                 WHERE owner_id = ?1",
                params![owner, models, providers],
            )?;

            tx.execute(
                "INSERT INTO consumption_turns (
                    owner_id, session_id, turn_number, user_query, session_name,
                    input_tokens, output_tokens, total_tokens,
                    provider, model, cost_micro_usd, status,
                    rag_used, rag_tokens_saved, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    owner,
                    record.session_id.to_string(),
                    u64_to_i64(record.turn_number),
                    record.query_preview,
                    record.session_name,
                    u64_to_i64(record.input_tokens),
                    u64_to_i64(record.output_tokens),
                    u64_to_i64(total_tokens),
                    record.provider,
                    record.model,
                    u64_to_i64(record.cost_micro_usd),
                    record.status.as_str(),
                    record.rag_used,
                    u64_to_i64(record.rag_tokens_saved),
                    now.to_rfc3339(),
                ],
            )?;

            debug!(
                owner = %owner_id,
                session = %record.session_id,
                turn = record.turn_number,
                tokens = total_tokens,
                status = record.status.as_str(),
                "Recorded turn"
            );
            Ok(())
        })
    }

    /// Count a session once: increments only when no prior turn exists
    /// for this `session_id`. Returns whether counters were bumped.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn increment_session_count(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
        is_new: bool,
    ) -> ConsumptionResult<bool> {
        let now = Utc::now();
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)?;
            let owner = owner_id.to_string();

            let mut bumped = false;
            if is_new {
                let seen: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM consumption_turns
                         WHERE owner_id = ?1 AND session_id = ?2 LIMIT 1",
                        params![owner, session_id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if seen.is_none() {
                    tx.execute(
                        "UPDATE user_consumption SET
                            total_sessions = total_sessions + 1,
                            active_sessions = active_sessions + 1,
                            sessions_last_24h = sessions_last_24h + 1
                         WHERE owner_id = ?1",
                        params![owner],
                    )?;
                    bumped = true;
                }
            }

            tx.execute(
                "UPDATE user_consumption SET last_updated_at = ?2 WHERE owner_id = ?1",
                params![owner, now.to_rfc3339()],
            )?;
            Ok(bumped)
        })
    }

    /// Decrement the active-session gauge when a session closes.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn decrement_active_sessions(&self, owner_id: OwnerId) -> ConsumptionResult<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE user_consumption
                 SET active_sessions = MAX(active_sessions - 1, 0), last_updated_at = ?2
                 WHERE owner_id = ?1",
                params![owner_id.to_string(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Increment the champion-case counter.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn increment_champion_cases(&self, owner_id: OwnerId, count: u64) -> ConsumptionResult<()> {
        let now = Utc::now();
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            tx.execute(
                "UPDATE user_consumption
                 SET champion_cases_created = champion_cases_created + ?2,
                     last_updated_at = ?3
                 WHERE owner_id = ?1",
                params![owner_id.to_string(), u64_to_i64(count), now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Stamp a display name onto all of a session's turn rows.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn update_session_name(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
        session_name: &str,
    ) -> ConsumptionResult<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE consumption_turns SET session_name = ?3
                 WHERE owner_id = ?1 AND session_id = ?2",
                params![owner_id.to_string(), session_id.to_string(), session_name],
            )?;
            Ok(())
        })
    }

    /// Force a period rollover check.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn rollover_period(&self, owner_id: OwnerId) -> ConsumptionResult<bool> {
        self.rollover_period_at(owner_id, Utc::now())
    }

    /// [`Self::rollover_period`] with an injectable clock.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn rollover_period_at(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<bool> {
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)
        })
    }

    /// Full consumption snapshot for the owner.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or corrupt JSON tallies.
    pub fn summary(&self, owner_id: OwnerId) -> ConsumptionResult<ConsumptionSummary> {
        self.summary_at(owner_id, Utc::now())
    }

    /// [`Self::summary`] with an injectable clock.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or corrupt JSON tallies.
    #[allow(clippy::too_many_lines)]
    pub fn summary_at(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> ConsumptionResult<ConsumptionSummary> {
        self.with_tx(|tx| {
            self.ensure_owner_tx(tx, owner_id, now)?;
            Self::rollover_tx(tx, owner_id, now)?;

            tx.query_row(
                "SELECT current_period, requests_this_hour, requests_today,
                        prompts_per_hour_limit, prompts_per_day_limit,
                        total_input_tokens, total_output_tokens,
                        input_tokens_limit, output_tokens_limit,
                        total_turns, successful_turns, failed_turns,
                        rag_guided_turns, rag_output_tokens_saved,
                        champion_cases_created,
                        estimated_cost_micro_usd, rag_cost_saved_micro_usd,
                        total_sessions, sessions_last_24h, turns_last_24h,
                        peak_requests_per_hour, peak_requests_per_day,
                        models_used, providers_used,
                        first_usage_at, last_usage_at
                 FROM user_consumption WHERE owner_id = ?1",
                params![owner_id.to_string()],
                |row| {
                    let requests_this_hour: u32 = row.get(1)?;
                    let requests_today: u32 = row.get(2)?;
                    let hour_limit: u32 = row.get(3)?;
                    let day_limit: u32 = row.get(4)?;
                    let models_json: Option<String> = row.get(22)?;
                    let providers_json: Option<String> = row.get(23)?;
                    let first_usage: Option<String> = row.get(24)?;
                    let last_usage: Option<String> = row.get(25)?;
                    Ok(ConsumptionSummary {
                        owner_id,
                        current_period: row.get(0)?,
                        requests_this_hour,
                        requests_today,
                        prompts_per_hour_limit: hour_limit,
                        prompts_per_day_limit: day_limit,
                        remaining_this_hour: hour_limit.saturating_sub(requests_this_hour),
                        remaining_today: day_limit.saturating_sub(requests_today),
                        total_input_tokens: i64_to_u64(row.get(5)?),
                        total_output_tokens: i64_to_u64(row.get(6)?),
                        input_tokens_limit: row.get::<_, Option<i64>>(7)?.map(i64_to_u64),
                        output_tokens_limit: row.get::<_, Option<i64>>(8)?.map(i64_to_u64),
                        total_turns: i64_to_u64(row.get(9)?),
                        successful_turns: i64_to_u64(row.get(10)?),
                        failed_turns: i64_to_u64(row.get(11)?),
                        rag_guided_turns: i64_to_u64(row.get(12)?),
                        rag_output_tokens_saved: i64_to_u64(row.get(13)?),
                        champion_cases_created: i64_to_u64(row.get(14)?),
                        estimated_cost_micro_usd: i64_to_u64(row.get(15)?),
                        rag_cost_saved_micro_usd: i64_to_u64(row.get(16)?),
                        total_sessions: i64_to_u64(row.get(17)?),
                        sessions_last_24h: i64_to_u64(row.get(18)?),
                        turns_last_24h: i64_to_u64(row.get(19)?),
                        peak_requests_per_hour: row.get(20)?,
                        peak_requests_per_day: row.get(21)?,
                        models_used: parse_tally(models_json.as_deref()),
                        providers_used: parse_tally(providers_json.as_deref()),
                        first_usage_at: first_usage.as_deref().and_then(parse_ts_str),
                        last_usage_at: last_usage.as_deref().and_then(parse_ts_str),
                    })
                },
            )
            .map_err(ConsumptionError::from)
        })
    }

    /// Archived periods for an owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn archived_periods(&self, owner_id: OwnerId) -> ConsumptionResult<Vec<PeriodArchiveRow>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT period, total_input_tokens, total_output_tokens, total_turns,
                        estimated_cost_micro_usd, archived_at
                 FROM consumption_periods_archive
                 WHERE owner_id = ?1 ORDER BY period DESC",
            )?;
            let rows = stmt.query_map(params![owner_id.to_string()], |row| {
                let archived: String = row.get(5)?;
                Ok(PeriodArchiveRow {
                    period: row.get(0)?,
                    total_input_tokens: i64_to_u64(row.get(1)?),
                    total_output_tokens: i64_to_u64(row.get(2)?),
                    total_turns: i64_to_u64(row.get(3)?),
                    estimated_cost_micro_usd: i64_to_u64(row.get(4)?),
                    archived_at: parse_ts_str(&archived).unwrap_or_else(Utc::now),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(ConsumptionError::from)
        })
    }

    /// Delete turn audit rows older than `days_to_keep`. Returns the
    /// number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn cleanup_old_turns(&self, days_to_keep: u32) -> ConsumptionResult<usize> {
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(chrono::Duration::days(i64::from(days_to_keep)))
            .unwrap_or(now);
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM consumption_turns WHERE created_at < ?1",
                params![cutoff.to_rfc3339()],
            )?;
            Ok(removed)
        })
    }
}

impl std::fmt::Debug for ConsumptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumptionStore").finish_non_exhaustive()
    }
}

/// `YYYY-MM` accounting period of an instant.
fn period_of(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// First instant of the month containing `now`.
fn period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Top of the next hour.
fn hour_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
        .single()
        .unwrap_or(now);
    floor
        .checked_add_signed(chrono::Duration::hours(1))
        .unwrap_or(now)
}

/// Next UTC midnight.
fn day_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    floor
        .checked_add_signed(chrono::Duration::days(1))
        .unwrap_or(now)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    parse_ts_str(s)
}

fn parse_ts_str(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn secs_until(reset: &str, now: DateTime<Utc>) -> Option<u64> {
    parse_ts(reset).map(|t| {
        let secs = t.signed_duration_since(now).num_seconds();
        u64::try_from(secs.max(1)).unwrap_or(1)
    })
}

fn bump_tally(json: Option<&str>, key: &str, column: &str) -> ConsumptionResult<String> {
    let mut tally: HashMap<String, u64> = match json {
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| ConsumptionError::CorruptColumn {
                column: column.to_string(),
                reason: e.to_string(),
            })?
        },
        None => HashMap::new(),
    };
    let entry = tally.entry(key.to_string()).or_insert(0);
    *entry = entry.saturating_add(1);
    serde_json::to_string(&tally).map_err(|e| ConsumptionError::CorruptColumn {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

fn parse_tally(json: Option<&str>) -> HashMap<String, u64> {
    json.and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

#[allow(clippy::cast_possible_wrap)]
const fn u64_to_i64(v: u64) -> i64 {
    if v > i64::MAX as u64 { i64::MAX } else { v as i64 }
}

#[allow(clippy::cast_sign_loss)]
const fn i64_to_u64(v: i64) -> u64 {
    if v < 0 { 0 } else { v as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(per_hour: u32, per_day: u32) -> ConsumptionLimits {
        ConsumptionLimits {
            prompts_per_hour: per_hour,
            prompts_per_day: per_day,
            input_tokens_per_month: Some(1_000),
            output_tokens_per_month: Some(500),
        }
    }

    fn record(input: u64, output: u64, status: TurnStatus) -> TurnRecord {
        TurnRecord {
            session_id: SessionId::new(),
            turn_number: 1,
            input_tokens: input,
            output_tokens: output,
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            status,
            rag_used: false,
            rag_tokens_saved: 0,
            cost_micro_usd: 100,
            query_preview: Some("show top products".into()),
            session_name: None,
        }
    }

    #[test]
    fn test_rate_limit_boundary() {
        let store = ConsumptionStore::in_memory(limits(2, 100)).unwrap();
        let owner = OwnerId::new();
        let now = Utc::now();

        assert!(store.check_rate_at(owner, now).unwrap().allowed);
        store.increment_request_at(owner, now).unwrap();
        assert!(store.check_rate_at(owner, now).unwrap().allowed);
        store.increment_request_at(owner, now).unwrap();

        // Hourly counter is at its limit: immediate rejection.
        let decision = store.check_rate_at(owner, now).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("hourly limit exceeded"));
        assert!(decision.retry_after_secs.unwrap() > 0);
    }

    #[test]
    fn test_hourly_window_resets() {
        let store = ConsumptionStore::in_memory(limits(1, 100)).unwrap();
        let owner = OwnerId::new();
        let now = Utc::now();

        store.increment_request_at(owner, now).unwrap();
        assert!(!store.check_rate_at(owner, now).unwrap().allowed);

        // Two hours later the window has rolled.
        let later = now + chrono::Duration::hours(2);
        assert!(store.check_rate_at(owner, later).unwrap().allowed);
    }

    #[test]
    fn test_quota_enforced_on_next_request() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();

        // A turn that lands within 10 tokens of the input quota...
        let mut r = record(990, 0, TurnStatus::Success);
        r.input_tokens = 990;
        store.record_turn(owner, &r).unwrap();
        assert!(store.check_quota(owner).unwrap().allowed);

        // ...and one that crosses it. The turn itself is recorded in
        // full; only the next check rejects.
        store.record_turn(owner, &record(20, 0, TurnStatus::Success)).unwrap();
        let decision = store.check_quota(owner).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("input token quota"));
    }

    #[test]
    fn test_token_totals_are_sum_of_turns() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();

        let turns = [(100u64, 10u64), (200, 20), (50, 5)];
        for (input, output) in turns {
            store
                .record_turn(owner, &record(input, output, TurnStatus::Success))
                .unwrap();
        }

        let summary = store.summary(owner).unwrap();
        assert_eq!(summary.total_input_tokens, 350);
        assert_eq!(summary.total_output_tokens, 35);
        assert_eq!(summary.total_turns, 3);
        assert_eq!(summary.successful_turns, 3);
        assert_eq!(summary.models_used["claude-sonnet-4-20250514"], 3);
        assert_eq!(summary.providers_used["anthropic"], 3);
    }

    #[test]
    fn test_session_count_idempotent() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();
        let session = SessionId::new();

        assert!(store.increment_session_count(owner, session, true).unwrap());

        // Record a turn for that session; subsequent calls see it.
        let mut r = record(10, 1, TurnStatus::Success);
        r.session_id = session;
        store.record_turn(owner, &r).unwrap();
        assert!(!store.increment_session_count(owner, session, true).unwrap());

        let summary = store.summary(owner).unwrap();
        assert_eq!(summary.total_sessions, 1);
    }

    #[test]
    fn test_rollover_archives_and_resets() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();
        let january = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();

        store
            .record_turn_at(owner, &record(100, 10, TurnStatus::Success), january)
            .unwrap();

        // Any operation in February triggers the rollover.
        let february = Utc.with_ymd_and_hms(2026, 2, 1, 0, 30, 0).unwrap();
        let summary = store.summary_at(owner, february).unwrap();
        assert_eq!(summary.current_period, "2026-02");
        assert_eq!(summary.total_input_tokens, 0);
        assert_eq!(summary.total_turns, 0);
        assert_eq!(summary.turns_last_24h, 0);

        let archives = store.archived_periods(owner).unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].period, "2026-01");
        assert_eq!(archives[0].total_input_tokens, 100);
        assert_eq!(archives[0].total_turns, 1);
    }

    #[test]
    fn test_rollover_is_idempotent_within_month() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();
        let now = Utc::now();

        store.increment_request_at(owner, now).unwrap();
        assert!(!store.rollover_period_at(owner, now).unwrap());
        assert!(store.archived_periods(owner).unwrap().is_empty());
    }

    #[test]
    fn test_failed_turns_counted() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();
        store
            .record_turn(owner, &record(10, 0, TurnStatus::Failure))
            .unwrap();
        let summary = store.summary(owner).unwrap();
        assert_eq!(summary.failed_turns, 1);
        assert_eq!(summary.successful_turns, 0);
    }

    #[test]
    fn test_rag_savings_accumulate() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();
        let mut r = record(100, 50, TurnStatus::Success);
        r.rag_used = true;
        r.rag_tokens_saved = 25;
        r.cost_micro_usd = 500;
        store.record_turn(owner, &r).unwrap();

        let summary = store.summary(owner).unwrap();
        assert_eq!(summary.rag_guided_turns, 1);
        assert_eq!(summary.rag_output_tokens_saved, 25);
        // 500 / 50 output tokens = 10 per token; 25 saved = 250.
        assert_eq!(summary.rag_cost_saved_micro_usd, 250);
    }

    #[test]
    fn test_remaining_budgets() {
        let store = ConsumptionStore::in_memory(limits(10, 20)).unwrap();
        let owner = OwnerId::new();
        store.increment_request(owner).unwrap();
        store.increment_request(owner).unwrap();
        let summary = store.summary(owner).unwrap();
        assert_eq!(summary.remaining_this_hour, 8);
        assert_eq!(summary.remaining_today, 18);
        assert_eq!(summary.peak_requests_per_hour, 2);
    }

    #[test]
    fn test_update_session_name() {
        let store = ConsumptionStore::in_memory(limits(100, 100)).unwrap();
        let owner = OwnerId::new();
        let session = SessionId::new();
        let mut r = record(1, 1, TurnStatus::Success);
        r.session_id = session;
        store.record_turn(owner, &r).unwrap();
        store
            .update_session_name(owner, session, "sales analysis")
            .unwrap();
        // No panic and the row count is unchanged.
        assert_eq!(store.cleanup_old_turns(365).unwrap(), 0);
    }
}
