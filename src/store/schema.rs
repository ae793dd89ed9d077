//! Logical schema (spec.md §6 "Persisted state layout").
//!
//! Grounded in `signals::db_storage::SCHEMA_SQL` in the teacher: WAL mode,
//! a handful of performance pragmas, and `WITHOUT ROWID` tables keyed by a
//! natural text primary key so upserts are a single `INSERT ... ON CONFLICT`.

pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS traders (
    address TEXT PRIMARY KEY,
    first_seen INTEGER NOT NULL,
    last_active INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS bets (
    id TEXT PRIMARY KEY,
    dedup_key TEXT NOT NULL UNIQUE,
    trader TEXT NOT NULL,
    platform TEXT NOT NULL,
    market_id TEXT NOT NULL,
    direction TEXT NOT NULL,
    amount TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    tx_hash TEXT,
    block_height INTEGER,
    log_index INTEGER,
    won INTEGER,
    claimed_amount TEXT
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_bets_trader_platform ON bets(trader, platform);
CREATE INDEX IF NOT EXISTS idx_bets_market ON bets(platform, market_id);
CREATE INDEX IF NOT EXISTS idx_bets_block ON bets(platform, block_height, timestamp);

CREATE TABLE IF NOT EXISTS user_platform_stats (
    address TEXT NOT NULL,
    platform TEXT NOT NULL,
    total_bets INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    pending INTEGER NOT NULL DEFAULT 0,
    volume TEXT NOT NULL DEFAULT '0',
    realized_pnl TEXT NOT NULL DEFAULT '0',
    first_bet_at INTEGER,
    last_bet_at INTEGER,
    PRIMARY KEY (address, platform)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS rounds (
    platform TEXT NOT NULL,
    market_id TEXT NOT NULL,
    epoch INTEGER NOT NULL,
    open_at INTEGER NOT NULL,
    lock_at INTEGER NOT NULL,
    close_at INTEGER NOT NULL,
    bull_amount TEXT NOT NULL DEFAULT '0',
    bear_amount TEXT NOT NULL DEFAULT '0',
    total_amount TEXT NOT NULL DEFAULT '0',
    oracle_called INTEGER NOT NULL DEFAULT 0,
    winner TEXT,
    resolved_at INTEGER,
    PRIMARY KEY (platform, epoch)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS signals (
    platform TEXT NOT NULL,
    epoch INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (platform, epoch)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_signals_updated ON signals(updated_at DESC);

CREATE TABLE IF NOT EXISTS trending_topics (
    normalized_topic TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    score REAL NOT NULL,
    last_updated INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_topics_score ON trending_topics(score DESC);

CREATE TABLE IF NOT EXISTS cross_platform_signals (
    topic TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    confidence REAL NOT NULL,
    expires_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS gaming_alerts (
    id TEXT PRIMARY KEY,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    wallets_json TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    reviewer TEXT,
    notes TEXT,
    created_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_alerts_status ON gaming_alerts(status, created_at DESC);

CREATE TABLE IF NOT EXISTS backtest_cache (
    cache_key TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
) WITHOUT ROWID;
"#;
