use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{Advertiser, ClickEvent, TrustTier, UserProfile};
use ledger_core::{
    BalanceStore, ClickLedger, DebitOutcome, LedgerStores, RewardSettlement, SettleOutcome,
    StorageError, UserTrustStore,
};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// SQLite backend for all four storage seams. A single guarded connection in
/// WAL mode; the conditional `UPDATE ... WHERE` forms carry the atomicity
/// guarantees, not the process-level lock.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, PersistenceError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure()?;
        store.migrate()?;
        Ok(Arc::new(store))
    }

    pub fn stores(self: &Arc<Self>) -> LedgerStores {
        LedgerStores {
            balances: self.clone(),
            clicks: self.clone(),
            users: self.clone(),
            settlement: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure(&self) -> Result<(), PersistenceError> {
        let conn = self.lock();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS advertisers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                cpc_bid INTEGER NOT NULL,
                ad_balance INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clicks (
                id TEXT PRIMARY KEY,
                advertiser_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                clicked_at_ms INTEGER NOT NULL,
                has_conversion INTEGER NOT NULL DEFAULT 0,
                reward_claimed INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                tier TEXT NOT NULL,
                points INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_clicks_advertiser ON clicks(advertiser_id);
            CREATE INDEX IF NOT EXISTS idx_clicks_user ON clicks(user_id);
            ",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name) VALUES(1, 'initial_v1')",
            [],
        )?;

        Ok(())
    }
}

fn tier_label(tier: TrustTier) -> &'static str {
    match tier {
        TrustTier::Base => "base",
        TrustTier::Promoted => "promoted",
    }
}

fn tier_from_label(label: &str) -> Result<TrustTier, StorageError> {
    match label {
        "base" => Ok(TrustTier::Base),
        "promoted" => Ok(TrustTier::Promoted),
        other => Err(StorageError::Backend(format!("unknown tier: {other}"))),
    }
}

fn advertiser_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Advertiser> {
    Ok(Advertiser {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        cpc_bid: row.get(3)?,
        ad_balance: row.get(4)?,
    })
}

fn click_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClickEvent> {
    Ok(ClickEvent {
        id: row.get(0)?,
        advertiser_id: row.get(1)?,
        user_id: row.get(2)?,
        clicked_at_ms: row.get(3)?,
        has_conversion: row.get::<_, i64>(4)? != 0,
        reward_claimed: row.get::<_, i64>(5)? != 0,
    })
}

impl BalanceStore for SqliteLedgerStore {
    fn upsert_listing(&self, advertiser: &Advertiser) -> Result<(), StorageError> {
        self.lock()
            .execute(
                "INSERT INTO advertisers (id, name, url, cpc_bid, ad_balance)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     url = excluded.url,
                     cpc_bid = excluded.cpc_bid",
                params![
                    advertiser.id.as_str(),
                    advertiser.name.as_str(),
                    advertiser.url.as_str(),
                    advertiser.cpc_bid,
                    advertiser.ad_balance,
                ],
            )
            .map_err(StorageError::backend)?;
        Ok(())
    }

    fn get(&self, advertiser_id: &str) -> Result<Option<Advertiser>, StorageError> {
        self.lock()
            .query_row(
                "SELECT id, name, url, cpc_bid, ad_balance FROM advertisers WHERE id = ?1",
                params![advertiser_id],
                advertiser_from_row,
            )
            .optional()
            .map_err(StorageError::backend)
    }

    fn eligible(&self) -> Result<Vec<Advertiser>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, url, cpc_bid, ad_balance
                 FROM advertisers
                 WHERE ad_balance >= cpc_bid
                 ORDER BY rowid ASC",
            )
            .map_err(StorageError::backend)?;

        let rows = stmt
            .query_map([], advertiser_from_row)
            .map_err(StorageError::backend)?;

        let mut advertisers = Vec::new();
        for row in rows {
            advertisers.push(row.map_err(StorageError::backend)?);
        }
        Ok(advertisers)
    }

    fn credit(&self, advertiser_id: &str, amount: i64) -> Result<bool, StorageError> {
        let changed = self
            .lock()
            .execute(
                "UPDATE advertisers SET ad_balance = ad_balance + ?1 WHERE id = ?2",
                params![amount, advertiser_id],
            )
            .map_err(StorageError::backend)?;
        Ok(changed > 0)
    }

    fn debit_bid(&self, advertiser_id: &str) -> Result<DebitOutcome, StorageError> {
        let conn = self.lock();
        let new_balance: Option<i64> = conn
            .query_row(
                "UPDATE advertisers
                 SET ad_balance = ad_balance - cpc_bid
                 WHERE id = ?1 AND ad_balance >= cpc_bid
                 RETURNING ad_balance",
                params![advertiser_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::backend)?;

        if let Some(new_balance) = new_balance {
            return Ok(DebitOutcome::Applied { new_balance });
        }

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM advertisers WHERE id = ?1",
                params![advertiser_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::backend)?;

        Ok(match exists {
            Some(_) => DebitOutcome::InsufficientBalance,
            None => DebitOutcome::UnknownAdvertiser,
        })
    }
}

impl ClickLedger for SqliteLedgerStore {
    fn insert(&self, click: &ClickEvent) -> Result<bool, StorageError> {
        let changed = self
            .lock()
            .execute(
                "INSERT OR IGNORE INTO clicks
                 (id, advertiser_id, user_id, clicked_at_ms, has_conversion, reward_claimed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    click.id.as_str(),
                    click.advertiser_id.as_str(),
                    click.user_id.as_str(),
                    click.clicked_at_ms,
                    click.has_conversion as i64,
                    click.reward_claimed as i64,
                ],
            )
            .map_err(StorageError::backend)?;
        Ok(changed > 0)
    }

    fn get(&self, click_id: &str) -> Result<Option<ClickEvent>, StorageError> {
        self.lock()
            .query_row(
                "SELECT id, advertiser_id, user_id, clicked_at_ms, has_conversion, reward_claimed
                 FROM clicks WHERE id = ?1",
                params![click_id],
                click_from_row,
            )
            .optional()
            .map_err(StorageError::backend)
    }

    fn flag_conversion(&self, click_id: &str) -> Result<Option<String>, StorageError> {
        self.lock()
            .query_row(
                "UPDATE clicks SET has_conversion = 1 WHERE id = ?1 RETURNING user_id",
                params![click_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::backend)
    }

    fn claim_reward(&self, click_id: &str) -> Result<bool, StorageError> {
        let changed = self
            .lock()
            .execute(
                "UPDATE clicks SET reward_claimed = 1 WHERE id = ?1 AND reward_claimed = 0",
                params![click_id],
            )
            .map_err(StorageError::backend)?;
        Ok(changed > 0)
    }
}

impl UserTrustStore for SqliteLedgerStore {
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let row: Option<(String, String, i64)> = self
            .lock()
            .query_row(
                "SELECT id, tier, points FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(StorageError::backend)?;

        match row {
            Some((id, tier, points)) => Ok(Some(UserProfile {
                id,
                tier: tier_from_label(&tier)?,
                points,
            })),
            None => Ok(None),
        }
    }

    fn promote(&self, user_id: &str) -> Result<(), StorageError> {
        self.lock()
            .execute(
                "INSERT INTO users (id, tier, points) VALUES (?1, ?2, 0)
                 ON CONFLICT(id) DO UPDATE SET tier = excluded.tier",
                params![user_id, tier_label(TrustTier::Promoted)],
            )
            .map_err(StorageError::backend)?;
        Ok(())
    }

    fn credit_points(&self, user_id: &str, amount: i64) -> Result<i64, StorageError> {
        self.lock()
            .query_row(
                "INSERT INTO users (id, tier, points) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET points = points + excluded.points
                 RETURNING points",
                params![user_id, tier_label(TrustTier::Base), amount],
                |row| row.get(0),
            )
            .map_err(StorageError::backend)
    }
}

impl RewardSettlement for SqliteLedgerStore {
    fn settle(
        &self,
        click_id: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<SettleOutcome, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StorageError::backend)?;

        let claimed = tx
            .execute(
                "UPDATE clicks SET reward_claimed = 1 WHERE id = ?1 AND reward_claimed = 0",
                params![click_id],
            )
            .map_err(StorageError::backend)?;

        if claimed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM clicks WHERE id = ?1",
                    params![click_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StorageError::backend)?;
            // Nothing to roll back; the conditional claim matched no row.
            return Ok(match exists {
                Some(_) => SettleOutcome::AlreadyClaimed,
                None => SettleOutcome::UnknownClick,
            });
        }

        let total_points: i64 = tx
            .query_row(
                "INSERT INTO users (id, tier, points) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET points = points + excluded.points
                 RETURNING points",
                params![user_id, tier_label(TrustTier::Base), amount],
                |row| row.get(0),
            )
            .map_err(StorageError::backend)?;

        tx.commit().map_err(StorageError::backend)?;
        Ok(SettleOutcome::Settled { total_points })
    }
}
