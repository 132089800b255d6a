// ============================================================================
// Message Service Infrastructure - PostgreSQL Message Store
// File: crates/msgsvc-infrastructure/src/database/pg_message_store.rs
// ============================================================================
//! One table per partition, named from a hash of the partition key and tracked in
//! `chat_partitions`. Reads never create tables.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, info};
use uuid::Uuid;

use msgsvc_core::error::{Backend, ChatError};
use msgsvc_core::repositories::MessageStore;
use msgsvc_core::{Attachment, HistoryFilter, Message, PartitionKey};
use msgsvc_security::Envelope;

use super::registry::PartitionRegistry;

const TABLE_PREFIX: &str = "chat_msg_";
const UNDEFINED_TABLE: &str = "42P01";

const COLUMNS: &str = "message_id, partition_key, channel_id, sender_id, sequence_number, sent_at, \
     content, attachments, mentions, reply_to, reactions, is_edited, deleted, deleted_by, deleted_at";

/// Table name for a partition. Hex only, so it is safe to splice into SQL.
pub fn table_name(key: &PartitionKey) -> String {
    let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
    format!("{}{}", TABLE_PREFIX, &digest[..24])
}

pub struct PgMessageStore {
    pool: PgPool,
    registry: PartitionRegistry<String>,
}

impl PgMessageStore {
    /// Connects the store and makes sure the partition catalogue exists.
    pub async fn init(pool: PgPool, max_partitions: usize) -> Result<Self, ChatError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_partitions (
                partition_key TEXT PRIMARY KEY,
                table_name TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| db_error("creating partition catalogue", e))?;

        info!("PostgreSQL message store ready (max {} cached partitions)", max_partitions);
        Ok(Self {
            pool,
            registry: PartitionRegistry::new(max_partitions),
        })
    }

    /// Table for writing, created on first use.
    async fn writable(&self, key: &PartitionKey) -> Result<String, ChatError> {
        self.registry
            .get_or_init(key.as_str(), || self.create_partition(key))
            .await
    }

    /// Table for reading, or `None` when the partition was never written.
    async fn readable(&self, key: &PartitionKey) -> Result<Option<String>, ChatError> {
        if let Some(table) = self.registry.get(key.as_str()) {
            return Ok(Some(table));
        }

        let table = table_name(key);
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("looking up partition table", e))?;
        if !exists {
            return Ok(None);
        }

        let table = self
            .registry
            .get_or_init(key.as_str(), || async move { Ok::<_, ChatError>(table) })
            .await?;
        Ok(Some(table))
    }

    async fn create_partition(&self, key: &PartitionKey) -> Result<String, ChatError> {
        let table = table_name(key);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("starting partition transaction", e))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                message_id UUID PRIMARY KEY,
                partition_key TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sequence_number BIGINT NOT NULL UNIQUE,
                sent_at TIMESTAMPTZ NOT NULL,
                content JSONB NOT NULL,
                attachments JSONB NOT NULL DEFAULT '[]',
                mentions JSONB NOT NULL DEFAULT '[]',
                reply_to UUID,
                reactions JSONB NOT NULL DEFAULT '{{}}',
                is_edited BOOLEAN NOT NULL DEFAULT FALSE,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_by TEXT,
                deleted_at TIMESTAMPTZ
            )
            "#
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("creating partition table", e))?;

        sqlx::query(
            r#"
            INSERT INTO chat_partitions (partition_key, table_name)
            VALUES ($1, $2)
            ON CONFLICT (partition_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(&table)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("registering partition", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("committing partition", e))?;

        debug!("Partition table {} ready for {}", table, key);
        Ok(table)
    }

    async fn insert(&self, table: &str, message: &Message) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#
        ))
        .bind(message.message_id)
        .bind(message.partition_key.as_str())
        .bind(&message.channel_id)
        .bind(&message.sender_id)
        .bind(to_db_seq(message.sequence_number)?)
        .bind(message.timestamp)
        .bind(Json(&message.content))
        .bind(Json(&message.attachments))
        .bind(Json(&message.mentions))
        .bind(message.reply_to)
        .bind(Json(&message.reactions))
        .bind(message.is_edited)
        .bind(message.deleted)
        .bind(&message.deleted_by)
        .bind(message.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct MessageRow {
    message_id: Uuid,
    partition_key: String,
    channel_id: String,
    sender_id: String,
    sequence_number: i64,
    sent_at: DateTime<Utc>,
    content: Json<Envelope>,
    attachments: Json<Vec<Attachment>>,
    mentions: Json<BTreeSet<String>>,
    reply_to: Option<Uuid>,
    reactions: Json<BTreeMap<String, BTreeSet<String>>>,
    is_edited: bool,
    deleted: bool,
    deleted_by: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl MessageRow {
    fn into_message(self, key: &PartitionKey) -> Result<Message, ChatError> {
        if self.partition_key != key.as_str() {
            return Err(ChatError::Conflict(format!(
                "row {} belongs to {}, not {}",
                self.message_id, self.partition_key, key
            )));
        }
        Ok(Message {
            message_id: self.message_id,
            partition_key: key.clone(),
            channel_id: self.channel_id,
            sender_id: self.sender_id,
            sequence_number: u64::try_from(self.sequence_number).map_err(|_| {
                ChatError::Serialization(format!("negative sequence {}", self.sequence_number))
            })?,
            timestamp: self.sent_at,
            content: self.content.0,
            attachments: self.attachments.0,
            mentions: self.mentions.0,
            reply_to: self.reply_to,
            reactions: self.reactions.0,
            is_edited: self.is_edited,
            deleted: self.deleted,
            deleted_by: self.deleted_by,
            deleted_at: self.deleted_at,
        })
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, key: &PartitionKey, message: &Message) -> Result<(), ChatError> {
        let table = self.writable(key).await?;
        let result = match self.insert(&table, message).await {
            Err(e) if sql_state(&e).as_deref() == Some(UNDEFINED_TABLE) => {
                // dropped by a teardown since it was registered
                self.registry.remove(key.as_str());
                let table = self.writable(key).await?;
                self.insert(&table, message).await
            }
            other => other,
        };

        result.map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                ChatError::Conflict(format!(
                    "sequence {} or message {} already stored in {}",
                    message.sequence_number, message.message_id, key
                ))
            } else {
                db_error("appending message", e)
            }
        })
    }

    async fn find(
        &self,
        key: &PartitionKey,
        filter: &HistoryFilter,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let Some(table) = self.readable(key).await? else {
            return Ok(Vec::new());
        };

        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS}
            FROM {table}
            WHERE deleted = FALSE
              AND ($1::BIGINT IS NULL OR sequence_number < $1)
            ORDER BY sequence_number DESC
            LIMIT $2
            "#
        ))
        .bind(filter_bound(filter)?)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("finding messages", e))?;

        rows.into_iter().map(|row| row.into_message(key)).collect()
    }

    async fn count(&self, key: &PartitionKey, filter: &HistoryFilter) -> Result<u64, ChatError> {
        let Some(table) = self.readable(key).await? else {
            return Ok(0);
        };

        let total: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*)
            FROM {table}
            WHERE deleted = FALSE
              AND ($1::BIGINT IS NULL OR sequence_number < $1)
            "#
        ))
        .bind(filter_bound(filter)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("counting messages", e))?;

        Ok(total.max(0) as u64)
    }

    async fn soft_delete(
        &self,
        key: &PartitionKey,
        message_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>, ChatError> {
        let Some(table) = self.readable(key).await? else {
            return Ok(None);
        };

        // the first deletion wins, repeats return it unchanged
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            r#"
            UPDATE {table}
            SET deleted = TRUE,
                deleted_by = COALESCE(deleted_by, $2),
                deleted_at = COALESCE(deleted_at, $3)
            WHERE message_id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(message_id)
        .bind(deleted_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("soft-deleting message", e))?;

        row.map(|r| r.into_message(key)).transpose()
    }

    async fn purge(&self, key: &PartitionKey) -> Result<u64, ChatError> {
        let Some(table) = self.readable(key).await? else {
            return Ok(0);
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("starting purge", e))?;

        let removed: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("counting purged messages", e))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("dropping partition table", e))?;

        sqlx::query("DELETE FROM chat_partitions WHERE partition_key = $1")
            .bind(key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("unregistering partition", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("committing purge", e))?;

        self.registry.remove(key.as_str());
        info!("Purged {} message(s) from {}", removed, key);
        Ok(removed.max(0) as u64)
    }
}

fn to_db_seq(seq: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(seq).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn filter_bound(filter: &HistoryFilter) -> Result<Option<i64>, ChatError> {
    filter
        .before
        .map(|b| {
            i64::try_from(b)
                .map_err(|_| ChatError::InvalidPayload(format!("before {b} out of range")))
        })
        .transpose()
}

fn sql_state(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|code| code.into_owned())
}

fn db_error(action: &str, e: sqlx::Error) -> ChatError {
    error!("Database error {}: {}", action, e);
    ChatError::backend(Backend::Store, e.to_string())
}
