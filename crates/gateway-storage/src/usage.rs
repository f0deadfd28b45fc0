//! `usage_logs` table.

use crate::error::{Result, StorageError};
use crate::store::{from_flag, from_millis, to_count, to_flag, to_millis, SqlStore};
use async_trait::async_trait;
use gateway_core::{NewUsageLog, StoreError, UsageLog, UsageQuery, UsageStore, UsageSummary};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, request_id, user_id, service, task_type, provider, model, input_tokens, \
     output_tokens, cost_usd, latency_ms, cached, error_message, error_kind, prompt_preview, created_at";

enum Param {
    Text(String),
    Int(i64),
}

/// `WHERE` clause and its parameters, numbered from `$1`
struct Filter {
    clauses: Vec<String>,
    params: Vec<Param>,
}

impl Filter {
    fn new(query: &UsageQuery) -> Self {
        let mut filter = Self {
            clauses: Vec::new(),
            params: Vec::new(),
        };
        if let Some(user_id) = &query.user_id {
            filter.push("user_id =", Param::Text(user_id.clone()));
        }
        if let Some(service) = &query.service {
            filter.push("service =", Param::Text(service.clone()));
        }
        if let Some(provider) = &query.provider {
            filter.push("provider =", Param::Text(provider.clone()));
        }
        if let Some(since) = query.since {
            filter.push("created_at >=", Param::Int(to_millis(since)));
        }
        if let Some(until) = query.until {
            filter.push("created_at <", Param::Int(to_millis(until)));
        }
        filter
    }

    fn push(&mut self, lhs: &str, param: Param) {
        self.params.push(param);
        self.clauses.push(format!("{lhs} ${}", self.params.len()));
    }

    fn next_placeholder(&self) -> String {
        format!("${}", self.params.len() + 1)
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn bind<'q>(self, mut query: Query<'q, Any, AnyArguments<'q>>) -> Query<'q, Any, AnyArguments<'q>> {
        for param in self.params {
            query = match param {
                Param::Text(value) => query.bind(value),
                Param::Int(value) => query.bind(value),
            };
        }
        query
    }
}

fn decode(row: &AnyRow) -> Result<UsageLog> {
    let id: String = row.try_get("id")?;
    let latency_ms: i64 = row.try_get("latency_ms")?;

    Ok(UsageLog {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Corrupt(format!("usage id {id}: {e}")))?,
        created_at: from_millis(row.try_get("created_at")?)?,
        entry: NewUsageLog {
            request_id: row.try_get("request_id")?,
            user_id: row.try_get("user_id")?,
            service: row.try_get("service")?,
            task_type: row.try_get("task_type")?,
            provider: row.try_get("provider")?,
            model: row.try_get("model")?,
            input_tokens: token_count(row, "input_tokens")?,
            output_tokens: token_count(row, "output_tokens")?,
            cost_usd: row.try_get("cost_usd")?,
            latency_ms: to_count(latency_ms, "latency_ms")?,
            cached: from_flag(row.try_get("cached")?),
            error_message: row.try_get("error_message")?,
            error_kind: row.try_get("error_kind")?,
            prompt_preview: row.try_get("prompt_preview")?,
        },
    })
}

fn token_count(row: &AnyRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("{column} out of range: {value}")))
}

fn decode_summary(row: &AnyRow) -> Result<UsageSummary> {
    Ok(UsageSummary {
        provider: row.try_get("provider")?,
        model: row.try_get("model")?,
        requests: to_count(row.try_get("requests")?, "requests")?,
        cached_requests: to_count(row.try_get("cached_requests")?, "cached_requests")?,
        failed_requests: to_count(row.try_get("failed_requests")?, "failed_requests")?,
        input_tokens: to_count(row.try_get("input_tokens")?, "input_tokens")?,
        output_tokens: to_count(row.try_get("output_tokens")?, "output_tokens")?,
        cost_usd: row.try_get("cost_usd")?,
    })
}

impl SqlStore {
    async fn append_usage(&self, entry: &NewUsageLog) -> Result<UsageLog> {
        let log = UsageLog::stamp(entry.clone());
        let latency_ms = i64::try_from(entry.latency_ms).unwrap_or(i64::MAX);

        sqlx::query(&format!(
            "INSERT INTO usage_logs ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(log.id.to_string())
        .bind(entry.request_id.clone())
        .bind(entry.user_id.clone())
        .bind(entry.service.clone())
        .bind(entry.task_type.clone())
        .bind(entry.provider.clone())
        .bind(entry.model.clone())
        .bind(i64::from(entry.input_tokens))
        .bind(i64::from(entry.output_tokens))
        .bind(entry.cost_usd)
        .bind(latency_ms)
        .bind(to_flag(entry.cached))
        .bind(entry.error_message.clone())
        .bind(entry.error_kind.clone())
        .bind(entry.prompt_preview.clone())
        .bind(to_millis(log.created_at))
        .execute(self.pool.inner())
        .await?;

        Ok(log)
    }

    async fn query_usage(&self, query: &UsageQuery) -> Result<Vec<UsageLog>> {
        let filter = Filter::new(query);
        let sql = format!(
            "SELECT {COLUMNS} FROM usage_logs{} ORDER BY created_at DESC, id LIMIT {}",
            filter.sql(),
            filter.next_placeholder(),
        );

        let rows = filter
            .bind(sqlx::query(&sql))
            .bind(i64::from(query.effective_limit()))
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn summarize_usage(&self, query: &UsageQuery) -> Result<Vec<UsageSummary>> {
        let filter = Filter::new(query);
        let sql = format!(
            "SELECT provider, model,
                COUNT(*) AS requests,
                COALESCE(CAST(SUM(cached) AS BIGINT), 0) AS cached_requests,
                COALESCE(CAST(SUM(CASE WHEN error_kind IS NULL THEN 0 ELSE 1 END) AS BIGINT), 0) AS failed_requests,
                COALESCE(CAST(SUM(input_tokens) AS BIGINT), 0) AS input_tokens,
                COALESCE(CAST(SUM(output_tokens) AS BIGINT), 0) AS output_tokens,
                COALESCE(CAST(SUM(cost_usd) AS DOUBLE PRECISION), 0.0) AS cost_usd
             FROM usage_logs{}
             GROUP BY provider, model
             ORDER BY provider, model",
            filter.sql(),
        );

        let rows = filter
            .bind(sqlx::query(&sql))
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(decode_summary).collect()
    }
}

#[async_trait]
impl UsageStore for SqlStore {
    async fn append(&self, entry: &NewUsageLog) -> std::result::Result<UsageLog, StoreError> {
        Ok(self.append_usage(entry).await?)
    }

    async fn query(&self, query: &UsageQuery) -> std::result::Result<Vec<UsageLog>, StoreError> {
        Ok(self.query_usage(query).await?)
    }

    async fn summarize(&self, query: &UsageQuery) -> std::result::Result<Vec<UsageSummary>, StoreError> {
        Ok(self.summarize_usage(query).await?)
    }
}
