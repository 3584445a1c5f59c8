//! SQLite CommissionLedger implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{
    begin_immediate, finish, is_unique_violation, parse_decimal, parse_id, parse_opt_id,
    parse_timestamp, to_u32, SqliteStore,
};
use crate::model::{AgentId, Commission, NewCommission, PaymentId, PAIRING_BONUS_LEVEL};
use crate::storage::schema::Commissions;
use crate::storage::{CommissionLedger, Result, StorageError};

const COMMISSION_COLUMNS: [Commissions; 10] = [
    Commissions::Id,
    Commissions::AgentId,
    Commissions::FromAgentId,
    Commissions::PlanId,
    Commissions::CommissionAmount,
    Commissions::OriginalAmount,
    Commissions::Level,
    Commissions::Status,
    Commissions::PaymentId,
    Commissions::CreatedAt,
];

fn commission_from_row(row: &SqliteRow) -> Result<Commission> {
    let id: String = row.try_get("id")?;
    let agent_id: String = row.try_get("agent_id")?;
    let from_agent_id: String = row.try_get("from_agent_id")?;
    let plan_id: String = row.try_get("plan_id")?;
    let commission_amount: String = row.try_get("commission_amount")?;
    let original_amount: String = row.try_get("original_amount")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Commission {
        id: parse_id(&id)?,
        agent_id: parse_id(&agent_id)?,
        from_agent_id: parse_id(&from_agent_id)?,
        plan_id: parse_id(&plan_id)?,
        commission_amount: parse_decimal(&commission_amount)?,
        original_amount: parse_decimal(&original_amount)?,
        level: to_u32(row.try_get("level")?, "level")?,
        status: status.parse().map_err(StorageError::Corrupt)?,
        payment_id: parse_opt_id(row.try_get("payment_id")?)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

impl SqliteStore {
    /// Insert one commission row on an open connection.
    pub(super) async fn insert_commission(
        conn: &mut SqliteConnection,
        commission: &Commission,
    ) -> std::result::Result<(), sqlx::Error> {
        let query = Query::insert()
            .into_table(Commissions::Table)
            .columns(COMMISSION_COLUMNS)
            .values_panic([
                commission.id.to_string().into(),
                commission.agent_id.to_string().into(),
                commission.from_agent_id.to_string().into(),
                commission.plan_id.to_string().into(),
                commission.commission_amount.to_string().into(),
                commission.original_amount.to_string().into(),
                commission.level.into(),
                commission.status.to_string().into(),
                commission.payment_id.map(|p| p.to_string()).into(),
                commission.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn append_in_tx(conn: &mut SqliteConnection, batch: &[Commission]) -> Result<()> {
        for commission in batch {
            match Self::insert_commission(conn, commission).await {
                Ok(()) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(StorageError::Duplicate(format!(
                        "commission for agent {} level {}",
                        commission.agent_id, commission.level
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn select_commissions(&self, column: Commissions, value: String) -> Result<Vec<Commission>> {
        let query = Query::select()
            .columns(COMMISSION_COLUMNS)
            .from(Commissions::Table)
            .and_where(Expr::col(column).eq(value))
            .order_by(Commissions::Level, Order::Asc)
            .order_by(Commissions::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(commission_from_row).collect()
    }
}

#[async_trait]
impl CommissionLedger for SqliteStore {
    async fn append_batch(&self, batch: Vec<NewCommission>) -> Result<Vec<Commission>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let now = chrono::Utc::now();
        let commissions: Vec<Commission> = batch
            .into_iter()
            .map(|entry| entry.into_commission(now))
            .collect();

        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = Self::append_in_tx(&mut conn, &commissions).await;
        finish(&mut conn, result).await?;
        Ok(commissions)
    }

    async fn list_for_agent(&self, agent_id: AgentId) -> Result<Vec<Commission>> {
        self.select_commissions(Commissions::AgentId, agent_id.to_string())
            .await
    }

    async fn list_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Commission>> {
        self.select_commissions(Commissions::PaymentId, payment_id.to_string())
            .await
    }

    async fn has_chain_commissions(&self, payment_id: PaymentId) -> Result<bool> {
        let query = Query::select()
            .column(Commissions::Id)
            .from(Commissions::Table)
            .and_where(Expr::col(Commissions::PaymentId).eq(payment_id.to_string()))
            .and_where(Expr::col(Commissions::Level).gt(PAIRING_BONUS_LEVEL))
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }
}
