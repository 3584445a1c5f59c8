//! SQLite RewardStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{
    begin_immediate, finish, is_unique_violation, parse_decimal, parse_id, parse_timestamp, to_u32,
    SqliteStore,
};
use crate::model::{AgentId, PairingCredit, PairingEvent, PlanId, PlanReward, RewardId};
use crate::storage::schema::{PairingCredits, PlanRewards};
use crate::storage::{Result, RewardStore, StorageError};

const REWARD_COLUMNS: [PlanRewards; 8] = [
    PlanRewards::Id,
    PlanRewards::AgentId,
    PlanRewards::PlanId,
    PlanRewards::PairingCompleted,
    PlanRewards::PairingLimit,
    PlanRewards::LockedAmount,
    PlanRewards::IsReleased,
    PlanRewards::ReleasedAt,
];

fn reward_from_row(row: &SqliteRow) -> Result<PlanReward> {
    let id: String = row.try_get("id")?;
    let agent_id: String = row.try_get("agent_id")?;
    let plan_id: String = row.try_get("plan_id")?;
    let locked_amount: String = row.try_get("locked_amount")?;
    let is_released: i32 = row.try_get("is_released")?;
    let released_at: Option<String> = row.try_get("released_at")?;
    Ok(PlanReward {
        id: parse_id(&id)?,
        agent_id: parse_id(&agent_id)?,
        plan_id: parse_id(&plan_id)?,
        pairing_completed: to_u32(row.try_get("pairing_completed")?, "pairing_completed")?,
        pairing_limit: to_u32(row.try_get("pairing_limit")?, "pairing_limit")?,
        locked_amount: parse_decimal(&locked_amount)?,
        is_released: is_released != 0,
        released_at: released_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

impl SqliteStore {
    async fn select_open_reward(
        conn: &mut SqliteConnection,
        agent_id: AgentId,
        plan_id: PlanId,
    ) -> Result<Option<PlanReward>> {
        let query = Query::select()
            .columns(REWARD_COLUMNS)
            .from(PlanRewards::Table)
            .and_where(Expr::col(PlanRewards::AgentId).eq(agent_id.to_string()))
            .and_where(Expr::col(PlanRewards::PlanId).eq(plan_id.to_string()))
            .and_where(Expr::col(PlanRewards::IsReleased).eq(0))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        row.as_ref().map(reward_from_row).transpose()
    }

    async fn already_credited(
        conn: &mut SqliteConnection,
        reward_id: RewardId,
        from_agent_id: AgentId,
    ) -> Result<bool> {
        let query = Query::select()
            .column(PairingCredits::RewardId)
            .from(PairingCredits::Table)
            .and_where(Expr::col(PairingCredits::RewardId).eq(reward_id.to_string()))
            .and_where(Expr::col(PairingCredits::FromAgentId).eq(from_agent_id.to_string()))
            .to_string(SqliteQueryBuilder);

        Ok(sqlx::query(&query).fetch_optional(&mut *conn).await?.is_some())
    }

    async fn credit_in_tx(
        conn: &mut SqliteConnection,
        event: PairingEvent,
        credited_at: DateTime<Utc>,
    ) -> Result<Option<PairingCredit>> {
        let Some(mut reward) = Self::select_open_reward(conn, event.parent_id, event.plan_id).await?
        else {
            return Ok(None);
        };
        if Self::already_credited(conn, reward.id, event.from_agent_id).await? {
            return Ok(Some(PairingCredit {
                reward,
                counted: false,
                payout: None,
            }));
        }

        let credit = Query::insert()
            .into_table(PairingCredits::Table)
            .columns([
                PairingCredits::RewardId,
                PairingCredits::FromAgentId,
                PairingCredits::CreatedAt,
            ])
            .values_panic([
                reward.id.to_string().into(),
                event.from_agent_id.to_string().into(),
                credited_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&credit).execute(&mut *conn).await?;

        let increment = Query::update()
            .table(PlanRewards::Table)
            .value(
                PlanRewards::PairingCompleted,
                Expr::col(PlanRewards::PairingCompleted).add(1),
            )
            .and_where(Expr::col(PlanRewards::Id).eq(reward.id.to_string()))
            .and_where(Expr::col(PlanRewards::IsReleased).eq(0))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&increment).execute(&mut *conn).await?;
        reward.pairing_completed += 1;

        if !reward.threshold_reached() {
            return Ok(Some(PairingCredit {
                reward,
                counted: true,
                payout: None,
            }));
        }

        let release = Query::update()
            .table(PlanRewards::Table)
            .value(PlanRewards::IsReleased, 1)
            .value(PlanRewards::ReleasedAt, credited_at.to_rfc3339())
            .and_where(Expr::col(PlanRewards::Id).eq(reward.id.to_string()))
            .and_where(Expr::col(PlanRewards::IsReleased).eq(0))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&release).execute(&mut *conn).await?;

        let commission = reward
            .payout(event.from_agent_id, event.payment_id)
            .into_commission(credited_at);
        match Self::insert_commission(conn, &commission).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StorageError::Duplicate(format!(
                    "pairing bonus for agent {}",
                    commission.agent_id
                )))
            }
            Err(e) => return Err(e.into()),
        }

        reward.is_released = true;
        reward.released_at = Some(credited_at);
        Ok(Some(PairingCredit {
            reward,
            counted: true,
            payout: Some(commission),
        }))
    }
}

#[async_trait]
impl RewardStore for SqliteStore {
    async fn create_reward(&self, reward: &PlanReward) -> Result<()> {
        let query = Query::insert()
            .into_table(PlanRewards::Table)
            .columns(REWARD_COLUMNS)
            .values_panic([
                reward.id.to_string().into(),
                reward.agent_id.to_string().into(),
                reward.plan_id.to_string().into(),
                reward.pairing_completed.into(),
                reward.pairing_limit.into(),
                reward.locked_amount.to_string().into(),
                i32::from(reward.is_released).into(),
                reward.released_at.map(|t| t.to_rfc3339()).into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::Duplicate(format!(
                "unreleased reward for agent {} plan {}",
                reward.agent_id, reward.plan_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_reward(&self, reward_id: RewardId) -> Result<Option<PlanReward>> {
        let query = Query::select()
            .columns(REWARD_COLUMNS)
            .from(PlanRewards::Table)
            .and_where(Expr::col(PlanRewards::Id).eq(reward_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(reward_from_row).transpose()
    }

    async fn find_unreleased(&self, agent_id: AgentId, plan_id: PlanId) -> Result<Option<PlanReward>> {
        let mut conn = self.pool.acquire().await?;
        Self::select_open_reward(&mut conn, agent_id, plan_id).await
    }

    async fn list_rewards(&self, agent_id: AgentId) -> Result<Vec<PlanReward>> {
        let query = Query::select()
            .columns(REWARD_COLUMNS)
            .from(PlanRewards::Table)
            .and_where(Expr::col(PlanRewards::AgentId).eq(agent_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(reward_from_row).collect()
    }

    async fn credit_pairing(
        &self,
        event: PairingEvent,
        credited_at: DateTime<Utc>,
    ) -> Result<Option<PairingCredit>> {
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = Self::credit_in_tx(&mut conn, event, credited_at).await;
        finish(&mut conn, result).await
    }
}
