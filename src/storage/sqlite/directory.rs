//! SQLite AgentDirectory, PlanCatalog and OwnershipRecord implementations.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{begin_immediate, finish, is_unique_violation, parse_decimal, parse_id, parse_opt_id, to_u32, SqliteStore};
use crate::model::{Agent, AgentId, ChainSettings, PaymentId, Plan, PlanId};
use crate::storage::schema::{Agents, CommissionRules, PlanChainSettings, PlanOwnership, Plans, TreeNodes};
use crate::storage::{AgentDirectory, OwnershipRecord, PlanCatalog, Result, StorageError};

/// Commission rule level holding the flat sponsor-chain rate.
const GLOBAL_RULE_LEVEL: i32 = 0;

fn agent_from_row(row: &SqliteRow) -> Result<Agent> {
    let id: String = row.try_get("id")?;
    let is_active: i32 = row.try_get("is_active")?;
    Ok(Agent {
        id: parse_id(&id)?,
        sponsor_id: parse_opt_id(row.try_get("sponsor_id")?)?,
        is_active: is_active != 0,
        referral_code: row.try_get("referral_code")?,
    })
}

fn plan_from_row(row: &SqliteRow) -> Result<Plan> {
    let id: String = row.try_get("id")?;
    let price: String = row.try_get("price")?;
    let bonus: Option<String> = row.try_get("pairing_bonus")?;
    Ok(Plan {
        id: parse_id(&id)?,
        name: row.try_get("name")?,
        price: parse_decimal(&price)?,
        pairing_bonus: bonus.as_deref().map(parse_decimal).transpose()?,
    })
}

impl SqliteStore {
    async fn fetch_agent(&self, column: Agents, value: String) -> Result<Option<Agent>> {
        let query = Query::select()
            .columns([Agents::Id, Agents::SponsorId, Agents::IsActive, Agents::ReferralCode])
            .from(Agents::Table)
            .and_where(Expr::col(column).eq(value))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn update_chain_settings(
        conn: &mut SqliteConnection,
        plan_id: PlanId,
        settings: ChainSettings,
    ) -> Result<()> {
        let current = {
            let query = Query::select()
                .column(PlanChainSettings::PairingLimit)
                .from(PlanChainSettings::Table)
                .and_where(Expr::col(PlanChainSettings::PlanId).eq(plan_id.to_string()))
                .to_string(SqliteQueryBuilder);
            let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
            match row {
                Some(row) => Some(to_u32(row.try_get("pairing_limit")?, "pairing_limit")?),
                None => None,
            }
        };

        if let Some(current) = current.filter(|c| *c != settings.pairing_limit) {
            let query = Query::select()
                .expr(Expr::col(TreeNodes::AgentId).count())
                .from(TreeNodes::Table)
                .and_where(Expr::col(TreeNodes::PairingLimit).eq(current))
                .to_string(SqliteQueryBuilder);
            let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
            let nodes: i64 = row.try_get(0)?;
            if nodes > 0 {
                return Err(StorageError::PairingLimitLocked {
                    plan_id,
                    current,
                    requested: settings.pairing_limit,
                });
            }
        }

        let query = Query::insert()
            .into_table(PlanChainSettings::Table)
            .columns([
                PlanChainSettings::PlanId,
                PlanChainSettings::PairingLimit,
                PlanChainSettings::MaxDepth,
            ])
            .values_panic([
                plan_id.to_string().into(),
                settings.pairing_limit.into(),
                settings.max_depth.into(),
            ])
            .on_conflict(
                OnConflict::column(PlanChainSettings::PlanId)
                    .update_columns([PlanChainSettings::PairingLimit, PlanChainSettings::MaxDepth])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentDirectory for SqliteStore {
    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<Agent>> {
        self.fetch_agent(Agents::Id, agent_id.to_string()).await
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Agent>> {
        self.fetch_agent(Agents::ReferralCode, code.to_string()).await
    }

    async fn register_agent(&self, agent: &Agent) -> Result<()> {
        let query = Query::insert()
            .into_table(Agents::Table)
            .columns([Agents::Id, Agents::SponsorId, Agents::IsActive, Agents::ReferralCode])
            .values_panic([
                agent.id.to_string().into(),
                agent.sponsor_id.map(|s| s.to_string()).into(),
                i32::from(agent.is_active).into(),
                agent.referral_code.clone().into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::Duplicate(format!(
                "agent {} / referral code {}",
                agent.id, agent.referral_code
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_active(&self, agent_id: AgentId, is_active: bool) -> Result<()> {
        let query = Query::update()
            .table(Agents::Table)
            .value(Agents::IsActive, i32::from(is_active))
            .and_where(Expr::col(Agents::Id).eq(agent_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("agent", agent_id));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanCatalog for SqliteStore {
    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<Plan>> {
        let query = Query::select()
            .columns([Plans::Id, Plans::Name, Plans::Price, Plans::PairingBonus])
            .from(Plans::Table)
            .and_where(Expr::col(Plans::Id).eq(plan_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(plan_from_row).transpose()
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<()> {
        let query = Query::insert()
            .into_table(Plans::Table)
            .columns([Plans::Id, Plans::Name, Plans::Price, Plans::PairingBonus])
            .values_panic([
                plan.id.to_string().into(),
                plan.name.clone().into(),
                plan.price.to_string().into(),
                plan.pairing_bonus.map(|b| b.to_string()).into(),
            ])
            .on_conflict(
                OnConflict::column(Plans::Id)
                    .update_columns([Plans::Name, Plans::Price, Plans::PairingBonus])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn chain_settings(&self, plan_id: PlanId) -> Result<Option<ChainSettings>> {
        let query = Query::select()
            .columns([PlanChainSettings::PairingLimit, PlanChainSettings::MaxDepth])
            .from(PlanChainSettings::Table)
            .and_where(Expr::col(PlanChainSettings::PlanId).eq(plan_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(ChainSettings {
                pairing_limit: to_u32(row.try_get("pairing_limit")?, "pairing_limit")?,
                max_depth: to_u32(row.try_get("max_depth")?, "max_depth")?,
            })),
            None => Ok(None),
        }
    }

    async fn set_chain_settings(&self, plan_id: PlanId, settings: ChainSettings) -> Result<()> {
        if settings.pairing_limit == 0 {
            return Err(StorageError::InvalidPairingLimit);
        }
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = Self::update_chain_settings(&mut conn, plan_id, settings).await;
        finish(&mut conn, result).await
    }

    async fn commission_rate(&self) -> Result<Option<Decimal>> {
        let query = Query::select()
            .column(CommissionRules::Percentage)
            .from(CommissionRules::Table)
            .and_where(Expr::col(CommissionRules::Level).eq(GLOBAL_RULE_LEVEL))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let percentage: String = row.try_get("percentage")?;
                Ok(Some(parse_decimal(&percentage)?))
            }
            None => Ok(None),
        }
    }

    async fn set_commission_rate(&self, percentage: Decimal) -> Result<()> {
        let query = Query::insert()
            .into_table(CommissionRules::Table)
            .columns([CommissionRules::Level, CommissionRules::Percentage])
            .values_panic([GLOBAL_RULE_LEVEL.into(), percentage.to_string().into()])
            .on_conflict(
                OnConflict::column(CommissionRules::Level)
                    .update_column(CommissionRules::Percentage)
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OwnershipRecord for SqliteStore {
    async fn owns_plan(&self, agent_id: AgentId, plan_id: PlanId) -> Result<bool> {
        let query = Query::select()
            .column(PlanOwnership::AgentId)
            .from(PlanOwnership::Table)
            .and_where(Expr::col(PlanOwnership::AgentId).eq(agent_id.to_string()))
            .and_where(Expr::col(PlanOwnership::PlanId).eq(plan_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn record_ownership(
        &self,
        agent_id: AgentId,
        plan_id: PlanId,
        payment_id: Option<PaymentId>,
    ) -> Result<()> {
        let query = Query::insert()
            .into_table(PlanOwnership::Table)
            .columns([
                PlanOwnership::AgentId,
                PlanOwnership::PlanId,
                PlanOwnership::PaymentId,
                PlanOwnership::CreatedAt,
            ])
            .values_panic([
                agent_id.to_string().into(),
                plan_id.to_string().into(),
                payment_id.map(|p| p.to_string()).into(),
                chrono::Utc::now().to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([PlanOwnership::AgentId, PlanOwnership::PlanId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}
