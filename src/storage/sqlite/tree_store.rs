//! SQLite TreeStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{begin_immediate, begin_read, finish, is_unique_violation, parse_id, parse_opt_id, to_u32, SqliteStore};
use crate::model::{AgentId, Position, TreeNode};
use crate::storage::schema::{TreeNodes, TreeSlots};
use crate::storage::{Result, StorageError, TreeStore};

const NODE_COLUMNS: [TreeNodes; 5] = [
    TreeNodes::PairingLimit,
    TreeNodes::AgentId,
    TreeNodes::ParentId,
    TreeNodes::Position,
    TreeNodes::Level,
];

fn node_from_row(row: &SqliteRow) -> Result<TreeNode> {
    let pairing_limit = to_u32(row.try_get("pairing_limit")?, "pairing_limit")?;
    let agent_id: String = row.try_get("agent_id")?;
    let position: String = row.try_get("position")?;
    Ok(TreeNode {
        agent_id: parse_id(&agent_id)?,
        pairing_limit,
        parent_id: parse_opt_id(row.try_get("parent_id")?)?,
        position: position
            .parse::<Position>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        level: to_u32(row.try_get("level")?, "level")?,
        children: vec![None; pairing_limit as usize],
    })
}

/// Fill `node.children` from slot rows `(slot, child_id)`.
fn apply_slot(node: &mut TreeNode, slot: u32, child_id: AgentId) -> Result<()> {
    let cell = slot
        .checked_sub(1)
        .and_then(|idx| node.children.get_mut(idx as usize))
        .ok_or_else(|| {
            StorageError::Corrupt(format!(
                "slot {slot} under {} exceeds pairing limit {}",
                node.agent_id, node.pairing_limit
            ))
        })?;
    *cell = Some(child_id);
    Ok(())
}

impl SqliteStore {
    async fn select_node(
        conn: &mut SqliteConnection,
        pairing_limit: u32,
        agent_id: AgentId,
    ) -> Result<Option<TreeNode>> {
        let query = Query::select()
            .columns(NODE_COLUMNS)
            .from(TreeNodes::Table)
            .and_where(Expr::col(TreeNodes::PairingLimit).eq(pairing_limit))
            .and_where(Expr::col(TreeNodes::AgentId).eq(agent_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        let mut node = node_from_row(&row)?;

        let query = Query::select()
            .columns([TreeSlots::Slot, TreeSlots::ChildId])
            .from(TreeSlots::Table)
            .and_where(Expr::col(TreeSlots::PairingLimit).eq(pairing_limit))
            .and_where(Expr::col(TreeSlots::ParentId).eq(agent_id.to_string()))
            .to_string(SqliteQueryBuilder);

        for row in sqlx::query(&query).fetch_all(&mut *conn).await? {
            let slot = to_u32(row.try_get("slot")?, "slot")?;
            let child_id: String = row.try_get("child_id")?;
            apply_slot(&mut node, slot, parse_id(&child_id)?)?;
        }
        Ok(Some(node))
    }

    async fn select_slot(
        conn: &mut SqliteConnection,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
    ) -> Result<Option<AgentId>> {
        let query = Query::select()
            .column(TreeSlots::ChildId)
            .from(TreeSlots::Table)
            .and_where(Expr::col(TreeSlots::PairingLimit).eq(pairing_limit))
            .and_where(Expr::col(TreeSlots::ParentId).eq(parent_id.to_string()))
            .and_where(Expr::col(TreeSlots::Slot).eq(slot))
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&mut *conn).await? {
            Some(row) => {
                let child_id: String = row.try_get("child_id")?;
                Ok(Some(parse_id(&child_id)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_node(conn: &mut SqliteConnection, node: &TreeNode) -> std::result::Result<(), sqlx::Error> {
        let query = Query::insert()
            .into_table(TreeNodes::Table)
            .columns([
                TreeNodes::PairingLimit,
                TreeNodes::AgentId,
                TreeNodes::ParentId,
                TreeNodes::Position,
                TreeNodes::Level,
                TreeNodes::CreatedAt,
            ])
            .values_panic([
                node.pairing_limit.into(),
                node.agent_id.to_string().into(),
                node.parent_id.map(|p| p.to_string()).into(),
                node.position.to_string().into(),
                node.level.into(),
                chrono::Utc::now().to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn insert_slot(
        conn: &mut SqliteConnection,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        child_id: AgentId,
    ) -> std::result::Result<(), sqlx::Error> {
        let query = Query::insert()
            .into_table(TreeSlots::Table)
            .columns([
                TreeSlots::PairingLimit,
                TreeSlots::ParentId,
                TreeSlots::Slot,
                TreeSlots::ChildId,
            ])
            .values_panic([
                pairing_limit.into(),
                parent_id.to_string().into(),
                slot.into(),
                child_id.to_string().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    /// Nodes and slot rows are read in one transaction so the snapshot is consistent.
    async fn load_partition_in_tx(conn: &mut SqliteConnection, pairing_limit: u32) -> Result<Vec<TreeNode>> {
        let query = Query::select()
            .columns(NODE_COLUMNS)
            .from(TreeNodes::Table)
            .and_where(Expr::col(TreeNodes::PairingLimit).eq(pairing_limit))
            .to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

        let mut nodes: HashMap<AgentId, TreeNode> = HashMap::with_capacity(rows.len());
        for row in rows {
            let node = node_from_row(&row)?;
            nodes.insert(node.agent_id, node);
        }

        let query = Query::select()
            .columns([TreeSlots::ParentId, TreeSlots::Slot, TreeSlots::ChildId])
            .from(TreeSlots::Table)
            .and_where(Expr::col(TreeSlots::PairingLimit).eq(pairing_limit))
            .to_string(SqliteQueryBuilder);

        for row in sqlx::query(&query).fetch_all(&mut *conn).await? {
            let parent_id: String = row.try_get("parent_id")?;
            let child_id: String = row.try_get("child_id")?;
            let slot = to_u32(row.try_get("slot")?, "slot")?;
            let parent_id: AgentId = parse_id(&parent_id)?;
            let node = nodes.get_mut(&parent_id).ok_or_else(|| {
                StorageError::Corrupt(format!("slot row for missing parent {parent_id}"))
            })?;
            apply_slot(node, slot, parse_id(&child_id)?)?;
        }

        Ok(nodes.into_values().collect())
    }

    async fn insert_root_in_tx(
        conn: &mut SqliteConnection,
        agent_id: AgentId,
        pairing_limit: u32,
    ) -> Result<TreeNode> {
        if Self::select_node(conn, pairing_limit, agent_id).await?.is_some() {
            return Err(StorageError::AlreadyPlaced {
                agent_id,
                pairing_limit,
            });
        }

        let query = Query::select()
            .column(TreeNodes::AgentId)
            .from(TreeNodes::Table)
            .and_where(Expr::col(TreeNodes::PairingLimit).eq(pairing_limit))
            .and_where(Expr::col(TreeNodes::Position).eq(Position::Root.to_string()))
            .to_string(SqliteQueryBuilder);
        if sqlx::query(&query).fetch_optional(&mut *conn).await?.is_some() {
            return Err(StorageError::RootExists { pairing_limit });
        }

        let node = TreeNode::root(agent_id, pairing_limit);
        match Self::insert_node(conn, &node).await {
            Ok(()) => Ok(node),
            Err(e) if is_unique_violation(&e) => Err(StorageError::RootExists { pairing_limit }),
            Err(e) => Err(e.into()),
        }
    }

    async fn attach_in_tx(
        conn: &mut SqliteConnection,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        agent_id: AgentId,
    ) -> Result<TreeNode> {
        if Self::select_node(conn, pairing_limit, agent_id).await?.is_some() {
            return Err(StorageError::AlreadyPlaced {
                agent_id,
                pairing_limit,
            });
        }
        let parent = Self::select_node(conn, pairing_limit, parent_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tree node", parent_id))?;
        if Self::select_slot(conn, pairing_limit, parent_id, slot).await?.is_some() {
            return Err(StorageError::SlotTaken { parent_id, slot });
        }

        let node = TreeNode::child_of(agent_id, &parent, slot);
        let written = match Self::insert_node(conn, &node).await {
            Ok(()) => Self::insert_slot(conn, pairing_limit, parent_id, slot, agent_id).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => Ok(node),
            Err(e) if is_unique_violation(&e) => Err(StorageError::SlotTaken { parent_id, slot }),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_slot_in_tx(
        conn: &mut SqliteConnection,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        child_id: AgentId,
    ) -> Result<()> {
        if Self::select_node(conn, pairing_limit, child_id).await?.is_none() {
            return Err(StorageError::not_found("tree node", child_id));
        }
        if Self::select_node(conn, pairing_limit, parent_id).await?.is_none() {
            return Err(StorageError::not_found("tree node", parent_id));
        }
        match Self::select_slot(conn, pairing_limit, parent_id, slot).await? {
            Some(existing) if existing == child_id => Ok(()),
            Some(_) => Err(StorageError::SlotTaken { parent_id, slot }),
            None => {
                Self::insert_slot(conn, pairing_limit, parent_id, slot, child_id).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TreeStore for SqliteStore {
    async fn find_node(&self, agent_id: AgentId, pairing_limit: u32) -> Result<Option<TreeNode>> {
        let mut conn = self.pool.acquire().await?;
        Self::select_node(&mut conn, pairing_limit, agent_id).await
    }

    async fn load_partition(&self, pairing_limit: u32) -> Result<Vec<TreeNode>> {
        let mut conn = self.pool.acquire().await?;
        begin_read(&mut conn).await?;
        let result = Self::load_partition_in_tx(&mut conn, pairing_limit).await;
        finish(&mut conn, result).await
    }

    async fn insert_root(&self, agent_id: AgentId, pairing_limit: u32) -> Result<TreeNode> {
        if pairing_limit == 0 {
            return Err(StorageError::InvalidPairingLimit);
        }
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = Self::insert_root_in_tx(&mut conn, agent_id, pairing_limit).await;
        finish(&mut conn, result).await
    }

    async fn attach_child(
        &self,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        agent_id: AgentId,
    ) -> Result<TreeNode> {
        if slot == 0 || slot > pairing_limit {
            return Err(StorageError::InvalidSlot {
                slot,
                pairing_limit,
            });
        }
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = Self::attach_in_tx(&mut conn, pairing_limit, parent_id, slot, agent_id).await;
        finish(&mut conn, result).await
    }

    async fn set_slot(
        &self,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        child_id: AgentId,
    ) -> Result<()> {
        if slot == 0 || slot > pairing_limit {
            return Err(StorageError::InvalidSlot {
                slot,
                pairing_limit,
            });
        }
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = Self::set_slot_in_tx(&mut conn, pairing_limit, parent_id, slot, child_id).await;
        finish(&mut conn, result).await
    }
}
