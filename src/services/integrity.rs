//! Work-order referential integrity checking.
//!
//! Projects are the source of truth for valid parent references. A work
//! order whose non-null `project_id` does not resolve to a project row is an
//! orphan, left behind by an out-of-band project deletion that did not
//! cascade. Scanning partitions the table into valid, orphaned and
//! unassigned sets; cleanup removes the orphaned subset in one statement.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::db::DbPool;
use crate::entities::{project, work_order};
use crate::errors::ServiceError;

/// Storage seam for the integrity checker.
///
/// Injected into [`IntegrityService`] so the checker can be exercised against
/// an in-memory fake; the production implementation is [`SeaOrmWorkOrderStore`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkOrderStore: Send + Sync {
    /// Fetches every work order, ordered by id for reproducible reports.
    async fn fetch_work_orders(&self) -> Result<Vec<work_order::Model>, ServiceError>;

    /// Fetches the set of currently existing project identifiers.
    async fn fetch_project_ids(&self) -> Result<HashSet<i32>, ServiceError>;

    /// Deletes work orders whose non-null project reference is absent from
    /// `valid_ids`. Must execute as a single statement; unassigned rows
    /// (null reference) are untouched.
    async fn delete_orphaned(&self, valid_ids: &HashSet<i32>) -> Result<u64, ServiceError>;

    /// Deletes every work order row.
    async fn delete_all(&self) -> Result<u64, ServiceError>;
}

/// sea-orm-backed store used by the CLI.
pub struct SeaOrmWorkOrderStore {
    db: Arc<DbPool>,
}

impl SeaOrmWorkOrderStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WorkOrderStore for SeaOrmWorkOrderStore {
    async fn fetch_work_orders(&self) -> Result<Vec<work_order::Model>, ServiceError> {
        let rows = work_order::Entity::find()
            .order_by_asc(work_order::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }

    async fn fetch_project_ids(&self) -> Result<HashSet<i32>, ServiceError> {
        let projects = project::Entity::find().all(&*self.db).await?;
        Ok(projects.into_iter().map(|p| p.id).collect())
    }

    async fn delete_orphaned(&self, valid_ids: &HashSet<i32>) -> Result<u64, ServiceError> {
        let ids: Vec<i32> = valid_ids.iter().copied().collect();
        let result = work_order::Entity::delete_many()
            .filter(
                Condition::all()
                    .add(work_order::Column::ProjectId.is_not_null())
                    .add(work_order::Column::ProjectId.is_not_in(ids)),
            )
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete_all(&self) -> Result<u64, ServiceError> {
        let result = work_order::Entity::delete_many().exec(&*self.db).await?;
        Ok(result.rows_affected)
    }
}

/// Partition of the work-order table produced by a scan.
#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    /// Non-null reference resolving to an existing project.
    pub valid: Vec<work_order::Model>,
    /// Non-null reference pointing at a missing project.
    pub orphaned: Vec<work_order::Model>,
    /// Null reference. Flagged for visibility, not an error.
    pub unassigned: Vec<work_order::Model>,
}

impl IntegrityReport {
    pub fn total(&self) -> usize {
        self.valid.len() + self.orphaned.len() + self.unassigned.len()
    }

    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty()
    }
}

/// Result of a cleanup run. `removed` carries the orphaned rows targeted by
/// the delete so operators can audit what went away; `deleted` is the row
/// count reported by the store and is authoritative.
#[derive(Debug, Serialize)]
pub struct CleanupOutcome {
    pub deleted: u64,
    pub removed: Vec<work_order::Model>,
}

/// Partitions `work_orders` against the valid project-id set.
///
/// Pure: input order is preserved within each partition and every input row
/// lands in exactly one of the three groups.
pub fn classify(work_orders: Vec<work_order::Model>, valid_ids: &HashSet<i32>) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    for order in work_orders {
        match order.project_id {
            None => report.unassigned.push(order),
            Some(id) if valid_ids.contains(&id) => report.valid.push(order),
            Some(_) => report.orphaned.push(order),
        }
    }

    report
}

/// Service wrapping the integrity scan and cleanup operations.
pub struct IntegrityService {
    store: Arc<dyn WorkOrderStore>,
}

impl IntegrityService {
    pub fn new(store: Arc<dyn WorkOrderStore>) -> Self {
        Self { store }
    }

    /// Whether any project rows exist. The CLI uses this to gate the
    /// delete-everything branch of [`cleanup`](Self::cleanup) behind an
    /// explicit operator flag.
    pub async fn has_projects(&self) -> Result<bool, ServiceError> {
        Ok(!self.store.fetch_project_ids().await?.is_empty())
    }

    /// Scans the work-order table and classifies every row. Read only.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<IntegrityReport, ServiceError> {
        let work_orders = self.store.fetch_work_orders().await?;
        let valid_ids = self.store.fetch_project_ids().await?;

        let report = classify(work_orders, &valid_ids);

        info!(
            total = report.total(),
            valid = report.valid.len(),
            unassigned = report.unassigned.len(),
            orphaned = report.orphaned.len(),
            "integrity scan complete"
        );
        if !report.is_clean() {
            warn!(
                orphaned = report.orphaned.len(),
                "work orders reference missing projects"
            );
        }

        Ok(report)
    }

    /// Removes orphaned work orders.
    ///
    /// When no projects exist at all, every work order is removed; otherwise
    /// exactly the rows with a non-null, unresolvable reference are deleted
    /// and unassigned rows are kept. The whole batch succeeds or fails as
    /// one statement.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> Result<CleanupOutcome, ServiceError> {
        let valid_ids = self.store.fetch_project_ids().await?;
        let work_orders = self.store.fetch_work_orders().await?;

        if valid_ids.is_empty() {
            let deleted = self.store.delete_all().await?;
            warn!(deleted, "no projects exist; removed every work order");
            return Ok(CleanupOutcome {
                deleted,
                removed: work_orders,
            });
        }

        let report = classify(work_orders, &valid_ids);
        let deleted = self.store.delete_orphaned(&valid_ids).await?;

        info!(deleted, "orphaned work orders removed");

        Ok(CleanupOutcome {
            deleted,
            removed: report.orphaned,
        })
    }
}
