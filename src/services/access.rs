//! Permission/role reporting and user directory listing.
//!
//! The relational store guarantees that every join edge resolves; these
//! routines only flatten and group what they are handed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::db::DbPool;
use crate::entities::{permission, role, role_permission, user, user_role};
use crate::errors::ServiceError;

/// Storage seam for user/role/permission collections, shared by the access
/// report and the role reassignment planner.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<user::Model>, ServiceError>;
    async fn fetch_roles(&self) -> Result<Vec<role::Model>, ServiceError>;
    async fn fetch_permissions(&self) -> Result<Vec<permission::Model>, ServiceError>;
    async fn fetch_role_permissions(&self) -> Result<Vec<role_permission::Model>, ServiceError>;
    async fn fetch_user_roles(&self) -> Result<Vec<user_role::Model>, ServiceError>;

    async fn insert_user_role(&self, user_id: i32, role_id: i32) -> Result<(), ServiceError>;
    async fn remove_user_role(&self, user_id: i32, role_id: i32) -> Result<(), ServiceError>;
}

pub struct SeaOrmDirectoryStore {
    db: Arc<DbPool>,
}

impl SeaOrmDirectoryStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DirectoryStore for SeaOrmDirectoryStore {
    async fn fetch_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .order_by_asc(user::Column::Id)
            .all(&*self.db)
            .await?)
    }

    async fn fetch_roles(&self) -> Result<Vec<role::Model>, ServiceError> {
        Ok(role::Entity::find()
            .order_by_asc(role::Column::Id)
            .all(&*self.db)
            .await?)
    }

    async fn fetch_permissions(&self) -> Result<Vec<permission::Model>, ServiceError> {
        Ok(permission::Entity::find()
            .order_by_asc(permission::Column::Id)
            .all(&*self.db)
            .await?)
    }

    async fn fetch_role_permissions(&self) -> Result<Vec<role_permission::Model>, ServiceError> {
        Ok(role_permission::Entity::find().all(&*self.db).await?)
    }

    async fn fetch_user_roles(&self) -> Result<Vec<user_role::Model>, ServiceError> {
        Ok(user_role::Entity::find().all(&*self.db).await?)
    }

    async fn insert_user_role(&self, user_id: i32, role_id: i32) -> Result<(), ServiceError> {
        let assignment = user_role::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
            assigned_at: Set(Utc::now()),
        };
        assignment.insert(&*self.db).await?;
        Ok(())
    }

    async fn remove_user_role(&self, user_id: i32, role_id: i32) -> Result<(), ServiceError> {
        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(user_id))
            .filter(user_role::Column::RoleId.eq(role_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}

/// Permissions attached to one role.
#[derive(Debug, Serialize)]
pub struct RolePermissions {
    pub role: String,
    pub super_admin: bool,
    pub permissions: Vec<String>,
}

/// One role held by a user, with the super-admin flag surfaced per
/// assignment.
#[derive(Debug, Serialize)]
pub struct RoleAssignment {
    pub role: String,
    pub super_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct UserAccess {
    pub email: String,
    pub display_name: String,
    pub roles: Vec<RoleAssignment>,
}

/// Grouped report: for each role the permissions attached, for each user the
/// roles attached.
#[derive(Debug, Serialize)]
pub struct AccessReport {
    pub roles: Vec<RolePermissions>,
    pub users: Vec<UserAccess>,
}

/// A user with their role names, for directory listings.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub roles: Vec<String>,
}

/// Joins and groups the five collections into an [`AccessReport`].
///
/// Output is sorted (roles and permissions by name, users by email) so
/// repeated runs produce identical reports.
pub fn build_access_report(
    roles: &[role::Model],
    permissions: &[permission::Model],
    role_permissions: &[role_permission::Model],
    users: &[user::Model],
    user_roles: &[user_role::Model],
) -> AccessReport {
    let permission_names: HashMap<i32, &str> = permissions
        .iter()
        .map(|p| (p.id, p.name.as_str()))
        .collect();
    let roles_by_id: HashMap<i32, &role::Model> = roles.iter().map(|r| (r.id, r)).collect();

    let mut role_rows: Vec<RolePermissions> = roles
        .iter()
        .map(|r| {
            let mut names: Vec<String> = role_permissions
                .iter()
                .filter(|rp| rp.role_id == r.id)
                .filter_map(|rp| match permission_names.get(&rp.permission_id) {
                    Some(name) => Some((*name).to_string()),
                    None => {
                        debug!(permission_id = rp.permission_id, "unresolvable permission reference");
                        None
                    }
                })
                .collect();
            names.sort();
            RolePermissions {
                role: r.name.clone(),
                super_admin: r.is_super_admin,
                permissions: names,
            }
        })
        .collect();
    role_rows.sort_by(|a, b| a.role.cmp(&b.role));

    let mut user_rows: Vec<UserAccess> = users
        .iter()
        .map(|u| {
            let mut assignments: Vec<RoleAssignment> = user_roles
                .iter()
                .filter(|ur| ur.user_id == u.id)
                .filter_map(|ur| match roles_by_id.get(&ur.role_id) {
                    Some(r) => Some(RoleAssignment {
                        role: r.name.clone(),
                        super_admin: r.is_super_admin,
                    }),
                    None => {
                        debug!(role_id = ur.role_id, "unresolvable role reference");
                        None
                    }
                })
                .collect();
            assignments.sort_by(|a, b| a.role.cmp(&b.role));
            UserAccess {
                email: u.email.clone(),
                display_name: u.display_name.clone(),
                roles: assignments,
            }
        })
        .collect();
    user_rows.sort_by(|a, b| a.email.cmp(&b.email));

    AccessReport {
        roles: role_rows,
        users: user_rows,
    }
}

/// Service exposing the permission report and the user directory listing.
pub struct AccessService {
    store: Arc<dyn DirectoryStore>,
}

impl AccessService {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn permission_report(&self) -> Result<AccessReport, ServiceError> {
        let roles = self.store.fetch_roles().await?;
        let permissions = self.store.fetch_permissions().await?;
        let role_permissions = self.store.fetch_role_permissions().await?;
        let users = self.store.fetch_users().await?;
        let user_roles = self.store.fetch_user_roles().await?;

        Ok(build_access_report(
            &roles,
            &permissions,
            &role_permissions,
            &users,
            &user_roles,
        ))
    }

    /// All users with their role names, sorted by email.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, ServiceError> {
        let users = self.store.fetch_users().await?;
        let roles = self.store.fetch_roles().await?;
        let user_roles = self.store.fetch_user_roles().await?;

        let role_names: HashMap<i32, &str> = roles.iter().map(|r| (r.id, r.name.as_str())).collect();

        let mut summaries: Vec<UserSummary> = users
            .iter()
            .map(|u| {
                let mut names: Vec<String> = user_roles
                    .iter()
                    .filter(|ur| ur.user_id == u.id)
                    .filter_map(|ur| role_names.get(&ur.role_id).map(|n| (*n).to_string()))
                    .collect();
                names.sort();
                UserSummary {
                    id: u.id,
                    email: u.email.clone(),
                    display_name: u.display_name.clone(),
                    is_active: u.is_active,
                    roles: names,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.email.cmp(&b.email));

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use sea_orm::DbErr;

    fn role(id: i32, name: &str, super_admin: bool) -> role::Model {
        let now = Utc::now();
        role::Model {
            id,
            name: name.to_string(),
            is_super_admin: super_admin,
            created_at: now,
            updated_at: now,
        }
    }

    fn permission(id: i32, name: &str) -> permission::Model {
        permission::Model {
            id,
            name: name.to_string(),
            description: None,
        }
    }

    fn user(id: i32, email: &str) -> user::Model {
        let now = Utc::now();
        user::Model {
            id,
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn edge(role_id: i32, permission_id: i32) -> role_permission::Model {
        role_permission::Model {
            role_id,
            permission_id,
        }
    }

    fn assignment(user_id: i32, role_id: i32) -> user_role::Model {
        user_role::Model {
            user_id,
            role_id,
            assigned_at: Utc::now(),
        }
    }

    #[test]
    fn report_groups_permissions_under_roles() {
        let roles = vec![role(1, "planner", false), role(2, "admin", true)];
        let permissions = vec![
            permission(10, "workorders:read"),
            permission(11, "workorders:write"),
            permission(12, "projects:manage"),
        ];
        let edges = vec![edge(1, 10), edge(2, 12), edge(2, 10), edge(2, 11)];

        let report = build_access_report(&roles, &permissions, &edges, &[], &[]);

        assert_eq!(report.roles.len(), 2);
        // sorted by role name
        assert_eq!(report.roles[0].role, "admin");
        assert!(report.roles[0].super_admin);
        assert_eq!(
            report.roles[0].permissions,
            ["projects:manage", "workorders:read", "workorders:write"]
        );
        assert_eq!(report.roles[1].role, "planner");
        assert_eq!(report.roles[1].permissions, ["workorders:read"]);
    }

    #[test]
    fn report_surfaces_super_admin_per_assignment() {
        let roles = vec![role(1, "admin", true), role(2, "viewer", false)];
        let users = vec![user(7, "zoe@plant.example"), user(8, "abe@plant.example")];
        let assignments = vec![assignment(7, 1), assignment(7, 2), assignment(8, 2)];

        let report = build_access_report(&roles, &[], &[], &users, &assignments);

        // users sorted by email
        assert_eq!(report.users[0].email, "abe@plant.example");
        assert_eq!(report.users[0].roles.len(), 1);
        assert!(!report.users[0].roles[0].super_admin);

        assert_eq!(report.users[1].email, "zoe@plant.example");
        let flags: Vec<bool> = report.users[1].roles.iter().map(|r| r.super_admin).collect();
        assert_eq!(flags, [true, false]);
    }

    #[tokio::test]
    async fn report_propagates_store_failure() {
        let mut store = MockDirectoryStore::new();
        store.expect_fetch_roles().returning(|| {
            Err(ServiceError::DatabaseError(DbErr::Custom(
                "relation missing".into(),
            )))
        });

        let service = AccessService::new(Arc::new(store));
        let err = service.permission_report().await.unwrap_err();

        assert_matches!(err, ServiceError::DatabaseError(_));
    }

    #[test]
    fn report_counts_every_edge_exactly_once() {
        let roles = vec![role(1, "planner", false)];
        let permissions = vec![permission(10, "workorders:read")];
        let edges = vec![edge(1, 10)];
        let users = vec![user(7, "zoe@plant.example")];
        let assignments = vec![assignment(7, 1)];

        let report = build_access_report(&roles, &permissions, &edges, &users, &assignments);

        let permission_count: usize = report.roles.iter().map(|r| r.permissions.len()).sum();
        let assignment_count: usize = report.users.iter().map(|u| u.roles.len()).sum();
        assert_eq!(permission_count, edges.len());
        assert_eq!(assignment_count, assignments.len());
    }
}
