//! Shared in-memory store fakes and model builders for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use prodman_ops::entities::{permission, role, role_permission, user, user_role, work_order};
use prodman_ops::errors::ServiceError;
use prodman_ops::services::access::DirectoryStore;
use prodman_ops::services::integrity::WorkOrderStore;

/// In-memory work-order store mirroring the bulk-delete contract of the
/// production store.
pub struct InMemoryWorkOrderStore {
    work_orders: Mutex<Vec<work_order::Model>>,
    project_ids: HashSet<i32>,
}

impl InMemoryWorkOrderStore {
    pub fn new(
        work_orders: Vec<work_order::Model>,
        project_ids: impl IntoIterator<Item = i32>,
    ) -> Self {
        Self {
            work_orders: Mutex::new(work_orders),
            project_ids: project_ids.into_iter().collect(),
        }
    }

    /// Ids of the rows still present, in table order.
    pub fn remaining(&self) -> Vec<i32> {
        self.work_orders
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect()
    }
}

#[async_trait]
impl WorkOrderStore for InMemoryWorkOrderStore {
    async fn fetch_work_orders(&self) -> Result<Vec<work_order::Model>, ServiceError> {
        Ok(self.work_orders.lock().unwrap().clone())
    }

    async fn fetch_project_ids(&self) -> Result<HashSet<i32>, ServiceError> {
        Ok(self.project_ids.clone())
    }

    async fn delete_orphaned(&self, valid_ids: &HashSet<i32>) -> Result<u64, ServiceError> {
        let mut orders = self.work_orders.lock().unwrap();
        let before = orders.len();
        orders.retain(|o| match o.project_id {
            None => true,
            Some(id) => valid_ids.contains(&id),
        });
        Ok((before - orders.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64, ServiceError> {
        let mut orders = self.work_orders.lock().unwrap();
        let before = orders.len();
        orders.clear();
        Ok(before as u64)
    }
}

/// In-memory user/role/permission directory.
pub struct InMemoryDirectory {
    users: Vec<user::Model>,
    roles: Vec<role::Model>,
    permissions: Vec<permission::Model>,
    role_permissions: Vec<role_permission::Model>,
    user_roles: Mutex<Vec<user_role::Model>>,
}

impl InMemoryDirectory {
    pub fn new(
        users: Vec<user::Model>,
        roles: Vec<role::Model>,
        permissions: Vec<permission::Model>,
        role_permissions: Vec<role_permission::Model>,
        user_roles: Vec<user_role::Model>,
    ) -> Self {
        Self {
            users,
            roles,
            permissions,
            role_permissions,
            user_roles: Mutex::new(user_roles),
        }
    }

    /// Current (user_id, role_id) assignment pairs.
    pub fn assignments(&self) -> Vec<(i32, i32)> {
        self.user_roles
            .lock()
            .unwrap()
            .iter()
            .map(|ur| (ur.user_id, ur.role_id))
            .collect()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn fetch_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(self.users.clone())
    }

    async fn fetch_roles(&self) -> Result<Vec<role::Model>, ServiceError> {
        Ok(self.roles.clone())
    }

    async fn fetch_permissions(&self) -> Result<Vec<permission::Model>, ServiceError> {
        Ok(self.permissions.clone())
    }

    async fn fetch_role_permissions(&self) -> Result<Vec<role_permission::Model>, ServiceError> {
        Ok(self.role_permissions.clone())
    }

    async fn fetch_user_roles(&self) -> Result<Vec<user_role::Model>, ServiceError> {
        Ok(self.user_roles.lock().unwrap().clone())
    }

    async fn insert_user_role(&self, user_id: i32, role_id: i32) -> Result<(), ServiceError> {
        self.user_roles.lock().unwrap().push(user_role::Model {
            user_id,
            role_id,
            assigned_at: Utc::now(),
        });
        Ok(())
    }

    async fn remove_user_role(&self, user_id: i32, role_id: i32) -> Result<(), ServiceError> {
        self.user_roles
            .lock()
            .unwrap()
            .retain(|ur| !(ur.user_id == user_id && ur.role_id == role_id));
        Ok(())
    }
}

pub fn work_order(id: i32, project_id: Option<i32>) -> work_order::Model {
    let now = Utc::now();
    work_order::Model {
        id,
        project_id,
        reference: format!("WO-{:04}", id),
        status: "scheduled".to_string(),
        items: serde_json::json!([{ "sku": "DEMO", "quantity": 1 }]),
        created_at: now,
        updated_at: now,
    }
}

pub fn user(id: i32, email: &str) -> user::Model {
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

pub fn role(id: i32, name: &str, super_admin: bool) -> role::Model {
    let now = Utc::now();
    role::Model {
        id,
        name: name.to_string(),
        is_super_admin: super_admin,
        created_at: now,
        updated_at: now,
    }
}

pub fn permission(id: i32, name: &str) -> permission::Model {
    permission::Model {
        id,
        name: name.to_string(),
        description: None,
    }
}

pub fn role_permission(role_id: i32, permission_id: i32) -> role_permission::Model {
    role_permission::Model {
        role_id,
        permission_id,
    }
}

pub fn user_role(user_id: i32, role_id: i32) -> user_role::Model {
    user_role::Model {
        user_id,
        role_id,
        assigned_at: Utc::now(),
    }
}
