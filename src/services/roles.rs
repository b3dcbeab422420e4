//! Role reassignment planning.
//!
//! Reassignments are computed as a plan first and only written back when the
//! operator applies it, so a dry run costs nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::entities::{role, user, user_role};
use crate::errors::ServiceError;
use crate::services::access::DirectoryStore;

/// One planned assignment change.
#[derive(Debug, Serialize)]
pub struct PlannedMove {
    pub user_id: i32,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ReassignmentPlan {
    pub from_role: String,
    pub to_role: String,
    pub from_role_id: i32,
    pub to_role_id: i32,
    /// Users whose `from` assignment becomes a `to` assignment.
    pub moves: Vec<PlannedMove>,
    /// Users holding both roles already; left untouched to avoid duplicate
    /// assignments, listed for operator follow-up.
    pub already_assigned: Vec<PlannedMove>,
}

impl ReassignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Computes the moves needed to replace every assignment of `from` with an
/// assignment of `to`. Pure.
pub fn plan_role_reassignment(
    users: &[user::Model],
    roles: &[role::Model],
    user_roles: &[user_role::Model],
    from: &str,
    to: &str,
) -> Result<ReassignmentPlan, ServiceError> {
    if from == to {
        return Err(ServiceError::InvalidInput(
            "source and target roles are the same".to_string(),
        ));
    }

    let role_id = |name: &str| {
        roles
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
            .ok_or_else(|| ServiceError::NotFound(format!("role '{}'", name)))
    };
    let from_role_id = role_id(from)?;
    let to_role_id = role_id(to)?;

    let emails: HashMap<i32, &str> = users.iter().map(|u| (u.id, u.email.as_str())).collect();
    let target_holders: HashSet<i32> = user_roles
        .iter()
        .filter(|ur| ur.role_id == to_role_id)
        .map(|ur| ur.user_id)
        .collect();

    let mut moves = Vec::new();
    let mut already_assigned = Vec::new();
    for ur in user_roles.iter().filter(|ur| ur.role_id == from_role_id) {
        let planned = PlannedMove {
            user_id: ur.user_id,
            email: emails
                .get(&ur.user_id)
                .map(|e| (*e).to_string())
                .unwrap_or_else(|| format!("user #{}", ur.user_id)),
        };
        if target_holders.contains(&ur.user_id) {
            already_assigned.push(planned);
        } else {
            moves.push(planned);
        }
    }

    Ok(ReassignmentPlan {
        from_role: from.to_string(),
        to_role: to.to_string(),
        from_role_id,
        to_role_id,
        moves,
        already_assigned,
    })
}

/// Service computing and applying role reassignments.
pub struct RoleService {
    store: Arc<dyn DirectoryStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn plan(&self, from: &str, to: &str) -> Result<ReassignmentPlan, ServiceError> {
        let users = self.store.fetch_users().await?;
        let roles = self.store.fetch_roles().await?;
        let user_roles = self.store.fetch_user_roles().await?;

        plan_role_reassignment(&users, &roles, &user_roles, from, to)
    }

    /// Executes a plan, one assignment at a time. The target role is
    /// inserted before the source is removed so a failure mid-move never
    /// leaves the user without either role.
    #[instrument(skip(self, plan), fields(from = %plan.from_role, to = %plan.to_role))]
    pub async fn apply(&self, plan: &ReassignmentPlan) -> Result<usize, ServiceError> {
        for planned in &plan.moves {
            self.store
                .insert_user_role(planned.user_id, plan.to_role_id)
                .await?;
            self.store
                .remove_user_role(planned.user_id, plan.from_role_id)
                .await?;
        }

        info!(applied = plan.moves.len(), "role reassignment applied");
        Ok(plan.moves.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn role(id: i32, name: &str) -> role::Model {
        let now = Utc::now();
        role::Model {
            id,
            name: name.to_string(),
            is_super_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(id: i32, email: &str) -> user::Model {
        let now = Utc::now();
        user::Model {
            id,
            email: email.to_string(),
            display_name: email.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
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
    fn plan_moves_only_source_role_holders() {
        let users = vec![user(1, "a@plant.example"), user(2, "b@plant.example")];
        let roles = vec![role(10, "operator"), role(11, "planner")];
        let assignments = vec![assignment(1, 10), assignment(2, 11)];

        let plan =
            plan_role_reassignment(&users, &roles, &assignments, "operator", "planner").unwrap();

        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].user_id, 1);
        assert!(plan.already_assigned.is_empty());
    }

    #[test]
    fn plan_skips_users_already_holding_target() {
        let users = vec![user(1, "a@plant.example")];
        let roles = vec![role(10, "operator"), role(11, "planner")];
        let assignments = vec![assignment(1, 10), assignment(1, 11)];

        let plan =
            plan_role_reassignment(&users, &roles, &assignments, "operator", "planner").unwrap();

        assert!(plan.moves.is_empty());
        assert_eq!(plan.already_assigned.len(), 1);
    }

    #[test]
    fn plan_rejects_unknown_role() {
        let err = plan_role_reassignment(&[], &[role(10, "operator")], &[], "operator", "ghost")
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));
    }

    #[test]
    fn plan_rejects_identical_roles() {
        let err =
            plan_role_reassignment(&[], &[role(10, "operator")], &[], "operator", "operator")
                .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }
}
