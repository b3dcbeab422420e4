//! Demo client seeding for local exploration.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::db::DbPool;
use crate::entities::client;
use crate::errors::ServiceError;

/// (name, contact email, contact phone)
const DEMO_CLIENTS: &[(&str, &str, Option<&str>)] = &[
    ("Aurora Fabrication", "ops@aurorafab.example", Some("+1-555-0141")),
    ("Beacon Assembly Co", "production@beaconassembly.example", Some("+1-555-0142")),
    ("Cascade Tooling", "scheduling@cascadetooling.example", None),
    ("Delta Machining", "workorders@deltamachining.example", Some("+1-555-0144")),
    ("Evergreen Composites", "plant@evergreencomposites.example", None),
];

#[derive(Debug, Serialize)]
pub struct SeedSummary {
    pub created: usize,
    pub skipped: usize,
}

pub struct SeedService {
    db: Arc<DbPool>,
}

impl SeedService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Inserts the demo client table. Existing clients (matched by contact
    /// email) are skipped so reruns are safe.
    #[instrument(skip(self))]
    pub async fn seed_clients(&self) -> Result<SeedSummary, ServiceError> {
        let mut summary = SeedSummary {
            created: 0,
            skipped: 0,
        };

        for (name, email, phone) in DEMO_CLIENTS {
            let existing = client::Entity::find()
                .filter(client::Column::ContactEmail.eq(*email))
                .one(&*self.db)
                .await?;

            if existing.is_some() {
                debug!(email = *email, "client already present, skipping");
                summary.skipped += 1;
                continue;
            }

            let record = client::ActiveModel {
                name: Set((*name).to_string()),
                contact_email: Set((*email).to_string()),
                contact_phone: Set(phone.map(|p| p.to_string())),
                ..Default::default()
            };
            record.insert(&*self.db).await?;

            info!(name = *name, "client created");
            summary.created += 1;
        }

        Ok(summary)
    }
}
