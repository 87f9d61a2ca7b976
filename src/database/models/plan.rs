use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::plan_gate::QuotaDimension;

/// Billing tier. Reference data seeded at deploy time; a `None` quota
/// means unlimited for that dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub included_storage_bytes: Option<i64>,
    #[serde(default)]
    pub included_bandwidth_bytes: Option<i64>,
    #[serde(default)]
    pub included_seats: Option<i64>,
    #[serde(default)]
    pub included_processing_jobs: Option<i64>,
    #[serde(default)]
    pub included_projects: Option<i64>,
    #[serde(default)]
    pub included_integrations: Option<i64>,
    #[serde(default)]
    pub monthly_price_cents: i64,
    #[serde(default)]
    pub yearly_price_cents: i64,
}

impl Plan {
    pub fn limit(&self, dimension: QuotaDimension) -> Option<i64> {
        match dimension {
            QuotaDimension::Storage => self.included_storage_bytes,
            QuotaDimension::Bandwidth => self.included_bandwidth_bytes,
            QuotaDimension::Seats => self.included_seats,
            QuotaDimension::ProcessingJobs => self.included_processing_jobs,
            QuotaDimension::Projects => self.included_projects,
            QuotaDimension::Integrations => self.included_integrations,
        }
    }

    /// Catalog used when no plan file is seeded
    pub fn default_catalog() -> Vec<Plan> {
        const GIB: i64 = 1024 * 1024 * 1024;

        vec![
            Plan {
                code: "free".into(),
                name: "Free".into(),
                included_storage_bytes: Some(GIB),
                included_bandwidth_bytes: Some(10 * GIB),
                included_seats: Some(3),
                included_processing_jobs: Some(10),
                included_projects: Some(10),
                included_integrations: Some(1),
                monthly_price_cents: 0,
                yearly_price_cents: 0,
            },
            Plan {
                code: "pro".into(),
                name: "Pro".into(),
                included_storage_bytes: Some(50 * GIB),
                included_bandwidth_bytes: Some(250 * GIB),
                included_seats: Some(5),
                included_processing_jobs: Some(200),
                included_projects: Some(100),
                included_integrations: Some(5),
                monthly_price_cents: 4_900,
                yearly_price_cents: 49_000,
            },
            Plan {
                code: "team".into(),
                name: "Team".into(),
                included_storage_bytes: Some(500 * GIB),
                included_bandwidth_bytes: Some(2_000 * GIB),
                included_seats: Some(25),
                included_processing_jobs: Some(2_000),
                included_projects: None,
                included_integrations: Some(25),
                monthly_price_cents: 19_900,
                yearly_price_cents: 199_000,
            },
            Plan {
                code: "enterprise".into(),
                name: "Enterprise".into(),
                included_storage_bytes: None,
                included_bandwidth_bytes: None,
                included_seats: None,
                included_processing_jobs: None,
                included_projects: None,
                included_integrations: None,
                monthly_price_cents: 0,
                yearly_price_cents: 0,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_allows_ten_projects() {
        let free = Plan::default_catalog()
            .into_iter()
            .find(|p| p.code == "free")
            .unwrap();
        assert_eq!(free.limit(QuotaDimension::Projects), Some(10));
    }

    #[test]
    fn plan_file_fields_default_to_unlimited() {
        let yaml = "code: custom\nname: Custom\nincludedProjects: 3\n";
        let plan: Plan = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(plan.limit(QuotaDimension::Projects), Some(3));
        assert_eq!(plan.limit(QuotaDimension::Seats), None);
        assert_eq!(plan.monthly_price_cents, 0);
    }
}
