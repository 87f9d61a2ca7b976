//! Plan limit checks.
//!
//! A quota of `None` is unlimited. A new unit is allowed while the usage it
//! produces stays at or under the limit. Privileged operators skip every
//! check before any usage is looked at.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::config::OperatorAllowList;
use crate::database::models::{Organization, Plan};
use crate::database::{DatabaseError, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDimension {
    Storage,
    Bandwidth,
    Seats,
    ProcessingJobs,
    Projects,
    Integrations,
}

impl QuotaDimension {
    pub const ALL: [QuotaDimension; 6] = [
        QuotaDimension::Storage,
        QuotaDimension::Bandwidth,
        QuotaDimension::Seats,
        QuotaDimension::ProcessingJobs,
        QuotaDimension::Projects,
        QuotaDimension::Integrations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaDimension::Storage => "storage",
            QuotaDimension::Bandwidth => "bandwidth",
            QuotaDimension::Seats => "seats",
            QuotaDimension::ProcessingJobs => "processing_jobs",
            QuotaDimension::Projects => "projects",
            QuotaDimension::Integrations => "integrations",
        }
    }
}

impl fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Plan '{plan_code}' allows {limit} {dimension}; this would use {usage}")]
pub struct LimitExceeded {
    pub dimension: QuotaDimension,
    pub usage: i64,
    pub limit: i64,
    pub plan_code: String,
}

pub fn has_unlimited_access(email: &str, operators: &OperatorAllowList) -> bool {
    operators.contains(email)
}

pub fn exceeds_limit(usage: i64, limit: Option<i64>) -> bool {
    limit.is_some_and(|limit| usage > limit)
}

/// Decide whether `usage_after` (usage including the new unit) fits the plan
pub fn check_quota(
    email: &str,
    operators: &OperatorAllowList,
    plan: &Plan,
    dimension: QuotaDimension,
    usage_after: i64,
) -> Result<(), LimitExceeded> {
    if has_unlimited_access(email, operators) {
        return Ok(());
    }

    match plan.limit(dimension) {
        Some(limit) if exceeds_limit(usage_after, Some(limit)) => Err(LimitExceeded {
            dimension,
            usage: usage_after,
            limit,
            plan_code: plan.code.clone(),
        }),
        _ => Ok(()),
    }
}

/// Plan attached to the organization. A dangling plan code is a data error.
pub async fn plan_for(store: &dyn Store, organization: &Organization) -> Result<Plan, DatabaseError> {
    store.find_plan(&organization.plan_code).await?.ok_or_else(|| {
        DatabaseError::Corrupt(format!(
            "organization {} references unknown plan '{}'",
            organization.id, organization.plan_code
        ))
    })
}

/// Current usage of one dimension. Bandwidth and processing jobs are
/// metered outside this service and always read as zero here.
pub async fn current_usage(
    store: &dyn Store,
    organization_id: Uuid,
    dimension: QuotaDimension,
) -> Result<i64, DatabaseError> {
    match dimension {
        QuotaDimension::Storage => store.storage_used(organization_id).await,
        QuotaDimension::Seats => {
            let members = store.count_members(organization_id).await?;
            let pending = store
                .list_pending_invites(organization_id, Utc::now())
                .await?
                .len() as i64;
            Ok(members + pending)
        }
        QuotaDimension::Projects => store.count_projects(organization_id).await,
        QuotaDimension::Integrations => store.count_integrations(organization_id).await,
        QuotaDimension::Bandwidth | QuotaDimension::ProcessingJobs => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(projects: Option<i64>) -> Plan {
        Plan {
            included_projects: projects,
            ..Plan::default_catalog().remove(0)
        }
    }

    #[test]
    fn unlimited_when_quota_is_null() {
        assert!(!exceeds_limit(1_000_000, None));
        let operators = OperatorAllowList::default();
        assert!(check_quota("a@b.c", &operators, &plan(None), QuotaDimension::Projects, 1_000_000).is_ok());
    }

    #[test]
    fn boundary_is_inclusive() {
        assert!(!exceeds_limit(10, Some(10)));
        assert!(exceeds_limit(11, Some(10)));

        let operators = OperatorAllowList::default();
        let plan = plan(Some(10));
        assert!(check_quota("a@b.c", &operators, &plan, QuotaDimension::Projects, 10).is_ok());

        let err = check_quota("a@b.c", &operators, &plan, QuotaDimension::Projects, 11).unwrap_err();
        assert_eq!(err.dimension, QuotaDimension::Projects);
        assert_eq!(err.usage, 11);
        assert_eq!(err.limit, 10);
        assert_eq!(err.plan_code, "free");
        assert!(err.to_string().contains("projects"));
    }

    #[test]
    fn operators_bypass_every_dimension() {
        let operators = OperatorAllowList::parse("ops@scenehub.app");
        let plan = plan(Some(0));
        for dimension in QuotaDimension::ALL {
            assert!(check_quota("OPS@scenehub.app", &operators, &plan, dimension, i64::MAX).is_ok());
        }
        assert!(check_quota("someone@else.com", &operators, &plan, QuotaDimension::Projects, 1).is_err());
    }

    #[test]
    fn dimension_wire_names() {
        assert_eq!(serde_json::to_value(QuotaDimension::ProcessingJobs).unwrap(), "processing_jobs");
        assert_eq!(QuotaDimension::Projects.to_string(), "projects");
    }
}
