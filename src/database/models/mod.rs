pub mod activity;
pub mod asset;
pub mod integration;
pub mod organization;
pub mod plan;
pub mod project;
pub mod user;

pub use activity::{Activity, ActivityPage, ActivityQuery, NewActivity};
pub use asset::{Asset, IonAssetUpsert, NewAsset, SyncReport};
pub use integration::{CesiumIonIntegration, NewIntegration};
pub use organization::{
    MemberWithUser, NewInvite, NewOrganization, Organization, OrganizationInvite,
    OrganizationMember, OrganizationWithRole,
};
pub use plan::Plan;
pub use project::{NewProject, Project, ProjectChanges};
pub use user::{NewUser, User};
