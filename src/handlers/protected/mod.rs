// handlers/protected/mod.rs - Protected handlers (session required)
//
// Security Level: Session (bearer token or cookie)
// Route Prefix: /api/*
// Middleware: session_middleware inserts the AuthUser extension
//
// Resources outside the caller's organizations answer 404, not 403.

pub mod activity;      // Organization activity feed
pub mod assets;        // Uploaded and synced assets, transforms
pub mod auth;          // whoami
pub mod integrations;  // Cesium ion credentials and sync
pub mod invites;       // Invite create / list / revoke / accept
pub mod members;       // Role changes and removal
pub mod organizations; // Organization CRUD and usage
pub mod projects;      // Projects, scene saves, publishing
