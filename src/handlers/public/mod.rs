// handlers/public/mod.rs - Public handlers (no session required)
//
// Security Level: None
// Routes: /auth/signup, /auth/login, /auth/logout, /api/plans
// Middleware: None

pub mod auth;  // Account creation and session acquisition
pub mod plans; // Plan catalog
