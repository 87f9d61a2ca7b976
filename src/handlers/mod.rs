// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no session) → Protected (session) → Elevated (session + operator)
//
// Organization-scoped handlers in every tier run the membership and role
// checks inside the service call, after the session middleware has loaded
// the user and before any data is read.

pub mod elevated;  // Tier 3: privileged operators only
pub mod protected; // Tier 2: session required (/api/*)
pub mod public;    // Tier 1: no session (/auth/*, /api/plans)
