// handlers/elevated/mod.rs - Elevated handlers (privileged operators)
//
// Security Level: Session + PRIVILEGED_OPERATORS allow list
// Middleware: session_middleware; the allow list is checked per handler so
// a non-operator gets a 403 rather than a missing route.

pub mod operator; // License changes
