//! Router Module Index
//!
//! Routes are split by access level so the auth layer is applied to a whole module at
//! once rather than handler by handler.

/// Open to everyone. Reads pick up the caller's identity when a valid token is sent.
pub mod public;

/// Behind `auth_middleware`; every handler receives a validated `AuthUser`.
pub mod authenticated;
