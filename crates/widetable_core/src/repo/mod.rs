//! Repository layer over the wide table.
//!
//! # Responsibility
//! - Own the versioning and soft-delete protocols (`versioned_store`).
//! - Order list results for presentation (`sorter`).
//!
//! # Invariants
//! - Every write is one atomic two-item transaction.
//! - Not-found and conflict are named outcomes, distinct from transport
//!   errors.

pub mod sorter;
pub mod versioned_store;
