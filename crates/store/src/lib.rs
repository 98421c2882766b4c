//! Persistence layer for the record store.
//!
//! Business rules live in `domain`; this crate defines the ports the
//! order workflow talks to ([`traits`]) and two implementations:
//! [`MemoryStore`] for tests and the default server, and
//! [`PostgresStore`] backed by sqlx with row-level locking around the
//! contended inventory rows.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::{
    CartStore, CouponStore, DeductOutcome, InventoryStore, OrderStore, PaymentStore,
    ProductCatalog, RedeemOutcome, ReserveOutcome, Stores,
};
