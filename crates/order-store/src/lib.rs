//! Persistence of orders and their saga step records.
//!
//! The saga coordinator treats this crate as its "Order Store" collaborator:
//! every call is durable once it returns.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod status;
pub mod store;

pub use common::{OrderId, StepId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use model::{NewOrder, Order, StepRecord, StepUpdate};
pub use postgres::PostgresOrderStore;
pub use status::{FailureKind, OrderStatus, StepStatus};
pub use store::OrderStore;
