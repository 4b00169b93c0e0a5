pub mod types;

pub use types::{EventId, OrderId, ProductId, TenantId, UserId};
