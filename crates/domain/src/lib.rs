pub mod error;
pub mod money;
pub mod order;
pub mod repository;
pub mod status;

pub use error::{DomainError, OrderError};
pub use money::Money;
pub use order::{LineItem, Order, PaymentMethod, ShippingAddress};
pub use repository::OrderRepository;
pub use status::OrderStatus;
