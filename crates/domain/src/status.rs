//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order as the fulfillment saga advances.
///
/// Status transitions:
/// ```text
/// Created ──► StockReserving ──┬──► StockReserved ──┬──► Paid ──► Completed
///                              │                    │
///                              ▼                    ▼
///                          Cancelled ◄── CompensatingStock ──► FailedManual
/// ```
///
/// Every transition is persisted with a compare-and-swap on the order's
/// version, so a restarted coordinator re-derives the next action from the
/// stored status. Terminal orders are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order persisted, saga not yet started on it.
    #[default]
    Created,

    /// Reserving stock for every line item.
    StockReserving,

    /// All line items held, awaiting payment.
    StockReserved,

    /// Payment failed; releasing held stock.
    CompensatingStock,

    /// Payment captured; stock committed, fan-out in progress.
    Paid,

    /// Order fulfilled (terminal).
    Completed,

    /// Order rejected or payment declined; all holds released (terminal).
    Cancelled,

    /// Compensation exhausted its retries; an operator owns this order
    /// now (terminal for the system).
    FailedManual,
}

impl OrderStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::FailedManual
        )
    }

    /// Returns true if the saga still has work to do on this order.
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the machine may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, StockReserving)
                | (StockReserving, StockReserved)
                | (StockReserving, Cancelled)
                | (StockReserving, FailedManual)
                | (StockReserved, Paid)
                | (StockReserved, CompensatingStock)
                | (CompensatingStock, Cancelled)
                | (CompensatingStock, FailedManual)
                | (Paid, Completed)
                | (Paid, FailedManual)
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::StockReserving => "StockReserving",
            OrderStatus::StockReserved => "StockReserved",
            OrderStatus::CompensatingStock => "CompensatingStock",
            OrderStatus::Paid => "Paid",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::FailedManual => "FailedManual",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_created() {
        assert_eq!(OrderStatus::default(), OrderStatus::Created);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Created.is_terminal());
        assert!(!OrderStatus::StockReserving.is_terminal());
        assert!(!OrderStatus::StockReserved.is_terminal());
        assert!(!OrderStatus::CompensatingStock.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::FailedManual.is_terminal());
    }

    #[test]
    fn happy_path_transitions() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::StockReserving));
        assert!(OrderStatus::StockReserving.can_transition_to(OrderStatus::StockReserved));
        assert!(OrderStatus::StockReserved.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn failure_transitions() {
        assert!(OrderStatus::StockReserving.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::StockReserved.can_transition_to(OrderStatus::CompensatingStock));
        assert!(OrderStatus::CompensatingStock.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::CompensatingStock.can_transition_to(OrderStatus::FailedManual));
    }

    #[test]
    fn terminal_statuses_admit_nothing() {
        for terminal in [
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::FailedManual,
        ] {
            for next in [
                OrderStatus::Created,
                OrderStatus::StockReserving,
                OrderStatus::Paid,
                OrderStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::StockReserving.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn display() {
        assert_eq!(OrderStatus::StockReserving.to_string(), "StockReserving");
        assert_eq!(OrderStatus::FailedManual.to_string(), "FailedManual");
    }

    #[test]
    fn serialization_roundtrip() {
        let status = OrderStatus::CompensatingStock;
        let json = serde_json::to_string(&status).unwrap();
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
    }
}
