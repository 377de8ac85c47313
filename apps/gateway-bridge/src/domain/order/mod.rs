//! Order Tickets
//!
//! What the host asks the gateway to do. Codes are the FIX values the gateway
//! expects on the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (FIX tag 54).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell long.
    Sell,
    /// Sell short.
    SellShort,
}

impl OrderSide {
    /// FIX code.
    #[must_use]
    pub const fn fix_code(self) -> &'static str {
        match self {
            Self::Buy => "1",
            Self::Sell => "2",
            Self::SellShort => "5",
        }
    }
}

/// Order type (FIX tag 40).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Market.
    Market,
    /// Limit.
    Limit,
    /// Stop.
    Stop,
    /// Stop limit.
    StopLimit,
}

impl OrderKind {
    /// FIX code.
    #[must_use]
    pub const fn fix_code(self) -> &'static str {
        match self {
            Self::Market => "1",
            Self::Limit => "2",
            Self::Stop => "3",
            Self::StopLimit => "4",
        }
    }
}

/// Time in force (FIX tag 59).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Day.
    #[default]
    Day,
    /// Good till cancelled.
    Gtc,
    /// At the opening.
    Opg,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

impl TimeInForce {
    /// FIX code.
    #[must_use]
    pub const fn fix_code(self) -> &'static str {
        match self {
            Self::Day => "0",
            Self::Gtc => "1",
            Self::Opg => "2",
            Self::Ioc => "3",
            Self::Fok => "4",
        }
    }
}

/// A new order for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Gateway symbol.
    pub symbol: String,
    /// Side.
    pub side: OrderSide,
    /// Order type.
    pub kind: OrderKind,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Stop price.
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Destination override (tag 100).
    pub ex_destination: Option<String>,
    /// Execution instructions (tag 18).
    pub exec_inst: Option<String>,
    /// Handling instructions (tag 21).
    pub handl_inst: Option<String>,
    /// Gateway routing policy (tag 7552).
    pub routing_policy: Option<String>,
    /// Short locate, required for `SellShort` at some destinations.
    pub locate: Option<Locate>,
}

impl OrderTicket {
    /// Market order.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            ex_destination: None,
            exec_inst: None,
            handl_inst: None,
            routing_policy: None,
            locate: None,
        }
    }

    /// Limit order.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Stop order.
    #[must_use]
    pub fn stop(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Stop,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Route to a specific destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.ex_destination = Some(destination.into());
        self
    }

    /// Set the gateway routing policy.
    #[must_use]
    pub fn with_routing_policy(mut self, policy: impl Into<String>) -> Self {
        self.routing_policy = Some(policy.into());
        self
    }

    /// Attach a short locate.
    #[must_use]
    pub fn with_locate(mut self, locate: Locate) -> Self {
        self.locate = Some(locate);
        self
    }
}

/// Short-sale locate instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locate {
    /// Locate broker (tag 5700).
    pub broker_id: String,
    /// Whether the gateway must obtain the locate (tag 114).
    pub required: bool,
}

/// Cancel an open order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTicket {
    /// Client order id the order was last accepted under.
    pub orig_client_order_id: String,
}

/// Amend an open order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceTicket {
    /// Client order id the order was last accepted under.
    pub orig_client_order_id: String,
    /// New quantity.
    pub quantity: Decimal,
    /// New limit price.
    pub limit_price: Option<Decimal>,
    /// New stop price.
    pub stop_price: Option<Decimal>,
    /// Peg offset (tag 211).
    pub peg_difference: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_codes() {
        assert_eq!(OrderSide::Buy.fix_code(), "1");
        assert_eq!(OrderSide::SellShort.fix_code(), "5");
        assert_eq!(OrderKind::StopLimit.fix_code(), "4");
        assert_eq!(TimeInForce::default().fix_code(), "0");
        assert_eq!(TimeInForce::Ioc.fix_code(), "3");
    }

    #[test]
    fn limit_builder_sets_price() {
        let ticket = OrderTicket::limit("AAPL", OrderSide::Buy, Decimal::from(100), Decimal::new(18525, 2))
            .with_time_in_force(TimeInForce::Gtc)
            .with_destination("ARCA");

        assert_eq!(ticket.kind, OrderKind::Limit);
        assert_eq!(ticket.limit_price, Some(Decimal::new(18525, 2)));
        assert_eq!(ticket.stop_price, None);
        assert_eq!(ticket.time_in_force, TimeInForce::Gtc);
        assert_eq!(ticket.ex_destination.as_deref(), Some("ARCA"));
    }

    #[test]
    fn stop_builder_sets_stop_price() {
        let ticket = OrderTicket::stop("MSFT", OrderSide::Sell, Decimal::from(5), Decimal::from(400));
        assert_eq!(ticket.kind, OrderKind::Stop);
        assert_eq!(ticket.stop_price, Some(Decimal::from(400)));
        assert_eq!(ticket.limit_price, None);
    }
}
