//! Wire protocol for the WebSocket session.
//!
//! JSON frames of shape `{"type": ..., ...fields, "corr"?: n}`; the
//! optional correlation id is echoed verbatim on the matching response.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::numeric::Price;
use types::order::{Order, OrderStatus, Side};
use types::trade::Trade;

/// Client-to-server commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Auth {
        token: String,
        #[serde(default)]
        corr: Option<u64>,
    },
    Submit {
        price: Decimal,
        qty: u32,
        side: Side,
        #[serde(default)]
        corr: Option<u64>,
    },
    Cancel {
        id: OrderId,
        #[serde(default)]
        corr: Option<u64>,
    },
    Modify {
        id: OrderId,
        price: Decimal,
        qty: u32,
        #[serde(default)]
        corr: Option<u64>,
    },
    OrderStatus {
        id: OrderId,
        #[serde(default)]
        corr: Option<u64>,
    },
    BookSnapshot {
        #[serde(default)]
        corr: Option<u64>,
    },
    TradeHistory {
        #[serde(default)]
        corr: Option<u64>,
    },
    RealizedPnl {
        #[serde(default)]
        corr: Option<u64>,
    },
    UnrealizedPnl {
        #[serde(default)]
        corr: Option<u64>,
    },
    OpenOrders {
        #[serde(default)]
        corr: Option<u64>,
    },
}

impl ClientRequest {
    pub fn corr(&self) -> Option<u64> {
        match self {
            ClientRequest::Auth { corr, .. }
            | ClientRequest::Submit { corr, .. }
            | ClientRequest::Cancel { corr, .. }
            | ClientRequest::Modify { corr, .. }
            | ClientRequest::OrderStatus { corr, .. }
            | ClientRequest::BookSnapshot { corr }
            | ClientRequest::TradeHistory { corr }
            | ClientRequest::RealizedPnl { corr }
            | ClientRequest::UnrealizedPnl { corr }
            | ClientRequest::OpenOrders { corr } => *corr,
        }
    }
}

/// Server-to-client frames: command responses and broadcast pushes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        message: &'static str,
    },
    AuthResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    SubmitResponse {
        success: bool,
        id: OrderId,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    CancelResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    ModifyResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    OrderStatusResponse {
        id: OrderId,
        status: OrderStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    BookSnapshotResponse {
        bids: Vec<OrderView>,
        asks: Vec<OrderView>,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    TradeHistoryResponse {
        trades: Vec<Trade>,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    RealizedPnlResponse {
        pnl: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    UnrealizedPnlResponse {
        pnl: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    OpenOrdersResponse {
        count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    /// Broadcast: one executed trade.
    TradeEvent {
        trade: Trade,
    },
    /// Broadcast: coalesced book state.
    BookUpdate {
        bids: Vec<OrderView>,
        asks: Vec<OrderView>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
}

/// Public projection of a resting order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub price: Price,
    pub quantity: u32,
    pub side: Side,
    pub status: OrderStatus,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            price: order.price,
            quantity: order.quantity,
            side: order.side,
            status: order.status,
        }
    }
}
