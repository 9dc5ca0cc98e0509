//! WebSocket session handler.
//!
//! One task per connection. The session authenticates in-band, then maps
//! incoming command frames 1:1 onto engine and ledger calls; broadcast
//! events are forwarded only once the session is authenticated. Order
//! ownership is enforced here, not in the engine.

use crate::models::{ClientRequest, OrderView, ServerMessage};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use types::ids::{AccountId, OrderId};
use types::order::{OrderStatus, Side};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut events = state.events.subscribe();
    let mut session = Session::default();

    let welcome = ServerMessage::Welcome {
        message: "please authenticate",
    };
    if send(&mut sink, &welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = session.handle(&state, text.as_str());
                        if send(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(message) => {
                        if session.account.is_some() && send(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session fell behind event broadcast");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(_) => Ok(()),
    }
}

/// Per-connection session state: just who the peer is, once proven.
#[derive(Default)]
struct Session {
    account: Option<AccountId>,
}

impl Session {
    /// Dispatch one command frame and produce its response.
    fn handle(&mut self, state: &AppState, raw: &str) -> ServerMessage {
        let request: ClientRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(_) => {
                return ServerMessage::Error {
                    message: "invalid or malformed message".to_string(),
                    corr: None,
                }
            }
        };

        if let ClientRequest::Auth { token, corr } = request {
            return match state.auth.verify(&token) {
                Ok(account) => {
                    self.account = Some(account);
                    ServerMessage::AuthResponse {
                        success: true,
                        message: None,
                        corr,
                    }
                }
                Err(e) => ServerMessage::AuthResponse {
                    success: false,
                    message: Some(e.to_string()),
                    corr,
                },
            };
        }

        let Some(account) = self.account else {
            return ServerMessage::Error {
                message: "not authenticated".to_string(),
                corr: request.corr(),
            };
        };

        self.dispatch(state, account, request)
    }

    fn dispatch(
        &mut self,
        state: &AppState,
        account: AccountId,
        request: ClientRequest,
    ) -> ServerMessage {
        match request {
            ClientRequest::Auth { .. } => unreachable!("auth handled before dispatch"),
            ClientRequest::Submit {
                price,
                qty,
                side,
                corr,
            } => match state.engine.submit(price, qty, side) {
                Ok(id) => {
                    state.ledger.claim(id, account);
                    ServerMessage::SubmitResponse {
                        success: true,
                        id,
                        corr,
                    }
                }
                Err(_) => ServerMessage::SubmitResponse {
                    success: false,
                    id: OrderId::NONE,
                    corr,
                },
            },
            ClientRequest::Cancel { id, corr } => {
                if !state.ledger.owns(account, id) {
                    return ServerMessage::CancelResponse {
                        success: false,
                        message: Some("order not owned".to_string()),
                        corr,
                    };
                }
                match state.engine.cancel(id) {
                    Ok(()) => ServerMessage::CancelResponse {
                        success: true,
                        message: None,
                        corr,
                    },
                    Err(e) => ServerMessage::CancelResponse {
                        success: false,
                        message: Some(e.to_string()),
                        corr,
                    },
                }
            }
            ClientRequest::Modify {
                id,
                price,
                qty,
                corr,
            } => {
                if !state.ledger.owns(account, id) {
                    return ServerMessage::ModifyResponse {
                        success: false,
                        message: Some("order not owned".to_string()),
                        corr,
                    };
                }
                match state.engine.modify(id, price, qty) {
                    Ok(()) => ServerMessage::ModifyResponse {
                        success: true,
                        message: None,
                        corr,
                    },
                    Err(e) => ServerMessage::ModifyResponse {
                        success: false,
                        message: Some(e.to_string()),
                        corr,
                    },
                }
            }
            ClientRequest::OrderStatus { id, corr } => {
                if !state.ledger.owns(account, id) {
                    return ServerMessage::Error {
                        message: "order not owned".to_string(),
                        corr,
                    };
                }
                ServerMessage::OrderStatusResponse {
                    id,
                    status: state.engine.status(id),
                    corr,
                }
            }
            ClientRequest::BookSnapshot { corr } => {
                let (bids, asks) = state.engine.snapshot();
                ServerMessage::BookSnapshotResponse {
                    bids: bids.into_iter().map(OrderView::from).collect(),
                    asks: asks.into_iter().map(OrderView::from).collect(),
                    corr,
                }
            }
            ClientRequest::TradeHistory { corr } => ServerMessage::TradeHistoryResponse {
                trades: state.engine.trade_history(),
                corr,
            },
            ClientRequest::RealizedPnl { corr } => {
                if let Err(e) = check_pnl_rate(state, account) {
                    return ServerMessage::Error {
                        message: e,
                        corr,
                    };
                }
                ServerMessage::RealizedPnlResponse {
                    pnl: state.ledger.realized_pnl(account),
                    corr,
                }
            }
            ClientRequest::UnrealizedPnl { corr } => {
                if let Err(e) = check_pnl_rate(state, account) {
                    return ServerMessage::Error {
                        message: e,
                        corr,
                    };
                }
                ServerMessage::UnrealizedPnlResponse {
                    pnl: unrealized_pnl(state, account),
                    corr,
                }
            }
            ClientRequest::OpenOrders { corr } => {
                let count = state
                    .ledger
                    .owned_orders(account)
                    .into_iter()
                    .filter(|&id| state.engine.status(id) == OrderStatus::Open)
                    .count();
                ServerMessage::OpenOrdersResponse { count, corr }
            }
        }
    }
}

fn check_pnl_rate(state: &AppState, account: AccountId) -> Result<(), String> {
    state.pnl_limiter.check(account).map_err(|e| e.to_string())
}

/// Inventory PnL at the mark price plus the mark-to-best contribution of
/// the client's resting orders.
fn unrealized_pnl(state: &AppState, account: AccountId) -> Decimal {
    let mut pnl = match state.engine.mark_price() {
        Some(mark) => state.ledger.unrealized_pnl(account, mark.as_decimal()),
        None => Decimal::ZERO,
    };

    for id in state.ledger.owned_orders(account) {
        let Some(order) = state.engine.order(id) else {
            continue;
        };
        let best_opposite = match order.side {
            Side::Buy => state.engine.best_ask_price(),
            Side::Sell => state.engine.best_bid_price(),
        };
        if let Some(best) = best_opposite {
            pnl += (best.as_decimal() - order.price.as_decimal())
                * Decimal::from(order.quantity)
                * Decimal::from(order.side.sign());
        }
    }
    pnl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::config::Config;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::net::SocketAddr;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn test_state() -> AppState {
        AppState::new(Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: "test-secret".to_string(),
            book_broadcast_interval: Duration::from_millis(100),
            pnl_burst: 2,
            pnl_per_second: 0.0,
        })
    }

    fn token(account: AccountId) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize
            + 3600;
        let claims = Claims {
            sub: "trader".to_string(),
            exp,
            account_id: account,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    fn authed_session(state: &AppState) -> (Session, AccountId) {
        let account = AccountId::new();
        let mut session = Session::default();
        let auth = format!(
            r#"{{"type":"auth","token":"{}"}}"#,
            token(account)
        );
        match session.handle(state, &auth) {
            ServerMessage::AuthResponse { success: true, .. } => {}
            other => panic!("auth failed: {other:?}"),
        }
        (session, account)
    }

    #[test]
    fn test_commands_require_auth() {
        let state = test_state();
        let mut session = Session::default();

        let reply = session.handle(&state, r#"{"type":"book_snapshot","corr":5}"#);
        match reply {
            ServerMessage::Error { message, corr } => {
                assert_eq!(message, "not authenticated");
                assert_eq!(corr, Some(5));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_bad_token_rejected() {
        let state = test_state();
        let mut session = Session::default();

        let reply = session.handle(&state, r#"{"type":"auth","token":"bogus"}"#);
        match reply {
            ServerMessage::AuthResponse { success, .. } => assert!(!success),
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(session.account.is_none());
    }

    #[test]
    fn test_submit_then_cancel() {
        let state = test_state();
        let (mut session, _) = authed_session(&state);

        let reply = session.handle(
            &state,
            r#"{"type":"submit","price":100,"qty":5,"side":"BUY","corr":1}"#,
        );
        let id = match reply {
            ServerMessage::SubmitResponse {
                success: true,
                id,
                corr: Some(1),
            } => id,
            other => panic!("unexpected reply: {other:?}"),
        };

        let cancel = format!(r#"{{"type":"cancel","id":{id}}}"#);
        match session.handle(&state, &cancel) {
            ServerMessage::CancelResponse { success: true, .. } => {}
            other => panic!("unexpected reply: {other:?}"),
        }

        let status = format!(r#"{{"type":"order_status","id":{id}}}"#);
        match session.handle(&state, &status) {
            ServerMessage::OrderStatusResponse { status, .. } => {
                assert_eq!(status, OrderStatus::Canceled)
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_not_owned() {
        let state = test_state();
        let (mut owner, _) = authed_session(&state);
        let (mut intruder, _) = authed_session(&state);

        let reply = owner.handle(
            &state,
            r#"{"type":"submit","price":100,"qty":5,"side":"BUY"}"#,
        );
        let id = match reply {
            ServerMessage::SubmitResponse { id, .. } => id,
            other => panic!("unexpected reply: {other:?}"),
        };

        let cancel = format!(r#"{{"type":"cancel","id":{id}}}"#);
        match intruder.handle(&state, &cancel) {
            ServerMessage::CancelResponse {
                success: false,
                message: Some(message),
                ..
            } => assert_eq!(message, "order not owned"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_submit_returns_id_zero() {
        let state = test_state();
        let (mut session, _) = authed_session(&state);

        let reply = session.handle(
            &state,
            r#"{"type":"submit","price":0,"qty":5,"side":"BUY"}"#,
        );
        match reply {
            ServerMessage::SubmitResponse { success, id, .. } => {
                assert!(!success);
                assert_eq!(id, OrderId::NONE);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_pnl_queries_rate_limited() {
        let state = test_state();
        let (mut session, _) = authed_session(&state);

        for _ in 0..2 {
            match session.handle(&state, r#"{"type":"realized_pnl"}"#) {
                ServerMessage::RealizedPnlResponse { .. } => {}
                other => panic!("unexpected reply: {other:?}"),
            }
        }
        match session.handle(&state, r#"{"type":"realized_pnl"}"#) {
            ServerMessage::Error { message, .. } => {
                assert!(message.contains("rate limit"))
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_open_orders_counts_only_open() {
        let state = test_state();
        let (mut session, _) = authed_session(&state);

        session.handle(
            &state,
            r#"{"type":"submit","price":100,"qty":5,"side":"BUY"}"#,
        );
        let reply = session.handle(
            &state,
            r#"{"type":"submit","price":101,"qty":5,"side":"BUY"}"#,
        );
        let id = match reply {
            ServerMessage::SubmitResponse { id, .. } => id,
            other => panic!("unexpected reply: {other:?}"),
        };
        let cancel = format!(r#"{{"type":"cancel","id":{id}}}"#);
        session.handle(&state, &cancel);

        match session.handle(&state, r#"{"type":"open_orders"}"#) {
            ServerMessage::OpenOrdersResponse { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_unrealized_pnl_marks_open_orders_to_best() {
        let state = test_state();
        let (mut maker, _) = authed_session(&state);

        // Resting buy at 95 against a best ask of 100:
        // open-order contribution = (100 - 95) * 2
        maker.handle(
            &state,
            r#"{"type":"submit","price":95,"qty":2,"side":"BUY"}"#,
        );
        maker.handle(
            &state,
            r#"{"type":"submit","price":100,"qty":1,"side":"SELL"}"#,
        );

        match maker.handle(&state, r#"{"type":"unrealized_pnl"}"#) {
            ServerMessage::UnrealizedPnlResponse { pnl, .. } => {
                // buy leg: (100 - 95) * 2 = 10; sell leg: (95 - 100) * 1 * -1 = 5
                assert_eq!(pnl, Decimal::from(15));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
