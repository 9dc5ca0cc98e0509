//! Per-client position and PnL accounting, driven by trade events.
//!
//! Each fill moves the owner's net position: same-direction fills extend
//! the position at weighted-average cost, opposite-direction fills
//! realize PnL against the average cost, and a fill that both closes and
//! reverses processes the close first, then opens the remainder at the
//! fill price.
//!
//! A submit that crosses immediately emits its trades before the session
//! layer has had a chance to claim the fresh order id, so fills for
//! unknown ids are buffered and replayed when the claim arrives.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use types::ids::{AccountId, OrderId};
use types::order::Side;
use types::trade::Trade;

/// One client's accumulated trading state.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    /// Signed net position: positive long, negative short.
    pub position: i64,
    /// Weighted-average entry cost; zero whenever the position is flat.
    pub avg_cost: Decimal,
    /// Cumulative PnL from closed position.
    pub realized_pnl: Decimal,
    /// Order ids this client has submitted.
    pub owned_orders: HashSet<OrderId>,
}

#[derive(Debug, Clone, Copy)]
struct Fill {
    price: Decimal,
    quantity: u32,
    side: Side,
}

#[derive(Default)]
struct LedgerInner {
    accounts: HashMap<AccountId, AccountState>,
    owners: HashMap<OrderId, AccountId>,
    unclaimed: HashMap<OrderId, Vec<Fill>>,
}

/// Thread-safe ledger of client accounts.
#[derive(Default)]
pub struct AccountLedger {
    inner: RwLock<LedgerInner>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `account` owns `order_id`, replaying any fills that
    /// arrived before the claim.
    pub fn claim(&self, order_id: OrderId, account: AccountId) {
        let mut inner = self.inner.write();
        inner.owners.insert(order_id, account);
        let buffered = inner.unclaimed.remove(&order_id).unwrap_or_default();
        let state = inner.accounts.entry(account).or_default();
        state.owned_orders.insert(order_id);
        for fill in buffered {
            apply_fill(state, fill);
        }
    }

    pub fn owns(&self, account: AccountId, order_id: OrderId) -> bool {
        self.inner.read().owners.get(&order_id) == Some(&account)
    }

    /// Apply one trade: a buy-side fill for the buy order's owner and a
    /// sell-side fill for the sell order's owner.
    pub fn on_trade(&self, trade: &Trade) {
        let mut inner = self.inner.write();
        let buy_fill = Fill {
            price: trade.price.as_decimal(),
            quantity: trade.quantity,
            side: Side::Buy,
        };
        let sell_fill = Fill {
            side: Side::Sell,
            ..buy_fill
        };
        inner.record(trade.buy_order_id, buy_fill);
        inner.record(trade.sell_order_id, sell_fill);
    }

    pub fn position(&self, account: AccountId) -> i64 {
        self.inner
            .read()
            .accounts
            .get(&account)
            .map(|s| s.position)
            .unwrap_or(0)
    }

    pub fn avg_cost(&self, account: AccountId) -> Decimal {
        self.inner
            .read()
            .accounts
            .get(&account)
            .map(|s| s.avg_cost)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn realized_pnl(&self, account: AccountId) -> Decimal {
        self.inner
            .read()
            .accounts
            .get(&account)
            .map(|s| s.realized_pnl)
            .unwrap_or(Decimal::ZERO)
    }

    /// Inventory PnL at the given mark: `(mark - avg_cost) * position`.
    /// The signed position makes the formula hold for both directions.
    pub fn unrealized_pnl(&self, account: AccountId, mark: Decimal) -> Decimal {
        let inner = self.inner.read();
        match inner.accounts.get(&account) {
            Some(state) => (mark - state.avg_cost) * Decimal::from(state.position),
            None => Decimal::ZERO,
        }
    }

    pub fn owned_orders(&self, account: AccountId) -> Vec<OrderId> {
        self.inner
            .read()
            .accounts
            .get(&account)
            .map(|s| s.owned_orders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every account's state.
    pub fn accounts(&self) -> Vec<(AccountId, AccountState)> {
        self.inner
            .read()
            .accounts
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }
}

impl LedgerInner {
    fn record(&mut self, order_id: OrderId, fill: Fill) {
        match self.owners.get(&order_id) {
            Some(&account) => {
                let state = self.accounts.entry(account).or_default();
                apply_fill(state, fill);
            }
            None => {
                self.unclaimed.entry(order_id).or_default().push(fill);
            }
        }
    }
}

fn apply_fill(state: &mut AccountState, fill: Fill) {
    let qty = i64::from(fill.quantity);
    let price = fill.price;
    let sign = fill.side.sign();

    if state.position == 0 || state.position.signum() == sign {
        // Extend: weighted-average cost over the combined size.
        let held = state.position.abs();
        let total = held + qty;
        state.avg_cost =
            (state.avg_cost * Decimal::from(held) + price * Decimal::from(qty)) / Decimal::from(total);
        state.position += sign * qty;
        return;
    }

    // Oppose: close up to the held size, then any remainder reverses.
    let closing = qty.min(state.position.abs());
    let per_unit = match fill.side {
        Side::Sell => price - state.avg_cost,
        Side::Buy => state.avg_cost - price,
    };
    state.realized_pnl += per_unit * Decimal::from(closing);
    state.position += sign * closing;
    if state.position == 0 {
        state.avg_cost = Decimal::ZERO;
    }

    let remainder = qty - closing;
    if remainder > 0 {
        state.position = sign * remainder;
        state.avg_cost = price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::Price;

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn trade(buy: u64, sell: u64, price: u64, qty: u32) -> Trade {
        Trade::new(
            OrderId::new(buy),
            OrderId::new(sell),
            Price::from_u64(price),
            qty,
            0,
        )
    }

    #[test]
    fn test_open_long_sets_cost() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(1), account);

        ledger.on_trade(&trade(1, 2, 100, 3));

        assert_eq!(ledger.position(account), 3);
        assert_eq!(ledger.avg_cost(account), dec(100));
        assert_eq!(ledger.realized_pnl(account), dec(0));
    }

    #[test]
    fn test_open_short_sets_cost() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(2), account);

        ledger.on_trade(&trade(1, 2, 100, 4));

        assert_eq!(ledger.position(account), -4);
        assert_eq!(ledger.avg_cost(account), dec(100));
    }

    #[test]
    fn test_extend_long_averages_cost() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(1), account);
        ledger.claim(OrderId::new(3), account);

        ledger.on_trade(&trade(1, 2, 100, 2));
        ledger.on_trade(&trade(3, 4, 130, 1));

        assert_eq!(ledger.position(account), 3);
        assert_eq!(ledger.avg_cost(account), dec(110));
    }

    #[test]
    fn test_reduce_long_realizes() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(1), account);
        ledger.claim(OrderId::new(3), account);

        ledger.on_trade(&trade(1, 2, 100, 5));
        // sell 2 at 110: realized = (110 - 100) * 2
        ledger.on_trade(&trade(4, 3, 110, 2));

        assert_eq!(ledger.position(account), 3);
        assert_eq!(ledger.avg_cost(account), dec(100));
        assert_eq!(ledger.realized_pnl(account), dec(20));
    }

    #[test]
    fn test_close_to_flat_resets_cost() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(1), account);
        ledger.claim(OrderId::new(3), account);

        ledger.on_trade(&trade(1, 2, 100, 5));
        ledger.on_trade(&trade(4, 3, 90, 5));

        assert_eq!(ledger.position(account), 0);
        assert_eq!(ledger.avg_cost(account), dec(0));
        assert_eq!(ledger.realized_pnl(account), dec(-50));
    }

    #[test]
    fn test_flip_long_to_short() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(1), account);
        ledger.claim(OrderId::new(3), account);

        ledger.on_trade(&trade(1, 2, 100, 3));
        // sell 5 at 100: close 3 (pnl 0), reverse into short 2 at 100
        ledger.on_trade(&trade(4, 3, 100, 5));

        assert_eq!(ledger.position(account), -2);
        assert_eq!(ledger.avg_cost(account), dec(100));
        assert_eq!(ledger.realized_pnl(account), dec(0));
    }

    #[test]
    fn test_short_covering() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();
        ledger.claim(OrderId::new(2), account);
        ledger.claim(OrderId::new(3), account);

        ledger.on_trade(&trade(1, 2, 100, 4));
        // buy 4 back at 80: realized = (100 - 80) * 4
        ledger.on_trade(&trade(3, 4, 80, 4));

        assert_eq!(ledger.position(account), 0);
        assert_eq!(ledger.realized_pnl(account), dec(80));
        assert_eq!(ledger.avg_cost(account), dec(0));
    }

    #[test]
    fn test_unrealized_by_direction() {
        let ledger = AccountLedger::new();
        let long = AccountId::new();
        let short = AccountId::new();
        ledger.claim(OrderId::new(1), long);
        ledger.claim(OrderId::new(2), short);

        ledger.on_trade(&trade(1, 2, 100, 3));

        assert_eq!(ledger.unrealized_pnl(long, dec(110)), dec(30));
        assert_eq!(ledger.unrealized_pnl(short, dec(110)), dec(-30));
        assert_eq!(ledger.unrealized_pnl(long, dec(90)), dec(-30));
    }

    #[test]
    fn test_unclaimed_fill_replayed_on_claim() {
        let ledger = AccountLedger::new();
        let account = AccountId::new();

        // Fill arrives before the session claims the order id.
        ledger.on_trade(&trade(1, 2, 100, 3));
        assert_eq!(ledger.position(account), 0);

        ledger.claim(OrderId::new(1), account);
        assert_eq!(ledger.position(account), 3);
        assert_eq!(ledger.avg_cost(account), dec(100));
    }

    #[test]
    fn test_zero_sum_between_counterparties() {
        let ledger = AccountLedger::new();
        let a = AccountId::new();
        let b = AccountId::new();
        for id in [1u64, 3] {
            ledger.claim(OrderId::new(id), a);
        }
        for id in [2u64, 4] {
            ledger.claim(OrderId::new(id), b);
        }

        // a buys 5 at 100 from b, then sells 5 at 120 back to b
        ledger.on_trade(&trade(1, 2, 100, 5));
        ledger.on_trade(&trade(4, 3, 120, 5));

        assert_eq!(ledger.position(a), 0);
        assert_eq!(ledger.position(b), 0);
        assert_eq!(ledger.realized_pnl(a), dec(100));
        assert_eq!(ledger.realized_pnl(b), dec(-100));
        assert_eq!(
            ledger.realized_pnl(a) + ledger.realized_pnl(b),
            Decimal::ZERO
        );
    }
}
