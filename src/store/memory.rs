//! In-memory game store
//!
//! All state sits behind a single async mutex, so every trait method runs as
//! one critical section. That is what makes bet insertion, settlement and
//! refunds atomic against each other and against balance reads.

use crate::errors::{StateConflict, WalletError, WingoResult};
use crate::games::period::PeriodCode;
use crate::games::round::RoundCommand;
use crate::games::types::{
    Bet, BetId, BetResult, LedgerEntry, Round, RoundId, RoundStatus, TransactionKind, UserId,
};
use crate::store::{BetSettlement, GameStore, NewBet, NewLedgerEntry, PruneReport, SettleOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct State {
    rounds: HashMap<RoundId, Round>,
    periods: HashMap<PeriodCode, RoundId>,
    /// The one non-terminal round
    current: Option<RoundId>,
    last_period: Option<PeriodCode>,
    bets: HashMap<BetId, Bet>,
    /// Bet ids per round in placement order
    round_bets: HashMap<RoundId, Vec<BetId>>,
    /// (user, round) uniqueness index
    placed: HashSet<(UserId, RoundId)>,
    wallets: HashMap<UserId, Decimal>,
    ledger: Vec<LedgerEntry>,
}

impl State {
    fn round_mut(&mut self, round_id: RoundId) -> Result<&mut Round, StateConflict> {
        self.rounds
            .get_mut(&round_id)
            .ok_or(StateConflict::RoundNotFound(round_id))
    }

    fn bets_of(&self, round_id: RoundId) -> impl Iterator<Item = &Bet> {
        self.round_bets
            .get(&round_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.bets.get(id))
    }

    fn credit(&mut self, user_id: &str, amount: Decimal) -> Decimal {
        let balance = self.wallets.entry(user_id.to_string()).or_insert(Decimal::ZERO);
        *balance += amount;
        *balance
    }

    fn debit(&mut self, user_id: &str, amount: Decimal) -> Result<Decimal, WalletError> {
        let balance = self
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| WalletError::UnknownWallet(user_id.to_string()))?;
        if *balance < amount {
            return Err(WalletError::InsufficientBalance {
                user_id: user_id.to_string(),
                balance: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    fn record(&mut self, entry: NewLedgerEntry) -> LedgerEntry {
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            kind: entry.kind,
            amount: entry.amount,
            reference_id: entry.reference_id,
            description: entry.description,
            created_at: entry.created_at,
        };
        self.ledger.push(entry.clone());
        entry
    }
}

fn positive(amount: Decimal) -> Result<Decimal, WalletError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(WalletError::NonPositiveAmount(amount))
    }
}

/// Process-local store used by the binary and the test suite
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn open_round(&self, now: DateTime<Utc>) -> WingoResult<(Round, bool)> {
        let mut state = self.state.lock().await;

        if let Some(round) = state.current.and_then(|id| state.rounds.get(&id)) {
            if !round.status.is_terminal() {
                return Ok((round.clone(), false));
            }
        }

        let period = PeriodCode::next_after(state.last_period.as_ref(), now.date_naive());
        if let Some(existing) = state.periods.get(&period).and_then(|id| state.rounds.get(id)) {
            return Ok((existing.clone(), false));
        }

        let round = Round::open(period, now);
        state.periods.insert(period, round.id);
        state.rounds.insert(round.id, round.clone());
        state.current = Some(round.id);
        state.last_period = Some(period);

        debug!(round_id = %round.id, period = %period, "Round inserted");
        Ok((round, true))
    }

    async fn current_round(&self) -> WingoResult<Option<Round>> {
        let state = self.state.lock().await;
        Ok(state.current.and_then(|id| state.rounds.get(&id)).cloned())
    }

    async fn get_round(&self, round_id: RoundId) -> WingoResult<Option<Round>> {
        Ok(self.state.lock().await.rounds.get(&round_id).cloned())
    }

    async fn transition_round(
        &self,
        round_id: RoundId,
        command: RoundCommand,
    ) -> WingoResult<(RoundStatus, Round)> {
        let mut state = self.state.lock().await;
        let round = state.round_mut(round_id)?;
        let previous = round.apply(command)?;
        let round = round.clone();

        if round.status.is_terminal() && state.current == Some(round_id) {
            state.current = None;
        }
        Ok((previous, round))
    }

    async fn rounds_due(&self, now: DateTime<Utc>, window: Duration) -> WingoResult<Vec<Round>> {
        let state = self.state.lock().await;
        let mut due: Vec<Round> = state
            .rounds
            .values()
            .filter(|r| r.is_expired(now, window) || r.status == RoundStatus::Closed)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.period);
        Ok(due)
    }

    async fn rounds_with_pending_bets(&self) -> WingoResult<Vec<Round>> {
        let state = self.state.lock().await;
        let mut rounds: Vec<Round> = state
            .rounds
            .values()
            .filter(|r| r.status.is_terminal())
            .filter(|r| state.bets_of(r.id).any(|b| b.result == BetResult::Pending))
            .cloned()
            .collect();
        rounds.sort_by_key(|r| r.period);
        Ok(rounds)
    }

    async fn recent_rounds(&self, limit: usize) -> WingoResult<Vec<Round>> {
        let state = self.state.lock().await;
        let mut rounds: Vec<Round> = state.rounds.values().cloned().collect();
        rounds.sort_by(|a, b| b.period.cmp(&a.period));
        rounds.truncate(limit);
        Ok(rounds)
    }

    async fn prune_declared_rounds(&self, keep: usize) -> WingoResult<PruneReport> {
        let mut state = self.state.lock().await;
        let mut declared: Vec<(DateTime<Utc>, PeriodCode, RoundId)> = state
            .rounds
            .values()
            .filter_map(|r| r.declared_at.map(|at| (at, r.period, r.id)))
            .collect();

        if declared.len() <= keep {
            return Ok(PruneReport::default());
        }
        declared.sort();
        let excess = declared.len() - keep;

        // A round whose settlement is unfinished stays until a tick resumes it
        let unsettled: Vec<RoundId> = declared
            .iter()
            .take(excess)
            .filter(|(_, _, id)| state.bets_of(*id).any(|b| b.result == BetResult::Pending))
            .map(|(_, _, id)| *id)
            .collect();

        let mut report = PruneReport::default();
        for (_, period, round_id) in declared.into_iter().take(excess) {
            if unsettled.contains(&round_id) {
                debug!(round_id = %round_id, "Keeping declared round with pending bets");
                continue;
            }
            state.rounds.remove(&round_id);
            state.periods.remove(&period);
            let bet_ids = state.round_bets.remove(&round_id).unwrap_or_default();
            for bet_id in bet_ids {
                if let Some(bet) = state.bets.remove(&bet_id) {
                    state.placed.remove(&(bet.user_id, round_id));
                    report.bets_removed += 1;
                }
            }
            report.rounds_removed += 1;
        }

        info!(
            rounds = report.rounds_removed,
            bets = report.bets_removed,
            "Pruned declared rounds"
        );
        Ok(report)
    }

    async fn insert_bet_atomically(&self, new_bet: NewBet) -> WingoResult<Bet> {
        let mut state = self.state.lock().await;

        let round = state.round_mut(new_bet.round_id)?;
        if !round.accepts_bets() {
            return Err(StateConflict::RoundNotOpen {
                round_id: round.id,
                status: round.status,
            }
            .into());
        }

        let key = (new_bet.user_id.clone(), new_bet.round_id);
        if state.placed.contains(&key) {
            return Err(StateConflict::DuplicateBet {
                user_id: new_bet.user_id,
                round_id: new_bet.round_id,
            }
            .into());
        }

        state.debit(&new_bet.user_id, new_bet.amount)?;

        let bet = Bet {
            id: Uuid::new_v4(),
            user_id: new_bet.user_id,
            round_id: new_bet.round_id,
            selection: new_bet.selection,
            amount: new_bet.amount,
            potential_win: new_bet.potential_win,
            result: BetResult::Pending,
            win_amount: None,
            placed_at: new_bet.placed_at,
            settled_at: None,
        };

        state.placed.insert(key);
        state.round_bets.entry(bet.round_id).or_default().push(bet.id);
        state.bets.insert(bet.id, bet.clone());
        state.record(NewLedgerEntry {
            user_id: bet.user_id.clone(),
            kind: TransactionKind::BetPlaced,
            amount: -bet.amount,
            reference_id: Some(bet.id),
            description: format!("Bet on {} {}", bet.bet_type(), bet.selection),
            created_at: bet.placed_at,
        });

        Ok(bet)
    }

    async fn bets_for_round(&self, round_id: RoundId) -> WingoResult<Vec<Bet>> {
        let state = self.state.lock().await;
        Ok(state.bets_of(round_id).cloned().collect())
    }

    async fn open_bets_for_round(&self, round_id: RoundId) -> WingoResult<Vec<Bet>> {
        let state = self.state.lock().await;
        Ok(state
            .bets_of(round_id)
            .filter(|b| b.result == BetResult::Pending)
            .cloned()
            .collect())
    }

    async fn bets_for_user(&self, user_id: &str) -> WingoResult<Vec<Bet>> {
        let state = self.state.lock().await;
        let mut bets: Vec<Bet> = state
            .bets
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.placed_at);
        Ok(bets)
    }

    async fn settle_bet(&self, settlement: BetSettlement) -> WingoResult<SettleOutcome> {
        let mut state = self.state.lock().await;
        let bet = state
            .bets
            .get_mut(&settlement.bet_id)
            .ok_or(StateConflict::BetNotFound(settlement.bet_id))?;

        if bet.result.is_final() {
            return Ok(SettleOutcome::AlreadyFinal(bet.clone()));
        }

        bet.result = settlement.result;
        bet.win_amount = Some(settlement.win_amount);
        bet.settled_at = Some(settlement.settled_at);
        let bet = bet.clone();

        if bet.result == BetResult::Won && settlement.win_amount > Decimal::ZERO {
            state.credit(&bet.user_id, settlement.win_amount);
            state.record(NewLedgerEntry {
                user_id: bet.user_id.clone(),
                kind: TransactionKind::BetWon,
                amount: settlement.win_amount,
                reference_id: Some(bet.id),
                description: format!("Won on {} {}", bet.bet_type(), bet.selection),
                created_at: settlement.settled_at,
            });
        }

        Ok(SettleOutcome::Applied(bet))
    }

    async fn refund_bet(&self, bet_id: BetId, at: DateTime<Utc>) -> WingoResult<SettleOutcome> {
        let mut state = self.state.lock().await;
        let bet = state
            .bets
            .get_mut(&bet_id)
            .ok_or(StateConflict::BetNotFound(bet_id))?;

        if bet.result.is_final() {
            return Ok(SettleOutcome::AlreadyFinal(bet.clone()));
        }

        bet.result = BetResult::Cancelled;
        bet.win_amount = Some(Decimal::ZERO);
        bet.settled_at = Some(at);
        let bet = bet.clone();

        state.credit(&bet.user_id, bet.amount);
        state.record(NewLedgerEntry {
            user_id: bet.user_id.clone(),
            kind: TransactionKind::BetRefund,
            amount: bet.amount,
            reference_id: Some(bet.id),
            description: "Round cancelled, stake refunded".to_string(),
            created_at: at,
        });

        Ok(SettleOutcome::Applied(bet))
    }

    async fn balance(&self, user_id: &str) -> WingoResult<Decimal> {
        let state = self.state.lock().await;
        Ok(state.wallets.get(user_id).copied().unwrap_or(Decimal::ZERO))
    }

    async fn credit_wallet(&self, user_id: &str, amount: Decimal) -> WingoResult<Decimal> {
        let amount = positive(amount)?;
        Ok(self.state.lock().await.credit(user_id, amount))
    }

    async fn debit_wallet(&self, user_id: &str, amount: Decimal) -> WingoResult<Decimal> {
        let amount = positive(amount)?;
        Ok(self.state.lock().await.debit(user_id, amount)?)
    }

    async fn append_ledger_transaction(&self, entry: NewLedgerEntry) -> WingoResult<LedgerEntry> {
        Ok(self.state.lock().await.record(entry))
    }

    async fn ledger_for_user(&self, user_id: &str) -> WingoResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WingoError;
    use crate::games::selector::SelectionBucket;
    use crate::games::types::{Color, Declarer, Digit, Outcome, ProfitSnapshot, Selection};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn new_bet(user: &str, round_id: RoundId, amount: Decimal) -> NewBet {
        NewBet {
            user_id: user.to_string(),
            round_id,
            selection: Selection::Color(Color::Red),
            amount,
            potential_win: amount * dec!(1.95),
            placed_at: Utc::now(),
        }
    }

    async fn funded(user: &str, amount: Decimal) -> (MemoryStore, Round) {
        let store = MemoryStore::new();
        store.credit_wallet(user, amount).await.unwrap();
        let (round, _) = store.open_round(Utc::now()).await.unwrap();
        (store, round)
    }

    #[tokio::test]
    async fn test_open_round_is_idempotent_while_current() {
        let store = MemoryStore::new();
        let (first, created) = store.open_round(Utc::now()).await.unwrap();
        let (again, created_again) = store.open_round(Utc::now()).await.unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, again.id);
        assert_eq!(store.current_round().await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_terminal_round_releases_current_pointer() {
        let store = MemoryStore::new();
        let (first, _) = store.open_round(Utc::now()).await.unwrap();
        store
            .transition_round(first.id, RoundCommand::Cancel { at: Utc::now() })
            .await
            .unwrap();
        assert!(store.current_round().await.unwrap().is_none());

        let (second, created) = store.open_round(Utc::now()).await.unwrap();
        assert!(created);
        assert!(second.period > first.period);
    }

    #[tokio::test]
    async fn test_insert_bet_debits_and_records() {
        let (store, round) = funded("alice", dec!(500)).await;
        let bet = store
            .insert_bet_atomically(new_bet("alice", round.id, dec!(100)))
            .await
            .unwrap();

        assert_eq!(bet.result, BetResult::Pending);
        assert_eq!(store.balance("alice").await.unwrap(), dec!(400));
        let ledger = store.ledger_for_user("alice").await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].kind, TransactionKind::BetPlaced);
        assert_eq!(ledger[0].amount, dec!(-100));
        assert_eq!(ledger[0].reference_id, Some(bet.id));
    }

    #[tokio::test]
    async fn test_duplicate_bet_rejected_without_debit() {
        let (store, round) = funded("alice", dec!(500)).await;
        store
            .insert_bet_atomically(new_bet("alice", round.id, dec!(100)))
            .await
            .unwrap();
        let err = store
            .insert_bet_atomically(new_bet("alice", round.id, dec!(50)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WingoError::StateConflict(StateConflict::DuplicateBet { .. })
        ));
        assert_eq!(store.balance("alice").await.unwrap(), dec!(400));
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_no_bet() {
        let (store, round) = funded("bob", dec!(20)).await;
        let err = store
            .insert_bet_atomically(new_bet("bob", round.id, dec!(50)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WingoError::Wallet(WalletError::InsufficientBalance { .. })
        ));
        assert!(store.bets_for_round(round.id).await.unwrap().is_empty());
        // The failed attempt must not consume the user's one bet
        store
            .insert_bet_atomically(new_bet("bob", round.id, dec!(20)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_paused_round_rejects_bets() {
        let (store, round) = funded("carol", dec!(100)).await;
        store
            .transition_round(round.id, RoundCommand::Pause)
            .await
            .unwrap();
        let err = store
            .insert_bet_atomically(new_bet("carol", round.id, dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WingoError::StateConflict(StateConflict::RoundNotOpen {
                status: RoundStatus::Paused,
                ..
            })
        ));
        assert_eq!(store.balance("carol").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let (store, round) = funded("dave", dec!(100)).await;
        let bet = store
            .insert_bet_atomically(new_bet("dave", round.id, dec!(100)))
            .await
            .unwrap();
        let settlement = BetSettlement {
            bet_id: bet.id,
            result: BetResult::Won,
            win_amount: dec!(195),
            settled_at: Utc::now(),
        };

        let first = store.settle_bet(settlement.clone()).await.unwrap();
        let second = store.settle_bet(settlement).await.unwrap();

        assert!(first.was_applied());
        assert!(!second.was_applied());
        assert_eq!(store.balance("dave").await.unwrap(), dec!(195));
        let won: Vec<_> = store
            .ledger_for_user("dave")
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == TransactionKind::BetWon)
            .collect();
        assert_eq!(won.len(), 1);
    }

    #[tokio::test]
    async fn test_refund_restores_stake_once() {
        let (store, round) = funded("erin", dec!(80)).await;
        let bet = store
            .insert_bet_atomically(new_bet("erin", round.id, dec!(50)))
            .await
            .unwrap();

        store.refund_bet(bet.id, Utc::now()).await.unwrap();
        let again = store.refund_bet(bet.id, Utc::now()).await.unwrap();

        assert!(!again.was_applied());
        assert_eq!(again.bet().result, BetResult::Cancelled);
        assert_eq!(again.bet().win_amount, Some(Decimal::ZERO));
        assert_eq!(store.balance("erin").await.unwrap(), dec!(80));
    }

    #[tokio::test]
    async fn test_wallet_contract() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.debit_wallet("ghost", dec!(1)).await,
            Err(WingoError::Wallet(WalletError::UnknownWallet(_)))
        ));
        assert!(store.credit_wallet("frank", dec!(0)).await.is_err());
        assert_eq!(store.credit_wallet("frank", dec!(30)).await.unwrap(), dec!(30));
        assert_eq!(store.debit_wallet("frank", dec!(10)).await.unwrap(), dec!(20));
        assert!(store.debit_wallet("frank", dec!(25)).await.is_err());
    }

    #[tokio::test]
    async fn test_rounds_due_respects_window_and_closed() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let window = Duration::seconds(60);
        let (round, _) = store.open_round(start).await.unwrap();

        assert!(store
            .rounds_due(start + Duration::seconds(59), window)
            .await
            .unwrap()
            .is_empty());
        let expired_at = start + window;
        assert_eq!(store.rounds_due(expired_at, window).await.unwrap().len(), 1);

        store.transition_round(round.id, RoundCommand::Pause).await.unwrap();
        assert!(store.rounds_due(expired_at, window).await.unwrap().is_empty());

        store.transition_round(round.id, RoundCommand::Close).await.unwrap();
        let due = store.rounds_due(start, window).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, RoundStatus::Closed);
    }

    #[tokio::test]
    async fn test_prune_keeps_rounds_with_pending_bets() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let mut rounds = Vec::new();
        let mut bets = Vec::new();
        for (i, user) in ["ann", "ben", "cal"].into_iter().enumerate() {
            store.credit_wallet(user, dec!(100)).await.unwrap();
            let (round, _) = store.open_round(start).await.unwrap();
            let bet = store
                .insert_bet_atomically(new_bet(user, round.id, dec!(10)))
                .await
                .unwrap();
            store
                .transition_round(round.id, declare_at(start + Duration::seconds(i as i64)))
                .await
                .unwrap();
            rounds.push(round);
            bets.push(bet);
        }
        // Settle every bet except the oldest round's
        for bet in &bets[1..] {
            store.settle_bet(lost(bet.id)).await.unwrap();
        }

        let report = store.prune_declared_rounds(1).await.unwrap();
        assert_eq!(report.rounds_removed, 1);
        assert!(store.get_round(rounds[0].id).await.unwrap().is_some());
        assert!(store.get_round(rounds[1].id).await.unwrap().is_none());
        assert_eq!(store.bets_for_round(rounds[0].id).await.unwrap().len(), 1);

        store.settle_bet(lost(bets[0].id)).await.unwrap();
        let report = store.prune_declared_rounds(1).await.unwrap();
        assert_eq!(report.rounds_removed, 1);
        assert!(store.get_round(rounds[0].id).await.unwrap().is_none());
        assert!(store.get_round(rounds[2].id).await.unwrap().is_some());
    }

    fn declare_at(at: DateTime<Utc>) -> RoundCommand {
        RoundCommand::Declare {
            outcome: Outcome::from_digit(Digit::new(4).unwrap()),
            declared_by: Declarer::System,
            snapshot: ProfitSnapshot {
                collection: Decimal::ZERO,
                payout: Decimal::ZERO,
                profit: Decimal::ZERO,
                profit_percent: Decimal::ZERO,
                rank: None,
                rank_label: "unranked".to_string(),
                bucket: SelectionBucket::NoBets,
                ranking: "[]".to_string(),
            },
            at,
        }
    }

    fn lost(bet_id: BetId) -> BetSettlement {
        BetSettlement {
            bet_id,
            result: BetResult::Lost,
            win_amount: Decimal::ZERO,
            settled_at: Utc::now(),
        }
    }
}
