//! Game engine
//!
//! Entry point for everything that changes a round: bet placement, system
//! and admin declarations, pause/resume/cancel, the scheduler tick and
//! startup recovery. Collaborators are injected through [`EngineBuilder`].
//!
//! Declarations (system or admin), cancellations and ticks are serialized by
//! one lock. A declaration first moves the round to CLOSED, which freezes its
//! bet set; the liability computed on that set is exactly what settlement
//! pays out.

use crate::clock::{Clock, SystemClock};
use crate::config::WingoConfig;
use crate::errors::{StateConflict, ValidationError, WingoResult};
use crate::games::liability::{self, LiabilityReport};
use crate::games::period::PeriodCode;
use crate::games::round::RoundCommand;
use crate::games::selector::{OutcomeDecision, OutcomeSelector, PolicyWarning, SelectionBucket, TargetSelector};
use crate::games::settlement::{RefundReport, SettlementEngine, SettlementReport};
use crate::games::taxonomy;
use crate::games::types::{
    Bet, BetResult, BetType, Declarer, LedgerEntry, Outcome, Round, RoundId, RoundStatus,
    Selection, TransactionKind,
};
use crate::notify::{GameEvent, LiabilityFeed, LiabilitySnapshot};
use crate::store::{GameStore, MemoryStore, NewBet, NewLedgerEntry};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// A player's request to wager on a round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: String,
    pub round_id: RoundId,
    /// COLOR, NUMBER or SIZE (case-insensitive)
    pub bet_type: String,
    pub selection: String,
    pub amount: Decimal,
}

/// What a declaration did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationSummary {
    pub round_id: RoundId,
    pub period: PeriodCode,
    pub outcome: Outcome,
    pub declared_by: Declarer,
    pub bucket: SelectionBucket,
    pub profit: Decimal,
    pub profit_percent: Decimal,
    pub rank_label: String,
    /// Set when the outcome misses the profit floor
    pub warning: Option<PolicyWarning>,
    pub settlement: SettlementReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationSummary {
    pub round_id: RoundId,
    pub period: PeriodCode,
    pub refund: RefundReport,
}

/// What one scheduler tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Another tick or declaration held the lock
    pub skipped: bool,
    /// Terminal rounds whose pending bets were resumed
    pub resumed: usize,
    pub declared: Vec<DeclarationSummary>,
    pub current_round: Option<Round>,
}

enum DeclareMode {
    System,
    Admin {
        admin_id: String,
        target: TargetSelector,
    },
}

impl DeclareMode {
    fn declarer(&self) -> Declarer {
        match self {
            DeclareMode::System => Declarer::System,
            DeclareMode::Admin { admin_id, .. } => Declarer::Admin {
                admin_id: admin_id.clone(),
            },
        }
    }
}

pub struct GameEngine {
    config: WingoConfig,
    store: Arc<dyn GameStore>,
    clock: Arc<dyn Clock>,
    selector: OutcomeSelector,
    settlement: SettlementEngine,
    feed: LiabilityFeed,
    rng: Mutex<StdRng>,
    declare_lock: Mutex<()>,
}

impl GameEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &WingoConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn GameStore> {
        self.store.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.feed.subscribe()
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Validate and place a bet. The round-open check, uniqueness check and
    /// stake debit happen as one store operation.
    pub async fn place_bet(&self, request: PlaceBetRequest) -> WingoResult<Bet> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::EmptyUserId.into());
        }
        let bet_type: BetType = request.bet_type.parse()?;
        let selection = Selection::parse(bet_type, &request.selection)?;
        self.check_stake(request.amount)?;

        let bet = self
            .store
            .insert_bet_atomically(NewBet {
                user_id: user_id.to_string(),
                round_id: request.round_id,
                selection,
                amount: request.amount,
                potential_win: request.amount * taxonomy::placement_multiplier(&selection),
                placed_at: self.clock.now(),
            })
            .await?;

        info!(
            round_id = %bet.round_id,
            bet_id = %bet.id,
            user_id = %bet.user_id,
            bet_type = %bet.bet_type(),
            selection = %bet.selection,
            amount = %bet.amount,
            "Bet placed"
        );

        match self.liability_snapshot(bet.round_id).await {
            Ok(liability) => self.feed.publish(GameEvent::BetPlaced {
                round_id: bet.round_id,
                bet_id: bet.id,
                user_id: bet.user_id.clone(),
                selection: bet.selection,
                amount: bet.amount,
                liability,
            }),
            Err(e) => warn!(round_id = %bet.round_id, error = %e, "Liability snapshot unavailable"),
        }

        Ok(bet)
    }

    fn check_stake(&self, amount: Decimal) -> Result<(), ValidationError> {
        let game = &self.config.game;
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        if amount.normalize().scale() > taxonomy::STAKE_SCALE {
            return Err(ValidationError::TooPrecise {
                amount,
                max_scale: taxonomy::STAKE_SCALE,
            });
        }
        if amount < game.min_bet {
            return Err(ValidationError::BelowMinimum {
                amount,
                min: game.min_bet,
            });
        }
        if amount > game.max_bet {
            return Err(ValidationError::AboveMaximum {
                amount,
                max: game.max_bet,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Liability preview
    // ------------------------------------------------------------------

    /// Current candidate table of a round
    pub async fn liability_snapshot(&self, round_id: RoundId) -> WingoResult<LiabilitySnapshot> {
        let round = self.round(round_id).await?;
        let bets = self.store.bets_for_round(round_id).await?;
        let live = bets.iter().filter(|b| b.result != BetResult::Cancelled).count();
        let report = liability::calculate(&bets, self.selector.policy());
        Ok(LiabilitySnapshot::new(&round, live, &report, self.clock.now()))
    }

    // ------------------------------------------------------------------
    // Declaration
    // ------------------------------------------------------------------

    /// Let the selector pick the outcome and settle the round
    pub async fn declare_system(&self, round_id: RoundId) -> WingoResult<DeclarationSummary> {
        let _guard = self.declare_lock.lock().await;
        self.declare_locked(round_id, DeclareMode::System).await
    }

    /// Declare the outcome an admin asks for. `target` is a digit, color or
    /// size; colors and sizes resolve to their first matching digit.
    pub async fn declare_admin(
        &self,
        round_id: RoundId,
        admin_id: &str,
        target: &str,
    ) -> WingoResult<DeclarationSummary> {
        let target: TargetSelector = target.parse()?;
        let _guard = self.declare_lock.lock().await;
        self.declare_locked(
            round_id,
            DeclareMode::Admin {
                admin_id: admin_id.to_string(),
                target,
            },
        )
        .await
    }

    async fn declare_locked(
        &self,
        round_id: RoundId,
        mode: DeclareMode,
    ) -> WingoResult<DeclarationSummary> {
        let round = self.round(round_id).await?;

        // A round found already CLOSED was stranded by an earlier failure
        let previous = if round.status == RoundStatus::Closed {
            None
        } else {
            let (previous, _) = self
                .store
                .transition_round(round_id, RoundCommand::Close)
                .await?;
            Some(previous)
        };

        let bets = self.store.open_bets_for_round(round_id).await?;
        let report = liability::calculate(&bets, self.selector.policy());
        let decision = match self.decide(report, &mode).await {
            Ok(decision) => decision,
            Err(e) => {
                if let Some(previous) = previous {
                    self.reopen(round_id, previous).await;
                }
                return Err(e);
            }
        };

        let now = self.clock.now();
        let declared_by = mode.declarer();
        let (_, declared) = self
            .store
            .transition_round(
                round_id,
                RoundCommand::Declare {
                    outcome: decision.outcome,
                    declared_by: declared_by.clone(),
                    snapshot: decision.snapshot()?,
                    at: now,
                },
            )
            .await?;

        info!(
            round_id = %round_id,
            period = %declared.period,
            digit = %decision.outcome.digit,
            declared_by = %declared_by,
            bucket = %decision.bucket,
            profit = %decision.profit(),
            "Round declared"
        );
        if let Some(warning) = &decision.warning {
            warn!(round_id = %round_id, "{}", warning);
        }

        let settlement = self.settlement.settle_round(&declared, now).await?;
        if let Err(e) = settlement.ensure_complete() {
            warn!(round_id = %round_id, error = %e, "Settlement incomplete, will resume on next tick");
        }

        if let Err(e) = self
            .store
            .prune_declared_rounds(self.config.retention.max_declared_rounds)
            .await
        {
            warn!(error = %e, "Retention pruning failed");
        }

        let rank_label = declared
            .snapshot
            .as_ref()
            .map(|s| s.rank_label.clone())
            .unwrap_or_default();
        self.feed.publish(GameEvent::RoundDeclared {
            round_id,
            period: declared.period,
            outcome: decision.outcome,
            declared_by: declared_by.clone(),
            bucket: decision.bucket,
            profit: decision.profit(),
            profit_percent: decision.profit_percent(),
            warning: decision.warning.clone(),
            liability: LiabilitySnapshot::new(&declared, bets.len(), &decision.report, now),
        });

        self.ensure_open_round().await?;

        Ok(DeclarationSummary {
            round_id,
            period: declared.period,
            outcome: decision.outcome,
            declared_by,
            bucket: decision.bucket,
            profit: decision.profit(),
            profit_percent: decision.profit_percent(),
            rank_label,
            warning: decision.warning,
            settlement,
        })
    }

    async fn decide(&self, report: LiabilityReport, mode: &DeclareMode) -> WingoResult<OutcomeDecision> {
        match mode {
            DeclareMode::System => {
                let mut rng = self.rng.lock().await;
                Ok(self.selector.select_system(report, &mut *rng))
            }
            DeclareMode::Admin { admin_id, target } => {
                self.selector.select_admin(report, *target).map_err(|breach| {
                    warn!(admin_id = %admin_id, target = %target, "Admin declaration rejected: {}", breach);
                    breach.into()
                })
            }
        }
    }

    async fn reopen(&self, round_id: RoundId, previous: RoundStatus) {
        match self
            .store
            .transition_round(round_id, RoundCommand::Reopen(previous))
            .await
        {
            Ok(_) => debug!(round_id = %round_id, status = %previous, "Round reopened"),
            Err(e) => error!(round_id = %round_id, error = %e, "Failed to reopen round"),
        }
    }

    // ------------------------------------------------------------------
    // Admin state changes
    // ------------------------------------------------------------------

    pub async fn pause(&self, round_id: RoundId) -> WingoResult<Round> {
        let (_, round) = self
            .store
            .transition_round(round_id, RoundCommand::Pause)
            .await?;
        info!(round_id = %round_id, period = %round.period, "Round paused");
        self.feed.publish(GameEvent::RoundPaused {
            round_id,
            period: round.period,
        });
        Ok(round)
    }

    pub async fn resume(&self, round_id: RoundId) -> WingoResult<Round> {
        let (_, round) = self
            .store
            .transition_round(round_id, RoundCommand::Resume)
            .await?;
        info!(round_id = %round_id, period = %round.period, "Round resumed");
        self.feed.publish(GameEvent::RoundResumed {
            round_id,
            period: round.period,
        });
        Ok(round)
    }

    /// Cancel a round and refund every pending stake
    pub async fn cancel(&self, round_id: RoundId) -> WingoResult<CancellationSummary> {
        let _guard = self.declare_lock.lock().await;
        let now = self.clock.now();

        let (_, round) = self
            .store
            .transition_round(round_id, RoundCommand::Cancel { at: now })
            .await?;
        info!(round_id = %round_id, period = %round.period, "Round cancelled");

        let refund = self.settlement.refund_round(round_id, now).await?;
        let liability = self.liability_snapshot(round_id).await?;
        self.feed.publish(GameEvent::RoundCancelled {
            round_id,
            period: round.period,
            refunded: refund.refunded,
            total_refunded: refund.total_refunded,
            liability,
        });

        self.ensure_open_round().await?;

        Ok(CancellationSummary {
            round_id,
            period: round.period,
            refund,
        })
    }

    // ------------------------------------------------------------------
    // Scheduling and recovery
    // ------------------------------------------------------------------

    /// One scheduler step: resume unsettled rounds, declare expired ones,
    /// make sure a round is open. Skips if another tick or a declaration is
    /// in progress.
    pub async fn tick(&self) -> WingoResult<TickReport> {
        let Ok(_guard) = self.declare_lock.try_lock() else {
            debug!("Tick skipped, declaration in progress");
            return Ok(TickReport {
                skipped: true,
                ..Default::default()
            });
        };

        let resumed = self.resume_locked().await?;

        let mut declared = Vec::new();
        let due = self
            .store
            .rounds_due(self.clock.now(), self.config.round_duration())
            .await?;
        for round in due {
            match self.declare_locked(round.id, DeclareMode::System).await {
                Ok(summary) => declared.push(summary),
                Err(e) => error!(round_id = %round.id, error = %e, "Automatic declaration failed"),
            }
        }

        let current = self.ensure_open_round().await?;

        Ok(TickReport {
            skipped: false,
            resumed,
            declared,
            current_round: Some(current),
        })
    }

    /// Finish settlement or refunds left pending by an earlier failure
    pub async fn resume_unsettled(&self) -> WingoResult<usize> {
        let _guard = self.declare_lock.lock().await;
        self.resume_locked().await
    }

    async fn resume_locked(&self) -> WingoResult<usize> {
        let rounds = self.store.rounds_with_pending_bets().await?;
        let now = self.clock.now();

        for round in &rounds {
            match round.status {
                RoundStatus::ResultDeclared => {
                    info!(round_id = %round.id, period = %round.period, "Resuming settlement");
                    let report = self.settlement.settle_round(round, now).await?;
                    if let Err(e) = report.ensure_complete() {
                        warn!(round_id = %round.id, error = %e, "Settlement still incomplete");
                    }
                }
                RoundStatus::Cancelled => {
                    info!(round_id = %round.id, period = %round.period, "Resuming refunds");
                    self.settlement.refund_round(round.id, now).await?;
                }
                _ => {}
            }
        }

        Ok(rounds.len())
    }

    /// The open round, creating one if none exists
    pub async fn ensure_open_round(&self) -> WingoResult<Round> {
        let (round, created) = self.store.open_round(self.clock.now()).await?;
        if created {
            info!(round_id = %round.id, period = %round.period, "Round opened");
            self.feed.publish(GameEvent::RoundOpened {
                round_id: round.id,
                period: round.period,
                started_at: round.started_at,
            });
        }
        Ok(round)
    }

    // ------------------------------------------------------------------
    // Queries and wallet
    // ------------------------------------------------------------------

    pub async fn current_round(&self) -> WingoResult<Option<Round>> {
        self.store.current_round().await
    }

    pub async fn round(&self, round_id: RoundId) -> WingoResult<Round> {
        self.store
            .get_round(round_id)
            .await?
            .ok_or_else(|| StateConflict::RoundNotFound(round_id).into())
    }

    /// Newest first
    pub async fn recent_rounds(&self, limit: usize) -> WingoResult<Vec<Round>> {
        self.store.recent_rounds(limit).await
    }

    pub async fn round_bets(&self, round_id: RoundId) -> WingoResult<Vec<Bet>> {
        self.store.bets_for_round(round_id).await
    }

    pub async fn user_bets(&self, user_id: &str) -> WingoResult<Vec<Bet>> {
        self.store.bets_for_user(user_id).await
    }

    pub async fn balance(&self, user_id: &str) -> WingoResult<Decimal> {
        self.store.balance(user_id).await
    }

    pub async fn ledger(&self, user_id: &str) -> WingoResult<Vec<LedgerEntry>> {
        self.store.ledger_for_user(user_id).await
    }

    /// Fund a wallet and record the adjustment
    pub async fn credit_wallet(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
    ) -> WingoResult<Decimal> {
        let balance = self.store.credit_wallet(user_id, amount).await?;
        self.store
            .append_ledger_transaction(NewLedgerEntry {
                user_id: user_id.to_string(),
                kind: TransactionKind::Adjustment,
                amount,
                reference_id: None,
                description: description.to_string(),
                created_at: self.clock.now(),
            })
            .await?;
        Ok(balance)
    }
}

/// Assembles a [`GameEngine`] from its collaborators
pub struct EngineBuilder {
    config: WingoConfig,
    store: Option<Arc<dyn GameStore>>,
    clock: Option<Arc<dyn Clock>>,
    rng_seed: Option<u64>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: WingoConfig::default(),
            store: None,
            clock: None,
            rng_seed: None,
        }
    }

    pub fn with_config(mut self, config: WingoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Make system selection reproducible
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> WingoResult<GameEngine> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn GameStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(GameEngine {
            selector: OutcomeSelector::new(self.config.risk_policy()),
            settlement: SettlementEngine::new(store.clone()),
            feed: LiabilityFeed::new(self.config.monitoring.feed_capacity),
            rng: Mutex::new(rng),
            declare_lock: Mutex::new(()),
            config: self.config,
            store,
            clock,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::{PolicyBreach, WingoError};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn engine() -> (GameEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let engine = GameEngine::builder()
            .with_clock(clock.clone())
            .with_rng_seed(11)
            .build()
            .unwrap();
        (engine, clock)
    }

    fn request(user: &str, round_id: RoundId, bet_type: &str, selection: &str, amount: Decimal) -> PlaceBetRequest {
        PlaceBetRequest {
            user_id: user.to_string(),
            round_id,
            bet_type: bet_type.to_string(),
            selection: selection.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_place_bet_validates_before_mutating() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        engine.credit_wallet("alice", dec!(1000), "seed").await.unwrap();

        let cases = [
            request("alice", round.id, "COLOUR", "PINK", dec!(50)),
            request("alice", round.id, "PARITY", "ODD", dec!(50)),
            request("alice", round.id, "NUMBER", "12", dec!(50)),
            request("alice", round.id, "SIZE", "BIG", dec!(5)),
            request("alice", round.id, "SIZE", "BIG", dec!(0)),
            request("alice", round.id, "SIZE", "BIG", dec!(100001)),
            request("alice", round.id, "SIZE", "BIG", dec!(10.001)),
            request("alice", round.id, "COLOR", "GREEN", dec!(10.000000000000000000000000001)),
            request("  ", round.id, "SIZE", "BIG", dec!(50)),
        ];
        for case in cases {
            let err = engine.place_bet(case).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION", "{}", err);
        }

        assert_eq!(engine.balance("alice").await.unwrap(), dec!(1000));
        assert!(engine.round_bets(round.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stake_precision_is_capped_at_cents() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        engine.credit_wallet("carol", dec!(100), "seed").await.unwrap();

        let err = engine
            .place_bet(request("carol", round.id, "COLOR", "GREEN", dec!(10.005)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WingoError::Validation(ValidationError::TooPrecise { max_scale: 2, .. })
        ));

        // Trailing zeros do not count against the limit
        let bet = engine
            .place_bet(request("carol", round.id, "COLOR", "GREEN", dec!(10.5000)))
            .await
            .unwrap();
        assert_eq!(bet.potential_win, dec!(20.475));
        assert_eq!(engine.balance("carol").await.unwrap(), dec!(89.5));
    }

    #[tokio::test]
    async fn test_place_bet_normalizes_and_quotes_potential_win() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        engine.credit_wallet("bob", dec!(100), "seed").await.unwrap();

        let bet = engine
            .place_bet(request("bob", round.id, "color", "violet", dec!(20)))
            .await
            .unwrap();
        assert_eq!(bet.selection.to_string(), "VIOLET");
        assert_eq!(bet.potential_win, dec!(90));
        assert_eq!(engine.balance("bob").await.unwrap(), dec!(80));
    }

    #[tokio::test]
    async fn test_admin_breach_restores_previous_status() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        engine.credit_wallet("whale", dec!(1000), "seed").await.unwrap();
        engine
            .place_bet(request("whale", round.id, "NUMBER", "7", dec!(667)))
            .await
            .unwrap();
        engine.pause(round.id).await.unwrap();

        let err = engine.declare_admin(round.id, "admin-1", "7").await.unwrap_err();
        assert!(matches!(
            err,
            WingoError::PolicyBreach(PolicyBreach::MaxLossExceeded { .. })
        ));

        let after = engine.round(round.id).await.unwrap();
        assert_eq!(after.status, RoundStatus::Paused);
        assert!(after.outcome.is_none());
        assert_eq!(engine.balance("whale").await.unwrap(), dec!(333));
    }

    #[tokio::test]
    async fn test_admin_invalid_target_mutates_nothing() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        let err = engine.declare_admin(round.id, "admin-1", "purple").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(engine.round(round.id).await.unwrap().status, RoundStatus::Open);
    }

    #[tokio::test]
    async fn test_declaration_opens_next_round() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        let summary = engine.declare_system(round.id).await.unwrap();

        assert_eq!(summary.bucket, SelectionBucket::NoBets);
        assert_eq!(summary.declared_by, Declarer::System);
        let next = engine.current_round().await.unwrap().unwrap();
        assert_ne!(next.id, round.id);
        assert!(next.period > round.period);

        let err = engine.declare_system(round.id).await.unwrap_err();
        assert!(matches!(
            err,
            WingoError::StateConflict(StateConflict::AlreadyDeclared(_))
        ));
    }

    #[tokio::test]
    async fn test_pause_resume_and_cancel_conflicts() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();

        assert!(engine.resume(round.id).await.is_err());
        engine.pause(round.id).await.unwrap();
        engine.resume(round.id).await.unwrap();
        engine.cancel(round.id).await.unwrap();

        let err = engine.cancel(round.id).await.unwrap_err();
        assert!(matches!(
            err,
            WingoError::StateConflict(StateConflict::AlreadyCancelled(_))
        ));
        assert!(engine.pause(round.id).await.is_err());
    }

    #[tokio::test]
    async fn test_tick_declares_only_expired_rounds() {
        let (engine, clock) = engine();
        let first = engine.tick().await.unwrap().current_round.unwrap();

        clock.advance(Duration::seconds(30));
        let report = engine.tick().await.unwrap();
        assert!(report.declared.is_empty());
        assert_eq!(report.current_round.unwrap().id, first.id);

        clock.advance(Duration::seconds(30));
        let report = engine.tick().await.unwrap();
        assert_eq!(report.declared.len(), 1);
        assert_eq!(report.declared[0].round_id, first.id);
        assert_ne!(report.current_round.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_paused_round_never_expires() {
        let (engine, clock) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        engine.pause(round.id).await.unwrap();

        clock.advance(Duration::minutes(10));
        let report = engine.tick().await.unwrap();
        assert!(report.declared.is_empty());
        assert_eq!(engine.round(round.id).await.unwrap().status, RoundStatus::Paused);
    }

    #[tokio::test]
    async fn test_liability_snapshot_reflects_bets() {
        let (engine, _) = engine();
        let round = engine.ensure_open_round().await.unwrap();
        for (user, pick) in [("g", "GREEN"), ("r", "RED")] {
            engine.credit_wallet(user, dec!(100), "seed").await.unwrap();
            engine
                .place_bet(request(user, round.id, "COLOR", pick, dec!(100)))
                .await
                .unwrap();
        }

        let snapshot = engine.liability_snapshot(round.id).await.unwrap();
        assert_eq!(snapshot.total_bets, 2);
        assert_eq!(snapshot.collection, dec!(200));
        assert_eq!(snapshot.candidates.len(), 10);
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let (engine, _) = engine();
        let mut events = engine.subscribe();
        let round = engine.ensure_open_round().await.unwrap();
        engine.credit_wallet("eve", dec!(50), "seed").await.unwrap();
        engine
            .place_bet(request("eve", round.id, "SIZE", "BIG", dec!(50)))
            .await
            .unwrap();
        engine.declare_admin(round.id, "admin-1", "SMALL").await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), GameEvent::RoundOpened { .. }));
        assert!(matches!(events.recv().await.unwrap(), GameEvent::BetPlaced { .. }));
        match events.recv().await.unwrap() {
            GameEvent::RoundDeclared { outcome, declared_by, .. } => {
                assert_eq!(outcome.digit.value(), 0);
                assert_eq!(
                    declared_by,
                    Declarer::Admin {
                        admin_id: "admin-1".to_string()
                    }
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
        let next = match events.recv().await.unwrap() {
            GameEvent::RoundOpened { round_id, .. } => round_id,
            other => panic!("unexpected event {:?}", other),
        };

        engine.credit_wallet("eve", dec!(30), "seed").await.unwrap();
        engine
            .place_bet(request("eve", next, "COLOR", "RED", dec!(30)))
            .await
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), GameEvent::BetPlaced { .. }));
        engine.cancel(next).await.unwrap();

        match events.recv().await.unwrap() {
            GameEvent::RoundCancelled {
                round_id,
                refunded,
                total_refunded,
                liability,
                ..
            } => {
                assert_eq!(round_id, next);
                assert_eq!(refunded, 1);
                assert_eq!(total_refunded, dec!(30));
                assert_eq!(liability.round_id, next);
                assert_eq!(liability.status, RoundStatus::Cancelled);
                assert_eq!(liability.total_bets, 0);
                assert_eq!(liability.collection, Decimal::ZERO);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(events.recv().await.unwrap(), GameEvent::RoundOpened { .. }));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let mut config = WingoConfig::default();
        config.game.round_duration_secs = 0;
        assert!(GameEngine::builder().with_config(config).build().is_err());
    }
}
