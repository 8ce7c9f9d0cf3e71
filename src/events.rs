//! Operation events and the state reducer
//!
//! The orchestrator never mutates operation state directly. It emits typed
//! `OperationEvent`s; `OperationState::apply` is the single reducer through
//! which state evolves, and subscribers (the CLI progress display) consume
//! the same events as a lazy sequence off an mpsc channel.
//!
//! This also carries the retry bookkeeping: confirmed approvals and a
//! confirmed wrap are recorded in the state, so a retry after a failure
//! resumes where the previous attempt stopped instead of re-approving.

use alloy_primitives::{Address, B256, U256};
use std::collections::HashSet;
use tokio::sync::mpsc;

// ============================================
// STAGES AND STEPS
// ============================================

/// Where one in-flight liquidity operation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Wrapping,
    CheckingAllowance,
    Approving,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Wrapping => write!(f, "wrapping native currency"),
            Stage::CheckingAllowance => write!(f, "checking allowance"),
            Stage::Approving => write!(f, "awaiting approval"),
            Stage::Submitting => write!(f, "submitting"),
            Stage::Confirming => write!(f, "awaiting confirmation"),
            Stage::Succeeded => write!(f, "succeeded"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

/// Which transaction within an operation a hash or failure belongs to.
/// Kept distinct so "approval failed" never blurs into "operation failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Wrap,
    Approval,
    Liquidity,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Wrap => write!(f, "wrap"),
            StepKind::Approval => write!(f, "approval"),
            StepKind::Liquidity => write!(f, "liquidity"),
        }
    }
}

// ============================================
// EVENTS
// ============================================

/// Everything that can happen to one liquidity operation.
#[derive(Debug, Clone)]
pub enum OperationEvent {
    Started,
    WrapSubmitted { amount: U256, hash: B256 },
    WrapConfirmed { hash: B256 },
    AllowanceChecked { token: Address, sufficient: bool },
    ApprovalSubmitted { token: Address, hash: B256 },
    ApprovalConfirmed { token: Address, hash: B256 },
    LiquiditySubmitted { hash: B256 },
    LiquidityConfirmed { hash: B256 },
    Failed { step: StepKind, reason: String },
}

// ============================================
// STATE + REDUCER
// ============================================

/// The full record of one operation, built exclusively by `apply`.
#[derive(Debug, Clone)]
pub struct OperationState {
    pub stage: Stage,

    /// Wrap already confirmed - a retry must not wrap again
    pub wrapped: bool,

    /// Tokens whose approval already confirmed - a retry skips these
    pub approved: HashSet<Address>,

    /// Every tx hash this operation produced, in submission order
    pub tx_hashes: Vec<(StepKind, B256)>,

    /// Terminal error, if any
    pub error: Option<(StepKind, String)>,
}

impl Default for OperationState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            wrapped: false,
            approved: HashSet::new(),
            tx_hashes: Vec::new(),
            error: None,
        }
    }
}

impl OperationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reducer: fold one event into the state.
    pub fn apply(&mut self, event: &OperationEvent) {
        match event {
            OperationEvent::Started => {
                // A restart clears the terminal outcome but keeps the
                // completed-step bookkeeping
                self.stage = Stage::CheckingAllowance;
                self.error = None;
            }
            OperationEvent::WrapSubmitted { hash, .. } => {
                self.stage = Stage::Wrapping;
                self.tx_hashes.push((StepKind::Wrap, *hash));
            }
            OperationEvent::WrapConfirmed { .. } => {
                self.stage = Stage::CheckingAllowance;
                self.wrapped = true;
            }
            OperationEvent::AllowanceChecked { sufficient, .. } => {
                self.stage = if *sufficient {
                    Stage::Submitting
                } else {
                    Stage::Approving
                };
            }
            OperationEvent::ApprovalSubmitted { hash, .. } => {
                self.stage = Stage::Approving;
                self.tx_hashes.push((StepKind::Approval, *hash));
            }
            OperationEvent::ApprovalConfirmed { token, .. } => {
                self.stage = Stage::CheckingAllowance;
                self.approved.insert(*token);
            }
            OperationEvent::LiquiditySubmitted { hash } => {
                self.stage = Stage::Confirming;
                self.tx_hashes.push((StepKind::Liquidity, *hash));
            }
            OperationEvent::LiquidityConfirmed { .. } => {
                self.stage = Stage::Succeeded;
            }
            OperationEvent::Failed { step, reason } => {
                self.stage = Stage::Failed;
                self.error = Some((*step, reason.clone()));
            }
        }
    }

    /// Hash of the final liquidity transaction, once confirmed
    pub fn liquidity_tx(&self) -> Option<B256> {
        self.tx_hashes
            .iter()
            .rev()
            .find(|(kind, _)| *kind == StepKind::Liquidity)
            .map(|(_, hash)| *hash)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Succeeded | Stage::Failed)
    }
}

// ============================================
// SUBSCRIPTION
// ============================================

/// Emitter half of the event channel. Cloneable; dropping every receiver
/// just makes emits no-ops.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<OperationEvent>>,
}

impl EventSink {
    /// A sink that discards everything (tests, non-interactive paths)
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: OperationEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is rendering progress - fine
            let _ = tx.send(event);
        }
    }
}

/// Create a connected sink/stream pair. The receiver yields events lazily
/// as the operation advances.
pub fn channel() -> (EventSink, mpsc::UnboundedReceiver<OperationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, rx)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_slice(&[n; 20])
    }

    fn hash(n: u8) -> B256 {
        B256::from_slice(&[n; 32])
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = OperationState::new();
        assert_eq!(state.stage, Stage::Idle);

        state.apply(&OperationEvent::Started);
        assert_eq!(state.stage, Stage::CheckingAllowance);

        state.apply(&OperationEvent::AllowanceChecked { token: addr(1), sufficient: false });
        assert_eq!(state.stage, Stage::Approving);

        state.apply(&OperationEvent::ApprovalSubmitted { token: addr(1), hash: hash(1) });
        state.apply(&OperationEvent::ApprovalConfirmed { token: addr(1), hash: hash(1) });
        assert_eq!(state.stage, Stage::CheckingAllowance);
        assert!(state.approved.contains(&addr(1)));

        state.apply(&OperationEvent::AllowanceChecked { token: addr(1), sufficient: true });
        assert_eq!(state.stage, Stage::Submitting);

        state.apply(&OperationEvent::LiquiditySubmitted { hash: hash(2) });
        assert_eq!(state.stage, Stage::Confirming);

        state.apply(&OperationEvent::LiquidityConfirmed { hash: hash(2) });
        assert_eq!(state.stage, Stage::Succeeded);
        assert!(state.is_terminal());
        assert_eq!(state.liquidity_tx(), Some(hash(2)));
    }

    #[test]
    fn test_wrap_precedes_allowance_check() {
        let mut state = OperationState::new();
        state.apply(&OperationEvent::Started);
        state.apply(&OperationEvent::WrapSubmitted { amount: U256::from(10u64), hash: hash(9) });
        assert_eq!(state.stage, Stage::Wrapping);

        state.apply(&OperationEvent::WrapConfirmed { hash: hash(9) });
        assert_eq!(state.stage, Stage::CheckingAllowance);
        assert!(state.wrapped);
    }

    #[test]
    fn test_failure_preserves_partial_progress() {
        let mut state = OperationState::new();
        state.apply(&OperationEvent::Started);
        state.apply(&OperationEvent::ApprovalSubmitted { token: addr(1), hash: hash(1) });
        state.apply(&OperationEvent::ApprovalConfirmed { token: addr(1), hash: hash(1) });
        state.apply(&OperationEvent::Failed {
            step: StepKind::Liquidity,
            reason: "execution reverted".to_string(),
        });

        assert_eq!(state.stage, Stage::Failed);
        let (step, _) = state.error.clone().unwrap();
        assert_eq!(step, StepKind::Liquidity);

        // Retry: Started clears the error but keeps the confirmed approval
        state.apply(&OperationEvent::Started);
        assert_eq!(state.stage, Stage::CheckingAllowance);
        assert!(state.error.is_none());
        assert!(state.approved.contains(&addr(1)));
    }

    #[test]
    fn test_approval_failure_is_distinguishable() {
        let mut state = OperationState::new();
        state.apply(&OperationEvent::Started);
        state.apply(&OperationEvent::Failed {
            step: StepKind::Approval,
            reason: "user rejected".to_string(),
        });
        assert_eq!(state.error.as_ref().unwrap().0, StepKind::Approval);
        assert_eq!(state.liquidity_tx(), None);
    }

    #[tokio::test]
    async fn test_channel_delivers_events_in_order() {
        let (sink, mut rx) = channel();
        sink.emit(OperationEvent::Started);
        sink.emit(OperationEvent::LiquiditySubmitted { hash: hash(3) });
        drop(sink);

        assert!(matches!(rx.recv().await, Some(OperationEvent::Started)));
        assert!(matches!(rx.recv().await, Some(OperationEvent::LiquiditySubmitted { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_disconnected_sink_is_noop() {
        let sink = EventSink::disconnected();
        sink.emit(OperationEvent::Started); // must not panic
    }
}
