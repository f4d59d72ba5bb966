//! SinkAdapter trait - the delivery engine's view of a sink
//!
//! An adapter turns a subset of a batch into a request, sends it, and reads
//! the reply back as outcomes aligned with the ids it was built from.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::{Batch, DeliveryError, EventId, HttpReply, SignableRequest};

/// Per-item result of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Accepted by the sink
    Success { detail: Option<Value> },
    /// Rejected for now; resubmit in the next attempt
    Retryable { code: String, detail: Option<Value> },
    /// Rejected for good; never resubmitted
    Fatal { code: String, detail: Option<Value> },
}

impl ItemOutcome {
    /// Success without sink detail
    pub fn success() -> Self {
        Self::Success { detail: None }
    }

    /// Retryable failure without sink detail
    pub fn retryable(code: impl Into<String>) -> Self {
        Self::Retryable {
            code: code.into(),
            detail: None,
        }
    }

    /// Whether the item must be part of the next attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Sink-provided document for this item, if any
    pub fn detail(&self) -> Option<&Value> {
        match self {
            Self::Success { detail } | Self::Retryable { detail, .. } | Self::Fatal { detail, .. } => {
                detail.as_ref()
            }
        }
    }
}

/// Latest known outcome of every event of one batch, merged across attempts
#[derive(Debug, Clone, Default)]
pub struct DeliveryLedger {
    outcomes: Vec<Option<ItemOutcome>>,
    attempts: u32,
    elapsed: Duration,
}

impl DeliveryLedger {
    /// Empty ledger sized for a batch
    pub fn new(batch_len: usize) -> Self {
        Self {
            outcomes: vec![None; batch_len],
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Record the outcomes of one attempt.
    ///
    /// `ids` and `outcomes` are positionally aligned; positions not present in
    /// `ids` keep their previous outcome.
    pub fn record_attempt(&mut self, ids: &[EventId], outcomes: Vec<ItemOutcome>) {
        self.attempts += 1;
        for (id, outcome) in ids.iter().zip(outcomes) {
            if let Some(slot) = self.outcomes.get_mut(id.index()) {
                *slot = Some(outcome);
            }
        }
    }

    /// Set the total wall time spent delivering
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Outcome for one event, `None` when it never got one
    pub fn outcome(&self, id: EventId) -> Option<&ItemOutcome> {
        self.outcomes.get(id.index()).and_then(Option::as_ref)
    }

    /// Outcomes indexed by original position
    pub fn outcomes(&self) -> &[Option<ItemOutcome>] {
        &self.outcomes
    }

    /// Ids whose latest outcome is retryable
    pub fn retryable(&self) -> Vec<EventId> {
        self.ids_where(|o| o.is_some_and(ItemOutcome::is_retryable))
    }

    /// Ids without a final outcome: never answered or still retryable
    pub fn unresolved(&self) -> Vec<EventId> {
        self.ids_where(|o| o.is_none_or(ItemOutcome::is_retryable))
    }

    fn ids_where(&self, pred: impl Fn(Option<&ItemOutcome>) -> bool) -> Vec<EventId> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| pred(o.as_ref()))
            .map(|(i, _)| EventId::new(i))
            .collect()
    }

    /// Attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total delivery wall time
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Per-event counts of a finished delivery result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemTally {
    /// Events covered by the result
    pub items: usize,
    /// Items whose latest outcome still carries a sink error
    pub errors: usize,
    /// Items rendered as postponed placeholders
    pub postponed: usize,
}

impl ItemTally {
    /// Every item accepted
    pub fn delivered(items: usize) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }
}

impl std::ops::AddAssign for ItemTally {
    fn add_assign(&mut self, other: Self) {
        self.items += other.items;
        self.errors += other.errors;
        self.postponed += other.postponed;
    }
}

/// Sink-specific request building and reply parsing.
///
/// One adapter instance is shared by every batch in flight for its sink, so
/// all methods take `&self`.
pub trait SinkAdapter: Send + Sync + 'static {
    /// Value handed to the caller on success
    type Output: Clone + Send + Sync + 'static;

    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Per-batch values computed once and reused by every attempt
    type Prepared: Send + Sync;

    /// Resolve everything about the batch that must not change between attempts
    ///
    /// # Errors
    /// `DeliveryError::Configuration` when a required value cannot be resolved
    fn prepare(&self, batch: &Batch) -> Result<Self::Prepared, DeliveryError>;

    /// Build a request for the given events of the batch
    ///
    /// # Errors
    /// `DeliveryError::Configuration` when a required value cannot be resolved
    fn build(
        &self,
        batch: &Batch,
        prepared: &Self::Prepared,
        ids: &[EventId],
    ) -> Result<SignableRequest, DeliveryError>;

    /// Sign and send a built request
    ///
    /// # Errors
    /// `DeliveryError::Transport` when no reply was obtained
    fn dispatch(
        &self,
        request: &mut SignableRequest,
    ) -> impl Future<Output = Result<HttpReply, DeliveryError>> + Send;

    /// Classify a reply into one outcome per id the request was built from.
    ///
    /// Items the reply does not mention must come back retryable.
    ///
    /// # Errors
    /// `DeliveryError::FatalRequest` when the whole request was rejected,
    /// `DeliveryError::Transport` for replies that carry no item results
    fn parse(
        &self,
        request: &SignableRequest,
        ids: &[EventId],
        reply: HttpReply,
    ) -> Result<Vec<ItemOutcome>, DeliveryError>;

    /// Render the caller-facing result covering every event of the batch
    fn finish(&self, batch: &Batch, ledger: &DeliveryLedger) -> Self::Output;

    /// Count errors and placeholders in a rendered result
    fn tally(&self, output: &Self::Output) -> ItemTally;
}
