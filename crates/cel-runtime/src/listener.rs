//! Evaluation listener for tracing sub-expression results.
//!
//! The listener is a zero-cost abstraction: [`NoopListener`] methods are
//! `#[inline(always)]` empty bodies the compiler eliminates, so untraced
//! evaluation pays nothing.

use cel_ast::ExprId;
use cel_core::Value;

/// Receives `(node, value)` after each sub-expression is evaluated.
///
/// With short-circuiting disabled the listener also observes the results of
/// branches that do not contribute to the final value.
pub trait EvalListener {
    fn on_value(&mut self, id: ExprId, value: &Value);
}

/// Listener that observes nothing and gets optimized away completely.
pub struct NoopListener;

impl EvalListener for NoopListener {
    #[inline(always)]
    fn on_value(&mut self, _id: ExprId, _value: &Value) {}
}

/// Listener that records every event, in evaluation order.
#[derive(Debug, Default)]
pub struct CollectingListener {
    pub events: Vec<(ExprId, Value)>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events produced by the node with the given id.
    pub fn values_for(&self, id: ExprId) -> Vec<&Value> {
        self.events
            .iter()
            .filter(|(event_id, _)| *event_id == id)
            .map(|(_, value)| value)
            .collect()
    }
}

impl EvalListener for CollectingListener {
    fn on_value(&mut self, id: ExprId, value: &Value) {
        self.events.push((id, value.clone()));
    }
}
