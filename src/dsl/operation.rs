//! The chainable "Operation" result wrapper returned by DSL operators.
//!
//! Carries the last raw result plus the active collection, so a further
//! DSL operator can be chained without re-naming the collection
//! (`col <- doc |> pipeline`). When a chain is used as the operand of
//! another DSL operator, its `value` is transparently unwrapped (handled by
//! the evaluator, not here).

use crate::dsl::handle::CollectionValue;
use crate::value::Value;
use std::rc::Rc;

/// A DSL operation result: the produced value plus the collection it came
/// from, so subsequent `then*` calls can target the same collection.
#[derive(Debug, Clone)]
pub struct OperationChain {
    pub value: Value,
    pub collection: Rc<CollectionValue>,
}

impl OperationChain {
    pub fn new(value: Value, collection: Rc<CollectionValue>) -> Self {
        OperationChain { value, collection }
    }

    /// Unwraps to the carried value — the behavior an operation chain
    /// exhibits when used as the operand of a further DSL operator, or when
    /// its `value`/`unwrap`/`valueOf` member is read.
    pub fn unwrap(&self) -> Value {
        self.value.clone()
    }
}
