//! Conversation flows
//!
//! A flow asks the user for a sequence of fields. Each field is prompted,
//! awaited through the [`InputCorrelator`](crate::correlator::InputCorrelator),
//! validated, and retried until accepted or canceled. Scratch messages of a
//! field are removed once it settles.

mod driver;
mod field;

pub use driver::{FlowConfig, FlowDriver, FlowError, FlowOutcome, FlowSession};
pub use field::{predicate, FieldSpec, FieldValues, Predicate, Validation, Validator};
