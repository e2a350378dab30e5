//! Application layer: the payment workflow use cases.
//!
//! [`orchestrator::PaymentOrchestrator`] sequences validation, risk scoring,
//! gateway calls, persistence and notification through the domain ports.

pub mod orchestrator;
