//! Payment domain: value objects, the transaction aggregate, its lifecycle
//! and the risk engine, plus the ports the application drives.

pub mod event;
pub mod fraud_score;
pub mod money;
pub mod payment_method;
pub mod ports;
pub mod risk_factors;
pub mod status;
pub mod transaction;
