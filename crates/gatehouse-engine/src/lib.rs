//! The Gatehouse enforcement engine.
//!
//! Everything between "an agent asked" and "rows came back / an action was
//! staged" lives here: the pipeline executor and its operator table, the
//! quick-filter engine, the read gate that picks cache or live and applies
//! policy, the cache codec and sync scheduler, the staging state machine,
//! and the credential vault. Persistence is abstract
//! ([`gatehouse_core::store::BrokerStore`]); connectors are abstract
//! ([`gatehouse_core::connector::SourceConnector`]).

mod cache;
mod ops;
mod pipeline;
mod quickfilter;
mod registry;

pub mod crypto;
pub mod error;
pub mod gate;
pub mod staging;
pub mod sync;
pub mod vault;

pub use cache::{open_fields, seal_fields};
pub use crypto::SecretCipher;
pub use error::{Error, Result};
pub use gate::{PullOutcome, PullRequest, ReadGate};
pub use pipeline::{ExecContext, PipelineOutput, PipelineRun, execute};
pub use quickfilter::apply_filters;
pub use registry::OperatorRegistry;
pub use staging::StagingEngine;
pub use sync::{SyncScheduler, parse_interval, parse_ttl};
pub use vault::CredentialVault;

#[cfg(test)]
mod tests;
