//! Remote mutation client adapters

pub mod classify;
pub mod client;
pub mod dry_run;
pub mod graphql;

pub use client::GraphqlMutationClient;
pub use dry_run::DryRunMutationClient;
