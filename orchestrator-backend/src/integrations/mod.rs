//! Clients for the node, the dashboard, the metrics API and the notifier.

pub mod amboss;
pub mod cli_fees;
pub mod command;
pub mod lnd_rest;
pub mod lndg;
pub mod lndg_db;
pub mod retry;
pub mod router;
pub mod telegram;
pub mod transport;

#[cfg(test)]
pub(crate) mod stub_server;

pub use router::ServiceRouter;
pub use transport::{ChannelInfo, FeeTransport};
