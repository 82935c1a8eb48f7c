//! Agency event synchronization for the Vault.
//!
//! Notifications from the identity agency enter through the [`Listener`],
//! which maps them onto store parameters. The [`Updater`] applies each one
//! as a single job transition (see [`state`]) inside one SQLite
//! transaction, appending the events that describe it, and then publishes
//! those events through the [`SubscriberRegistry`].
//!
//! Reconciliation is exactly-once per step: redelivered offers and updates
//! are recognized from the stored job phase and produce no events. An
//! update for a run whose offer was never reported is auto-accepted: the
//! offer is synthesized first, so both events appear in offer-then-update
//! order.

mod error;
mod listener;
pub mod reconcile;
pub mod state;
mod subscribers;
mod updater;

pub use error::{Result, SyncError};
pub use listener::Listener;
pub use state::{JobPhase, Step, Transition};
pub use subscribers::{SubscriberRegistry, Subscription, DEFAULT_BUFFER_SIZE};
pub use updater::Updater;
