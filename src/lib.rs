//! Host-side HCI test harness: drives one or more local Bluetooth
//! controllers through raw HCI packet exchange to exercise link-layer
//! behaviours (connection setup, whitelist filtering, LE data-length
//! updates, encryption start, sniff mode, ACL transport, advertising).
//!
//! The crate is layered bottom-up: [`codec`] and [`framing`] give every
//! higher layer a shared byte-level vocabulary; [`command`] and [`event`]
//! are the wire catalogue; [`filter`] and [`socket`] talk to one adapter;
//! [`task`] correlates commands with their completion events; [`helpers`]
//! packages common command/event sequences as named recipes; [`worker`]
//! and [`coordinator`] run one scenario per adapter as its own OS process
//! and fan their results back in.

pub mod codec;
pub mod command;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod filter;
pub mod framing;
pub mod helpers;
pub mod logging;
pub mod socket;
pub mod task;
pub mod worker;

pub use coordinator::{Coordinator, ScenarioConfig};
pub use error::{HciError, Result};
pub use task::HciTask;
pub use worker::{WorkerContext, WorkerMain};
