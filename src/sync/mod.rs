// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background reconciliation between the local and remote tiers.
//!
//! [`SyncWorker`] performs one run at a time; [`SyncScheduler`] drives it
//! on an interval. Both record every run in the sync ledger.

pub mod scheduler;
pub mod worker;

pub use scheduler::SyncScheduler;
pub use worker::{
    DirectionStats, RunSummary, SyncDirection, SyncRequest, SyncScope, SyncSettings, SyncWorker,
    TriggerOutcome,
};
