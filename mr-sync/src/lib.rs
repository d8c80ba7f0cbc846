// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keeps a host policy routing table in step with the subnets mesh peers
//! advertise.
//!
//! Each pass reads the desired routes from a [`PeerEnumerator`] and the
//! installed routes from a [`RoutingTableGateway`], then applies the minimal
//! set of removals and additions. Passes hold no state of their own; the
//! table is the only record between runs.

use crate::log::sync_log;
use route::{ActualSet, Conflict, DesiredSet, Diff};
use slog::Logger;

pub use error::{Error, ReconcileError};
pub use platform::{Exec, PeerEnumerator, RoutingTableGateway, SystemExec};
pub use route::Route;

pub mod error;
pub mod iproute;
mod log;
pub mod platform;
pub mod podman;
pub mod route;


pub const COMPONENT_MR_SYNC: &str = "mr-sync";
pub const MOD_SYNC: &str = "sync";
pub const MOD_PLATFORM: &str = "platform";
const UNIT_RECONCILE: &str = "reconcile";

pub const DEFAULT_TABLE: u32 = 100;

/// The outcome of the query and diff phases of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub diff: Diff,
    pub conflicts: Vec<Conflict>,
}

/// A change that could not be made during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Add { route: Route, error: String },
    Remove { route: Route, error: String },
    Conflict(Conflict),
    PolicyRule { table: u32, error: String },
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add { route, error } => write!(f, "add {route}: {error}"),
            Self::Remove { route, error } => {
                write!(f, "remove {route}: {error}")
            }
            Self::Conflict(c) => write!(f, "conflict: {c}"),
            Self::PolicyRule { table, error } => {
                write!(f, "policy rule for table {table}: {error}")
            }
        }
    }
}

/// Everything a pass attempted, and how it went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub table: u32,
    pub added: Vec<Route>,
    pub removed: Vec<Route>,
    pub failures: Vec<Failure>,
    pub rule_created: bool,
}

impl ReconcileReport {
    fn new(table: u32) -> Self {
        Self {
            table,
            ..Default::default()
        }
    }

    /// True when every attempted change succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn changes(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Converges one routing table on the routes advertised by the peers.
pub struct Reconciler<P, G> {
    peers: P,
    table: G,
    table_id: u32,
    log: Logger,
}

impl<P: PeerEnumerator, G: RoutingTableGateway> Reconciler<P, G> {
    pub fn new(peers: P, table: G, table_id: u32, log: Logger) -> Self {
        Self {
            peers,
            table,
            table_id,
            log,
        }
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn peers(&self) -> &P {
        &self.peers
    }

    pub fn gateway(&self) -> &G {
        &self.table
    }

    /// Run the query and diff phases without touching the table.
    pub async fn plan(&self) -> Result<Plan, ReconcileError> {
        let advertised = self.peers.list_peer_routes().await.map_err(|e| {
            sync_log!(self.log,
                error,
                "peer query failed, skipping pass: {e}";
                "error" => format!("{e}")
            );
            ReconcileError::PeerQueryFailed(e)
        })?;

        let installed = self
            .table
            .list_installed_routes(self.table_id)
            .await
            .map_err(|e| {
                sync_log!(self.log,
                    error,
                    "reading table {} failed, skipping pass: {e}", self.table_id;
                    "error" => format!("{e}")
                );
                ReconcileError::TableReadFailed {
                    table: self.table_id,
                    source: e,
                }
            })?;

        let families = self.table.families();
        let desired = DesiredSet::from_routes(advertised.into_iter().filter(|r| {
            if families.contains(&r.destination().family()) {
                return true;
            }
            sync_log!(self.log,
                warn,
                "ignoring {} route {r}, family not managed", r.destination().family();
                "route" => r.to_string()
            );
            false
        }));
        let actual = ActualSet::from_routes(installed);

        let conflicts: Vec<Conflict> = desired.conflicts().collect();
        for c in &conflicts {
            sync_log!(self.log,
                warn,
                "holding destination with conflicting advertisements: {c}";
                "destination" => c.destination.to_string()
            );
        }

        let diff = Diff::compute(&desired, &actual);
        sync_log!(self.log,
            debug,
            "planned {} additions and {} removals",
            diff.to_add.len(), diff.to_remove.len();
            "desired" => desired.len(),
            "actual" => actual.len()
        );

        Ok(Plan { diff, conflicts })
    }

    /// Run one full pass. Aborts only if the peers or the table cannot be
    /// read; individual add and remove failures end up in the report.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let plan = self.plan().await?;
        Ok(self.apply(plan).await)
    }

    /// Apply a plan. Removals go first so that a destination whose nexthop
    /// changed is free by the time its new route is added.
    pub async fn apply(&self, plan: Plan) -> ReconcileReport {
        let mut report = ReconcileReport::new(self.table_id);
        report
            .failures
            .extend(plan.conflicts.into_iter().map(Failure::Conflict));

        for route in plan.diff.to_remove {
            match self.table.remove_route(&route, self.table_id).await {
                Ok(()) => {
                    sync_log!(self.log,
                        info,
                        "removed route {route}";
                        "table" => self.table_id
                    );
                    report.removed.push(route);
                }
                Err(e) => {
                    sync_log!(self.log,
                        error,
                        "failed to remove route {route}: {e}";
                        "table" => self.table_id,
                        "error" => format!("{e}")
                    );
                    report.failures.push(Failure::Remove {
                        route,
                        error: e.to_string(),
                    });
                }
            }
        }

        for route in plan.diff.to_add {
            match self.table.add_route(&route, self.table_id).await {
                Ok(()) => {
                    sync_log!(self.log,
                        info,
                        "added route {route}";
                        "table" => self.table_id
                    );
                    report.added.push(route);
                }
                Err(e) => {
                    sync_log!(self.log,
                        error,
                        "failed to add route {route}: {e}";
                        "table" => self.table_id,
                        "error" => format!("{e}")
                    );
                    report.failures.push(Failure::Add {
                        route,
                        error: e.to_string(),
                    });
                }
            }
        }

        match self.table.ensure_policy_rule(self.table_id).await {
            Ok(created) => report.rule_created = created,
            Err(e) => {
                sync_log!(self.log,
                    error,
                    "failed to ensure policy rule: {e}";
                    "table" => self.table_id,
                    "error" => format!("{e}")
                );
                report.failures.push(Failure::PolicyRule {
                    table: self.table_id,
                    error: e.to_string(),
                });
            }
        }

        sync_log!(self.log,
            info,
            "pass complete: {} added, {} removed, {} failures",
            report.added.len(), report.removed.len(), report.failures.len();
            "table" => self.table_id
        );
        report
    }
}
