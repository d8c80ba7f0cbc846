// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::log::dlog;
use crate::signal::Trigger;
use mr_sync::{
    PeerEnumerator, ReconcileReport, Reconciler, RoutingTableGateway,
};
use slog::Logger;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::MissedTickBehavior;

const UNIT_DAEMON: &str = "daemon";

/// Reconcile once, then on every tick of `interval` and whenever a trigger
/// arrives, until a shutdown trigger. Passes run one at a time on this task; a
/// trigger that arrives mid-pass waits for the pass to finish.
pub(crate) async fn run<P, G>(
    r: &Reconciler<P, G>,
    interval: Duration,
    mut triggers: Receiver<Trigger>,
    log: &Logger,
) -> usize
where
    P: PeerEnumerator,
    G: RoutingTableGateway,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    dlog!(log,
        info,
        "reconciling table {} every {}",
        r.table_id(), humantime::format_duration(interval);
        "table" => r.table_id()
    );

    // The first tick completes immediately; the first pass runs before any
    // queued trigger is looked at.
    ticker.tick().await;
    pass(r, Trigger::Timer, log).await;

    let mut passes = 1;
    loop {
        let trigger = tokio::select! {
            biased;
            _ = ticker.tick() => Trigger::Timer,
            t = triggers.recv() => t.unwrap_or(Trigger::Shutdown),
        };
        if trigger == Trigger::Shutdown {
            break;
        }
        pass(r, trigger, log).await;
        passes += 1;
    }

    dlog!(log, info, "shutting down after {} passes", passes);
    passes
}

/// One logged reconciliation pass.
pub(crate) async fn pass<P, G>(
    r: &Reconciler<P, G>,
    trigger: Trigger,
    log: &Logger,
) -> Option<ReconcileReport>
where
    P: PeerEnumerator,
    G: RoutingTableGateway,
{
    match r.reconcile().await {
        Ok(report) => {
            for f in &report.failures {
                dlog!(log, warn, "{f}"; "trigger" => trigger.to_string());
            }
            dlog!(log,
                info,
                "{} pass finished", trigger;
                "added" => report.added.len(),
                "removed" => report.removed.len(),
                "failures" => report.failures.len()
            );
            Some(report)
        }
        Err(e) => {
            dlog!(log,
                error,
                "{} pass aborted: {e}", trigger;
                "error" => format!("{e}")
            );
            None
        }
    }
}
