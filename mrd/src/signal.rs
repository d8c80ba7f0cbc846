// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::log::sig_log;
use slog::Logger;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::Sender;

const UNIT_SIG: &str = "signal";

/// What woke the daemon loop up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Timer,
    OnDemand,
    Shutdown,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::OnDemand => write!(f, "on-demand"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What the signal task does with a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalAction {
    Forward(Trigger),
    Exit,
}

/// Tracks shutdown requests. The first one is forwarded so the loop can
/// finish its pass; a second one means the pass is stuck and the process
/// exits.
#[derive(Debug, Default)]
pub(crate) struct ShutdownLatch {
    requested: bool,
}

impl ShutdownLatch {
    pub(crate) fn action(&mut self, trigger: Trigger) -> SignalAction {
        if trigger != Trigger::Shutdown {
            return SignalAction::Forward(trigger);
        }
        if self.requested {
            return SignalAction::Exit;
        }
        self.requested = true;
        SignalAction::Forward(trigger)
    }
}

/// Forward SIGUSR1 as an on-demand pass and SIGINT/SIGTERM as shutdown. The
/// task stays up after the first shutdown so a repeated SIGINT/SIGTERM is
/// not swallowed.
pub(crate) fn handle_signals(
    tx: Sender<Trigger>,
    log: Logger,
) -> anyhow::Result<()> {
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        let mut latch = ShutdownLatch::default();
        loop {
            let trigger = tokio::select! {
                _ = sigusr1.recv() => Trigger::OnDemand,
                _ = sigterm.recv() => Trigger::Shutdown,
                _ = sigint.recv() => Trigger::Shutdown,
            };
            sig_log!(log, info, "received signal";
                "trigger" => trigger.to_string()
            );
            match latch.action(trigger) {
                SignalAction::Forward(t) => {
                    // Never block here; a later shutdown must get through.
                    if let Err(e) = tx.try_send(t) {
                        sig_log!(log, warn, "dropped trigger: {e}";
                            "trigger" => t.to_string()
                        );
                    }
                }
                SignalAction::Exit => {
                    sig_log!(log, warn, "second shutdown signal, exiting now");
                    std::process::exit(1);
                }
            }
        }
    });
    Ok(())
}
