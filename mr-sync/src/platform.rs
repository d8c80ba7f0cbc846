// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Traits that decouple the reconciler from the host it runs on. This lets
//! the reconciliation logic be tested without podman, iproute2 or a kernel
//! routing table.

use crate::{route::Route, Error};
use mr_common::net::Family;

/// The source of desired routes: the subnets mesh peers advertise and the
/// address each one is reached at.
#[allow(async_fn_in_trait)]
pub trait PeerEnumerator {
    async fn list_peer_routes(&self) -> Result<Vec<Route>, Error>;
}

/// A numbered policy routing table and the rule that selects it.
#[allow(async_fn_in_trait)]
pub trait RoutingTableGateway {
    /// Address families this gateway lists and manages.
    fn families(&self) -> &[Family];

    async fn list_installed_routes(
        &self,
        table: u32,
    ) -> Result<Vec<Route>, Error>;

    async fn add_route(&self, route: &Route, table: u32) -> Result<(), Error>;

    async fn remove_route(&self, route: &Route, table: u32)
        -> Result<(), Error>;

    /// Make sure a policy rule directs lookups through `table`. Returns true
    /// when a rule had to be created.
    async fn ensure_policy_rule(&self, table: u32) -> Result<bool, Error>;
}

/// Runs an external program and hands back its stdout.
#[allow(async_fn_in_trait)]
pub trait Exec {
    async fn exec(&self, program: &str, args: &[&str]) -> Result<String, Error>;
}

/// Production exec that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExec;

impl Exec for SystemExec {
    async fn exec(&self, program: &str, args: &[&str]) -> Result<String, Error> {
        let out = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| Error::Spawn {
                program: program.to_string(),
                err,
            })?;

        if !out.status.success() {
            return Err(Error::Command {
                command: command_line(program, args),
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

pub(crate) fn command_line(program: &str, args: &[&str]) -> String {
    let mut s = program.to_string();
    for a in args {
        s.push(' ');
        s.push_str(a);
    }
    s
}
