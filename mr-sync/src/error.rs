// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mr_common::net::IpPrefixParseError;

/// Failures of the collaborators a reconciliation pass talks to.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to run {program}: {err}")]
    Spawn {
        program: String,
        #[source]
        err: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("prefix parse error {0}")]
    Prefix(#[from] IpPrefixParseError),

    #[error("address parse error {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("address family mismatch: {0}")]
    AddressFamilyMismatch(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a reconciliation pass aborts before applying anything.
#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("peer query failed: {0}")]
    PeerQueryFailed(#[source] Error),

    #[error("routing table {table} read failed: {source}")]
    TableReadFailed {
        table: u32,
        #[source]
        source: Error,
    },
}
