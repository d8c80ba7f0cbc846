// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

macro_rules! sync_log {
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_SYNC,
            "unit" => UNIT_RECONCILE,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_SYNC,
            "unit" => UNIT_RECONCILE,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_SYNC,
            "unit" => UNIT_RECONCILE
        )
    };
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_SYNC,
            "unit" => UNIT_RECONCILE,
        )
    };
}

macro_rules! table_log {
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_TABLE,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_TABLE,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_TABLE
        )
    };
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_TABLE,
        )
    };
}

macro_rules! peer_log {
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_PEERS,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr; $($key:expr => $value:expr),*) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_PEERS,
            $($key => $value),*
        )
    };
    ($log:expr, $level:ident, $msg:expr) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_PEERS
        )
    };
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_MR_SYNC,
            "module" => crate::MOD_PLATFORM,
            "unit" => UNIT_PEERS,
        )
    };
}

pub(crate) use {peer_log, sync_log, table_log};
