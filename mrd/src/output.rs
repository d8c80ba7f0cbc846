// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use colored::Colorize;
use mr_sync::{Failure, Plan, ReconcileReport};
use std::io::{Result, Write};
use tabwriter::TabWriter;

pub(crate) fn print_plan<W: Write>(w: W, plan: &Plan, table: u32) -> Result<()> {
    let mut tw = TabWriter::new(w);

    if plan.diff.is_empty() && plan.conflicts.is_empty() {
        writeln!(&mut tw, "table {table} is up to date")?;
        return tw.flush();
    }

    writeln!(
        &mut tw,
        "{}\t{}\t{}",
        "Action".dimmed(),
        "Destination".dimmed(),
        "Nexthop".dimmed(),
    )?;
    for r in &plan.diff.to_remove {
        writeln!(&mut tw, "{}\t{}\t{}", "remove".red(), r.destination(), r.nexthop())?;
    }
    for r in &plan.diff.to_add {
        writeln!(&mut tw, "{}\t{}\t{}", "add".green(), r.destination(), r.nexthop())?;
    }
    for c in &plan.conflicts {
        let nexthops: Vec<String> =
            c.nexthops.iter().map(|x| x.to_string()).collect();
        writeln!(
            &mut tw,
            "{}\t{}\t{}",
            "hold".yellow(),
            c.destination,
            nexthops.join(",")
        )?;
    }
    tw.flush()
}

pub(crate) fn print_report<W: Write>(
    w: W,
    report: &ReconcileReport,
) -> Result<()> {
    let mut tw = TabWriter::new(w);

    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "Action".dimmed(),
        "Destination".dimmed(),
        "Nexthop".dimmed(),
        "Result".dimmed(),
    )?;
    for r in &report.removed {
        writeln!(&mut tw, "remove\t{}\t{}\t{}", r.destination(), r.nexthop(), "ok".green())?;
    }
    for r in &report.added {
        writeln!(&mut tw, "add\t{}\t{}\t{}", r.destination(), r.nexthop(), "ok".green())?;
    }
    for f in &report.failures {
        match f {
            Failure::Add { route, error } => writeln!(
                &mut tw,
                "add\t{}\t{}\t{}",
                route.destination(),
                route.nexthop(),
                error.red()
            )?,
            Failure::Remove { route, error } => writeln!(
                &mut tw,
                "remove\t{}\t{}\t{}",
                route.destination(),
                route.nexthop(),
                error.red()
            )?,
            Failure::Conflict(c) => {
                let nexthops: Vec<String> =
                    c.nexthops.iter().map(|x| x.to_string()).collect();
                writeln!(
                    &mut tw,
                    "hold\t{}\t{}\t{}",
                    c.destination,
                    nexthops.join(","),
                    "conflicting advertisements".yellow()
                )?
            }
            Failure::PolicyRule { table, error } => writeln!(
                &mut tw,
                "rule\ttable {}\t-\t{}",
                table,
                error.red()
            )?,
        }
    }
    writeln!(
        &mut tw,
        "table {}: {} added, {} removed, {} failed{}",
        report.table,
        report.added.len(),
        report.removed.len(),
        report.failures.len(),
        if report.rule_created {
            ", policy rule created"
        } else {
            ""
        }
    )?;
    tw.flush()
}
