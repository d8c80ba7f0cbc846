// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anstyle::{Color, RgbColor, Style};

const GOLD: Color = Color::Rgb(RgbColor(245, 207, 101));
const GREEN: Color = Color::Rgb(RgbColor(72, 213, 151));
const PINK: Color = Color::Rgb(RgbColor(232, 104, 134));

/// Help and error styling shared by the command line tools.
pub fn cli_style() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .header(Style::new().bold().underline().fg_color(Some(GOLD)))
        .literal(Style::new().bold().fg_color(Some(GREEN)))
        .invalid(Style::new().bold().fg_color(Some(GREEN)))
        .valid(Style::new().bold().fg_color(Some(GREEN)))
        .usage(Style::new().bold().fg_color(Some(GOLD)))
        .error(Style::new().bold().fg_color(Some(PINK)))
}
