use colored::{ColoredString, Colorize};
use std::collections::BTreeMap;

use crate::models::{ZoneBands, ZoneKey, ZoneTimes};

/// Hex color per zone
pub const ZONE_COLORS: [(ZoneKey, &str); 6] = [
    (ZoneKey::Zone1, "#3A86FF"),
    (ZoneKey::Zone2, "#4CB944"),
    (ZoneKey::Zone3, "#FFD60A"),
    (ZoneKey::Zone4, "#FF9E0A"),
    (ZoneKey::Zone5, "#FF0000"),
    (ZoneKey::Below, "#AAAAAA"),
];

/// Display label per zone
pub const ZONE_LABELS: [(ZoneKey, &str); 6] = [
    (ZoneKey::Zone1, "Zone 1 - Very Light"),
    (ZoneKey::Zone2, "Zone 2 - Light"),
    (ZoneKey::Zone3, "Zone 3 - Moderate"),
    (ZoneKey::Zone4, "Zone 4 - Hard"),
    (ZoneKey::Zone5, "Zone 5 - Maximum"),
    (ZoneKey::Below, "Below Zone 1"),
];

pub fn zone_color(key: ZoneKey) -> &'static str {
    lookup(&ZONE_COLORS, key)
}

pub fn zone_label(key: ZoneKey) -> &'static str {
    lookup(&ZONE_LABELS, key)
}

fn lookup(table: &[(ZoneKey, &'static str); 6], key: ZoneKey) -> &'static str {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, value)| *value)
        .unwrap_or_default()
}

/// Label with the bpm range taken from the bands actually in use
pub fn label_with_range(key: ZoneKey, bands: &ZoneBands) -> String {
    let label = zone_label(key);
    match key {
        ZoneKey::Below => format!("{} (<{} bpm)", label, bands.zone1.min),
        ZoneKey::Zone5 => format!("{} ({}+ bpm)", label, bands.zone5.min),
        _ => match bands.band(key) {
            Some(band) => format!("{} ({}-{} bpm)", label, band.min, band.max),
            None => label.to_string(),
        },
    }
}

/// `"{H}h {M}m"`, or `"{M}m"` under an hour. Seconds are floored away.
pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let minutes = minutes % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Formatted duration for every zone key (`total` excluded)
pub fn format_zone_times(times: &ZoneTimes) -> BTreeMap<ZoneKey, String> {
    ZoneKey::ALL
        .iter()
        .map(|&key| (key, format_duration(times.get(key))))
        .collect()
}

fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Terminal text in the zone's color
pub fn paint(key: ZoneKey, text: &str) -> ColoredString {
    match hex_to_rgb(zone_color(key)) {
        Some((r, g, b)) => text.truecolor(r, g, b),
        None => text.normal(),
    }
}
