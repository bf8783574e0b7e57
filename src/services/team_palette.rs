/// Team names handed out by slot index.
pub const TEAM_NAMES: [&str; 8] = [
    "Red Dragons",
    "Blue Sharks",
    "Green Falcons",
    "Golden Tigers",
    "Purple Wolves",
    "Orange Phoenix",
    "Silver Foxes",
    "Black Panthers",
];

/// Team colors handed out by slot index.
pub const TEAM_COLORS: [&str; 8] = [
    "#EF4444", "#3B82F6", "#10B981", "#F59E0B", "#8B5CF6", "#F97316", "#94A3B8", "#1F2937",
];

pub const NEUTRAL_COLOR: &str = "#9CA3AF";

/// Spreadsheet style column label: 0 -> A, 25 -> Z, 26 -> AA.
pub fn slot_letter(slot: usize) -> String {
    let mut label = Vec::new();
    let mut n = slot + 1;

    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }

    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

pub fn team_name(slot: usize) -> String {
    match TEAM_NAMES.get(slot) {
        Some(name) => (*name).to_string(),
        None => format!("Team {}", slot_letter(slot)),
    }
}

pub fn team_color(slot: usize) -> String {
    TEAM_COLORS.get(slot).copied().unwrap_or(NEUTRAL_COLOR).to_string()
}

pub fn team_id(slot: usize) -> String {
    format!("team_{}", slot + 1)
}
