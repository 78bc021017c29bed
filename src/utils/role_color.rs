/// Role badge colors (hex format)
pub const ROLE_COLORS: &[(&str, &str)] = &[
    ("mafia", "#ff0000"),
    ("doctor", "#00ff00"),
    ("police", "#0088ff"),
    ("citizen", "#888888"),
];

/// Color used for unassigned or unknown roles
pub const DEFAULT_ROLE_COLOR: &str = "#888888";

/// Badge color for a player's role
#[must_use]
pub fn role_color(role: Option<&str>) -> &'static str {
    let role = role.map(str::to_lowercase);
    let role = role.as_deref().unwrap_or("citizen");
    ROLE_COLORS
        .iter()
        .find(|(name, _)| *name == role)
        .map_or(DEFAULT_ROLE_COLOR, |&(_, color)| color)
}

/// Short marker shown next to special roles
#[must_use]
pub fn role_marker(role: Option<&str>) -> &'static str {
    match role.map(str::to_lowercase).as_deref() {
        Some("mafia") => "[M]",
        Some("police") => "[P]",
        Some("doctor") => "[D]",
        _ => "",
    }
}
