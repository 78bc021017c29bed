//! Plain-text rendering of the lobby, the seating table and the chat transcript.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::RoomSummary;
use crate::entities::{ChatMessage, Player};
use crate::layout::{Surface, initials, seat_positions};
use crate::sync::{RoomState, SyncStatus, SyncView};
use crate::utils::{format_timestamp, role_color, role_marker, truncate};

/// Character grid the table is drawn on.
pub const TABLE_COLS: usize = 56;
pub const TABLE_ROWS: usize = 17;

const ROOM_NAME_WIDTH: usize = 24;

type Cell = (char, Option<&'static str>);

/// Wrap `text` in a 24-bit ANSI foreground color given as `#rrggbb`.
#[must_use]
pub fn paint(text: &str, hex: &str) -> String {
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .unwrap_or(0x88)
    };
    format!(
        "\x1b[38;2;{};{};{}m{text}\x1b[0m",
        channel(1..3),
        channel(3..5),
        channel(5..7)
    )
}

fn seat_label(player: &Player, viewer: Option<Uuid>) -> String {
    let mut label = initials(&player.username);
    if !player.is_alive {
        label = label.to_lowercase();
    }
    if viewer == Some(player.user_id) {
        label.push('*');
    }
    label
}

fn put(grid: &mut [Vec<Cell>], row: usize, col: usize, text: &str, color: Option<&'static str>) {
    let Some(line) = grid.get_mut(row) else {
        return;
    };
    for (offset, ch) in text.chars().enumerate() {
        if let Some(cell) = line.get_mut(col + offset) {
            *cell = (ch, color);
        }
    }
}

/// Seats drawn clockwise from the top around the table center. The viewer's seat is
/// starred; dead players are shown in lowercase.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn render_table(state: &RoomState, viewer: Option<Uuid>, color: bool) -> String {
    // Terminal cells are about twice as tall as wide.
    let surface = Surface::new(TABLE_COLS as f64, (TABLE_ROWS * 2) as f64);
    let Ok(seats) = seat_positions(state.players.len(), surface) else {
        return "(table not ready)\n".to_string();
    };

    let mut grid: Vec<Vec<Cell>> = vec![vec![(' ', None); TABLE_COLS]; TABLE_ROWS];

    let center = surface.center();
    let caption = format!(
        "{} {}",
        state.room.display_phase().as_str().to_uppercase(),
        state.room.display_round()
    );
    let row = (center.y / 2.0) as usize;
    let col = (center.x as usize).saturating_sub(caption.chars().count() / 2);
    put(&mut grid, row, col, &caption, None);

    for (player, point) in state.players.iter().zip(&seats) {
        let label = seat_label(player, viewer);
        let row = (point.y / 2.0).round().max(0.0) as usize;
        let col = (point.x.round().max(0.0) as usize).saturating_sub(label.chars().count() / 2);
        let paint_with = color.then(|| role_color(player.role.as_deref()));
        put(&mut grid, row.min(TABLE_ROWS - 1), col, &label, paint_with);
    }

    let mut out = String::new();
    for line in grid {
        let mut text = String::new();
        for (ch, hex) in line {
            match hex {
                Some(hex) => text.push_str(&paint(&ch.to_string(), hex)),
                None => text.push(ch),
            }
        }
        out.push_str(text.trim_end());
        out.push('\n');
    }
    out
}

/// Numbered seat list matching the table.
#[must_use]
pub fn render_roster(state: &RoomState, viewer: Option<Uuid>) -> String {
    let mut out = String::new();
    for (seat, player) in state.players.iter().enumerate() {
        let _ = write!(
            out,
            "{:>2}. {:<3} {}",
            seat + 1,
            seat_label(player, viewer),
            player.username
        );
        let marker = role_marker(player.role.as_deref());
        if !marker.is_empty() {
            let _ = write!(out, " {marker}");
        }
        if state.room.is_host(player.user_id) {
            out.push_str(" (host)");
        }
        if !player.is_alive {
            out.push_str(" (dead)");
        }
        out.push('\n');
    }
    out
}

/// One line per message: `[time] name: text`.
#[must_use]
pub fn render_transcript(messages: &[ChatMessage], now: DateTime<Utc>) -> String {
    if messages.is_empty() {
        return "No messages yet.\n".to_string();
    }
    let mut out = String::new();
    for message in messages {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            format_timestamp(&message.created_at, &now),
            message.username,
            message.message
        );
    }
    out
}

/// Header, table, roster and transcript for one synchronizer view.
#[must_use]
pub fn render_room(
    view: &SyncView<RoomState>,
    viewer: Option<Uuid>,
    now: DateTime<Utc>,
    color: bool,
) -> String {
    let Some(state) = view.state.as_ref() else {
        return match &view.status {
            SyncStatus::Degraded(reason) => format!("Could not load room: {reason}\n"),
            _ => "Loading room...\n".to_string(),
        };
    };

    let room = &state.room;
    let mut out = format!(
        "{} [{}] {} - {} players / max {}\n",
        room.name,
        room.code,
        room.status,
        state.players.len(),
        room.max_players
    );
    if let SyncStatus::Degraded(reason) = &view.status {
        let _ = writeln!(out, "(showing last known state: {reason})");
    }
    out.push('\n');
    out.push_str(&render_table(state, viewer, color));
    out.push('\n');
    out.push_str(&render_roster(state, viewer));
    out.push_str("\n--- chat ---\n");
    out.push_str(&render_transcript(&state.messages, now));
    out
}

/// One line per waiting room.
#[must_use]
pub fn render_lobby(rooms: &[RoomSummary]) -> String {
    if rooms.is_empty() {
        return "No open rooms. Create one with `mafia-nights create-room`.\n".to_string();
    }
    let mut out = String::new();
    for summary in rooms {
        let _ = write!(
            out,
            "{}  {:<width$}  {}/{}",
            summary.room.code,
            truncate(&summary.room.name, ROOM_NAME_WIDTH),
            summary.current_players,
            summary.room.max_players,
            width = ROOM_NAME_WIDTH + 3
        );
        if summary.is_full() {
            out.push_str("  FULL");
        }
        out.push('\n');
    }
    out
}
