//! Automapper: turns observed room output into store updates.
//!
//! Two ingestion paths feed the same [`RoomStore`]:
//!
//! 1. **Structured**: complete room records (`RoomUpdate`) from an
//!    out-of-band channel. Validated and written directly.
//! 2. **Text**: a scraper over raw session lines, driven by the commands the
//!    player sends.
//!
//! A session latches onto whichever path it sees first; the other is ignored
//! until [`AutoMapper::reset_session`].
//!
//! # Text capture
//!
//! ```text
//! Idle ──move/look──▶ AwaitingRoomName ──name──▶ AwaitingExitsOrDescription
//!   ▲                                              │ description lines
//!   │                                              ▼
//!   └──────────── commit ◀── exits line ◀──────────┘
//!                   ▲
//!                   └── LegacyExits ("north - Town Square" lines)
//! ```
//!
//! The line transition is the pure function [`next_state`]. Anything that
//! breaks synchronization (a room name that doesn't match the room we
//! expected, a second command before the first finished, a prompt while
//! still capturing) drops the capture without writing anything.

use crate::config::MapperConfig;
use crate::directions;
use crate::store::{Exit, MapError, RoomId, RoomStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Structured updates ──────────────────────────────────────────────────

/// Door state reported by the structured channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorStatus {
    #[default]
    Open,
    Closed,
    Locked,
}

/// One exit of a structured room record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitUpdate {
    pub destination: Option<RoomId>,
    pub is_door: bool,
    pub door_status: DoorStatus,
    pub door_name: String,
}

/// A complete room record from the structured channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUpdate {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default, rename = "type")]
    pub room_type: String,
    #[serde(default)]
    pub exits: BTreeMap<String, ExitUpdate>,
}

/// Write a structured room record into the store.
///
/// Exits missing from the record are removed; a door's lock capability
/// survives an unlocked report. Returns `true` if anything changed.
pub fn apply_room_update(store: &mut RoomStore, update: &RoomUpdate) -> Result<bool, MapError> {
    if update.id == 0 {
        return Err(MapError::InvalidRoomId(update.id));
    }
    if update.name.trim().is_empty() {
        return Err(MapError::EmptyName(update.id));
    }
    for exit in update.exits.values() {
        if exit.destination == Some(0) {
            return Err(MapError::InvalidRoomId(0));
        }
    }

    let id = update.id;
    let mut changed = store.ensure_room(id, &update.zone);
    changed |= store.set_room_zone(id, &update.zone)?;
    changed |= store.set_room_name(id, update.name.trim())?;
    changed |= store.set_room_type(id, &update.room_type)?;

    let mut seen = Vec::with_capacity(update.exits.len());
    for (raw_dir, exit_update) in &update.exits {
        let dir = normalize_direction(raw_dir);
        let previous = store.room(id).and_then(|r| r.exit(&dir)).cloned();
        let was_lockable = previous.is_some_and(|e| e.is_lockable);
        let locked = exit_update.door_status == DoorStatus::Locked;
        let exit = Exit {
            destination: exit_update.destination,
            door_name: exit_update.door_name.clone(),
            is_door: exit_update.is_door,
            is_open: exit_update.is_door && exit_update.door_status == DoorStatus::Open,
            is_locked: locked,
            is_lockable: was_lockable || locked,
        };
        changed |= store.set_exit(id, &dir, exit)?;
        seen.push(dir);
    }

    let stale: Vec<String> = store
        .room(id)
        .map(|r| {
            r.exits
                .keys()
                .filter(|d| !seen.contains(d))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for dir in stale {
        changed |= store.remove_exit(id, &dir)?;
    }
    Ok(changed)
}

fn normalize_direction(raw: &str) -> String {
    match directions::canonical(raw) {
        Some(dir) => dir.to_string(),
        None => raw.trim().to_lowercase(),
    }
}

// ── Text capture state ──────────────────────────────────────────────────

/// An exit token read from an exits line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedExit {
    pub direction: String,
    /// `None` for a plain token, otherwise the door state its brackets show.
    pub door: Option<DoorStatus>,
}

/// Everything gathered for one room while it is being captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub from_room: Option<RoomId>,
    /// Empty for a look.
    pub direction: String,
    pub destination: RoomId,
    /// The destination id was freshly minted and the room doesn't exist yet.
    pub is_new: bool,
    pub expected_name: Option<String>,
    pub name: String,
    pub description: Vec<String>,
    pub exits: Vec<ObservedExit>,
    /// (direction, destination room name) from the old exit listing.
    pub legacy: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CaptureState {
    #[default]
    Idle,
    AwaitingRoomName(Capture),
    AwaitingExitsOrDescription(Capture),
    LegacyExits(Capture),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, CaptureState::Idle)
    }

    fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingRoomName(_) => "awaiting room name",
            CaptureState::AwaitingExitsOrDescription(_) => "awaiting exits",
            CaptureState::LegacyExits(_) => "reading exit list",
        }
    }
}

/// Result of feeding one line to the capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Continue(CaptureState),
    /// The room is complete and can be written.
    Commit(Capture),
    /// Synchronization lost; nothing may be written.
    Abort(String),
}

/// Advance the capture by one session line.
pub fn next_state(state: CaptureState, line: &str, config: &MapperConfig) -> LineOutcome {
    match state {
        CaptureState::Idle => LineOutcome::Continue(CaptureState::Idle),
        CaptureState::AwaitingRoomName(mut capture) => {
            let name = line.trim();
            if name.is_empty() || config.is_skip_line(name) {
                return LineOutcome::Continue(CaptureState::AwaitingRoomName(capture));
            }
            if let Some(expected) = &capture.expected_name {
                if expected != name {
                    return LineOutcome::Abort(format!(
                        "expected room '{}' but saw '{}'",
                        expected, name
                    ));
                }
            }
            capture.name = name.to_string();
            LineOutcome::Continue(CaptureState::AwaitingExitsOrDescription(capture))
        }
        CaptureState::AwaitingExitsOrDescription(mut capture) => {
            if let Some(payload) = config.exits_payload(line) {
                if is_blank_payload(payload) {
                    return LineOutcome::Continue(CaptureState::LegacyExits(capture));
                }
                capture.exits = parse_exit_tokens(payload, config);
                return LineOutcome::Commit(capture);
            }
            let text = line.trim();
            if !text.is_empty() {
                capture.description.push(text.to_string());
            }
            LineOutcome::Continue(CaptureState::AwaitingExitsOrDescription(capture))
        }
        CaptureState::LegacyExits(mut capture) => match parse_legacy_exit(line, config) {
            Some((direction, room_name)) => {
                capture.exits.push(ObservedExit {
                    direction: direction.clone(),
                    door: None,
                });
                capture.legacy.push((direction, room_name));
                LineOutcome::Continue(CaptureState::LegacyExits(capture))
            }
            None if line.trim().is_empty() && capture.legacy.is_empty() => {
                LineOutcome::Continue(CaptureState::LegacyExits(capture))
            }
            None => LineOutcome::Commit(capture),
        },
    }
}

fn is_blank_payload(payload: &str) -> bool {
    payload
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, ']' | '.' | ':'))
}

/// Split an exits payload into directions. `[north]` is a locked door,
/// `(north)` a closed one. Unknown words (`none`) are skipped.
pub fn parse_exit_tokens(payload: &str, config: &MapperConfig) -> Vec<ObservedExit> {
    let mut exits = Vec::new();
    for token in payload.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token.trim_end_matches('.');
        if token.is_empty() {
            continue;
        }
        let door = if token.starts_with('[') {
            Some(DoorStatus::Locked)
        } else if token.starts_with('(') {
            Some(DoorStatus::Closed)
        } else {
            None
        };
        let bare = token.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | '.'));
        if let Some(direction) = config.exit_direction(bare) {
            if !exits.iter().any(|e: &ObservedExit| e.direction == direction) {
                exits.push(ObservedExit { direction, door });
            }
        }
    }
    exits
}

/// Parse `North - Town Square` style lines.
pub fn parse_legacy_exit(line: &str, config: &MapperConfig) -> Option<(String, String)> {
    let (dir, name) = line.split_once('-')?;
    let direction = config.exit_direction(dir.trim())?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((direction, name.to_string()))
}

// ── AutoMapper ──────────────────────────────────────────────────────────

/// Which ingestion path owns the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IngestMode {
    #[default]
    Undecided,
    Structured,
    Text,
}

/// "Current room changed" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomChange {
    pub from: Option<RoomId>,
    pub to: RoomId,
    /// Direction walked, empty when unknown (auto-move, teleport).
    pub direction: String,
}

#[derive(Debug, Clone, Default)]
pub struct AutoMapper {
    config: MapperConfig,
    state: CaptureState,
    current_room: Option<RoomId>,
    mode: IngestMode,
}

impl AutoMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.current_room
    }

    /// Place the player manually, e.g. after a teleport or on load.
    pub fn set_current_room(&mut self, room: Option<RoomId>) {
        self.current_room = room;
        self.state = CaptureState::Idle;
    }

    /// Forget the ingestion latch and any capture in flight (reconnect).
    pub fn reset_session(&mut self) {
        self.state = CaptureState::Idle;
        self.mode = IngestMode::Undecided;
    }

    /// Structured path: apply a complete room record and move there.
    pub fn handle_room_update(
        &mut self,
        store: &mut RoomStore,
        update: &RoomUpdate,
    ) -> Result<Option<RoomChange>, MapError> {
        if self.mode == IngestMode::Text {
            log::debug!("Ignoring structured update for #{}: text mapping active", update.id);
            return Ok(None);
        }
        self.mode = IngestMode::Structured;
        self.state = CaptureState::Idle;

        if apply_room_update(store, update)? {
            log::debug!("Room #{} updated from structured event", update.id);
        }
        Ok(self.move_to(store, update.id, None))
    }

    /// A command left the client. Starts a capture for movement and look
    /// commands that were echoed.
    pub fn handle_command(&mut self, store: &mut RoomStore, command: &str, echoed: bool) {
        if !echoed || self.mode == IngestMode::Structured {
            return;
        }
        let direction = if self.config.is_look_command(command) {
            String::new()
        } else {
            match self.config.movement_direction(command) {
                Some(dir) => dir,
                None => return,
            }
        };

        if !self.state.is_idle() {
            log::warn!(
                "Moving too quickly: '{}' sent while {}; dropping capture",
                command.trim(),
                self.state.name()
            );
            self.state = CaptureState::Idle;
            self.lose_position();
            return;
        }

        self.mode = IngestMode::Text;
        let from = self.current_room;
        let known = if direction.is_empty() {
            from
        } else {
            from.and_then(|f| store.room(f))
                .and_then(|r| r.exit(&direction))
                .and_then(|e| e.destination)
        };
        let (destination, is_new) = match known {
            Some(id) => (id, false),
            None => (store.mint_room_id(), true),
        };
        let expected_name = if is_new {
            None
        } else {
            store
                .room(destination)
                .map(|r| r.name.clone())
                .filter(|n| !n.is_empty())
        };

        self.state = CaptureState::AwaitingRoomName(Capture {
            from_room: from,
            direction,
            destination,
            is_new,
            expected_name,
            ..Capture::default()
        });
    }

    /// A complete line of session text.
    pub fn handle_line(&mut self, store: &mut RoomStore, line: &str) -> Option<RoomChange> {
        if self.state.is_idle() {
            return None;
        }
        let state = std::mem::take(&mut self.state);
        match next_state(state, line, &self.config) {
            LineOutcome::Continue(next) => {
                self.state = next;
                None
            }
            LineOutcome::Commit(capture) => self.commit(store, capture),
            LineOutcome::Abort(reason) => {
                log::warn!("Automapper lost sync: {}", reason);
                self.lose_position();
                None
            }
        }
    }

    /// A prompt arrived. Finishes an exit listing; any other unfinished
    /// capture has stalled and is dropped.
    pub fn handle_prompt(&mut self, store: &mut RoomStore) -> Option<RoomChange> {
        match std::mem::take(&mut self.state) {
            CaptureState::Idle => None,
            CaptureState::LegacyExits(capture) => self.commit(store, capture),
            stalled => {
                log::warn!("Prompt received while {}; dropping capture", stalled.name());
                None
            }
        }
    }

    /// The player may be anywhere now. No exit is linked from a guessed
    /// origin until a room is identified again.
    fn lose_position(&mut self) {
        if let Some(room) = self.current_room.take() {
            log::debug!("Position unknown, last seen in #{}", room);
        }
    }

    fn commit(&mut self, store: &mut RoomStore, capture: Capture) -> Option<RoomChange> {
        if let Err(e) = self.write_capture(store, &capture) {
            log::warn!("Automapper could not record room #{}: {}", capture.destination, e);
            return None;
        }
        let direction = (!capture.direction.is_empty()).then_some(capture.direction.as_str());
        self.move_to(store, capture.destination, direction)
    }

    fn write_capture(&self, store: &mut RoomStore, capture: &Capture) -> Result<(), MapError> {
        let dest = capture.destination;
        if capture.is_new || !store.contains(dest) {
            let zone = capture
                .from_room
                .and_then(|f| store.zone_of(f))
                .map(str::to_string)
                .unwrap_or_else(|| self.config.default_zone.clone());
            store.ensure_room(dest, &zone);
        }

        if let Some(from) = capture.from_room {
            if !capture.direction.is_empty() && store.contains(from) {
                let mut exit = store
                    .room(from)
                    .and_then(|r| r.exit(&capture.direction))
                    .cloned()
                    .unwrap_or_default();
                exit.destination = Some(dest);
                store.set_exit(from, &capture.direction, exit)?;
            }
        }

        store.set_room_name(dest, &capture.name)?;
        if !capture.description.is_empty() {
            store.set_room_description(dest, &capture.description.join("\n"))?;
        }

        let back = directions::opposite(&capture.direction);
        for observed in &capture.exits {
            let mut exit = store
                .room(dest)
                .and_then(|r| r.exit(&observed.direction))
                .cloned()
                .unwrap_or_default();
            match observed.door {
                Some(DoorStatus::Locked) => {
                    exit.is_door = true;
                    exit.is_open = false;
                    exit.is_locked = true;
                    exit.is_lockable = true;
                }
                Some(DoorStatus::Closed) => {
                    exit.is_door = true;
                    exit.is_open = false;
                    exit.is_locked = false;
                }
                Some(DoorStatus::Open) | None => {
                    exit.is_open = exit.is_door;
                    exit.is_locked = false;
                }
            }
            if exit.destination.is_none() && back == Some(observed.direction.as_str()) {
                exit.destination = capture.from_room;
            }
            store.set_exit(dest, &observed.direction, exit)?;
        }

        for (direction, room_name) in &capture.legacy {
            self.name_legacy_destination(store, capture, direction, room_name)?;
        }
        Ok(())
    }

    fn name_legacy_destination(
        &self,
        store: &mut RoomStore,
        capture: &Capture,
        direction: &str,
        room_name: &str,
    ) -> Result<(), MapError> {
        let dest = capture.destination;
        let target = store
            .room(dest)
            .and_then(|r| r.exit(direction))
            .and_then(|e| e.destination);

        match target {
            Some(target) => {
                let current = store.room(target).map(|r| r.name.clone()).unwrap_or_default();
                if current.is_empty() {
                    store.set_room_name(target, room_name)?;
                } else if current != room_name {
                    log::warn!(
                        "Room #{} is '{}' but the exit list of #{} calls it '{}'",
                        target,
                        current,
                        dest,
                        room_name
                    );
                }
            }
            None => {
                let zone = store.zone_of(dest).unwrap_or_default().to_string();
                let target = store.create_room(&zone);
                store.set_room_name(target, room_name)?;
                let mut exit = store
                    .room(dest)
                    .and_then(|r| r.exit(direction))
                    .cloned()
                    .unwrap_or_default();
                exit.destination = Some(target);
                store.set_exit(dest, direction, exit)?;
            }
        }
        Ok(())
    }

    fn move_to(
        &mut self,
        store: &RoomStore,
        room: RoomId,
        direction: Option<&str>,
    ) -> Option<RoomChange> {
        let from = self.current_room;
        if from == Some(room) {
            return None;
        }
        self.current_room = Some(room);
        let direction = match direction {
            Some(dir) => dir.to_string(),
            None => from
                .and_then(|f| store.room(f))
                .and_then(|r| r.direction_to(room))
                .unwrap_or_default()
                .to_string(),
        };
        Some(RoomChange {
            from,
            to: room,
            direction,
        })
    }
}
