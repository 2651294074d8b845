//! Room graph store: rooms, exits, zones and the inter-zone exit index.
//!
//! The store is the durable data model. Rooms are created lazily the first
//! time anything references them and are never deleted. Every mutation
//! reports whether it changed anything, and only structural changes (exit
//! added, removed or re-targeted, zone membership) mark zones dirty for the
//! clique decomposer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Stable positive room identifier. `0` is never a valid room.
pub type RoomId = u32;

/// Errors from store edits that a caller must handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("room #{0} does not exist")]
    UnknownRoom(RoomId),

    #[error("invalid room id {0}")]
    InvalidRoomId(RoomId),

    #[error("room #{0} has an empty name")]
    EmptyName(RoomId),

    #[error("waypoint name must not be empty")]
    EmptyWaypointName,
}

/// A directed, possibly-doored connection out of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    /// Destination room, `None` while unexplored.
    pub destination: Option<RoomId>,
    pub door_name: String,
    pub is_door: bool,
    /// Door state only; plain exits are never marked open.
    pub is_open: bool,
    pub is_locked: bool,
    /// Sticky: stays set once the door has been seen locked.
    pub is_lockable: bool,
}

impl Exit {
    /// A plain exit leading to `destination`.
    pub fn to(destination: RoomId) -> Self {
        Self {
            destination: Some(destination),
            ..Self::default()
        }
    }

    /// A known direction whose destination has not been explored.
    pub fn unexplored() -> Self {
        Self::default()
    }
}

/// A single room record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub zone: String,
    pub room_type: String,
    /// direction name → exit
    pub exits: BTreeMap<String, Exit>,
}

impl Room {
    fn new(id: RoomId, zone: &str) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            zone: zone.to_string(),
            room_type: String::new(),
            exits: BTreeMap::new(),
        }
    }

    pub fn exit(&self, direction: &str) -> Option<&Exit> {
        self.exits.get(direction)
    }

    /// First direction (in name order) whose exit leads to `destination`.
    pub fn direction_to(&self, destination: RoomId) -> Option<&str> {
        self.exits
            .iter()
            .find(|(_, e)| e.destination == Some(destination))
            .map(|(dir, _)| dir.as_str())
    }

    /// Known destinations of all exits.
    pub fn neighbors(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.exits.values().filter_map(|e| e.destination)
    }

    /// Display label: the name, or `room #id` while unnamed.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("room #{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// A named partition of the room graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zone {
    /// Empty string is the "no zone" bucket.
    pub name: String,
    pub rooms: BTreeSet<RoomId>,
    /// other zone name → rooms of this zone with an exit into it
    pub exits_to: BTreeMap<String, BTreeSet<RoomId>>,
}

impl Zone {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Rooms of this zone with at least one exit leaving the zone.
    pub fn exit_rooms(&self) -> BTreeSet<RoomId> {
        self.exits_to.values().flatten().copied().collect()
    }

    /// Names of zones directly reachable from this one.
    pub fn connected_zones(&self) -> impl Iterator<Item = &str> {
        self.exits_to.keys().map(String::as_str)
    }
}

/// Zones awaiting clique recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    pub zones: BTreeSet<String>,
    /// Global force flag: every zone is stale.
    pub all: bool,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        !self.all && self.zones.is_empty()
    }
}

/// Summary counts for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub rooms: usize,
    pub zones: usize,
    pub exits: usize,
    pub unexplored_exits: usize,
    pub waypoints: usize,
}

/// In-memory room graph for one server profile.
#[derive(Debug, Clone, Default)]
pub struct RoomStore {
    rooms: BTreeMap<RoomId, Room>,
    zones: BTreeMap<String, Zone>,
    /// destination → rooms with an exit leading to it
    incoming: HashMap<RoomId, BTreeSet<RoomId>>,
    waypoints: BTreeMap<String, RoomId>,
    next_id: RoomId,
    dirty: DirtySet,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn contains(&self, id: RoomId) -> bool {
        self.rooms.contains_key(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.get(name)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Zone of a room, if the room exists.
    pub fn zone_of(&self, id: RoomId) -> Option<&str> {
        self.rooms.get(&id).map(|r| r.zone.as_str())
    }

    /// Rooms with an exit leading into `id`.
    pub fn incoming(&self, id: RoomId) -> impl Iterator<Item = RoomId> + '_ {
        self.incoming.get(&id).into_iter().flatten().copied()
    }

    /// Rooms of `zone` entered by an exit from another zone.
    pub fn entrance_rooms(&self, zone: &str) -> BTreeSet<RoomId> {
        let Some(z) = self.zones.get(zone) else {
            return BTreeSet::new();
        };
        z.rooms
            .iter()
            .copied()
            .filter(|id| {
                self.incoming(*id)
                    .any(|src| self.zone_of(src).is_some_and(|sz| sz != zone))
            })
            .collect()
    }

    /// Names of zones directly reachable from `zone`.
    pub fn connected_zones(&self, zone: &str) -> Vec<String> {
        self.zones
            .get(zone)
            .map(|z| z.connected_zones().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Rooms whose name (or name and description) contains every keyword.
    ///
    /// Matching is case-insensitive. `zone_filter` restricts results to one
    /// zone, also compared case-insensitively. Results are in id order.
    pub fn search_for_rooms(
        &self,
        keywords: &str,
        names_only: bool,
        zone_filter: Option<&str>,
    ) -> Vec<RoomId> {
        let words: Vec<String> = keywords
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return Vec::new();
        }
        let zone_filter = zone_filter.map(str::to_lowercase);

        self.rooms
            .values()
            .filter(|r| match &zone_filter {
                Some(z) => r.zone.to_lowercase() == *z,
                None => true,
            })
            .filter(|r| {
                let mut haystack = r.name.to_lowercase();
                if !names_only {
                    haystack.push('\n');
                    haystack.push_str(&r.description.to_lowercase());
                }
                words.iter().all(|w| haystack.contains(w.as_str()))
            })
            .map(|r| r.id)
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            rooms: self.rooms.len(),
            zones: self.zones.len(),
            waypoints: self.waypoints.len(),
            ..StoreStats::default()
        };
        for exit in self.rooms.values().flat_map(|r| r.exits.values()) {
            stats.exits += 1;
            if exit.destination.is_none() {
                stats.unexplored_exits += 1;
            }
        }
        stats
    }

    // ── Room creation ───────────────────────────────────────────────────

    /// Reserve a fresh room id without creating the room.
    pub fn mint_room_id(&mut self) -> RoomId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Create a new auto-numbered room in `zone`.
    pub fn create_room(&mut self, zone: &str) -> RoomId {
        let id = self.mint_room_id();
        self.ensure_room(id, zone);
        id
    }

    /// Create room `id` in `zone` if it does not exist yet.
    /// Returns `true` when the room was created.
    pub fn ensure_room(&mut self, id: RoomId, zone: &str) -> bool {
        if id == 0 || self.rooms.contains_key(&id) {
            return false;
        }
        self.rooms.insert(id, Room::new(id, zone));
        self.zones
            .entry(zone.to_string())
            .or_insert_with(|| Zone::new(zone))
            .rooms
            .insert(id);
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        self.mark_zone_dirty(zone);
        true
    }

    // ── Room edits ──────────────────────────────────────────────────────

    fn room_mut(&mut self, id: RoomId) -> Result<&mut Room, MapError> {
        self.rooms.get_mut(&id).ok_or(MapError::UnknownRoom(id))
    }

    pub fn set_room_name(&mut self, id: RoomId, name: &str) -> Result<bool, MapError> {
        let room = self.room_mut(id)?;
        if room.name == name {
            return Ok(false);
        }
        room.name = name.to_string();
        Ok(true)
    }

    pub fn set_room_description(&mut self, id: RoomId, description: &str) -> Result<bool, MapError> {
        let room = self.room_mut(id)?;
        if room.description == description {
            return Ok(false);
        }
        room.description = description.to_string();
        Ok(true)
    }

    pub fn set_room_type(&mut self, id: RoomId, room_type: &str) -> Result<bool, MapError> {
        let room = self.room_mut(id)?;
        if room.room_type == room_type {
            return Ok(false);
        }
        room.room_type = room_type.to_string();
        Ok(true)
    }

    /// Move a room to another zone, keeping membership and the exit index
    /// consistent. Both zones, and the zones of rooms leading into it, are
    /// dirtied.
    pub fn set_room_zone(&mut self, id: RoomId, zone: &str) -> Result<bool, MapError> {
        let room = self.room_mut(id)?;
        if room.zone == zone {
            return Ok(false);
        }
        let old_zone = std::mem::replace(&mut room.zone, zone.to_string());

        if let Some(old) = self.zones.get_mut(&old_zone) {
            old.rooms.remove(&id);
            for set in old.exits_to.values_mut() {
                set.remove(&id);
            }
            old.exits_to.retain(|_, set| !set.is_empty());
            if old.rooms.is_empty() {
                self.zones.remove(&old_zone);
            }
        }
        self.zones
            .entry(zone.to_string())
            .or_insert_with(|| Zone::new(zone))
            .rooms
            .insert(id);

        self.reindex_room(id);
        let sources: Vec<RoomId> = self.incoming(id).collect();
        for src in sources {
            self.reindex_room(src);
            if let Some(z) = self.zone_of(src).map(str::to_string) {
                self.mark_zone_dirty(&z);
            }
        }
        self.mark_zone_dirty(&old_zone);
        self.mark_zone_dirty(zone);
        Ok(true)
    }

    /// Insert or replace the exit `direction` of room `id`.
    ///
    /// A destination that does not exist yet is created in the source room's
    /// zone. Door-flag-only changes are recorded but do not dirty the zone.
    pub fn set_exit(&mut self, id: RoomId, direction: &str, exit: Exit) -> Result<bool, MapError> {
        let room = self.room_mut(id)?;
        let zone = room.zone.clone();
        let previous = room.exits.get(direction).cloned();
        if previous.as_ref() == Some(&exit) {
            return Ok(false);
        }
        let old_dest = previous.as_ref().and_then(|e| e.destination);
        let new_dest = exit.destination;
        let structural = previous.is_none() || old_dest != new_dest;
        room.exits.insert(direction.to_string(), exit);

        if let Some(dest) = new_dest {
            self.ensure_room(dest, &zone);
        }
        if old_dest != new_dest {
            if let Some(old) = old_dest {
                self.unlink_incoming(id, old);
            }
            if let Some(dest) = new_dest {
                self.incoming.entry(dest).or_default().insert(id);
            }
            self.reindex_room(id);
        }
        if structural {
            self.mark_exit_dirty(&zone, old_dest, new_dest);
        }
        Ok(true)
    }

    /// Remove exit `direction` from room `id`.
    pub fn remove_exit(&mut self, id: RoomId, direction: &str) -> Result<bool, MapError> {
        let room = self.room_mut(id)?;
        let zone = room.zone.clone();
        let Some(removed) = room.exits.remove(direction) else {
            return Ok(false);
        };
        if let Some(dest) = removed.destination {
            self.unlink_incoming(id, dest);
            self.reindex_room(id);
        }
        self.mark_exit_dirty(&zone, removed.destination, None);
        Ok(true)
    }

    /// Drop `src` from the incoming set of `dest` unless another exit of
    /// `src` still leads there.
    fn unlink_incoming(&mut self, src: RoomId, dest: RoomId) {
        let still_linked = self
            .rooms
            .get(&src)
            .is_some_and(|r| r.neighbors().any(|d| d == dest));
        if still_linked {
            return;
        }
        if let Some(set) = self.incoming.get_mut(&dest) {
            set.remove(&src);
            if set.is_empty() {
                self.incoming.remove(&dest);
            }
        }
    }

    fn mark_exit_dirty(&mut self, zone: &str, old_dest: Option<RoomId>, new_dest: Option<RoomId>) {
        self.mark_zone_dirty(zone);
        for dest in [old_dest, new_dest].into_iter().flatten() {
            if let Some(dz) = self.zone_of(dest).map(str::to_string) {
                if dz != zone {
                    self.mark_zone_dirty(&dz);
                }
            }
        }
    }

    /// Recompute the exit-index entries of one room.
    fn reindex_room(&mut self, id: RoomId) {
        let Some(room) = self.rooms.get(&id) else {
            return;
        };
        let zone = room.zone.clone();
        let targets: BTreeSet<String> = room
            .neighbors()
            .filter_map(|d| self.rooms.get(&d))
            .filter(|d| d.zone != zone)
            .map(|d| d.zone.clone())
            .collect();

        let Some(z) = self.zones.get_mut(&zone) else {
            return;
        };
        for set in z.exits_to.values_mut() {
            set.remove(&id);
        }
        for target in targets {
            z.exits_to.entry(target).or_default().insert(id);
        }
        z.exits_to.retain(|_, set| !set.is_empty());
    }

    /// Rebuild the incoming map and every zone's exit index from the room
    /// records. Used after bulk loads.
    pub fn rebuild_index(&mut self) {
        self.incoming.clear();
        for room in self.rooms.values() {
            for dest in room.neighbors() {
                self.incoming.entry(dest).or_default().insert(room.id);
            }
        }
        for zone in self.zones.values_mut() {
            zone.exits_to.clear();
        }
        let ids: Vec<RoomId> = self.rooms.keys().copied().collect();
        for id in ids {
            self.reindex_room(id);
        }
        self.mark_all_dirty();
    }

    // ── Dirty tracking ──────────────────────────────────────────────────

    pub fn mark_zone_dirty(&mut self, zone: &str) {
        if !self.dirty.all {
            self.dirty.zones.insert(zone.to_string());
        }
    }

    /// Force a full recompute before the next route query.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.all = true;
        self.dirty.zones.clear();
    }

    pub fn is_zone_dirty(&self, zone: &str) -> bool {
        self.dirty.all || self.dirty.zones.contains(zone)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Hand the pending dirty set to the decomposer and clear it.
    pub fn take_dirty(&mut self) -> DirtySet {
        std::mem::take(&mut self.dirty)
    }

    // ── Waypoints ───────────────────────────────────────────────────────

    pub fn set_waypoint(&mut self, name: &str, room: RoomId) -> Result<(), MapError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MapError::EmptyWaypointName);
        }
        if !self.rooms.contains_key(&room) {
            return Err(MapError::UnknownRoom(room));
        }
        self.waypoints.insert(name.to_string(), room);
        Ok(())
    }

    pub fn remove_waypoint(&mut self, name: &str) -> bool {
        match self.waypoint_key(name) {
            Some(key) => self.waypoints.remove(&key).is_some(),
            None => false,
        }
    }

    /// Case-insensitive waypoint lookup: an exact match wins, otherwise the
    /// first name (in sorted order) starting with `name`.
    pub fn waypoint(&self, name: &str) -> Option<RoomId> {
        self.waypoint_key(name).and_then(|k| self.waypoints.get(&k).copied())
    }

    fn waypoint_key(&self, name: &str) -> Option<String> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.waypoints
            .keys()
            .find(|k| k.to_lowercase() == wanted)
            .or_else(|| {
                self.waypoints
                    .keys()
                    .find(|k| k.to_lowercase().starts_with(&wanted))
            })
            .cloned()
    }

    pub fn waypoints(&self) -> &BTreeMap<String, RoomId> {
        &self.waypoints
    }
}
