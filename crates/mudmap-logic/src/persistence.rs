//! Save/Load for the room graph.
//!
//! Maps are grouped per zone, then per room. Binary saves use bincode; a
//! JSON export of the same structure is available for hand editing and for
//! moving maps between tools. Door open/locked state is transient and is not
//! written; lock capability is.

use crate::store::{Exit, RoomId, RoomStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;

/// Version number for the map file format (increment when format changes)
pub const MAP_VERSION: u32 = 1;

/// Errors that can occur during save/load
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Map version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedExit {
    pub destination: Option<RoomId>,
    pub is_door: bool,
    pub is_lockable: bool,
    pub door_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRoom {
    pub name: String,
    pub description: String,
    pub room_type: String,
    pub exits: BTreeMap<String, SavedExit>,
}

/// Serializable snapshot of a whole map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFile {
    pub version: u32,
    /// zone name → room id → room
    pub zones: BTreeMap<String, BTreeMap<RoomId, SavedRoom>>,
    pub waypoints: BTreeMap<String, RoomId>,
}

impl From<&Exit> for SavedExit {
    fn from(exit: &Exit) -> Self {
        Self {
            destination: exit.destination,
            is_door: exit.is_door,
            is_lockable: exit.is_lockable,
            door_name: exit.door_name.clone(),
        }
    }
}

impl From<&SavedExit> for Exit {
    fn from(saved: &SavedExit) -> Self {
        Self {
            destination: saved.destination,
            door_name: saved.door_name.clone(),
            is_door: saved.is_door,
            is_lockable: saved.is_lockable,
            ..Exit::default()
        }
    }
}

impl MapFile {
    pub fn from_store(store: &RoomStore) -> Self {
        let mut zones: BTreeMap<String, BTreeMap<RoomId, SavedRoom>> = BTreeMap::new();
        for room in store.rooms() {
            let saved = SavedRoom {
                name: room.name.clone(),
                description: room.description.clone(),
                room_type: room.room_type.clone(),
                exits: room
                    .exits
                    .iter()
                    .map(|(dir, exit)| (dir.clone(), SavedExit::from(exit)))
                    .collect(),
            };
            zones.entry(room.zone.clone()).or_default().insert(room.id, saved);
        }
        Self {
            version: MAP_VERSION,
            zones,
            waypoints: store.waypoints().clone(),
        }
    }

    /// Rebuild a store from the snapshot. The returned store has every zone
    /// marked dirty, so the first route query recomputes all cliques.
    pub fn into_store(self) -> RoomStore {
        let mut store = RoomStore::new();

        // Rooms first so exits never create placeholder rooms in the wrong zone.
        for (zone, rooms) in &self.zones {
            for (&id, saved) in rooms {
                if !store.ensure_room(id, zone) {
                    log::warn!("Skipping room #{} in zone '{}': invalid or duplicate id", id, zone);
                    continue;
                }
                // ensure_room just created it, so these cannot fail
                let _ = store.set_room_name(id, &saved.name);
                let _ = store.set_room_description(id, &saved.description);
                let _ = store.set_room_type(id, &saved.room_type);
            }
        }

        for rooms in self.zones.values() {
            for (&id, saved) in rooms {
                for (dir, exit) in &saved.exits {
                    if let Err(e) = store.set_exit(id, dir, Exit::from(exit)) {
                        log::warn!("Dropping exit '{}' of room #{}: {}", dir, id, e);
                    }
                }
            }
        }

        for (name, room) in &self.waypoints {
            if let Err(e) = store.set_waypoint(name, *room) {
                log::warn!("Dropping waypoint '{}': {}", name, e);
            }
        }

        store.rebuild_index();
        store
    }

    fn check_version(&self) -> Result<(), PersistError> {
        if self.version != MAP_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: MAP_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }
}

/// Save the map to a writer
pub fn save_map<W: Write>(writer: W, store: &RoomStore) -> Result<(), PersistError> {
    bincode::serialize_into(writer, &MapFile::from_store(store))?;
    Ok(())
}

/// Load a map from a reader
pub fn load_map<R: Read>(reader: R) -> Result<RoomStore, PersistError> {
    let file: MapFile = bincode::deserialize_from(reader)?;
    file.check_version()?;
    log::info!(
        "Loaded map: {} zones, {} rooms",
        file.zones.len(),
        file.zones.values().map(BTreeMap::len).sum::<usize>()
    );
    Ok(file.into_store())
}

pub fn export_json(store: &RoomStore) -> Result<String, PersistError> {
    Ok(serde_json::to_string_pretty(&MapFile::from_store(store))?)
}

pub fn import_json(json: &str) -> Result<RoomStore, PersistError> {
    let file: MapFile = serde_json::from_str(json)?;
    file.check_version()?;
    Ok(file.into_store())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> RoomStore {
        let mut store = RoomStore::new();
        store.ensure_room(1, "town");
        store.ensure_room(5, "forest");
        store.set_room_name(1, "Gate").unwrap();
        store.set_room_description(1, "A stout gate.").unwrap();
        store.set_room_type(5, "forest").unwrap();
        store
            .set_exit(
                1,
                "north",
                Exit {
                    destination: Some(5),
                    door_name: "gate".to_string(),
                    is_door: true,
                    is_open: true,
                    is_locked: true,
                    is_lockable: true,
                },
            )
            .unwrap();
        store.set_exit(5, "south", Exit::to(1)).unwrap();
        store.set_exit(5, "west", Exit::unexplored()).unwrap();
        store.set_waypoint("gate", 1).unwrap();
        store
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = sample_store();
        let mut buffer = Vec::new();
        save_map(&mut buffer, &store).expect("Save failed");

        let loaded = load_map(&buffer[..]).expect("Load failed");
        assert_eq!(loaded.room_count(), 2);
        assert_eq!(loaded.zone_of(5), Some("forest"));
        assert_eq!(loaded.room(1).unwrap().description, "A stout gate.");
        assert_eq!(loaded.room(5).unwrap().room_type, "forest");
        assert_eq!(loaded.waypoint("gate"), Some(1));
        assert_eq!(loaded.entrance_rooms("forest").into_iter().collect::<Vec<_>>(), vec![5]);
        assert_eq!(loaded.connected_zones("town"), vec!["forest"]);
        assert!(loaded.room(5).unwrap().exit("west").unwrap().destination.is_none());
        assert!(loaded.has_dirty());
    }

    #[test]
    fn test_door_state_is_transient() {
        let mut buffer = Vec::new();
        save_map(&mut buffer, &sample_store()).unwrap();
        let loaded = load_map(&buffer[..]).unwrap();
        let door = loaded.room(1).unwrap().exit("north").unwrap();
        assert!(door.is_door);
        assert!(door.is_lockable);
        assert!(!door.is_locked);
        assert_eq!(door.door_name, "gate");
    }

    #[test]
    fn test_version_mismatch() {
        let mut file = MapFile::from_store(&sample_store());
        file.version = MAP_VERSION + 1;
        let buffer = bincode::serialize(&file).unwrap();
        assert!(matches!(
            load_map(&buffer[..]),
            Err(PersistError::VersionMismatch { found, .. }) if found == MAP_VERSION + 1
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let store = sample_store();
        let json = export_json(&store).unwrap();
        assert!(json.contains("\"forest\""));
        let loaded = import_json(&json).unwrap();
        assert_eq!(MapFile::from_store(&loaded), MapFile::from_store(&store));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(load_map(&[1u8, 2, 3][..]).is_err());
        assert!(matches!(import_json("[]"), Err(PersistError::Json(_))));
    }
}
