//! Room-graph mapping logic for MUD clients.
//!
//! This crate contains the whole mapper with no terminal, network, or UI
//! dependency. A client feeds it what it sees (structured room records,
//! raw session lines, sent commands, prompts) and asks it where rooms are,
//! how to get there, and how to walk back.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`automapper`] | Structured updates and the text capture state machine |
//! | [`cliques`] | Zone decomposition into cliques with cached portal routes |
//! | [`config`] | Text-path vocabulary (exit prefixes, look commands, aliases) |
//! | [`directions`] | Compass directions, opposites, abbreviations |
//! | [`history`] | Movement log, speedwalks, backtrack simplification |
//! | [`mapper`] | Facade owning store, cliques, automapper and history |
//! | [`persistence`] | Bincode save/load and JSON export of the map |
//! | [`route`] | Clique-graph route search and path stitching |
//! | [`store`] | Rooms, exits, zones, exit index and waypoints |

pub mod automapper;
pub mod cliques;
pub mod config;
pub mod directions;
pub mod history;
pub mod mapper;
pub mod persistence;
pub mod route;
pub mod store;

pub use mapper::Mapper;
