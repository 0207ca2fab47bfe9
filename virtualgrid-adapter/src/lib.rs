//! Adapter utilities for the `virtualgrid` crate.
//!
//! The `virtualgrid` crate is UI-agnostic and focuses on grid state and its algorithms. This
//! crate provides small, framework-neutral helpers commonly needed by adapters:
//!
//! - A default keyboard map from key presses to grid commands (rebindable)
//! - A session that resolves page turns, keeps focus on the same row across re-sorts and
//!   drives remote fetch jobs to completion
//! - Column preference stores (in-memory and JSON files)
//!
//! This crate is intentionally framework-agnostic (no ratatui/egui/DOM bindings).
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod anchor;
mod keymap;
mod prefs;
mod session;


pub use anchor::FocusAnchor;
pub use keymap::{GridCommand, Key, KeyInput, KeyMap, Modifiers, ParseKeyError, map_key};
pub use prefs::{JsonFilePreferenceStore, MemoryPreferenceStore};
pub use session::GridSession;
