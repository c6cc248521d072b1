//! Live window/application registry and switcher engine.
//!
//! The engine observes lifecycle events from the OS accessibility layer,
//! keeps MRU-ordered collections of applications and windows, answers fuzzy
//! search queries over their titles, and drives the keyboard/mouse selection
//! state machine behind a task-switcher overlay. Rendering, hotkey capture
//! and the OS bindings themselves live with the embedder.

pub mod actor;
pub mod common;
pub mod model;
pub mod switch;
pub mod sys;

pub use crate::actor::reactor::{
    Event, Intent, OverlayEvent, QueryRequest, Reactor, ViewContext,
};
pub use crate::common::config::Config;
pub use crate::model::entities::{AppInfo, WindowSeed};
pub use crate::switch::manager::{SwitchItem, SwitchTarget};
pub use crate::switch::{BrowseMode, Trigger};
pub use crate::sys::ax::{AxApi, AxCode, AxHandle, IconRef, Pid, WindowServerId};
pub use crate::sys::gateway::Gateway;
