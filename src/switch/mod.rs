pub mod fuzzy;
pub mod manager;
pub mod state;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Which corpus the switcher is currently cycling through.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Idle; nothing is being browsed.
    #[default]
    None,
    /// All windows across every application.
    InterWindow,
    /// Dock-visible applications.
    InterApp,
    /// The windows of the most recently used application.
    IntraApp,
}

/// Whether the presentation layer is plainly browsing the list or filtering
/// it through the search box.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseMode {
    #[default]
    Browsing,
    Searching,
}
