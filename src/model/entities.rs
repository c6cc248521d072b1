use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::model::registry::Memberships;
use crate::switch::fuzzy::TitleIndex;
use crate::sys::ax::{AxHandle, IconRef, Pid, WindowServerId};

new_key_type! {
    pub struct AppKey;
    pub struct WindowKey;
}

/// Key of any registry entity, for code that works across both kinds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    App(AppKey),
    Window(WindowKey),
}

/// Snapshot of a freshly launched application, as reported by the process
/// watcher.
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub pid: Pid,
    pub bundle_id: Option<String>,
    pub name: String,
    pub handle: AxHandle,
    pub icon: Option<IconRef>,
    /// Whether the desktop shows this application in its dock; only these
    /// appear in the application switching list.
    pub dock_visible: bool,
    pub is_hidden: bool,
}

/// Attributes of a window as read off the accessibility layer, before the
/// registry takes ownership of it.
#[derive(Debug, Clone)]
pub struct WindowSeed {
    pub handle: AxHandle,
    pub server_id: Option<WindowServerId>,
    pub title: String,
    pub is_minimized: bool,
}

#[derive(Debug)]
pub struct Application {
    pub pid: Pid,
    pub bundle_id: Option<String>,
    pub name: String,
    pub handle: AxHandle,
    pub icon: Option<IconRef>,
    pub is_hidden: bool,
    /// Dock-style status text, e.g. an unread count.
    pub label: Option<String>,
    pub dock_visible: bool,
    /// A second quit request force-terminates.
    pub quit_requested: bool,
    /// Owned windows; destroying the application destroys all of them.
    pub windows: Vec<WindowKey>,
    pub(crate) memberships: Memberships,
    pub(crate) title_index: TitleIndex,
}

impl Application {
    pub fn new(info: AppInfo) -> Application {
        let title_index = TitleIndex::new(&info.name);
        Application {
            pid: info.pid,
            bundle_id: info.bundle_id,
            name: info.name,
            handle: info.handle,
            icon: info.icon,
            is_hidden: info.is_hidden,
            label: None,
            dock_visible: info.dock_visible,
            quit_requested: false,
            windows: Vec::new(),
            memberships: Memberships::default(),
            title_index,
        }
    }

    pub fn title_index(&self) -> &TitleIndex { &self.title_index }
}

#[derive(Debug)]
pub struct Window {
    pub handle: AxHandle,
    pub server_id: Option<WindowServerId>,
    pub title: String,
    /// Owning application, by key rather than reference; a window can never
    /// outlive its application.
    pub app: AppKey,
    pub is_minimized: bool,
    pub(crate) memberships: Memberships,
    pub(crate) title_index: TitleIndex,
}

impl Window {
    pub fn new(app: AppKey, seed: WindowSeed) -> Window {
        let title_index = TitleIndex::new(&seed.title);
        Window {
            handle: seed.handle,
            server_id: seed.server_id,
            title: seed.title,
            app,
            is_minimized: seed.is_minimized,
            memberships: Memberships::default(),
            title_index,
        }
    }

    pub fn set_title(&mut self, title: String) {
        self.title_index = TitleIndex::new(&title);
        self.title = title;
    }

    pub fn title_index(&self) -> &TitleIndex { &self.title_index }
}
