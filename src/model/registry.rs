//! Ordered membership of applications and windows in the switcher's
//! collections.
//!
//! Every collection keeps most-recently-used order: the front member is the
//! one touched last. An entity can belong to several collections at once and
//! carries one `(collection, order)` record per membership; order indices
//! within a collection always form a dense permutation of `0..len`, with the
//! largest index being the most recent.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::trace;

use crate::common::collections::HashMap;
use crate::model::entities::{AppInfo, AppKey, Application, EntityKey, Window, WindowKey, WindowSeed};
use crate::sys::ax::{AxHandle, Pid, WindowServerId};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionId {
    /// Every tracked window, across all applications.
    AllWindows,
    /// Every tracked application.
    AllApps,
    /// Applications the desktop shows in its dock.
    UsableApps,
    /// Windows owned by one application.
    AppWindows(AppKey),
}

/// The `(collection, order)` records of one entity. Entities typically belong
/// to one to three collections, so a plain vector beats a map here.
#[derive(Debug, Default, Clone)]
pub struct Memberships(Vec<(CollectionId, usize)>);

impl Memberships {
    pub fn order(&self, coll: CollectionId) -> Option<usize> {
        self.0.iter().find(|(c, _)| *c == coll).map(|(_, order)| *order)
    }

    pub fn collections(&self) -> impl Iterator<Item = CollectionId> + '_ {
        self.0.iter().map(|(c, _)| *c)
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    fn set(&mut self, coll: CollectionId, order: usize) {
        if let Some(entry) = self.0.iter_mut().find(|(c, _)| *c == coll) {
            entry.1 = order;
        } else {
            self.0.push((coll, order));
        }
    }

    fn remove(&mut self, coll: CollectionId) { self.0.retain(|(c, _)| *c != coll); }
}

/// Owns every tracked application and window and the MRU order of each
/// collection they belong to.
///
/// Reordering is O(collection size) per touch. Collections hold tens of
/// entries at most, so simplicity wins over asymptotics.
#[derive(Debug, Default)]
pub struct Registry {
    apps: SlotMap<AppKey, Application>,
    windows: SlotMap<WindowKey, Window>,
    /// Member lists, most recent first.
    orders: HashMap<CollectionId, Vec<EntityKey>>,
}

impl Registry {
    pub fn new() -> Registry { Registry::default() }

    // --- entity access ---

    pub fn app(&self, key: AppKey) -> Option<&Application> { self.apps.get(key) }

    pub fn app_mut(&mut self, key: AppKey) -> Option<&mut Application> { self.apps.get_mut(key) }

    pub fn window(&self, key: WindowKey) -> Option<&Window> { self.windows.get(key) }

    pub fn window_mut(&mut self, key: WindowKey) -> Option<&mut Window> {
        self.windows.get_mut(key)
    }

    pub fn app_by_pid(&self, pid: Pid) -> Option<AppKey> {
        self.apps.iter().find(|(_, app)| app.pid == pid).map(|(key, _)| key)
    }

    pub fn window_by_handle(&self, handle: AxHandle) -> Option<WindowKey> {
        self.windows
            .iter()
            .find(|(_, window)| window.handle == handle)
            .map(|(key, _)| key)
    }

    pub fn window_by_server_id(&self, id: WindowServerId) -> Option<WindowKey> {
        self.windows
            .iter()
            .find(|(_, window)| window.server_id == Some(id))
            .map(|(key, _)| key)
    }

    /// The most recently used application, if any is tracked.
    pub fn mru_app(&self) -> Option<AppKey> {
        self.members(CollectionId::AllApps).first().and_then(|key| match key {
            EntityKey::App(app) => Some(*app),
            EntityKey::Window(_) => None,
        })
    }

    // --- collection access ---

    /// Members of `coll`, most recent first.
    pub fn members(&self, coll: CollectionId) -> &[EntityKey] {
        self.orders.get(&coll).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, coll: CollectionId) -> usize { self.members(coll).len() }

    pub fn order_of(&self, key: EntityKey, coll: CollectionId) -> Option<usize> {
        self.memberships(key).and_then(|m| m.order(coll))
    }

    fn memberships(&self, key: EntityKey) -> Option<&Memberships> {
        match key {
            EntityKey::App(k) => self.apps.get(k).map(|a| &a.memberships),
            EntityKey::Window(k) => self.windows.get(k).map(|w| &w.memberships),
        }
    }

    fn memberships_mut(&mut self, key: EntityKey) -> Option<&mut Memberships> {
        match key {
            EntityKey::App(k) => self.apps.get_mut(k).map(|a| &mut a.memberships),
            EntityKey::Window(k) => self.windows.get_mut(k).map(|w| &mut w.memberships),
        }
    }

    /// Entities whose recency this entity drags along with its own. Recency
    /// flows from a window up to its application, never back down.
    fn covers(&self, key: EntityKey) -> Vec<EntityKey> {
        match key {
            EntityKey::Window(k) => {
                self.windows.get(k).map(|w| vec![EntityKey::App(w.app)]).unwrap_or_default()
            }
            EntityKey::App(_) => Vec::new(),
        }
    }

    // --- entity creation ---

    /// Tracks a new application and places it into the global collections.
    pub fn insert_app(&mut self, info: AppInfo) -> AppKey {
        let dock_visible = info.dock_visible;
        let key = self.apps.insert(Application::new(info));
        self.add(EntityKey::App(key), CollectionId::AllApps);
        if dock_visible {
            self.add(EntityKey::App(key), CollectionId::UsableApps);
        }
        key
    }

    /// Tracks a new window under `app_key`. Returns `None` when the owning
    /// application has already been destroyed (the creation raced teardown).
    pub fn insert_window(&mut self, app_key: AppKey, seed: WindowSeed) -> Option<WindowKey> {
        if !self.apps.contains_key(app_key) {
            trace!(?seed.handle, "dropping window for a dead application");
            return None;
        }
        let key = self.windows.insert(Window::new(app_key, seed));
        if let Some(app) = self.apps.get_mut(app_key) {
            app.windows.push(key);
        }
        let entity = EntityKey::Window(key);
        self.add(entity, CollectionId::AllWindows);
        self.add(entity, CollectionId::AppWindows(app_key));
        // a freshly created window also counts as activity in its application
        self.propagate_touch(entity);
        Some(key)
    }

    // --- ordering operations ---

    /// Inserts `key` into `coll` as its most recent member. Adding an entity
    /// that is already a member just touches it.
    pub fn add(&mut self, key: EntityKey, coll: CollectionId) {
        if self.memberships(key).is_none() {
            return; // stale key
        }
        if self.order_of(key, coll).is_some() {
            self.touch(key, coll);
            return;
        }
        let order = self.len(coll);
        if let Some(memberships) = self.memberships_mut(key) {
            memberships.set(coll, order);
        }
        self.orders.entry(coll).or_default().push(key);
        self.resort(coll);
    }

    /// Marks `key` most recent within `coll` and propagates the bump along
    /// its covering edges into every collection those entities belong to.
    pub fn touch(&mut self, key: EntityKey, coll: CollectionId) {
        self.bump(key, coll);
        self.propagate_touch(key);
    }

    /// Marks `key` most recent in every collection it belongs to, then
    /// propagates along covering edges.
    pub fn touch_everywhere(&mut self, key: EntityKey) {
        let colls: Vec<CollectionId> =
            self.memberships(key).map(|m| m.collections().collect()).unwrap_or_default();
        for coll in colls {
            self.bump(key, coll);
        }
        self.propagate_touch(key);
    }

    fn propagate_touch(&mut self, key: EntityKey) {
        for covered in self.covers(key) {
            self.touch_everywhere(covered);
        }
    }

    /// The reorder itself: members more recent than `key` slide down one
    /// slot and `key` takes the maximum order. No-op for non-members.
    fn bump(&mut self, key: EntityKey, coll: CollectionId) {
        let Some(prev) = self.order_of(key, coll) else { return };
        let count = self.len(coll);
        let others: Vec<EntityKey> = self.members(coll).to_vec();
        for other in others {
            if other == key {
                continue;
            }
            if let Some(memberships) = self.memberships_mut(other) {
                if let Some(order) = memberships.order(coll) {
                    if order > prev {
                        memberships.set(coll, order - 1);
                    }
                }
            }
        }
        if let Some(memberships) = self.memberships_mut(key) {
            memberships.set(coll, count - 1);
        }
        self.resort(coll);
    }

    /// Drops `key`'s membership in `coll`, closing the order gap it leaves.
    /// No-op when `key` is not a member; lifecycle events race prior
    /// removals and must not fail.
    pub fn remove(&mut self, key: EntityKey, coll: CollectionId) {
        let Some(prev) = self.order_of(key, coll) else { return };
        let others: Vec<EntityKey> = self.members(coll).to_vec();
        for other in others {
            if other == key {
                continue;
            }
            if let Some(memberships) = self.memberships_mut(other) {
                if let Some(order) = memberships.order(coll) {
                    if order > prev {
                        memberships.set(coll, order - 1);
                    }
                }
            }
        }
        if let Some(memberships) = self.memberships_mut(key) {
            memberships.remove(coll);
        }
        if let Some(list) = self.orders.get_mut(&coll) {
            list.retain(|k| *k != key);
        }
    }

    /// Removes `key` from every collection and drops the entity. An
    /// application takes all of its windows with it. Safe to call again for
    /// an entity that is already gone.
    pub fn destroy(&mut self, key: EntityKey) {
        match key {
            EntityKey::App(app_key) => {
                let Some(app) = self.apps.get(app_key) else { return };
                for window in app.windows.clone() {
                    self.destroy(EntityKey::Window(window));
                }
                self.remove_from_all(key);
                self.orders.remove(&CollectionId::AppWindows(app_key));
                self.apps.remove(app_key);
            }
            EntityKey::Window(window_key) => {
                let Some(window) = self.windows.get(window_key) else { return };
                let owner = window.app;
                self.remove_from_all(key);
                if let Some(app) = self.apps.get_mut(owner) {
                    app.windows.retain(|k| *k != window_key);
                }
                self.windows.remove(window_key);
            }
        }
    }

    fn remove_from_all(&mut self, key: EntityKey) {
        let colls: Vec<CollectionId> =
            self.memberships(key).map(|m| m.collections().collect()).unwrap_or_default();
        for coll in colls {
            self.remove(key, coll);
        }
    }

    /// Rewrites the member list of `coll` in descending order-index order.
    fn resort(&mut self, coll: CollectionId) {
        let keyed: Vec<(usize, EntityKey)> = self
            .members(coll)
            .iter()
            .map(|&key| (self.order_of(key, coll).unwrap_or(0), key))
            .collect();
        let mut keyed = keyed;
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        self.orders.insert(coll, keyed.into_iter().map(|(_, key)| key).collect());
    }
}
