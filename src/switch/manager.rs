//! Turns the current trigger, browse mode and filter text into a renderable,
//! pageable list of candidates.
//!
//! Stateless apart from the search cache: search results are recomputed only
//! when the (trigger, filter) pair changes or the registry has mutated,
//! while browsing always reads the live ordering.

use std::ops::Range;

use serde::Serialize;

use crate::model::entities::{AppKey, EntityKey, WindowKey};
use crate::model::registry::{CollectionId, Registry};
use crate::switch::fuzzy::MatchRun;
use crate::switch::{BrowseMode, Trigger};
use crate::sys::ax::IconRef;

/// What a list row resolves to when acted upon.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchTarget {
    App(AppKey),
    Window(WindowKey),
}

/// One row of the switcher list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchItem {
    pub target: SwitchTarget,
    pub icon: Option<IconRef>,
    /// The title, split into highlightable runs. In browsing mode this is a
    /// single unmatched run.
    pub runs: Vec<MatchRun>,
}

#[derive(Debug, Default)]
pub struct SwitchManager {
    cached: Vec<SwitchItem>,
    cached_trigger: Trigger,
    cached_filter: String,
    cache_valid: bool,
}

impl SwitchManager {
    pub fn new() -> SwitchManager { SwitchManager::default() }

    /// Drops the search cache. Called whenever the registry mutates so no
    /// cached row can outlive the entity it names.
    pub fn invalidate(&mut self) { self.cache_valid = false; }

    /// The unfiltered candidate list for `trigger`, in live MRU order.
    pub fn raw_expansion(&self, registry: &Registry, trigger: Trigger) -> Vec<SwitchTarget> {
        let members: &[EntityKey] = match trigger {
            Trigger::None => &[],
            Trigger::InterWindow => registry.members(CollectionId::AllWindows),
            Trigger::InterApp => registry.members(CollectionId::UsableApps),
            Trigger::IntraApp => match registry.mru_app() {
                Some(app) => registry.members(CollectionId::AppWindows(app)),
                None => &[],
            },
        };
        members
            .iter()
            .map(|key| match key {
                EntityKey::App(app) => SwitchTarget::App(*app),
                EntityKey::Window(window) => SwitchTarget::Window(*window),
            })
            .collect()
    }

    /// The full mapped list for the current view. Browsing mode maps fresh
    /// every call; searching mode serves from the cache.
    pub fn items(
        &mut self,
        registry: &Registry,
        trigger: Trigger,
        mode: BrowseMode,
        filter: &str,
    ) -> Vec<SwitchItem> {
        match mode {
            BrowseMode::Browsing => self
                .raw_expansion(registry, trigger)
                .into_iter()
                .filter_map(|target| browsing_item(registry, target))
                .collect(),
            BrowseMode::Searching => {
                self.ensure_cache(registry, trigger, filter);
                self.cached.clone()
            }
        }
    }

    /// Number of rows for the current view without materializing them;
    /// searching first brings the cache up to date.
    pub fn items_count(
        &mut self,
        registry: &Registry,
        trigger: Trigger,
        mode: BrowseMode,
        filter: &str,
    ) -> usize {
        match mode {
            BrowseMode::Browsing => self.raw_expansion(registry, trigger).len(),
            BrowseMode::Searching => {
                self.ensure_cache(registry, trigger, filter);
                self.cached.len()
            }
        }
    }

    /// Only the rows inside `range`, each tagged with its absolute index.
    /// Browsing mode maps just the requested indices so off-screen rows cost
    /// nothing.
    pub fn items_slice(
        &mut self,
        registry: &Registry,
        trigger: Trigger,
        mode: BrowseMode,
        filter: &str,
        range: Range<usize>,
    ) -> Vec<(usize, SwitchItem)> {
        match mode {
            BrowseMode::Searching => {
                self.ensure_cache(registry, trigger, filter);
                let upper = range.end.min(self.cached.len());
                let lower = range.start.min(upper);
                self.cached[lower..upper]
                    .iter()
                    .enumerate()
                    .map(|(offset, item)| (lower + offset, item.clone()))
                    .collect()
            }
            BrowseMode::Browsing => {
                let raw = self.raw_expansion(registry, trigger);
                let upper = range.end.min(raw.len());
                let lower = range.start.min(upper);
                (lower..upper)
                    .filter_map(|index| {
                        browsing_item(registry, raw[index]).map(|item| (index, item))
                    })
                    .collect()
            }
        }
    }

    fn ensure_cache(&mut self, registry: &Registry, trigger: Trigger, filter: &str) {
        let lowered = filter.to_lowercase();
        if self.cache_valid && self.cached_trigger == trigger && self.cached_filter == lowered {
            return;
        }
        // filtering keeps the raw MRU order; it only drops rows
        self.cached = self
            .raw_expansion(registry, trigger)
            .into_iter()
            .filter_map(|target| searching_item(registry, target, &lowered))
            .collect();
        self.cached_trigger = trigger;
        self.cached_filter = lowered;
        self.cache_valid = true;
    }
}

fn icon_of(registry: &Registry, target: SwitchTarget) -> Option<IconRef> {
    match target {
        SwitchTarget::App(key) => registry.app(key).and_then(|app| app.icon),
        // a window shows its application's icon
        SwitchTarget::Window(key) => registry
            .window(key)
            .and_then(|window| registry.app(window.app))
            .and_then(|app| app.icon),
    }
}

fn browsing_item(registry: &Registry, target: SwitchTarget) -> Option<SwitchItem> {
    let title = match target {
        SwitchTarget::App(key) => registry.app(key)?.name.clone(),
        SwitchTarget::Window(key) => registry.window(key)?.title.clone(),
    };
    Some(SwitchItem {
        target,
        icon: icon_of(registry, target),
        runs: vec![MatchRun::Unmatched(title)],
    })
}

fn searching_item(registry: &Registry, target: SwitchTarget, filter: &str) -> Option<SwitchItem> {
    let runs = match target {
        SwitchTarget::App(key) => registry.app(key)?.title_index().matches(filter)?,
        SwitchTarget::Window(key) => registry.window(key)?.title_index().matches(filter)?,
    };
    Some(SwitchItem { target, icon: icon_of(registry, target), runs })
}
