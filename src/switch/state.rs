//! The selection state machine: which trigger is active and where the
//! pointer sits, reconciling keyboard navigation with mouse hover.

use crate::switch::Trigger;
use crate::sys::geometry::Point;

/// Pointer and trigger state for the switcher overlay.
///
/// The pointer is a signed counter wrapped with floored modulo over the
/// current item count, so holding "backward" cycles cleanly through the
/// front of the list. Hover is only committed when the pointer device
/// actually moved; the overlay sliding beneath a stationary mouse must not
/// steal the selection from the keyboard.
#[derive(Debug)]
pub struct SwitcherState {
    trigger: Trigger,
    counter: i64,
    /// Last committed hover position, cleared when keyboard navigation
    /// crosses a page boundary.
    external: Option<usize>,
    last_pointer_location: Option<Point>,
    /// The very first toggle-off after startup is spurious and absorbed.
    absorbed_first_off: bool,
    /// Bumped on every activation; a delayed open only fires if the epoch
    /// still matches when its timer elapses.
    epoch: u64,
    page_size: usize,
}

impl SwitcherState {
    pub fn new(page_size: usize) -> SwitcherState {
        SwitcherState {
            trigger: Trigger::None,
            counter: 0,
            external: None,
            last_pointer_location: None,
            absorbed_first_off: false,
            epoch: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn trigger(&self) -> Trigger { self.trigger }

    pub fn epoch(&self) -> u64 { self.epoch }

    /// True while `epoch` still names the current activation. The delayed
    /// open checks this when its timer fires instead of being cancelled.
    pub fn still_active(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.trigger != Trigger::None
    }

    pub fn active_index(&self, count: usize) -> usize {
        if count == 0 {
            0
        } else {
            self.counter.rem_euclid(count as i64) as usize
        }
    }

    pub fn page_start(&self, count: usize) -> usize {
        (self.active_index(count) / self.page_size) * self.page_size
    }

    pub fn page_end(&self, count: usize) -> usize {
        (self.page_start(count) + self.page_size).min(count)
    }

    /// Activates `trigger`. A different trigger arriving while one is active
    /// simply replaces it; there is no queueing. Returns the new epoch for
    /// the delayed-open guard.
    pub fn toggle_on(&mut self, trigger: Trigger) -> u64 {
        self.trigger = trigger;
        self.counter = 1;
        self.external = None;
        self.epoch += 1;
        self.epoch
    }

    pub fn toggle_forward(&mut self, count: usize) { self.step(1, count); }

    pub fn toggle_backward(&mut self, count: usize) { self.step(-1, count); }

    fn step(&mut self, delta: i64, count: usize) {
        let before = self.active_index(count) / self.page_size;
        self.counter += delta;
        let after = self.active_index(count) / self.page_size;
        if before != after {
            // the page flipped under the mouse; a stale hover must not win
            self.external = None;
        }
    }

    /// Deactivates and reports which index to focus, or `None` when this
    /// toggle-off is the spurious first one or there is nothing to focus.
    pub fn toggle_off(&mut self, count: usize) -> Option<usize> {
        if !self.absorbed_first_off {
            self.absorbed_first_off = true;
            return None;
        }
        let index = self.active_index(count);
        self.trigger = Trigger::None;
        self.counter = 0;
        self.external = None;
        (count > 0).then_some(index)
    }

    /// Deactivates without acting on any item.
    pub fn toggle_drop(&mut self) {
        self.trigger = Trigger::None;
        self.counter = 1;
        self.external = None;
    }

    /// Records a hover sample. Committed to the live pointer only when the
    /// device location changed since the last sample.
    pub fn hover(&mut self, index: Option<usize>, location: Point) {
        if self.last_pointer_location == Some(location) {
            return;
        }
        self.last_pointer_location = Some(location);
        self.external = index;
        if let Some(index) = index {
            self.counter = index as i64;
        }
    }

    #[cfg(test)]
    fn hover_override(&self) -> Option<usize> { self.external }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const COUNT: usize = 10;

    fn active(page_size: usize) -> SwitcherState {
        let mut state = SwitcherState::new(page_size);
        state.toggle_on(Trigger::InterWindow);
        state
    }

    #[test]
    fn toggle_on_points_at_the_second_item() {
        let state = active(4);
        assert_eq!(state.trigger(), Trigger::InterWindow);
        assert_eq!(state.active_index(COUNT), 1);
    }

    #[test]
    fn forward_then_backward_restores_the_pointer() {
        let mut state = active(4);
        state.toggle_forward(COUNT);
        state.toggle_forward(COUNT);
        let here = state.active_index(COUNT);
        state.toggle_forward(COUNT);
        state.toggle_backward(COUNT);
        assert_eq!(state.active_index(COUNT), here);
    }

    #[test]
    fn pointer_wraps_with_floored_modulo() {
        let mut state = active(4);
        // walk backward past the front of the list
        state.toggle_backward(COUNT);
        state.toggle_backward(COUNT);
        state.toggle_backward(COUNT);
        assert_eq!(state.active_index(COUNT), COUNT - 2);
        // and an empty list pins the pointer at zero
        assert_eq!(state.active_index(0), 0);
    }

    #[test]
    fn first_toggle_off_is_absorbed() {
        let mut state = active(4);
        assert_eq!(state.toggle_off(COUNT), None);
        // still active: the spurious off must not close anything
        assert_eq!(state.trigger(), Trigger::InterWindow);

        state.toggle_forward(COUNT);
        assert_eq!(state.toggle_off(COUNT), Some(2));
        assert_eq!(state.trigger(), Trigger::None);
        assert_eq!(state.active_index(COUNT), 0);
    }

    #[test]
    fn toggle_off_with_no_items_closes_without_focusing() {
        let mut state = active(4);
        let _ = state.toggle_off(COUNT); // absorb
        state.toggle_on(Trigger::InterWindow);
        assert_eq!(state.toggle_off(0), None);
        assert_eq!(state.trigger(), Trigger::None);
    }

    #[test]
    fn drop_resets_without_reporting_a_focus_target() {
        let mut state = active(4);
        state.toggle_forward(COUNT);
        state.toggle_drop();
        assert_eq!(state.trigger(), Trigger::None);
        assert_eq!(state.active_index(COUNT), 1);
    }

    #[test]
    fn last_activation_wins() {
        let mut state = active(4);
        state.toggle_forward(COUNT);
        let epoch = state.toggle_on(Trigger::InterApp);
        assert_eq!(state.trigger(), Trigger::InterApp);
        assert_eq!(state.active_index(COUNT), 1);
        assert!(state.still_active(epoch));
        assert!(!state.still_active(epoch - 1));
    }

    #[test]
    fn hover_commits_only_when_the_device_moved() {
        let mut state = active(4);
        state.hover(Some(3), Point::new(10.0, 10.0));
        assert_eq!(state.active_index(COUNT), 3);

        // keyboard moves the list; the mouse stayed put, so the re-delivered
        // hover for the row now under it is ignored
        state.toggle_forward(COUNT);
        state.hover(Some(3), Point::new(10.0, 10.0));
        assert_eq!(state.active_index(COUNT), 4);

        // a real mouse move commits again
        state.hover(Some(2), Point::new(11.0, 10.0));
        assert_eq!(state.active_index(COUNT), 2);
    }

    #[test]
    fn crossing_a_page_boundary_clears_the_hover_override() {
        let mut state = active(4);
        state.hover(Some(2), Point::new(5.0, 5.0));
        assert_eq!(state.hover_override(), Some(2));

        state.toggle_forward(COUNT); // index 3, same page
        assert_eq!(state.hover_override(), Some(2));
        state.toggle_forward(COUNT); // index 4, next page
        assert_eq!(state.hover_override(), None);
    }

    #[test]
    fn page_bounds_follow_the_pointer() {
        let mut state = active(4);
        assert_eq!((state.page_start(COUNT), state.page_end(COUNT)), (0, 4));
        for _ in 0..4 {
            state.toggle_forward(COUNT);
        }
        assert_eq!(state.active_index(COUNT), 5);
        assert_eq!((state.page_start(COUNT), state.page_end(COUNT)), (4, 8));
        // the last page clamps at the item count
        for _ in 0..4 {
            state.toggle_forward(COUNT);
        }
        assert_eq!((state.page_start(COUNT), state.page_end(COUNT)), (8, 10));
    }
}
