use std::collections::BTreeSet;

use tokio::sync::watch;
use tourdispatch_core::{
    DispatchHandle, DispatchState, MarkerSet,
    config::PlanningConfig,
    model::{Category, FillThreshold},
};

const THRESHOLD_STEP: u8 = 5;

pub(crate) struct App {
    pub handle: DispatchHandle,
    pub markers: watch::Receiver<MarkerSet>,

    pub categories: BTreeSet<Category>,
    pub threshold: FillThreshold,

    // cursor within the stops of the focused tour
    pub stop_cursor: usize,
}

impl App {
    pub(crate) fn new(
        handle: DispatchHandle,
        markers: watch::Receiver<MarkerSet>,
        planning: &PlanningConfig,
        threshold: FillThreshold,
    ) -> Self {
        Self {
            handle,
            markers,
            categories: planning.default_categories.clone(),
            threshold,
            stop_cursor: 0,
        }
    }

    pub(crate) fn snapshot(&self) -> DispatchState {
        self.handle.snapshot()
    }

    pub(crate) fn fleet(&self) -> MarkerSet {
        self.markers.borrow().clone()
    }

    /// Toggle the category at `slot` of [`Category::ALL`].
    pub(crate) fn toggle_category(&mut self, slot: usize) {
        let Some(category) = Category::ALL.get(slot).copied() else {
            return;
        };
        if !self.categories.remove(&category) {
            self.categories.insert(category);
        }
    }

    pub(crate) fn raise_threshold(&mut self) {
        let next = self.threshold.percent().saturating_add(THRESHOLD_STEP).min(100);
        if let Ok(threshold) = FillThreshold::new(next) {
            self.threshold = threshold;
        }
    }

    pub(crate) fn lower_threshold(&mut self) {
        let next = self.threshold.percent().saturating_sub(THRESHOLD_STEP);
        if let Ok(threshold) = FillThreshold::new(next) {
            self.threshold = threshold;
        }
    }

    /// Index of the tour after (or before) the focused one, if it exists.
    pub(crate) fn tour_step(state: &DispatchState, forward: bool) -> Option<usize> {
        let current = state.active_index()?;
        let next = if forward {
            current.checked_add(1)?
        } else {
            current.checked_sub(1)?
        };
        (next < state.tours().len()).then_some(next)
    }

    /// Move the stop cursor and return the stop it now points at.
    pub(crate) fn stop_step(&mut self, state: &DispatchState, forward: bool) -> Option<usize> {
        let stops = state.active_tour()?.stops.len();
        if stops == 0 {
            return None;
        }
        let current = self.stop_cursor.min(stops - 1);
        self.stop_cursor = if forward {
            (current + 1).min(stops - 1)
        } else {
            current.saturating_sub(1)
        };
        Some(self.stop_cursor)
    }
}
