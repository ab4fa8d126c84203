use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tourdispatch_core::{DispatchState, model::CollectionPointId};

use crate::app::App;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Plan tours for the selected categories and threshold
    Plan,
    /// Auto-assign every unassigned tour
    AssignAll,
    /// Auto-assign the focused tour
    AssignFocused,
    /// Discard every unassigned tour
    DiscardAll,
    /// Discard the focused tour
    DiscardFocused,
    /// Discard unassigned tours and go back to in-progress tours
    Terminate,
    Focus(usize),
    SelectStop {
        tour_index: usize,
        collection_point: CollectionPointId,
    },
    ClearSelection,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App, state: &DispatchState) -> Action {
    use KeyCode::{Char, Down, Esc, Left, Right, Up};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    if !key.modifiers.is_empty() && key.modifiers != KeyModifiers::SHIFT {
        return Action::None;
    }

    match key.code {
        Char('q') => Action::Quit,
        Char('p') => Action::Plan,
        Char('a') => Action::AssignAll,
        Char('s') => Action::AssignFocused,
        Char('x') => Action::DiscardAll,
        Char('d') => Action::DiscardFocused,
        Char('t') => Action::Terminate,
        Char(digit @ '1'..='4') => {
            if let Some(slot) = digit.to_digit(10).and_then(|value| usize::try_from(value).ok()) {
                app.toggle_category(slot.saturating_sub(1));
            }
            Action::None
        }
        Char('+' | '=') => {
            app.raise_threshold();
            Action::None
        }
        Char('-') => {
            app.lower_threshold();
            Action::None
        }
        Up | Char('k') => focus(app, App::tour_step(state, false)),
        Down | Char('j') => focus(app, App::tour_step(state, true)),
        Left | Char('h') => select_stop(app, state, false),
        Right | Char('l') => select_stop(app, state, true),
        Esc => Action::ClearSelection,
        _ => Action::None,
    }
}

fn focus(app: &mut App, index: Option<usize>) -> Action {
    match index {
        Some(index) => {
            app.stop_cursor = 0;
            Action::Focus(index)
        }
        None => Action::None,
    }
}

fn select_stop(app: &mut App, state: &DispatchState, forward: bool) -> Action {
    let (Some(tour_index), Some(tour)) = (state.active_index(), state.active_tour()) else {
        return Action::None;
    };
    // the first press selects the stop under the cursor instead of moving past it
    let cursor = if state.selected_stop().is_some() {
        app.stop_step(state, forward)
    } else {
        Some(app.stop_cursor)
    };
    cursor
        .and_then(|index| tour.stops.get(index))
        .map_or(Action::None, |stop| Action::SelectStop {
            tour_index,
            collection_point: stop.collection_point.id.clone(),
        })
}
