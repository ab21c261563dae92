/// A change in the user-visible state of a stack, as shown by undo/redo
/// actions and the document's modified marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    CleanChanged(bool),
    CanUndoChanged(bool),
    CanRedoChanged(bool),
    UndoTextChanged(Option<String>),
    RedoTextChanged(Option<String>),
}

/// Receives [`StackEvent`]s from a stack or a stack group.
///
/// Any `FnMut(&StackEvent) + Send` closure is an observer.
pub trait StackObserver: Send {
    fn notify(&mut self, event: &StackEvent);
}

impl<F> StackObserver for F
where
    F: FnMut(&StackEvent) + Send,
{
    fn notify(&mut self, event: &StackEvent) {
        self(event);
    }
}

/// Snapshot of everything a [`StackEvent`] can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackState {
    pub clean: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_text: Option<String>,
    pub redo_text: Option<String>,
}

impl Default for StackState {
    /// The state of an empty, saved stack. Also reported by a group with no
    /// active stack.
    fn default() -> Self {
        Self {
            clean: true,
            can_undo: false,
            can_redo: false,
            undo_text: None,
            redo_text: None,
        }
    }
}

impl StackState {
    /// Events turning `self` into `next`, one per field that differs.
    #[must_use]
    pub fn diff(&self, next: &StackState) -> Vec<StackEvent> {
        let mut events = Vec::new();
        if self.clean != next.clean {
            events.push(StackEvent::CleanChanged(next.clean));
        }
        if self.can_undo != next.can_undo {
            events.push(StackEvent::CanUndoChanged(next.can_undo));
        }
        if self.can_redo != next.can_redo {
            events.push(StackEvent::CanRedoChanged(next.can_redo));
        }
        if self.undo_text != next.undo_text {
            events.push(StackEvent::UndoTextChanged(next.undo_text.clone()));
        }
        if self.redo_text != next.redo_text {
            events.push(StackEvent::RedoTextChanged(next.redo_text.clone()));
        }
        events
    }
}

pub(crate) fn notify_diff(
    observer: Option<&mut Box<dyn StackObserver>>,
    before: &StackState,
    after: &StackState,
) {
    if let Some(observer) = observer {
        for event in before.diff(after) {
            observer.notify(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_unchanged() {
        let state = StackState::default();
        assert!(state.diff(&state.clone()).is_empty());
    }

    #[test]
    fn test_diff_reports_changed_fields() {
        let before = StackState::default();
        let after = StackState {
            clean: false,
            can_undo: true,
            undo_text: Some("move".to_owned()),
            ..StackState::default()
        };

        assert_eq!(
            before.diff(&after),
            vec![
                StackEvent::CleanChanged(false),
                StackEvent::CanUndoChanged(true),
                StackEvent::UndoTextChanged(Some("move".to_owned())),
            ]
        );
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: &StackEvent| seen.push(event.clone());
            observer.notify(&StackEvent::CanRedoChanged(true));
        }
        assert_eq!(seen, vec![StackEvent::CanRedoChanged(true)]);
    }
}
