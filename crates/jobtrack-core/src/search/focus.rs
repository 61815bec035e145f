/// Cursor state of the search input, taken right before a state update.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FocusSnapshot {
    pub selection_start: Option<usize>,
    pub selection_end: Option<usize>,
    pub had_focus: bool,
}

impl FocusSnapshot {
    pub fn focused(selection_start: usize, selection_end: usize) -> Self {
        Self {
            selection_start: Some(selection_start),
            selection_end: Some(selection_end),
            had_focus: true,
        }
    }
}

/// The input element whose focus and selection survive re-renders.
///
/// `restore` is called after the new state has been published and only when
/// the captured snapshot had focus. Implementations must not call back into
/// the coordinator.
pub trait FocusTarget: Send + Sync {
    fn capture(&self) -> FocusSnapshot;

    fn restore(&self, snapshot: &FocusSnapshot);
}
