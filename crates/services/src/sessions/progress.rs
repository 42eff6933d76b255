/// Aggregated view of course progress within a session, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub completed: usize,
    pub percent: u8,
    pub current_index: Option<usize>,
}
