/// Result of a backend deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The object was already absent.
    NotFound,
    /// The object is still referenced and can't be deleted yet.
    Busy,
}
