/// Buffer interaction modes. At most one is active per buffer at any time;
/// entering any mode first exits all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No marking active — plain navigation and editing.
    #[default]
    Idle,
    /// Normal marking — navigation keys extend a stream selection.
    Marking,
    /// Line marking — selection snaps to whole lines.
    LineMarking,
    /// Column marking — rectangular selection at fixed horizontal bounds.
    ColumnMarking,
    /// Caret parked in virtual space beyond the end of a line or the file.
    VirtualCaret,
}

impl Mode {
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Mode::Idle => None,
            Mode::Marking => Some("MARK"),
            Mode::LineMarking => Some("LINE MARK"),
            Mode::ColumnMarking => Some("COLUMN MARK"),
            Mode::VirtualCaret => Some("VIRTUAL"),
        }
    }
}
