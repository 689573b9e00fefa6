use crossterm::event::{KeyEvent, MouseEvent};

use crate::command::CommandId;

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),

    // -- Command invocation by identifier
    Command(CommandId),

    // -- System
    Tick,
    Quit,
}
