/// Every user-facing action, one identifier per command. The external
/// surface of the command layer is invocation by identifier string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    MarkingModeToggle,
    LineMarkingModeToggle,
    ColumnMarkingModeToggle,
    VirtualCaretModeToggle,
    NumpadCopy,
    NumpadCut,
    InsertPaste,
    InsertSwap,
    Repeat,
    ScrollBufferUp,
    ScrollBufferDown,
    LineToTopOfWindow,
    CenterLineInWindow,
    LineToBottomOfWindow,
    TopOfBuffer,
    BottomOfBuffer,
    TopOfWindow,
    EndOfWindow,
    LeftSideOfWindow,
    RightSideOfWindow,
    Home,
    End,
    GoToLine,
    DropBookmark(u8),
    JumpBookmark,
    OpenBookmarksDialog,
    OpenScrapDialog,
    SearchForward,
    SearchBackward,
    ReplaceNext,
    ReplacePrevious,
    WriteAllAndExit,
}

const ID_PREFIX: &str = "brief.commands.";

impl CommandId {
    /// Resolve a command identifier. Accepts the bare name used by the
    /// keybinding table or the fully qualified dotted form.
    pub fn from_id(id: &str) -> Option<Self> {
        let name = id.strip_prefix(ID_PREFIX).unwrap_or(id);
        if let Some(n) = name.strip_prefix("drop_bookmark") {
            let n: u8 = n.parse().ok()?;
            return Some(CommandId::DropBookmark(n));
        }
        let cmd = match name {
            "marking_mode_toggle" => CommandId::MarkingModeToggle,
            "line_marking_mode_toggle" => CommandId::LineMarkingModeToggle,
            "column_marking_mode_toggle" => CommandId::ColumnMarkingModeToggle,
            "virtual_caret_mode_toggle" => CommandId::VirtualCaretModeToggle,
            "numpad_copy" => CommandId::NumpadCopy,
            "numpad_cut" => CommandId::NumpadCut,
            "insert_paste" => CommandId::InsertPaste,
            "insert_swap" => CommandId::InsertSwap,
            "repeat" => CommandId::Repeat,
            "scroll_buffer_up" => CommandId::ScrollBufferUp,
            "scroll_buffer_down" => CommandId::ScrollBufferDown,
            "line_to_top_of_window" => CommandId::LineToTopOfWindow,
            "center_line_in_window" => CommandId::CenterLineInWindow,
            "line_to_bottom_of_window" => CommandId::LineToBottomOfWindow,
            "top_of_buffer" => CommandId::TopOfBuffer,
            "bottom_of_buffer" => CommandId::BottomOfBuffer,
            "top_of_window" => CommandId::TopOfWindow,
            "end_of_window" => CommandId::EndOfWindow,
            "left_side_of_window" => CommandId::LeftSideOfWindow,
            "right_side_of_window" => CommandId::RightSideOfWindow,
            "home" => CommandId::Home,
            "end" => CommandId::End,
            "go_to_line" => CommandId::GoToLine,
            "jump_bookmark" => CommandId::JumpBookmark,
            "open_bookmarks_dialog" => CommandId::OpenBookmarksDialog,
            "open_scrap_dialog" => CommandId::OpenScrapDialog,
            "search_forward" => CommandId::SearchForward,
            "search_backward" => CommandId::SearchBackward,
            "replace_next" => CommandId::ReplaceNext,
            "replace_previous" => CommandId::ReplacePrevious,
            "write_all_and_exit" => CommandId::WriteAllAndExit,
            _ => return None,
        };
        Some(cmd)
    }

    /// Commands that mutate the buffer and must be refused on a read-only
    /// target before anything is touched.
    pub fn needs_modifiable(&self) -> bool {
        matches!(
            self,
            CommandId::NumpadCut
                | CommandId::InsertPaste
                | CommandId::InsertSwap
                | CommandId::Repeat
                | CommandId::ReplaceNext
                | CommandId::ReplacePrevious
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_bare_and_qualified_ids() {
        assert_eq!(CommandId::from_id("home"), Some(CommandId::Home));
        assert_eq!(
            CommandId::from_id("brief.commands.numpad_copy"),
            Some(CommandId::NumpadCopy)
        );
        assert_eq!(CommandId::from_id("no_such_command"), None);
    }

    #[test]
    fn resolves_numbered_bookmark_drops() {
        assert_eq!(CommandId::from_id("drop_bookmark1"), Some(CommandId::DropBookmark(1)));
        assert_eq!(
            CommandId::from_id("brief.commands.drop_bookmark10"),
            Some(CommandId::DropBookmark(10))
        );
        assert_eq!(CommandId::from_id("drop_bookmarkx"), None);
    }
}
