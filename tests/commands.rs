//! Dispatcher-level flows: commands routed through the full app, with an
//! in-memory clipboard and state store.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use brief_tui::app::App;
use brief_tui::clipboard::MemoryClipboard;
use brief_tui::command::CommandId;
use brief_tui::model::buffer::Buffer;
use brief_tui::model::config::AppConfig;
use brief_tui::model::mode::Mode;
use brief_tui::model::position::CellPoint;
use brief_tui::msg::Msg;
use brief_tui::storage::StateStore;

fn make_app(text: &str) -> (App, mpsc::Receiver<Msg>) {
    let config = AppConfig::defaults().expect("valid default config");
    let (tx, rx) = mpsc::channel();
    let mut app = App::new(
        config,
        tx,
        Box::new(MemoryClipboard::new()),
        StateStore::in_memory(),
    )
    .expect("app construction");
    app.modes.set_handshake_enabled(false);

    let mut buffer = Buffer::from_str(text);
    buffer.path = Some(PathBuf::from("/tmp/commands-test.txt"));
    app.buffer = Some(buffer);
    (app, rx)
}

fn press(app: &mut App, code: KeyCode, mods: KeyModifiers) {
    app.update(Msg::Key(KeyEvent::new(code, mods))).unwrap();
}

fn buffer_text(app: &App) -> String {
    app.buffer.as_ref().unwrap().rope.to_string()
}

fn caret(app: &App) -> usize {
    app.buffer.as_ref().unwrap().caret()
}

#[test]
fn entering_a_second_mode_exits_the_first() {
    let (mut app, _rx) = make_app("one\ntwo\nthree\n");

    app.dispatch(CommandId::MarkingModeToggle);
    assert_eq!(app.modes.mode(), Mode::Marking);

    app.dispatch(CommandId::ColumnMarkingModeToggle);
    assert_eq!(app.modes.mode(), Mode::ColumnMarking);

    app.dispatch(CommandId::LineMarkingModeToggle);
    assert_eq!(app.modes.mode(), Mode::LineMarking);

    app.dispatch(CommandId::LineMarkingModeToggle);
    assert_eq!(app.modes.mode(), Mode::Idle);
}

#[test]
fn copy_without_selection_takes_the_whole_line() {
    let (mut app, _rx) = make_app("alpha\nbeta\n");
    app.buffer.as_mut().unwrap().set_caret(7); // inside "beta"

    app.dispatch(CommandId::NumpadCopy);

    assert_eq!(app.scrap.item_count(), 1);
    assert_eq!(app.scrap.get(0).unwrap().text, "beta\n");
    assert!(!app.scrap.get(0).unwrap().is_column_content());
    // The copy leaves the buffer untouched.
    assert_eq!(buffer_text(&app), "alpha\nbeta\n");
}

#[test]
fn copying_the_same_text_twice_does_not_duplicate_scrap() {
    let (mut app, _rx) = make_app("alpha\nbeta\n");

    app.dispatch(CommandId::NumpadCopy);
    app.buffer.as_mut().unwrap().set_caret(0);
    app.dispatch(CommandId::NumpadCopy);

    assert_eq!(app.scrap.item_count(), 1);
    assert_eq!(app.scrap.get(0).unwrap().text, "alpha\n");
}

#[test]
fn cut_then_paste_round_trips_through_the_clipboard() {
    let (mut app, _rx) = make_app("alpha\nbeta\n");

    app.dispatch(CommandId::NumpadCut);
    assert_eq!(buffer_text(&app), "beta\n");
    assert_eq!(app.scrap.get(0).unwrap().text, "alpha\n");

    app.dispatch(CommandId::InsertPaste);
    assert_eq!(buffer_text(&app), "alpha\nbeta\n");
}

#[test]
fn column_copy_records_block_geometry_and_block_paste_restores_it() {
    let (mut app, _rx) = make_app("abcdef\nghijkl\nmnopqr\n");

    app.dispatch(CommandId::ColumnMarkingModeToggle);
    {
        let buffer = app.buffer.as_mut().unwrap();
        buffer.set_block_anchor(CellPoint::new(0, 1));
        buffer.extend_block_to(CellPoint::new(1, 3));
    }
    app.dispatch(CommandId::NumpadCopy);

    assert_eq!(app.modes.mode(), Mode::Idle);
    let front = app.scrap.get(0).unwrap();
    assert_eq!(front.text, "bc\nhi");
    assert_eq!(front.block_size, Some((2, 2)));

    // Block paste at the end of the short document pads what it must.
    app.buffer.as_mut().unwrap().set_caret(14); // start of "mnopqr"
    app.dispatch(CommandId::InsertPaste);
    assert_eq!(buffer_text(&app), "abcdef\nghijkl\nbcmnopqr\nhi");
}

#[test]
fn swap_exchanges_selection_with_clipboard_without_double_counting() {
    let (mut app, _rx) = make_app("hello world\n");
    {
        let buffer = app.buffer.as_mut().unwrap();
        buffer.set_selection(0, 5); // "hello"
    }
    // Something copied earlier sits on the clipboard.
    app.scrap
        .sync_with_system_clipboard(&mut MemoryClipboard::with_contents("ignored"), None);
    app.dispatch(CommandId::NumpadCopy); // put "hello" on the clipboard
    {
        let buffer = app.buffer.as_mut().unwrap();
        buffer.set_selection(6, 11); // "world"
    }

    app.dispatch(CommandId::InsertSwap);

    assert_eq!(buffer_text(&app), "hello hello\n");
    // Scrap history: "world" (the cut), then "hello" (the earlier copy),
    // then the pre-existing clipboard content — each exactly once.
    let texts: Vec<&str> = app.scrap.items().iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["world", "hello", "ignored"]);
}

#[test]
fn read_only_buffers_refuse_mutating_commands() {
    let (mut app, _rx) = make_app("text\n");
    app.buffer.as_mut().unwrap().read_only = true;

    app.dispatch(CommandId::NumpadCut);

    assert_eq!(buffer_text(&app), "text\n");
    assert_eq!(app.status.as_deref(), Some("buffer is not modifiable"));
}

#[test]
fn repeat_dialog_inserts_string_count_times() {
    let (mut app, _rx) = make_app("");

    app.dispatch(CommandId::Repeat);
    assert!(app.dialog.is_some());

    press(&mut app, KeyCode::Char('3'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Right, KeyModifiers::NONE);
    press(&mut app, KeyCode::Char('a'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Char('b'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    assert!(app.dialog.is_none());
    assert_eq!(buffer_text(&app), "ababab");
}

#[test]
fn repeat_dialog_expands_escapes_in_strings() {
    let (mut app, _rx) = make_app("");

    app.dispatch(CommandId::Repeat);
    press(&mut app, KeyCode::Char('2'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Right, KeyModifiers::NONE);
    for c in "x\\ny".chars() {
        press(&mut app, KeyCode::Char(c), KeyModifiers::NONE);
    }
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    assert_eq!(buffer_text(&app), "x\nyx\ny");
}

#[test]
fn repeat_dialog_replays_captured_chord() {
    let (mut app, rx) = make_app("one two one two\n");

    app.dispatch(CommandId::Repeat);
    // Capture the chord bound to numpad_copy (Alt+=): with no selection it
    // copies the whole current line, so two replays still leave one scrap
    // entry (dedup) with the line's text.
    press(&mut app, KeyCode::Char('2'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Char('='), KeyModifiers::ALT);
    assert!(app.dialog.is_some());

    // The dialog closes on its own after the capture delay.
    std::thread::sleep(Duration::from_millis(400));
    app.update(Msg::Tick).unwrap();
    assert!(app.dialog.is_none());

    // Drain the synthesized replay events back through the app.
    while let Ok(msg) = rx.try_recv() {
        app.update(msg).unwrap();
    }

    assert_eq!(app.scrap.item_count(), 1);
    assert_eq!(app.scrap.get(0).unwrap().text, "one two one two\n");
}

#[test]
fn commands_are_suspended_while_a_dialog_is_open() {
    let (mut app, _rx) = make_app("line one\nline two\n");
    app.buffer.as_mut().unwrap().set_caret(4);

    app.dispatch(CommandId::Repeat);
    app.dispatch(CommandId::TopOfBuffer);

    assert_eq!(caret(&app), 4);
    assert!(app.dialog.is_some());
}

#[test]
fn home_walks_line_then_window_then_file() {
    let (mut app, _rx) = make_app("zero\none\ntwo\nthree\nfour\n");
    {
        let buffer = app.buffer.as_mut().unwrap();
        buffer.viewport.height = 3;
        buffer.viewport.scroll_off = 0;
        buffer.set_top_index(2);
        buffer.set_caret(14); // inside "three"
    }

    app.dispatch(CommandId::Home);
    assert_eq!(caret(&app), 13); // start of "three"

    app.dispatch(CommandId::Home);
    assert_eq!(caret(&app), 9); // start of the window's top line, "two"

    app.dispatch(CommandId::Home);
    assert_eq!(caret(&app), 0); // start of file

    // At the very start, home is a no-op.
    app.dispatch(CommandId::Home);
    assert_eq!(caret(&app), 0);
}

#[test]
fn end_walks_line_then_window_then_file() {
    let (mut app, _rx) = make_app("zero\none\ntwo\nthree\n");
    {
        let buffer = app.buffer.as_mut().unwrap();
        buffer.viewport.height = 2;
        buffer.viewport.scroll_off = 0;
        buffer.set_top_index(0);
        buffer.set_caret(0);
    }

    app.dispatch(CommandId::End);
    assert_eq!(caret(&app), 4); // end of "zero"

    app.dispatch(CommandId::End);
    assert_eq!(caret(&app), 8); // end of "one", the window's bottom line

    app.dispatch(CommandId::End);
    assert_eq!(caret(&app), 19); // end of file
}

#[test]
fn virtual_caret_toggle_falls_back_past_line_end_and_any_key_exits() {
    let (mut app, _rx) = make_app("short\n");

    app.dispatch(CommandId::VirtualCaretModeToggle);
    assert_eq!(app.modes.mode(), Mode::VirtualCaret);
    assert!(app.buffer.as_ref().unwrap().block_mode());

    press(&mut app, KeyCode::Char('x'), KeyModifiers::NONE);
    assert_eq!(app.modes.mode(), Mode::Idle);
    // The keystroke that ended the mode still typed.
    assert!(buffer_text(&app).contains('x'));
}

#[test]
fn goto_line_dialog_moves_the_caret() {
    let (mut app, _rx) = make_app("one\ntwo\nthree\nfour\n");

    app.dispatch(CommandId::GoToLine);
    assert!(app.dialog.is_some());
    press(&mut app, KeyCode::Char('3'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    assert!(app.dialog.is_none());
    assert_eq!(caret(&app), 8); // start of "three"
}

#[test]
fn goto_line_clamps_to_the_last_line() {
    let (mut app, _rx) = make_app("one\ntwo\n");

    app.dispatch(CommandId::GoToLine);
    for c in "999".chars() {
        press(&mut app, KeyCode::Char(c), KeyModifiers::NONE);
    }
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    // Caret lands on the final (empty) line's start.
    assert_eq!(caret(&app), 8);
}

#[test]
fn bookmarks_drop_jump_and_survive_the_dialog_path() {
    let (mut app, _rx) = make_app("one\ntwo\nthree\n");
    app.buffer.as_mut().unwrap().set_caret(6);

    app.dispatch(CommandId::DropBookmark(3));
    assert_eq!(app.bookmarks.get(3).unwrap().offset, 6);

    app.buffer.as_mut().unwrap().set_caret(0);

    app.dispatch(CommandId::JumpBookmark);
    assert!(app.dialog.is_some());
    press(&mut app, KeyCode::Char('3'), KeyModifiers::NONE);
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    assert_eq!(caret(&app), 6);
}

#[test]
fn marking_mode_key_chord_flow_extends_selection() {
    let (mut app, _rx) = make_app("alpha\nbeta\ngamma\n");

    // Alt+M enters marking; arrows then extend the selection.
    press(&mut app, KeyCode::Char('m'), KeyModifiers::ALT);
    assert_eq!(app.modes.mode(), Mode::Marking);

    press(&mut app, KeyCode::Down, KeyModifiers::NONE);
    press(&mut app, KeyCode::Right, KeyModifiers::NONE);

    let buffer = app.buffer.as_ref().unwrap();
    assert_eq!(buffer.selection_range(), Some((0, 7)));
}

#[test]
fn typing_during_marking_cancels_and_inserts() {
    let (mut app, _rx) = make_app("alpha\n");

    press(&mut app, KeyCode::Char('m'), KeyModifiers::ALT);
    press(&mut app, KeyCode::Down, KeyModifiers::NONE);
    press(&mut app, KeyCode::Char('z'), KeyModifiers::NONE);

    assert_eq!(app.modes.mode(), Mode::Idle);
    assert!(buffer_text(&app).contains('z'));
    assert_eq!(app.buffer.as_ref().unwrap().selection_range(), None);
}

#[test]
fn line_marking_snaps_selection_to_whole_lines() {
    let (mut app, _rx) = make_app("one\ntwo\nthree\n");
    app.buffer.as_mut().unwrap().set_caret(5); // inside "two"

    press(&mut app, KeyCode::Char('l'), KeyModifiers::ALT);
    assert_eq!(app.modes.mode(), Mode::LineMarking);
    assert_eq!(
        app.buffer.as_ref().unwrap().selected_text().as_deref(),
        Some("two\n")
    );

    press(&mut app, KeyCode::Down, KeyModifiers::NONE);
    assert_eq!(
        app.buffer.as_ref().unwrap().selected_text().as_deref(),
        Some("two\nthree\n")
    );
}

#[test]
fn search_prompt_finds_and_wraps() {
    let (mut app, _rx) = make_app("needle hay needle\n");
    app.buffer.as_mut().unwrap().set_caret(8);

    app.dispatch(CommandId::SearchForward);
    for c in "needle".chars() {
        press(&mut app, KeyCode::Char(c), KeyModifiers::NONE);
    }
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    assert_eq!(
        app.buffer.as_ref().unwrap().selection_range(),
        Some((11, 17))
    );

    // From past the last match the search wraps to the first.
    app.buffer.as_mut().unwrap().set_caret(18);
    app.dispatch(CommandId::SearchForward);
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
    assert_eq!(app.buffer.as_ref().unwrap().selection_range(), Some((0, 6)));
}

#[test]
fn scrap_dialog_lists_and_pastes_a_chosen_item() {
    let (mut app, _rx) = make_app("one\ntwo\n");

    app.dispatch(CommandId::NumpadCopy); // "one\n"
    app.buffer.as_mut().unwrap().set_caret(4);
    app.dispatch(CommandId::NumpadCopy); // "two\n"
    app.buffer.as_mut().unwrap().set_caret(0);

    app.dispatch(CommandId::OpenScrapDialog);
    assert!(app.dialog.is_some());
    // Select the second entry ("one\n") and paste it.
    press(&mut app, KeyCode::Down, KeyModifiers::NONE);
    press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

    assert_eq!(buffer_text(&app), "one\none\ntwo\n");
    // A dialog paste inserts the item verbatim; the history order only
    // changes when something new crosses the clipboard.
    assert_eq!(app.scrap.get(0).unwrap().text, "two\n");
    assert_eq!(app.scrap.get(1).unwrap().text, "one\n");
}
