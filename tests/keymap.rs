use chrono::{DateTime, Duration, TimeZone, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use tracker_terminal::clock::ManualClock;
use tracker_terminal::keymap::{DispatchOutcome, KEY_SEQUENCE, KeyBindings};
use tracker_terminal::pending::{PendingQueue, Priority, RecordContext, Resolution};
use tracker_terminal::record::MemorySink;
use tracker_terminal::roster::{PlayerRef, TeamSide};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap()
}

fn player(id: &str, number: u32, side: TeamSide) -> PlayerRef {
    PlayerRef {
        id: id.to_string(),
        name: format!("Player {number}"),
        number,
        side,
        team_id: None,
    }
}

fn types(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn press(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
}

fn queue(clock: &ManualClock) -> PendingQueue<&ManualClock, MemorySink> {
    PendingQueue::new(
        clock,
        MemorySink::new(),
        RecordContext {
            match_id: "m1".to_string(),
            created_by: "tracker-1".to_string(),
        },
    )
}

#[test]
fn bindings_follow_keyboard_rows() {
    let bindings = KeyBindings::new(&types(&["pass", "shot", "foul"]));

    assert_eq!(bindings.binding_for('Q'), Some("pass"));
    assert_eq!(bindings.binding_for('W'), Some("shot"));
    assert_eq!(bindings.binding_for('E'), Some("foul"));
    assert_eq!(bindings.binding_for('R'), None);
    assert_eq!(bindings.key_for("shot"), Some('W'));
    assert!(bindings.unreachable().is_empty());
}

#[test]
fn lowercase_keys_match_their_binding() {
    let bindings = KeyBindings::new(&types(&["pass", "shot"]));
    assert_eq!(bindings.binding_for('q'), Some("pass"));
    assert_eq!(bindings.binding_for('w'), Some("shot"));
}

#[test]
fn types_past_the_last_key_are_unreachable() {
    let assigned = (0..28).map(|n| format!("type_{n}")).collect::<Vec<_>>();
    let bindings = KeyBindings::new(&assigned);

    assert_eq!(bindings.bindings().len(), KEY_SEQUENCE.len());
    assert_eq!(bindings.binding_for('M'), Some("type_25"));
    assert_eq!(bindings.unreachable(), &["type_26".to_string(), "type_27".to_string()]);
}

#[test]
fn oldest_slot_is_resolved_first_regardless_of_priority() {
    let clock = ManualClock::new(t0());
    let mut queue = queue(&clock);
    let bindings = KeyBindings::new(&types(&["pass", "shot", "foul"]));

    queue.enqueue(player("p10", 10, TeamSide::Home), t0());
    queue.enqueue(player("p7", 7, TeamSide::Away), t0() + Duration::seconds(2));
    clock.advance_secs(6);

    let rows = queue.snapshot(queue.now());
    assert_eq!(rows[0].priority, Priority::Normal);
    assert_eq!(rows[1].priority, Priority::Urgent);

    let first = bindings.dispatch(press('q'), true, &mut queue);
    let DispatchOutcome::Resolved(Resolution::Recorded(request)) = first else {
        panic!("expected a recorded pass, got {first:?}");
    };
    assert_eq!(request.player_id, "p10");
    assert_eq!(request.event_type, "pass");
    assert_eq!(request.timestamp, t0());

    let second = bindings.dispatch(press('W'), true, &mut queue);
    let DispatchOutcome::Resolved(Resolution::Recorded(request)) = second else {
        panic!("expected a recorded shot, got {second:?}");
    };
    assert_eq!(request.player_id, "p7");
    assert_eq!(request.event_type, "shot");
    assert_eq!(request.timestamp, t0() + Duration::seconds(2));
    assert!(queue.is_empty());
}

#[test]
fn one_press_resolves_exactly_one_slot() {
    let clock = ManualClock::new(t0());
    let mut queue = queue(&clock);
    let bindings = KeyBindings::new(&types(&["pass"]));
    for n in 0..3 {
        queue.enqueue(player(&format!("p{n}"), n, TeamSide::Home), t0() + Duration::seconds(n as i64));
    }

    bindings.dispatch(press('q'), true, &mut queue);

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.sink().records.len(), 1);
}

#[test]
fn unbound_key_changes_nothing() {
    let clock = ManualClock::new(t0());
    let mut queue = queue(&clock);
    let bindings = KeyBindings::new(&types(&["pass", "shot", "foul"]));
    queue.enqueue(player("p10", 10, TeamSide::Home), t0());

    assert_eq!(bindings.dispatch(press('r'), true, &mut queue), DispatchOutcome::Unbound);
    assert_eq!(
        bindings.dispatch(KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE), true, &mut queue),
        DispatchOutcome::Unbound
    );
    assert_eq!(queue.len(), 1);
    assert!(queue.sink().records.is_empty());
}

#[test]
fn offline_and_empty_queue_do_not_emit() {
    let clock = ManualClock::new(t0());
    let mut queue = queue(&clock);
    let bindings = KeyBindings::new(&types(&["pass"]));

    assert_eq!(bindings.dispatch(press('q'), true, &mut queue), DispatchOutcome::Empty);

    queue.enqueue(player("p10", 10, TeamSide::Home), t0());
    assert_eq!(bindings.dispatch(press('q'), false, &mut queue), DispatchOutcome::Offline);
    assert_eq!(queue.len(), 1);
    assert!(queue.sink().records.is_empty());
}

#[test]
fn control_and_alt_chords_are_ignored() {
    let clock = ManualClock::new(t0());
    let mut queue = queue(&clock);
    let bindings = KeyBindings::new(&types(&["pass"]));
    queue.enqueue(player("p10", 10, TeamSide::Home), t0());

    let ctrl = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL);
    let alt = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::ALT);
    assert_eq!(bindings.dispatch(ctrl, true, &mut queue), DispatchOutcome::Ignored);
    assert_eq!(bindings.dispatch(alt, true, &mut queue), DispatchOutcome::Ignored);
    assert_eq!(queue.len(), 1);

    let shifted = KeyEvent::new(KeyCode::Char('Q'), KeyModifiers::SHIFT);
    assert!(matches!(
        bindings.dispatch(shifted, true, &mut queue),
        DispatchOutcome::Resolved(Resolution::Recorded(_))
    ));
}

#[test]
fn empty_assignment_binds_nothing() {
    let clock = ManualClock::new(t0());
    let mut queue = queue(&clock);
    let bindings = KeyBindings::new(&[]);
    queue.enqueue(player("p10", 10, TeamSide::Home), t0());

    assert!(bindings.is_empty());
    assert_eq!(bindings.dispatch(press('q'), true, &mut queue), DispatchOutcome::Unbound);
}
