//! End-to-end tests of the update lifecycle against a recording driver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use chatstate_core::{ConversationKey, StateData, StateName, StorageError, Update};
use chatstate_machine::{ConversationMachine, LoadedState, StateRegistry, StorageDriver};

#[derive(Default)]
struct RecordingDriver {
    records: Mutex<HashMap<ConversationKey, (String, StateData)>>,
    loads: AtomicUsize,
    saves: Mutex<Vec<(ConversationKey, String, StateData)>>,
}

impl RecordingDriver {
    fn seeded(key: ConversationKey, name: &str, data: StateData) -> Self {
        let driver = Self::default();
        driver.records.lock().insert(key, (name.to_string(), data));
        driver
    }

    fn last_save(&self) -> (ConversationKey, String, StateData) {
        self.saves.lock().last().cloned().expect("nothing saved")
    }
}

impl StorageDriver for RecordingDriver {
    fn load(&self, key: &ConversationKey) -> Result<LoadedState, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(match self.records.lock().get(key) {
            Some((name, data)) => LoadedState::new(name.clone(), data.clone()),
            None => LoadedState::empty(),
        })
    }

    fn save(&self, key: &ConversationKey, state_name: &StateName, state_data: StateData) -> Result<(), StorageError> {
        self.records
            .lock()
            .insert(*key, (state_name.to_string(), state_data.clone()));
        self.saves.lock().push((*key, state_name.to_string(), state_data));
        Ok(())
    }
}

fn key() -> ConversationKey {
    ConversationKey::new(Some(1234), Some(4458))
}

fn text(update_id: i64, body: &str) -> Update {
    Update::with_text(update_id, 1234, 4458, body)
}

#[test]
fn loaded_state_is_saved_back_when_nothing_transitions() {
    let registry = StateRegistry::new("ponies");
    registry.register_state("BEST_PONY", None).unwrap();
    let driver = RecordingDriver::seeded(key(), "BEST_PONY", Some(json!({"k": 1})));
    let machine = ConversationMachine::new(registry, driver);

    let report = machine.process_update(&text(1, "hello")).unwrap();

    assert!(report.is_clean());
    assert!(!report.transitioned());
    assert_eq!(
        machine.driver().last_save(),
        (key(), "BEST_PONY".to_string(), Some(json!({"k": 1})))
    );
}

#[test]
fn missing_record_starts_in_default() {
    let registry = StateRegistry::new("ponies");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    registry.default_state().on_update(move |ctx| {
        s.lock().push(ctx.registry.current().name().to_string());
        Ok(())
    });
    let machine = ConversationMachine::new(registry, RecordingDriver::default());

    machine.process_update(&text(1, "hello")).unwrap();

    assert_eq!(*seen.lock(), vec!["DEFAULT".to_string()]);
    assert_eq!(machine.driver().last_save(), (key(), "DEFAULT".to_string(), None));
}

#[test]
fn failing_current_handler_does_not_block_all() {
    let registry = StateRegistry::new("ponies");
    let all_ran = Arc::new(AtomicUsize::new(0));
    registry.default_state().on_update(|_| anyhow::bail!("current exploded"));
    let a = Arc::clone(&all_ran);
    registry.all_state().on_update(move |_| {
        a.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let machine = ConversationMachine::new(registry, RecordingDriver::default());

    let report = machine.process_update(&text(1, "hello")).unwrap();

    assert_eq!(all_ran.load(Ordering::SeqCst), 1);
    assert!(report.current_error.is_some());
    assert!(report.all_error.is_none());
    assert_eq!(machine.driver().saves.lock().len(), 1);
}

#[test]
fn failing_all_handler_does_not_undo_current() {
    let registry = StateRegistry::new("ponies");
    registry.register_state("ASK_NAME", None).unwrap();
    registry.default_state().on_command("start", |ctx| {
        ctx.registry.set("ASK_NAME", Some(json!({"asked": true})))?;
        Ok(())
    });
    registry.all_state().on_update(|_| anyhow::bail!("all exploded"));
    let machine = ConversationMachine::new(registry, RecordingDriver::default());

    let report = machine.process_update(&text(1, "/start")).unwrap();

    assert!(report.current_error.is_none());
    assert!(report.all_error.unwrap().contains("all exploded"));
    assert_eq!(
        machine.driver().last_save(),
        (key(), "ASK_NAME".to_string(), Some(json!({"asked": true})))
    );
}

#[test]
fn post_dispatch_current_is_persisted() {
    let registry = StateRegistry::new("ponies");
    registry.register_state("ASK_NAME", None).unwrap();
    let confirm = registry.register_state("CONFIRM", None).unwrap();
    registry.get("ASK_NAME").unwrap().on_text(|ctx| {
        let name = ctx.args().to_string();
        ctx.registry.set("CONFIRM", Some(json!({"name": name})))?;
        Ok(())
    });
    let driver = RecordingDriver::seeded(key(), "ASK_NAME", None);
    let machine = ConversationMachine::new(registry, driver);

    let report = machine.process_update(&text(1, "Littlepip")).unwrap();

    assert_eq!(report.loaded_state, "ASK_NAME");
    assert_eq!(report.saved_state, "CONFIRM");
    assert_eq!(confirm.data(), Some(json!({"name": "Littlepip"})));
    assert_eq!(
        machine.driver().last_save(),
        (key(), "CONFIRM".to_string(), Some(json!({"name": "Littlepip"})))
    );
}

#[test]
fn all_handlers_can_transition_from_any_state() {
    let registry = StateRegistry::new("ponies");
    registry.register_state("DEEP", None).unwrap();
    registry.all_state().on_command("cancel", |ctx| {
        ctx.registry.set(None::<&str>, None)?;
        Ok(())
    });
    let driver = RecordingDriver::seeded(key(), "DEEP", Some(json!([1, 2, 3])));
    let machine = ConversationMachine::new(registry, driver);

    machine.process_update(&text(1, "/cancel")).unwrap();

    assert_eq!(machine.driver().last_save(), (key(), "DEFAULT".to_string(), None));
}

#[test]
fn conversations_do_not_share_data() {
    let registry = StateRegistry::new("ponies");
    let counter = registry.register_state("COUNTING", None).unwrap();
    counter.on_text(|ctx| {
        let n = ctx.state.data().and_then(|v| v.as_i64()).unwrap_or(0);
        ctx.state.set_data(Some(json!(n + 1)));
        Ok(())
    });
    let alice = ConversationKey::new(Some(1), Some(1));
    let bob = ConversationKey::new(Some(2), Some(2));
    let driver = RecordingDriver::seeded(alice, "COUNTING", Some(json!(5)));
    driver
        .records
        .lock()
        .insert(bob, ("COUNTING".to_string(), None));
    let machine = ConversationMachine::new(registry, driver);

    machine.process_update(&Update::with_text(1, 1, 1, "tick")).unwrap();
    machine.process_update(&Update::with_text(2, 2, 2, "tick")).unwrap();
    machine.process_update(&Update::with_text(3, 1, 1, "tick")).unwrap();

    let records = machine.driver().records.lock();
    assert_eq!(records[&alice].1, Some(json!(7)));
    assert_eq!(records[&bob].1, Some(json!(1)));
}

#[test]
fn every_update_loads_and_saves_once() {
    let registry = StateRegistry::new("ponies");
    let machine = ConversationMachine::new(registry, RecordingDriver::default());

    for id in 0..3 {
        machine.process_update(&text(id, "x")).unwrap();
    }

    assert_eq!(machine.driver().loads.load(Ordering::SeqCst), 3);
    assert_eq!(machine.driver().saves.lock().len(), 3);
}

#[test]
fn unknown_conversation_is_still_processed() {
    let registry = StateRegistry::new("ponies");
    let machine = ConversationMachine::new(registry, RecordingDriver::default());

    let report = machine.process_update(&Update::new(99)).unwrap();

    assert!(report.key.is_unknown());
    assert_eq!(machine.driver().last_save().0, ConversationKey::unknown());
}

#[test]
fn machine_can_be_shared_across_threads() {
    let registry = StateRegistry::new("ponies");
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    registry.all_state().on_update(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let machine = Arc::new(ConversationMachine::new(registry, RecordingDriver::default()));

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let machine = Arc::clone(&machine);
            std::thread::spawn(move || {
                for i in 0..10 {
                    machine
                        .process_update(&Update::with_text(n * 100 + i, n, n, "x"))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 40);
    assert_eq!(machine.driver().saves.lock().len(), 40);
}
