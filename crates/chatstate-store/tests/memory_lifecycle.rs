//! The lifecycle controller against the in-memory driver.

use serde_json::json;

use chatstate_core::{ConversationKey, Update};
use chatstate_machine::{ConversationMachine, StateRegistry};
use chatstate_store::MemoryStore;

fn machine() -> (ConversationMachine<MemoryStore>, MemoryStore) {
    let registry = StateRegistry::new("store-tests");
    let pony = registry.register_state("BEST_PONY", None).unwrap();
    registry.default_state().on_command("pony", |ctx| {
        let pony = ctx.args().to_string();
        ctx.registry.set("BEST_PONY", Some(json!({ "pony": pony })))?;
        Ok(())
    });
    pony.on_command("forget", |ctx| {
        ctx.registry.set(None::<&str>, None)?;
        Ok(())
    });
    let store = MemoryStore::new();
    (ConversationMachine::new(registry, store.clone()), store)
}

#[test]
fn state_survives_between_updates() {
    let (machine, store) = machine();
    machine
        .process_update(&Update::with_text(1, 10, 20, "/pony Littlepip"))
        .unwrap();
    machine.process_update(&Update::with_text(2, 10, 20, "hello")).unwrap();

    let record = store.get(&ConversationKey::new(Some(10), Some(20))).unwrap();
    assert_eq!(record.state_name, "BEST_PONY");
    assert_eq!(record.state_data, Some(json!({"pony": "Littlepip"})));
}

#[test]
fn returning_to_default_drops_data() {
    let (machine, store) = machine();
    machine
        .process_update(&Update::with_text(1, 10, 20, "/pony Velvet"))
        .unwrap();
    machine.process_update(&Update::with_text(2, 10, 20, "/forget")).unwrap();

    let record = store.get(&ConversationKey::new(Some(10), Some(20))).unwrap();
    assert_eq!(record.state_name, "DEFAULT");
    assert_eq!(record.state_data, None);
}

#[test]
fn group_members_have_separate_states() {
    let (machine, store) = machine();
    machine
        .process_update(&Update::with_text(1, -500, 1, "/pony Littlepip"))
        .unwrap();
    machine.process_update(&Update::with_text(2, -500, 2, "hi")).unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get(&ConversationKey::new(Some(-500), Some(1))).unwrap().state_name,
        "BEST_PONY"
    );
    assert_eq!(
        store.get(&ConversationKey::new(Some(-500), Some(2))).unwrap().state_name,
        "DEFAULT"
    );
}
