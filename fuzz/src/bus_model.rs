//! In-memory model of the accessor surface for property-based testing.
//!
//! Every operation is applied both to a real [`StateBus`] over a heap
//! segment and to a plain mirror of the protocol's fields; afterwards the
//! whole readable surface is compared against the mirror. Any divergence
//! is a broken field invariant.

use statebus::layout::FREE_REGION_LEN;
use statebus::{BusError, ControlKey, HostState, StateBus, TextField, MAX_TEXT_LEN};

/// One operation against the bus.
#[derive(Debug, Clone)]
pub enum BusOp {
    SetCurrentState(HostState),
    RequestState(HostState),
    SetCurrentStateNamed(String),
    RequestStateNamed(String),
    SetText(TextField, String),
    SetKey(ControlKey, bool),
    SetKeyNamed(String, bool),
    RecordAction(String),
    WriteFree(u16, Vec<u8>),
}

/// Plain mirror of every field the protocol defines.
struct Mirror {
    current: HostState,
    requested: HostState,
    texts: [String; 4],
    keys: [bool; 7],
    action_name: String,
    action_count: u16,
    free: Vec<u8>,
}

impl Mirror {
    fn new() -> Self {
        Self {
            current: HostState::NotRunning,
            requested: HostState::NotRunning,
            texts: Default::default(),
            keys: [false; 7],
            action_name: String::new(),
            action_count: 0,
            free: vec![0; FREE_REGION_LEN],
        }
    }

    fn is_change_requested(&self) -> bool {
        self.requested != HostState::NotRunning && self.requested != self.current
    }
}

fn text_index(field: TextField) -> usize {
    TextField::ALL
        .iter()
        .position(|&f| f == field)
        .expect("field in ALL")
}

fn key_index(key: ControlKey) -> usize {
    ControlKey::ALL
        .iter()
        .position(|&k| k == key)
        .expect("key in ALL")
}

/// Apply `ops` to a fresh heap-backed bus, checking the full readable
/// surface against the mirror after every step.
pub fn execute_and_verify(ops: &[BusOp]) -> Result<(), String> {
    let bus = StateBus::in_memory();
    let mut mirror = Mirror::new();

    // A fresh segment must decode to all-default values.
    verify(&bus, &mirror)?;

    for op in ops {
        apply(&bus, &mut mirror, op)?;
        verify(&bus, &mirror)?;
    }
    Ok(())
}

fn apply(bus: &StateBus, mirror: &mut Mirror, op: &BusOp) -> Result<(), String> {
    match op {
        BusOp::SetCurrentState(state) => {
            bus.set_current_state(*state);
            mirror.current = *state;
        }
        BusOp::RequestState(state) => {
            bus.request_state(*state);
            mirror.requested = *state;
        }
        BusOp::SetCurrentStateNamed(name) => {
            let accepted = bus.set_current_state_named(name);
            let known = HostState::from_name(name);
            if accepted != known.is_some() {
                return Err(format!("set_current_state_named({name:?}) -> {accepted}"));
            }
            if let Some(state) = known {
                mirror.current = state;
            }
        }
        BusOp::RequestStateNamed(name) => {
            let accepted = bus.request_state_named(name);
            let known = HostState::from_name(name);
            if accepted != known.is_some() {
                return Err(format!("request_state_named({name:?}) -> {accepted}"));
            }
            if let Some(state) = known {
                mirror.requested = state;
            }
        }
        BusOp::SetText(field, text) => match bus.set_text(*field, text) {
            Ok(()) => {
                if text.len() > MAX_TEXT_LEN {
                    return Err(format!("oversized write accepted on {field:?}"));
                }
                mirror.texts[text_index(*field)] = text.clone();
            }
            Err(BusError::TextTooLong { len }) => {
                if text.len() <= MAX_TEXT_LEN {
                    return Err(format!("in-range write rejected as {len}-byte overflow"));
                }
            }
            Err(e) => return Err(format!("unexpected set_text error: {e}")),
        },
        BusOp::SetKey(key, pressed) => {
            bus.set_key(*key, *pressed);
            mirror.keys[key_index(*key)] = *pressed;
        }
        BusOp::SetKeyNamed(name, pressed) => {
            let accepted = bus.set_key_named(name, *pressed);
            let known = ControlKey::from_name(name);
            if accepted != known.is_some() {
                return Err(format!("set_key_named({name:?}) -> {accepted}"));
            }
            if let Some(key) = known {
                mirror.keys[key_index(key)] = *pressed;
            }
        }
        BusOp::RecordAction(name) => match bus.record_action(name) {
            Ok(()) => {
                if name.len() > MAX_TEXT_LEN {
                    return Err("oversized action name accepted".into());
                }
                // The stored 256-byte image is zero-padded, so image
                // equality is name equality.
                if *name == mirror.action_name {
                    mirror.action_count = mirror.action_count.wrapping_add(1);
                } else {
                    mirror.action_count = 1;
                }
                mirror.action_name = name.clone();
            }
            Err(BusError::TextTooLong { .. }) => {
                if name.len() <= MAX_TEXT_LEN {
                    return Err("in-range action name rejected".into());
                }
            }
            Err(e) => return Err(format!("unexpected record_action error: {e}")),
        },
        BusOp::WriteFree(offset, bytes) => {
            let offset = *offset as usize;
            match bus.write_free(offset, bytes) {
                Ok(()) => {
                    if offset + bytes.len() > FREE_REGION_LEN {
                        return Err("out-of-window free write accepted".into());
                    }
                    mirror.free[offset..offset + bytes.len()].copy_from_slice(bytes);
                }
                Err(BusError::OutOfBounds { .. }) => {
                    if offset + bytes.len() <= FREE_REGION_LEN {
                        return Err("in-window free write rejected".into());
                    }
                }
                Err(e) => return Err(format!("unexpected write_free error: {e}")),
            }
        }
    }
    Ok(())
}

fn verify(bus: &StateBus, mirror: &Mirror) -> Result<(), String> {
    let current = bus
        .current_state()
        .map_err(|e| format!("current state unreadable: {e}"))?;
    if current != mirror.current {
        return Err(format!("current: bus {current:?}, mirror {:?}", mirror.current));
    }

    if bus.is_change_requested() != mirror.is_change_requested() {
        return Err("change-requested predicate diverged".into());
    }
    let expected_request = mirror.is_change_requested().then_some(mirror.requested);
    if bus.requested_state() != expected_request {
        return Err(format!(
            "requested: bus {:?}, mirror {expected_request:?}",
            bus.requested_state()
        ));
    }

    for field in TextField::ALL {
        let text = bus
            .text(field)
            .map_err(|e| format!("{field:?} unreadable: {e}"))?;
        if text != mirror.texts[text_index(field)] {
            return Err(format!("{field:?}: bus {text:?}"));
        }
    }

    for key in ControlKey::ALL {
        if bus.key_pressed(key) != mirror.keys[key_index(key)] {
            return Err(format!("{key:?} flag diverged"));
        }
        if bus.key_pressed_named(key.name()) != mirror.keys[key_index(key)] {
            return Err(format!("{key:?} named flag diverged"));
        }
    }

    let name = bus
        .action_name()
        .map_err(|e| format!("action name unreadable: {e}"))?;
    if name != mirror.action_name {
        return Err(format!("action name: bus {name:?}"));
    }
    if bus.action_count() != mirror.action_count {
        return Err(format!(
            "action count: bus {}, mirror {}",
            bus.action_count(),
            mirror.action_count
        ));
    }

    let mut free = vec![0u8; FREE_REGION_LEN];
    bus.read_free(0, &mut free)
        .map_err(|e| format!("free window unreadable: {e}"))?;
    if free != mirror.free {
        return Err("free window diverged".into());
    }

    Ok(())
}
