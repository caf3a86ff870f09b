//! Resolution scenarios on the three-state reference slave
//!
//! States: 0 = off, 1 = clocked, 2 = clocked and powered.
//! Wake-up latency to state 2: 100 from 0, 20 from 1, 0 from 2.

#![cfg(feature = "std")]

use pmslv::hal::{SimClocks, SimParent};
use pmslv::prelude::*;
use pmslv::Registry;

static STATES: [Capability; 3] = [
    Capability::empty(),
    Capability::CLOCK,
    Capability::CLOCK.union(Capability::POWER),
];

static TRANS: [Transition<'static>; 6] = [
    Transition::new(0, 1, 100),
    Transition::new(0, 2, 100),
    Transition::new(1, 0, 20),
    Transition::new(1, 2, 20),
    Transition::new(2, 0, 0),
    Transition::new(2, 1, 0),
];

static FSM: SlaveFsm<'static> = SlaveFsm::new(&STATES, &TRANS);

const M1: u32 = 0x1;
const M2: u32 = 0x100;

fn id(mask: u32) -> MasterId {
    MasterId::new(mask).unwrap()
}

fn masters() -> MasterTable {
    let mut table = MasterTable::new();
    table.add(Master::new(id(M1), "apu")).unwrap();
    table.add(Master::new(id(M2), "rpu0")).unwrap();
    table
}

fn shared_slave<'a>(table: &MasterTable) -> Slave<'a> {
    let mut slave = Slave::new(7, "ocm0", &FSM);
    slave.set_config(SlavePolicy::SHAREABLE, table.all(), table).unwrap();
    slave
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[test]
fn union_of_two_masters_selects_powered_state() {
    let table = masters();
    let mut slave = shared_slave(&table);

    let reqs = slave.requirements_mut();
    reqs.get_mut(id(M1)).unwrap().set_capabilities(Capability::CLOCK);
    reqs.get_mut(id(M1)).unwrap().set_latency(50);
    reqs.get_mut(id(M2)).unwrap().set_capabilities(Capability::CLOCK | Capability::POWER);
    reqs.get_mut(id(M2)).unwrap().set_latency(10);

    slave.update().unwrap();
    assert_eq!(slave.state(), 2);
    assert_eq!(slave.latency_margin(), 10);
}

#[test]
fn capability_selection_meets_loose_budget() {
    let table = masters();
    let mut slave = shared_slave(&table);

    slave.request(id(M1), Capability::CLOCK, 50).unwrap();
    assert_eq!(slave.state(), 1);
    assert_eq!(slave.latency_margin(), 30);
}

#[test]
fn tight_budget_promotes_state() {
    let table = masters();
    let mut slave = shared_slave(&table);

    slave.request(id(M1), Capability::CLOCK, 10).unwrap();
    assert_eq!(slave.state(), 2);
    assert_eq!(slave.latency_margin(), 10);
}

#[test]
fn disjoint_capabilities_conflict() {
    let table = masters();
    let mut slave = shared_slave(&table);
    slave.request(id(M1), Capability::CLOCK, 50).unwrap();

    let reqs = slave.requirements_mut();
    reqs.get_mut(id(M2)).unwrap().set_capabilities(Capability::WAKEUP);

    assert_eq!(slave.update(), Err(Error::Conflict));
    assert_eq!(slave.state(), 1);
    assert_eq!(slave.latency_margin(), 30);
}

#[test]
fn rejected_request_restores_requirement() {
    let table = masters();
    let mut slave = shared_slave(&table);
    slave.request(id(M1), Capability::CLOCK, 50).unwrap();

    assert_eq!(
        slave.request(id(M2), Capability::WAKEUP, MAX_LATENCY),
        Err(Error::Conflict)
    );
    assert_eq!(slave.usage_status(id(M2)), UsageStatus::OthersOnly);
    assert_eq!(slave.current_requirement(id(M2)), Capability::empty());

    // Nothing left over from the rejected request
    slave.update().unwrap();
    assert_eq!(slave.state(), 1);
}

// ============================================================================
// Update behavior
// ============================================================================

#[test]
fn update_is_idempotent() {
    let table = masters();
    let clocks = SimClocks::new();
    let parent = SimParent::new();
    let mut slave = shared_slave(&table).with_clocks(&clocks).with_parent(&parent);

    slave.request(id(M1), Capability::CLOCK | Capability::POWER, 40).unwrap();
    let state = slave.state();
    let margin = slave.latency_margin();

    slave.update().unwrap();
    slave.update().unwrap();
    assert_eq!(slave.state(), state);
    assert_eq!(slave.latency_margin(), margin);
    assert_eq!(clocks.requests(), 1);
    assert_eq!(parent.requests(), 1);
}

#[test]
fn no_demand_falls_to_state_zero() {
    let table = masters();
    let mut slave = Slave::new(7, "ocm0", &FSM).with_state(2);
    slave.set_config(SlavePolicy::SHAREABLE, table.all(), &table).unwrap();

    slave.update().unwrap();
    assert_eq!(slave.state(), 0);
    assert_eq!(slave.latency_margin(), MAX_LATENCY - 100);
}

#[test]
fn release_drops_dependencies() {
    let table = masters();
    let clocks = SimClocks::new();
    let parent = SimParent::new();
    let mut slave = shared_slave(&table).with_clocks(&clocks).with_parent(&parent);

    slave.request(id(M1), Capability::CLOCK, MAX_LATENCY).unwrap();
    slave.request(id(M2), Capability::CLOCK | Capability::POWER, MAX_LATENCY).unwrap();
    assert_eq!((clocks.held(), parent.held()), (1, 1));

    slave.release(id(M2)).unwrap();
    assert_eq!(slave.state(), 1);
    assert_eq!((clocks.held(), parent.held()), (1, 0));

    slave.release(id(M1)).unwrap();
    assert_eq!(slave.state(), 0);
    assert_eq!((clocks.held(), parent.held()), (0, 0));
    assert_eq!(slave.release(id(M1)), Err(Error::NotUsing));
}

#[test]
fn force_down_clears_all_users() {
    let table = masters();
    let clocks = SimClocks::new();
    let mut slave = shared_slave(&table).with_clocks(&clocks);
    slave.request(id(M1), Capability::CLOCK, 10).unwrap();
    slave.request(id(M2), Capability::CLOCK, MAX_LATENCY).unwrap();

    slave.force_down().unwrap();
    assert_eq!(slave.state(), 0);
    assert!(slave.users_mask().is_empty());
    assert_eq!(clocks.held(), 0);

    // Permissions survive
    assert_eq!(slave.requirements().len(), 2);
    slave.request(id(M2), Capability::CLOCK, MAX_LATENCY).unwrap();
    assert_eq!(slave.state(), 1);
}

// ============================================================================
// Admission
// ============================================================================

#[test]
fn verify_request_admission() {
    let table = masters();
    let mut exclusive = Slave::new(8, "uart0", &FSM);
    exclusive.set_config(SlavePolicy::empty(), table.all(), &table).unwrap();

    assert!(exclusive.verify_request().is_ok());
    exclusive.request(id(M1), Capability::CLOCK, MAX_LATENCY).unwrap();
    assert_eq!(exclusive.verify_request(), Err(Error::NodeBusy));
    assert_eq!(
        exclusive.request(id(M2), Capability::CLOCK, MAX_LATENCY),
        Err(Error::NodeBusy)
    );

    let mut shared = shared_slave(&table);
    shared.request(id(M1), Capability::CLOCK, MAX_LATENCY).unwrap();
    assert!(shared.verify_request().is_ok());
}

#[test]
fn registry_shutdown_path() {
    let table = masters();
    let clocks = SimClocks::new();
    let mut reg: SlaveRegistry<'_, 4> = Registry::new();
    for node in [1, 2, 3] {
        let mut slave = Slave::new(node, "ttc", &FSM).with_clocks(&clocks);
        slave.set_config(SlavePolicy::empty(), id(M1).into(), &table).unwrap();
        reg.add(slave).unwrap();
    }
    for node in [1, 3] {
        reg.lookup_mut(node)
            .unwrap()
            .request(id(M1), Capability::CLOCK, MAX_LATENCY)
            .unwrap();
    }
    assert_eq!(clocks.held(), 2);

    reg.force_down_all().unwrap();
    assert!(reg.iter().all(|s| PowerNode::state(s) == 0));
    assert_eq!(clocks.held(), 0);
}
