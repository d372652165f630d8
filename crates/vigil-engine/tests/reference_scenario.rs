//! Reference scenario: a spawner plus 999 oscillating movers.
//!
//! Checks the world rules end to end through [`TickDriver::step`], and that
//! sequential and parallel execution produce identical documents for
//! arbitrary mover layouts and session input.

use proptest::prelude::*;
use vigil_core::{EntityKind, Spawn};
use vigil_engine::{ExecutionMode, Scenario, TickDriver};
use vigil_test_utils::fixtures::{converging_pair, mover_row, walled_arena};
use vigil_test_utils::{config_with, lockstep_config, session, PayloadBuilder};

const MOVERS: usize = 999;

#[test]
fn reference_movers_oscillate() {
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let mut driver = TickDriver::new(&config_with(Scenario::reference(MOVERS), mode)).unwrap();

        let first = driver.step();
        assert_eq!(first.documents.full.len(), MOVERS + 1);
        assert_eq!(first.documents.delta.len(), MOVERS);
        assert!(first.failures.is_empty());
        for entity in &driver.live()[1..] {
            assert_eq!(entity.position().0, 2, "{mode:?}: {}", entity.id());
        }

        driver.step();
        for entity in &driver.live()[1..] {
            assert_eq!(entity.position().0, 1);
            assert!(matches!(entity.kind(), EntityKind::Mover(m) if m.forward));
        }
    }
}

#[test]
fn spawner_never_appears_in_delta() {
    let mut driver = TickDriver::new(&lockstep_config(Scenario::reference(3))).unwrap();
    let spawner = driver.live()[0].id();
    for _ in 0..5 {
        let report = driver.step();
        assert!(report.documents.full.contains_entity(spawner));
        assert!(!report.documents.delta.contains_entity(spawner));
    }
}

#[test]
fn converging_movers_bounce() {
    let mut driver = TickDriver::new(&lockstep_config(converging_pair())).unwrap();
    driver.step();
    assert_eq!(driver.live()[0].position(), (0, 0));
    assert_eq!(driver.live()[1].position(), (4, 0));
}

#[test]
fn spaced_row_never_collides() {
    let mut driver = TickDriver::new(&lockstep_config(mover_row(6, 0))).unwrap();
    let start: Vec<_> = driver.live().iter().map(|e| e.position()).collect();
    driver.step();
    driver.step();
    let end: Vec<_> = driver.live().iter().map(|e| e.position()).collect();
    assert_eq!(start, end);
}

#[test]
fn avatar_walks_until_the_wall() {
    let mut driver = TickDriver::new(&lockstep_config(walled_arena(3, 2))).unwrap();
    let alice = session("alice");
    driver.inbox().submit(alice.clone(), "enter");
    driver.step();
    let avatar = driver.live()[1].id();

    for _ in 0..5 {
        driver.inbox().submit(alice.clone(), "right");
        let report = driver.step();
        let x = report.documents.full.find(avatar).unwrap().base().x;
        assert!(x <= 2, "walked through the wall to {x}");
    }
    assert_eq!(driver.live()[1].position(), (2, 0));
    // Blocked: the last tick did not change the avatar.
    assert!(!driver.live()[1].is_changed());
}

#[test]
fn higher_priority_action_wins_the_tick() {
    let mut driver = TickDriver::new(&lockstep_config(walled_arena(50, 0))).unwrap();
    let alice = session("alice");
    driver.inbox().submit(alice.clone(), "enter");
    driver.step();

    let inbox = driver.inbox();
    inbox.submit(alice.clone(), &PayloadBuilder::new("move").priority(1).param("dx", "1").build());
    inbox.submit(alice.clone(), &PayloadBuilder::new("move").priority(5).param("dx", "-3").build());
    inbox.submit(alice.clone(), &PayloadBuilder::new("move").priority(2).param("dx", "7").build());
    driver.step();
    assert_eq!(driver.live()[1].position(), (-3, 0));
}

// ── proptest ────────────────────────────────────────────────────

fn arb_scenario() -> impl Strategy<Value = Scenario> {
    prop::collection::vec((-6i32..6, 0i32..3, any::<bool>()), 0..16).prop_map(|movers| {
        movers.into_iter().fold(
            Scenario::empty().with_spawn(Spawn::spawner("World", 0, 1)),
            |scenario, (x, y, forward)| scenario.with_spawn(Spawn::mover("Mover", x, y, forward)),
        )
    })
}

fn arb_input() -> impl Strategy<Value = Vec<Vec<(u8, String)>>> {
    let action = prop_oneof![
        Just("enter".to_owned()),
        Just("leave".to_owned()),
        Just("up".to_owned()),
        Just("left".to_owned()),
        (-2i32..3).prop_map(|dx| PayloadBuilder::new("move").param("dx", dx.to_string()).build()),
    ];
    prop::collection::vec(prop::collection::vec((0u8..3, action), 0..4), 1..8)
}

proptest! {
    #[test]
    fn sequential_and_parallel_agree(scenario in arb_scenario(), input in arb_input()) {
        let mut seq = TickDriver::new(&config_with(scenario.clone(), ExecutionMode::Sequential)).unwrap();
        let mut par = TickDriver::new(&config_with(scenario, ExecutionMode::Parallel)).unwrap();

        for tick_input in &input {
            for (who, raw) in tick_input {
                let s = session(&format!("s{who}"));
                seq.inbox().submit(s.clone(), raw);
                par.inbox().submit(s, raw);
            }
            let a = seq.step();
            let b = par.step();
            prop_assert_eq!(a.documents.full.to_json(), b.documents.full.to_json());
            prop_assert_eq!(a.documents.delta.to_json(), b.documents.delta.to_json());
            prop_assert_eq!(a.metrics.spawned, b.metrics.spawned);
            prop_assert_eq!(a.metrics.reaped, b.metrics.reaped);
        }
    }

    #[test]
    fn ids_stay_unique_and_increasing(input in arb_input()) {
        let mut driver = TickDriver::new(&lockstep_config(Scenario::reference(4))).unwrap();
        for tick_input in &input {
            for (who, raw) in tick_input {
                driver.inbox().submit(session(&format!("s{who}")), raw);
            }
            driver.step();
            let ids: Vec<_> = driver.live().iter().map(|e| e.id()).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
