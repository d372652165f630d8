//! The threaded `Simulation`: sessions connecting, acting and leaving
//! while the tick thread runs, then a clean shutdown.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use vigil_core::{SessionId, TickId};
use vigil_engine::{ExecutionMode, Scenario, Simulation, SimulationState};
use vigil_test_utils::{config_with, session, wait_until, PayloadBuilder, SlowFilter};

const TIMEOUT: Duration = Duration::from_secs(10);

fn avatar_position(sim: &Simulation, who: &SessionId) -> Option<(i64, i64)> {
    let doc: Value = serde_json::from_str(&sim.session_document(who)).ok()?;
    let avatar = doc
        .as_object()?
        .values()
        .find(|v| v["Avatar"]["session"] == who.as_str())?;
    Some((avatar["Avatar"]["x"].as_i64()?, avatar["Avatar"]["y"].as_i64()?))
}

#[test]
fn sessions_act_concurrently() {
    let mut sim =
        Simulation::new(config_with(Scenario::reference(50), ExecutionMode::Parallel)).unwrap();
    sim.start().unwrap();

    let sessions: Vec<_> = (0..4).map(|i| session(&format!("player{i}"))).collect();
    for s in &sessions {
        sim.connect(s.clone());
    }
    for s in &sessions {
        wait_until(TIMEOUT, "avatar to appear", || avatar_position(&sim, s).is_some());
    }

    thread::scope(|scope| {
        for s in &sessions {
            let sim = &sim;
            scope.spawn(move || {
                let payload = PayloadBuilder::new("move").param("dy", "1").build();
                for _ in 0..10 {
                    sim.submit_action(s.clone(), &payload);
                    thread::sleep(Duration::from_millis(3));
                }
            });
        }
    });

    for s in &sessions {
        wait_until(TIMEOUT, "avatar to walk", || {
            avatar_position(&sim, s).is_some_and(|(_, y)| y >= 1)
        });
    }
    assert_eq!(sim.last_metrics().sessions, sessions.len());

    let report = sim.shutdown();
    assert!(report.tick_joined);
    assert_eq!(report.workers_joined, sessions.len());
    assert_eq!(sim.state(), SimulationState::Stopped);
}

#[test]
fn disconnect_removes_avatar_and_view() {
    let mut sim =
        Simulation::new(config_with(Scenario::reference(2), ExecutionMode::Sequential)).unwrap();
    let alice = session("alice");
    let bob = session("bob");
    sim.connect(alice.clone());
    sim.connect(bob.clone());
    sim.start().unwrap();
    wait_until(TIMEOUT, "both avatars", || {
        avatar_position(&sim, &alice).is_some() && avatar_position(&sim, &bob).is_some()
    });

    sim.disconnect(alice.clone());
    wait_until(TIMEOUT, "alice to leave", || sim.registration(&alice).is_none());
    wait_until(TIMEOUT, "alice's avatar to be reaped", || {
        let full: Value = serde_json::from_str(&sim.full_document()).unwrap();
        full.as_object()
            .unwrap()
            .values()
            .all(|v| v["Avatar"]["session"] != "alice")
    });
    assert_eq!(sim.session_document(&alice), "{}");
    assert!(avatar_position(&sim, &bob).is_some());

    let report = sim.shutdown();
    assert_eq!(report.workers_joined, 1);
}

#[test]
fn shutdown_mid_run_is_prompt() {
    let config = vigil_engine::SimConfig {
        tick_rate_hz: 1.0,
        ..config_with(Scenario::reference(10), ExecutionMode::Parallel)
    };
    let mut sim = Simulation::new(config).unwrap();
    for i in 0..3 {
        sim.register_session(session(&format!("s{i}")));
    }
    sim.start().unwrap();
    wait_until(TIMEOUT, "first tick", || sim.current_tick() >= TickId(1));

    let report = sim.shutdown();
    assert!(report.tick_joined);
    assert!(report.total_ms < 900, "shutdown waited out the tick interval");
    assert!(sim.is_tick_stopped());
}

#[test]
fn shutdown_mid_render_completes_the_tick() {
    let filter = Arc::new(SlowFilter::new(Duration::from_millis(40)));
    let config = vigil_engine::SimConfig {
        filter: filter.clone(),
        ..config_with(Scenario::reference(3), ExecutionMode::Parallel)
    };
    let mut sim = Simulation::new(config).unwrap();
    let sessions: Vec<_> = (0..3).map(|i| session(&format!("s{i}"))).collect();
    for s in &sessions {
        sim.register_session(s.clone());
    }
    let ticks = sim.subscribe();
    sim.start().unwrap();
    wait_until(TIMEOUT, "a render to begin", || filter.has_started());

    let report = sim.shutdown();
    assert!(report.tick_joined);
    assert_eq!(report.workers_joined, sessions.len());

    // The tick being rendered at shutdown was published to everyone.
    let published: Vec<_> = ticks.try_iter().map(|docs| docs.tick).collect();
    assert_eq!(published.last(), Some(&report.final_tick));
    assert!(published.windows(2).all(|w| w[1] == w[0].next()));
    for s in &sessions {
        let doc: Value = serde_json::from_str(&sim.session_document(s)).unwrap();
        assert_eq!(doc.as_object().unwrap().len(), 4, "{s} missed its render");
    }
}
