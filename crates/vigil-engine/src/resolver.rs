//! Generate, next and commit over the live collection.
//!
//! [`StateResolver::resolve`] runs one tick's state transition:
//!
//! 1. **Generate** over the live set as it was at tick start. Each
//!    entity's events are recorded on that entity; spawn drafts are
//!    collected in entity order.
//! 2. **Append** spawns, assigning ids in that same order.
//! 3. **Next** for every entity (existing first, spawns after) against the
//!    pre-generate slice of the collection.
//! 4. **Commit** in collection order, then clear every event set.
//!
//! Phases 1 and 3 run sequentially or on the rayon pool depending on
//! [`ExecutionMode`]; ordered `collect` keeps both modes bit-identical.
//!
//! A failure (error or panic) in one entity's generate or next is contained
//! to that entity: it contributes no spawns, keeps its committed value and
//! is reported unchanged for the tick.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use rayon::prelude::*;
use tracing::error;
use vigil_core::{ActionBatch, Entity, EntityError, IdAllocator, StaticEntity};

use crate::config::ExecutionMode;

/// What one [`StateResolver::resolve`] call did.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    /// Entities appended by generate.
    pub spawned: usize,
    /// Per-entity failures, in collection order (generate failures first).
    pub failures: Vec<EntityError>,
    /// Generate phase duration, including spawn append.
    pub generate_us: u64,
    /// Next phase duration.
    pub next_us: u64,
    /// Commit and event-clear duration.
    pub commit_us: u64,
}

/// Runs the per-tick state transition in the configured mode.
#[derive(Clone, Copy, Debug)]
pub struct StateResolver {
    mode: ExecutionMode,
}

impl StateResolver {
    /// Create a resolver.
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    /// Advance `live` by one tick.
    pub fn resolve(
        &self,
        live: &mut Vec<Entity>,
        statics: &[StaticEntity],
        actions: &ActionBatch,
        ids: &mut IdAllocator,
    ) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();
        let pre_len = live.len();

        // 1. Generate.
        let start = Instant::now();
        let generated = {
            let current: &[Entity] = live;
            self.run_phase(current, |e| e.generate(current, statics, actions))
        };

        let mut failed = vec![false; pre_len];
        let mut spawns = Vec::new();
        for (i, (entity, result)) in live.iter_mut().zip(generated).enumerate() {
            match result {
                Ok(g) => {
                    for event in g.events {
                        entity.record_event(event);
                    }
                    spawns.extend(g.spawns);
                }
                Err(err) => {
                    error!(entity = %entity.id(), error = %err, "generate failed");
                    failed[i] = true;
                    outcome.failures.push(err);
                }
            }
        }

        // 2. Append spawns.
        outcome.spawned = spawns.len();
        for spawn in spawns {
            live.push(spawn.instantiate(ids.allocate()));
            failed.push(false);
        }
        outcome.generate_us = start.elapsed().as_micros() as u64;

        // 3. Next.
        let start = Instant::now();
        let replacements = {
            let current: &[Entity] = live;
            let world = &current[..pre_len];
            self.run_phase(current, |e| e.next(world, statics, actions))
        };
        outcome.next_us = start.elapsed().as_micros() as u64;

        // 4. Commit in stable order, then clear events.
        let start = Instant::now();
        for (i, (entity, result)) in live.iter_mut().zip(replacements).enumerate() {
            let spawned = i >= pre_len;
            if failed[i] {
                entity.set_changed(false);
            } else {
                match result {
                    Ok(replacement) => entity.commit(replacement),
                    Err(err) => {
                        error!(entity = %entity.id(), error = %err, "next failed");
                        entity.set_changed(false);
                        outcome.failures.push(err);
                    }
                }
            }
            if spawned {
                entity.set_changed(true);
            }
            entity.clear_events();
        }
        outcome.commit_us = start.elapsed().as_micros() as u64;

        outcome
    }

    /// Apply `f` to every entity, in order, containing panics.
    fn run_phase<T, F>(&self, entities: &[Entity], f: F) -> Vec<Result<T, EntityError>>
    where
        T: Send,
        F: Fn(&Entity) -> Result<T, EntityError> + Sync,
    {
        let guarded = |entity: &Entity| {
            catch_unwind(AssertUnwindSafe(|| f(entity))).unwrap_or_else(|payload| {
                Err(EntityError::Panicked {
                    entity: entity.id(),
                    message: panic_message(payload.as_ref()),
                })
            })
        };
        match self.mode {
            ExecutionMode::Sequential => entities.iter().map(guarded).collect(),
            ExecutionMode::Parallel => entities.par_iter().map(guarded).collect(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{Action, EntityId, EntityKind, Mover, SessionId, Spawn};

    fn world(spawns: Vec<Spawn>) -> (Vec<Entity>, IdAllocator) {
        let mut ids = IdAllocator::new();
        let live = spawns
            .into_iter()
            .map(|s| s.instantiate(ids.allocate()))
            .collect();
        (live, ids)
    }

    #[test]
    fn movers_oscillate_in_both_modes() {
        for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
            let (mut live, mut ids) = world(vec![Spawn::mover("m", 1, 0, true)]);
            let resolver = StateResolver::new(mode);
            let actions = ActionBatch::new();

            resolver.resolve(&mut live, &[], &actions, &mut ids);
            assert_eq!(live[0].position(), (2, 0));
            resolver.resolve(&mut live, &[], &actions, &mut ids);
            assert_eq!(live[0].position(), (1, 0));
            assert_eq!(live[0].kind(), &EntityKind::Mover(Mover { forward: true }));
        }
    }

    #[test]
    fn collision_reverses_both_movers() {
        let (mut live, mut ids) = world(vec![
            Spawn::mover("a", 1, 0, true),
            Spawn::mover("b", 3, 0, false),
        ]);
        StateResolver::new(ExecutionMode::Parallel).resolve(
            &mut live,
            &[],
            &ActionBatch::new(),
            &mut ids,
        );
        assert_eq!(live[0].position(), (0, 0));
        assert_eq!(live[1].position(), (4, 0));
        assert!(live.iter().all(|e| e.events().is_empty()));
    }

    #[test]
    fn spawns_are_appended_with_fresh_ids() {
        let (mut live, mut ids) = world(vec![
            Spawn::spawner("World", 5, 5),
            Spawn::mover("m", 0, 9, true),
        ]);
        let actions: ActionBatch = [
            Action::new(SessionId::from("a"), "enter"),
            Action::new(SessionId::from("b"), "enter"),
        ]
        .into_iter()
        .collect();

        let outcome = StateResolver::new(ExecutionMode::Parallel).resolve(
            &mut live,
            &[],
            &actions,
            &mut ids,
        );
        assert_eq!(outcome.spawned, 2);
        assert_eq!(live.len(), 4);
        assert_eq!(live[2].id(), EntityId(3));
        assert_eq!(live[3].id(), EntityId(4));
        assert_eq!(live[2].session(), Some(&SessionId::from("a")));
        assert_eq!(live[3].session(), Some(&SessionId::from("b")));
        assert!(live[2].is_changed() && live[3].is_changed());
        assert_eq!(live[2].position(), (5, 5));
        // The spawner itself never changes.
        assert!(!live[0].is_changed());
    }

    #[test]
    fn failed_entity_keeps_its_value() {
        let (mut live, mut ids) = world(vec![
            Spawn::avatar(SessionId::from("a"), 0, 0),
            Spawn::mover("m", 1, 3, true),
        ]);
        let actions: ActionBatch = [Action::new(SessionId::from("a"), "move")
            .with_parameter("dx", "oops")]
        .into_iter()
        .collect();

        let outcome = StateResolver::new(ExecutionMode::Sequential).resolve(
            &mut live,
            &[],
            &actions,
            &mut ids,
        );
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].entity(), EntityId(1));
        assert_eq!(live[0].position(), (0, 0));
        assert!(!live[0].is_changed());
        // Other entities are unaffected.
        assert_eq!(live[1].position(), (2, 3));
    }

    #[test]
    fn panic_payloads_are_described() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }

    #[test]
    fn panicking_phase_is_contained() {
        let (live, _) = world(vec![
            Spawn::mover("a", 0, 0, true),
            Spawn::mover("b", 0, 1, true),
        ]);
        for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
            let results = StateResolver::new(mode).run_phase(&live, |e| {
                if e.id() == EntityId(1) {
                    panic!("entity blew up");
                }
                Ok(e.id())
            });
            assert_eq!(
                results[0],
                Err(EntityError::Panicked {
                    entity: EntityId(1),
                    message: "entity blew up".into(),
                })
            );
            assert_eq!(results[1], Ok(EntityId(2)));
        }
    }
}
