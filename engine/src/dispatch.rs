//! Core event dispatch and the sequential processing pipeline.
//!
//! The pipeline is a strict left fold: event *i* runs to completion, the
//! invariant and expectation checks observe the quiescent result, the
//! per-transaction scratch resets, and only then does event *i+1* start
//! with the returned world. There is never more than one event in flight.

use scen_common::{parser, Event, MacroTable, ScenarioError};

use crate::invariant::{check_expectations, check_invariants};
use crate::registry::resolve;
use crate::world::World;

/// Dispatch one event against the core command family.
pub async fn process_core_event(world: World, event: Event) -> Result<World, ScenarioError> {
    let world = world.enter_dispatch()?;
    let registry = world.registry.clone();
    let world = resolve("Core", registry.commands(), world, &event).await?;
    Ok(world.exit_dispatch())
}

/// Fold a batch of events through the dispatcher, checking post-conditions
/// after each one. The first failure aborts the fold; later events in the
/// batch are not attempted.
pub async fn process_events(world: World, events: Vec<Event>) -> Result<World, ScenarioError> {
    let mut world = world;
    for event in events {
        world = process_one(world, event).await?;
    }
    Ok(world)
}

async fn process_one(world: World, event: Event) -> Result<World, ScenarioError> {
    log::debug!("processing event: {}", event.to_line());
    let verbose = world.settings.verbose;

    let world = match process_core_event(world, event.clone()).await {
        Ok(world) => world,
        Err(failure) => {
            if verbose {
                log::error!("{}", failure);
            }
            return Err(failure.while_processing(event));
        }
    };

    let world = match check_invariants(world).await {
        Ok(world) => world,
        Err(failure) => return Err(failure.while_processing(event)),
    };

    let (world, checked) = check_expectations(world).await;
    if let Err(failure) = checked {
        return Err(failure.while_processing(event));
    }

    Ok(world.clear_event_scratch())
}

/// Parse, macro-expand and process one script line.
pub async fn run_line(
    world: World,
    line: &str,
    macros: &MacroTable,
) -> Result<World, ScenarioError> {
    run_script(world, line, macros).await
}

/// Parse, macro-expand and process a whole script.
pub async fn run_script(
    world: World,
    text: &str,
    macros: &MacroTable,
) -> Result<World, ScenarioError> {
    let forest = parser::parse(text)?;
    let forest = macros.expand(forest)?;
    process_events(world, forest).await
}
