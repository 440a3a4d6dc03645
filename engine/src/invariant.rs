//! Post-condition checks evaluated after every top-level event.
//!
//! Invariants persist until cleared; expectations are one-shot and are
//! consumed whether they pass or fail. A failing check aborts the remaining
//! checks for the event but never rolls the event's side effects back —
//! invariants check, they do not transact.

use std::fmt;

use scen_common::{Event, Number, ScenarioError, Value};
use strum::{Display, EnumString};

use crate::fetch::get_core_value;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum InvariantCategory {
    All,
    Static,
    Remains,
    Success,
}

/// A persistent post-condition, tagged by category.
#[derive(Debug, Clone)]
pub enum Invariant {
    /// The condition's value at registration time must never change.
    Static { condition: Event, captured: Value },
    /// The condition must keep evaluating to the given value.
    Remains { condition: Event, expected: Value },
    /// Every newly recorded invokation must have succeeded.
    Success,
}

impl Invariant {
    pub fn category(&self) -> InvariantCategory {
        match self {
            Invariant::Static { .. } => InvariantCategory::Static,
            Invariant::Remains { .. } => InvariantCategory::Remains,
            Invariant::Success => InvariantCategory::Success,
        }
    }

    pub async fn check(&self, world: &World) -> Result<(), ScenarioError> {
        match self {
            Invariant::Static { condition, captured } => {
                let current = get_core_value(world.clone(), condition.clone()).await?;
                if current != *captured {
                    return Err(ScenarioError::InvariantViolation(format!(
                        "{} changed: had `{}`, now `{}`",
                        self, captured, current
                    )));
                }
                Ok(())
            }
            Invariant::Remains { condition, expected } => {
                let current = get_core_value(world.clone(), condition.clone()).await?;
                if current != *expected {
                    return Err(ScenarioError::InvariantViolation(format!(
                        "{} instead evaluated to `{}`",
                        self, current
                    )));
                }
                Ok(())
            }
            Invariant::Success => match &world.last_invokation {
                Some(invokation) if world.new_invokation && !invokation.success => {
                    Err(ScenarioError::InvariantViolation(format!(
                        "{}: `{}` failed with `{}`",
                        self,
                        invokation.description,
                        invokation.error_message()
                    )))
                }
                _ => Ok(()),
            },
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invariant::Static { condition, captured } => {
                write!(f, "Static invariant `{}` (captured `{}`)", condition.to_line(), captured)
            }
            Invariant::Remains { condition, expected } => {
                write!(f, "Remains invariant `{}` == `{}`", condition.to_line(), expected)
            }
            Invariant::Success => write!(f, "Success invariant"),
        }
    }
}

/// A one-shot post-condition consumed by the next event.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// The condition must have moved by exactly `delta` from the value it
    /// had when the expectation was registered.
    Changes {
        condition: Event,
        original: Number,
        delta: Number,
        expected: Number,
    },
}

impl Expectation {
    pub fn changes(condition: Event, original: Number, delta: Number) -> Result<Self, ScenarioError> {
        let expected = original.checked_add(&delta).ok_or_else(|| {
            ScenarioError::ExpectationFailure(format!(
                "delta {} overflows from {}",
                delta, original
            ))
        })?;
        Ok(Expectation::Changes {
            condition,
            original,
            delta,
            expected,
        })
    }

    pub async fn check(&self, world: &World) -> Result<(), ScenarioError> {
        match self {
            Expectation::Changes {
                condition,
                original,
                expected,
                ..
            } => {
                let current = get_core_value(world.clone(), condition.clone()).await?;
                let current = match current {
                    Value::Number(number) => number,
                    other => {
                        return Err(ScenarioError::ExpectationFailure(format!(
                            "{} evaluated to non-number `{}`",
                            self, other
                        )));
                    }
                };
                if current != *expected {
                    let true_delta = current.checked_sub(original);
                    return Err(ScenarioError::ExpectationFailure(format!(
                        "{} instead had value `{}` (true delta: {})",
                        self,
                        current,
                        true_delta.map_or_else(|| "overflow".to_owned(), |d| d.to_string())
                    )));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Changes {
                condition,
                original,
                delta,
                expected,
            } => write!(
                f,
                "Changes expectation: condition=`{}`, original={}, delta={}, expected={}",
                condition.to_line(),
                original,
                delta,
                expected
            ),
        }
    }
}

/// Evaluate every active invariant whose category is not held for this
/// event; held categories auto-restore afterwards.
pub async fn check_invariants(world: World) -> Result<World, ScenarioError> {
    let held = world.held_invariants.clone();
    if !held.contains(&InvariantCategory::All) {
        for invariant in world.invariants.clone() {
            if held.contains(&invariant.category()) {
                continue;
            }
            invariant.check(&world).await?;
        }
    }
    let mut world = world;
    world.held_invariants.clear();
    Ok(world)
}

/// Drain and evaluate pending expectations. The drained world is returned
/// even when a check fails, so consumption is observable either way.
pub async fn check_expectations(world: World) -> (World, Result<(), ScenarioError>) {
    let mut world = world;
    let pending: Vec<Expectation> = world.expectations.drain(..).collect();
    for expectation in &pending {
        if let Err(failure) = expectation.check(&world).await {
            return (world, Err(failure));
        }
    }
    (world, Ok(()))
}

/// Suppress a category for exactly the next event. The hold sits in the
/// pending set until this event's scratch clears, so the registering
/// event's own checks still run.
pub fn hold_invariants(mut world: World, category: InvariantCategory) -> World {
    world.pending_holds.insert(category);
    world
}

/// Permanently remove invariants of a category.
pub fn clear_invariants(mut world: World, category: InvariantCategory) -> World {
    match category {
        InvariantCategory::All => world.invariants.clear(),
        category => world
            .invariants
            .retain(|invariant| invariant.category() != category),
    }
    world
}
