//! `Invariant ...` and `Expect ...` sub-families: register post-conditions
//! for the invariant engine to evaluate after each event.

use scen_common::{async_handler, Event, ScenarioError, Value};

use crate::fetch::{get_core_value, get_event_v, get_number_v};
use crate::invariant::{Expectation, Invariant};
use crate::registry::{resolve, Arg, Bindings, Command, HandlerResult};
use crate::world::World;

pub async fn process_invariant_event(world: World, event: Event) -> Result<World, ScenarioError> {
    resolve("Invariant", &invariant_commands(), world, &event).await
}

pub async fn process_expectation_event(
    world: World,
    event: Event,
) -> Result<World, ScenarioError> {
    resolve("Expectation", &expectation_commands(), world, &event).await
}

pub fn invariant_commands() -> Vec<Command> {
    vec![
        Command::new(
            r#"
      #### Static

      * "Invariant Static ...condition" - Captures the condition's current
        value; it must never change until the invariant is cleared
        * E.g. "Invariant Static (Balance alice)"
    "#,
            "Static",
            vec![Arg::new("condition", async_handler!(get_event_v)).variadic()],
            async_handler!(invariant_static),
        ),
        Command::new(
            r#"
      #### Remains

      * "Invariant Remains <Condition> <Value>" - The condition must keep
        evaluating to the given value
        * E.g. "Invariant Remains (Counter Address) 0xabc..."
    "#,
            "Remains",
            vec![
                Arg::new("condition", async_handler!(get_event_v)),
                Arg::new("value", get_core_value),
            ],
            async_handler!(invariant_remains),
        ),
        Command::new(
            r#"
      #### Success

      * "Invariant Success" - Every new invokation must succeed
    "#,
            "Success",
            vec![],
            async_handler!(invariant_success),
        ),
    ]
}

pub fn expectation_commands() -> Vec<Command> {
    vec![Command::new(
        r#"
      #### Changes

      * "Expect Changes <Condition> <Delta>" - After the next event, the
        condition must have moved by exactly the delta
        * E.g. "Expect Changes (Balance alice) +10"
    "#,
        "Changes",
        vec![
            Arg::new("condition", async_handler!(get_event_v)),
            Arg::new("delta", async_handler!(get_number_v)),
        ],
        async_handler!(expect_changes),
    )]
}

async fn invariant_static(world: World, args: Bindings) -> HandlerResult<World> {
    let condition = args.event("condition")?;
    let captured = get_core_value(world.clone(), condition.clone()).await?;
    let invariant = Invariant::Static { condition, captured };
    world.print_line(&format!("Adding {}", invariant));
    let mut world = world;
    world.invariants.push(invariant);
    Ok(world)
}

async fn invariant_remains(world: World, args: Bindings) -> HandlerResult<World> {
    let condition = args.event("condition")?;
    let expected = args.value("value")?;
    let invariant = Invariant::Remains { condition, expected };
    world.print_line(&format!("Adding {}", invariant));
    let mut world = world;
    world.invariants.push(invariant);
    Ok(world)
}

async fn invariant_success(world: World, _args: Bindings) -> HandlerResult<World> {
    let mut world = world;
    world.invariants.push(Invariant::Success);
    Ok(world)
}

async fn expect_changes(world: World, args: Bindings) -> HandlerResult<World> {
    let condition = args.event("condition")?;
    let delta = args.number("delta")?;
    let original = match get_core_value(world.clone(), condition.clone()).await? {
        Value::Number(number) => number,
        other => {
            return Err(ScenarioError::ExpectationFailure(format!(
                "Changes expectation needs a numeric condition, `{}` evaluated to `{}`",
                condition.to_line(),
                other
            )));
        }
    };
    let expectation = Expectation::changes(condition, original, delta)?;
    world.print_line(&format!("Adding {}", expectation));
    // Staged, not armed: the expectation applies to the *next* event, not
    // the one that registered it.
    let mut world = world;
    world.pending_expectations.push(expectation);
    Ok(world)
}
