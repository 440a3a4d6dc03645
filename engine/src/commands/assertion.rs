//! `Assert ...` sub-family: immediate checks that raise on failure.

use scen_common::{async_handler, Event, ScenarioError};

use crate::fetch::{get_core_value, get_string_v};
use crate::registry::{resolve, Arg, Bindings, Command, HandlerResult};
use crate::world::World;

pub async fn process_assertion_event(world: World, event: Event) -> Result<World, ScenarioError> {
    resolve("Assertion", &assertion_commands(), world, &event).await
}

pub fn assertion_commands() -> Vec<Command> {
    vec![
        Command::new(
            r#"
      #### Equal

      * "Assert Equal <A> <B>" - Raises unless the two values are
        structurally equal
        * E.g. "Assert Equal (Balance alice) (Exactly 5)"
    "#,
            "Equal",
            vec![
                Arg::new("a", get_core_value),
                Arg::new("b", get_core_value),
            ],
            async_handler!(assert_equal),
        ),
        Command::new(
            r#"
      #### True

      * "Assert True <Value>" - Raises unless the value is truthy
        * E.g. "Assert True (Equal (Balance alice) (Balance bob))"
    "#,
            "True",
            vec![Arg::new("value", get_core_value)],
            async_handler!(assert_true),
        ),
        Command::new(
            r#"
      #### False

      * "Assert False <Value>" - Raises unless the value is falsey
        * E.g. "Assert False (Counter Deployed)"
    "#,
            "False",
            vec![Arg::new("value", get_core_value)],
            async_handler!(assert_false),
        ),
        Command::new(
            r#"
      #### Success

      * "Assert Success" - Raises unless the last invokation succeeded
    "#,
            "Success",
            vec![],
            async_handler!(assert_success),
        ),
        Command::new(
            r#"
      #### Failure

      * "Assert Failure <Message>" - Raises unless the last invokation
        failed with an error containing the message
        * E.g. "Assert Failure "insufficient balance""
    "#,
            "Failure",
            vec![Arg::new("message", async_handler!(get_string_v))],
            async_handler!(assert_failure),
        ),
    ]
}

async fn assert_equal(world: World, args: Bindings) -> HandlerResult<World> {
    let a = args.value("a")?;
    let b = args.value("b")?;
    if a != b {
        return Err(ScenarioError::Raised(format!(
            "assertion failed: expected `{}` to equal `{}`",
            a, b
        )));
    }
    Ok(world)
}

async fn assert_true(world: World, args: Bindings) -> HandlerResult<World> {
    let value = args.value("value")?;
    if !value.truthy() {
        return Err(ScenarioError::Raised(format!(
            "assertion failed: expected truthy value, got `{}`",
            value
        )));
    }
    Ok(world)
}

async fn assert_false(world: World, args: Bindings) -> HandlerResult<World> {
    let value = args.value("value")?;
    if value.truthy() {
        return Err(ScenarioError::Raised(format!(
            "assertion failed: expected falsey value, got `{}`",
            value
        )));
    }
    Ok(world)
}

async fn assert_success(world: World, _args: Bindings) -> HandlerResult<World> {
    match &world.last_invokation {
        Some(invokation) if !invokation.success => Err(ScenarioError::Raised(format!(
            "assertion failed: `{}` failed with `{}`",
            invokation.description,
            invokation.error_message()
        ))),
        Some(_) => Ok(world),
        None => Err(ScenarioError::Raised(
            "assertion failed: no invokation has run".to_owned(),
        )),
    }
}

async fn assert_failure(world: World, args: Bindings) -> HandlerResult<World> {
    let message = args.string("message")?;
    match &world.last_invokation {
        Some(invokation) if invokation.success => Err(ScenarioError::Raised(format!(
            "assertion failed: expected `{}` to fail, but it succeeded",
            invokation.description
        ))),
        Some(invokation) => {
            if invokation.error_message().contains(&message) {
                Ok(world)
            } else {
                Err(ScenarioError::Raised(format!(
                    "assertion failed: error `{}` does not contain `{}`",
                    invokation.error_message(),
                    message
                )))
            }
        }
        None => Err(ScenarioError::Raised(
            "assertion failed: no invokation has run".to_owned(),
        )),
    }
}
