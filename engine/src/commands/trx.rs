//! `Trx ...` sub-family: set details of the next transaction, then run the
//! wrapped event with those details in scope.

use scen_common::{async_handler, Event, ScenarioError};

use crate::dispatch::process_core_event;
use crate::fetch::{get_event_v, get_number_v};
use crate::registry::{resolve, Arg, Bindings, Command, HandlerResult};
use crate::world::World;

pub async fn process_trx_event(world: World, event: Event) -> Result<World, ScenarioError> {
    resolve("Trx", &trx_commands(), world, &event).await
}

pub fn trx_commands() -> Vec<Command> {
    vec![Command::new(
        r#"
      #### Value

      * "Trx Value <Amount> <Event>" - Runs the event with the given value
        attached to the next transaction
        * E.g. "Trx Value 1.0e18 (Send alice)"
    "#,
        "Value",
        vec![
            Arg::new("amount", async_handler!(get_number_v)),
            Arg::new("event", async_handler!(get_event_v)),
        ],
        async_handler!(trx_value),
    )]
}

async fn trx_value(world: World, args: Bindings) -> HandlerResult<World> {
    let amount = args.number("amount")?;
    let event = args.event("event")?;
    let world = world.with_trx_value(Some(amount));
    process_core_event(world, event).await
}
