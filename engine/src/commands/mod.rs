//! The core command family.
//!
//! Each command carries a markdown doc string with usage examples (surfaced
//! by `Help`), a declared argument schema, and an async handler that
//! returns a brand-new world. Sub-families (`Trx`, `Invariant`, `Expect`,
//! `Assert`) resolve recursively through their own tables.

pub mod assertion;
pub mod checks;
pub mod trx;

use std::str::FromStr;
use std::time::Duration;

use scen_common::{async_handler, ScenarioError, Value};

use crate::backend::Invokation;
use crate::dispatch::process_core_event;
use crate::fetch::{get_address_v, get_core_value, get_event_v, get_number_v, get_sender_v, get_string_v};
use crate::invariant::{clear_invariants, hold_invariants, InvariantCategory};
use crate::networks;
use crate::registry::{Arg, Bindings, Command, HandlerResult};
use crate::world::World;

use self::assertion::{assertion_commands, process_assertion_event};
use self::checks::{
    expectation_commands, invariant_commands, process_expectation_event, process_invariant_event,
};
use self::trx::{process_trx_event, trx_commands};

/// Build the core command table, in declaration order.
pub fn core_commands() -> Vec<Command> {
    vec![
        Command::new(
            r#"
      #### History

      * "History n:<Number>=5" - Prints history of actions
        * E.g. "History"
        * E.g. "History 10"
    "#,
            "History",
            vec![Arg::new("n", async_handler!(get_number_v))
                .with_default(Value::Number(scen_common::Number::exact(5)))],
            async_handler!(cmd_history),
        ),
        Command::new(
            r#"
      #### Sleep

      * "Sleep ms:<Number>" - Sleeps for given amount of time
        * E.g. "Sleep 1000" - Sleeps for one second
    "#,
            "Sleep",
            vec![Arg::new("ms", async_handler!(get_number_v))],
            async_handler!(cmd_sleep),
        ),
        Command::new(
            r#"
      #### Throw

      * "Throw errMsg:<String>" - Throws given error
        * E.g. "Throw "my error message""
    "#,
            "Throw",
            vec![Arg::new("errMsg", async_handler!(get_string_v))],
            async_handler!(cmd_throw),
        ),
        Command::new(
            r#"
      #### Read

      * "Read ..." - Reads given value and prints result
        * E.g. "Read (Balance alice)"
        * E.g. "Read Counter Address"
    "#,
            "Read",
            vec![Arg::new("res", get_core_value).variadic()],
            async_handler!(cmd_read),
        ),
        Command::new(
            r#"
      #### Print

      * "Print ..." - Prints given string
        * E.g. "Print "Hello there""
    "#,
            "Print",
            vec![Arg::new("message", async_handler!(get_string_v))],
            async_handler!(cmd_print),
        ),
        Command::new(
            r#"
      #### PrintTransactionLogs

      * "PrintTransactionLogs" - Prints logs from all transactions
    "#,
            "PrintTransactionLogs",
            vec![],
            async_handler!(cmd_print_transaction_logs),
        ),
        Command::new(
            r#"
      #### MyAddress

      * "MyAddress address:<Address>" - Sets default from address (same as
        "Alias Me <addr>")
        * E.g. "MyAddress "0x9C18...""
    "#,
            "MyAddress",
            vec![Arg::new("address", async_handler!(get_address_v))],
            async_handler!(cmd_my_address),
        ),
        Command::new(
            r#"
      #### Alias

      * "Alias name:<String> address:<Address>" - Stores an alias between
        name and address
        * E.g. "Alias Me "0x9C18...""
    "#,
            "Alias",
            vec![
                Arg::new("name", async_handler!(get_string_v)),
                Arg::new("address", async_handler!(get_address_v)),
            ],
            async_handler!(cmd_alias),
        ),
        Command::new(
            r#"
      #### Aliases

      * "Aliases" - Prints all aliases
    "#,
            "Aliases",
            vec![],
            async_handler!(cmd_aliases),
        ),
        Command::new(
            r#"
      #### IncreaseTime

      * "IncreaseTime seconds:<Number>" - Increase chain time by a number
        of seconds
        * E.g. "IncreaseTime 60"
    "#,
            "IncreaseTime",
            vec![Arg::new("seconds", async_handler!(get_number_v))],
            async_handler!(cmd_increase_time),
        ),
        Command::new(
            r#"
      #### SetTime

      * "SetTime timestamp:<Number>" - Set chain time to specific timestamp
        * E.g. "SetTime 1573597400"
    "#,
            "SetTime",
            vec![Arg::new("timestamp", async_handler!(get_number_v))],
            async_handler!(cmd_set_time),
        ),
        Command::new(
            r#"
      #### MineBlock

      * "MineBlock" - Increase chain block number
        * E.g. "MineBlock"
    "#,
            "MineBlock",
            vec![],
            async_handler!(cmd_mine_block),
        ),
        Command::new(
            r#"
      #### Inspect

      * "Inspect" - Prints debugging information about the world
    "#,
            "Inspect",
            vec![],
            async_handler!(cmd_inspect),
        ),
        Command::new(
            r#"
      #### Debug

      * "Debug message:<String>" - Same as inspect but prepends with a
        string
    "#,
            "Debug",
            vec![Arg::new("message", async_handler!(get_string_v))],
            async_handler!(cmd_debug),
        ),
        Command::new(
            r#"
      #### From

      * "From <Account> <Event>" - Runs event as the given account
        * E.g. "From alice (Send bob 1.0e18)"
    "#,
            "From",
            vec![
                Arg::new("account", async_handler!(get_address_v)),
                Arg::new("event", async_handler!(get_event_v)),
            ],
            async_handler!(cmd_from),
        ),
        Command::new(
            r#"
      #### Trx

      * "Trx ...trxEvent" - Handles event to set details of next
        transaction
        * E.g. "Trx Value 1.0e18 (Send alice)"
    "#,
            "Trx",
            vec![Arg::new("event", async_handler!(get_event_v)).variadic()],
            async_handler!(cmd_trx),
        )
        .with_sub_commands(trx_commands),
        Command::new(
            r#"
      #### Invariant

      * "Invariant ...invariant" - Adds a new invariant to the world which
        is checked after each transaction
        * E.g. "Invariant Static (Balance alice)"
    "#,
            "Invariant",
            vec![Arg::new("event", async_handler!(get_event_v)).variadic()],
            async_handler!(cmd_invariant),
        )
        .with_sub_commands(invariant_commands),
        Command::new(
            r#"
      #### Expect

      * "Expect ...expectation" - Adds an expectation to hold after the
        next transaction
        * E.g. "Expect Changes (Balance alice) +10"
    "#,
            "Expect",
            vec![Arg::new("event", async_handler!(get_event_v)).variadic()],
            async_handler!(cmd_expect),
        )
        .with_sub_commands(expectation_commands),
        Command::new(
            r#"
      #### HoldInvariants

      * "HoldInvariants type:<String>=All" - Skips checking invariants on
        next command
        * E.g. "HoldInvariants" - Skips all invariants
        * E.g. "HoldInvariants Static" - Skips "static" invariants
    "#,
            "HoldInvariants",
            vec![Arg::new("type", async_handler!(get_string_v)).with_default(Value::Str("All".to_owned()))],
            async_handler!(cmd_hold_invariants),
        ),
        Command::new(
            r#"
      #### ClearInvariants

      * "ClearInvariants type:<String>=All" - Removes all invariants
        * E.g. "ClearInvariants" - Removes all invariants
        * E.g. "ClearInvariants Static" - Removes "static" invariants
    "#,
            "ClearInvariants",
            vec![Arg::new("type", async_handler!(get_string_v)).with_default(Value::Str("All".to_owned()))],
            async_handler!(cmd_clear_invariants),
        ),
        Command::new(
            r#"
      #### Assert

      * "Assert ...event" - Validates given assertion, raising an exception
        if assertion fails
        * E.g. "Assert Equal (Balance alice) (Exactly 5)"
    "#,
            "Assert",
            vec![Arg::new("event", async_handler!(get_event_v)).variadic()],
            async_handler!(cmd_assert),
        )
        .with_sub_commands(assertion_commands),
        Command::new(
            r#"
      #### Gate

      * "Gate value event" - Runs event only if value is falsey. Thus, gate
        can be used to build idempotency
        * E.g. "Gate (Counter Address) (Deploy Counter)"
    "#,
            "Gate",
            vec![
                Arg::new("gate", get_core_value).rescue(Value::Nothing),
                Arg::new("event", async_handler!(get_event_v)),
            ],
            async_handler!(cmd_gate),
        ),
        Command::new(
            r#"
      #### Given

      * "Given value event" - Runs event only if value is truthy. Thus,
        given can be used to build existence checks
        * E.g. "Given (Counter Address) (Read Counter Address)"
    "#,
            "Given",
            vec![
                Arg::new("given", get_core_value).rescue(Value::Nothing),
                Arg::new("event", async_handler!(get_event_v)),
            ],
            async_handler!(cmd_given),
        ),
        Command::new(
            r#"
      #### Send

      * "Send <Address> <Amount>" - Sends a given amount to given address
        from the ambient sender
        * E.g. "Send alice 0.5e18"
        * E.g. "Trx Value 1.0e18 (Send alice)" - Amount from transaction
          details
    "#,
            "Send",
            vec![
                Arg::new("address", async_handler!(get_address_v)),
                Arg::new("amount", async_handler!(get_number_v)).nullable(),
                Arg::new("from", async_handler!(get_sender_v)).implicit(),
            ],
            async_handler!(cmd_send),
        ),
        Command::new(
            r#"
      #### Deploy

      * "Deploy name:<String>" - Deploys a contract under the given logical
        name and records it in the deployment manifest
        * E.g. "Deploy Counter"
    "#,
            "Deploy",
            vec![
                Arg::new("name", async_handler!(get_string_v)),
                Arg::new("from", async_handler!(get_sender_v)).implicit(),
            ],
            async_handler!(cmd_deploy),
        ),
        Command::new(
            r#"
      #### Help

      * "Help ...command" - Prints help for given command
        * E.g. "Help From"
    "#,
            "Help",
            vec![Arg::new("event", async_handler!(get_event_v)).variadic()],
            async_handler!(cmd_help),
        ),
    ]
}

async fn cmd_history(world: World, args: Bindings) -> HandlerResult<World> {
    let n = args.number("n")?.as_u64().unwrap_or(0) as usize;
    for action in world.actions.iter().take(n) {
        world.print_line(&action.to_string());
    }
    Ok(world)
}

async fn cmd_sleep(world: World, args: Bindings) -> HandlerResult<World> {
    let ms = args.number("ms")?.as_u64().ok_or_else(|| {
        ScenarioError::Raised("Sleep needs a non-negative millisecond count".to_owned())
    })?;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(world)
}

async fn cmd_throw(_world: World, args: Bindings) -> HandlerResult<World> {
    Err(ScenarioError::Raised(args.string("errMsg")?))
}

async fn cmd_read(world: World, args: Bindings) -> HandlerResult<World> {
    let value = args.value("res")?;
    world.printer.print_value(&value);
    Ok(world)
}

async fn cmd_print(world: World, args: Bindings) -> HandlerResult<World> {
    let message = args.string("message")?;
    world.print_line(&message);
    Ok(world)
}

async fn cmd_print_transaction_logs(world: World, _args: Bindings) -> HandlerResult<World> {
    Ok(world.update_settings(|settings| settings.print_tx_logs = true))
}

async fn cmd_my_address(world: World, args: Bindings) -> HandlerResult<World> {
    let address = args.address("address")?;
    let world = world.update_settings(|settings| {
        settings.aliases.insert("Me".to_owned(), address);
    });
    networks::save_settings(&world)?;
    Ok(world)
}

async fn cmd_alias(world: World, args: Bindings) -> HandlerResult<World> {
    let name = args.string("name")?;
    let address = args.address("address")?;
    let world = world.update_settings(|settings| {
        settings.aliases.insert(name, address);
    });
    networks::save_settings(&world)?;
    Ok(world)
}

async fn cmd_aliases(world: World, _args: Bindings) -> HandlerResult<World> {
    world.print_line("Aliases:");
    for (name, address) in &world.settings.aliases {
        world.print_line(&format!("\t{}: {}", name, address));
    }
    Ok(world)
}

async fn cmd_increase_time(world: World, args: Bindings) -> HandlerResult<World> {
    let seconds = args.number("seconds")?.as_u64().ok_or_else(|| {
        ScenarioError::Raised("IncreaseTime needs a non-negative second count".to_owned())
    })?;
    world.backend.increase_time(seconds).await?;
    Ok(world)
}

async fn cmd_set_time(world: World, args: Bindings) -> HandlerResult<World> {
    let timestamp = args.number("timestamp")?.as_u64().ok_or_else(|| {
        ScenarioError::Raised("SetTime needs a non-negative timestamp".to_owned())
    })?;
    world.backend.set_time(timestamp).await?;
    Ok(world)
}

async fn cmd_mine_block(world: World, _args: Bindings) -> HandlerResult<World> {
    let block = world.backend.mine_block().await?;
    log::debug!("mined block {}", block);
    Ok(world)
}

async fn cmd_inspect(world: World, _args: Bindings) -> HandlerResult<World> {
    world.print_line(&world.describe());
    Ok(world)
}

async fn cmd_debug(world: World, args: Bindings) -> HandlerResult<World> {
    let message = args.string("message")?;
    world.print_line(&format!("{}: {}", message, world.describe()));
    Ok(world)
}

async fn cmd_from(world: World, args: Bindings) -> HandlerResult<World> {
    let account = args.address("account")?;
    let event = args.event("event")?;
    let previous = world.trx_from.clone();
    let world = world.with_trx_from(Some(account));
    let world = process_core_event(world, event).await?;
    Ok(world.with_trx_from(previous))
}

async fn cmd_trx(world: World, args: Bindings) -> HandlerResult<World> {
    process_trx_event(world, args.event("event")?).await
}

async fn cmd_invariant(world: World, args: Bindings) -> HandlerResult<World> {
    process_invariant_event(world, args.event("event")?).await
}

async fn cmd_expect(world: World, args: Bindings) -> HandlerResult<World> {
    process_expectation_event(world, args.event("event")?).await
}

fn parse_category(name: &str) -> HandlerResult<InvariantCategory> {
    InvariantCategory::from_str(name)
        .map_err(|_| ScenarioError::Raised(format!("unknown invariant category `{}`", name)))
}

async fn cmd_hold_invariants(world: World, args: Bindings) -> HandlerResult<World> {
    let category = parse_category(&args.string("type")?)?;
    Ok(hold_invariants(world, category))
}

async fn cmd_clear_invariants(world: World, args: Bindings) -> HandlerResult<World> {
    let category = parse_category(&args.string("type")?)?;
    Ok(clear_invariants(world, category))
}

async fn cmd_assert(world: World, args: Bindings) -> HandlerResult<World> {
    process_assertion_event(world, args.event("event")?).await
}

async fn cmd_gate(world: World, args: Bindings) -> HandlerResult<World> {
    let gate = args.value("gate")?;
    if gate.truthy() {
        Ok(world)
    } else {
        process_core_event(world, args.event("event")?).await
    }
}

async fn cmd_given(world: World, args: Bindings) -> HandlerResult<World> {
    let given = args.value("given")?;
    if given.truthy() {
        process_core_event(world, args.event("event")?).await
    } else {
        Ok(world)
    }
}

async fn cmd_send(world: World, args: Bindings) -> HandlerResult<World> {
    let address = args.address("address")?;
    let from = args.address("from")?;
    let amount = match args.opt("amount") {
        Some(Value::Number(amount)) => *amount,
        Some(other) => {
            return Err(ScenarioError::Raised(format!(
                "Send amount must be a number, got `{}`",
                other
            )));
        }
        None => world.trx_value.ok_or_else(|| {
            ScenarioError::Raised(
                "Send needs an amount, either inline or via `Trx Value`".to_owned(),
            )
        })?,
    };
    let encoded = amount.encode().map_err(ScenarioError::Raised)?;

    let invokation = world.backend.transfer(&from, &address, encoded).await?;
    if world.settings.print_tx_logs {
        world.print_line(&format!(
            "{} ({})",
            invokation.description,
            if invokation.success { "ok" } else { invokation.error_message() }
        ));
    }
    let world = world.add_action(
        format!("Send {} from {} to {}", amount, from, address),
        Some(invokation),
    );
    Ok(world)
}

async fn cmd_deploy(world: World, args: Bindings) -> HandlerResult<World> {
    let name = args.string("name")?;
    let from = args.address("from")?;
    let handle = world.backend.deploy(&name, &from).await?;
    let description = format!("Deployed {} to address {}", handle.name, handle.address);
    let world = networks::store_and_save_contract(world, handle)?;
    Ok(world.add_action(description, Some(Invokation::succeeded("deploy"))))
}

async fn cmd_help(world: World, args: Bindings) -> HandlerResult<World> {
    let topic = args.event("event")?;
    let registry = world.registry.clone();
    match topic.head() {
        None => {
            world.print_line("Available commands:");
            for command in registry.commands() {
                world.print_line(&format!("  {}", command.usage()));
            }
            world.print_line("See details with `Help <command>`");
        }
        Some(name) => {
            match registry
                .commands()
                .iter()
                .find(|command| command.name().eq_ignore_ascii_case(name))
            {
                Some(command) => {
                    world.print_line(command.doc().trim_end());
                    if let Some(sub_commands) = command.sub_commands() {
                        world.print_line("Sub-commands:");
                        for sub in &sub_commands {
                            world.print_line(&format!("  {} {}", command.name(), sub.usage()));
                        }
                    }
                }
                None => {
                    return Err(ScenarioError::CommandNotFound {
                        family: "Help".to_owned(),
                        head: name.to_owned(),
                    });
                }
            }
        }
    }
    Ok(world)
}
