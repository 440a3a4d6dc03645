//! Typed argument coercion and the core value fetchers.
//!
//! A coercion inspects the sub-event's shape: leaves matching the primitive
//! grammar become literal values, and nested groups resolve back through
//! the fetcher registry, so an address argument can itself be the result of
//! `(Counter Address)`. That mutual recursion is bounded by the world's
//! dispatch depth.

use futures::future::BoxFuture;
use scen_common::{async_handler, Event, Number, ScenarioError, Value};
use serde_json::Value as JsonValue;

use crate::registry::{resolve, Arg, Bindings, Fetcher, HandlerResult};
use crate::world::{World, ZERO_ADDRESS};

/// Evaluate an event to a value: literal leaves directly, nested groups
/// through the fetcher registry.
pub fn get_core_value(world: World, event: Event) -> BoxFuture<'static, HandlerResult<Value>> {
    Box::pin(async move {
        match event {
            Event::Atom(token) => Ok(leaf_value(&token)),
            Event::Seq(elements) if elements.is_empty() => Ok(Value::Nothing),
            event => {
                let dispatch_world = world.clone().enter_dispatch()?;
                let registry = dispatch_world.registry.clone();
                match resolve("CoreValue", registry.fetchers(), dispatch_world, &event).await {
                    Ok(value) => Ok(value),
                    Err(depth @ ScenarioError::DepthExceeded { .. }) => Err(depth),
                    Err(failure) => {
                        // `(5)` and `(alice)` are groups around a leaf, not
                        // fetcher calls; unwrap before giving up.
                        match event {
                            Event::Seq(elements) if elements.len() == 1 => {
                                let inner = elements.into_iter().next().expect("len checked");
                                get_core_value(world, inner).await
                            }
                            _ => Err(failure),
                        }
                    }
                }
            }
        }
    })
}

/// The primitive leaf grammar: keywords, numeric literals, hex addresses,
/// then bare strings.
fn leaf_value(token: &str) -> Value {
    if token.eq_ignore_ascii_case("True") {
        return Value::Bool(true);
    }
    if token.eq_ignore_ascii_case("False") {
        return Value::Bool(false);
    }
    if token.eq_ignore_ascii_case("Nothing") {
        return Value::Nothing;
    }
    if let Ok(number) = Number::from_literal(token) {
        return Value::Number(number);
    }
    if is_hex_address(token) {
        return Value::Address(token.to_owned());
    }
    Value::Str(token.to_owned())
}

fn is_hex_address(token: &str) -> bool {
    token
        .strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && hex::decode(digits).is_ok())
}

/// Resolve a name to an address: the zero keyword, a hex literal, an alias,
/// an account name, then the deployment records.
pub fn resolve_address(world: &World, name: &str) -> HandlerResult<String> {
    if name.eq_ignore_ascii_case("Zero") {
        return Ok(ZERO_ADDRESS.to_owned());
    }
    if name.starts_with("0x") {
        if is_hex_address(name) {
            return Ok(name.to_owned());
        }
        return Err(ScenarioError::Raised(format!("malformed address `{}`", name)));
    }
    if let Some(address) = world.settings.lookup_alias(name) {
        return Ok(address.to_owned());
    }
    if let Some(account) = world.find_account(name) {
        return Ok(account.address.clone());
    }
    if let Some(address) = world.get_data_string(&["Contracts", name]) {
        return Ok(address);
    }
    Err(ScenarioError::Raised(format!(
        "unable to resolve `{}` to an address",
        name
    )))
}

// ---- coercers ----------------------------------------------------------

pub async fn get_address_v(world: World, event: Event) -> HandlerResult<Value> {
    match get_core_value(world.clone(), event).await? {
        address @ Value::Address(_) => Ok(address),
        Value::Str(name) => resolve_address(&world, &name).map(Value::Address),
        other => Err(ScenarioError::Raised(format!(
            "expected an address, got {} `{}`",
            other.type_name(),
            other
        ))),
    }
}

pub async fn get_number_v(world: World, event: Event) -> HandlerResult<Value> {
    match get_core_value(world, event).await? {
        number @ Value::Number(_) => Ok(number),
        Value::Str(text) => Number::from_literal(&text)
            .map(Value::Number)
            .map_err(ScenarioError::Raised),
        other => Err(ScenarioError::Raised(format!(
            "expected a number, got {} `{}`",
            other.type_name(),
            other
        ))),
    }
}

pub async fn get_string_v(world: World, event: Event) -> HandlerResult<Value> {
    match get_core_value(world, event).await? {
        text @ Value::Str(_) => Ok(text),
        Value::Address(address) => Ok(Value::Str(address)),
        other => Err(ScenarioError::Raised(format!(
            "expected a string, got {} `{}`",
            other.type_name(),
            other
        ))),
    }
}

pub async fn get_bool_v(world: World, event: Event) -> HandlerResult<Value> {
    match get_core_value(world, event).await? {
        flag @ Value::Bool(_) => Ok(flag),
        other => Err(ScenarioError::Raised(format!(
            "expected a bool, got {} `{}`",
            other.type_name(),
            other
        ))),
    }
}

/// The raw sub-event, for handlers that dispatch it themselves.
pub async fn get_event_v(_world: World, event: Event) -> HandlerResult<Value> {
    Ok(Value::Event(event))
}

/// Implicit sender argument, resolved from ambient world state (an explicit
/// `From` override or the default account) instead of the event.
pub async fn get_sender_v(world: World, _event: Event) -> HandlerResult<Value> {
    world
        .default_from()
        .map(Value::Address)
        .ok_or_else(|| ScenarioError::Raised("no sender account available".to_owned()))
}

// ---- core fetchers -----------------------------------------------------

/// The read-only core fetcher family.
pub fn core_fetchers() -> Vec<Fetcher> {
    vec![
        Fetcher::new(
            r#"
      #### Exactly

      * "Exactly <Amount>" - Returns a literal number
        * E.g. "Exactly 5"
    "#,
            "Exactly",
            vec![Arg::new("amount", async_handler!(get_number_v))],
            async_handler!(fetch_exactly),
        ),
        Fetcher::new(
            r#"
      #### Exp

      * "Exp <Amount>" - Returns the number scaled by 1e18
        * E.g. "Exp 1.5" - Returns 1500000000000000000
    "#,
            "Exp",
            vec![Arg::new("amount", async_handler!(get_number_v))],
            async_handler!(fetch_exp),
        ),
        Fetcher::new(
            r#"
      #### String

      * "String <Str>" - Returns a string literal
        * E.g. "String MyString"
    "#,
            "String",
            vec![Arg::new("str", async_handler!(get_string_v))],
            async_handler!(fetch_string),
        ),
        Fetcher::new(
            r#"
      #### Address

      * "Address <Name>" - Returns an address by hex literal, alias,
        account name or deployment record
        * E.g. "Address alice"
    "#,
            "Address",
            vec![Arg::new("address", async_handler!(get_address_v))],
            async_handler!(fetch_address),
        ),
        Fetcher::new(
            r#"
      #### User

      * "User <Name>" - Returns the address of a named account
        * E.g. "User alice"
    "#,
            "User",
            vec![Arg::new("name", async_handler!(get_string_v))],
            async_handler!(fetch_user),
        ),
        Fetcher::new(
            r#"
      #### List

      * "List ..." - Returns the given values as a list
        * E.g. "List 1 2 3" or "[1 2 3]"
    "#,
            "List",
            vec![Arg::new("values", get_core_value).mapped()],
            async_handler!(fetch_list),
        ),
        Fetcher::new(
            r#"
      #### Equal

      * "Equal <A> <B>" - Structural equality of two values
        * E.g. "Equal (Balance alice) (Exactly 5)"
    "#,
            "Equal",
            vec![
                Arg::new("a", get_core_value),
                Arg::new("b", get_core_value),
            ],
            async_handler!(fetch_equal),
        ),
        Fetcher::new(
            r#"
      #### LastContract

      * "LastContract" - The address of the most recently deployed
        contract, or Nothing
    "#,
            "LastContract",
            vec![],
            async_handler!(fetch_last_contract),
        ),
        Fetcher::new(
            r#"
      #### Balance

      * "Balance <Address>" - The chain balance of the given address
        * E.g. "Balance alice"
    "#,
            "Balance",
            vec![Arg::new("address", async_handler!(get_address_v))],
            async_handler!(fetch_balance),
        ),
        Fetcher::new(
            r#"
      #### BlockNumber

      * "BlockNumber" - The current chain height
    "#,
            "BlockNumber",
            vec![],
            async_handler!(fetch_block_number),
        ),
        Fetcher::new(
            r#"
      #### Timestamp

      * "Timestamp" - The current chain time
    "#,
            "Timestamp",
            vec![],
            async_handler!(fetch_timestamp),
        ),
        Fetcher::new(
            r#"
      #### <Contract> lookup

      * "<Name> Address" or "<Name> <Field>" - Reads the deployment
        records for a named contract
        * E.g. "Counter Address"
    "#,
            "ContractData",
            vec![Arg::new("path", async_handler!(get_string_v)).mapped()],
            async_handler!(fetch_contract_data),
        )
        .catchall(),
    ]
}

async fn fetch_exactly(_world: World, args: Bindings) -> HandlerResult<Value> {
    Ok(Value::Number(args.number("amount")?))
}

async fn fetch_exp(_world: World, args: Bindings) -> HandlerResult<Value> {
    let amount = args.number("amount")?;
    match amount.scale() {
        Some(_) => Ok(Value::Number(amount)),
        None => {
            let scaled = amount
                .mantissa()
                .checked_mul(10i128.pow(scen_common::number::EXP_SCALE))
                .ok_or_else(|| {
                    ScenarioError::Raised(format!("{} overflows the 1e18 scale", amount))
                })?;
            Ok(Value::Number(Number::scaled(scaled)))
        }
    }
}

async fn fetch_string(_world: World, args: Bindings) -> HandlerResult<Value> {
    Ok(Value::Str(args.string("str")?))
}

async fn fetch_address(_world: World, args: Bindings) -> HandlerResult<Value> {
    Ok(Value::Address(args.address("address")?))
}

async fn fetch_user(world: World, args: Bindings) -> HandlerResult<Value> {
    let name = args.string("name")?;
    resolve_address(&world, &name).map(Value::Address)
}

async fn fetch_list(_world: World, args: Bindings) -> HandlerResult<Value> {
    Ok(Value::List(args.list("values")?))
}

async fn fetch_equal(_world: World, args: Bindings) -> HandlerResult<Value> {
    Ok(Value::Bool(args.value("a")? == args.value("b")?))
}

async fn fetch_last_contract(world: World, _args: Bindings) -> HandlerResult<Value> {
    Ok(world
        .last_contract
        .as_ref()
        .map(|handle| Value::Address(handle.address.clone()))
        .unwrap_or(Value::Nothing))
}

async fn fetch_balance(world: World, args: Bindings) -> HandlerResult<Value> {
    let address = args.address("address")?;
    let balance = world.backend.balance(&address).await?;
    let balance = i128::try_from(balance)
        .map_err(|_| ScenarioError::Backend(format!("balance of {} overflows", address)))?;
    Ok(Value::Number(Number::exact(balance)))
}

async fn fetch_block_number(world: World, _args: Bindings) -> HandlerResult<Value> {
    let block = world.backend.block_number().await?;
    Ok(Value::Number(Number::exact(i128::from(block))))
}

async fn fetch_timestamp(world: World, _args: Bindings) -> HandlerResult<Value> {
    let time = world.backend.timestamp().await?;
    Ok(Value::Number(Number::exact(i128::from(time))))
}

/// Catch-all: any unmatched head token reads the deployment records, so
/// `(Counter Address)` works without a per-contract fetcher.
async fn fetch_contract_data(world: World, args: Bindings) -> HandlerResult<Value> {
    let path_values = args.list("path")?;
    let parts: Vec<String> = path_values
        .iter()
        .map(|value| match value {
            Value::Str(text) => Ok(text.clone()),
            Value::Address(address) => Ok(address.clone()),
            other => Err(ScenarioError::Raised(format!(
                "contract lookup path must be names, got `{}`",
                other
            ))),
        })
        .collect::<HandlerResult<_>>()?;

    let (name, fields) = match parts.split_first() {
        Some(split) => split,
        None => return Err(ScenarioError::Raised("empty contract lookup".to_owned())),
    };

    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let doc = if refs.is_empty() || refs[0].eq_ignore_ascii_case("Address") {
        world.get_data(&["Contracts", name.as_str()])
    } else {
        let mut path = vec![name.as_str()];
        path.extend(&refs);
        world.get_data(&path)
    };

    match doc {
        Some(doc) => json_to_value(doc),
        None => Err(ScenarioError::Raised(format!(
            "no contract data for `{}`",
            parts.join(" ")
        ))),
    }
}

fn json_to_value(doc: &JsonValue) -> HandlerResult<Value> {
    match doc {
        JsonValue::String(text) => {
            if is_hex_address(text) {
                Ok(Value::Address(text.clone()))
            } else {
                Ok(Value::Str(text.clone()))
            }
        }
        JsonValue::Number(number) => number
            .as_i64()
            .map(|n| Value::Number(Number::exact(i128::from(n))))
            .ok_or_else(|| ScenarioError::Raised(format!("non-integer data `{}`", number))),
        JsonValue::Bool(flag) => Ok(Value::Bool(*flag)),
        JsonValue::Null => Ok(Value::Nothing),
        JsonValue::Array(items) => items
            .iter()
            .map(json_to_value)
            .collect::<HandlerResult<Vec<Value>>>()
            .map(Value::List),
        JsonValue::Object(_) => Err(ScenarioError::Raised(
            "contract lookup landed on a nested record, not a value".to_owned(),
        )),
    }
}
