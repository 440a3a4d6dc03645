//! Handler registry: argument descriptors, binding and overload resolution.
//!
//! A handler family is a declaration-ordered list; resolution picks the
//! first handler whose name token matches case-insensitively at its declared
//! position and whose remaining slots bind successfully, falling back to the
//! first `catchall` handler. Ties between overloads are broken by
//! declaration order, deterministically.

use futures::future::BoxFuture;
use indexmap::IndexMap;

use scen_common::{Event, Number, ScenarioError, Value};

use crate::world::World;

pub type HandlerResult<T> = Result<T, ScenarioError>;

/// Coercion callback: turn one sub-event into a typed value, possibly by
/// recursing through the fetcher registry.
pub type Coercer = fn(World, Event) -> BoxFuture<'static, HandlerResult<Value>>;

/// Execution callback; `Out` is `World` for commands, `Value` for fetchers.
pub type Callback<Out> = fn(World, Bindings) -> BoxFuture<'static, HandlerResult<Out>>;

/// One declared argument and its binding policy.
///
/// Policy evaluation order during binding: implicit, default, nullable,
/// variadic (optionally mapped per element), then single coercion. A
/// `rescue` value substitutes for a failed coercion rather than a missing
/// argument.
pub struct Arg {
    name: &'static str,
    coercer: Coercer,
    default: Option<Value>,
    nullable: bool,
    variadic: bool,
    mapped: bool,
    implicit: bool,
    rescue: Option<Value>,
}

impl Arg {
    pub fn new(name: &'static str, coercer: Coercer) -> Self {
        Self {
            name,
            coercer,
            default: None,
            nullable: false,
            variadic: false,
            mapped: false,
            implicit: false,
            rescue: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Consume every remaining sub-event, bound as a single nested event.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Variadic, but coercing each remaining sub-event individually into a
    /// list.
    pub fn mapped(mut self) -> Self {
        self.variadic = true;
        self.mapped = true;
        self
    }

    /// Resolve from ambient world state; the event slice is ignored.
    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    pub fn rescue(mut self, value: Value) -> Self {
        self.rescue = Some(value);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_required(&self) -> bool {
        !(self.implicit || self.nullable || self.variadic || self.default.is_some())
    }
}

/// A named, documented handler. `Command`s return a new `World`; `Fetcher`s
/// are read-only and return a `Value`.
pub struct Handler<Out> {
    doc: &'static str,
    name: &'static str,
    name_pos: usize,
    args: Vec<Arg>,
    catchall: bool,
    sub_commands: Option<fn() -> Vec<Command>>,
    callback: Callback<Out>,
}

pub type Command = Handler<World>;
pub type Fetcher = Handler<Value>;

impl<Out: 'static> Handler<Out> {
    pub fn new(doc: &'static str, name: &'static str, args: Vec<Arg>, callback: Callback<Out>) -> Self {
        // At most one variadic argument, and it must close the list.
        debug_assert!(
            args.iter()
                .enumerate()
                .all(|(i, arg)| !arg.variadic || i == args.len() - 1),
            "variadic argument must be last in `{}`",
            name
        );
        Self {
            doc,
            name,
            name_pos: 0,
            args,
            catchall: false,
            sub_commands: None,
            callback,
        }
    }

    /// Accept any head token when no named handler in the family matched.
    pub fn catchall(mut self) -> Self {
        self.catchall = true;
        self
    }

    /// Index at which the handler's own name appears, supporting
    /// "subject verb" phrasings such as `MyCounter Become`.
    pub fn with_name_pos(mut self, name_pos: usize) -> Self {
        self.name_pos = name_pos;
        self
    }

    pub fn with_sub_commands(mut self, sub_commands: fn() -> Vec<Command>) -> Self {
        self.sub_commands = Some(sub_commands);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    pub fn is_catchall(&self) -> bool {
        self.catchall
    }

    pub fn sub_commands(&self) -> Option<Vec<Command>> {
        self.sub_commands.map(|build| build())
    }

    pub fn usage(&self) -> String {
        let mut usage = self.name.to_owned();
        for arg in &self.args {
            if arg.implicit {
                continue;
            }
            let shape = if arg.variadic {
                format!(" ...{}", arg.name)
            } else if arg.is_required() {
                format!(" <{}>", arg.name)
            } else {
                format!(" [{}]", arg.name)
            };
            usage.push_str(&shape);
        }
        usage
    }

    fn matches_name(&self, elements: &[Event]) -> bool {
        elements
            .get(self.name_pos)
            .and_then(Event::token)
            .is_some_and(|token| token.eq_ignore_ascii_case(self.name))
    }

    pub async fn execute(&self, world: World, bindings: Bindings) -> HandlerResult<Out> {
        (self.callback)(world, bindings).await
    }
}

/// The top-level handler tables, constructed once at startup and passed by
/// reference (through the `World`) into the dispatcher.
pub struct Registry {
    commands: Vec<Command>,
    fetchers: Vec<Fetcher>,
}

impl Registry {
    pub fn new(commands: Vec<Command>, fetchers: Vec<Fetcher>) -> Self {
        Self { commands, fetchers }
    }

    /// The core command and fetcher families.
    pub fn core() -> Self {
        Self::new(crate::commands::core_commands(), crate::fetch::core_fetchers())
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn fetchers(&self) -> &[Fetcher] {
        &self.fetchers
    }
}

/// Resolve an event against a handler family and run the winner.
pub async fn resolve<Out: 'static>(
    family: &str,
    handlers: &[Handler<Out>],
    world: World,
    event: &Event,
) -> HandlerResult<Out> {
    let elements = event.elements();
    let mut bind_failure: Option<ScenarioError> = None;

    for handler in handlers.iter().filter(|h| !h.catchall) {
        if !handler.matches_name(elements) {
            continue;
        }
        let mut actuals = elements.to_vec();
        actuals.remove(handler.name_pos);
        match bind_args(world.clone(), &handler.args, &actuals).await {
            Ok(bindings) => return handler.execute(world, bindings).await,
            Err(fatal @ ScenarioError::DepthExceeded { .. }) => return Err(fatal),
            Err(failure) => {
                bind_failure.get_or_insert(failure);
            }
        }
    }

    for handler in handlers.iter().filter(|h| h.catchall) {
        match bind_args(world.clone(), &handler.args, elements).await {
            Ok(bindings) => return handler.execute(world, bindings).await,
            Err(fatal @ ScenarioError::DepthExceeded { .. }) => return Err(fatal),
            Err(failure) => {
                bind_failure.get_or_insert(failure);
            }
        }
    }

    match bind_failure {
        Some(failure) => Err(failure),
        None => Err(ScenarioError::CommandNotFound {
            family: family.to_owned(),
            head: event.head().unwrap_or_default().to_owned(),
        }),
    }
}

/// Bind declared arguments against the actual sub-events, in order.
pub async fn bind_args(world: World, args: &[Arg], actuals: &[Event]) -> HandlerResult<Bindings> {
    let mut values: IndexMap<&'static str, Value> = IndexMap::new();
    let mut cursor = 0usize;

    for arg in args {
        let value = if arg.implicit {
            (arg.coercer)(world.clone(), Event::empty())
                .await
                .map_err(|failure| as_binding_failure(arg, &Event::empty(), failure))?
        } else if cursor >= actuals.len() && (arg.default.is_some() || arg.nullable) {
            match &arg.default {
                Some(default) => default.clone(),
                None => Value::Nothing,
            }
        } else if arg.variadic {
            let rest = actuals[cursor..].to_vec();
            cursor = actuals.len();
            if arg.mapped {
                let mut items = Vec::with_capacity(rest.len());
                for element in rest {
                    let item = (arg.coercer)(world.clone(), element.clone())
                        .await
                        .map_err(|failure| as_binding_failure(arg, &element, failure))?;
                    items.push(item);
                }
                Value::List(items)
            } else {
                let remainder = Event::Seq(rest);
                (arg.coercer)(world.clone(), remainder.clone())
                    .await
                    .map_err(|failure| as_binding_failure(arg, &remainder, failure))?
            }
        } else if cursor >= actuals.len() {
            return Err(ScenarioError::binding(
                arg.name,
                &Event::Seq(actuals.to_vec()),
                "missing required argument",
            ));
        } else {
            let element = actuals[cursor].clone();
            cursor += 1;
            match (arg.coercer)(world.clone(), element.clone()).await {
                Ok(value) => value,
                Err(fatal @ ScenarioError::DepthExceeded { .. }) => return Err(fatal),
                Err(_) if arg.rescue.is_some() => arg.rescue.clone().expect("checked"),
                Err(failure) => return Err(as_binding_failure(arg, &element, failure)),
            }
        };
        values.insert(arg.name, value);
    }

    if cursor < actuals.len() {
        let extra = Event::Seq(actuals[cursor..].to_vec());
        return Err(ScenarioError::binding(
            args.last().map_or("<none>", |arg| arg.name),
            &extra,
            "unexpected trailing arguments",
        ));
    }

    Ok(Bindings::new(values))
}

/// Any failure while coercing counts as a binding failure for overload
/// resolution, so a later handler in the family may still match. Blowing
/// the recursion bound is fatal and is never converted.
fn as_binding_failure(arg: &Arg, event: &Event, failure: ScenarioError) -> ScenarioError {
    match failure {
        already @ ScenarioError::ArgumentBinding { .. } => already,
        fatal @ ScenarioError::DepthExceeded { .. } => fatal,
        other => ScenarioError::binding(arg.name, event, other.to_string()),
    }
}

/// Bound argument values, keyed by declared name, with typed accessors.
#[derive(Debug, Default)]
pub struct Bindings {
    values: IndexMap<&'static str, Value>,
}

impl Bindings {
    pub fn new(values: IndexMap<&'static str, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// `None` when the argument bound to `Nothing` (nullable slot left
    /// empty) or is absent.
    pub fn opt(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(Value::Nothing) | None => None,
            Some(value) => Some(value),
        }
    }

    pub fn value(&self, name: &str) -> HandlerResult<Value> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| mismatch(name, "a bound value", &Value::Nothing))
    }

    pub fn number(&self, name: &str) -> HandlerResult<Number> {
        match self.values.get(name) {
            Some(Value::Number(number)) => Ok(*number),
            other => Err(mismatch(name, "Number", other.unwrap_or(&Value::Nothing))),
        }
    }

    pub fn address(&self, name: &str) -> HandlerResult<String> {
        match self.values.get(name) {
            Some(Value::Address(address)) => Ok(address.clone()),
            other => Err(mismatch(name, "Address", other.unwrap_or(&Value::Nothing))),
        }
    }

    pub fn string(&self, name: &str) -> HandlerResult<String> {
        match self.values.get(name) {
            Some(Value::Str(text)) => Ok(text.clone()),
            Some(Value::Address(address)) => Ok(address.clone()),
            other => Err(mismatch(name, "String", other.unwrap_or(&Value::Nothing))),
        }
    }

    pub fn boolean(&self, name: &str) -> HandlerResult<bool> {
        match self.values.get(name) {
            Some(Value::Bool(flag)) => Ok(*flag),
            other => Err(mismatch(name, "Bool", other.unwrap_or(&Value::Nothing))),
        }
    }

    pub fn event(&self, name: &str) -> HandlerResult<Event> {
        match self.values.get(name) {
            Some(Value::Event(event)) => Ok(event.clone()),
            other => Err(mismatch(name, "Event", other.unwrap_or(&Value::Nothing))),
        }
    }

    pub fn list(&self, name: &str) -> HandlerResult<Vec<Value>> {
        match self.values.get(name) {
            Some(Value::List(values)) => Ok(values.clone()),
            other => Err(mismatch(name, "List", other.unwrap_or(&Value::Nothing))),
        }
    }
}

fn mismatch(name: &str, expected: &str, got: &Value) -> ScenarioError {
    ScenarioError::ArgumentBinding {
        arg: name.to_owned(),
        event: got.to_string(),
        reason: format!("expected {}, got {}", expected, got.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{get_event_v, get_number_v, get_sender_v, get_string_v};
    use crate::testutil::test_world;
    use scen_common::{async_handler, parser};

    fn ev(line: &str) -> Event {
        parser::parse(line).unwrap().pop().expect("one event")
    }

    fn tag(name: &'static str) -> Value {
        Value::Str(name.to_owned())
    }

    async fn yield_unary(_world: World, _args: Bindings) -> HandlerResult<Value> {
        Ok(tag("unary"))
    }

    async fn yield_binary(_world: World, _args: Bindings) -> HandlerResult<Value> {
        Ok(tag("binary"))
    }

    async fn yield_first(_world: World, _args: Bindings) -> HandlerResult<Value> {
        Ok(tag("first"))
    }

    async fn yield_second(_world: World, _args: Bindings) -> HandlerResult<Value> {
        Ok(tag("second"))
    }

    async fn yield_catchall(_world: World, _args: Bindings) -> HandlerResult<Value> {
        Ok(tag("catchall"))
    }

    async fn echo_a(_world: World, args: Bindings) -> HandlerResult<Value> {
        args.value("a")
    }

    async fn echo_subject(_world: World, args: Bindings) -> HandlerResult<Value> {
        Ok(Value::Str(args.string("subject")?))
    }

    async fn echo_rest(_world: World, args: Bindings) -> HandlerResult<Value> {
        args.value("rest")
    }

    async fn sum_items(_world: World, args: Bindings) -> HandlerResult<Value> {
        let mut total = Number::exact(0);
        for item in args.list("items")? {
            match item {
                Value::Number(number) => {
                    total = total
                        .checked_add(&number)
                        .ok_or_else(|| ScenarioError::Raised("overflow".to_owned()))?;
                }
                other => return Err(ScenarioError::Raised(format!("non-number `{}`", other))),
            }
        }
        Ok(Value::Number(total))
    }

    async fn echo_from(_world: World, args: Bindings) -> HandlerResult<Value> {
        args.value("from")
    }

    #[tokio::test]
    async fn overloads_resolve_by_arity() {
        let family = vec![
            Fetcher::new("", "Do", vec![Arg::new("a", async_handler!(get_number_v))], async_handler!(yield_unary)),
            Fetcher::new(
                "",
                "Do",
                vec![
                    Arg::new("a", async_handler!(get_number_v)),
                    Arg::new("b", async_handler!(get_number_v)),
                ],
                async_handler!(yield_binary),
            ),
        ];
        let unary = resolve("Test", &family, test_world(), &ev("Do 1")).await.unwrap();
        assert_eq!(unary, tag("unary"));
        let binary = resolve("Test", &family, test_world(), &ev("Do 1 2")).await.unwrap();
        assert_eq!(binary, tag("binary"));
    }

    #[tokio::test]
    async fn ambiguous_overloads_break_ties_by_declaration_order() {
        let family = vec![
            Fetcher::new("", "Do", vec![Arg::new("a", async_handler!(get_number_v)).nullable()], async_handler!(yield_first)),
            Fetcher::new("", "Do", vec![Arg::new("a", async_handler!(get_number_v)).nullable()], async_handler!(yield_second)),
        ];
        let winner = resolve("Test", &family, test_world(), &ev("Do 5")).await.unwrap();
        assert_eq!(winner, tag("first"));
    }

    #[tokio::test]
    async fn name_match_is_case_insensitive() {
        let family = vec![Fetcher::new("", "Do", vec![], async_handler!(yield_unary))];
        let value = resolve("Test", &family, test_world(), &ev("dO")).await.unwrap();
        assert_eq!(value, tag("unary"));
    }

    #[tokio::test]
    async fn name_pos_supports_subject_verb_phrasing() {
        let family = vec![Fetcher::new(
            "",
            "Become",
            vec![Arg::new("subject", async_handler!(get_string_v))],
            async_handler!(echo_subject),
        )
        .with_name_pos(1)];
        let value = resolve("Test", &family, test_world(), &ev("MyImpl Become")).await.unwrap();
        assert_eq!(value, Value::Str("MyImpl".to_owned()));
    }

    #[tokio::test]
    async fn catchall_takes_unmatched_heads() {
        let family = vec![
            Fetcher::new("", "Known", vec![], async_handler!(yield_unary)),
            Fetcher::new(
                "",
                "Fallback",
                vec![Arg::new("rest", async_handler!(get_event_v)).variadic()],
                async_handler!(yield_catchall),
            )
            .catchall(),
        ];
        let value = resolve("Test", &family, test_world(), &ev("Whatever 5")).await.unwrap();
        assert_eq!(value, tag("catchall"));
    }

    #[tokio::test]
    async fn unmatched_head_without_catchall_is_command_not_found() {
        let family = vec![Fetcher::new("", "Known", vec![], async_handler!(yield_unary))];
        let failure = resolve("Zzz", &family, test_world(), &ev("DoThing")).await.unwrap_err();
        match failure {
            ScenarioError::CommandNotFound { family, head } => {
                assert_eq!(family, "Zzz");
                assert_eq!(head, "DoThing");
            }
            other => panic!("expected CommandNotFound, got {}", other),
        }
    }

    #[tokio::test]
    async fn defaults_fill_missing_trailing_arguments() {
        let family = vec![Fetcher::new(
            "",
            "Opt",
            vec![Arg::new("a", async_handler!(get_number_v)).with_default(Value::Number(Number::exact(5)))],
            async_handler!(echo_a),
        )];
        let defaulted = resolve("Test", &family, test_world(), &ev("Opt")).await.unwrap();
        assert_eq!(defaulted, Value::Number(Number::exact(5)));
        let explicit = resolve("Test", &family, test_world(), &ev("Opt 9")).await.unwrap();
        assert_eq!(explicit, Value::Number(Number::exact(9)));
    }

    #[tokio::test]
    async fn nullable_binds_nothing_when_empty() {
        let family = vec![Fetcher::new(
            "",
            "Nul",
            vec![Arg::new("a", async_handler!(get_number_v)).nullable()],
            async_handler!(echo_a),
        )];
        let value = resolve("Test", &family, test_world(), &ev("Nul")).await.unwrap();
        assert_eq!(value, Value::Nothing);
    }

    #[tokio::test]
    async fn variadic_consumes_the_remainder_as_one_event() {
        let family = vec![Fetcher::new(
            "",
            "Var",
            vec![Arg::new("rest", async_handler!(get_event_v)).variadic()],
            async_handler!(echo_rest),
        )];
        let value = resolve("Test", &family, test_world(), &ev("Var a b c")).await.unwrap();
        assert_eq!(value, Value::Event(ev("(a b c)")));
    }

    #[tokio::test]
    async fn mapped_variadic_coerces_each_element() {
        let family = vec![Fetcher::new(
            "",
            "Sum",
            vec![Arg::new("items", async_handler!(get_number_v)).mapped()],
            async_handler!(sum_items),
        )];
        let value = resolve("Test", &family, test_world(), &ev("Sum 1 2 3")).await.unwrap();
        assert_eq!(value, Value::Number(Number::exact(6)));
    }

    #[tokio::test]
    async fn implicit_arguments_come_from_ambient_state() {
        let world = test_world();
        let expected = world.accounts[0].address.clone();
        let family = vec![Fetcher::new(
            "",
            "WhoAmI",
            vec![Arg::new("from", async_handler!(get_sender_v)).implicit()],
            async_handler!(echo_from),
        )];
        let value = resolve("Test", &family, world, &ev("WhoAmI")).await.unwrap();
        assert_eq!(value, Value::Address(expected));
    }

    #[tokio::test]
    async fn rescue_substitutes_for_failed_coercion() {
        let family = vec![Fetcher::new(
            "",
            "Res",
            vec![Arg::new("a", async_handler!(get_number_v)).rescue(Value::Nothing)],
            async_handler!(echo_a),
        )];
        let value = resolve("Test", &family, test_world(), &ev("Res notanumber")).await.unwrap();
        assert_eq!(value, Value::Nothing);
    }

    #[tokio::test]
    async fn missing_required_argument_names_the_argument() {
        let family = vec![Fetcher::new(
            "",
            "Need",
            vec![Arg::new("amount", async_handler!(get_number_v))],
            async_handler!(echo_a),
        )];
        let failure = resolve("Test", &family, test_world(), &ev("Need")).await.unwrap_err();
        match failure {
            ScenarioError::ArgumentBinding { arg, .. } => assert_eq!(arg, "amount"),
            other => panic!("expected ArgumentBinding, got {}", other),
        }
    }

    #[tokio::test]
    async fn trailing_arguments_are_rejected() {
        let family = vec![Fetcher::new(
            "",
            "One",
            vec![Arg::new("a", async_handler!(get_number_v))],
            async_handler!(echo_a),
        )];
        let failure = resolve("Test", &family, test_world(), &ev("One 1 2")).await.unwrap_err();
        assert!(matches!(failure, ScenarioError::ArgumentBinding { .. }));
    }

    #[test]
    fn usage_renders_the_argument_schema() {
        let handler: Fetcher = Fetcher::new(
            "",
            "Send",
            vec![
                Arg::new("address", async_handler!(get_string_v)),
                Arg::new("amount", async_handler!(get_number_v)).nullable(),
                Arg::new("from", async_handler!(get_sender_v)).implicit(),
            ],
            async_handler!(echo_a),
        );
        assert_eq!(handler.usage(), "Send <address> [amount]");
    }
}
