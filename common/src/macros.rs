//! Named macro templates expanded ahead of dispatch.
//!
//! A definition file is a sequence of `name(params...) = body` lines using
//! the ordinary scenario grammar for the body. Expansion is depth-first and
//! bounded, so a macro may call other macros but a self-recursive definition
//! fails with a parse error instead of overflowing the stack.

use indexmap::IndexMap;

use crate::error::ParseError;
use crate::event::Event;
use crate::parser::parse_line;

/// Hard cap on nested macro substitutions.
pub const MAX_EXPANSION_DEPTH: u32 = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Event,
}

/// Declaration-ordered macro table, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    defs: IndexMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a macro definition file.
    pub fn parse_defs(text: &str) -> Result<MacroTable, ParseError> {
        let mut table = MacroTable::new();
        let mut offset = 0;
        for line in text.split('\n') {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with("--") {
                table.add_def(line, offset)?;
            }
            offset += line.len() + 1;
        }
        Ok(table)
    }

    fn add_def(&mut self, line: &str, offset: usize) -> Result<(), ParseError> {
        let (lhs, rhs) = line
            .split_once('=')
            .ok_or_else(|| ParseError::new(offset, "macro definition is missing `=`"))?;

        let lhs = lhs.trim();
        let (name, params) = match lhs.split_once('(') {
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| ParseError::new(offset, "unterminated macro parameter list"))?;
                let params: Vec<String> = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned)
                    .collect();
                (name.trim(), params)
            }
            None => (lhs, Vec::new()),
        };
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ParseError::new(offset, format!("bad macro name `{}`", name)));
        }

        let body = parse_line(rhs)?
            .ok_or_else(|| ParseError::new(offset, format!("macro `{}` has an empty body", name)))?;

        let key = name.to_lowercase();
        if self
            .defs
            .insert(key, MacroDef { name: name.to_owned(), params, body })
            .is_some()
        {
            return Err(ParseError::new(offset, format!("duplicate macro `{}`", name)));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.defs.get(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.values().map(|def| def.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Expand every macro call in the forest. A head token is a macro call
    /// only when it names a table entry; anything else is an ordinary
    /// command left for the dispatcher.
    pub fn expand(&self, forest: Vec<Event>) -> Result<Vec<Event>, ParseError> {
        forest
            .into_iter()
            .map(|event| self.expand_event(event, 0))
            .collect()
    }

    /// Expand a call to a known macro; unknown names are an error here.
    pub fn expand_named(&self, name: &str, actuals: &[Event]) -> Result<Event, ParseError> {
        let def = self
            .get(name)
            .ok_or_else(|| ParseError::new(0, format!("unknown macro `{}`", name)))?;
        substitute(&def.body, def, actuals)
    }

    fn expand_event(&self, event: Event, depth: u32) -> Result<Event, ParseError> {
        if depth >= MAX_EXPANSION_DEPTH {
            return Err(ParseError::new(
                0,
                format!("macro expansion exceeded depth {}", MAX_EXPANSION_DEPTH),
            ));
        }
        match event {
            Event::Atom(_) => Ok(event),
            Event::Seq(elements) => {
                let elements: Vec<Event> = elements
                    .into_iter()
                    .map(|element| self.expand_event(element, depth))
                    .collect::<Result<_, _>>()?;
                let event = Event::Seq(elements);
                match event.head().and_then(|head| self.get(head)) {
                    Some(def) => {
                        let substituted = substitute(&def.body, def, event.tail())?;
                        self.expand_event(substituted, depth + 1)
                    }
                    None => Ok(event),
                }
            }
        }
    }
}

/// Positional parameter substitution: parameter atoms in the body are
/// replaced by the matching actual sub-event; trailing parameters with no
/// actual become `Nothing`.
fn substitute(body: &Event, def: &MacroDef, actuals: &[Event]) -> Result<Event, ParseError> {
    if actuals.len() > def.params.len() {
        return Err(ParseError::new(
            0,
            format!(
                "macro `{}` takes {} argument(s), got {}",
                def.name,
                def.params.len(),
                actuals.len()
            ),
        ));
    }
    Ok(replace_params(body, def, actuals))
}

fn replace_params(body: &Event, def: &MacroDef, actuals: &[Event]) -> Event {
    match body {
        Event::Atom(token) => match def.params.iter().position(|param| param == token) {
            Some(index) => actuals
                .get(index)
                .cloned()
                .unwrap_or_else(|| Event::atom("Nothing")),
            None => body.clone(),
        },
        Event::Seq(elements) => Event::Seq(
            elements
                .iter()
                .map(|element| replace_params(element, def, actuals))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn table(defs: &str) -> MacroTable {
        MacroTable::parse_defs(defs).unwrap()
    }

    #[test]
    fn parses_definitions_with_and_without_params() {
        let table = table("Fund(who, amount) = Send who amount\nBump() = MineBlock\nTick = MineBlock\n");
        assert_eq!(table.get("fund").unwrap().params, vec!["who", "amount"]);
        assert!(table.get("Bump").unwrap().params.is_empty());
        assert!(table.get("TICK").is_some());
    }

    #[test]
    fn expands_positional_parameters() {
        let table = table("Fund(who, amount) = Send who amount");
        let forest = parse("Fund Alice 100").unwrap();
        let expanded = table.expand(forest).unwrap();
        assert_eq!(expanded, parse("Send Alice 100").unwrap());
    }

    #[test]
    fn substitutes_whole_sub_events() {
        let table = table("Probe(cond) = Gate cond (Deploy Counter)");
        let forest = parse("Probe (Counter Address)").unwrap();
        let expanded = table.expand(forest).unwrap();
        assert_eq!(expanded, parse("Gate (Counter Address) (Deploy Counter)").unwrap());
    }

    #[test]
    fn missing_trailing_actuals_become_nothing() {
        let table = table("Fund(who, amount) = Send who amount");
        let expanded = table.expand(parse("Fund Alice").unwrap()).unwrap();
        assert_eq!(expanded, parse("Send Alice Nothing").unwrap());
    }

    #[test]
    fn too_many_actuals_fail() {
        let table = table("Bump() = MineBlock");
        assert!(table.expand(parse("Bump 5").unwrap()).is_err());
    }

    #[test]
    fn macros_may_call_other_macros() {
        let table = table("Tick = MineBlock\nDoubleTick = Tick\n");
        let expanded = table.expand(parse("DoubleTick").unwrap()).unwrap();
        assert_eq!(expanded, parse("MineBlock").unwrap());
    }

    #[test]
    fn self_recursion_hits_the_depth_cap() {
        let table = table("Loop = Loop");
        let err = table.expand(parse("Loop").unwrap()).unwrap_err();
        assert!(err.message.contains("depth"));
    }

    #[test]
    fn nested_calls_expand_depth_first() {
        let table = table("Addr = Counter Address");
        let expanded = table.expand(parse("Gate (Addr) (Deploy Counter)").unwrap()).unwrap();
        assert_eq!(expanded, parse("Gate (Counter Address) (Deploy Counter)").unwrap());
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        assert!(MacroTable::parse_defs("A = MineBlock\nA = MineBlock\n").is_err());
    }

    #[test]
    fn expand_named_rejects_unknown_macros() {
        let table = table("Tick = MineBlock");
        assert!(table.expand_named("Tock", &[]).is_err());
        assert!(table.expand_named("Tick", &[]).is_ok());
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let table = table("-- helpers\n\nTick = MineBlock\n");
        assert!(table.get("Tick").is_some());
    }
}
