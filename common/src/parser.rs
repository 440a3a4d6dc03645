//! Line-oriented parser for scenario scripts.
//!
//! One top-level event per line; a parenthesized group opened at the top
//! level may span lines and is itself the event. `--` starts a comment that
//! runs to the end of the line.

use crate::error::ParseError;
use crate::event::Event;

/// Parse scenario text into a forest of fully-resolved events.
pub fn parse(text: &str) -> Result<Vec<Event>, ParseError> {
    Scanner::new(text).parse_forest()
}

/// Parse a single script line (the repl entry point). Returns `None` for a
/// blank or comment-only line.
pub fn parse_line(line: &str) -> Result<Option<Event>, ParseError> {
    let mut events = parse(line)?;
    match events.len() {
        0 => Ok(None),
        1 => Ok(events.pop()),
        _ => Err(ParseError::new(0, "expected a single event per line")),
    }
}

struct Scanner<'a> {
    chars: Vec<(usize, char)>,
    end: usize,
    pos: usize,
    text: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().collect(),
            end: text.len(),
            pos: 0,
            text,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.end, |&(offset, _)| offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn at_comment(&self) -> bool {
        self.peek() == Some('-') && self.peek_at(1) == Some('-')
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn parse_forest(&mut self) -> Result<Vec<Event>, ParseError> {
        let mut events = Vec::new();
        let mut current: Vec<Event> = Vec::new();

        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.bump();
                    flush(&mut events, &mut current);
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '-' if self.at_comment() => self.skip_comment(),
                '(' => {
                    let group = self.parse_group('(', ')', None)?;
                    current.push(group);
                }
                '[' => {
                    let group = self.parse_group('[', ']', Some("List"))?;
                    current.push(group);
                }
                ')' | ']' => {
                    return Err(ParseError::new(self.offset(), format!("unexpected `{}`", c)));
                }
                '"' | '\'' => {
                    let token = self.parse_quoted()?;
                    current.push(Event::Atom(token));
                }
                _ => {
                    let token = self.parse_bare();
                    current.push(Event::Atom(token));
                }
            }
        }
        flush(&mut events, &mut current);
        Ok(events)
    }

    /// Parse a delimited group; unlike the top level it may span newlines.
    fn parse_group(
        &mut self,
        open: char,
        close: char,
        head: Option<&str>,
    ) -> Result<Event, ParseError> {
        let open_offset = self.offset();
        self.bump();

        let mut elements: Vec<Event> = head.map(Event::atom).into_iter().collect();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        open_offset,
                        format!("unterminated `{}` group", open),
                    ));
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(Event::Seq(elements));
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.at_comment() => self.skip_comment(),
                Some('(') => elements.push(self.parse_group('(', ')', None)?),
                Some('[') => elements.push(self.parse_group('[', ']', Some("List"))?),
                Some(c @ (')' | ']')) => {
                    return Err(ParseError::new(self.offset(), format!("unexpected `{}`", c)));
                }
                Some('"') | Some('\'') => {
                    let token = self.parse_quoted()?;
                    elements.push(Event::Atom(token));
                }
                Some(_) => {
                    let token = self.parse_bare();
                    elements.push(Event::Atom(token));
                }
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let open_offset = self.offset();
        let quote = self.bump().expect("caller checked the quote");
        let mut token = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError::new(open_offset, "unterminated string literal"));
                }
                Some('\n') => {
                    return Err(ParseError::new(open_offset, "string literal spans a newline"));
                }
                Some('\\') => match self.bump() {
                    Some(escaped) => token.push(escaped),
                    None => {
                        return Err(ParseError::new(open_offset, "unterminated string literal"));
                    }
                },
                Some(c) if c == quote => return Ok(token),
                Some(c) => token.push(c),
            }
        }
    }

    fn parse_bare(&mut self) -> String {
        let start = self.offset();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | '\'') {
                break;
            }
            self.bump();
        }
        self.text[start..self.offset()].to_owned()
    }
}

/// A line of bare tokens forms one event; a line holding exactly one
/// parenthesized group *is* that event.
fn flush(events: &mut Vec<Event>, current: &mut Vec<Event>) {
    if current.is_empty() {
        return;
    }
    let elements = std::mem::take(current);
    if elements.len() == 1 && !elements[0].is_atom() {
        events.push(elements.into_iter().next().expect("len checked"));
    } else {
        events.push(Event::Seq(elements));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms(tokens: &[&str]) -> Event {
        Event::Seq(tokens.iter().map(|t| Event::atom(*t)).collect())
    }

    #[test]
    fn empty_input_parses_to_nothing() {
        assert_eq!(parse("").unwrap(), vec![]);
        assert_eq!(parse("\n\n  \n").unwrap(), vec![]);
    }

    #[test]
    fn one_event_per_line() {
        let events = parse("MineBlock\nAlias Me 0xabc\n").unwrap();
        assert_eq!(events, vec![atoms(&["MineBlock"]), atoms(&["Alias", "Me", "0xabc"])]);
    }

    #[test]
    fn nested_groups() {
        let events = parse("Gate (Counter Address) (Deploy Counter)").unwrap();
        assert_eq!(
            events,
            vec![Event::Seq(vec![
                Event::atom("Gate"),
                atoms(&["Counter", "Address"]),
                atoms(&["Deploy", "Counter"]),
            ])]
        );
    }

    #[test]
    fn top_level_group_is_the_event() {
        let events = parse("(Alias Me 0xabc)").unwrap();
        assert_eq!(events, vec![atoms(&["Alias", "Me", "0xabc"])]);
    }

    #[test]
    fn top_level_group_may_span_lines() {
        let events = parse("(Alias\n    Me\n    0xabc)").unwrap();
        assert_eq!(events, vec![atoms(&["Alias", "Me", "0xabc"])]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let events = parse("-- setup\nMineBlock -- bump the height\n").unwrap();
        assert_eq!(events, vec![atoms(&["MineBlock"])]);
    }

    #[test]
    fn quoted_strings_keep_spaces_and_escapes() {
        let events = parse(r#"Print "hello \"there\" world""#).unwrap();
        assert_eq!(
            events,
            vec![Event::Seq(vec![
                Event::atom("Print"),
                Event::atom("hello \"there\" world"),
            ])]
        );
    }

    #[test]
    fn bracket_literals_become_list_events() {
        let events = parse("Read [1 2 3]").unwrap();
        assert_eq!(
            events,
            vec![Event::Seq(vec![
                Event::atom("Read"),
                atoms(&["List", "1", "2", "3"]),
            ])]
        );
    }

    #[test]
    fn unterminated_group_reports_opening_offset() {
        let err = parse("Foo (Bar").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn unexpected_close_reports_its_offset() {
        let err = parse("Foo )").unwrap_err();
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn unterminated_string_reports_opening_offset() {
        let err = parse("Print \"oops").unwrap_err();
        assert_eq!(err.offset, 6);
    }

    #[test]
    fn parse_line_rejects_multiple_events() {
        assert!(parse_line("A\nB").is_err());
        assert_eq!(parse_line("-- nothing here").unwrap(), None);
    }

    mod round_trip {
        use super::*;
        use proptest::prelude::*;

        fn arb_leaf() -> impl Strategy<Value = Event> {
            prop_oneof![
                "[A-Za-z][A-Za-z0-9_]{0,8}".prop_map(Event::Atom),
                "[a-z ]{1,12}".prop_map(Event::Atom),
                (-1000i64..1000).prop_map(|n| Event::Atom(n.to_string())),
            ]
        }

        fn arb_element() -> impl Strategy<Value = Event> {
            arb_leaf().prop_recursive(3, 24, 4, |inner| {
                prop::collection::vec(inner, 1..4).prop_map(Event::Seq)
            })
        }

        /// The parser only ever emits `Seq` events at the top level, and a
        /// single-group line unwraps to the group itself.
        fn arb_top_event() -> impl Strategy<Value = Event> {
            prop_oneof![
                arb_leaf().prop_map(|leaf| Event::Seq(vec![leaf])),
                prop::collection::vec(arb_element(), 2..5).prop_map(Event::Seq),
            ]
        }

        proptest! {
            #[test]
            fn formatted_events_reparse_equal(event in arb_top_event()) {
                let text = event.to_line();
                let reparsed = parse(&text).unwrap();
                prop_assert_eq!(reparsed, vec![event]);
            }
        }
    }
}
