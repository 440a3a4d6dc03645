use std::fmt;

/// One parsed DSL expression: either a leaf token or an ordered sequence of
/// sub-expressions. Events are pure data with no reference back to the
/// parser or the interpreter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Atom(String),
    Seq(Vec<Event>),
}

impl Event {
    pub fn atom(token: impl Into<String>) -> Self {
        Event::Atom(token.into())
    }

    pub fn seq(elements: Vec<Event>) -> Self {
        Event::Seq(elements)
    }

    /// An empty sequence, used as the placeholder for implicit arguments.
    pub fn empty() -> Self {
        Event::Seq(Vec::new())
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Event::Atom(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Event::Atom(_) => false,
            Event::Seq(elements) => elements.is_empty(),
        }
    }

    /// The leading token: the atom itself, or the first atom of a sequence.
    pub fn head(&self) -> Option<&str> {
        match self {
            Event::Atom(token) => Some(token),
            Event::Seq(elements) => match elements.first() {
                Some(Event::Atom(token)) => Some(token),
                _ => None,
            },
        }
    }

    /// The elements following the head of a sequence.
    pub fn tail(&self) -> &[Event] {
        match self {
            Event::Atom(_) => &[],
            Event::Seq(elements) => elements.get(1..).unwrap_or(&[]),
        }
    }

    pub fn elements(&self) -> &[Event] {
        match self {
            Event::Atom(_) => std::slice::from_ref(self),
            Event::Seq(elements) => elements,
        }
    }

    /// The atom's token, if this is a leaf.
    pub fn token(&self) -> Option<&str> {
        match self {
            Event::Atom(token) => Some(token),
            Event::Seq(_) => None,
        }
    }

    /// Render without the outer parentheses, the way a script line reads.
    pub fn to_line(&self) -> String {
        match self {
            Event::Atom(_) => self.to_string(),
            Event::Seq(elements) => elements
                .iter()
                .map(Event::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Atoms that would not survive a re-parse as a bare token get re-quoted.
fn needs_quoting(token: &str) -> bool {
    token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | '\''))
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Atom(token) => {
                if needs_quoting(token) {
                    write!(f, "\"")?;
                    for c in token.chars() {
                        if c == '"' || c == '\\' {
                            write!(f, "\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                    write!(f, "\"")
                } else {
                    write!(f, "{}", token)
                }
            }
            Event::Seq(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_of(tokens: &[&str]) -> Event {
        Event::Seq(tokens.iter().map(|t| Event::atom(*t)).collect())
    }

    #[test]
    fn head_of_atom_and_seq() {
        assert_eq!(Event::atom("MineBlock").head(), Some("MineBlock"));
        assert_eq!(seq_of(&["Alias", "Me", "0xabc"]).head(), Some("Alias"));
        assert_eq!(Event::Seq(vec![seq_of(&["A"])]).head(), None);
    }

    #[test]
    fn tail_skips_head() {
        let event = seq_of(&["Print", "hello"]);
        assert_eq!(event.tail(), &[Event::atom("hello")]);
        assert!(Event::atom("Print").tail().is_empty());
    }

    #[test]
    fn display_quotes_when_needed() {
        let event = Event::Seq(vec![Event::atom("Print"), Event::atom("hello world")]);
        assert_eq!(event.to_string(), "(Print \"hello world\")");
        assert_eq!(event.to_line(), "Print \"hello world\"");
    }

    #[test]
    fn display_nested() {
        let event = Event::Seq(vec![
            Event::atom("Gate"),
            Event::Seq(vec![Event::atom("Counter"), Event::atom("Address")]),
            Event::Seq(vec![Event::atom("Deploy"), Event::atom("Counter")]),
        ]);
        assert_eq!(event.to_line(), "Gate (Counter Address) (Deploy Counter)");
    }

    #[test]
    fn structural_equality_is_deep() {
        let a = Event::Seq(vec![Event::atom("A"), seq_of(&["B", "C"])]);
        let b = Event::Seq(vec![Event::atom("A"), seq_of(&["B", "C"])]);
        let c = Event::Seq(vec![Event::atom("A"), seq_of(&["B", "D"])]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
