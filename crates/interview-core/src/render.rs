//! Splits assistant text into render tokens: citation badges, bold runs and
//! plain text.
//!
//! Citations are matched first. The bold pass only ever sees the text between
//! citations, so a `**` pair never spans a citation badge. Both patterns
//! exclude their closing delimiter from the captured group, and the `regex`
//! crate matches in linear time, so malformed markup simply falls through as
//! plain text.

use regex::Regex;
use std::sync::OnceLock;

use crate::state::{ChatMessage, ChatRole};

/// `[Source: <name>]` where the name runs up to the first `]`
static CITATION_REGEX: OnceLock<Regex> = OnceLock::new();

/// `**<text>**` where the text contains no `*`
static BOLD_REGEX: OnceLock<Regex> = OnceLock::new();

fn citation_regex() -> &'static Regex {
    CITATION_REGEX.get_or_init(|| {
        Regex::new(r"\[Source: ([^\]]+)\]").expect("Failed to compile citation regex")
    })
}

fn bold_regex() -> &'static Regex {
    BOLD_REGEX.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").expect("Failed to compile bold regex"))
}

/// A classified fragment of message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderToken<'t> {
    /// Source name with the `[Source: ` prefix and `]` stripped
    Citation(&'t str),
    /// Emphasized text with the `**` markers stripped
    Bold(&'t str),
    /// Literal text; may be empty
    Plain(&'t str),
}

impl<'t> RenderToken<'t> {
    /// The visible text of the token, without markup.
    pub fn text(&self) -> &'t str {
        match self {
            RenderToken::Citation(s) | RenderToken::Bold(s) | RenderToken::Plain(s) => s,
        }
    }

    pub fn is_citation(&self) -> bool {
        matches!(self, RenderToken::Citation(_))
    }
}

/// Segment `text` into render tokens, left to right.
///
/// Empty plain spans left over by splitting are kept so that token positions
/// stay stable between renders. The returned iterator is lazy and can be
/// cloned to restart from any point.
pub fn segment(text: &str) -> Segments<'_> {
    Segments {
        citations: MarkerSplit::new(Some(citation_regex()), text),
        bold: None,
        markup: true,
    }
}

/// Segment a chat message. Only assistant turns carry citations and
/// emphasis; user turns come back as a single plain token.
pub fn segment_message(message: &ChatMessage) -> Segments<'_> {
    match message.role {
        ChatRole::Assistant => segment(&message.content),
        ChatRole::User => Segments {
            citations: MarkerSplit::new(None, &message.content),
            bold: None,
            markup: false,
        },
    }
}

/// Collect the visible text of `text`, with citation and bold markup removed.
pub fn plain_text(text: &str) -> String {
    segment(text).map(|token| token.text()).collect()
}

/// Lazy token stream returned by [`segment`].
#[derive(Debug, Clone)]
pub struct Segments<'t> {
    citations: MarkerSplit<'t>,
    bold: Option<MarkerSplit<'t>>,
    markup: bool,
}

impl<'t> Iterator for Segments<'t> {
    type Item = RenderToken<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(bold) = self.bold.as_mut() {
                match bold.next() {
                    Some(Piece::Between(text)) => return Some(RenderToken::Plain(text)),
                    Some(Piece::Marker(text)) => return Some(RenderToken::Bold(text)),
                    None => self.bold = None,
                }
            }

            match self.citations.next()? {
                Piece::Between(text) => {
                    let regex = self.markup.then(bold_regex);
                    self.bold = Some(MarkerSplit::new(regex, text));
                }
                Piece::Marker(name) => return Some(RenderToken::Citation(name)),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Piece<'t> {
    Between(&'t str),
    Marker(&'t str),
}

/// Split on a delimiter pattern, keeping the delimiters' first capture group.
///
/// Mirrors a capturing `split`: always yields one more `Between` than
/// `Marker`, including empty leading and trailing spans. Without a pattern
/// the whole text is a single `Between`.
#[derive(Debug, Clone)]
struct MarkerSplit<'t> {
    regex: Option<&'static Regex>,
    text: &'t str,
    cursor: usize,
    marker: Option<&'t str>,
    finished: bool,
}

impl<'t> MarkerSplit<'t> {
    fn new(regex: Option<&'static Regex>, text: &'t str) -> Self {
        Self {
            regex,
            text,
            cursor: 0,
            marker: None,
            finished: false,
        }
    }
}

impl<'t> Iterator for MarkerSplit<'t> {
    type Item = Piece<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(marker) = self.marker.take() {
            return Some(Piece::Marker(marker));
        }
        if self.finished {
            return None;
        }

        let found = self
            .regex
            .and_then(|regex| regex.captures_at(self.text, self.cursor));

        match found {
            Some(caps) => {
                let whole = caps.get(0)?;
                let between = &self.text[self.cursor..whole.start()];
                self.marker = Some(caps.get(1).map_or("", |m| m.as_str()));
                self.cursor = whole.end();
                Some(Piece::Between(between))
            }
            None => {
                self.finished = true;
                Some(Piece::Between(&self.text[self.cursor..]))
            }
        }
    }
}
