//! Class id to name mapping.
//!
//! Ultralytics ONNX exports store names in the model metadata as a Python
//! dict literal, e.g. `{0: 'person', 1: "bicycle"}`. A plain text file with one
//! name per line is accepted as well.

use std::collections::BTreeMap;
use std::fs;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed class names at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNames {
    names: BTreeMap<u32, String>,
}

impl ClassNames {
    pub fn from_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(i, n)| (i as u32, n.into()))
                .collect(),
        }
    }

    /// One name per line; the line number is the class id.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelsError> {
        let content = fs::read_to_string(path)?;
        let mut lines: Vec<&str> = content.lines().map(str::trim).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Ok(Self::from_list(lines))
    }

    /// Parse the `names` metadata entry written by Ultralytics exports.
    pub fn parse_metadata(raw: &str) -> Result<Self, LabelsError> {
        DictParser::new(raw).parse()
    }

    /// Name for a class id, or the id itself when unknown.
    pub fn label(&self, class_id: u32) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

struct DictParser<'a> {
    chars: Peekable<Chars<'a>>,
    offset: usize,
}

impl<'a> DictParser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            chars: raw.chars().peekable(),
            offset: 0,
        }
    }

    fn parse(mut self) -> Result<ClassNames, LabelsError> {
        let mut names = BTreeMap::new();

        self.skip_whitespace();
        self.expect('{', "expected `{`")?;

        loop {
            self.skip_whitespace();
            if self.eat('}') {
                break;
            }

            let key = self.parse_key()?;
            self.skip_whitespace();
            self.expect(':', "expected `:` after key")?;
            self.skip_whitespace();
            let value = self.parse_string()?;
            names.insert(key, value);

            self.skip_whitespace();
            if self.eat(',') {
                continue;
            }
            self.expect('}', "expected `,` or `}`")?;
            break;
        }

        self.skip_whitespace();
        if self.chars.peek().is_some() {
            return Err(self.error("trailing characters"));
        }

        Ok(ClassNames { names })
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char, reason: &'static str) -> Result<(), LabelsError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(reason))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    fn parse_key(&mut self) -> Result<u32, LabelsError> {
        let mut digits = String::new();
        while let Some(c) = self.chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            self.bump();
        }
        digits
            .parse()
            .map_err(|_| self.error("expected an integer class id"))
    }

    fn parse_string(&mut self) -> Result<String, LabelsError> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a quoted name")),
        };

        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(c) => value.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn error(&self, reason: &'static str) -> LabelsError {
        LabelsError::Malformed {
            offset: self.offset,
            reason,
        }
    }
}
