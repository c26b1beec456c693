//! SVG path data parsing and minification.
//!
//! SVG path syntax: https://www.w3.org/TR/SVG/paths.html

use crate::error::SvagError;
use crate::number::format_number;

/// One path command with its arguments, as written (`'M'`, `'c'`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub command: char,
    pub args: Vec<f64>,
}

impl Segment {
    pub fn is_relative(&self) -> bool {
        self.command.is_ascii_lowercase()
    }
}

/// Number of arguments a command consumes.
fn arity(command: char) -> Option<usize> {
    match command.to_ascii_lowercase() {
        'm' | 'l' | 't' => Some(2),
        'h' | 'v' => Some(1),
        's' | 'q' => Some(4),
        'c' => Some(6),
        'a' => Some(7),
        'z' => Some(0),
        _ => None,
    }
}

/// Parse SVG path data.
pub fn parse_path(d: &str) -> Result<Vec<Segment>, SvagError> {
    let mut lexer = Lexer { input: d.as_bytes(), pos: 0 };
    let mut segments = Vec::new();
    let mut current: Option<char> = None;

    loop {
        lexer.skip_separators();
        let Some(next) = lexer.peek() else { break };

        let command = if next.is_ascii_alphabetic() {
            lexer.pos += 1;
            char::from(next)
        } else {
            // Implicit repetition; a moveto repeats as lineto.
            match current {
                Some('M') => 'L',
                Some('m') => 'l',
                Some('z' | 'Z') | None => {
                    return Err(SvagError::InvalidPath("Expected command letter".into()));
                }
                Some(c) => c,
            }
        };

        let count = arity(command)
            .ok_or_else(|| SvagError::InvalidPath(format!("Unknown command: {command}")))?;

        let mut args = Vec::with_capacity(count);
        for i in 0..count {
            lexer.skip_separators();
            // Arc flags are single characters and may be packed ("a1 1 0 1150 50").
            let is_flag = command.eq_ignore_ascii_case(&'a') && (i == 3 || i == 4);
            args.push(if is_flag { lexer.flag()? } else { lexer.number()? });
        }

        segments.push(Segment { command, args });
        current = Some(command);
    }

    Ok(segments)
}

/// Serialize path data with the given precision, dropping every character
/// the grammar lets us drop.
pub fn serialize_path(segments: &[Segment], precision: u8) -> String {
    let mut out = String::new();
    let mut prev: Option<char> = None;

    for segment in segments {
        let implicit = match (prev, segment.command) {
            (_, 'z' | 'Z') => false,
            (Some('M'), 'L') | (Some('m'), 'l') => true,
            // A repeated moveto would read back as a lineto.
            (Some(p), c) => p == c && !c.eq_ignore_ascii_case(&'m'),
            (None, _) => false,
        };

        if !implicit {
            out.push(segment.command);
        }

        let is_arc = segment.command.eq_ignore_ascii_case(&'a');
        for (i, arg) in segment.args.iter().enumerate() {
            let token = if is_arc && (i == 3 || i == 4) {
                if *arg != 0.0 { "1".to_string() } else { "0".to_string() }
            } else {
                format_number(*arg, precision)
            };
            push_token(&mut out, &token);
        }

        prev = Some(segment.command);
    }

    out
}

/// Append a number, inserting a space only where the tokens would merge.
fn push_token(out: &mut String, token: &str) {
    let Some(first) = token.chars().next() else {
        return;
    };
    if let Some(last) = out.chars().last() {
        // Digits and dots of the number written last.
        let tail_start = out
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map_or(0, |i| i + 1);
        let needs_space = match first {
            '.' => last.is_ascii_digit() && !out[tail_start..].contains('.'),
            c if c.is_ascii_digit() => last.is_ascii_digit() || last == '.',
            _ => false,
        };
        if needs_space {
            out.push(' ');
        }
    }
    out.push_str(token);
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_separators(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_whitespace() || c == b',')
        {
            self.pos += 1;
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<f64, SvagError> {
        let start = self.pos;

        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut digits = self.digits();
        if self.peek() == Some(b'.') {
            self.pos += 1;
            digits += self.digits();
        }
        if digits == 0 {
            return Err(SvagError::InvalidPath(format!(
                "Expected number at offset {start}"
            )));
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'-' | b'+')) {
                self.pos += 1;
            }
            self.digits();
        }

        let text = std::str::from_utf8(&self.input[start..self.pos])?;
        text.parse()
            .map_err(|_| SvagError::InvalidPath(format!("Invalid number: {text}")))
    }

    fn flag(&mut self) -> Result<f64, SvagError> {
        match self.peek() {
            Some(b'0') => {
                self.pos += 1;
                Ok(0.0)
            }
            Some(b'1') => {
                self.pos += 1;
                Ok(1.0)
            }
            Some(c) => Err(SvagError::InvalidPath(format!(
                "Expected flag (0 or 1), got: {}",
                char::from(c)
            ))),
            None => Err(SvagError::InvalidPath("Expected flag".into())),
        }
    }
}
