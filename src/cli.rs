//! CLI utilities for respite.
//!
//! The utilities present in this module are used by the interactive client
//! to read command lines and turn them into request arguments.
use std::io::{self, BufRead, Write};

use crate::{Error, Value};

/// Possible inputs from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// `.exit`, `exit`, `quit` or end of input
    Exit,
    /// A blank line
    Empty,
    /// Words of a command as raw bytes, quotes and escapes resolved
    Command(Vec<Vec<u8>>),
}

/// Prompt the user for a command line.
///
/// Returns `Err` with a readable message if the line cannot be split into
/// words; I/O failures are reported the same way.
pub fn prompt<R, W>(mut reader: R, mut writer: W, banner: &str) -> Result<Input, String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "{banner}> ")
        .and_then(|_| writer.flush())
        .map_err(|e| format!("failed to write prompt: {e}"))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| format!("failed to read input: {e}"))?;
    if read == 0 {
        return Ok(Input::Exit);
    }

    match s.trim() {
        ".exit" | "exit" | "quit" => Ok(Input::Exit),
        "" => Ok(Input::Empty),
        line => split_words(line).map(Input::Command),
    }
}

/// Splits a line into words the way `redis-cli` does.
///
/// Double quoted words understand `\n`, `\r`, `\t`, `\b`, `\a`, `\\`, `\"`
/// and `\xHH`, the latter producing the raw byte `HH`; single quoted words
/// only `\'`. A closing quote must be followed by whitespace or the end of
/// the line.
pub fn split_words(line: &str) -> Result<Vec<Vec<u8>>, String> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            return Ok(words);
        };

        let mut word = Vec::new();
        match first {
            '"' | '\'' => {
                chars.next();
                loop {
                    match chars.next() {
                        None => return Err("unbalanced quotes".to_string()),
                        Some(c) if c == first => break,
                        Some('\\') if first == '"' => unescape(&mut chars, &mut word)?,
                        Some('\\') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            word.push(b'\'');
                        }
                        Some(c) => push_char(&mut word, c),
                    }
                }
                if chars.peek().is_some_and(|c| !c.is_whitespace()) {
                    return Err("closing quote must be followed by a space".to_string());
                }
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    push_char(&mut word, c);
                }
            }
        }
        words.push(word);
    }
}

fn push_char(word: &mut Vec<u8>, c: char) {
    word.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
}

fn unescape(chars: &mut impl Iterator<Item = char>, word: &mut Vec<u8>) -> Result<(), String> {
    match chars.next() {
        Some('n') => word.push(b'\n'),
        Some('r') => word.push(b'\r'),
        Some('t') => word.push(b'\t'),
        Some('b') => word.push(0x08),
        Some('a') => word.push(0x07),
        Some('x') => {
            let hex = chars.by_ref().take(2).collect::<String>();
            let byte = Some(&hex)
                .filter(|hex| hex.len() == 2 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| format!("invalid escape '\\x{hex}'"))?;
            word.push(byte);
        }
        Some(c) => push_char(word, c),
        None => return Err("unbalanced quotes".to_string()),
    }
    Ok(())
}

/// Writes a reply or a recoverable error the way `redis-cli` shows them.
pub fn print_reply<W: Write>(mut writer: W, reply: &Result<Value, Error>) -> io::Result<()> {
    match reply {
        Ok(value) => writeln!(writer, "{value}"),
        Err(Error::Remote(message)) => writeln!(writer, "(error) {message}"),
        Err(e) => writeln!(writer, "(client error) {e}"),
    }
}
