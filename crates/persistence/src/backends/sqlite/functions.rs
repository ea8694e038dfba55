//! Scalar functions registered on every pooled connection.
//!
//! `CONTAINS(words, phrase)` gives SQLite the word-prefix semantics of a
//! full-text CONTAINS predicate. `phrase` is a double-quoted phrase whose
//! words must appear in order, adjacent, in `words`. A trailing `*` turns
//! every word of the phrase into a prefix match.

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

/// Registers the custom scalar functions.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "CONTAINS",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let words: Option<String> = ctx.get(0)?;
            let phrase: Option<String> = ctx.get(1)?;
            Ok(match (words, phrase) {
                (Some(words), Some(phrase)) => contains_phrase(&words, &phrase),
                _ => false,
            })
        },
    )
}

/// Splits a person name into lowercase words, treating component (`^`) and
/// group (`=`) separators as whitespace.
pub fn person_name_words(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '^' || c == '=')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Evaluates a CONTAINS phrase against a word list.
pub fn contains_phrase(words: &str, phrase: &str) -> bool {
    let phrase = phrase.trim().trim_matches('"');
    let (phrase, prefix) = match phrase.strip_suffix('*') {
        Some(rest) => (rest, true),
        None => (phrase, false),
    };

    let terms: Vec<String> = phrase.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return false;
    }
    let words: Vec<String> = person_name_words(words)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    words.windows(terms.len()).any(|window| {
        window.iter().zip(&terms).all(|(word, term)| {
            if prefix {
                word.starts_with(term.as_str())
            } else {
                word == term
            }
        })
    })
}
