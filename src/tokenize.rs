//! Streaming document tokenizer.
//!
//! One tokenizer is created per ingest context from the document's
//! language and the spec's stop words, then driven field by field. Token
//! positions are 1-based and global across the document: `next` keeps
//! counting where the previous field stopped, so concatenating per-field
//! position ranges preserves document order.

use std::sync::Arc;

use enumflags2::{BitFlags, bitflags};
use rust_stemmers::{Algorithm, Stemmer};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Stemmer languages carried on documents and specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    French,
    German,
    Italian,
    Portuguese,
    Russian,
    Spanish,
    Swedish,
}

impl Language {
    fn to_algorithm(self) -> Algorithm {
        match self {
            Language::English => Algorithm::English,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Italian => Algorithm::Italian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Russian => Algorithm::Russian,
            Language::Spanish => Algorithm::Spanish,
            Language::Swedish => Algorithm::Swedish,
        }
    }

    fn to_stop_words_language(self) -> stop_words::LANGUAGE {
        match self {
            Language::English => stop_words::LANGUAGE::English,
            Language::French => stop_words::LANGUAGE::French,
            Language::German => stop_words::LANGUAGE::German,
            Language::Italian => stop_words::LANGUAGE::Italian,
            Language::Portuguese => stop_words::LANGUAGE::Portuguese,
            Language::Russian => stop_words::LANGUAGE::Russian,
            Language::Spanish => stop_words::LANGUAGE::Spanish,
            Language::Swedish => stop_words::LANGUAGE::Swedish,
        }
    }

    /// Stop-word list for the language.
    pub fn stop_words(self) -> FxHashSet<String> {
        stop_words::get(self.to_stop_words_language())
            .into_iter()
            .collect()
    }
}

/// Parse a language code or name; unknown values fall back to English.
pub fn parse_language(s: &str) -> Language {
    match s.to_lowercase().as_str() {
        "fr" | "french" => Language::French,
        "de" | "german" => Language::German,
        "it" | "italian" => Language::Italian,
        "pt" | "portuguese" => Language::Portuguese,
        "ru" | "russian" => Language::Russian,
        "es" | "spanish" => Language::Spanish,
        "sv" | "swedish" => Language::Swedish,
        _ => Language::English,
    }
}

/// Per-field tokenization modifiers, taken from the field's options.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFlag {
    NoStem = 0b01,
    Phonetics = 0b10,
}

pub type TokenFlags = BitFlags<TokenFlag>;

/// A token emitted by the stream. `term` is already case-folded and,
/// unless the field is NOSTEM, stemmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Token {
    pub term: String,
    /// Byte offset of the raw word inside its field text.
    pub byte_offset: u32,
}

/// Strip non-alphanumeric characters and lowercase. ASCII fast path
/// iterates bytes; non-ASCII words take the full `char` route.
fn clean_word(word: &str) -> String {
    if word.is_ascii() {
        let mut out = String::with_capacity(word.len());
        for &b in word.as_bytes() {
            if b.is_ascii_alphanumeric() {
                out.push(b.to_ascii_lowercase() as char);
            }
        }
        out
    } else {
        word.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect()
    }
}

/// Streaming tokenizer reused for every text field of one document.
pub struct DocumentTokenizer {
    stemmer: Stemmer,
    stop_words: Arc<FxHashSet<String>>,
    /// Global position of the last emitted token (1-based; 0 before any).
    pub last_offset: u32,
}

impl DocumentTokenizer {
    pub fn new(language: Language, stop_words: Arc<FxHashSet<String>>) -> Self {
        Self {
            stemmer: Stemmer::create(language.to_algorithm()),
            stop_words,
            last_offset: 0,
        }
    }

    /// Begin streaming one field's text. Position numbering continues
    /// from wherever the previous field ended.
    pub fn start<'a>(&'a mut self, text: &'a str, options: TokenFlags) -> TokenStream<'a> {
        TokenStream {
            tokenizer: self,
            text,
            cursor: 0,
            options,
        }
    }

    /// Reset global position state for a fresh document.
    pub fn reset(&mut self) {
        self.last_offset = 0;
    }
}

/// Borrowing iterator over one field's tokens.
pub struct TokenStream<'a> {
    tokenizer: &'a mut DocumentTokenizer,
    text: &'a str,
    cursor: usize,
    options: TokenFlags,
}

impl TokenStream<'_> {
    /// Fill `tok` with the next token and return its global position.
    /// A return of 0 means end of stream. Stop words consume a position
    /// but are not emitted.
    pub fn next(&mut self, tok: &mut Token) -> u32 {
        let bytes = self.text.as_bytes();
        loop {
            // skip separators
            while self.cursor < bytes.len() && !is_word_byte(bytes[self.cursor]) {
                self.cursor += word_byte_len(bytes[self.cursor]);
            }
            if self.cursor >= bytes.len() {
                return 0;
            }
            let start = self.cursor;
            while self.cursor < bytes.len() && is_word_byte(bytes[self.cursor]) {
                self.cursor += word_byte_len(bytes[self.cursor]);
            }
            let word = &self.text[start..self.cursor];
            let cleaned = clean_word(word);
            if cleaned.is_empty() {
                continue;
            }
            if self.tokenizer.stop_words.contains(&cleaned) {
                self.tokenizer.last_offset += 1;
                continue;
            }
            self.tokenizer.last_offset += 1;
            tok.term = if self.options.contains(TokenFlag::NoStem) {
                cleaned
            } else {
                self.tokenizer.stemmer.stem(&cleaned).into_owned()
            };
            tok.byte_offset = start as u32;
            return self.tokenizer.last_offset;
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b >= 0x80
}

fn word_byte_len(b: u8) -> usize {
    match b {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xff => 4,
        // continuation byte reached standalone; step over it
        _ => 1,
    }
}

/// Phonetic fold of a term (Soundex-style). Fields with the PHONETICS
/// option index this alongside the literal term so near-spellings match.
pub fn phonetic_fold(term: &str) -> String {
    let mut chars = term.chars().filter(|c| c.is_ascii_alphabetic());
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut last_digit = soundex_digit(first);
    for c in chars {
        let digit = soundex_digit(c);
        if digit != 0 && digit != last_digit {
            code.push((b'0' + digit) as char);
            if code.len() == 4 {
                break;
            }
        }
        last_digit = digit;
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn soundex_digit(c: char) -> u8 {
    match c.to_ascii_lowercase() {
        'b' | 'f' | 'p' | 'v' => 1,
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
        'd' | 't' => 3,
        'l' => 4,
        'm' | 'n' => 5,
        'r' => 6,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(language: Language) -> DocumentTokenizer {
        DocumentTokenizer::new(language, Arc::new(language.stop_words()))
    }

    fn drain(stream: &mut TokenStream<'_>) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        let mut tok = Token::default();
        loop {
            let pos = stream.next(&mut tok);
            if pos == 0 {
                break;
            }
            out.push((tok.term.clone(), pos));
        }
        out
    }

    #[test]
    fn test_positions_are_one_based_and_global() {
        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("hello world", TokenFlag::NoStem.into());
        let toks = drain(&mut stream);
        assert_eq!(toks, vec![("hello".into(), 1), ("world".into(), 2)]);

        // second field continues the numbering
        let mut stream = tk.start("goodbye", TokenFlag::NoStem.into());
        let toks = drain(&mut stream);
        assert_eq!(toks, vec![("goodbye".into(), 3)]);
        assert_eq!(tk.last_offset, 3);
    }

    #[test]
    fn test_stemming_default_nostem_opt_out() {
        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("running dogs", BitFlags::empty());
        let toks = drain(&mut stream);
        assert_eq!(toks[0].0, "run");
        assert_eq!(toks[1].0, "dog");

        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("running dogs", TokenFlag::NoStem.into());
        let toks = drain(&mut stream);
        assert_eq!(toks[0].0, "running");
    }

    #[test]
    fn test_stop_words_consume_positions() {
        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("the quick fox", TokenFlag::NoStem.into());
        let toks = drain(&mut stream);
        // "the" takes position 1 but is not emitted
        assert_eq!(toks, vec![("quick".into(), 2), ("fox".into(), 3)]);
    }

    #[test]
    fn test_punctuation_and_case_folding() {
        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("Hello, World!", TokenFlag::NoStem.into());
        let toks = drain(&mut stream);
        assert_eq!(toks[0].0, "hello");
        assert_eq!(toks[1].0, "world");
    }

    #[test]
    fn test_byte_offsets_point_at_raw_words() {
        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("abc  def", TokenFlag::NoStem.into());
        let mut tok = Token::default();
        assert_eq!(stream.next(&mut tok), 1);
        assert_eq!(tok.byte_offset, 0);
        assert_eq!(stream.next(&mut tok), 2);
        assert_eq!(tok.byte_offset, 5);
    }

    #[test]
    fn test_empty_text() {
        let mut tk = tokenizer(Language::English);
        let mut stream = tk.start("", BitFlags::empty());
        let mut tok = Token::default();
        assert_eq!(stream.next(&mut tok), 0);
    }

    #[test]
    fn test_phonetic_fold() {
        assert_eq!(phonetic_fold("robert"), "R163");
        assert_eq!(phonetic_fold("rupert"), "R163");
        assert_eq!(phonetic_fold("ashcraft"), phonetic_fold("ashcroft"));
        assert_eq!(phonetic_fold(""), "");
    }
}
