//! Static/injected token set consulted during candidate preparation (spec
//! §4.5).

use libafl_bolts::rands::{Rand, StdRand};

const DEFAULT_TOKENS: &[&[u8]] = &[
    b"\x00\x00\x00\x00",
    b"\xff\xff\xff\xff",
    b"A=A",
    b"%s%s%s%s",
    b"../../../../etc/passwd",
    b"\x90\x90\x90\x90",
];

/// Owns a mutable ordered list of token byte sequences.
#[derive(Debug)]
pub struct Dictionary {
    tokens: Vec<Vec<u8>>,
    rand: StdRand,
}

impl Dictionary {
    pub fn new(seed: u64) -> Self {
        Self {
            tokens: DEFAULT_TOKENS.iter().map(|t| t.to_vec()).collect(),
            rand: StdRand::with_seed(seed),
        }
    }

    pub fn tokens(&self) -> &[Vec<u8>] {
        &self.tokens
    }

    pub fn add_token(&mut self, token: Vec<u8>) {
        self.tokens.push(token);
    }

    /// Up to `k` random tokens (with repeats, since the dictionary is small
    /// and a real fuzzer draws tokens with replacement across many mutations).
    pub fn get_random_tokens(&mut self, k: usize) -> Vec<Vec<u8>> {
        if self.tokens.is_empty() {
            return Vec::new();
        }
        (0..k)
            .map(|_| {
                let idx = self.rand.below_or_zero(self.tokens.len());
                self.tokens[idx].clone()
            })
            .collect()
    }

    /// Insert a single token at a bounded position in `input`. Returns a
    /// value identical to `input` when the dictionary is empty — callers
    /// treat that as "no injection performed" (spec §4.5).
    pub fn inject_tokens(&mut self, input: &[u8]) -> Vec<u8> {
        if self.tokens.is_empty() {
            return input.to_vec();
        }
        let token_idx = self.rand.below_or_zero(self.tokens.len());
        let token = &self.tokens[token_idx];

        let position = if input.is_empty() {
            0
        } else {
            self.rand.below_or_zero(input.len() + 1)
        };

        let mut result = Vec::with_capacity(input.len() + token.len());
        result.extend_from_slice(&input[..position]);
        result.extend_from_slice(token);
        result.extend_from_slice(&input[position..]);
        result
    }

    /// First `count` tokens, previewed as ASCII when possible or hex
    /// otherwise (spec §4.1 "dictionary preview").
    pub fn preview(&self, count: usize) -> Vec<String> {
        self.tokens
            .iter()
            .take(count)
            .map(|token| match std::str::from_utf8(token) {
                Ok(s) if s.is_ascii() => s.to_owned(),
                _ => token.iter().map(|b| format!("{b:02x}")).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_tokens_changes_input_when_dictionary_nonempty() {
        let mut dict = Dictionary::new(1);
        let injected = dict.inject_tokens(b"hello");
        assert_ne!(injected, b"hello".to_vec());
        assert!(injected.len() > 5);
    }

    #[test]
    fn preview_falls_back_to_hex_for_non_ascii_tokens() {
        let dict = Dictionary::new(1);
        let preview = dict.preview(8);
        assert!(preview.iter().any(|p| p == "A=A"));
        assert!(preview.iter().any(|p| p.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn add_token_extends_dictionary() {
        let mut dict = Dictionary::new(2);
        let before = dict.tokens().len();
        dict.add_token(b"custom".to_vec());
        assert_eq!(dict.tokens().len(), before + 1);
    }
}
