//! Input history: a bounded sequence of past input strings, newest first.
//! There is one per buffer plus a process-global one. Re-adding the most
//! recent entry is coalesced (case-insensitive); NickServ passwords are
//! masked before storage.

use std::collections::VecDeque;

pub struct History {
    /// Newest first.
    entries: VecDeque<String>,
    max: usize,
}

impl History {
    pub fn new(max: usize) -> History {
        History {
            entries: VecDeque::new(),
            max,
        }
    }

    pub fn add(&mut self, text: &str) {
        if text.is_empty() || self.max == 0 {
            return;
        }
        let text = mask_secrets(text);
        if let Some(last) = self.entries.front() {
            if last.eq_ignore_ascii_case(&text) {
                return;
            }
        }
        self.entries.push_front(text);
        while self.entries.len() > self.max {
            self.entries.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry `n` back from the most recent (0 = most recent).
    pub fn get(&self, n: usize) -> Option<&str> {
        self.entries.get(n).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Replace the secret in `... nickserv (identify|register) <secret>` with
/// asterisks so passwords never sit in history.
pub fn mask_secrets(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let Some(nickserv_idx) = lower.find("nickserv ") else {
        return text.to_owned();
    };
    let after = &lower[nickserv_idx..];
    let keyword_off = after.find("identify ").or_else(|| after.find("register "));
    let Some(off) = keyword_off else {
        return text.to_owned();
    };
    // Both keywords are 9 bytes including the trailing space.
    let secret_start = nickserv_idx + off + 9;
    let mut masked = text[..secret_start].to_owned();
    masked.extend(text[secret_start..].chars().map(|c| if c == ' ' { ' ' } else { '*' }));
    masked
}
