//! IRC formatting characters (<https://modern.ircdocs.horse/formatting.html>):
//! parsing into events, stripping, and translation to ANSI SGR sequences for
//! terminals and API clients that ask for `colors = ansi`.

const CHAR_BOLD: char = '\x02';
const CHAR_ITALIC: char = '\x1D';
const CHAR_UNDERLINE: char = '\x1F';
const CHAR_STRIKETHROUGH: char = '\x1E';
const CHAR_MONOSPACE: char = '\x11';
const CHAR_COLOR: char = '\x03';
const CHAR_HEX_COLOR: char = '\x04';
const CHAR_REVERSE_COLOR: char = '\x16';
const CHAR_RESET: char = '\x0F';

#[derive(Debug, PartialEq, Eq)]
pub enum IrcFormatEvent<'a> {
    Text(&'a str),

    Bold,
    Italic,
    Underline,
    Strikethrough,
    Monospace,

    Color { fg: u8, bg: Option<u8> },

    /// Swap current foreground and background.
    ReverseColor,

    /// Back to default formatting.
    Reset,
}

struct FormatEventParser<'a> {
    str: &'a str,
    cursor: usize,
}

impl<'a> FormatEventParser<'a> {
    fn new(str: &'a str) -> Self {
        Self { str, cursor: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.str[self.cursor..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let next = self.peek();
        if let Some(c) = next {
            self.cursor += c.len_utf8();
        }
        next
    }

    fn bump(&mut self, amt: usize) {
        self.cursor += amt;
    }

    fn parse_text(&mut self) -> &'a str {
        let start = self.cursor;
        while let Some(next) = self.next_char() {
            if is_format_char(next) || next.is_ascii_control() {
                self.cursor -= 1;
                return &self.str[start..self.cursor];
            }
        }
        &self.str[start..]
    }

    /// At least one, at most two digits. Cursor untouched on `None`.
    fn parse_color_code(&mut self) -> Option<u8> {
        let d1 = self.peek()?.to_digit(10)? as u8;
        self.bump(1);
        match self.peek().and_then(|c| c.to_digit(10)) {
            None => Some(d1),
            Some(d2) => {
                self.bump(1);
                Some(d1 * 10 + d2 as u8)
            }
        }
    }

    fn parse_color(&mut self) -> Option<(u8, Option<u8>)> {
        let fg = self.parse_color_code()?;
        if self.peek() == Some(',') {
            let cursor = self.cursor;
            self.bump(1);
            match self.parse_color_code() {
                None => {
                    // The comma was message text, not a separator.
                    self.cursor = cursor;
                    Some((fg, None))
                }
                Some(bg) => Some((fg, Some(bg))),
            }
        } else {
            Some((fg, None))
        }
    }
}

fn is_format_char(c: char) -> bool {
    matches!(
        c,
        CHAR_BOLD
            | CHAR_ITALIC
            | CHAR_UNDERLINE
            | CHAR_STRIKETHROUGH
            | CHAR_MONOSPACE
            | CHAR_COLOR
            | CHAR_HEX_COLOR
            | CHAR_REVERSE_COLOR
            | CHAR_RESET
    )
}

impl<'a> Iterator for FormatEventParser<'a> {
    type Item = IrcFormatEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.peek()?;
            match next {
                CHAR_BOLD => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Bold);
                }
                CHAR_ITALIC => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Italic);
                }
                CHAR_UNDERLINE => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Underline);
                }
                CHAR_STRIKETHROUGH => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Strikethrough);
                }
                CHAR_MONOSPACE => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Monospace);
                }
                CHAR_COLOR => {
                    self.bump(1);
                    match self.parse_color() {
                        Some((fg, bg)) => return Some(IrcFormatEvent::Color { fg, bg }),
                        None => {
                            // Bare color char resets color; we just drop it.
                        }
                    }
                }
                CHAR_HEX_COLOR => {
                    self.bump(1);
                    // rrggbb
                    for _ in 0..6 {
                        let _ = self.next_char();
                    }
                }
                CHAR_REVERSE_COLOR => {
                    self.bump(1);
                    return Some(IrcFormatEvent::ReverseColor);
                }
                CHAR_RESET => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Reset);
                }
                '\n' | '\r' => {
                    self.bump(1);
                    return Some(IrcFormatEvent::Text(" "));
                }
                other if other.is_ascii_control() => {
                    self.bump(1);
                    continue;
                }
                _ => return Some(IrcFormatEvent::Text(self.parse_text())),
            }
        }
    }
}

pub fn parse_irc_formatting(s: &str) -> impl Iterator<Item = IrcFormatEvent<'_>> {
    FormatEventParser::new(s)
}

/// Remove all IRC formatting and ASCII control characters.
pub fn strip_formatting(str: &str) -> String {
    let mut s = String::with_capacity(str.len());
    for event in parse_irc_formatting(str) {
        if let IrcFormatEvent::Text(text) = event {
            s.push_str(text);
        }
    }
    s
}

/// The 16 mIRC color codes as 256-color terminal palette indices.
static MIRC_TO_ANSI: [u8; 16] = [15, 0, 4, 2, 9, 1, 5, 202, 11, 10, 6, 14, 12, 13, 8, 7];

fn ansi_index(code: u8) -> u8 {
    match code {
        0..=15 => MIRC_TO_ANSI[code as usize],
        // Extended mIRC colors (16-98) approximate into the 6x6x6 cube;
        // out-of-spec codes just pass through as palette indices.
        _ => code,
    }
}

/// Translate IRC formatting to ANSI SGR escape sequences.
pub fn to_ansi(str: &str) -> String {
    let mut out = String::with_capacity(str.len());
    for event in parse_irc_formatting(str) {
        match event {
            IrcFormatEvent::Text(text) => out.push_str(text),
            IrcFormatEvent::Bold => out.push_str("\x1b[1m"),
            IrcFormatEvent::Italic => out.push_str("\x1b[3m"),
            IrcFormatEvent::Underline => out.push_str("\x1b[4m"),
            IrcFormatEvent::Strikethrough => out.push_str("\x1b[9m"),
            IrcFormatEvent::Monospace => {}
            IrcFormatEvent::Color { fg, bg } => {
                if fg == 99 {
                    out.push_str("\x1b[39m");
                } else {
                    out.push_str(&format!("\x1b[38;5;{}m", ansi_index(fg)));
                }
                match bg {
                    Some(99) => out.push_str("\x1b[49m"),
                    Some(bg) => out.push_str(&format!("\x1b[48;5;{}m", ansi_index(bg))),
                    None => {}
                }
            }
            IrcFormatEvent::ReverseColor => out.push_str("\x1b[7m"),
            IrcFormatEvent::Reset => out.push_str("\x1b[0m"),
        }
    }
    out
}
