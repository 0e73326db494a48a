//! Common types shared by the lattice crates: case-insensitive IRC names,
//! buffer identifiers, and the addressing enums used when routing printable
//! events to buffers and chat logs.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// RFC 2812 casemapping (section 2.2): ASCII lowercased, with `[`, `]`, `\`,
/// `~` treated as the lowercase forms of `{`, `}`, `|`, `^`. Applies to both
/// channel names and nicks.
pub fn rfc2812_lower(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c.to_ascii_lowercase(),
    }
}

/// Case-insensitive nick comparison using the IRC casemapping.
pub fn nick_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        // Casemapping only folds ASCII so byte lengths of equal nicks match.
        return false;
    }
    a.chars()
        .map(rfc2812_lower)
        .zip(b.chars().map(rfc2812_lower))
        .all(|(x, y)| x == y)
}

/// A channel name. Channel names are case-insensitive per the IRC
/// casemapping, so `Eq` and `Hash` fold case; `display` gives back the
/// original spelling.
#[derive(Debug, Clone)]
pub struct ChanName(String);

/// Slice version of [`ChanName`], analogous to `str` vs `String`.
#[derive(Debug)]
#[repr(transparent)]
pub struct ChanNameRef(str);

impl ChanName {
    pub fn new(name: String) -> ChanName {
        ChanName(name)
    }

    pub fn display(&self) -> &str {
        &self.0
    }
}

impl ChanNameRef {
    pub fn new(name: &str) -> &ChanNameRef {
        // Safe because of repr(transparent); same idiom as Path::new.
        unsafe { &*(name as *const str as *const ChanNameRef) }
    }

    pub fn display(&self) -> &str {
        &self.0
    }

    /// Casemapped form, for use as a map key or file name.
    pub fn normalized(&self) -> String {
        self.0.chars().map(rfc2812_lower).collect()
    }
}

impl Deref for ChanName {
    type Target = ChanNameRef;

    fn deref(&self) -> &ChanNameRef {
        self.as_ref()
    }
}

impl AsRef<ChanNameRef> for ChanName {
    fn as_ref(&self) -> &ChanNameRef {
        ChanNameRef::new(self.0.as_ref())
    }
}

impl Borrow<ChanNameRef> for ChanName {
    fn borrow(&self) -> &ChanNameRef {
        self.as_ref()
    }
}

impl ToOwned for ChanNameRef {
    type Owned = ChanName;

    fn to_owned(&self) -> ChanName {
        ChanName(self.0.to_owned())
    }
}

impl PartialEq for ChanNameRef {
    fn eq(&self, other: &Self) -> bool {
        nick_eq(&self.0, &other.0)
    }
}

impl Eq for ChanNameRef {}

impl PartialEq for ChanName {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for ChanName {}

impl PartialEq<ChanNameRef> for ChanName {
    fn eq(&self, other: &ChanNameRef) -> bool {
        self.as_ref() == other
    }
}

impl PartialEq<ChanName> for ChanNameRef {
    fn eq(&self, other: &ChanName) -> bool {
        self == other.as_ref()
    }
}

impl Hash for ChanNameRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for c in self.0.chars() {
            rfc2812_lower(c).hash(state);
        }
    }
}

impl Hash for ChanName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ref().hash(state)
    }
}

/// Stable identifier of a buffer. Assigned at buffer creation, never reused
/// within a session; remote relay clients address buffers by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a piece of user input originated: which buffer the user was on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgSource {
    /// Server buffer of `serv`.
    Serv { serv: String },

    /// A channel buffer.
    Chan { serv: String, chan: ChanName },

    /// A private conversation buffer.
    User { serv: String, nick: String },
}

impl MsgSource {
    pub fn serv_name(&self) -> &str {
        match self {
            MsgSource::Serv { serv }
            | MsgSource::Chan { serv, .. }
            | MsgSource::User { serv, .. } => serv,
        }
    }

    pub fn to_target(&self) -> MsgTarget {
        match self {
            MsgSource::Serv { serv } => MsgTarget::Server { serv },
            MsgSource::Chan { serv, chan } => MsgTarget::Chan { serv, chan },
            MsgSource::User { serv, nick } => MsgTarget::User { serv, nick },
        }
    }
}

/// Where to show a printable event. Borrowed variant of [`MsgSource`] with
/// the extra broadcast targets the display/log layers understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgTarget<'a> {
    Server { serv: &'a str },
    Chan { serv: &'a str, chan: &'a ChanNameRef },
    User { serv: &'a str, nick: &'a str },

    /// All buffers of a server (server buffer, channels, private
    /// conversations). Used for connection-level events.
    AllServBuffers { serv: &'a str },

    /// The buffer the user is currently looking at. Command errors go here.
    CurrentBuffer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn chan_name_case_insensitive() {
        assert_eq!(
            ChanName::new("#Rust".to_owned()),
            ChanName::new("#rust".to_owned())
        );
        assert_eq!(
            ChanNameRef::new("#foo[]"),
            ChanNameRef::new("#FOO{}"),
        );
        assert_ne!(
            ChanName::new("#rust".to_owned()),
            ChanName::new("#rusty".to_owned())
        );
    }

    #[test]
    fn chan_name_map_key() {
        let mut map: HashMap<ChanName, u32> = HashMap::new();
        map.insert(ChanName::new("#Chan".to_owned()), 1);
        assert_eq!(map.get(ChanNameRef::new("#chan")), Some(&1));
        assert_eq!(map.get(ChanNameRef::new("#CHAN")), Some(&1));
        assert_eq!(map.get(ChanNameRef::new("#other")), None);
    }

    #[test]
    fn nick_casemapping() {
        assert!(nick_eq("foo", "FOO"));
        assert!(nick_eq("nick[away]", "NICK{AWAY}"));
        assert!(nick_eq("a\\b", "A|B"));
        assert!(!nick_eq("foo", "bar"));
        assert!(!nick_eq("foo", "fooo"));
    }
}
