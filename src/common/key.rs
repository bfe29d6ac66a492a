use smallvec::SmallVec;
use std::{collections::BTreeMap, fmt, iter::FromIterator};

/// A single segment of a [`QueryKey`][query-key].
///
/// Map segments are stored ordered by their keys, so two maps holding the same
/// entries are the same segment regardless of the order they were built in.
///
/// [query-key]: ./struct.QueryKey.html
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<KeyPart>),
    Map(BTreeMap<String, KeyPart>),
}

impl KeyPart {
    /// Builds a map segment such as `{"limit": 10}`.
    ///
    /// ```rust
    /// use qcache::KeyPart;
    ///
    /// let part = KeyPart::map([("limit", 10)]);
    /// assert_eq!(part.to_string(), r#"{"limit":10}"#);
    /// ```
    pub fn map<I, K, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<KeyPart>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }

    /// Builds a list segment.
    pub fn list<I, P>(items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        Self::Int(n as i64)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<Vec<KeyPart>> for KeyPart {
    fn from(items: Vec<KeyPart>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, KeyPart>> for KeyPart {
    fn from(map: BTreeMap<String, KeyPart>) -> Self {
        Self::Map(map)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write_quoted(f, s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write_quoted(f, k)?;
                    write!(f, ":{v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    use fmt::Write;

    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// Identifies a cached query.
///
/// A `QueryKey` is an ordered sequence of [`KeyPart`][key-part]s, for example
/// `["pets", "list", {"limit": 10}]`. Two keys are equal if and only if their
/// serialized (`Display`) forms are equal.
///
/// A key can also be used as a _prefix_ to address every key that extends it.
/// This is how [`QueryStore::invalidate`][invalidate] selects entries.
///
/// Use the [`query_key!`][query-key-macro] macro for a compact literal form:
///
/// ```rust
/// use qcache::{query_key, KeyPart};
///
/// let key = query_key!["pets", "list", KeyPart::map([("limit", 10)])];
/// assert_eq!(key.to_string(), r#"["pets","list",{"limit":10}]"#);
/// assert!(key.starts_with(&query_key!["pets"]));
/// ```
///
/// [key-part]: ./enum.KeyPart.html
/// [invalidate]: ./struct.QueryStore.html#method.invalidate
/// [query-key-macro]: ./macro.query_key.html
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey {
    parts: SmallVec<[KeyPart; 4]>,
}

impl QueryKey {
    /// Creates an empty key. The empty key is a prefix of every key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment.
    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.parts.push(part.into());
    }

    /// Returns this key extended by one segment.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.push(part);
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns `true` if the leading segments of this key are equal to every
    /// segment of `prefix`. A key starts with itself.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.parts.starts_with(&prefix.parts)
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for QueryKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({self})")
    }
}

/// Creates a [`QueryKey`][query-key] from a list of segments.
///
/// Each element can be anything that converts into a
/// [`KeyPart`][key-part]: string slices, integers, booleans, `Option`s or
/// `KeyPart` values themselves.
///
/// ```rust
/// use qcache::query_key;
///
/// let key = query_key!["pets", "detail", 42];
/// assert_eq!(key.len(), 3);
/// assert!(query_key![].is_empty());
/// ```
///
/// [query-key]: ./struct.QueryKey.html
/// [key-part]: ./enum.KeyPart.html
#[macro_export]
macro_rules! query_key {
    () => {
        $crate::QueryKey::new()
    };
    ($($part:expr),+ $(,)?) => {{
        let mut key = $crate::QueryKey::new();
        $( key.push($part); )+
        key
    }};
}
