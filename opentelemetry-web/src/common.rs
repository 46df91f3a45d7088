use std::borrow::Cow;
use std::fmt;

/// A [AttributeValue::Array] containing homogeneous values.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeArray {
    /// Array of bools
    Bool(Vec<bool>),
    /// Array of integers
    I64(Vec<i64>),
    /// Array of floats
    F64(Vec<f64>),
    /// Array of strings
    String(Vec<Cow<'static, str>>),
}

impl AttributeArray {
    /// Number of elements held by the array.
    pub fn len(&self) -> usize {
        match self {
            AttributeArray::Bool(v) => v.len(),
            AttributeArray::I64(v) => v.len(),
            AttributeArray::F64(v) => v.len(),
            AttributeArray::String(v) => v.len(),
        }
    }

    /// Returns `true` if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for AttributeArray {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeArray::Bool(values) => write_joined(values, fmt),
            AttributeArray::I64(values) => write_joined(values, fmt),
            AttributeArray::F64(values) => write_joined(values, fmt),
            AttributeArray::String(values) => {
                write!(fmt, "[")?;
                for (i, t) in values.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ",")?;
                    }
                    write!(fmt, "\"{}\"", t)?;
                }
                write!(fmt, "]")
            }
        }
    }
}

fn write_joined<T: fmt::Display>(slice: &[T], fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(fmt, "[")?;
    for (i, t) in slice.iter().enumerate() {
        if i > 0 {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}", t)?;
    }
    write!(fmt, "]")
}

macro_rules! array_from {
    ($(($t:ty, $variant:ident, $map:expr),)+) => {
        $(
            impl From<$t> for AttributeArray {
                fn from(values: $t) -> Self {
                    #[allow(clippy::redundant_closure_call)]
                    AttributeArray::$variant(($map)(values))
                }
            }
        )+
    };
}

array_from!(
    (Vec<bool>, Bool, |v| v),
    (Vec<i64>, I64, |v| v),
    (Vec<f64>, F64, |v| v),
    (Vec<Cow<'static, str>>, String, |v| v),
    (Vec<String>, String, |v: Vec<String>| v.into_iter().map(Cow::Owned).collect()),
    (Vec<&'static str>, String, |v: Vec<&'static str>| v.into_iter().map(Cow::Borrowed).collect()),
);

/// The value part of an attribute stored in an
/// [`AttributeContainer`](crate::attributes::AttributeContainer).
///
/// Only scalars and homogeneous arrays can be stored; nested structure is
/// expressed through dotted keys instead.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(Cow<'static, str>),
    /// Array of homogeneous values
    Array(AttributeArray),
}

impl AttributeValue {
    /// String representation of the `AttributeValue`
    ///
    /// This will allocate if the underlying value is not a `String`.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            AttributeValue::String(v) => Cow::Borrowed(v.as_ref()),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Shortens string content to at most `max_len` characters.
    ///
    /// Applies to plain strings and to every element of a string array; other
    /// values are returned unchanged.
    pub fn truncated(self, max_len: usize) -> Self {
        match self {
            AttributeValue::String(s) => AttributeValue::String(truncate_str(s, max_len)),
            AttributeValue::Array(AttributeArray::String(values)) => {
                AttributeValue::Array(AttributeArray::String(
                    values
                        .into_iter()
                        .map(|s| truncate_str(s, max_len))
                        .collect(),
                ))
            }
            other => other,
        }
    }
}

fn truncate_str(s: Cow<'static, str>, max_len: usize) -> Cow<'static, str> {
    match s.char_indices().nth(max_len) {
        None => s,
        Some((byte_idx, _)) => match s {
            Cow::Borrowed(b) => Cow::Borrowed(&b[..byte_idx]),
            Cow::Owned(mut o) => {
                o.truncate(byte_idx);
                Cow::Owned(o)
            }
        },
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => v.fmt(fmt),
            AttributeValue::I64(v) => v.fmt(fmt),
            AttributeValue::F64(v) => v.fmt(fmt),
            AttributeValue::String(v) => fmt.write_str(v),
            AttributeValue::Array(v) => v.fmt(fmt),
        }
    }
}

macro_rules! value_from {
    ($(($t:ty, $variant:ident, $map:expr),)+) => {
        $(
            impl From<$t> for AttributeValue {
                fn from(value: $t) -> Self {
                    #[allow(clippy::redundant_closure_call)]
                    AttributeValue::$variant(($map)(value))
                }
            }
        )+
    };
}

value_from!(
    (bool, Bool, |v| v),
    (i64, I64, |v| v),
    (i32, I64, |v: i32| v as i64),
    (u32, I64, |v: u32| v as i64),
    (f64, F64, |v| v),
    (&'static str, String, Cow::Borrowed),
    (String, String, Cow::Owned),
    (Cow<'static, str>, String, |v| v),
    (AttributeArray, Array, |v| v),
);

impl<T> From<Vec<T>> for AttributeValue
where
    AttributeArray: From<Vec<T>>,
{
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Array(values.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AttributeValue::from("abcdef"), 3, AttributeValue::from("abc"))]
    #[case(AttributeValue::from(String::from("héllo")), 2, AttributeValue::from("hé"))]
    #[case(AttributeValue::from("ab"), 5, AttributeValue::from("ab"))]
    #[case(AttributeValue::from(42i64), 1, AttributeValue::from(42i64))]
    #[case(
        AttributeValue::from(vec!["long", "x"]),
        2,
        AttributeValue::from(vec!["lo", "x"])
    )]
    fn truncation(
        #[case] value: AttributeValue,
        #[case] limit: usize,
        #[case] expected: AttributeValue,
    ) {
        assert_eq!(value.truncated(limit), expected);
    }

    #[test]
    fn display_formats() {
        assert_eq!(AttributeValue::from(true).to_string(), "true");
        assert_eq!(AttributeValue::from(vec![1i64, 2, 3]).to_string(), "[1,2,3]");
        assert_eq!(
            AttributeValue::from(vec!["a", "b"]).to_string(),
            "[\"a\",\"b\"]"
        );
        assert_eq!(AttributeValue::from("plain").as_str(), "plain");
    }
}
