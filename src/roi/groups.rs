//! Grouping specifications: which original labels merge into which ROI.
//!
//! A grouping arrives as text, either JSON or a Python-style literal, and in
//! one of two shapes: an ordered list of label groups (`[[1,2,3],[4,5]]`) or
//! an explicit new-label mapping (`{1: [1,2,3], 2: [4,5]}`). The shape is
//! resolved here, at the parse boundary, into a tagged variant so the rest
//! of the crate never inspects structure at runtime.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A parsed grouping of original labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// Ordered groups; the group at index `i` becomes label `start_label + i`.
    Groups(Vec<Vec<i64>>),
    /// Explicit new-label to original-labels mapping. Keys are used verbatim
    /// and iterated in ascending order wherever iteration order matters.
    Map(BTreeMap<i64, Vec<i64>>),
}

impl GroupSpec {
    /// Resolve a command-line argument: a path to a file holding the
    /// grouping text, or the text itself.
    pub fn from_arg(arg: &str) -> Result<Self> {
        if Path::new(arg).exists() {
            let text = std::fs::read_to_string(arg)?;
            Self::parse(&text)
        } else {
            Self::parse(arg)
        }
    }

    /// Parse grouping text: JSON first, then a Python-style literal.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_json(&value),
            Err(_) => Self::from_literal(&literal::parse(text)?),
        }
    }

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(groups) => {
                let groups = groups
                    .iter()
                    .map(|g| match g {
                        Value::Array(labels) => labels.iter().map(json_int).collect(),
                        other => Err(Error::InvalidGroupSpec(format!(
                            "expected a group of labels, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<Vec<i64>>>>()?;
                Ok(Self::Groups(groups))
            }
            Value::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, labels) in entries {
                    let new_label: i64 = key.parse().map_err(|_| {
                        Error::InvalidGroupSpec(format!("mapping key '{key}' is not an integer"))
                    })?;
                    let originals = match labels {
                        Value::Array(labels) => {
                            labels.iter().map(json_int).collect::<Result<Vec<i64>>>()?
                        }
                        other => {
                            return Err(Error::InvalidGroupSpec(format!(
                                "expected a list of labels for key {new_label}, got {other}"
                            )))
                        }
                    };
                    map.insert(new_label, originals);
                }
                Ok(Self::Map(map))
            }
            other => Err(Error::InvalidGroupSpec(format!(
                "expected a list of groups or a label mapping, got {other}"
            ))),
        }
    }

    fn from_literal(value: &literal::Literal) -> Result<Self> {
        use literal::Literal;
        match value {
            Literal::Seq(groups) => {
                let groups = groups
                    .iter()
                    .map(|g| match g {
                        Literal::Seq(labels) => labels
                            .iter()
                            .map(|l| match l {
                                Literal::Int(v) => Ok(*v),
                                _ => Err(Error::InvalidGroupSpec(
                                    "groups must contain integer labels".into(),
                                )),
                            })
                            .collect(),
                        _ => Err(Error::InvalidGroupSpec(
                            "expected a group of labels".into(),
                        )),
                    })
                    .collect::<Result<Vec<Vec<i64>>>>()?;
                Ok(Self::Groups(groups))
            }
            Literal::Map(entries) => {
                let mut map = BTreeMap::new();
                for (new_label, labels) in entries {
                    let originals = match labels {
                        Literal::Seq(labels) => labels
                            .iter()
                            .map(|l| match l {
                                Literal::Int(v) => Ok(*v),
                                _ => Err(Error::InvalidGroupSpec(
                                    "mapping values must contain integer labels".into(),
                                )),
                            })
                            .collect::<Result<Vec<i64>>>()?,
                        _ => {
                            return Err(Error::InvalidGroupSpec(format!(
                                "expected a list of labels for key {new_label}"
                            )))
                        }
                    };
                    map.insert(*new_label, originals);
                }
                Ok(Self::Map(map))
            }
            Literal::Int(v) => Err(Error::InvalidGroupSpec(format!(
                "expected a list of groups or a label mapping, got bare integer {v}"
            ))),
        }
    }
}

fn json_int(value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        Error::InvalidGroupSpec(format!("label {value} is not an integer"))
    })
}

/// Minimal reader for Python-style literals: integers, lists, tuples, and
/// dicts with integer keys. Covers what `--groups` accepts beyond JSON,
/// like `{1: [17, 53]}` (JSON requires quoted keys).
mod literal {
    use crate::error::{Error, Result};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Literal {
        Int(i64),
        Seq(Vec<Literal>),
        Map(Vec<(i64, Literal)>),
    }

    pub fn parse(text: &str) -> Result<Literal> {
        let mut reader = Reader {
            bytes: text.as_bytes(),
            pos: 0,
        };
        reader.skip_ws();
        let value = reader.value()?;
        reader.skip_ws();
        if reader.pos != reader.bytes.len() {
            return Err(reader.error("trailing characters"));
        }
        Ok(value)
    }

    struct Reader<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl Reader<'_> {
        fn value(&mut self) -> Result<Literal> {
            match self.peek() {
                Some(b'[') => self.seq(b']'),
                Some(b'(') => self.seq(b')'),
                Some(b'{') => self.map(),
                Some(c) if c == b'-' || c == b'+' || c.is_ascii_digit() => {
                    Ok(Literal::Int(self.int()?))
                }
                _ => Err(self.error("expected an integer, list, tuple, or dict")),
            }
        }

        fn seq(&mut self, close: u8) -> Result<Literal> {
            self.pos += 1; // opening bracket
            let mut items = Vec::new();
            loop {
                self.skip_ws();
                if self.peek() == Some(close) {
                    self.pos += 1;
                    return Ok(Literal::Seq(items));
                }
                items.push(self.value()?);
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(c) if c == close => {}
                    _ => return Err(self.error("expected ',' or closing bracket")),
                }
            }
        }

        fn map(&mut self) -> Result<Literal> {
            self.pos += 1; // '{'
            let mut entries = Vec::new();
            loop {
                self.skip_ws();
                if self.peek() == Some(b'}') {
                    self.pos += 1;
                    return Ok(Literal::Map(entries));
                }
                let key = self.int()?;
                self.skip_ws();
                if self.peek() != Some(b':') {
                    return Err(self.error("expected ':' after mapping key"));
                }
                self.pos += 1;
                self.skip_ws();
                let value = self.value()?;
                entries.push((key, value));
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b'}') => {}
                    _ => return Err(self.error("expected ',' or '}'")),
                }
            }
        }

        fn int(&mut self) -> Result<i64> {
            let start = self.pos;
            if matches!(self.peek(), Some(b'-') | Some(b'+')) {
                self.pos += 1;
            }
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == digits_start {
                return Err(self.error("expected an integer"));
            }
            // Reject floats rather than truncating them.
            if matches!(self.peek(), Some(b'.') | Some(b'e') | Some(b'E')) {
                return Err(self.error("labels must be integers, not floats"));
            }
            let text = std::str::from_utf8(&self.bytes[start..self.pos])
                .map_err(|_| self.error("invalid integer"))?;
            text.parse()
                .map_err(|_| self.error("integer out of range"))
        }

        fn peek(&self) -> Option<u8> {
            self.bytes.get(self.pos).copied()
        }

        fn skip_ws(&mut self) {
            while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                self.pos += 1;
            }
        }

        fn error(&self, msg: &str) -> Error {
            Error::InvalidGroupSpec(format!("{msg} at byte {}", self.pos))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_json_group_list() {
        let spec = GroupSpec::parse("[[1,2,3],[4,5]]").unwrap();
        assert_eq!(spec, GroupSpec::Groups(vec![vec![1, 2, 3], vec![4, 5]]));
    }

    #[test]
    fn parses_json_mapping_with_string_keys() {
        let spec = GroupSpec::parse(r#"{"1": [17, 53], "2": [10]}"#).unwrap();
        let GroupSpec::Map(map) = spec else {
            panic!("expected mapping form");
        };
        assert_eq!(map[&1], vec![17, 53]);
        assert_eq!(map[&2], vec![10]);
    }

    #[test]
    fn parses_python_dict_with_int_keys() {
        let spec = GroupSpec::parse("{1: [17, 53], 2: (10, 11)}").unwrap();
        let GroupSpec::Map(map) = spec else {
            panic!("expected mapping form");
        };
        assert_eq!(map[&1], vec![17, 53]);
        assert_eq!(map[&2], vec![10, 11]);
    }

    #[test]
    fn parses_python_nested_lists_with_trailing_comma() {
        let spec = GroupSpec::parse("[[1, 2], (3,), ]").unwrap();
        assert_eq!(spec, GroupSpec::Groups(vec![vec![1, 2], vec![3]]));
    }

    #[test]
    fn negative_labels_are_allowed() {
        let spec = GroupSpec::parse("[[-1, -2]]").unwrap();
        assert_eq!(spec, GroupSpec::Groups(vec![vec![-1, -2]]));
    }

    #[test]
    fn float_labels_are_rejected() {
        assert!(GroupSpec::parse("[[1.5, 2]]").is_err());
        assert!(GroupSpec::parse("{1: [2.0]}").is_err());
    }

    #[test]
    fn bare_integers_are_rejected() {
        assert!(GroupSpec::parse("42").is_err());
        assert!(GroupSpec::parse("[1, 2]").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(GroupSpec::parse("not a grouping").is_err());
        assert!(GroupSpec::parse("{1: }").is_err());
        assert!(GroupSpec::parse("[[1,2]").is_err());
    }

    #[test]
    fn from_arg_reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{1: [17, 53]}}").unwrap();

        let spec = GroupSpec::from_arg(file.path().to_str().unwrap()).unwrap();
        let GroupSpec::Map(map) = spec else {
            panic!("expected mapping form");
        };
        assert_eq!(map[&1], vec![17, 53]);
    }

    #[test]
    fn from_arg_falls_back_to_literal_text() {
        let spec = GroupSpec::from_arg("[[7, 8]]").unwrap();
        assert_eq!(spec, GroupSpec::Groups(vec![vec![7, 8]]));
    }

    #[test]
    fn mapping_iterates_in_ascending_key_order() {
        let GroupSpec::Map(map) = GroupSpec::parse("{5: [1], 2: [2], 9: [3]}").unwrap() else {
            panic!("expected mapping form");
        };
        let keys: Vec<i64> = map.keys().copied().collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }
}
