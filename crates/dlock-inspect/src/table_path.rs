//! Table path decomposition.
//!
//! Locks carry the engine-internal path of their table,
//! `schema/table[#P#partition[#SP#subpartition]]`, in the engine's
//! filename-safe encoding. Rows report the decoded parts separately.

use std::borrow::Cow;

use crate::sink::{DataLockSink, ObjectName};

/// Raw, still encoded parts of a table path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePath<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub partition: Option<&'a str>,
    pub subpartition: Option<&'a str>,
}

/// Splits and transcodes engine table paths.
pub trait TablePathResolver: Send + Sync {
    fn split<'a>(&self, path: &'a str) -> TablePath<'a>;

    /// Decode one path component into a display identifier.
    fn convert<'a>(&self, raw: &'a str) -> Cow<'a, str>;
}

/// Resolver for the filename-safe encoding: `@XXXX` stands for the character
/// with that hex code point, everything else is literal.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameTablePaths;

const PARTITION_MARKER: &str = "#p#";
const SUBPARTITION_MARKER: &str = "#sp#";

impl TablePathResolver for FilenameTablePaths {
    fn split<'a>(&self, path: &'a str) -> TablePath<'a> {
        let (schema, rest) = path.split_once('/').unwrap_or(("", path));

        let Some(p) = find_marker(rest, PARTITION_MARKER) else {
            return TablePath {
                schema,
                table: rest,
                partition: None,
                subpartition: None,
            };
        };
        let table = &rest[..p];
        let parts = &rest[p + PARTITION_MARKER.len()..];

        let (partition, subpartition) = match find_marker(parts, SUBPARTITION_MARKER) {
            Some(sp) => (
                &parts[..sp],
                Some(&parts[sp + SUBPARTITION_MARKER.len()..]),
            ),
            None => (parts, None),
        };

        TablePath {
            schema,
            table,
            partition: Some(partition),
            subpartition,
        }
    }

    fn convert<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if !raw.contains('@') {
            return Cow::Borrowed(raw);
        }

        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(at) = rest.find('@') {
            out.push_str(&rest[..at]);
            let escape = rest.get(at + 1..at + 5).and_then(decode_escape);
            match escape {
                Some(c) => {
                    out.push(c);
                    rest = &rest[at + 5..];
                }
                None => {
                    out.push('@');
                    rest = &rest[at + 1..];
                }
            }
        }
        out.push_str(rest);
        Cow::Owned(out)
    }
}

fn decode_escape(hex: &str) -> Option<char> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

/// Byte offset of the first ASCII case-insensitive occurrence of `marker`.
fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    let needle = marker.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Decompose `path` and copy every decoded part into the sink's cache.
pub fn resolve_object<S: DataLockSink + ?Sized>(
    resolver: &dyn TablePathResolver,
    path: &str,
    sink: &mut S,
) -> ObjectName {
    let parts = resolver.split(path);
    let mut cache = |raw: &str| sink.cache_str(&resolver.convert(raw));
    ObjectName {
        schema: cache(parts.schema),
        name: cache(parts.table),
        partition: parts.partition.map(&mut cache),
        subpartition: parts.subpartition.map(&mut cache),
    }
}
