//! Tablet identity: table id plus the key range boundaries
//!
//! Extents map onto metadata table rows as `table_id ';' end_row`, or
//! `table_id '<'` for the last tablet of a table, so the tablets of one table
//! sort by end row with the unbounded tablet last.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Id of the metadata table. The root tablet is its first tablet.
pub const METADATA_TABLE_ID: &str = "!0";

/// End row of the root tablet (`"!0<"`, the row of the metadata table's last tablet).
pub const ROOT_TABLET_END_ROW: &[u8] = b"!0<";

const ROW_SEPARATOR: u8 = b';';
const LAST_TABLET_MARKER: u8 = b'<';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(String);

impl TableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn metadata() -> Self {
        Self(METADATA_TABLE_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a tablet: rows in `(prev_end_row, end_row]` of `table_id`.
///
/// `None` bounds are unbounded: no end row means +infinity, no previous end row
/// means -infinity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ExtentFields")]
pub struct KeyExtent {
    table_id: TableId,
    end_row: Option<Vec<u8>>,
    prev_end_row: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct ExtentFields {
    table_id: TableId,
    end_row: Option<Vec<u8>>,
    prev_end_row: Option<Vec<u8>>,
}

impl TryFrom<ExtentFields> for KeyExtent {
    type Error = Error;

    fn try_from(fields: ExtentFields) -> Result<Self> {
        KeyExtent::new(fields.table_id, fields.end_row, fields.prev_end_row)
    }
}

impl KeyExtent {
    pub fn new(
        table_id: TableId,
        end_row: Option<Vec<u8>>,
        prev_end_row: Option<Vec<u8>>,
    ) -> Result<Self> {
        if table_id.as_str().is_empty() {
            return Err(Error::MalformedRecord("extent with empty table id".into()));
        }
        if table_id
            .as_str()
            .bytes()
            .any(|b| b == ROW_SEPARATOR || b == LAST_TABLET_MARKER)
        {
            return Err(Error::MalformedRecord(format!(
                "table id contains a row delimiter: {}",
                table_id
            )));
        }
        if let (Some(end), Some(prev)) = (&end_row, &prev_end_row) {
            if prev >= end {
                return Err(Error::MalformedRecord(format!(
                    "previous end row {} is not before end row {}",
                    hex::encode(prev),
                    hex::encode(end)
                )));
            }
        }
        Ok(Self {
            table_id,
            end_row,
            prev_end_row,
        })
    }

    /// The distinguished root tablet extent
    pub fn root() -> Self {
        Self {
            table_id: TableId::metadata(),
            end_row: Some(ROOT_TABLET_END_ROW.to_vec()),
            prev_end_row: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.table_id.as_str() == METADATA_TABLE_ID
            && self.end_row.as_deref() == Some(ROOT_TABLET_END_ROW)
            && self.prev_end_row.is_none()
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn end_row(&self) -> Option<&[u8]> {
        self.end_row.as_deref()
    }

    pub fn prev_end_row(&self) -> Option<&[u8]> {
        self.prev_end_row.as_deref()
    }

    /// Key of this extent's row in the metadata table
    pub fn metadata_row(&self) -> Vec<u8> {
        encode_metadata_row(&self.table_id, self.end_row.as_deref())
    }

    /// Rebuild an extent from its metadata row and its encoded previous end row.
    pub fn from_metadata_row(row: &[u8], prev_end_row: &[u8]) -> Result<Self> {
        let (table_id, end_row) = decode_metadata_row(row)?;
        let prev = decode_prev_end_row(prev_end_row)?;
        Self::new(table_id, end_row, prev)
    }

    pub fn encoded_prev_end_row(&self) -> Vec<u8> {
        encode_prev_end_row(self.prev_end_row.as_deref())
    }

    /// Does this extent contain `row`?
    pub fn contains(&self, row: &[u8]) -> bool {
        let after_prev = self.prev_end_row.as_deref().map_or(true, |prev| row > prev);
        let before_end = self.end_row.as_deref().map_or(true, |end| row <= end);
        after_prev && before_end
    }
}

impl Ord for KeyExtent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.table_id
            .cmp(&other.table_id)
            .then_with(|| cmp_upper(self.end_row.as_deref(), other.end_row.as_deref()))
            .then_with(|| self.prev_end_row.cmp(&other.prev_end_row))
    }
}

impl PartialOrd for KeyExtent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order end rows with the unbounded end last.
fn cmp_upper(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

impl fmt::Display for KeyExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_id)?;
        match &self.end_row {
            Some(end) => write!(f, ";{}", String::from_utf8_lossy(end))?,
            None => write!(f, "<")?,
        }
        match &self.prev_end_row {
            Some(prev) => write!(f, ";{}", String::from_utf8_lossy(prev)),
            None => write!(f, "<"),
        }
    }
}

pub fn encode_metadata_row(table_id: &TableId, end_row: Option<&[u8]>) -> Vec<u8> {
    let mut row = table_id.as_str().as_bytes().to_vec();
    match end_row {
        Some(end) => {
            row.push(ROW_SEPARATOR);
            row.extend_from_slice(end);
        }
        None => row.push(LAST_TABLET_MARKER),
    }
    row
}

pub fn decode_metadata_row(row: &[u8]) -> Result<(TableId, Option<Vec<u8>>)> {
    let split = row
        .iter()
        .position(|&b| b == ROW_SEPARATOR || b == LAST_TABLET_MARKER)
        .ok_or_else(|| {
            Error::MalformedRecord(format!("metadata row without delimiter: {}", hex::encode(row)))
        })?;

    let table_id = std::str::from_utf8(&row[..split]).map_err(|_| {
        Error::MalformedRecord(format!("table id is not UTF-8: {}", hex::encode(row)))
    })?;

    let end_row = if row[split] == LAST_TABLET_MARKER {
        if split + 1 != row.len() {
            return Err(Error::MalformedRecord(format!(
                "trailing bytes after last tablet marker: {}",
                hex::encode(row)
            )));
        }
        None
    } else {
        Some(row[split + 1..].to_vec())
    };

    Ok((TableId::new(table_id), end_row))
}

/// Previous end row column encoding: `0x00` for none, `0x01` followed by the row.
pub fn encode_prev_end_row(prev: Option<&[u8]>) -> Vec<u8> {
    match prev {
        None => vec![0],
        Some(prev) => {
            let mut value = Vec::with_capacity(prev.len() + 1);
            value.push(1);
            value.extend_from_slice(prev);
            value
        }
    }
}

pub fn decode_prev_end_row(value: &[u8]) -> Result<Option<Vec<u8>>> {
    match value {
        [0] => Ok(None),
        [1, rest @ ..] => Ok(Some(rest.to_vec())),
        _ => Err(Error::MalformedRecord(format!(
            "bad previous end row encoding: {}",
            hex::encode(value)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(table: &str, end: Option<&str>, prev: Option<&str>) -> KeyExtent {
        KeyExtent::new(
            TableId::new(table),
            end.map(|s| s.as_bytes().to_vec()),
            prev.map(|s| s.as_bytes().to_vec()),
        )
        .unwrap()
    }

    #[test]
    fn test_root_extent() {
        let root = KeyExtent::root();
        assert!(root.is_root());
        assert_eq!(root.metadata_row(), b"!0;!0<".to_vec());
        assert!(!extent("!0", None, Some("!0<")).is_root());
        assert!(!extent("1", Some("m"), None).is_root());
    }

    #[test]
    fn test_ordering_puts_unbounded_tablet_last() {
        let a = extent("1", Some("g"), None);
        let b = extent("1", Some("p"), Some("g"));
        let c = extent("1", None, Some("p"));
        let d = extent("2", Some("a"), None);

        let mut extents = vec![d.clone(), c.clone(), a.clone(), b.clone()];
        extents.sort();
        assert_eq!(extents, vec![a.clone(), b.clone(), c.clone(), d]);

        // Row keys sort the same way as extents.
        assert!(a.metadata_row() < b.metadata_row());
        assert!(b.metadata_row() < c.metadata_row());
    }

    #[test]
    fn test_metadata_row_decode() {
        let e = extent("1", Some("p"), Some("g"));
        let decoded =
            KeyExtent::from_metadata_row(&e.metadata_row(), &e.encoded_prev_end_row()).unwrap();
        assert_eq!(decoded, e);

        let last = extent("1", None, None);
        assert_eq!(last.metadata_row(), b"1<".to_vec());
        let decoded = KeyExtent::from_metadata_row(b"1<", &[0]).unwrap();
        assert_eq!(decoded, last);
    }

    #[test]
    fn test_malformed_rows() {
        assert!(decode_metadata_row(b"nodelimiter").is_err());
        assert!(decode_metadata_row(b"1<junk").is_err());
        assert!(decode_prev_end_row(&[]).is_err());
        assert!(decode_prev_end_row(&[0, 1]).is_err());
        assert!(decode_prev_end_row(&[7]).is_err());
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        let result = KeyExtent::new(
            TableId::new("1"),
            Some(b"a".to_vec()),
            Some(b"m".to_vec()),
        );
        assert!(result.is_err());
        assert!(KeyExtent::new(TableId::new("a;b"), None, None).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let e = extent("1", Some("m"), Some("f"));
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(serde_json::from_str::<KeyExtent>(&json).unwrap(), e);

        let inverted = r#"{"table_id":"1","end_row":[97],"prev_end_row":[109]}"#;
        assert!(serde_json::from_str::<KeyExtent>(inverted).is_err());
        let bad_table = r#"{"table_id":"1;x","end_row":null,"prev_end_row":null}"#;
        assert!(serde_json::from_str::<KeyExtent>(bad_table).is_err());
    }

    #[test]
    fn test_contains() {
        let e = extent("1", Some("m"), Some("f"));
        assert!(!e.contains(b"f"));
        assert!(e.contains(b"g"));
        assert!(e.contains(b"m"));
        assert!(!e.contains(b"n"));
        assert!(extent("1", None, None).contains(b"anything"));
    }
}
