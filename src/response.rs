use itertools::Itertools;
use rusqlite::types::ValueRef;
use std::fmt::{self, Write};

const SUCCESS: &str = "SUCCESS";
const ERROR: &str = "ERROR";

/// The outcome of executing one command. Exactly one is produced per command and it is sent back
/// as exactly one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A write command completed and was committed.
    Success,
    /// A read command completed; rows are in the order the store returned them.
    SuccessWithRows(Vec<Row>),
    /// The store rejected the command or could not be reached.
    Failure(String),
}

impl Response {
    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Failure(_))
    }
}

// Wire representation:
//
//   SUCCESS
//   SUCCESS|('alice', 'pw1', '2024-01-01')|('bob', 'pw2', None)
//   ERROR: no such table: nonexistent_table
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Success => f.write_str(SUCCESS),
            Response::SuccessWithRows(rows) => {
                f.write_str(SUCCESS)?;
                for row in rows {
                    write!(f, "|{}", row)?;
                }
                Ok(())
            }
            Response::Failure(message) => write!(f, "{}: {}", ERROR, message),
        }
    }
}

impl From<Response> for String {
    fn from(response: Response) -> Self {
        response.to_string()
    }
}

/// One result row, column values in projection order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub(crate) fn from_sql(row: &rusqlite::Row<'_>, columns: usize) -> rusqlite::Result<Row> {
        (0..columns)
            .map(|idx| row.get_ref(idx).map(Value::from))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map(Row)
    }
}

/// Rendered as a tuple literal that permissive client-side parsers already understand:
/// `('alice', 1, None)`, and `('alice',)` for a single column.
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.0.iter().join(", "))?;
        if self.0.len() == 1 {
            f.write_char(',')?;
        }
        f.write_char(')')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write_real(f, *r),
            Value::Text(s) => write_text(f, s),
            Value::Blob(bytes) => write_blob(f, bytes),
        }
    }
}

// Shortest round-trip digits; positional notation for 1e-4 <= |r| < 1e16, exponent otherwise.
fn write_real(f: &mut fmt::Formatter<'_>, r: f64) -> fmt::Result {
    if r.is_nan() {
        return f.write_str("nan");
    }
    if r.is_infinite() {
        return f.write_str(if r > 0.0 { "inf" } else { "-inf" });
    }

    let abs = r.abs();
    if abs == 0.0 || (1e-4..1e16).contains(&abs) {
        let s = r.to_string();
        f.write_str(&s)?;
        if !s.contains('.') {
            f.write_str(".0")?;
        }
        return Ok(());
    }

    let s = format!("{:e}", r);
    match s.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => f.write_str(&s),
    }
}

fn quote_for(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double {
        '"'
    } else {
        '\''
    }
}

fn write_text(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = quote_for(s.contains('\''), s.contains('"'));

    f.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => write!(f, "\\{}", c)?,
            c if is_printable(c) => f.write_char(c)?,
            c if (c as u32) <= 0xff => write!(f, "\\x{:02x}", c as u32)?,
            c if (c as u32) <= 0xffff => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "\\U{:08x}", c as u32)?,
        }
    }
    f.write_char(quote)
}

// Controls, format characters, separators other than the ASCII space, private use and
// noncharacters are escaped. Unassigned code points pass through unescaped.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }

    !matches!(
        c as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x0890..=0x0891
            | 0x08E2
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xE000..=0xF8FF
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xFFFE..=0xFFFF
            | 0x110BD
            | 0x110CD
            | 0x13430..=0x1343F
            | 0x1BCA0..=0x1BCA3
            | 0x1D173..=0x1D17A
            | 0xE0001
            | 0xE0020..=0xE007F
            | 0xF0000..=0x10FFFF
    )
}

fn write_blob(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    let quote = quote_for(bytes.contains(&b'\''), bytes.contains(&b'"'));

    f.write_char('b')?;
    f.write_char(quote)?;
    for &b in bytes {
        match b {
            b'\\' => f.write_str("\\\\")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            b if b as char == quote => write!(f, "\\{}", quote)?,
            0x20..=0x7e => f.write_char(b as char)?,
            b => write!(f, "\\x{:02x}", b)?,
        }
    }
    f.write_char(quote)
}
