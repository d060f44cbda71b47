//! Order-preserving tuple encoding.
//!
//! Packed tuples sort byte-wise in the same order as their elements, so a
//! range scan over a packed prefix visits exactly the tuples that start with
//! that prefix. The encoding follows the FoundationDB tuple layer for the
//! element types Strata keys use.
//!
//! | Code | Type | Encoding |
//! |------|------|----------|
//! | 0x00 | Null | single byte |
//! | 0x01 | Bytes | null-escaped, 0x00 terminated |
//! | 0x02 | String | UTF-8, null-escaped, 0x00 terminated |
//! | 0x05 | Nested | elements, 0x00 terminated |
//! | 0x0C-0x13 | Negative int | one's complement big-endian, size = 0x14 - code |
//! | 0x14 | Zero | single byte |
//! | 0x15-0x1C | Positive int | big-endian, size = code - 0x14 |
//! | 0x26 / 0x27 | false / true | single byte |

use std::cmp::Ordering;

use snafu::ResultExt;
use snafu::Snafu;

const NULL_CODE: u8 = 0x00;
const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const NESTED_CODE: u8 = 0x05;
const INT_ZERO_CODE: u8 = 0x14;
const NEG_INT_MIN_CODE: u8 = 0x0C;
const POS_INT_MAX_CODE: u8 = 0x1C;
const FALSE_CODE: u8 = 0x26;
const TRUE_CODE: u8 = 0x27;

/// Second byte of an escaped 0x00 inside byte strings and nested tuples.
const NULL_ESCAPE: u8 = 0xFF;

/// Errors produced while decoding a packed tuple.
#[derive(Debug, Snafu)]
pub enum TupleError {
    /// Input ended in the middle of an element.
    #[snafu(display("unexpected end of input at offset {offset}"))]
    UnexpectedEnd {
        /// Byte offset where the element started.
        offset: usize,
    },

    /// Type code not supported by this encoding.
    #[snafu(display("unknown type code 0x{code:02X} at offset {offset}"))]
    UnknownTypeCode {
        /// The unknown type code.
        code: u8,
        /// Byte offset of the code.
        offset: usize,
    },

    /// String element is not valid UTF-8.
    #[snafu(display("invalid UTF-8 at offset {offset}: {source}"))]
    InvalidUtf8 {
        /// Byte offset of the element.
        offset: usize,
        /// Underlying UTF-8 error.
        source: std::string::FromUtf8Error,
    },

    /// Byte or string element has no terminator.
    #[snafu(display("missing null terminator at offset {offset}"))]
    MissingTerminator {
        /// Byte offset where the element payload started.
        offset: usize,
    },

    /// Decoded integer does not fit in an i64.
    #[snafu(display("integer overflow at offset {offset}"))]
    IntegerOverflow {
        /// Byte offset of the integer.
        offset: usize,
    },

    /// Nested tuple has no terminator.
    #[snafu(display("unterminated nested tuple at offset {offset}"))]
    UnterminatedNested {
        /// Byte offset where the nested payload started.
        offset: usize,
    },
}

/// A single element of a [`Tuple`].
///
/// Ordering matches the ordering of the packed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// Null (sorts first).
    Null,
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// Nested tuple.
    Tuple(Tuple),
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut lhs = Vec::new();
        let mut rhs = Vec::new();
        self.pack_into(&mut lhs, false);
        other.pack_into(&mut rhs, false);
        lhs.cmp(&rhs)
    }
}

impl Element {
    /// Borrow the payload of a `Bytes` element.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Element::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Borrow the payload of a `String` element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(s) => Some(s),
            _ => None,
        }
    }

    /// Value of an `Int` element.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Element::Int(n) => Some(*n),
            _ => None,
        }
    }

    fn pack_into(&self, buf: &mut Vec<u8>, nested: bool) {
        match self {
            Element::Null if nested => {
                buf.push(NULL_CODE);
                buf.push(NULL_ESCAPE);
            }
            Element::Null => buf.push(NULL_CODE),
            Element::Bytes(bytes) => {
                buf.push(BYTES_CODE);
                escape_nulls(bytes, buf);
                buf.push(0x00);
            }
            Element::String(s) => {
                buf.push(STRING_CODE);
                escape_nulls(s.as_bytes(), buf);
                buf.push(0x00);
            }
            Element::Int(n) => encode_int(*n, buf),
            Element::Bool(b) => buf.push(if *b { TRUE_CODE } else { FALSE_CODE }),
            Element::Tuple(t) => {
                buf.push(NESTED_CODE);
                for elem in &t.elements {
                    elem.pack_into(buf, true);
                }
                buf.push(0x00);
            }
        }
    }
}

impl From<()> for Element {
    fn from(_: ()) -> Self {
        Element::Null
    }
}

impl From<Vec<u8>> for Element {
    fn from(v: Vec<u8>) -> Self {
        Element::Bytes(v)
    }
}

impl From<&[u8]> for Element {
    fn from(v: &[u8]) -> Self {
        Element::Bytes(v.to_vec())
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Element::String(s)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element::String(s.to_string())
    }
}

impl From<i64> for Element {
    fn from(n: i64) -> Self {
        Element::Int(n)
    }
}

impl From<bool> for Element {
    fn from(b: bool) -> Self {
        Element::Bool(b)
    }
}

impl From<Tuple> for Element {
    fn from(t: Tuple) -> Self {
        Element::Tuple(t)
    }
}

impl<T: Into<Element>> From<Option<T>> for Element {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Element::Null)
    }
}

/// An ordered collection of typed elements that packs into sortable bytes.
///
/// ```
/// use strata_layer::Tuple;
///
/// let a = Tuple::new().push("tenants").push(1i64);
/// let b = Tuple::new().push("tenants").push(2i64);
/// assert!(a.pack() < b.pack());
/// assert_eq!(Tuple::unpack(&a.pack()).unwrap(), a);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Tuple {
    elements: Vec<Element>,
}

impl Tuple {
    /// Create an empty tuple.
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Append an element (builder style).
    pub fn push<E: Into<Element>>(mut self, element: E) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Append an element in place.
    pub fn push_mut<E: Into<Element>>(&mut self, element: E) {
        self.elements.push(element.into());
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the tuple has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Consume the tuple, returning its elements.
    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }

    /// Pack into a new buffer.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.elements.len() * 8);
        self.pack_into(&mut buf);
        buf
    }

    /// Pack, appending to `buf`.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        for elem in &self.elements {
            elem.pack_into(buf, false);
        }
    }

    /// Decode a packed tuple. Every byte of `data` must belong to an element.
    pub fn unpack(data: &[u8]) -> Result<Self, TupleError> {
        let mut decoder = Decoder { data, offset: 0 };
        let mut tuple = Tuple::new();
        while decoder.offset < data.len() {
            tuple.elements.push(decoder.element()?);
        }
        Ok(tuple)
    }

    /// Key range `[packed, packed ++ 0xFF)` covering every tuple that extends this one.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let start = self.pack();
        let mut end = start.clone();
        end.push(0xFF);
        (start, end)
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pack().cmp(&other.pack())
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn escape_nulls(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        buf.push(b);
        if b == 0x00 {
            buf.push(NULL_ESCAPE);
        }
    }
}

/// Number of big-endian bytes needed to hold `n` (1..=8).
fn int_size(n: u64) -> u8 {
    let bits = 64 - n.leading_zeros();
    bits.div_ceil(8).max(1) as u8
}

fn encode_int(n: i64, buf: &mut Vec<u8>) {
    if n == 0 {
        buf.push(INT_ZERO_CODE);
        return;
    }
    let magnitude = n.unsigned_abs();
    let size = int_size(magnitude);
    let bytes = if n > 0 {
        buf.push(INT_ZERO_CODE + size);
        magnitude.to_be_bytes()
    } else {
        buf.push(INT_ZERO_CODE - size);
        (!magnitude).to_be_bytes()
    };
    buf.extend_from_slice(&bytes[8 - size as usize..]);
}

// =============================================================================
// Decoding
// =============================================================================

struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Decoder<'_> {
    fn element(&mut self) -> Result<Element, TupleError> {
        let start = self.offset;
        let code = *self.data.get(start).ok_or(TupleError::UnexpectedEnd { offset: start })?;
        self.offset += 1;

        match code {
            NULL_CODE => Ok(Element::Null),
            BYTES_CODE => Ok(Element::Bytes(self.escaped_bytes()?)),
            STRING_CODE => {
                let bytes = self.escaped_bytes()?;
                let s = String::from_utf8(bytes).context(InvalidUtf8Snafu { offset: start })?;
                Ok(Element::String(s))
            }
            NESTED_CODE => Ok(Element::Tuple(self.nested()?)),
            FALSE_CODE => Ok(Element::Bool(false)),
            TRUE_CODE => Ok(Element::Bool(true)),
            NEG_INT_MIN_CODE..=POS_INT_MAX_CODE => self.int(code, start).map(Element::Int),
            _ => Err(TupleError::UnknownTypeCode { code, offset: start }),
        }
    }

    fn escaped_bytes(&mut self) -> Result<Vec<u8>, TupleError> {
        let start = self.offset;
        let mut out = Vec::new();
        while let Some(&b) = self.data.get(self.offset) {
            if b == 0x00 {
                if self.data.get(self.offset + 1) == Some(&NULL_ESCAPE) {
                    out.push(0x00);
                    self.offset += 2;
                    continue;
                }
                self.offset += 1;
                return Ok(out);
            }
            out.push(b);
            self.offset += 1;
        }
        Err(TupleError::MissingTerminator { offset: start })
    }

    fn int(&mut self, code: u8, start: usize) -> Result<i64, TupleError> {
        if code == INT_ZERO_CODE {
            return Ok(0);
        }
        let size = code.abs_diff(INT_ZERO_CODE) as usize;
        let end = self.offset + size;
        let payload = self.data.get(self.offset..end).ok_or(TupleError::UnexpectedEnd { offset: start })?;
        self.offset = end;

        let mut raw = [0u8; 8];
        raw[8 - size..].copy_from_slice(payload);
        let value = u64::from_be_bytes(raw);

        if code > INT_ZERO_CODE {
            return i64::try_from(value).map_err(|_| TupleError::IntegerOverflow { offset: start });
        }
        let mask = if size == 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
        let magnitude = !value & mask;
        match magnitude.cmp(&i64::MIN.unsigned_abs()) {
            Ordering::Greater => Err(TupleError::IntegerOverflow { offset: start }),
            Ordering::Equal => Ok(i64::MIN),
            Ordering::Less => Ok(-(magnitude as i64)),
        }
    }

    fn nested(&mut self) -> Result<Tuple, TupleError> {
        let start = self.offset;
        let mut tuple = Tuple::new();
        while let Some(&b) = self.data.get(self.offset) {
            if b == 0x00 {
                if self.data.get(self.offset + 1) == Some(&NULL_ESCAPE) {
                    tuple.elements.push(Element::Null);
                    self.offset += 2;
                    continue;
                }
                self.offset += 1;
                return Ok(tuple);
            }
            tuple.elements.push(self.element()?);
        }
        Err(TupleError::UnterminatedNested { offset: start })
    }
}
