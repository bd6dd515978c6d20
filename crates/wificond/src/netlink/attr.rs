//! Netlink attribute (nlattr) handling.
//!
//! Attributes are TLV records: a 4-byte header (`nla_len`, `nla_type`)
//! followed by the payload, padded to a 4-byte boundary. `nla_len` covers
//! the header and payload but not the padding.
//!
//! Parsing here is strict: a record whose declared length runs past the end
//! of the buffer is a [`Error::Truncated`] failure, never a silent stop.

use bytes::Bytes;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Largest payload whose length still fits the 16-bit `nla_len`.
pub const NLA_MAX_PAYLOAD: usize = u16::MAX as usize - NLA_HDRLEN;

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Header for a payload of `data_len` bytes.
    ///
    /// Payloads over [`NLA_MAX_PAYLOAD`] are rejected rather than given a
    /// wrapped `nla_len`.
    pub fn new(attr_type: u16, data_len: usize) -> Result<Self> {
        let nla_len = u16::try_from(NLA_HDRLEN + data_len).map_err(|_| {
            Error::InvalidAttribute(format!(
                "attribute {} payload of {} bytes exceeds {}",
                attr_type & NLA_TYPE_MASK,
                data_len,
                NLA_MAX_PAYLOAD
            ))
        })?;
        Ok(Self {
            nla_len,
            nla_type: attr_type,
        })
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Read a header from the front of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attribute records in a buffer.
///
/// Yields the raw header (type flags preserved) and the unpadded payload.
/// After the first error the iterator is exhausted.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<(NlAttr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let attr = match NlAttr::from_bytes(self.data) {
            Ok(a) => a,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN {
            self.data = &[];
            return Some(Err(Error::InvalidAttribute(format!(
                "attribute {} declares length {} below header size",
                attr.kind(),
                len
            ))));
        }
        if len > self.data.len() {
            let actual = self.data.len();
            self.data = &[];
            return Some(Err(Error::Truncated {
                expected: len,
                actual,
            }));
        }

        let payload = &self.data[NLA_HDRLEN..len];

        // The final record may omit its trailing padding.
        let advance = nla_align(len).min(self.data.len());
        self.data = &self.data[advance..];

        Some(Ok((attr, payload)))
    }
}

/// One attribute record: type tag plus unpadded payload.
///
/// The payload is a cheap reference-counted slice of the buffer the
/// attribute was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeView {
    nla_type: u16,
    payload: Bytes,
}

impl AttributeView {
    /// Create an attribute from a raw type (flags included) and payload.
    pub fn new(nla_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            nla_type,
            payload: payload.into(),
        }
    }

    /// Create a nested attribute from child attributes.
    ///
    /// Fails if a child, or the nest as a whole, is too long to encode.
    pub fn nest(kind: u16, children: &[AttributeView]) -> Result<Self> {
        let mut buf = Vec::new();
        for child in children {
            child.write_to(&mut buf)?;
        }
        NlAttr::new(kind | NLA_F_NESTED, buf.len())?;
        Ok(Self::new(kind | NLA_F_NESTED, buf))
    }

    /// Attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Attribute type as transmitted, flags included.
    pub fn raw_type(&self) -> u16 {
        self.nla_type
    }

    /// Check if the nested flag is set.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Unpadded payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the record on the wire, padding included.
    pub fn encoded_len(&self) -> usize {
        nla_align(NLA_HDRLEN + self.payload.len())
    }

    /// Interpret the payload as `T`.
    pub fn value<T: AttrValue>(&self) -> Result<T> {
        T::from_attr(self.kind(), &self.payload)
    }

    /// Parse the payload as a list of nested attributes.
    pub fn nested(&self) -> Result<Vec<AttributeView>> {
        parse_attributes(&self.payload)
    }

    /// Append this record (header, payload and padding) to `buf`.
    ///
    /// Nothing is written when the payload is too long for `nla_len`.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let header = NlAttr::new(self.nla_type, self.payload.len())?;
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&self.payload);
        let aligned = nla_align(buf.len());
        buf.resize(aligned, 0);
        Ok(())
    }
}

/// Parse every attribute record in `data`.
///
/// Unknown types are kept; only the record framing is validated.
pub fn parse_attributes(data: &Bytes) -> Result<Vec<AttributeView>> {
    let mut attrs = Vec::new();
    for result in AttrIter::new(data) {
        let (header, payload) = result?;
        attrs.push(AttributeView {
            nla_type: header.nla_type,
            payload: data.slice_ref(payload),
        });
    }
    Ok(attrs)
}

/// Find the first attribute of the given kind.
pub fn find(attrs: &[AttributeView], kind: u16) -> Option<&AttributeView> {
    attrs.iter().find(|a| a.kind() == kind)
}

/// Types that can be read out of an attribute payload.
///
/// Fixed-width types require an exact payload length and report
/// [`Error::SizeMismatch`] otherwise.
pub trait AttrValue: Sized {
    /// Decode a value from the payload of an attribute of type `kind`.
    fn from_attr(kind: u16, payload: &Bytes) -> Result<Self>;
}

fn exact<const N: usize>(kind: u16, payload: &[u8]) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| Error::SizeMismatch {
        kind,
        expected: N,
        actual: payload.len(),
    })
}

macro_rules! impl_attr_value_int {
    ($($ty:ty),*) => {
        $(
            impl AttrValue for $ty {
                fn from_attr(kind: u16, payload: &Bytes) -> Result<Self> {
                    Ok(<$ty>::from_ne_bytes(exact(kind, payload)?))
                }
            }
        )*
    };
}

impl_attr_value_int!(u8, u16, u32, u64, i32);

impl<const N: usize> AttrValue for [u8; N] {
    fn from_attr(kind: u16, payload: &Bytes) -> Result<Self> {
        exact(kind, payload)
    }
}

impl AttrValue for Vec<u8> {
    fn from_attr(_kind: u16, payload: &Bytes) -> Result<Self> {
        Ok(payload.to_vec())
    }
}

impl AttrValue for Bytes {
    fn from_attr(_kind: u16, payload: &Bytes) -> Result<Self> {
        Ok(payload.clone())
    }
}

impl AttrValue for String {
    fn from_attr(kind: u16, payload: &Bytes) -> Result<Self> {
        // Find null terminator or use whole buffer
        let len = payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(payload.len());
        std::str::from_utf8(&payload[..len])
            .map(str::to_owned)
            .map_err(|e| Error::InvalidAttribute(format!("attribute {}: invalid UTF-8: {}", kind, e)))
    }
}

impl AttrValue for Vec<AttributeView> {
    fn from_attr(_kind: u16, payload: &Bytes) -> Result<Self> {
        parse_attributes(payload)
    }
}
