use std::{
    fmt::{self, Debug, Formatter},
    ops::Deref,
};

/// An owned byte region produced by a receive operation.
///
/// The storage is released when the value is dropped, by the same allocator
/// that produced it. The library keeps no reference to the contents after
/// handing a `Buffer` to the caller.
pub struct Buffer {
    bytes: Box<[u8]>,
}
impl Buffer {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: bytes.into_boxed_slice() }
    }
    /// Borrows the message contents.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.bytes
    }
    /// Returns the length of the message in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
    /// Consumes the buffer, returning its contents.
    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}
impl Deref for Buffer {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}
impl AsRef<[u8]> for Buffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("size", &self.size()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::Buffer;

    #[test]
    fn accessors_match_contents() {
        let buf = Buffer::new(vec![1, 2, 3, 4]);
        assert_eq!(buf.size(), 4, "size must equal the payload length");
        assert_eq!(buf.data(), &[1, 2, 3, 4], "data must round-trip unchanged");
        assert_eq!(&*buf, buf.as_ref(), "Deref and AsRef must agree");
    }

    #[test]
    fn empty_buffer_is_representable() {
        let buf = Buffer::new(Vec::new());
        assert_eq!(buf.size(), 0, "zero-length payloads are legal");
        assert!(buf.data().is_empty(), "zero-length payloads are legal");
    }
}
