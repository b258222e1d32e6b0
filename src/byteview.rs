//! Provides an immutable view over a cached byte sequence.
//!
//! A [ByteView] is the value type stored in every group cache. Once
//! constructed, the underlying buffer can never be modified again, therefore
//! views can be shared freely between the cache, concurrent readers and the
//! peer transport without any locking. Cloning a view is cheap as only a
//! reference counted handle is copied.
//!
//! Reading the contents always yields a fresh copy via [to_vec](ByteView::to_vec)
//! so that no caller can ever alias the buffer held by the cache.
use crate::lru::ByteSize;
use bytes::Bytes;
use std::fmt;

/// An immutable view of a cached value.
///
/// # Examples
/// ```
/// # use callisto::byteview::ByteView;
/// let view = ByteView::new(b"630".to_vec());
/// assert_eq!(view.len(), 3);
/// assert_eq!(view.to_vec(), b"630".to_vec());
/// assert_eq!(view.to_string(), "630");
/// ```
#[derive(Clone)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Creates a view which takes ownership of the given bytes.
    ///
    /// As the buffer is moved in, exclusivity is guaranteed without copying.
    pub fn new(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }

    /// Creates a view holding a defensive copy of the given slice.
    pub fn copy_from(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the length of the viewed data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the view is empty.
    ///
    /// Note that an empty view is still a perfectly valid cacheable value.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a fresh copy of the viewed data.
    ///
    /// The returned buffer is owned by the caller and never aliases the
    /// buffer held by the cache.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl ByteSize for ByteView {
    fn byte_size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteView({} bytes)", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::ByteView;
    use crate::lru::ByteSize;

    #[test]
    fn views_report_their_length() {
        assert_eq!(ByteView::new(b"hello".to_vec()).len(), 5);
        assert_eq!(ByteView::new(Vec::new()).len(), 0);
        assert!(ByteView::new(Vec::new()).is_empty());
        assert_eq!(ByteView::new(b"hello".to_vec()).byte_size(), 5);
    }

    #[test]
    fn reading_yields_an_unaliased_copy() {
        let source = b"immutable".to_vec();
        let view = ByteView::copy_from(&source);

        let mut copy = view.to_vec();
        assert_eq!(copy, source);

        // Mutating the copy must not affect the view...
        copy[0] = b'X';
        assert_eq!(view.to_vec(), source);
    }

    #[test]
    fn clones_share_the_same_contents() {
        let view = ByteView::new(b"shared".to_vec());
        let clone = view.clone();

        assert_eq!(view.to_vec(), clone.to_vec());
        assert_eq!(clone.to_string(), "shared");
    }
}
