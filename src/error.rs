use thiserror::Error;

/// Errors returned by map and allocator operations.
///
/// A key that is already present is not an error: [`HashMap::insert`](crate::HashMap::insert)
/// reports it through the `bool` it returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A heap allocation, memory mapping, or remap of `size` bytes failed.
    #[error("failed to allocate {size} bytes")]
    Alloc { size: usize },

    /// Unmapping a region of `size` bytes failed.
    #[error("failed to unmap {size} bytes")]
    Unmap { size: usize },

    /// The operation is not supported by this map.
    #[error("`{operation}` is not supported")]
    Unsupported { operation: &'static str },
}
