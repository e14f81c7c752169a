use std::fmt::Debug;
use std::hash::Hash;

/// A key that can be stored in a [`HashMap`](crate::HashMap).
///
/// Keys are stored inline in the table, and one value of the key type, [`Key::ZERO`],
/// doubles as the marker for an empty slot. An entry whose key equals `ZERO` is kept
/// in a dedicated side slot instead of the main buffer.
pub trait Key: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// The value that marks an empty slot.
    const ZERO: Self;

    /// Returns `true` if this key is the empty-slot marker.
    #[inline]
    fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

macro_rules! impl_key {
    ($($ty:ty),*) => {
        $(
            impl Key for $ty {
                const ZERO: $ty = 0;
            }
        )*
    };
}

impl_key!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
