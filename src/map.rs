use crate::alloc::{Allocator, StepAllocator};
use crate::raw::{self, Grower};
use crate::{Error, Key};
use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::marker::PhantomData;

/// A concurrent, insert-only hash table.
///
/// Most hash table operations require a [`Guard`](crate::Guard), which can be acquired through
/// [`HashMap::guard`] or using the [`HashMap::pin`] API. See the [crate-level documentation](crate#usage)
/// for details.
///
/// Keys are integers (see [`Key`]) and values are `Copy`: entries are stored inline and moved
/// bitwise when the table grows.
pub struct HashMap<K, V, S = RandomState, A: Allocator = StepAllocator> {
    raw: raw::HashMap<K, V, S, A>,
}

/// Resize behavior for a [`HashMap`].
///
/// Growing the table requires a moment where no insert is probing it. The resize mode decides
/// how new inserts are treated while a resize waits for that moment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Keep admitting inserts until the number of in-flight inserts drains to zero, and only
    /// then close the table to new inserts for the copy.
    ///
    /// Inserts are never delayed by a resize that is still waiting, but under a steady stream
    /// of inserts the resize may wait for a long time, and the table can fill past its load
    /// threshold in the meantime.
    #[default]
    Drain,

    /// Close the table to new inserts as soon as a resize starts, and wait only for the
    /// inserts that are already in flight.
    ///
    /// A resize can never be starved, at the cost of briefly blocking inserts that arrive
    /// while it waits.
    Blocking,
}

/// A builder for a [`HashMap`].
///
/// # Examples
///
/// ```rust
/// use probemap::{HashMap, ResizeMode};
/// use probemap::alloc::StepAllocator;
/// use seize::Collector;
/// use std::collections::hash_map::RandomState;
///
/// let map: HashMap<u64, u32> = HashMap::builder()
///     // Set the initial capacity.
///     .capacity(2048)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Set the allocator for table buffers.
///     .allocator(StepAllocator::new())
///     // Set the resize mode.
///     .resize_mode(ResizeMode::Blocking)
///     // Set a custom garbage collector.
///     .collector(Collector::new().batch_size(128))
///     // Construct the hash map.
///     .build();
/// ```
pub struct HashMapBuilder<K, V, S = RandomState, A = StepAllocator> {
    hasher: S,
    alloc: A,
    grower: Grower,
    collector: Collector,
    resize_mode: ResizeMode,
    _kv: PhantomData<(K, V)>,
}

impl<K, V, S, A> HashMapBuilder<K, V, S, A> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashMaps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    ///
    /// The `hash_builder` passed should implement the [`BuildHasher`] trait for
    /// the HashMap to be useful, see its documentation for details.
    pub fn hasher<H>(self, hasher: H) -> HashMapBuilder<K, V, H, A> {
        HashMapBuilder {
            hasher,
            alloc: self.alloc,
            grower: self.grower,
            collector: self.collector,
            resize_mode: self.resize_mode,
            _kv: PhantomData,
        }
    }

    /// Set the allocator used for the table's buffers.
    pub fn allocator<B>(self, alloc: B) -> HashMapBuilder<K, V, S, B> {
        HashMapBuilder {
            alloc,
            hasher: self.hasher,
            grower: self.grower,
            collector: self.collector,
            resize_mode: self.resize_mode,
            _kv: PhantomData,
        }
    }

    /// Set the initial capacity of the map.
    ///
    /// The map will be able to hold `capacity` entries before resizing. A table is
    /// considered full at half of its cells, so the table is sized to the smallest
    /// power of two above twice the capacity.
    pub fn capacity(self, capacity: usize) -> Self {
        HashMapBuilder {
            grower: Grower::for_entries(capacity),
            ..self
        }
    }

    /// Set the initial size of the table as a power of two, `2^size_degree` cells.
    ///
    /// # Panics
    ///
    /// Panics if `size_degree` is smaller than 2, or so large that the table size
    /// would overflow `isize`.
    pub fn size_degree(self, size_degree: u8) -> Self {
        HashMapBuilder {
            grower: Grower::new(size_degree),
            ..self
        }
    }

    /// Set the resizing mode of the map. See [`ResizeMode`] for details.
    pub fn resize_mode(self, resize_mode: ResizeMode) -> Self {
        HashMapBuilder {
            resize_mode,
            ..self
        }
    }

    /// Set the [`seize::Collector`] used for garbage collection.
    ///
    /// Retired table buffers are released through the collector once no guard can
    /// observe them.
    ///
    /// Note that all `Guard` references used to access the map must be produced by
    /// the provided `collector`.
    pub fn collector(self, collector: Collector) -> Self {
        HashMapBuilder { collector, ..self }
    }
}

impl<K, V, S, A> HashMapBuilder<K, V, S, A>
where
    K: Key,
    V: Copy,
    A: Allocator + Clone,
{
    /// Construct a [`HashMap`] from the builder, using the configured options.
    ///
    /// Returns an error if the initial table could not be allocated.
    pub fn try_build(self) -> Result<HashMap<K, V, S, A>, Error> {
        let raw = raw::HashMap::new(
            self.grower,
            self.hasher,
            self.alloc,
            self.collector,
            self.resize_mode,
        )?;

        Ok(HashMap { raw })
    }

    /// Construct a [`HashMap`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the initial table could not be allocated. See [`HashMapBuilder::try_build`]
    /// for a fallible version.
    pub fn build(self) -> HashMap<K, V, S, A> {
        match self.try_build() {
            Ok(map) => map,
            Err(err) => panic!("failed to build `HashMap`: {err}"),
        }
    }
}

impl<K, V, S, A> fmt::Debug for HashMapBuilder<K, V, S, A>
where
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapBuilder")
            .field("capacity", &self.grower.capacity())
            .field("allocator", &self.alloc)
            .field("collector", &self.collector)
            .field("resize_mode", &self.resize_mode)
            .finish()
    }
}

impl<K, V> HashMap<K, V>
where
    K: Key,
    V: Copy,
{
    /// Creates an empty `HashMap`.
    ///
    /// The table is allocated eagerly with 256 cells, enough for 127 entries before
    /// it first grows.
    ///
    /// # Panics
    ///
    /// Panics if the initial table could not be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    /// let map: HashMap<u64, i32> = HashMap::new();
    /// ```
    pub fn new() -> HashMap<K, V> {
        HashMap::builder().build()
    }

    /// Creates an empty `HashMap` that can hold at least `capacity` entries before resizing.
    ///
    /// # Panics
    ///
    /// Panics if the initial table could not be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    /// let map: HashMap<u32, i32> = HashMap::with_capacity(10);
    /// ```
    pub fn with_capacity(capacity: usize) -> HashMap<K, V> {
        HashMap::builder().capacity(capacity).build()
    }

    /// Returns a builder for a `HashMap`.
    ///
    /// The builder can be used for more complex configuration, such as using
    /// a custom [`Allocator`], [`Collector`], or [`ResizeMode`].
    pub fn builder() -> HashMapBuilder<K, V> {
        HashMapBuilder {
            hasher: RandomState::new(),
            alloc: StepAllocator::new(),
            grower: Grower::default(),
            collector: Collector::new(),
            resize_mode: ResizeMode::default(),
            _kv: PhantomData,
        }
    }
}

impl<K, V> Default for HashMap<K, V>
where
    K: Key,
    V: Copy,
{
    fn default() -> Self {
        HashMap::new()
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    A: Allocator,
{
    /// Returns a pinned reference to the map.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held. See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn pin(&self) -> HashMapRef<'_, K, V, S, A, LocalGuard<'_>> {
        HashMapRef {
            guard: self.guard(),
            map: self,
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// Unlike [`HashMap::pin`], the returned reference implements `Send` and `Sync`,
    /// allowing it to be moved to or shared with other threads.
    #[inline]
    pub fn pin_owned(&self) -> HashMapRef<'_, K, V, S, A, OwnedGuard<'_>> {
        HashMapRef {
            guard: self.owned_guard(),
            map: self,
        }
    }

    /// Returns a guard for use with this map.
    ///
    /// Note that holding on to a guard prevents retired table buffers from being released.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.raw.guard()
    }

    /// Returns an owned guard for use with this map.
    ///
    /// Owned guards implement `Send` and `Sync`.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.raw.owned_guard()
    }

    /// Returns the number of entries in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    ///
    /// map.pin().insert(1, "a").unwrap();
    /// map.pin().insert(2, "b").unwrap();
    /// assert!(map.len() == 2);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert!(map.is_empty());
    /// map.pin().insert(1, "a").unwrap();
    /// assert!(!map.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of cells in the current table.
    ///
    /// The table grows once half of its cells are in use.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map: HashMap<u64, u64> = HashMap::new();
    /// assert_eq!(map.capacity(), 256);
    /// ```
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity(&self.guard())
    }

    /// Returns the size degree of the current table, the base-2 logarithm of its capacity.
    #[inline]
    pub fn size_degree(&self) -> u8 {
        self.raw.size_degree(&self.guard())
    }

    /// Returns a reference to the map's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        self.raw.hasher()
    }

    /// Returns the map's [`ResizeMode`].
    #[inline]
    pub fn resize_mode(&self) -> ResizeMode {
        self.raw.resize_mode()
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Key,
    V: Copy,
    S: BuildHasher,
    A: Allocator + Clone,
{
    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(1, "a").unwrap();
    /// assert_eq!(map.pin().contains_key(&1), true);
    /// assert_eq!(map.pin().contains_key(&2), false);
    /// ```
    #[inline]
    pub fn contains_key(&self, key: &K, guard: &impl Guard) -> bool {
        self.get(key, guard).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(1, "a").unwrap();
    /// assert_eq!(map.pin().get(&1), Some(&"a"));
    /// assert_eq!(map.pin().get(&2), None);
    /// ```
    #[inline]
    pub fn get<'g>(&'g self, key: &K, guard: &'g impl Guard) -> Option<&'g V> {
        self.get_key_value(key, guard).map(|(_, value)| value)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(1, "a").unwrap();
    /// assert_eq!(map.pin().get_key_value(&1), Some((&1, &"a")));
    /// assert_eq!(map.pin().get_key_value(&2), None);
    /// ```
    #[inline]
    pub fn get_key_value<'g>(&'g self, key: &K, guard: &'g impl Guard) -> Option<(&'g K, &'g V)> {
        self.raw.verify(guard);
        self.raw.find(key, guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns the value stored for the key, and `true` if this call inserted it. If the
    /// map already contained the key, the existing value is kept and returned along with
    /// `false`.
    ///
    /// An insert that fills the table to half of its capacity grows the table before
    /// returning. If the larger table cannot be allocated an error is returned; the table
    /// keeps its current capacity and every entry, including the one being inserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert_eq!(map.pin().insert(37, "a"), Ok((&"a", true)));
    /// assert_eq!(map.pin().is_empty(), false);
    ///
    /// assert_eq!(map.pin().insert(37, "b"), Ok((&"a", false)));
    /// assert_eq!(map.pin().get(&37), Some(&"a"));
    /// ```
    #[inline]
    pub fn insert<'g>(
        &'g self,
        key: K,
        value: V,
        guard: &'g impl Guard,
    ) -> Result<(&'g V, bool), Error> {
        self.raw.verify(guard);
        self.raw.insert(key, value, guard)
    }

    /// Removes a key from the map.
    ///
    /// Entries cannot be removed from a concurrent `HashMap`, so this always returns
    /// [`Error::Unsupported`].
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::{Error, HashMap};
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(1, "a").unwrap();
    /// assert_eq!(map.pin().erase(&1), Err(Error::Unsupported { operation: "erase" }));
    /// assert_eq!(map.pin().get(&1), Some(&"a"));
    /// ```
    #[inline]
    pub fn erase(&self, key: &K, guard: &impl Guard) -> Result<bool, Error> {
        self.raw.verify(guard);
        self.raw.erase(key)
    }

    /// Clears the map, removing all entries while keeping the allocated capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let mut map = HashMap::new();
    ///
    /// map.pin().insert(1, "a").unwrap();
    /// map.clear();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    pub fn clear(&mut self) {
        self.raw.clear()
    }

    /// An iterator visiting all key-value pairs.
    /// The iterator element type is `(&K, &V)`.
    ///
    /// The entry for the zero key, if present, is yielded first, followed by the other
    /// entries in table order. The iterator observes the table as it was when the
    /// iterator was created.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(3, "c").unwrap();
    /// map.pin().insert(0, "zero").unwrap();
    ///
    /// let m = map.pin();
    /// let mut iter = m.iter();
    /// assert_eq!(iter.next(), Some((&0, &"zero")));
    /// assert_eq!(iter.next(), Some((&3, &"c")));
    /// assert_eq!(iter.next(), None);
    /// ```
    #[inline]
    pub fn iter<'g>(&'g self, guard: &'g impl Guard) -> Iter<'g, K, V, A> {
        self.raw.verify(guard);

        Iter {
            raw: self.raw.iter(guard),
        }
    }

    /// An iterator visiting all keys.
    /// The iterator element type is `&K`.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(1, 'a').unwrap();
    /// map.pin().insert(2, 'b').unwrap();
    ///
    /// let mut keys: Vec<u8> = map.pin().keys().copied().collect();
    /// keys.sort();
    /// assert_eq!(keys, [1, 2]);
    /// ```
    #[inline]
    pub fn keys<'g>(&'g self, guard: &'g impl Guard) -> Keys<'g, K, V, A> {
        Keys {
            iter: self.iter(guard),
        }
    }

    /// An iterator visiting all values.
    /// The iterator element type is `&V`.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().insert(1, 'a').unwrap();
    /// map.pin().insert(2, 'b').unwrap();
    ///
    /// let mut values: Vec<char> = map.pin().values().copied().collect();
    /// values.sort();
    /// assert_eq!(values, ['a', 'b']);
    /// ```
    #[inline]
    pub fn values<'g>(&'g self, guard: &'g impl Guard) -> Values<'g, K, V, A> {
        Values {
            iter: self.iter(guard),
        }
    }
}

impl<K, V, S, A> PartialEq for HashMap<K, V, S, A>
where
    K: Key,
    V: Copy + PartialEq,
    S: BuildHasher,
    A: Allocator + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        let (guard1, guard2) = (&self.guard(), &other.guard());

        let mut iter = self.iter(guard1);
        iter.all(|(key, value)| other.get(key, guard2) == Some(value))
    }
}

impl<K, V, S, A> Eq for HashMap<K, V, S, A>
where
    K: Key,
    V: Copy + Eq,
    S: BuildHasher,
    A: Allocator + Clone,
{
}

impl<K, V, S, A> fmt::Debug for HashMap<K, V, S, A>
where
    K: Key,
    V: Copy + fmt::Debug,
    S: BuildHasher,
    A: Allocator + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.guard();
        f.debug_map().entries(self.iter(&guard)).finish()
    }
}

/// A pinned reference to a [`HashMap`].
///
/// This type is created with [`HashMap::pin`] and can be used to easily access a [`HashMap`]
/// without explicitly managing a guard. See the [crate-level documentation](crate#usage) for details.
pub struct HashMapRef<'map, K, V, S, A: Allocator, G> {
    guard: G,
    map: &'map HashMap<K, V, S, A>,
}

impl<'map, K, V, S, A, G> HashMapRef<'map, K, V, S, A, G>
where
    K: Key,
    V: Copy,
    S: BuildHasher,
    A: Allocator + Clone,
    G: Guard,
{
    /// Returns a reference to the inner [`HashMap`].
    #[inline]
    pub fn map(&self) -> &'map HashMap<K, V, S, A> {
        self.map
    }

    /// Returns the number of entries in the map.
    ///
    /// See [`HashMap::len`] for details.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// See [`HashMap::is_empty`] for details.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of cells in the current table.
    ///
    /// See [`HashMap::capacity`] for details.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.raw.capacity(&self.guard)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// See [`HashMap::contains_key`] for details.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// See [`HashMap::get`] for details.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    ///
    /// See [`HashMap::get_key_value`] for details.
    #[inline]
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        // `self.guard` was created from our map.
        self.map.raw.find(key, &self.guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// See [`HashMap::insert`] for details.
    #[inline]
    pub fn insert(&self, key: K, value: V) -> Result<(&V, bool), Error> {
        self.map.raw.insert(key, value, &self.guard)
    }

    /// Removes a key from the map.
    ///
    /// See [`HashMap::erase`] for details.
    #[inline]
    pub fn erase(&self, key: &K) -> Result<bool, Error> {
        self.map.raw.erase(key)
    }

    /// An iterator visiting all key-value pairs.
    ///
    /// See [`HashMap::iter`] for details.
    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V, A> {
        Iter {
            raw: self.map.raw.iter(&self.guard),
        }
    }

    /// An iterator visiting all keys.
    ///
    /// See [`HashMap::keys`] for details.
    #[inline]
    pub fn keys(&self) -> Keys<'_, K, V, A> {
        Keys { iter: self.iter() }
    }

    /// An iterator visiting all values.
    ///
    /// See [`HashMap::values`] for details.
    #[inline]
    pub fn values(&self) -> Values<'_, K, V, A> {
        Values { iter: self.iter() }
    }
}

impl<K, V, S, A, G> fmt::Debug for HashMapRef<'_, K, V, S, A, G>
where
    K: Key,
    V: Copy + fmt::Debug,
    S: BuildHasher,
    A: Allocator + Clone,
    G: Guard,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S, A, G> IntoIterator for &'a HashMapRef<'_, K, V, S, A, G>
where
    K: Key,
    V: Copy,
    S: BuildHasher,
    A: Allocator + Clone,
    G: Guard,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over a map's entries.
///
/// This struct is created by the [`iter`](HashMap::iter) method on [`HashMap`]. See its documentation for details.
pub struct Iter<'g, K, V, A = StepAllocator> {
    raw: raw::Iter<'g, K, V, A>,
}

impl<'g, K, V, A> Iterator for Iter<'g, K, V, A>
where
    K: Key,
    V: Copy,
{
    type Item = (&'g K, &'g V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }
}

impl<K, V, A> fmt::Debug for Iter<'_, K, V, A>
where
    K: Key,
    V: Copy + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(Iter {
                raw: self.raw.clone(),
            })
            .finish()
    }
}

/// An iterator over a map's keys.
///
/// This struct is created by the [`keys`](HashMap::keys) method on [`HashMap`]. See its documentation for details.
pub struct Keys<'g, K, V, A = StepAllocator> {
    iter: Iter<'g, K, V, A>,
}

impl<'g, K, V, A> Iterator for Keys<'g, K, V, A>
where
    K: Key,
    V: Copy,
{
    type Item = &'g K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (key, _) = self.iter.next()?;
        Some(key)
    }
}

impl<K, V, A> fmt::Debug for Keys<'_, K, V, A>
where
    K: Key,
    V: Copy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(Keys {
                iter: Iter {
                    raw: self.iter.raw.clone(),
                },
            })
            .finish()
    }
}

/// An iterator over a map's values.
///
/// This struct is created by the [`values`](HashMap::values) method on [`HashMap`]. See its documentation for details.
pub struct Values<'g, K, V, A = StepAllocator> {
    iter: Iter<'g, K, V, A>,
}

impl<'g, K, V, A> Iterator for Values<'g, K, V, A>
where
    K: Key,
    V: Copy,
{
    type Item = &'g V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (_, value) = self.iter.next()?;
        Some(value)
    }
}

impl<K, V, A> fmt::Debug for Values<'_, K, V, A>
where
    K: Key,
    V: Copy + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(Values {
                iter: Iter {
                    raw: self.iter.raw.clone(),
                },
            })
            .finish()
    }
}
