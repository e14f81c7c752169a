#![doc = include_str!("../README.md")]

pub mod alloc;
mod error;
mod key;
mod map;
mod raw;

pub use error::Error;
pub use key::Key;
pub use map::{HashMap, HashMapBuilder, HashMapRef, Iter, Keys, ResizeMode, Values};
pub use seize::Guard;
