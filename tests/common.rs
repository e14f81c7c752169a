#![allow(dead_code)]

use probemap::{HashMap, Key, ResizeMode};

// Run the test on different configurations of a `HashMap`.
pub fn with_map<K: Key, V: Copy>(mut test: impl FnMut(&dyn Fn() -> HashMap<K, V>)) {
    // Blocking resize mode.
    if !cfg!(probemap_stress) {
        test(&(|| HashMap::builder().resize_mode(ResizeMode::Blocking).build()));
    }

    // Draining resize mode.
    test(&(|| HashMap::builder().resize_mode(ResizeMode::Drain).build()));

    // Draining resize mode on the smallest table, so that almost every insert
    // races with a resize.
    test(
        &(|| {
            HashMap::builder()
                .size_degree(2)
                .resize_mode(ResizeMode::Drain)
                .build()
        }),
    );
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two()
    }
}
