//! Logging macros
//!
//! Forward to `defmt` on target builds and to `tracing` on host builds.
//! With neither feature enabled the arguments are evaluated and dropped.

#![macro_use]
#![allow(unused_macros)]

macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(feature = "tracing")]
            ::tracing::$level!($s $(, $x)*);
            #[cfg(not(any(feature = "defmt", feature = "tracing")))]
            let _ = ($( &$x, )*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { log_at!(trace, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_at!(debug, $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { log_at!(info, $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_at!(warn, $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { log_at!(error, $($arg)*) };
}
