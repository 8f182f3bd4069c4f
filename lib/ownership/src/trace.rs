//! Lifecycle logging.

/// Trace-level `log!` that only exists with the `trace` feature.
/// Counter paths stay free of logging in the default build.
macro_rules! trace_ex {
    // trace_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(feature = "trace")]
        {
            use log::{log, Level};
            log!(target: $target, Level::Trace, $($arg)+)
        }
    };

    // trace_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(feature = "trace")]
        {
            use log::{log, Level};
            log!(Level::Trace, $($arg)+)
        }
    };
}

pub(crate) use trace_ex;
