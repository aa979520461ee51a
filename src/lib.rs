/// Progress line on stderr, printed only when stderr is a terminal so JSON on
/// stdout stays machine-readable.
///
/// ```ignore
/// log_status!("release", "Uploading {} to {}", release_id, host);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if ::std::io::IsTerminal::is_terminal(&::std::io::stderr()) {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

pub mod core;
pub mod utils;

// `deckhand::release`, `deckhand::shell`, ... rather than `deckhand::core::release`.
pub use core::*;
pub use utils::*;
