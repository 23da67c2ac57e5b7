// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fatal-contract-violation trap and the recoverable error surface.
// The C source's `OS_TRAP()` prints file/function/line then aborts; this
// crate's `trap!` does the Rust equivalent with `panic!`, and `trap_if!`
// mirrors `OS_TRAP_IF(cond)`.

use thiserror::Error;

/// Panics with a file/line diagnostic, matching the source's `OS_TRAP()`.
#[macro_export]
macro_rules! trap {
    ($($arg:tt)*) => {
        panic!("van: contract violation at {}:{}: {}", file!(), line!(), format!($($arg)*))
    };
}

/// Panics with a file/line diagnostic if `cond` holds, matching `OS_TRAP_IF(cond)`.
#[macro_export]
macro_rules! trap_if {
    ($cond:expr, $($arg:tt)*) => {
        if $cond {
            $crate::trap!($($arg)*);
        }
    };
}

/// Recoverable errors surfaced by the public cable/buffered API.
///
/// Contract violations and OS failures are not part of this type — they
/// `panic!` via [`trap!`], matching the source's unconditional abort
/// convention. `CableError` only distinguishes the recoverable cases the
/// public API must expose: an OS-level setup failure during `init`/`open`.
#[derive(Debug, Error)]
pub enum CableError {
    #[error("endpoint {0:?} is unknown")]
    UnknownEndpoint(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
