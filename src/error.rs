/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

use snafu::Snafu;

/// Errors reported by the trie core.
///
/// Mirrors the four error kinds a caller used to a C-style negative errno
/// ABI would expect; [`Error::as_errno`] recovers that vocabulary for
/// callers that want it, but `Result<_, Error>` is the crate's primary idiom.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("invalid argument"))]
    InvalidArgument,

    #[snafu(display("prefix not found"))]
    NotFound,

    #[snafu(display("tbl8 pool exhausted"))]
    OutOfSpace,

    #[snafu(display("requested lookup implementation is unavailable on this host"))]
    Unavailable,
}

impl Error {
    /// The negative POSIX code this error kind corresponds to in the
    /// reference vocabulary (`-EINVAL`, `-ENOENT`, `-ENOSPC`). `Unavailable`
    /// has no direct RIB/FIB ABI counterpart; `-ENOTSUP` is used for it.
    pub fn as_errno(self) -> i32 {
        match self {
            Error::InvalidArgument => -22, // EINVAL
            Error::NotFound => -2,         // ENOENT
            Error::OutOfSpace => -28,      // ENOSPC
            Error::Unavailable => -95,     // ENOTSUP
        }
    }
}
