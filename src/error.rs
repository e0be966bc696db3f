// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Crate-wide error type.
//!
//! Every error that can surface from reading a SquashFS image funnels
//! through this one enum. There are no retries anywhere in this crate:
//! the image is immutable, so a failed read or a violated invariant is
//! final.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a SquashFS image (bad magic)")]
    BadMagic,

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("corrupt image: {0}")]
    CorruptImage(&'static str),

    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotDir,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A cheap way to attach a static reason to a `CorruptImage` error at
/// the call site, e.g. `bail_corrupt!("block overruns table bound")`.
macro_rules! corrupt {
    ($msg:expr) => {
        return Err($crate::error::Error::CorruptImage($msg))
    };
}
pub(crate) use corrupt;

impl Error {
    /// A single-line, user-facing rendering, used by the CLI.
    pub fn short_message(&self) -> String {
        match self {
            Error::Io(e) => format!("I/O error: {e}"),
            other => other.to_string(),
        }
    }
}
