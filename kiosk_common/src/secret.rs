use std::fmt::{self, Debug, Display};

const REDACTED: &str = "****";

/// Wrapper that keeps credentials (API keys, bot tokens) out of logs and error messages.
///
/// Both `Debug` and `Display` print a fixed mask; the only way to get at the value is an explicit
/// [`reveal`](Secret::reveal) call, which makes accidental leaks easy to grep for.
#[derive(Clone, Default)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}
