//! §3: a hardware adapter's line-ending policy, one of `None | NUL | LF |
//! CRLF | CR`.

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::Display, strum_macros::EnumString)]
pub enum LineEnding {
    None,
    #[strum(serialize = "NUL")]
    Nul,
    #[strum(serialize = "LF")]
    Lf,
    #[strum(serialize = "CRLF")]
    CrLf,
    #[strum(serialize = "CR")]
    Cr,
}

impl LineEnding {
    /// The raw terminator bytes appended after every write, and scanned
    /// for to delimit a complete line on read. `None` never terminates a
    /// line — `ReadLine` on a `None`-terminated adapter never completes.
    #[must_use]
    pub fn bytes(self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Nul => b"\0",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::Cr => b"\r",
        }
    }
}
