use std::io;

/// Boundary error type for the tag codec.
///
/// Internal helpers propagate `anyhow::Error` with rich context chains
/// (the teacher's idiom throughout the reader/writer/schema code); these
/// get funneled into one of the named kinds below only at the public
/// entry points, so callers can match on a closed, stable set of outcomes
/// instead of parsing error strings.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad section signature: expected one of {expected:?}, got {found:?}")]
    BadSignature {
        expected: &'static [&'static str],
        found: [u8; 4],
    },

    #[error("unsupported SDK version {0:?}")]
    UnsupportedSdkVersion(Box<str>),

    #[error("TCRF section present but no compendium was supplied")]
    MissingCompendium,

    #[error("compendium does not contain id {0:02x?}")]
    UnknownCompendiumId([u8; 8]),

    #[error("malformed schema: {0}")]
    MalformedSchema(Box<str>),

    #[error("type has the unknown-flag bit (0x80) set")]
    UnknownTypeFlag,

    #[error("pointer item has more than one element")]
    MalformedPointer,

    #[error("type {0:?} not found")]
    TypeNotFound(Box<str>),

    #[error("member {member:?} expected type {expected:?}, found {found:?}")]
    MemberTypeMismatch {
        member: Box<str>,
        expected: Box<str>,
        found: Box<str>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("xml error: {0}")]
    Xml(Box<str>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error::Xml(value.to_string().into_boxed_str())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(value.to_string().into_boxed_str())
    }
}
