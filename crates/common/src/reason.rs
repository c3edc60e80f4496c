use std::fmt::{self, Display};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Client-visible rejection reasons.
///
/// The wire form is the SCREAMING_SNAKE_CASE variant name given by
///  [`ErrorCode::as_str`], used for both Display and serde. Clients map
///  these to localized strings on their side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnavailableData,
    UnavailableToken,
    UnavailableProgram,
    UnavailableDirectory,
    UnavailablePath,
    UnavailableName,
    UnavailableNid,
    UnavailableMtimems,
    UnavailableBirthtimems,
    UnavailableSize,
    TooManyRequests,
    TooBigSize,
    CapacityFull,
    SendExceeded,
    StreamNotOpened,
    NotRegistered,
    AlreadyRegistered,
    NotExists,
    AlreadyCreatedProgram,
    AlreadyCreatedDirectory,
    FileUnsafe,
    UnknownError,
    BadRequest,
    ServerError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 24] = [
        ErrorCode::UnavailableData,
        ErrorCode::UnavailableToken,
        ErrorCode::UnavailableProgram,
        ErrorCode::UnavailableDirectory,
        ErrorCode::UnavailablePath,
        ErrorCode::UnavailableName,
        ErrorCode::UnavailableNid,
        ErrorCode::UnavailableMtimems,
        ErrorCode::UnavailableBirthtimems,
        ErrorCode::UnavailableSize,
        ErrorCode::TooManyRequests,
        ErrorCode::TooBigSize,
        ErrorCode::CapacityFull,
        ErrorCode::SendExceeded,
        ErrorCode::StreamNotOpened,
        ErrorCode::NotRegistered,
        ErrorCode::AlreadyRegistered,
        ErrorCode::NotExists,
        ErrorCode::AlreadyCreatedProgram,
        ErrorCode::AlreadyCreatedDirectory,
        ErrorCode::FileUnsafe,
        ErrorCode::UnknownError,
        ErrorCode::BadRequest,
        ErrorCode::ServerError,
    ];

    /// Look a code up by its wire form
    pub fn from_wire(name: &str) -> Option<ErrorCode> {
        ErrorCode::ALL.into_iter().find(|code| code.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnavailableData => "UNAVAILABLE_DATA",
            ErrorCode::UnavailableToken => "UNAVAILABLE_TOKEN",
            ErrorCode::UnavailableProgram => "UNAVAILABLE_PROGRAM",
            ErrorCode::UnavailableDirectory => "UNAVAILABLE_DIRECTORY",
            ErrorCode::UnavailablePath => "UNAVAILABLE_PATH",
            ErrorCode::UnavailableName => "UNAVAILABLE_NAME",
            ErrorCode::UnavailableNid => "UNAVAILABLE_NID",
            ErrorCode::UnavailableMtimems => "UNAVAILABLE_MTIMEMS",
            ErrorCode::UnavailableBirthtimems => "UNAVAILABLE_BIRTHTIMEMS",
            ErrorCode::UnavailableSize => "UNAVAILABLE_SIZE",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::TooBigSize => "TOO_BIG_SIZE",
            ErrorCode::CapacityFull => "CAPACITY_FULL",
            ErrorCode::SendExceeded => "SEND_EXCEEDED",
            ErrorCode::StreamNotOpened => "STREAM_NOT_OPENED",
            ErrorCode::NotRegistered => "NOT_REGISTERED",
            ErrorCode::AlreadyRegistered => "ALREADY_REGISTERED",
            ErrorCode::NotExists => "NOT_EXISTS",
            ErrorCode::AlreadyCreatedProgram => "ALREADY_CREATED_PROGRAM",
            ErrorCode::AlreadyCreatedDirectory => "ALREADY_CREATED_DIRECTORY",
            ErrorCode::FileUnsafe => "FILE_UNSAFE",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ErrorCode::from_wire(&name)
            .ok_or_else(|| de::Error::custom(format!("unknown reason `{name}`")))
    }
}
