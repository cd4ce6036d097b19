//! Gemini response status codes and their classes.
//!
//! # Design
//! `Status` is a two-digit code that can only be constructed inside
//! `10..=69`, so `class()` is total: every status maps to one of the six
//! `StatusClass` variants by its tens digit. Codes without a name of their
//! own (e.g. `25`) still classify, and display with their class's canonical
//! name instead.

use std::fmt;

use crate::error::GeminiError;

/// A Gemini response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Status(u8);

impl Status {
    pub const INPUT: Status = Status(10);
    pub const SENSITIVE_INPUT: Status = Status(11);
    pub const SUCCESS: Status = Status(20);
    pub const REDIRECT: Status = Status(30);
    pub const PERMANENT_REDIRECT: Status = Status(31);
    pub const TEMPORARY_FAILURE: Status = Status(40);
    pub const SERVER_UNAVAILABLE: Status = Status(41);
    pub const CGI_ERROR: Status = Status(42);
    pub const PROXY_ERROR: Status = Status(43);
    pub const SLOW_DOWN: Status = Status(44);
    pub const PERMANENT_FAILURE: Status = Status(50);
    pub const NOT_FOUND: Status = Status(51);
    pub const GONE: Status = Status(52);
    pub const PROXY_REQUEST_REFUSED: Status = Status(53);
    pub const BAD_REQUEST: Status = Status(59);
    pub const CERTIFICATE_REQUIRED: Status = Status(60);
    pub const CERTIFICATE_NOT_AUTHORIZED: Status = Status(61);
    pub const CERTIFICATE_NOT_VALID: Status = Status(62);

    /// Build a status from its numeric code, rejecting anything outside `10..=69`.
    pub fn new(code: u8) -> Result<Self, GeminiError> {
        if (10..70).contains(&code) {
            Ok(Status(code))
        } else {
            Err(GeminiError::InvalidStatus)
        }
    }

    /// Parse the two ASCII digits of a response header.
    pub fn from_digits(digits: [u8; 2]) -> Result<Self, GeminiError> {
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(GeminiError::InvalidStatus);
        }
        Status::new((digits[0] - b'0') * 10 + (digits[1] - b'0'))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn class(self) -> StatusClass {
        match self.0 / 10 {
            1 => StatusClass::Input,
            2 => StatusClass::Success,
            3 => StatusClass::Redirect,
            4 => StatusClass::TemporaryFailure,
            5 => StatusClass::PermanentFailure,
            _ => StatusClass::CertificateRequired,
        }
    }

    /// Name of this exact code, if it has one.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            10 => "INPUT",
            11 => "SENSITIVE INPUT",
            20 => "SUCCESS",
            30 => "REDIRECT - TEMPORARY",
            31 => "REDIRECT - PERMANENT",
            40 => "TEMPORARY FAILURE",
            41 => "SERVER UNAVAILABLE",
            42 => "CGI ERROR",
            43 => "PROXY ERROR",
            44 => "SLOW DOWN",
            50 => "PERMANENT FAILURE",
            51 => "NOT FOUND",
            52 => "GONE",
            53 => "PROXY REQUEST REFUSED",
            59 => "BAD REQUEST",
            60 => "CLIENT CERTIFICATE REQUIRED",
            61 => "CERTIFICATE NOT AUTHORIZED",
            62 => "CERTIFICATE NOT VALID",
            _ => return None,
        };
        Some(name)
    }

    /// Human-readable description: the numeric code followed by the exact
    /// name, else the class name, else nothing.
    pub fn describe(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .name()
            .or_else(|| Status(self.class() as u8 * 10).name())
            .unwrap_or("");
        write!(f, "{} {}", self.0, name)
    }
}

impl TryFrom<u8> for Status {
    type Error = GeminiError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Status::new(code)
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        status.0
    }
}

/// The tens digit of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Input = 1,
    Success = 2,
    Redirect = 3,
    TemporaryFailure = 4,
    PermanentFailure = 5,
    CertificateRequired = 6,
}
