/*!
 * Meross cloud wire constants: endpoints, the signing prefix and the
 * `apiStatus` code table.
 */

/// Prefix mixed into every request digest
pub const SECRET_PREFIX: &str = "23x17ahWarFH6w29";

/// Returned by status parsing when no `apiStatus` could be read
pub const API_STATUS_UNKNOWN: i64 = -1;

/// HTTP endpoints of the cloud API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpEndpoint {
    /// Account sign-in
    Login,
    /// Account sign-out
    Logout,
    /// Device list of the account
    DeviceList,
}

impl HttpEndpoint {
    /// Path of the endpoint relative to the API base URL
    pub fn path(self) -> &'static str {
        match self {
            HttpEndpoint::Login => "/v1/Auth/signIn",
            HttpEndpoint::Logout => "/v1/Profile/logout",
            HttpEndpoint::DeviceList => "/v1/Device/devList",
        }
    }
}

/// Application status codes returned in the `apiStatus` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiStatusCode {
    /// Request accepted
    Ok,
    /// User missing or unknown
    WrongOrMissingUser,
    /// Password missing or wrong
    WrongOrMissingPassword,
    /// No such account
    AccountDoesNotExist,
    /// Account disabled or deleted
    AccountDisabledOrDeleted,
    /// E-mail and password do not match
    WrongEmailOrPassword,
    /// Malformed e-mail address
    InvalidEmailAddress,
    /// Password does not meet format rules
    BadPasswordFormat,
    /// E-mail not registered
    EmailNotRegistered,
    /// Token no longer valid
    TokenInvalid,
    /// Token error
    TokenError,
    /// Account lives in another region
    RedirectRegion,
    /// Multi-factor code required
    MfaCodeRequired,
    /// Multi-factor code rejected
    WrongMfaCode,
    /// Token expired
    TokenExpired,
    /// Too many tokens issued for the account
    TooManyTokens,
    /// Unspecified server failure
    GenericError,
}

impl ApiStatusCode {
    const ALL: [ApiStatusCode; 17] = [
        ApiStatusCode::Ok,
        ApiStatusCode::WrongOrMissingUser,
        ApiStatusCode::WrongOrMissingPassword,
        ApiStatusCode::AccountDoesNotExist,
        ApiStatusCode::AccountDisabledOrDeleted,
        ApiStatusCode::WrongEmailOrPassword,
        ApiStatusCode::InvalidEmailAddress,
        ApiStatusCode::BadPasswordFormat,
        ApiStatusCode::EmailNotRegistered,
        ApiStatusCode::TokenInvalid,
        ApiStatusCode::TokenError,
        ApiStatusCode::RedirectRegion,
        ApiStatusCode::MfaCodeRequired,
        ApiStatusCode::WrongMfaCode,
        ApiStatusCode::TokenExpired,
        ApiStatusCode::TooManyTokens,
        ApiStatusCode::GenericError,
    ];

    /// Numeric value as sent by the server
    pub fn code(self) -> i64 {
        match self {
            ApiStatusCode::Ok => 0,
            ApiStatusCode::WrongOrMissingUser => 1000,
            ApiStatusCode::WrongOrMissingPassword => 1001,
            ApiStatusCode::AccountDoesNotExist => 1002,
            ApiStatusCode::AccountDisabledOrDeleted => 1003,
            ApiStatusCode::WrongEmailOrPassword => 1004,
            ApiStatusCode::InvalidEmailAddress => 1005,
            ApiStatusCode::BadPasswordFormat => 1006,
            ApiStatusCode::EmailNotRegistered => 1008,
            ApiStatusCode::TokenInvalid => 1019,
            ApiStatusCode::TokenError => 1022,
            ApiStatusCode::RedirectRegion => 1030,
            ApiStatusCode::MfaCodeRequired => 1032,
            ApiStatusCode::WrongMfaCode => 1033,
            ApiStatusCode::TokenExpired => 1200,
            ApiStatusCode::TooManyTokens => 1301,
            ApiStatusCode::GenericError => 5000,
        }
    }

    /// Human readable message for the code
    pub fn message(self) -> &'static str {
        match self {
            ApiStatusCode::Ok => "Not an error",
            ApiStatusCode::WrongOrMissingUser => "Wrong or missing user",
            ApiStatusCode::WrongOrMissingPassword => "Wrong or missing password",
            ApiStatusCode::AccountDoesNotExist => "Account does not exist",
            ApiStatusCode::AccountDisabledOrDeleted => "This account has been disabled or deleted",
            ApiStatusCode::WrongEmailOrPassword => "Wrong email or password",
            ApiStatusCode::InvalidEmailAddress => "Invalid email address",
            ApiStatusCode::BadPasswordFormat => "Bad password format",
            ApiStatusCode::EmailNotRegistered => "This email is not registered",
            ApiStatusCode::TokenInvalid => "Invalid token",
            ApiStatusCode::TokenError => "Token error",
            ApiStatusCode::RedirectRegion => "Account belongs to a different region",
            ApiStatusCode::MfaCodeRequired => "Multi-factor authentication code required",
            ApiStatusCode::WrongMfaCode => "Wrong multi-factor authentication code",
            ApiStatusCode::TokenExpired => "Token expired",
            ApiStatusCode::TooManyTokens => "Too many tokens",
            ApiStatusCode::GenericError => "Unknown or generic error",
        }
    }

    /// Look up a code received from the server
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Message for a raw code, if the code is known
    pub fn message_for(code: i64) -> Option<&'static str> {
        Self::from_code(code).map(Self::message)
    }
}
