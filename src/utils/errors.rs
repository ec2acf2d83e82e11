#![forbid(unsafe_code)]

use thiserror::Error;

/// Error enumerates the errors returned by this application.
#[derive(Error, Debug)]
pub enum Errors {
    /// Input parameter logging.
    #[error("greeting_server input parameters:\n{}", .0)]
    InputParms(String),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Inaccessible or malformed logger configuration file.
    #[error("Unable to initialize Log4rs using configuration: {}", .0)]
    Log4rsInitialization(String),

    #[error("Reading application configuration file: {}", .0)]
    ReadingConfigFile(String),

    #[error("Unable to parse TOML file: {}", .0)]
    TOMLParseError(String),

    /// A data directory that exists but cannot be used as is.
    #[error("Invalid {} path {}: {}", .0, .1, .2)]
    InvalidDirectory(String, String, String),

    /// An environment variable override that cannot be parsed.
    #[error("Invalid value for environment variable {}: {}", .0, .1)]
    InvalidEnvValue(String, String),

    /// TLS material required by the configuration is missing.
    #[error("Unable to read TLS file {}: {}", .0, .1)]
    TLSFileError(String, String),
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::Errors;

    #[test]
    fn env_value_message() {
        let e = Errors::InvalidEnvValue("GREETING_HTTP_PORT".to_string(), "abc".to_string());
        assert_eq!(e.to_string(), "Invalid value for environment variable GREETING_HTTP_PORT: abc");
    }

    #[test]
    fn directory_message() {
        let e = Errors::InvalidDirectory("logs directory".to_string(), "/tmp/x".to_string(),
                                         "must be absolute".to_string());
        assert_eq!(e.to_string(), "Invalid logs directory path /tmp/x: must be absolute");
    }
}
