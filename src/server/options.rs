//! Contains the defaults of the settings that can be changed through the `Server` builder.

// These could be exposed to API users later so they can see what the server defaults are.
pub(crate) const DEFAULT_GREETING: &str = "Welcome to the libunftp-stor FTP server";
pub(crate) const DEFAULT_IDLE_SESSION_TIMEOUT_SECS: u64 = 600;
pub(crate) const DEFAULT_DATA_READ_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_DATA_ACCEPT_TIMEOUT_SECS: u64 = 30;
