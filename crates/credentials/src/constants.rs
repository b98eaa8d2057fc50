//! Credential file conventions and public defaults
//!
//! The default app id/hash pair is the publicly distributed desktop client
//! pair. It identifies an application, not a user, and is used when an
//! account ships without its own metadata.

/// App id used when no metadata provides one
pub const DEFAULT_APP_ID: i64 = 2040;

/// App hash paired with `DEFAULT_APP_ID`
pub const DEFAULT_APP_HASH: &str = "b18441a1ff607e10a989891a5462e627";

/// Extension of the session files that define the account set
pub const SESSION_EXTENSION: &str = "session";

/// Extension of the durable per-account state record
pub const STATE_EXTENSION: &str = "state";

/// Extension of the optional credential metadata file
pub const METADATA_EXTENSION: &str = "json";
