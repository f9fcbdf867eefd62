//! Project-wide constants.

use std::path::PathBuf;

pub const SKILL_NAME: &str = "Lock My Car";

/// Default OAuth token endpoint of the connected-vehicle provider.
pub const DEFAULT_TOKEN_URL: &str = "https://api.secure.mercedes-benz.com/oidc10/auth/oauth/v2/token";
pub const DEFAULT_AUTHORIZE_URL: &str =
    "https://api.secure.mercedes-benz.com/oidc10/auth/oauth/v2/authorize";
pub const DEFAULT_API_BASE_URL: &str =
    "https://api.mercedes-benz.com/experimental/connectedvehicle/v1";

/// Must match the redirect URI registered with the provider byte for byte.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";
pub const DEFAULT_SCOPES: &str = "mb:vehicle:status:general mb:user:pool:reader";

/// Prefix for every environment override (`CARLOCK_VEHICLE_ID`, ...).
pub const ENV_PREFIX: &str = "CARLOCK_";

// Intent names delivered by the voice platform.
pub const LOCK_INTENT: &str = "LockMyCar";
/// Name used by interaction models built for the first release.
pub const LEGACY_LOCK_INTENT: &str = "LockMyMercedes";
pub const LOCK_INTENTS: &[&str] = &[LOCK_INTENT, LEGACY_LOCK_INTENT];
pub const HELP_INTENT: &str = "AMAZON.HelpIntent";
pub const CANCEL_INTENT: &str = "AMAZON.CancelIntent";
pub const STOP_INTENT: &str = "AMAZON.StopIntent";

pub const HELP_MESSAGE: &str = "Say lock my car to get your car locked.";
pub const HELP_REPROMPT: &str = "What can I help you with?";
pub const STOP_MESSAGE: &str = "Goodbye!";
pub const FALLBACK_MESSAGE: &str = "Sorry, we couldn't connect with your car.";

/// Default database path: `~/.carlock/carlock.db`.
/// Single DB for settings and credentials. Falls back to the working
/// directory when no home directory can be determined.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".carlock"))
        .unwrap_or_default()
        .join("carlock.db")
}
