// Constants for retry module
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default growth factor between consecutive delays
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default jitter fraction (0.0 = no jitter, 1.0 = up to the full delay added)
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Maximum allowed max_retries value
pub const MAX_MAX_RETRIES: u32 = 100;
