//! Display/FromStr generation for the persisted status enums.
//!
//! Statuses are stored as upper snake case text (`API_SUCCESS`,
//! `COMPLETED_WITH_ERRORS`). Parsing accepts any ASCII case so rows edited
//! by hand during triage still load.
//!
//! # Example
//!
//! ```rust
//! use stagesync_domain::impl_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Draft,
//!     Sealed,
//! }
//!
//! impl_status_conversions!(Phase {
//!     Draft => "DRAFT",
//!     Sealed => "SEALED",
//! });
//!
//! assert_eq!("sealed".parse::<Phase>().unwrap(), Phase::Sealed);
//! assert_eq!(Phase::Draft.to_string(), "DRAFT");
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless status enum.
///
/// Every string literal must already be upper case; `FromStr` upper-cases
/// its input before matching.
#[macro_export]
macro_rules! impl_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical persisted representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = $crate::errors::StageSyncError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err($crate::errors::StageSyncError::InvalidInput(format!(
                        "invalid {}: {}",
                        stringify!($enum_name),
                        s
                    ))),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::errors::StageSyncError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Lane {
        Fast,
        SlowLane,
    }

    impl_status_conversions!(Lane {
        Fast => "FAST",
        SlowLane => "SLOW_LANE",
    });

    #[test]
    fn display_uses_upper_snake_case() {
        assert_eq!(Lane::Fast.to_string(), "FAST");
        assert_eq!(Lane::SlowLane.to_string(), "SLOW_LANE");
    }

    #[test]
    fn parse_ignores_case_and_whitespace() {
        assert_eq!(Lane::from_str("slow_lane").unwrap(), Lane::SlowLane);
        assert_eq!(Lane::from_str(" Fast ").unwrap(), Lane::Fast);
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let err = Lane::from_str("medium").unwrap_err();
        assert!(matches!(err, StageSyncError::InvalidInput(msg) if msg.contains("Lane")));
    }
}
