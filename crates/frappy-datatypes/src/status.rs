//! Canonical SECoP status codes and the `Status` enum shared by every
//! Readable/Drivable module.

/// Module is switched off or not available.
pub const DISABLED: i64 = 0;
/// Module is idle, at rest, nothing to report.
pub const IDLE: i64 = 100;
/// Module is at a defined standby position.
pub const STANDBY: i64 = 130;
/// Module is prepared for an operation but not yet running it.
pub const PREPARED: i64 = 150;
/// Module is idle but flags a non-fatal condition.
pub const WARN: i64 = 200;
/// Value is unstable (e.g. reading settles after a disturbance).
pub const UNSTABLE: i64 = 270;
/// Module is busy, generic "doing something" category.
pub const BUSY: i64 = 300;
/// Module is preparing to start a drive.
pub const PREPARING: i64 = 340;
/// Module is actively driving toward a target.
pub const RAMPING: i64 = 370;
/// Module has reached target and is waiting for settling.
pub const STABILIZING: i64 = 380;
/// Module is wrapping up after reaching target.
pub const FINALIZING: i64 = 390;
/// Module reports a fatal error.
pub const ERROR: i64 = 400;
/// Module's status could not be determined.
pub const UNKNOWN: i64 = 401;

/// `true` for status codes in `[300, 390)` — the module is actively
/// driving toward a target (as opposed to merely busy doing something
/// else, e.g. finalizing).
#[must_use]
pub fn is_driving(code: i64) -> bool {
    (BUSY..FINALIZING).contains(&code)
}

/// `true` for status codes in `[300, 400)` — the module is busy in the
/// broad sense used by `isBusy()`.
#[must_use]
pub fn is_busy(code: i64) -> bool {
    (BUSY..ERROR).contains(&code)
}

/// The standard Readable/Drivable status enum, built once and shared by
/// every module's `status` parameter declaration.
#[must_use]
pub fn standard_status_enum() -> crate::EnumType {
    crate::EnumType::from_members(
        "Status",
        &[
            ("DISABLED", DISABLED),
            ("IDLE", IDLE),
            ("STANDBY", STANDBY),
            ("PREPARED", PREPARED),
            ("WARN", WARN),
            ("UNSTABLE", UNSTABLE),
            ("BUSY", BUSY),
            ("PREPARING", PREPARING),
            ("RAMPING", RAMPING),
            ("STABILIZING", STABILIZING),
            ("FINALIZING", FINALIZING),
            ("ERROR", ERROR),
            ("UNKNOWN", UNKNOWN),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_matches_invariant_5() {
        assert!(!is_busy(IDLE));
        assert!(is_busy(BUSY));
        assert!(is_busy(RAMPING));
        assert!(is_busy(STABILIZING));
        assert!(is_busy(FINALIZING));
        assert!(!is_busy(ERROR));
    }

    #[test]
    fn driving_excludes_finalizing() {
        assert!(is_driving(RAMPING));
        assert!(!is_driving(FINALIZING));
        assert!(!is_driving(IDLE));
    }
}
