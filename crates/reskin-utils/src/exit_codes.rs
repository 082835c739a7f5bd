//! Exit code constants for the reskin CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments, configuration or gate response |
//! | 3 | `PRECONDITION` | A phase precondition is not met |
//! | 4 | `AWAITING_VALIDATION` | The pipeline is paused at a human gate |
//! | 5 | `PHASE_FAILED` | A phase finished in the failed state |
//! | 9 | `LOCK_HELD` | Another process holds the project lock |
//! | 70 | `GENERATION_FAILURE` | The generation service failed terminally |

/// Type-safe process exit code.
///
/// ```rust
/// use reskin_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::AWAITING_VALIDATION.as_i32(), 4);
/// assert_eq!(ExitCode::from_i32(0), ExitCode::SUCCESS);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - unexpected failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments, configuration or gate response
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A predecessor phase, input document or anchor set is missing
    pub const PRECONDITION: ExitCode = ExitCode(3);

    /// Paused at a human validation gate; not an error
    pub const AWAITING_VALIDATION: ExitCode = ExitCode(4);

    /// The phase ran and ended in `failed`
    pub const PHASE_FAILED: ExitCode = ExitCode(5);

    /// Lock held - another process is operating on the project
    pub const LOCK_HELD: ExitCode = ExitCode(9);

    /// Generation service failed terminally (auth, budget, invalid request)
    pub const GENERATION_FAILURE: ExitCode = ExitCode(70);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
