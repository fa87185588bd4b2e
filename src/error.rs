use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! structural_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The resolution driver sorts these into four classes with different recovery policies:
///
/// - **Transient faults** ([`Error::NotYetResolvable`], [`Error::ArrayMemberPending`]) - a
///   dependency of the unit being resolved is not available *yet*. The driver re-enqueues the
///   unit and retries; callers never observe these unless the retry budget runs out.
/// - **Structural faults** ([`Error::Malformed`], [`Error::MemberNotFound`]) - the metadata
///   itself is inconsistent. Retrying with the same inputs would fail identically, so the
///   driver aborts the run on the first occurrence.
/// - **Configuration faults** ([`Error::MissingWellKnownType`]) - a well-known runtime type the
///   engine depends on is absent from the loaded set. Fatal, no retry is meaningful.
/// - **Contract violations** ([`Error::NotVectorArray`]) - invalid arguments to an engine
///   entry point, surfaced immediately.
///
/// # Examples
///
/// ```rust
/// use cilgraph::{Error, Result};
///
/// fn describe(result: Result<()>) {
///     match result {
///         Ok(()) => println!("resolved"),
///         Err(Error::MissingWellKnownType(name)) => {
///             eprintln!("core library is malformed, missing {name}");
///         }
///         Err(Error::Malformed { message, file, line }) => {
///             eprintln!("inconsistent metadata: {message} ({file}:{line})");
///         }
///         Err(e) => eprintln!("resolution failed: {e}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A referenced unit exists but one of its dependencies is not available in the graph yet.
    ///
    /// This is the expected condition when units arrive in arbitrary forward-reference order.
    /// The driver recovers automatically by re-enqueueing the unit; the fault is only visible
    /// through the error counter.
    #[error("Unit {0} is not yet resolvable")]
    NotYetResolvable(Token),

    /// A method body references an array pseudo-method whose declaring array type has not been
    /// through specialization yet.
    ///
    /// Array member sets are synthesized after the main fixed point, so the driver parks the
    /// referencing unit and retries it once the array backlog has drained.
    #[error("Array member {0} has not been synthesized yet")]
    ArrayMemberPending(Token),

    /// The metadata is damaged or internally inconsistent.
    ///
    /// The error includes the source location where the inconsistency was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A referenced field or method token could not be found on its (resolved) declaring type.
    ///
    /// The declaring type finished resolution, so the member can never appear; this indicates
    /// malformed or mismatched metadata and is not retried.
    #[error("No member with token {token} on type {type_name}")]
    MemberNotFound {
        /// The metadata token that was searched for
        token: Token,
        /// Full name of the type whose member list was scanned
        type_name: String,
    },

    /// A required well-known runtime type is missing from the loaded core library.
    ///
    /// Aborts the whole resolution run; no retry is meaningful.
    #[error("Required runtime type is missing - {0}")]
    MissingWellKnownType(String),

    /// A unit exhausted its retry budget without becoming resolvable.
    ///
    /// Surfaced instead of looping forever when a dependency never materializes.
    #[error("Resolution of unit {token} stalled after {attempts} attempts")]
    ResolutionStalled {
        /// The token of the unit that could not be resolved
        token: Token,
        /// How many resolution attempts were made
        attempts: u32,
    },

    /// A type that is not a single-dimension array was passed to an array-only entry point.
    #[error("Type {0} is not a single-dimension array")]
    NotVectorArray(Token),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when a lock
    /// is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns true for the fault class that the driver recovers from by re-enqueueing.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NotYetResolvable(_))
    }
}
