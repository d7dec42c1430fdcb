//! Evolutionary program synthesis driven by a mutation oracle.
//!
//! A population of candidate programs is scored against a fixed set of
//! input/expected-output test vectors. Each generation keeps the best
//! candidate and asks the oracle to improve every other one, until a candidate
//! passes every test or the generation budget runs out.
//!
//! - **[`core`]**: Pure logic (fitness, ranking, termination, run parameters).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, workspaces,
//!   problem and config files, the oracle command).
//!
//! [`population`] and [`driver`] coordinate the two into the generation loop.

pub mod core;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod population;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
