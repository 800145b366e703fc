//! Capped-Value Circuits
//!
//! Recursive proofs that a value was accumulated from individually capped
//! additions, using arkworks R1CS + Groth16 over BN254.
//!
//! # Circuits
//!
//! | Circuit | Statement | Constraints |
//! |---------|-----------|-------------|
//! | CreateCircuit | 0 < value < limit | 260 |
//! | MergeCircuit | out = left + right under one limit | ~70 |
//!
//! # Proof trees
//! `ValueProgram::create` yields a single-leaf `Proof`. `ValueProgram::merge`
//! checks both children against the verification keys, then proves the sum
//! and grafts the two trees under a new root. Verifying a `Proof` checks
//! every node, so the root output is only trusted when all of its leaves
//! satisfied the cap.
//!
//! # Example
//! ```ignore
//! use capped_value_circuits::{AddValue, ProgramKeys, ValueProgram};
//!
//! let keys = ProgramKeys::setup(&mut rng)?;
//! let program = ValueProgram::new(Arc::new(keys));
//!
//! let p1 = program.create(AddValue::new(300, 1000), &mut rng)?;
//! let p2 = program.create(AddValue::new(400, 1000), &mut rng)?;
//! let p3 = program.merge(&p1, &p2, &mut rng)?;
//! assert_eq!(program.verify(&p3)?, AddValue::new(700, 1000));
//! ```

pub mod create;
pub mod error;
pub mod gadgets;
pub mod keys;
pub mod merge;
pub mod program;
pub mod proof;
pub mod value;


// Circuit exports
pub use create::CreateCircuit;
pub use merge::MergeCircuit;

// Error handling
pub use error::validation;
pub use error::{CircuitError, CircuitResult};

pub use keys::{CircuitKind, Curve, ProgramKeys, Scalar, VerificationKeys};
pub use program::ValueProgram;
pub use proof::{Proof, ProofNode, ProofRef};
pub use value::AddValue;
