pub mod email;

pub use email::{EmailValidator, EmailVerdict, HickoryMxResolver, MxOutcome, MxResolver, StaticMxResolver};
