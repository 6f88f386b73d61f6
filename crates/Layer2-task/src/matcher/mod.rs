//! Output matchers
//!
//! - `registry` - compiled matchers by name, validated at registration
//! - `builtin` - matchers shipped with the service (tsc, gcc, rustc)
//! - `parser` - streaming scanner turning output chunks into diagnostics

mod builtin;
mod parser;
mod registry;

pub use builtin::builtin_matchers;
pub use parser::{parse, OutputParser};
pub use registry::{CompiledMatcher, MatcherRegistry};
