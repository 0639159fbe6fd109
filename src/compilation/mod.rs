pub mod artifacts;
mod driver;
mod provider;

pub use artifacts::{CompilerOutput, Contract, SolcInput};
pub use driver::{CompilationDriver, Error};
pub use provider::{ProviderError, SolcToolchain, ToolchainProvider};
