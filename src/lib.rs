pub mod blockchain;
pub mod compilation;
pub mod compiler;
mod consts;
pub mod settings;
pub mod sources;
pub mod storage;
pub mod verification;
pub mod verifier;

pub use consts::DEFAULT_SOLIDITY_COMPILER_LIST;
pub use settings::Settings;
pub use verification::{
    Error as VerificationError, SourceInput, VerificationClient, VerificationRequest,
    VerificationSuccess,
};
