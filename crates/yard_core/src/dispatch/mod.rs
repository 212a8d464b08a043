pub mod algorithm;
pub mod pending;

pub use algorithm::DispatchAlgorithm;
pub use pending::PendingInstructionDispatch;
