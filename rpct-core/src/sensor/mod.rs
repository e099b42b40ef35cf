//! RPC sensor model

mod metadata;
pub mod polynomial;
pub mod rpc;

pub use rpc::{
    normalization_warning_count, reset_normalization_warnings, RpcCoefficients, RpcModel,
    MAX_ABS_VALUE_WARNINGS,
};
