//! PVM: deterministic gas-metered register machine for JAM, per the Gray Paper.
//! Structure mirrors packages/pvm-assemblyscript (config, types, codec, host_functions, instructions, pvm, ram).

#![allow(dead_code)]

/// Fine-grained host-call tracing (off by default; enable with `RUST_LOG=jam_pvm=trace`).
#[macro_export]
macro_rules! host_log {
    ($($t:tt)*) => {
        tracing::trace!($($t)*);
    };
}

/// Host-call error-path tracing (PANIC, HUH, FULL outcomes).
#[macro_export]
macro_rules! host_log_error {
    ($($t:tt)*) => {
        tracing::debug!($($t)*);
    };
}

mod config;
mod codec;
mod crypto;
mod host_functions;
mod instructions;
mod mock_ram;
mod parser;
mod pvm;
mod ram;
mod simple_ram;
mod types;

pub use codec::{
    decode_accumulate_args, decode_blob, decode_implications_pair, decode_natural,
    decode_program, decode_program_from_preimage, encode_fixed_length, encode_implications_pair,
    encode_natural, AccountEntry, CompleteServiceAccount, DeferredTransfer, Implications,
    ImplicationsPair, PartialState, ProvisionEntry,
};
pub use config::FetchSystemConstantsConfig;
pub use pvm::{AccumulateSetup, Pvm, PvmInstruction, RamKind, Status};
pub use types::{MemoryAccessType, Ram};

/// Top-level fallible operations: decoding a preimage-wrapped program, decoding the
/// accumulation context, a region-layout bound that overflows, a malformed memory-restore
/// map, or a register index out of the 13-register file.
#[derive(thiserror::Error, Debug)]
pub enum PvmError {
    #[error("malformed program preimage or deblob")]
    MalformedProgramPreimage,
    #[error("malformed accumulation context (ImplicationsPair)")]
    MalformedAccumulationContext,
    #[error("region layout exceeds 2^32 (Gray Paper eq.-767 bound)")]
    RegionLayoutOverflow,
    #[error("malformed memory-restore page map")]
    MalformedMemoryRestoreMap,
    #[error("register index {0} out of range (0..13)")]
    RegisterIndexOutOfRange(u8),
}
