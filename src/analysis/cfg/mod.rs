//! Control flow discovery.
//!
//! This module partitions a function body into basic blocks by following jump targets from
//! a start address, without executing anything.
//!
//! # Algorithm
//!
//! [`FunctionBuilder`] keeps a work queue of addresses and a map from block start address
//! to [`BasicBlock`]. For every address taken off the queue:
//!
//! - a known block start is skipped
//! - an address inside an existing block splits that block: the original keeps its start
//!   and the instructions before the boundary, a new block owns the remainder
//! - an address inside an instruction is fatal ([`crate::Error::MisalignedTarget`])
//! - anything else is decoded sequentially until the block ends
//!
//! | Last instruction | Block ends | Enqueued |
//! |------------------|------------|----------|
//! | `ret`, `hlt`, `ud2` | yes | nothing |
//! | `jcc`, `loop`, `jecxz` | yes | fallthrough, then target |
//! | `jmp rel` | yes | target |
//! | `jmp r/m` | yes | see [`IndirectJumpPolicy`] |
//! | anything before a known block start | yes | nothing |
//! | `call` and everything else | no | nothing |
//!
//! Targets outside the buffer are never decoded; they are collected in
//! [`Function::external_targets`].
//!
//! # Example
//!
//! ```rust
//! use x86scope::analysis::build_function;
//!
//! // 0x1000: jz 0x1003
//! // 0x1002: nop
//! // 0x1003: ret
//! let function = build_function(&[0x74, 0x01, 0x90, 0xC3], 0x1000)?;
//! let starts: Vec<u32> = function.blocks().map(|block| block.address).collect();
//! assert_eq!(starts, vec![0x1000, 0x1002, 0x1003]);
//! # Ok::<(), x86scope::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! A build only touches its own builder, so [`analyze_functions`] builds independent
//! functions in parallel on the `rayon` thread pool.

mod builder;
mod config;
mod coverage;
mod function;

use rayon::prelude::*;

pub use builder::FunctionBuilder;
pub use config::{BuilderConfig, IndirectJumpPolicy, UnknownOpcodePolicy};
pub use coverage::CoverageMap;
pub use function::{Edge, EdgeKind, Function};

use crate::Result;

/// Builds the function starting at `start`, where `data` itself begins at `start`.
///
/// Uses [`BuilderConfig::default`]: indirect jumps abort the build.
///
/// # Errors
/// See [`FunctionBuilder::build`].
pub fn build_function(data: &[u8], start: u32) -> Result<Function> {
    build_function_at(data, start, start, BuilderConfig::default())
}

/// Builds the function at `start` inside a buffer mapped at `base`.
///
/// # Arguments
///
/// * `data` - The code buffer
/// * `base` - Address of `data[0]`
/// * `start` - Entry address of the function, inside the buffer
/// * `config` - Builder policies
///
/// # Errors
/// See [`FunctionBuilder::build`].
pub fn build_function_at(
    data: &[u8],
    base: u32,
    start: u32,
    config: BuilderConfig,
) -> Result<Function> {
    FunctionBuilder::new(data, base, config).build(start)
}

/// Builds several functions of one buffer in parallel.
///
/// The results are returned in the order of `starts`; a failure of one function does not
/// affect the others.
#[must_use]
pub fn analyze_functions(
    data: &[u8],
    base: u32,
    starts: &[u32],
    config: BuilderConfig,
) -> Vec<Result<Function>> {
    starts
        .par_iter()
        .map(|&start| build_function_at(data, base, start, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parallel_build_keeps_order() {
        // 0: ret; 1: jmp eax; 3: nop; 4: ret
        let code = [0xC3, 0xFF, 0xE0, 0x90, 0xC3];
        let results = analyze_functions(&code, 0x400, &[0x403, 0x401, 0x400], BuilderConfig::default());

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().instruction_count(), 2);
        assert!(matches!(results[1], Err(Error::UnresolvedJump { .. })));
        assert_eq!(results[2].as_ref().unwrap().entry(), 0x400);
    }
}
