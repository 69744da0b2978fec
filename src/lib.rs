//! JIT recompiler for 6502 machine code: disassembles reachable code
//! from an entry address, lifts it to an IR, and compiles it into a
//! callable native routine driven against a host-supplied hardware
//! abstraction layer.

pub mod cache;
pub mod customizers;
pub mod decompile;
pub mod generator;
pub mod hal;
pub mod insns;
pub mod ir;
pub mod lift;
pub mod memory;
pub mod patch;
pub mod regfile;
pub mod scheduler;
pub mod std_hal;

pub use crate::cache::{CodeCache, CompiledEntry, SmcEffect};
pub use crate::customizers::{standard_customizer, trace_register_on_exit};
pub use crate::decompile::{DecodedInstruction, DecompileError, DecompiledFunction, Disassembler};
pub use crate::generator::{CompiledFn, CompiledRoutine, Customizer, ExecutableMethodGenerator};
pub use crate::hal::{CancellationToken, Hal, HalError};
pub use crate::insns::{decode_opcode, AddressMode, Mnemonic};
pub use crate::ir::{BinaryOp, FunctionAddress, Ir, IrSequence, LabelName, Location, UnaryOp, Value};
pub use crate::lift::{LiftContext, LiftError, Lifter};
pub use crate::memory::{BankSwitched, Device, MemoryBus, MemoryError, NullDevice, Ram, Rom};
pub use crate::patch::{Patch, PatchTable};
pub use crate::regfile::{CpuFlags, Flag, Register, RegisterFile};
pub use crate::scheduler::{RunError, Scheduler};
pub use crate::std_hal::{SmcNotifier, StdHal};
