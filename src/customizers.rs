//! Concrete customizer passes: optional `IrSequence` mutators applied
//! by [`ExecutableMethodGenerator::generate`](crate::generator::ExecutableMethodGenerator::generate)
//! before a routine is finalized.
//!
//! Interrupt polling and cycle accounting are *not* implemented as
//! customizers — they are core, always-on generator behavior (see
//! `generator::run`'s checkpoint at function entry and at every
//! `Ir::Label`), since every compiled routine needs the HAL's one
//! required timing signal regardless of which customizers are
//! installed. What lives here is purely optional, host-observable
//! instrumentation built from the existing `DebugValue` primitive.

use crate::generator::Customizer;
use crate::ir::{Ir, IrSequence, Value};
use crate::regfile::Register;

/// Inserts a `DebugValue(AllFlags)` at function entry and after every
/// `Label`, so host code watching the debug hook can observe the
/// processor status at every basic-block boundary.
pub fn standard_customizer() -> Box<Customizer> {
    Box::new(|seq: IrSequence| -> IrSequence {
        let mut out = Vec::with_capacity(seq.len() + seq.len() / 4 + 1);
        out.push(Ir::DebugValue(Value::AllFlags));
        for ir in seq {
            let is_label = matches!(ir, Ir::Label(_));
            out.push(ir);
            if is_label {
                out.push(Ir::DebugValue(Value::AllFlags));
            }
        }
        out
    })
}

/// Inserts a `DebugValue` of `register` immediately before the
/// routine's last instruction, so host code gets a single watch-point
/// on exit (e.g. a platform harness logging the accumulator after every
/// call). Inserted before, not appended after, the last instruction:
/// routines typically end in `Return`/`CallFunction`/a taken `Jump`,
/// all of which transfer control without falling through, so anything
/// appended past them would never execute.
pub fn trace_register_on_exit(register: Register) -> Box<Customizer> {
    Box::new(move |mut seq: IrSequence| -> IrSequence {
        let insert_at = seq.len().saturating_sub(1);
        seq.insert(insert_at, Ir::DebugValue(Value::Register(register)));
        seq
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionAddress;

    #[test]
    fn standard_customizer_brackets_every_label() {
        let seq = vec![
            Ir::Label(1),
            Ir::NoOp,
            Ir::Label(2),
            Ir::Jump(1),
        ];
        let out = standard_customizer()(seq);
        assert_eq!(
            out,
            vec![
                Ir::DebugValue(Value::AllFlags),
                Ir::Label(1),
                Ir::DebugValue(Value::AllFlags),
                Ir::NoOp,
                Ir::Label(2),
                Ir::DebugValue(Value::AllFlags),
                Ir::Jump(1),
            ]
        );
    }

    #[test]
    fn trace_register_on_exit_inserts_before_final_instruction() {
        let seq = vec![Ir::NoOp, Ir::CallFunction(FunctionAddress { address: 0x1234, indirect: false })];
        let out = trace_register_on_exit(Register::A)(seq);
        assert_eq!(
            out,
            vec![
                Ir::NoOp,
                Ir::DebugValue(Value::Register(Register::A)),
                Ir::CallFunction(FunctionAddress { address: 0x1234, indirect: false }),
            ]
        );
    }

    #[test]
    fn trace_register_on_exit_handles_empty_sequence() {
        let out = trace_register_on_exit(Register::A)(vec![]);
        assert_eq!(out, vec![Ir::DebugValue(Value::Register(Register::A))]);
    }
}
