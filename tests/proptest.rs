//! Property-based tests using proptest.
//!
//! These cover the stack's bookkeeping under arbitrary push/pop sequences,
//! the operand codec, and the assemble, disassemble, reassemble cycle.

use proptest::prelude::*;
use stackproc::machine::assembler::assemble_source;
use stackproc::machine::config::AssemblerConfig;
use stackproc::machine::disasm::disassemble_to_string;
use stackproc::machine::operand::{MAX_INDEX_OFFSET, MIN_INDEX_OFFSET, Operand};
use stackproc::machine::stack::{ProtectedStack, StackError};

// ── Strategies ──────────────────────────────────────────────────────────

/// `Some(v)` pushes `v`, `None` pops.
fn arb_stack_ops() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::of(any::<i64>()), 0..200)
}

fn arb_operand() -> impl Strategy<Value = Operand> {
    prop_oneof![
        any::<i32>().prop_map(Operand::Immediate),
        any::<i32>().prop_map(Operand::Memory),
        any::<u8>().prop_map(Operand::Register),
        (any::<u8>(), MIN_INDEX_OFFSET..=MAX_INDEX_OFFSET)
            .prop_map(|(register, offset)| Operand::RegisterIndexed { register, offset }),
    ]
}

fn arb_register() -> impl Strategy<Value = String> {
    (b'A'..=b'Z').prop_map(|c| format!("R{}X", c as char))
}

/// One source line that assembles without warnings.
fn arb_line() -> impl Strategy<Value = String> {
    let fixed = prop::sample::select(vec![
        "END", "ABORT", "POP", "DUP", "ADD", "SUB", "MUL", "DIV", "RET", "OUT", "OUTC", "IN",
        "VSET", "VGET", "MSET", "MGET", "CCLR", "DRAW",
    ])
    .prop_map(str::to_string);
    let addr_mnemonic = prop::sample::select(vec!["PUSH", "MOVE"]);
    let addr_operand = prop_oneof![
        any::<i32>().prop_map(|v| v.to_string()),
        (0..4096i32).prop_map(|v| format!("[{v}]")),
        arb_register(),
        (arb_register(), -1000..1000i32).prop_map(|(r, o)| {
            if o < 0 {
                format!("[{r} - {}]", -o)
            } else {
                format!("[{r} + {o}]")
            }
        }),
        (b' '..=b'~')
            .prop_filter("quote", |c| *c != b'\'' && *c != b'\\')
            .prop_map(|c| format!("'{}'", c as char)),
    ];
    let jump_mnemonic = prop::sample::select(vec![
        "JMP", "JMPG", "JMPL", "JMPE", "JMPGE", "JMPLE", "CALL",
    ]);
    let displacement = any::<i32>().prop_filter("nonzero", |d| *d != 0);
    let reg_mnemonic = prop::sample::select(vec!["RGET", "RSET"]);

    prop_oneof![
        fixed,
        (addr_mnemonic, addr_operand).prop_map(|(m, o)| format!("{m} {o}")),
        (jump_mnemonic, displacement).prop_map(|(m, d)| format!("{m} {d}")),
        (reg_mnemonic, arb_register()).prop_map(|(m, r)| format!("{m} {r}")),
    ]
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stack_tracks_pushes_and_pops(ops in arb_stack_ops()) {
        let mut stack = ProtectedStack::new(1);
        let mut model: Vec<i64> = Vec::new();
        for op in ops {
            match op {
                Some(value) => {
                    stack.push(value).unwrap();
                    model.push(value);
                }
                None => match model.pop() {
                    Some(expected) => {
                        prop_assert_eq!(stack.pop(), Ok(expected));
                    }
                    None => {
                        prop_assert_eq!(stack.pop(), Err(StackError::Underflow));
                    }
                },
            }
            prop_assert_eq!(stack.len(), model.len());
            prop_assert!(stack.len() <= stack.capacity());
            prop_assert!(stack.status().is_ok());
        }
        prop_assert_eq!(stack.as_slice(), model.as_slice());
    }

    #[test]
    fn operand_binary_round_trip(operand in arb_operand()) {
        let (mode, payload) = operand.encode();
        let decoded = Operand::decode_binary(mode.into(), i32::from_le_bytes(payload));
        prop_assert_eq!(decoded, operand);
    }

    #[test]
    fn operand_text_never_panics(text in "[ -~]{0,24}") {
        let _ = Operand::decode_text(&text);
    }

    #[test]
    fn disassembly_reassembles(lines in prop::collection::vec(arb_line(), 1..40)) {
        let config = AssemblerConfig::default();
        let source = lines.join("\n");
        let first = assemble_source(&source, &config).unwrap();
        prop_assert_eq!(first.warnings, 0);

        let text = disassemble_to_string(&first.program).unwrap();
        let second = assemble_source(&text, &config).unwrap();
        prop_assert_eq!(second.warnings, 0);
        prop_assert_eq!(first.program.body(), second.program.body());
    }
}
