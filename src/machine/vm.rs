//! Bytecode interpreter.
//!
//! Executes an assembled [`Program`] against an operand stack, a call stack,
//! a register file, flat memory and a video device. All arithmetic uses
//! wrapping semantics; every index coming from the program is bounds-checked
//! and reported as a [`MachineError`] instead of panicking.
//!
//! Each [`Vm::step`] verifies both stacks, decodes one instruction, checks
//! that the operand stack holds enough values, executes it and moves the
//! instruction pointer. A jump that leaves the program body is fatal.

mod registers;
mod video;

pub use registers::Registers;
pub use video::{CLEAR_SCREEN, PALETTE, Video};

use crate::machine::config::MachineConfig;
use crate::machine::errors::MachineError;
use crate::machine::isa::{Instruction, OperandKind};
use crate::machine::operand::{AddressingMode, Operand};
use crate::machine::program::{ByteCursor, HEADER_SIZE, Program};
use crate::machine::stack::{ProtectedStack, StackError, Word};
use crate::{error, status};
use std::io::{BufRead, Write};

/// Outcome of a single [`Vm::step`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// Execution continues; the instruction pointer moved by this many bytes.
    Shift(i64),
    /// END was executed.
    Halt,
}

/// Allocates `count` zeroed cells, reporting failure instead of aborting.
fn zeroed(what: &'static str, count: usize) -> Result<Vec<i32>, MachineError> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(count)
        .map_err(|_| MachineError::Allocation { what, cells: count })?;
    cells.resize(count, 0);
    Ok(cells)
}

/// Where control goes after a handler returns.
enum Flow {
    Next,
    /// Displacement from the end of the current instruction.
    Jump(i32),
    /// Absolute program offset.
    Goto(i64),
    Halt,
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        mode = $mode:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    exec_vm!(@call $vm, $mode, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    (@call $vm:ident, $mode:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $mode, $kind)?; )*
        $vm.$handler($instr_name, $( $field ),*)
    }};

    // Decode an addressing-mode operand
    (@read $vm:ident, $mode:ident, Addr) => {{
        $vm.read_i32().map(|payload| Operand::decode_binary($mode, payload))
    }};

    // Decode a signed displacement
    (@read $vm:ident, $mode:ident, Rel) => {{
        $vm.read_i32()
    }};

    // Decode a register index
    (@read $vm:ident, $mode:ident, Reg) => {{
        $vm.read_i32()
    }};
}

/// Stack-based virtual machine.
///
/// Input and output are generic so a run can be driven from a terminal or
/// from in-memory buffers.
pub struct Vm<R: BufRead, W: Write> {
    program: Program,
    /// Offset of the instruction being executed.
    ip: usize,
    /// Read position inside the current instruction.
    cursor: usize,
    data: ProtectedStack,
    calls: ProtectedStack,
    max_call_depth: usize,
    registers: Registers,
    memory: Vec<i32>,
    video: Video,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Vm<R, W> {
    /// Creates a machine sized by `config`, positioned at the program entry.
    ///
    /// Memory cells 0..4 are seeded with the RAM size, video width, video
    /// height and palette length.
    ///
    /// Fails with [`MachineError::ConfigTooLarge`] when a size cannot be
    /// addressed, or [`MachineError::Allocation`] when memory runs out.
    pub fn new(
        program: Program,
        config: &MachineConfig,
        input: R,
        output: W,
    ) -> Result<Self, MachineError> {
        config.validate()?;
        let mut memory = zeroed("memory", config.ram_size)?;
        let environment = [
            config.ram_size,
            config.video_width,
            config.video_height,
            PALETTE.len(),
        ];
        for (cell, value) in memory.iter_mut().zip(environment) {
            // validated sizes fit in i32
            *cell = i32::try_from(value).unwrap_or(i32::MAX);
        }

        let ip = program.entry();
        Ok(Self {
            program,
            ip,
            cursor: ip,
            data: ProtectedStack::new(config.stack_capacity),
            calls: ProtectedStack::new(config.call_stack_capacity),
            max_call_depth: config.max_call_depth,
            registers: Registers::new(config.registers)?,
            memory,
            video: Video::new(config.video_width, config.video_height)?,
            input,
            output,
        })
    }

    /// Runs until END or the first fatal error. Output is flushed either way.
    pub fn run(&mut self) -> Result<(), MachineError> {
        let result = self.run_loop();
        self.output.flush()?;
        result
    }

    fn run_loop(&mut self) -> Result<(), MachineError> {
        while let Step::Shift(_) = self.step()? {}
        Ok(())
    }

    /// Executes one instruction.
    pub fn step(&mut self) -> Result<Step, MachineError> {
        self.check_stacks()?;

        let from = self.ip;
        self.cursor = from;
        let byte = self.read_u8()?;
        let (opcode, mode) = Instruction::split_byte(byte);
        let instr = Instruction::try_from(opcode).map_err(|_| MachineError::InvalidInstruction {
            opcode: byte,
            offset: from,
        })?;

        if mode != 0 && instr.operand_kind() != Some(OperandKind::Addr) {
            return Err(MachineError::InvalidAddressingMode {
                instruction: instr.mnemonic(),
                mode,
                offset: from,
            });
        }
        if self.data.len() < instr.stack_inputs() {
            return Err(MachineError::StackUnderflow {
                instruction: instr.mnemonic(),
                offset: from,
            });
        }

        let flow = self.exec(instr, AddressingMode::from(mode))?;
        status!(
            "{from:#06x} {:<5} stack={} calls={}",
            instr.mnemonic(),
            self.data.len(),
            self.calls.len()
        );

        let target = match flow {
            Flow::Halt => return Ok(Step::Halt),
            Flow::Next => self.cursor as i64,
            Flow::Jump(displacement) => self.cursor as i64 + displacement as i64,
            Flow::Goto(address) => address,
        };
        if target < HEADER_SIZE as i64 || target >= self.program.len() as i64 {
            return Err(MachineError::InstructionPointerOutOfRange { ip: target, from });
        }
        self.ip = target as usize;
        Ok(Step::Shift(target - from as i64))
    }

    /// Offset of the next instruction to execute.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Operand stack contents, bottom first.
    pub fn stack(&self) -> &[Word] {
        self.data.as_slice()
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    pub fn registers(&self) -> &[i32] {
        self.registers.as_slice()
    }

    pub fn memory(&self) -> &[i32] {
        &self.memory
    }

    pub fn video(&self) -> &Video {
        &self.video
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn check_stacks(&self) -> Result<(), MachineError> {
        for (name, stack) in [("data", &self.data), ("call", &self.calls)] {
            let status = stack.status();
            if !status.is_ok() {
                error!("{}", stack.dump(name));
                return Err(MachineError::StackCorrupted {
                    stack: name,
                    status,
                });
            }
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, MachineError> {
        let mut cursor = ByteCursor::new(self.program.as_bytes(), self.cursor);
        let byte = cursor.read_u8()?;
        self.cursor = cursor.position();
        Ok(byte)
    }

    fn read_i32(&mut self) -> Result<i32, MachineError> {
        let mut cursor = ByteCursor::new(self.program.as_bytes(), self.cursor);
        let value = cursor.read_i32()?;
        self.cursor = cursor.position();
        Ok(value)
    }

    fn exec(&mut self, instruction: Instruction, mode: AddressingMode) -> Result<Flow, MachineError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            mode = mode,
            {
                // Control
                End => op_end(),
                Abort => op_abort(),
                // Stack
                Push => op_push(src: Addr),
                Pop => op_pop(),
                Dup => op_dup(),
                Move => op_move(dst: Addr),
                // Arithmetic
                Add => op_add(),
                Sub => op_sub(),
                Mul => op_mul(),
                Div => op_div(),
                // Control Flow
                Jmp => op_jmp(target: Rel),
                Jmpg => op_jmpg(target: Rel),
                Jmpl => op_jmpl(target: Rel),
                Jmpe => op_jmpe(target: Rel),
                Jmpge => op_jmpge(target: Rel),
                Jmple => op_jmple(target: Rel),
                Call => op_call(target: Rel),
                Ret => op_ret(),
                // Legacy register access
                Rget => op_rget(reg: Reg),
                Rset => op_rset(reg: Reg),
                // Console
                Out => op_out(),
                Outc => op_outc(),
                In => op_in(),
                // Video and memory
                Vset => op_vset(),
                Vget => op_vget(),
                Mset => op_mset(),
                Mget => op_mget(),
                Cclr => op_cclr(),
                Draw => op_draw(),
            }
        }
    }

    // ==================== Stack helpers ====================

    fn data_error(&self, err: StackError, instr: &'static str) -> MachineError {
        match err {
            StackError::Underflow => MachineError::StackUnderflow {
                instruction: instr,
                offset: self.ip,
            },
            StackError::Corrupted(status) => MachineError::StackCorrupted {
                stack: "data",
                status,
            },
        }
    }

    fn push(&mut self, instr: &'static str, value: i32) -> Result<(), MachineError> {
        self.data
            .push(value as Word)
            .map_err(|e| self.data_error(e, instr))
    }

    fn pop(&mut self, instr: &'static str) -> Result<i32, MachineError> {
        match self.data.pop() {
            Ok(value) => Ok(value as i32),
            Err(e) => Err(self.data_error(e, instr)),
        }
    }

    fn peek(&self, instr: &'static str, depth: usize) -> Result<i32, MachineError> {
        self.data
            .peek(depth)
            .map(|value| value as i32)
            .map_err(|e| self.data_error(e, instr))
    }

    // ==================== Control ====================

    fn op_end(&mut self, _instr: &'static str) -> Result<Flow, MachineError> {
        Ok(Flow::Halt)
    }

    fn op_abort(&mut self, _instr: &'static str) -> Result<Flow, MachineError> {
        Err(MachineError::Aborted { offset: self.ip })
    }

    // ==================== Stack ====================

    fn op_push(&mut self, instr: &'static str, src: Operand) -> Result<Flow, MachineError> {
        let value = src.read(self.registers.as_mut_slice(), &mut self.memory)?;
        self.push(instr, value)?;
        Ok(Flow::Next)
    }

    fn op_pop(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        self.pop(instr)?;
        Ok(Flow::Next)
    }

    fn op_dup(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let value = self.peek(instr, 0)?;
        self.push(instr, value)?;
        Ok(Flow::Next)
    }

    /// Stores the top value into `dst`, then pops it. An immediate
    /// destination just discards the value.
    fn op_move(&mut self, instr: &'static str, dst: Operand) -> Result<Flow, MachineError> {
        let value = self.peek(instr, 0)?;
        if !matches!(dst, Operand::Immediate(_)) {
            *dst.resolve(self.registers.as_mut_slice(), &mut self.memory)? = value;
        }
        self.pop(instr)?;
        Ok(Flow::Next)
    }

    // ==================== Arithmetic ====================

    /// Pops `b` (top) then `a`, pushes `op(a, b)`.
    fn binary(
        &mut self,
        instr: &'static str,
        op: impl FnOnce(i32, i32) -> i32,
    ) -> Result<Flow, MachineError> {
        let b = self.pop(instr)?;
        let a = self.pop(instr)?;
        self.push(instr, op(a, b))?;
        Ok(Flow::Next)
    }

    fn op_add(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        self.binary(instr, i32::wrapping_add)
    }

    fn op_sub(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        self.binary(instr, i32::wrapping_sub)
    }

    fn op_mul(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        self.binary(instr, i32::wrapping_mul)
    }

    fn op_div(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        if self.peek(instr, 0)? == 0 {
            return Err(MachineError::DivisionByZero { offset: self.ip });
        }
        self.binary(instr, i32::wrapping_div)
    }

    // ==================== Control Flow ====================

    fn displacement(&self, instr: &'static str, target: i32) -> Result<i32, MachineError> {
        if target == 0 {
            return Err(MachineError::UnresolvedJump {
                instruction: instr,
                offset: self.ip,
            });
        }
        Ok(target)
    }

    /// Pops `a` (top) then `b` and jumps when `cmp(a, b)` holds.
    fn branch_if(
        &mut self,
        instr: &'static str,
        target: i32,
        cmp: impl FnOnce(&i32, &i32) -> bool,
    ) -> Result<Flow, MachineError> {
        let target = self.displacement(instr, target)?;
        let a = self.pop(instr)?;
        let b = self.pop(instr)?;
        Ok(if cmp(&a, &b) {
            Flow::Jump(target)
        } else {
            Flow::Next
        })
    }

    fn op_jmp(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        Ok(Flow::Jump(self.displacement(instr, target)?))
    }

    fn op_jmpg(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        self.branch_if(instr, target, i32::gt)
    }

    fn op_jmpl(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        self.branch_if(instr, target, i32::lt)
    }

    fn op_jmpe(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        self.branch_if(instr, target, i32::eq)
    }

    fn op_jmpge(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        self.branch_if(instr, target, i32::ge)
    }

    fn op_jmple(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        self.branch_if(instr, target, i32::le)
    }

    fn op_call(&mut self, instr: &'static str, target: i32) -> Result<Flow, MachineError> {
        let target = self.displacement(instr, target)?;
        if self.calls.len() >= self.max_call_depth {
            return Err(MachineError::CallStackOverflow {
                offset: self.ip,
                depth: self.calls.len() + 1,
            });
        }
        self.calls
            .push(self.cursor as Word)
            .map_err(|e| match e {
                StackError::Corrupted(status) => MachineError::StackCorrupted {
                    stack: "call",
                    status,
                },
                StackError::Underflow => MachineError::StackUnderflow {
                    instruction: instr,
                    offset: self.ip,
                },
            })?;
        Ok(Flow::Jump(target))
    }

    fn op_ret(&mut self, _instr: &'static str) -> Result<Flow, MachineError> {
        match self.calls.pop() {
            Ok(address) => Ok(Flow::Goto(address)),
            Err(StackError::Underflow) => Err(MachineError::ReturnWithoutCall { offset: self.ip }),
            Err(StackError::Corrupted(status)) => Err(MachineError::StackCorrupted {
                stack: "call",
                status,
            }),
        }
    }

    // ==================== Legacy register access ====================

    fn op_rget(&mut self, instr: &'static str, reg: i32) -> Result<Flow, MachineError> {
        let value = self.registers.get(reg)?;
        self.push(instr, value)?;
        Ok(Flow::Next)
    }

    fn op_rset(&mut self, instr: &'static str, reg: i32) -> Result<Flow, MachineError> {
        let value = self.peek(instr, 0)?;
        self.registers.set(reg, value)?;
        Ok(Flow::Next)
    }

    // ==================== Console ====================

    fn op_out(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let value = self.peek(instr, 0)?;
        write!(self.output, "{value}")?;
        Ok(Flow::Next)
    }

    fn op_outc(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let value = self.peek(instr, 0)?;
        self.output.write_all(&[value as u8])?;
        Ok(Flow::Next)
    }

    fn op_in(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        self.output.flush()?;
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(MachineError::Input)?;
        let text = line.trim();
        let value = text
            .parse::<i32>()
            .map_err(|_| MachineError::InvalidInput {
                text: text.to_string(),
            })?;
        self.push(instr, value)?;
        Ok(Flow::Next)
    }

    // ==================== Video and memory ====================

    fn op_vset(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let key = self.peek(instr, 0)?;
        let value = self.peek(instr, 1)?;
        self.video.set(key, value)?;
        self.pop(instr)?;
        Ok(Flow::Next)
    }

    fn op_vget(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let key = self.peek(instr, 0)?;
        let value = self.video.get(key)?;
        self.pop(instr)?;
        self.push(instr, value)?;
        Ok(Flow::Next)
    }

    fn op_mset(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let key = self.peek(instr, 0)?;
        let value = self.peek(instr, 1)?;
        *Operand::Memory(key).resolve(self.registers.as_mut_slice(), &mut self.memory)? = value;
        self.pop(instr)?;
        Ok(Flow::Next)
    }

    fn op_mget(&mut self, instr: &'static str) -> Result<Flow, MachineError> {
        let key = self.peek(instr, 0)?;
        let value = Operand::Memory(key).read(self.registers.as_mut_slice(), &mut self.memory)?;
        self.pop(instr)?;
        self.push(instr, value)?;
        Ok(Flow::Next)
    }

    fn op_cclr(&mut self, _instr: &'static str) -> Result<Flow, MachineError> {
        self.output.write_all(CLEAR_SCREEN)?;
        Ok(Flow::Next)
    }

    fn op_draw(&mut self, _instr: &'static str) -> Result<Flow, MachineError> {
        self.video.render(&mut self.output)?;
        Ok(Flow::Next)
    }
}
