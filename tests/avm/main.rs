//! Integration tests for the virtual machine, organized by feature
//!
//! Every test VM collects diagnostics in memory and reads time from a
//! [`ManualClock`] starting at 0, so interval and pause behavior is
//! deterministic.

mod continuation;
mod dom;
mod drivers;
mod intervals;
mod operators;
mod preload;
mod stream;

use avm::{
    DiagnosticLevel, Instruction, InstructionStream, ManualClock, MemoryDiagnostics, Opcode,
    Operand, PreloadFlags, Value, VirtualMachine, VmError, VmOptions,
};

/// A VM plus handles on its diagnostics buffer and clock
pub struct TestVm {
    pub vm: VirtualMachine,
    pub diagnostics: MemoryDiagnostics,
    pub clock: ManualClock,
}

impl TestVm {
    pub fn warnings(&self) -> Vec<String> {
        self.diagnostics.messages(DiagnosticLevel::Warn)
    }

    pub fn global(&self, name: &str) -> Value {
        self.vm.global_object().get_value(name).unwrap_or_default()
    }

    pub fn global_this(&self) -> Value {
        Value::Object(self.vm.global_object().clone())
    }
}

pub fn create_test_vm() -> TestVm {
    create_test_vm_with(VmOptions::new())
}

pub fn create_test_vm_with(options: VmOptions) -> TestVm {
    let diagnostics = MemoryDiagnostics::new();
    let clock = ManualClock::new(0);
    let options = options
        .with_diagnostics(diagnostics.clone())
        .with_time_provider(clock.clone());
    TestVm {
        vm: VirtualMachine::new(options),
        diagnostics,
        clock,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Instruction builders
// ═══════════════════════════════════════════════════════════════════════════════

fn operand_size(operand: &Operand) -> usize {
    match operand {
        Operand::String(s) => s.len() + 2,
        Operand::Integer(_) => 5,
        Operand::Float(_) => 9,
        Operand::Boolean(_) | Operand::Register(_) | Operand::Constant(_) => 2,
        Operand::Undefined | Operand::Null => 1,
    }
}

/// Instruction with a size derived from its operands
pub fn inst(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
    let size = 3 + operands.iter().map(operand_size).sum::<usize>();
    Instruction::new(opcode, operands, size)
}

pub fn op(opcode: Opcode) -> Instruction {
    Instruction::simple(opcode)
}

pub fn s(text: &str) -> Operand {
    Operand::String(text.to_string())
}

pub fn int(value: i32) -> Operand {
    Operand::Integer(value)
}

pub fn push(operands: Vec<Operand>) -> Instruction {
    inst(Opcode::PushData, operands)
}

/// `EA_PushRegister`, `SetRegister` and friends
pub fn reg(opcode: Opcode, register: u8) -> Instruction {
    Instruction::new(opcode, vec![Operand::Register(register)], 2)
}

pub fn branch(opcode: Opcode, offset: usize, backward: bool) -> Instruction {
    let offset = i32::try_from(offset).unwrap();
    let offset = if backward { -offset } else { offset };
    Instruction::new(opcode, vec![Operand::Integer(offset)], 5)
}

pub fn byte_len(instructions: &[Instruction]) -> usize {
    instructions.iter().map(|i| i.size).sum()
}

/// `DefineFunction` followed by its body
pub fn define_function(name: &str, params: &[&str], body: Vec<Instruction>) -> Vec<Instruction> {
    let mut operands = vec![s(name), int(i32::try_from(params.len()).unwrap())];
    operands.extend(params.iter().map(|p| s(p)));
    operands.push(int(i32::try_from(byte_len(&body)).unwrap()));
    let mut out = vec![inst(Opcode::DefineFunction, operands)];
    out.extend(body);
    out
}

/// `DefineFunction2` followed by its body. Parameters are `(register, name)`.
pub fn define_function2(
    name: &str,
    registers: i32,
    flags: PreloadFlags,
    params: &[(u8, &str)],
    body: Vec<Instruction>,
) -> Vec<Instruction> {
    let mut operands = vec![
        s(name),
        int(i32::try_from(params.len()).unwrap()),
        int(registers),
        int(i32::try_from(flags.bits()).unwrap()),
    ];
    for (register, param) in params {
        operands.push(int(i32::from(*register)));
        operands.push(s(param));
    }
    operands.push(int(i32::try_from(byte_len(&body)).unwrap()));
    let mut out = vec![inst(Opcode::DefineFunction2, operands)];
    out.extend(body);
    out
}

/// Call a global function: arguments are pushed last-to-first
pub fn call(name: &str, args: Vec<Operand>) -> Vec<Instruction> {
    let mut operands: Vec<Operand> = args.into_iter().rev().collect();
    operands.push(int(i32::try_from(operands.len()).unwrap()));
    operands.push(s(name));
    vec![push(operands), op(Opcode::CallFunction)]
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runners
// ═══════════════════════════════════════════════════════════════════════════════

/// Run `instructions` as a root script with the global object as `this`
pub fn run(t: &mut TestVm, instructions: Vec<Instruction>) -> Result<(), VmError> {
    let this = t.global_this();
    let ctx = t
        .vm
        .create_context("test", InstructionStream::new(instructions), this);
    t.vm.push_context(ctx);
    t.vm.execute_until_empty()
}

/// Run a script that leaves its result in the global `result`
pub fn eval(instructions: Vec<Instruction>) -> Value {
    let mut t = create_test_vm();
    let mut script = vec![push(vec![s("result")])];
    script.extend(instructions);
    script.push(op(Opcode::SetVariable));
    run(&mut t, script).unwrap();
    t.global("result")
}

pub fn assert_number(value: &Value, expected: f64) {
    assert!(value.is_number(), "expected a number, got {value:?}");
    assert_eq!(value.to_float(), expected);
}

pub fn assert_string(value: &Value, expected: &str) {
    assert_eq!(value.as_str(), Some(expected), "got {value:?}");
}
