//! This module contains the abstract transfer functions: the effect of each
//! opcode category on an abstract machine state.
//!
//! Transfers run after the interpreter has validated the stack shape and
//! performed any memory expansion, so they are free to manipulate the state
//! without re-checking bounds. Every transfer receives an owned state that
//! was cloned at the step boundary, never one shared with the state table.

use ethnum::{I256, U256};

use crate::{
    contract::Contract,
    domain::{state::MachineState, value::AbsValue},
    interpreter::{
        prev_pc::PrevPcMap,
        verdict::{FailureCause, StepResult, Successor},
    },
    opcode,
    opcode::table::{ArithOp, Transfer},
};

/// Applies `transfer` to `machine` at `pc`, producing the successor states
/// or a failure cause.
pub(super) fn execute(
    transfer: Transfer,
    pc: u64,
    contract: &Contract,
    machine: MachineState,
    ppc_map: &PrevPcMap,
) -> StepResult {
    match run(transfer, pc, contract, machine, ppc_map) {
        Ok(successors) => StepResult::Successors(successors),
        Err(cause) => StepResult::MayFail(cause),
    }
}

#[allow(clippy::too_many_lines)] // One arm per opcode category reads best as a unit
fn run(
    transfer: Transfer,
    pc: u64,
    contract: &Contract,
    mut machine: MachineState,
    ppc_map: &PrevPcMap,
) -> Result<Vec<Successor>, FailureCause> {
    match transfer {
        Transfer::Halt => Ok(Vec::new()),
        Transfer::Arith(op) => {
            let mut operands = Vec::with_capacity(op.arity());
            for _ in 0..op.arity() {
                operands.push(pop(&mut machine)?);
            }
            let result = match operands
                .iter()
                .map(|operand| operand.as_known())
                .collect::<Option<Vec<_>>>()
            {
                Some(known) => AbsValue::Known(fold(op, &known)),
                None => AbsValue::Top,
            };
            machine.stack.push(result);
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Push(count) => {
            machine
                .stack
                .push(AbsValue::Known(contract.push_literal(pc, count)));
            Ok(flow_to(pc + 1 + u64::from(count), machine))
        }
        Transfer::Dup(depth) => {
            if !machine.stack.dup(depth as usize) {
                return Err(FailureCause::Internal);
            }
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Swap(depth) => {
            if !machine.stack.swap(depth as usize) {
                return Err(FailureCause::Internal);
            }
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Discard { pops } => {
            for _ in 0..pops {
                pop(&mut machine)?;
            }
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Env { pops } => {
            for _ in 0..pops {
                pop(&mut machine)?;
            }
            machine.stack.push(AbsValue::Top);
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Pc => {
            machine.stack.push(AbsValue::from(pc));
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::MSize => {
            let size = machine
                .memory
                .size()
                .map_or(AbsValue::Top, AbsValue::from);
            machine.stack.push(size);
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::MLoad => {
            let offset = pop(&mut machine)?;
            let value = if machine.memory.is_top() {
                AbsValue::Top
            } else {
                match offset.as_known() {
                    Some(offset) => {
                        let offset =
                            u64::try_from(offset).map_err(|_| FailureCause::Internal)?;
                        machine.memory.read_word(offset)
                    }
                    None => return Err(FailureCause::TopOffset),
                }
            };
            machine.stack.push(value);
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::MStore => {
            let offset = pop(&mut machine)?;
            let value = pop(&mut machine)?;
            if !machine.memory.is_top() {
                match offset.as_known() {
                    Some(offset) => {
                        let offset =
                            u64::try_from(offset).map_err(|_| FailureCause::Internal)?;
                        machine.memory.write_word(offset, value);
                    }
                    None => return Err(FailureCause::TopOffset),
                }
            }
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::MStore8 => {
            let offset = pop(&mut machine)?;
            let value = pop(&mut machine)?;
            if !machine.memory.is_top() {
                match offset.as_known() {
                    Some(offset) => {
                        let offset =
                            u64::try_from(offset).map_err(|_| FailureCause::Internal)?;
                        machine.memory.write_byte(offset, value);
                    }
                    None => return Err(FailureCause::TopOffset),
                }
            }
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::MemCopy {
            pops,
            dest_depth,
            len_depth,
        } => {
            let dest = machine.stack.peek(dest_depth);
            let len = machine.stack.peek(len_depth);
            for _ in 0..pops {
                pop(&mut machine)?;
            }
            invalidate_written_region(&mut machine, dest, len)?;
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Jump => {
            let target = pop(&mut machine)?;
            let target = resolve_jump_target(target, pc, ppc_map, contract)
                .ok_or(FailureCause::JumpToTop)?;
            Ok(flow_to(validate_jump_dest(target, contract)?, machine))
        }
        Transfer::JumpI => {
            let target = pop(&mut machine)?;
            let condition = pop(&mut machine)?;
            match condition.as_known() {
                Some(condition) if condition == U256::ZERO => Ok(flow_to(pc + 1, machine)),
                Some(_) => {
                    let target = resolve_jump_target(target, pc, ppc_map, contract)
                        .ok_or(FailureCause::JumpToTop)?;
                    Ok(flow_to(validate_jump_dest(target, contract)?, machine))
                }
                None => {
                    let target = resolve_jump_target(target, pc, ppc_map, contract)
                        .ok_or(FailureCause::JumpToTop)?;
                    let target = validate_jump_dest(target, contract)?;
                    let mut successors = flow_to(pc + 1, machine.clone());
                    successors.extend(flow_to(target, machine));
                    Ok(successors)
                }
            }
        }
        Transfer::JumpDest => Ok(flow_to(pc + 1, machine)),
        Transfer::Log(topics) => {
            for _ in 0..topics as usize + 2 {
                pop(&mut machine)?;
            }
            Ok(flow_to(pc + 1, machine))
        }
        Transfer::Call { pops, out_region } => {
            let region = out_region.map(|(offset_depth, len_depth)| {
                (machine.stack.peek(offset_depth), machine.stack.peek(len_depth))
            });
            for _ in 0..pops {
                pop(&mut machine)?;
            }
            machine.stack.push(AbsValue::Top);
            if let Some((dest, len)) = region {
                invalidate_written_region(&mut machine, dest, len)?;
            }
            Ok(flow_to(pc + 1, machine))
        }
    }
}

/// Pops a stack frame that the shape check has already guaranteed to exist.
fn pop(machine: &mut MachineState) -> Result<AbsValue, FailureCause> {
    machine.stack.pop().ok_or(FailureCause::Internal)
}

/// Builds the single-successor flow into `pc`.
fn flow_to(pc: u64, machine: MachineState) -> Vec<Successor> {
    vec![Successor { pc, state: machine }]
}

/// Marks the memory region written by an external-data copy as unknown.
///
/// A zero-length copy writes nothing. When the memory still has a concrete
/// shape the region operands must be concrete as well (an unknown operand
/// would already have widened the memory during expansion); an unknown
/// operand here reports a failure instead of silently mis-tracking memory.
fn invalidate_written_region(
    machine: &mut MachineState,
    dest: Option<AbsValue>,
    len: Option<AbsValue>,
) -> Result<(), FailureCause> {
    if machine.memory.is_top() {
        return Ok(());
    }
    let (Some(dest), Some(len)) = (dest, len) else {
        return Err(FailureCause::Internal);
    };
    match (dest.as_known(), len.as_known()) {
        (_, Some(len)) if len == U256::ZERO => Ok(()),
        (Some(dest), Some(len)) => {
            let dest = u64::try_from(dest).map_err(|_| FailureCause::Internal)?;
            let len = u64::try_from(len).map_err(|_| FailureCause::Internal)?;
            machine.memory.invalidate_region(dest, len);
            Ok(())
        }
        _ => Err(FailureCause::TopOffset),
    }
}

/// Determines the concrete target of a jump.
///
/// A concretely known operand is used directly. An unknown operand is
/// re-resolved by peeking backwards through the predecessor map for the
/// literal that produced it: a push directly before the jump, possibly
/// duplicated to the top of the stack on the way. Ambiguous predecessors
/// yield no target.
fn resolve_jump_target(
    target: AbsValue,
    pc: u64,
    ppc_map: &PrevPcMap,
    contract: &Contract,
) -> Option<U256> {
    if let Some(target) = target.as_known() {
        return Some(target);
    }

    let mut current = pc;
    for hops in 0..2 {
        let previous = ppc_map.get(current)?;
        let op = contract.op_at(previous);
        if let Some(count) = opcode::push_byte_count(op) {
            return (previous + 1 + u64::from(count) == current)
                .then(|| contract.push_literal(previous, count));
        }
        // A DUP1 re-exposes the value that was already on top, so the walk
        // may continue through it once.
        if hops == 0 && opcode::dup_depth(op) == Some(1) {
            current = previous;
            continue;
        }
        return None;
    }
    None
}

/// Checks that `target` is a valid jump destination and converts it to a
/// program counter.
fn validate_jump_dest(target: U256, contract: &Contract) -> Result<u64, FailureCause> {
    if !contract.is_valid_jump_dest(target) {
        return Err(FailureCause::InvalidOpcode);
    }
    u64::try_from(target).map_err(|_| FailureCause::Internal)
}

/// Computes the concrete result of a stack-only operation, in the EVM's
/// 256-bit modular arithmetic. Operands appear in the order they were popped
/// from the stack.
fn fold(op: ArithOp, args: &[U256]) -> U256 {
    match op {
        ArithOp::Add => args[0].wrapping_add(args[1]),
        ArithOp::Mul => args[0].wrapping_mul(args[1]),
        ArithOp::Sub => args[0].wrapping_sub(args[1]),
        ArithOp::Div => checked_div(args[0], args[1]),
        ArithOp::SDiv => signed_div(args[0], args[1]),
        ArithOp::Mod => checked_rem(args[0], args[1]),
        ArithOp::SMod => signed_rem(args[0], args[1]),
        ArithOp::AddMod => add_mod(args[0], args[1], args[2]),
        ArithOp::MulMod => mul_mod(args[0], args[1], args[2]),
        ArithOp::Exp => wrapping_exp(args[0], args[1]),
        ArithOp::SignExtend => sign_extend(args[0], args[1]),
        ArithOp::Lt => bool_word(args[0] < args[1]),
        ArithOp::Gt => bool_word(args[0] > args[1]),
        ArithOp::SLt => bool_word(args[0].as_i256() < args[1].as_i256()),
        ArithOp::SGt => bool_word(args[0].as_i256() > args[1].as_i256()),
        ArithOp::Eq => bool_word(args[0] == args[1]),
        ArithOp::IsZero => bool_word(args[0] == U256::ZERO),
        ArithOp::And => args[0] & args[1],
        ArithOp::Or => args[0] | args[1],
        ArithOp::Xor => args[0] ^ args[1],
        ArithOp::Not => !args[0],
        ArithOp::Byte => byte(args[0], args[1]),
        ArithOp::Shl => shift_left(args[0], args[1]),
        ArithOp::Shr => shift_right(args[0], args[1]),
        ArithOp::Sar => shift_right_signed(args[0], args[1]),
    }
}

fn bool_word(value: bool) -> U256 {
    if value { U256::ONE } else { U256::ZERO }
}

/// Division with the EVM's divide-by-zero-is-zero convention.
fn checked_div(a: U256, b: U256) -> U256 {
    if b == U256::ZERO { U256::ZERO } else { a / b }
}

fn checked_rem(a: U256, b: U256) -> U256 {
    if b == U256::ZERO { U256::ZERO } else { a % b }
}

fn signed_div(a: U256, b: U256) -> U256 {
    if b == U256::ZERO {
        return U256::ZERO;
    }
    a.as_i256().wrapping_div(b.as_i256()).as_u256()
}

/// Signed remainder; the result takes the sign of the dividend.
fn signed_rem(a: U256, b: U256) -> U256 {
    if b == U256::ZERO {
        return U256::ZERO;
    }
    a.as_i256().wrapping_rem(b.as_i256()).as_u256()
}

/// `(a + b) % m` without the intermediate overflowing 256 bits. Zero modulus
/// yields zero.
fn add_mod(a: U256, b: U256, m: U256) -> U256 {
    if m == U256::ZERO {
        return U256::ZERO;
    }
    reduced_add(a % m, b % m, m)
}

/// `(a * b) % m` by shift-and-add, without a 512-bit intermediate. Zero
/// modulus yields zero.
fn mul_mod(a: U256, b: U256, m: U256) -> U256 {
    if m == U256::ZERO {
        return U256::ZERO;
    }
    let mut result = U256::ZERO;
    let mut addend = a % m;
    let mut remaining = b;
    while remaining != U256::ZERO {
        if remaining & U256::ONE == U256::ONE {
            result = reduced_add(result, addend, m);
        }
        addend = reduced_add(addend, addend, m);
        remaining >>= 1u32;
    }
    result
}

/// Adds two values already reduced below `m`, reducing the sum. The sum of
/// two reduced values is below `2m`, so a single conditional subtraction
/// suffices even when the addition wraps.
fn reduced_add(a: U256, b: U256, m: U256) -> U256 {
    let (sum, carried) = a.overflowing_add(b);
    if carried || sum >= m {
        sum.wrapping_sub(m)
    } else {
        sum
    }
}

/// `base ** exponent` in wrapping arithmetic, by square-and-multiply over
/// the exponent's bits.
fn wrapping_exp(base: U256, exponent: U256) -> U256 {
    let mut result = U256::ONE;
    for byte in exponent.to_be_bytes() {
        for bit in (0..8).rev() {
            result = result.wrapping_mul(result);
            if byte >> bit & 1 == 1 {
                result = result.wrapping_mul(base);
            }
        }
    }
    result
}

/// Extends the sign bit of the `b + 1`-byte-wide value `x` to the full word.
fn sign_extend(b: U256, x: U256) -> U256 {
    if b >= U256::from(31u128) {
        return x;
    }
    let Ok(b) = u32::try_from(b) else {
        return x;
    };
    let bit_index = b * 8 + 7;
    let mask = (U256::ONE << (bit_index + 1)) - U256::ONE;
    if x >> bit_index & U256::ONE == U256::ONE {
        x | !mask
    } else {
        x & mask
    }
}

/// Extracts byte `index` of `value`, counting from the most significant.
fn byte(index: U256, value: U256) -> U256 {
    match usize::try_from(index) {
        Ok(index) if index < 32 => U256::from(u128::from(value.to_be_bytes()[index])),
        _ => U256::ZERO,
    }
}

fn shift_left(shift: U256, value: U256) -> U256 {
    match u32::try_from(shift) {
        Ok(shift) if shift < 256 => value << shift,
        _ => U256::ZERO,
    }
}

fn shift_right(shift: U256, value: U256) -> U256 {
    match u32::try_from(shift) {
        Ok(shift) if shift < 256 => value >> shift,
        _ => U256::ZERO,
    }
}

/// Arithmetic right shift; over-wide shifts saturate to the sign.
fn shift_right_signed(shift: U256, value: U256) -> U256 {
    let signed = value.as_i256();
    match u32::try_from(shift) {
        Ok(shift) if shift < 256 => (signed >> shift).as_u256(),
        _ => {
            if signed < I256::ZERO {
                U256::MAX
            } else {
                U256::ZERO
            }
        }
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use super::{fold, resolve_jump_target};
    use crate::{
        contract::{CodeHash, Contract},
        domain::value::AbsValue,
        interpreter::prev_pc::PrevPcMap,
        opcode,
        opcode::table::ArithOp,
    };

    fn u(value: u128) -> U256 {
        U256::from(value)
    }

    /// The two's-complement encoding of a small negative number.
    fn negative(value: u128) -> U256 {
        U256::ZERO.wrapping_sub(U256::from(value))
    }

    #[test]
    fn addition_and_subtraction_wrap() {
        assert_eq!(fold(ArithOp::Add, &[U256::MAX, u(1)]), U256::ZERO);
        assert_eq!(fold(ArithOp::Sub, &[U256::ZERO, u(1)]), U256::MAX);
        assert_eq!(fold(ArithOp::Add, &[u(2), u(3)]), u(5));
    }

    #[test]
    fn division_by_zero_is_zero() {
        assert_eq!(fold(ArithOp::Div, &[u(10), U256::ZERO]), U256::ZERO);
        assert_eq!(fold(ArithOp::SDiv, &[u(10), U256::ZERO]), U256::ZERO);
        assert_eq!(fold(ArithOp::Mod, &[u(10), U256::ZERO]), U256::ZERO);
        assert_eq!(fold(ArithOp::SMod, &[u(10), U256::ZERO]), U256::ZERO);
    }

    #[test]
    fn signed_division_respects_signs() {
        assert_eq!(fold(ArithOp::SDiv, &[negative(4), u(2)]), negative(2));
        assert_eq!(fold(ArithOp::SDiv, &[negative(4), negative(2)]), u(2));
        assert_eq!(fold(ArithOp::Div, &[negative(4), u(2)]), negative(4) / u(2));
    }

    #[test]
    fn signed_remainder_takes_the_dividend_sign() {
        assert_eq!(fold(ArithOp::SMod, &[negative(5), u(3)]), negative(2));
        assert_eq!(fold(ArithOp::SMod, &[u(5), negative(3)]), u(2));
    }

    #[test]
    fn modular_addition_survives_carries() {
        assert_eq!(fold(ArithOp::AddMod, &[U256::MAX, u(2), u(3)]), u(2));

        let half = U256::ONE << 255u32;
        let result = fold(ArithOp::AddMod, &[half + u(1), half + u(2), half + u(3)]);
        assert_eq!(result, half);

        assert_eq!(fold(ArithOp::AddMod, &[u(1), u(2), U256::ZERO]), U256::ZERO);
    }

    #[test]
    fn modular_multiplication_survives_wide_products() {
        assert_eq!(fold(ArithOp::MulMod, &[U256::MAX, U256::MAX, u(7)]), u(1));
        assert_eq!(fold(ArithOp::MulMod, &[u(6), u(7), u(10)]), u(2));
        assert_eq!(fold(ArithOp::MulMod, &[u(6), u(7), U256::ZERO]), U256::ZERO);
    }

    #[test]
    fn exponentiation_wraps() {
        assert_eq!(fold(ArithOp::Exp, &[u(2), u(10)]), u(1024));
        assert_eq!(fold(ArithOp::Exp, &[u(2), u(256)]), U256::ZERO);
        assert_eq!(fold(ArithOp::Exp, &[u(3), U256::ZERO]), u(1));
    }

    #[test]
    fn sign_extension_widens_the_sign_bit() {
        assert_eq!(fold(ArithOp::SignExtend, &[u(0), u(0xff)]), U256::MAX);
        assert_eq!(fold(ArithOp::SignExtend, &[u(0), u(0x7f)]), u(0x7f));
        assert_eq!(
            fold(ArithOp::SignExtend, &[u(1), u(0x8000)]),
            U256::MAX - u(0x7fff)
        );
        assert_eq!(fold(ArithOp::SignExtend, &[u(31), u(0xff)]), u(0xff));
    }

    #[test]
    fn comparisons_encode_booleans() {
        assert_eq!(fold(ArithOp::Lt, &[u(1), u(2)]), u(1));
        assert_eq!(fold(ArithOp::Gt, &[u(1), u(2)]), U256::ZERO);
        assert_eq!(fold(ArithOp::SLt, &[negative(1), u(0)]), u(1));
        assert_eq!(fold(ArithOp::SGt, &[u(0), negative(1)]), u(1));
        assert_eq!(fold(ArithOp::Eq, &[u(5), u(5)]), u(1));
        assert_eq!(fold(ArithOp::IsZero, &[U256::ZERO]), u(1));
        assert_eq!(fold(ArithOp::IsZero, &[u(3)]), U256::ZERO);
    }

    #[test]
    fn byte_extraction_counts_from_the_most_significant() {
        let msb_set = u(0xab) << 248u32;
        assert_eq!(fold(ArithOp::Byte, &[u(0), msb_set]), u(0xab));
        assert_eq!(fold(ArithOp::Byte, &[u(31), u(0xab)]), u(0xab));
        assert_eq!(fold(ArithOp::Byte, &[u(32), U256::MAX]), U256::ZERO);
    }

    #[test]
    fn shifts_saturate_beyond_the_word_width() {
        assert_eq!(fold(ArithOp::Shl, &[u(4), u(1)]), u(16));
        assert_eq!(fold(ArithOp::Shl, &[u(256), u(1)]), U256::ZERO);
        assert_eq!(fold(ArithOp::Shr, &[u(4), u(16)]), u(1));
        assert_eq!(fold(ArithOp::Shr, &[u(256), U256::MAX]), U256::ZERO);
        assert_eq!(fold(ArithOp::Sar, &[u(4), negative(16)]), U256::MAX);
        assert_eq!(fold(ArithOp::Sar, &[u(300), negative(1)]), U256::MAX);
        assert_eq!(fold(ArithOp::Sar, &[u(300), u(12)]), U256::ZERO);
    }

    #[test]
    fn recovers_a_pushed_jump_target_through_the_predecessor() {
        // PUSH2 0x00aa; JUMP
        let code = vec![opcode::PUSH1 + 1, 0x00, 0xaa, opcode::JUMP];
        let contract = Contract::synthetic(code.clone(), CodeHash::of(&code));
        let mut map = PrevPcMap::new();
        map.record(3, 0);

        let target = resolve_jump_target(AbsValue::Top, 3, &map, &contract);
        assert_eq!(target, Some(U256::from(0xaau128)));
    }

    #[test]
    fn recovers_a_pushed_jump_target_through_a_dup() {
        // PUSH1 0x0a; DUP1; JUMP
        let code = vec![opcode::PUSH1, 0x0a, opcode::DUP1, opcode::JUMP];
        let contract = Contract::synthetic(code.clone(), CodeHash::of(&code));
        let mut map = PrevPcMap::new();
        map.record(3, 2);
        map.record(2, 0);

        let target = resolve_jump_target(AbsValue::Top, 3, &map, &contract);
        assert_eq!(target, Some(U256::from(0x0au128)));
    }

    #[test]
    fn ambiguous_predecessors_yield_no_target() {
        let code = vec![opcode::PUSH1, 0x0a, opcode::JUMP];
        let contract = Contract::synthetic(code.clone(), CodeHash::of(&code));
        let mut map = PrevPcMap::new();
        map.record(2, 0);
        map.record(2, 1);

        assert_eq!(resolve_jump_target(AbsValue::Top, 2, &map, &contract), None);
    }
}
