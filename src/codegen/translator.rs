use super::bytecode::{Address, ByteCode, Program};
use super::externs::{ExternRegistry, ExternSignature};
use super::heap::{HeapLayout, RETURN_SLOT};
use crate::error::{CompileError, CompileResult};
use crate::ir::ssa::sequentialize_copies;
use crate::ir::{
    next_temp_id, BinaryOp, ConstValue, FunctionInfo, NumericKind, Operand, TacUnit, Tac, TempId, Type, UnaryOp,
};
use crate::session::Session;

pub const CTOR_PREFIX: &str = "__ctor_";

/// Splits `Namespace.Owner.Member` into owner and member.
fn split_native(func: &str) -> CompileResult<(&str, &str)> {
    func.rsplit_once('.')
        .ok_or_else(|| CompileError::Unsupported(format!("call to `{func}` names no owner type")))
}

/// Lowers one optimized unit. Holds the heap layout and the emitted code
/// while walking the instruction list once.
pub struct CodeGenerator<'a> {
    unit: &'a TacUnit,
    registry: &'a ExternRegistry,
    session: &'a mut Session,
    heap: HeapLayout,
    code: Vec<ByteCode>,
    next_temp: TempId,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(unit: &'a TacUnit, registry: &'a ExternRegistry, session: &'a mut Session) -> Self {
        Self {
            unit,
            registry,
            session,
            heap: HeapLayout::new(),
            code: vec![],
            next_temp: next_temp_id(&unit.instructions),
        }
    }

    pub fn generate(mut self) -> CompileResult<Program> {
        for var in self.unit.variables.iter() {
            self.check_type(&var.ty);
            self.heap.variable(var);
        }

        let unit = self.unit;
        let instrs = &unit.instructions;
        let mut skip_return = false;

        for (i, instr) in instrs.iter().enumerate() {
            if skip_return {
                skip_return = false;

                if matches!(instr, Tac::Return { .. }) {
                    continue;
                }
            }

            let jumped = self.translate(instr)?;
            skip_return = jumped && matches!(instrs.get(i + 1), Some(Tac::Return { .. }));
        }

        log::debug!(
            "generated {} instructions and {} heap slots",
            self.code.len(),
            self.heap.len()
        );

        Ok(Program {
            code: self.code,
            data: self.heap.into_entries(),
            exports: self.unit.entry_points.clone(),
        })
    }

    fn check_type(&mut self, ty: &Type) {
        if !self.registry.knows_type(ty) {
            let name = ty.udon_name();

            self.session.warn_once(
                &format!("unknown-type:{name}"),
                &format!("type `{name}` does not appear in any registered native"),
            );
        }
    }

    fn address(&mut self, operand: &Operand) -> CompileResult<Address> {
        match operand {
            Operand::Variable(var) if var.version.is_none() => {
                self.check_type(&var.ty);
                Ok(self.heap.variable(var))
            }
            Operand::Temporary { id, ty, version: None } => {
                self.check_type(ty);
                Ok(self.heap.temporary(*id, ty))
            }
            Operand::Constant { value, ty } => Ok(self.heap.constant(value, ty)),
            Operand::Variable(_) | Operand::Temporary { .. } => Err(CompileError::MalformedIr(format!(
                "versioned operand `{operand}` outside SSA form"
            ))),
            Operand::Label(name) => Err(CompileError::MalformedIr(format!("label `{name}` used as a value"))),
        }
    }

    fn push(&mut self, address: Address) {
        self.code.push(ByteCode::Push(address));
    }

    fn copy(&mut self, src: Address, dest: Address) {
        if src != dest {
            self.push(src);
            self.push(dest);
            self.code.push(ByteCode::Copy);
        }
    }

    /// Pushes the inputs and the result slot, then invokes the native. A
    /// result nobody reads still needs a slot to land in.
    fn call_extern(&mut self, sig: &ExternSignature, inputs: &[Address], output: Option<Address>) {
        for address in inputs.iter() {
            self.push(*address);
        }

        if sig.returns_value() {
            let address = match output {
                Some(address) => address,
                None => self.heap.scratch(&sig.ret),
            };

            self.push(address);
        }

        let symbol = self.heap.extern_symbol(&sig.signature());
        self.code.push(ByteCode::Extern(symbol));
    }

    fn addresses(&mut self, operands: &[Operand]) -> CompileResult<Vec<Address>> {
        operands.iter().map(|operand| self.address(operand)).collect()
    }

    fn output(&mut self, dest: &Option<Operand>) -> CompileResult<Option<Address>> {
        dest.as_ref().map(|dest| self.address(dest)).transpose()
    }

    /// Emits the bytecode of one instruction. Returns true when it ended in
    /// a jump into an internal routine, which makes a following `Return`
    /// unreachable.
    fn translate(&mut self, instr: &Tac) -> CompileResult<bool> {
        match instr {
            Tac::Assign { dest, src } | Tac::Copy { dest, src } => {
                let src = self.address(src)?;
                let dest = self.address(dest)?;

                self.copy(src, dest);
            }
            Tac::Binary { dest, left, op, right } => self.translate_binary(dest, left, *op, right)?,
            Tac::Unary { dest, op, operand } => self.translate_unary(dest, *op, operand)?,
            Tac::Cast { dest, src } => self.translate_cast(dest, src)?,
            Tac::CondJump { cond, label } => {
                let cond = self.address(cond)?;

                self.push(cond);
                self.code.push(ByteCode::JumpIfFalse(label.clone()));
            }
            Tac::Jump { label } => self.code.push(ByteCode::jump_to(label)),
            Tac::Label { label } => self.code.push(ByteCode::Label(label.clone())),
            Tac::Call {
                dest,
                func,
                args,
                tail_call,
            } => {
                let unit = self.unit;

                if let Some(routine) = unit.get_function(func) {
                    if !tail_call {
                        return Err(CompileError::Unsupported(format!(
                            "call to routine `{func}` outside tail position"
                        )));
                    }

                    self.tail_jump(routine, args)?;
                    return Ok(true);
                }

                self.translate_native_call(dest, func, args)?;
            }
            Tac::MethodCall {
                dest,
                object,
                method,
                args,
                ..
            } => {
                let arg_types: Vec<Type> = args.iter().map(Operand::ty_or_object).collect();
                let sig = self.registry.resolve_on(&object.ty_or_object(), method, &arg_types)?;
                let mut inputs = vec![self.address(object)?];
                inputs.extend(self.addresses(args)?);
                let output = self.output(dest)?;

                self.call_extern(&sig, &inputs, output);
            }
            Tac::PropertyGet { dest, object, property } => {
                let sig = self
                    .registry
                    .resolve_on(&object.ty_or_object(), &format!("get_{property}"), &[])?;
                let inputs = [self.address(object)?];
                let output = self.address(dest)?;

                self.call_extern(&sig, &inputs, Some(output));
            }
            Tac::PropertySet { object, property, value } => {
                let sig = self.registry.resolve_on(
                    &object.ty_or_object(),
                    &format!("set_{property}"),
                    &[value.ty_or_object()],
                )?;
                let inputs = [self.address(object)?, self.address(value)?];

                self.call_extern(&sig, &inputs, None);
            }
            Tac::ArrayAccess { dest, array, index } => {
                let sig = self
                    .registry
                    .resolve_on(&array.ty_or_object(), "Get", &[index.ty_or_object()])?;
                let inputs = [self.address(array)?, self.address(index)?];
                let output = self.address(dest)?;

                self.call_extern(&sig, &inputs, Some(output));
            }
            Tac::ArrayAssign { array, index, value } => {
                let sig = self.registry.resolve_on(
                    &array.ty_or_object(),
                    "Set",
                    &[index.ty_or_object(), value.ty_or_object()],
                )?;
                let inputs = [self.address(array)?, self.address(index)?, self.address(value)?];

                self.call_extern(&sig, &inputs, None);
            }
            Tac::Return { value, return_var } => {
                if let Some(value) = value {
                    let src = self.address(value)?;
                    let slot = self
                        .heap
                        .named(return_var.as_deref().unwrap_or(RETURN_SLOT), &value.ty_or_object());

                    self.copy(src, slot);
                }

                self.code.push(ByteCode::exit());
            }
            Tac::Phi { dest, .. } => {
                return Err(CompileError::MalformedIr(format!(
                    "phi for `{dest}` reached code generation"
                )));
            }
        }

        Ok(false)
    }

    fn translate_binary(&mut self, dest: &Operand, left: &Operand, op: BinaryOp, right: &Operand) -> CompileResult<()> {
        let left_ty = left.ty_or_object();
        let right_ty = right.ty_or_object();

        let (owner, member) = if op == BinaryOp::Add && (left_ty.is_string() || right_ty.is_string()) {
            (Type::String, "Concat")
        } else {
            (left_ty.clone(), op.overload_name())
        };

        let sig = self.registry.resolve_on(&owner, member, &[left_ty, right_ty])?;
        let inputs = [self.address(left)?, self.address(right)?];
        let output = self.address(dest)?;

        self.call_extern(&sig, &inputs, Some(output));
        Ok(())
    }

    fn translate_unary(&mut self, dest: &Operand, op: UnaryOp, operand: &Operand) -> CompileResult<()> {
        let ty = operand.ty_or_object();
        let output = self.address(dest)?;

        match op {
            UnaryOp::Neg | UnaryOp::Not => {
                let sig = self.registry.resolve_on(&ty, op.overload_name(), &[ty.clone()])?;
                let inputs = [self.address(operand)?];

                self.call_extern(&sig, &inputs, Some(output));
            }
            UnaryOp::BitNot => {
                // ~x == x ^ all-ones
                let ones = ty
                    .numeric_kind()
                    .and_then(|kind| {
                        let (_, max) = kind.int_range()?;
                        ConstValue::from_i128(if kind.is_unsigned() { max } else { -1 }, kind)
                    })
                    .ok_or_else(|| CompileError::Unsupported(format!("`~` on {ty}")))?;

                let sig = self
                    .registry
                    .resolve_on(&ty, op.overload_name(), &[ty.clone(), ty.clone()])?;
                let mask = self.heap.constant(&ones, &ty);
                let inputs = [self.address(operand)?, mask];

                self.call_extern(&sig, &inputs, Some(output));
            }
        }

        Ok(())
    }

    fn convert(&mut self, from: &Type, to: NumericKind, input: Address, output: Address) -> CompileResult<()> {
        let sig = self
            .registry
            .resolve("System.Convert", to.convert_name(), &[from.clone()])?;

        self.call_extern(&sig, &[input], Some(output));
        Ok(())
    }

    fn translate_cast(&mut self, dest: &Operand, src: &Operand) -> CompileResult<()> {
        let from = src.ty_or_object();
        let to = dest.ty_or_object();
        let input = self.address(src)?;
        let output = self.address(dest)?;

        if from.udon_name() == to.udon_name() {
            self.copy(input, output);
            return Ok(());
        }

        match (&from, &to) {
            (_, Type::String) => {
                let sig = self.registry.resolve_on(&from, "ToString", &[])?;
                self.call_extern(&sig, &[input], Some(output));
            }
            // truncate toward zero, the conversion alone would round
            (Type::Numeric(f), Type::Numeric(t)) if f.is_float() && t.is_integer() => {
                let wide = self.heap.scratch(&Type::DOUBLE);
                let mut value = input;

                if *f == NumericKind::Single {
                    self.convert(&from, NumericKind::Double, input, wide)?;
                    value = wide;
                }

                let truncate = self.registry.resolve("System.Math", "Truncate", &[Type::DOUBLE])?;
                self.call_extern(&truncate, &[value], Some(wide));
                self.convert(&Type::DOUBLE, *t, wide, output)?;
            }
            (Type::Numeric(_) | Type::Boolean | Type::String, Type::Numeric(t)) => {
                self.convert(&from, *t, input, output)?;
            }
            (Type::Numeric(_) | Type::String, Type::Boolean) => {
                let sig = self.registry.resolve("System.Convert", "ToBoolean", &[from.clone()])?;
                self.call_extern(&sig, &[input], Some(output));
            }
            (_, to) if to.is_reference() => {
                self.copy(input, output);
            }
            _ => return Err(CompileError::Unsupported(format!("cast from {from} to {to}"))),
        }

        Ok(())
    }

    /// Binds the arguments to the routine's parameters as one parallel copy,
    /// then jumps to its label.
    fn tail_jump(&mut self, routine: &FunctionInfo, args: &[Operand]) -> CompileResult<()> {
        if routine.params.len() != args.len() {
            return Err(CompileError::MalformedIr(format!(
                "`{}` takes {} arguments, got {}",
                routine.name,
                routine.params.len(),
                args.len()
            )));
        }

        let moves = routine
            .params
            .iter()
            .map(|param| Operand::var(param.clone()))
            .zip(args.iter().cloned())
            .collect();

        for copy in sequentialize_copies(moves, &mut self.next_temp).iter() {
            if let Tac::Copy { dest, src } = copy {
                let src = self.address(src)?;
                let dest = self.address(dest)?;

                self.copy(src, dest);
            }
        }

        self.code.push(ByteCode::jump_to(&routine.label));
        Ok(())
    }

    fn translate_native_call(&mut self, dest: &Option<Operand>, func: &str, args: &[Operand]) -> CompileResult<()> {
        let arg_types: Vec<Type> = args.iter().map(Operand::ty_or_object).collect();

        let sig = match (func.strip_prefix(CTOR_PREFIX), dest) {
            (Some(_), Some(dest)) => self.registry.resolve_on(&dest.ty_or_object(), "ctor", &arg_types)?,
            (Some(owner), None) => self.registry.resolve(owner, "ctor", &arg_types)?,
            (None, _) => {
                let (owner, member) = split_native(func)?;
                self.registry.resolve(owner, member, &arg_types)?
            }
        };

        let inputs = self.addresses(args)?;
        let output = self.output(dest)?;

        self.call_extern(&sig, &inputs, output);
        Ok(())
    }
}

/// Lowers an optimized unit to bytecode and its data section.
pub fn generate(unit: &TacUnit, registry: &ExternRegistry, session: &mut Session) -> CompileResult<Program> {
    CodeGenerator::new(unit, registry, session).generate()
}
