use pretty_assertions::assert_eq;
use std::collections::HashMap;
use tacvm::ir::optimizer::{optimize_unit, GvnMode, OptimizerConfig};
use tacvm::ir::{BinaryOp, ConstValue, NumericKind, Operand, OperandKey, Tac, TacUnit, Type, UnaryOp, Variable};

const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl Value {
    fn of(value: &ConstValue) -> Self {
        match value {
            ConstValue::Int(i) => Value::Int(*i),
            ConstValue::UInt(u) => Value::Int(*u as i64),
            ConstValue::Float(f) => Value::Float(*f),
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::String(s) => Value::Str(s.clone()),
            ConstValue::Null => Value::Null,
        }
    }
}

fn wrap(value: i64, ty: Option<&Type>) -> i64 {
    match ty {
        Some(Type::Numeric(NumericKind::Int32)) => value as i32 as i64,
        Some(Type::Numeric(NumericKind::UInt32)) => value as u32 as i64,
        Some(Type::Numeric(NumericKind::Int16)) => value as i16 as i64,
        Some(Type::Numeric(NumericKind::Byte)) => value as u8 as i64,
        _ => value,
    }
}

fn binary(op: BinaryOp, l: Value, r: Value, ty: Option<&Type>) -> Value {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinaryOp::Add => Value::Int(wrap(a.wrapping_add(b), ty)),
            BinaryOp::Sub => Value::Int(wrap(a.wrapping_sub(b), ty)),
            BinaryOp::Mul => Value::Int(wrap(a.wrapping_mul(b), ty)),
            BinaryOp::Div => Value::Int(wrap(a / b, ty)),
            BinaryOp::Mod => Value::Int(wrap(a % b, ty)),
            BinaryOp::BitAnd => Value::Int(wrap(a & b, ty)),
            BinaryOp::BitOr => Value::Int(wrap(a | b, ty)),
            BinaryOp::BitXor => Value::Int(wrap(a ^ b, ty)),
            BinaryOp::Shl => Value::Int(wrap(a << (b & 31), ty)),
            BinaryOp::Shr => Value::Int(wrap(a >> (b & 31), ty)),
            BinaryOp::Eq => Value::Bool(a == b),
            BinaryOp::Ne => Value::Bool(a != b),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Le => Value::Bool(a <= b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::Ge => Value::Bool(a >= b),
            other => panic!("{other:?} on integers"),
        },
        (Value::Float(a), Value::Float(b)) => match op {
            BinaryOp::Add => Value::Float(a + b),
            BinaryOp::Sub => Value::Float(a - b),
            BinaryOp::Mul => Value::Float(a * b),
            BinaryOp::Div => Value::Float(a / b),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Gt => Value::Bool(a > b),
            other => panic!("{other:?} on floats"),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::And | BinaryOp::BitAnd => Value::Bool(a && b),
            BinaryOp::Or | BinaryOp::BitOr => Value::Bool(a || b),
            BinaryOp::BitXor | BinaryOp::Ne => Value::Bool(a != b),
            BinaryOp::Eq => Value::Bool(a == b),
            other => panic!("{other:?} on booleans"),
        },
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Value::Str(format!("{a}{b}")),
            BinaryOp::Eq => Value::Bool(a == b),
            BinaryOp::Ne => Value::Bool(a != b),
            other => panic!("{other:?} on strings"),
        },
        (l, r) => panic!("{op:?} on {l:?} and {r:?}"),
    }
}

/// Runs `code` from the top and returns every value passed to
/// `UnityEngine.Debug.Log`, in order.
fn execute(code: &[Tac], inputs: &[(&str, Value)]) -> Vec<Value> {
    let labels: HashMap<&str, usize> = code
        .iter()
        .enumerate()
        .filter_map(|(i, instr)| instr.label_name().map(|label| (label, i)))
        .collect();
    let mut env: HashMap<OperandKey, Value> = inputs
        .iter()
        .map(|(name, value)| (OperandKey::Var(name.to_string(), None), value.clone()))
        .collect();
    let mut logged = vec![];
    let mut pc = 0;

    let read = |env: &HashMap<OperandKey, Value>, operand: &Operand| match operand {
        Operand::Constant { value, .. } => Value::of(value),
        other => env
            .get(&other.key())
            .cloned()
            .unwrap_or_else(|| panic!("read of `{other}` before any write")),
    };

    for _ in 0..STEP_LIMIT {
        let Some(instr) = code.get(pc) else {
            return logged;
        };
        pc += 1;

        match instr {
            Tac::Assign { dest, src } | Tac::Copy { dest, src } => {
                let value = read(&env, src);
                env.insert(dest.key(), value);
            }
            Tac::Binary { dest, left, op, right } => {
                let value = binary(*op, read(&env, left), read(&env, right), dest.ty());
                env.insert(dest.key(), value);
            }
            Tac::Unary { dest, op, operand } => {
                let value = match (op, read(&env, operand)) {
                    (UnaryOp::Neg, Value::Int(i)) => Value::Int(wrap(-i, dest.ty())),
                    (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
                    (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
                    (UnaryOp::BitNot, Value::Int(i)) => Value::Int(wrap(!i, dest.ty())),
                    (op, value) => panic!("{op:?} on {value:?}"),
                };
                env.insert(dest.key(), value);
            }
            Tac::CondJump { cond, label } => {
                if read(&env, cond) == Value::Bool(false) {
                    pc = labels[label.as_str()];
                }
            }
            Tac::Jump { label } => pc = labels[label.as_str()],
            Tac::Label { .. } => {}
            Tac::Call { func, args, .. } if func == "UnityEngine.Debug.Log" => {
                logged.push(read(&env, &args[0]));
            }
            Tac::Return { .. } => return logged,
            other => panic!("no interpretation for {other:?}"),
        }
    }

    panic!("step limit reached")
}

fn configs() -> Vec<OptimizerConfig> {
    let mut configs = vec![];

    for gvn_mode in [GvnMode::Local, GvnMode::Dataflow, GvnMode::Ssa] {
        for reuse_slots in [true, false] {
            configs.push(OptimizerConfig {
                gvn_mode,
                reuse_slots,
                ..OptimizerConfig::default()
            });
        }
    }

    configs
}

fn assert_preserved(unit: &TacUnit, inputs: &[(&str, Value)]) {
    let expected = execute(&unit.instructions, inputs);

    for config in configs() {
        let optimized = optimize_unit(unit, &config);

        assert_eq!(
            execute(&optimized.instructions, inputs),
            expected,
            "{:?} with slot reuse {}",
            config.gvn_mode,
            config.reuse_slots
        );
    }
}

fn int(name: &str) -> Operand {
    Operand::local(name, Type::INT32)
}

fn field(name: &str, ty: Type) -> Operand {
    Operand::var(Variable::field(name, ty))
}

fn t(id: u32) -> Operand {
    Operand::temp(id, Type::INT32)
}

fn log(arg: Operand) -> Tac {
    Tac::Call {
        dest: None,
        func: "UnityEngine.Debug.Log".to_string(),
        args: vec![arg],
        tail_call: false,
    }
}

/// `i = 0; while (i < 10) { body; i = i + 1 }`
fn counting_loop(body: Vec<Tac>) -> Vec<Tac> {
    let i = int("i");
    let cond = Operand::temp(0, Type::Boolean);
    let mut code = vec![
        Tac::assign(i.clone(), Operand::int(0)),
        Tac::label("loop"),
        Tac::binary(cond.clone(), i.clone(), BinaryOp::Lt, Operand::int(10)),
        Tac::cond_jump(cond, "end"),
    ];

    code.extend(body);
    code.push(Tac::binary(t(90), i.clone(), BinaryOp::Add, Operand::int(1)));
    code.push(Tac::assign(i, t(90)));
    code.push(Tac::jump("loop"));
    code.push(Tac::label("end"));
    code
}

#[test]
fn loop_with_strength_reduction_and_invariants() {
    let sum = field("sum", Type::INT32);
    let code = counting_loop(vec![
        Tac::binary(t(1), field("CONST", Type::INT32), BinaryOp::Mul, Operand::int(2)),
        log(t(1)),
        Tac::binary(t(2), field("a", Type::INT32), BinaryOp::Mul, field("b", Type::INT32)),
        Tac::binary(t(3), sum.clone(), BinaryOp::Add, t(2)),
        Tac::binary(t(4), t(3), BinaryOp::Add, int("i")),
        Tac::assign(sum.clone(), t(4)),
        log(sum),
    ]);
    let inputs = [
        ("CONST", Value::Int(7)),
        ("a", Value::Int(3)),
        ("b", Value::Int(4)),
        ("sum", Value::Int(0)),
    ];

    assert_preserved(&TacUnit::new(code), &inputs);
}

#[test]
fn diamond_then_loop() {
    let c = field("c", Type::Boolean);
    let x = int("x");
    let mut code = vec![
        Tac::cond_jump(c, "else"),
        Tac::assign(x.clone(), Operand::int(1)),
        Tac::jump("join"),
        Tac::label("else"),
        Tac::assign(x.clone(), Operand::int(2)),
        Tac::label("join"),
    ];
    code.extend(counting_loop(vec![
        Tac::binary(t(1), x.clone(), BinaryOp::Add, int("i")),
        log(t(1)),
        Tac::binary(t(2), x.clone(), BinaryOp::Add, int("i")),
        log(t(2)),
    ]));
    let unit = TacUnit::new(code);

    for branch in [true, false] {
        assert_preserved(&unit, &[("c", Value::Bool(branch))]);
    }
}

#[test]
fn invariant_branch_in_loop() {
    let sum = field("sum", Type::INT32);
    let i = int("i");
    let code = counting_loop(vec![
        Tac::cond_jump(field("flag", Type::Boolean), "skip"),
        Tac::binary(t(1), sum.clone(), BinaryOp::Add, i.clone()),
        Tac::assign(sum.clone(), t(1)),
        Tac::jump("next"),
        Tac::label("skip"),
        Tac::binary(t(2), sum.clone(), BinaryOp::Sub, i),
        Tac::assign(sum.clone(), t(2)),
        Tac::label("next"),
    ]);
    let mut code = code;
    code.push(log(sum));
    let unit = TacUnit::new(code);

    for flag in [true, false] {
        assert_preserved(&unit, &[("flag", Value::Bool(flag)), ("sum", Value::Int(0))]);
    }
}

#[test]
fn redefined_value_holder() {
    let (a, b, x, y) = (int("a"), int("b"), int("x"), int("y"));
    let code = vec![
        Tac::assign(a.clone(), field("p", Type::INT32)),
        Tac::assign(b.clone(), field("q", Type::INT32)),
        Tac::binary(x.clone(), a.clone(), BinaryOp::Add, b.clone()),
        log(x.clone()),
        Tac::binary(x.clone(), x.clone(), BinaryOp::Mul, Operand::int(3)),
        log(x),
        Tac::binary(y.clone(), a, BinaryOp::Add, b),
        log(y),
    ];

    assert_preserved(&TacUnit::new(code), &[("p", Value::Int(2)), ("q", Value::Int(5))]);
}

#[test]
fn counter_fixture() {
    let unit: TacUnit = serde_json::from_str(include_str!("fixtures/counter.json")).expect("error reading fixture");

    assert_eq!(execute(&unit.instructions, &[("counter", Value::Int(5))]), vec![Value::Int(50)]);
    assert_preserved(&unit, &[("counter", Value::Int(5))]);
}
