use criterion::*;
use std::collections::HashSet;
use tacvm::codegen::{generate, ExternRegistry};
use tacvm::ir::optimizer::{optimize, OptimizerConfig};
use tacvm::ir::{BinaryOp, Operand, Tac, TacUnit, Type, Variable};
use tacvm::Session;

/// `loops` consecutive counting loops, each summing a product of two fields.
fn synthetic_unit(loops: usize) -> TacUnit {
    let a = Operand::var(Variable::field("a", Type::INT32));
    let b = Operand::var(Variable::field("b", Type::INT32));
    let sum = Operand::var(Variable::field("sum", Type::INT32));
    let mut code = vec![];
    let mut temp = 0;
    let mut fresh = |ty: Type| {
        temp += 1;
        Operand::temp(temp, ty)
    };

    for n in 0..loops {
        let i = Operand::local(&format!("i{n}"), Type::INT32);
        let cond = fresh(Type::Boolean);
        let product = fresh(Type::INT32);
        let next_sum = fresh(Type::INT32);
        let next_i = fresh(Type::INT32);
        let head = format!("loop{n}");
        let end = format!("end{n}");

        code.extend([
            Tac::assign(i.clone(), Operand::int(0)),
            Tac::label(&head),
            Tac::binary(cond.clone(), i.clone(), BinaryOp::Lt, Operand::int(100)),
            Tac::cond_jump(cond, &end),
            Tac::binary(product.clone(), a.clone(), BinaryOp::Mul, b.clone()),
            Tac::binary(next_sum.clone(), sum.clone(), BinaryOp::Add, product),
            Tac::assign(sum.clone(), next_sum),
            Tac::binary(next_i.clone(), i.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::assign(i, next_i),
            Tac::jump(&head),
            Tac::label(&end),
        ]);
    }

    code.push(Tac::Return {
        value: None,
        return_var: None,
    });

    TacUnit::new(code)
}

fn pipeline_throughput(c: &mut Criterion) {
    let registry = ExternRegistry::with_defaults();
    let config = OptimizerConfig::default();

    let mut group = c.benchmark_group("Pipeline Throughput");
    for loops in [1, 10, 50].into_iter() {
        let unit = synthetic_unit(loops);

        group.throughput(Throughput::Elements(unit.instructions.len() as u64));
        group.bench_with_input(format!(" {} loops", loops), &unit, |b, unit| {
            b.iter(|| {
                let code = optimize(&unit.instructions, &HashSet::new(), &HashSet::new(), &config);
                let optimized = TacUnit::new(code);
                let mut session = Session::new();

                generate(&optimized, &registry, &mut session).expect("generated")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, pipeline_throughput);
criterion_main!(benches);
