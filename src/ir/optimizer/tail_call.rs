use super::super::operand::Operand;
use super::super::tac::Tac;

fn returns_result_of(call_dest: Option<&Operand>, next: Option<&Tac>) -> bool {
    let Some(Tac::Return { value, .. }) = next else {
        return false;
    };

    match (call_dest, value) {
        (Some(dest), Some(value)) => dest.same_location(value),
        (None, None) => true,
        _ => false,
    }
}

/// Flags calls whose result is returned right away. The `Return` itself stays
/// in place.
pub fn mark_tail_calls(code: &[Tac]) -> Vec<Tac> {
    code.iter()
        .enumerate()
        .map(|(i, instr)| match instr {
            Tac::Call {
                dest,
                func,
                args,
                tail_call: false,
            } if returns_result_of(dest.as_ref(), code.get(i + 1)) => Tac::Call {
                dest: dest.clone(),
                func: func.clone(),
                args: args.clone(),
                tail_call: true,
            },
            Tac::MethodCall {
                dest,
                object,
                method,
                args,
                tail_call: false,
            } if returns_result_of(dest.as_ref(), code.get(i + 1)) => Tac::MethodCall {
                dest: dest.clone(),
                object: object.clone(),
                method: method.clone(),
                args: args.clone(),
                tail_call: true,
            },
            _ => instr.clone(),
        })
        .collect()
}
