//! End-to-end lowering tests on the AMD64 conventions.

use std::cell::RefCell;
use std::rc::Rc;

use keel_codegen::observer::{Observer, Phase, Stage};
use keel_codegen::{Compiler, LoweringError, LoweringOptions};
use keel_ir::actor::{ActorTable, CallConv};
use keel_ir::builder::Builder;
use keel_ir::instruction::{CallSite, FrameState, InfopointOpcode};
use keel_ir::method::Method;
use keel_ir::types::Kind;
use keel_ir::value::{Constant, SourceValue};
use keel_target::abi::{Abi, RegisterConfig};
use keel_target::block::TargetBlockRole;
use keel_target::inst::{CallKind, TargetCall, TargetInst, ZeroIdiom};
use keel_target::location::{Location, SlotPurpose, StackSlot};
use keel_target::method::TargetMethod;
use keel_target::value::{BlockId, TargetValue};
use keel_target_amd64::reg::Gpr;

fn compiler() -> Compiler {
    Compiler::new(keel_target_amd64::platform())
}

fn calls(m: &TargetMethod) -> Vec<&TargetCall> {
    m.blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|i| match i {
            TargetInst::Call(c) => Some(c),
            _ => None,
        })
        .collect()
}

/// Target block of the source entry block.
fn entry_of(m: &TargetMethod) -> BlockId {
    m.block(m.prologue()).jump_target().unwrap()
}

fn block_of_call(m: &TargetMethod) -> BlockId {
    m.block_ids()
        .find(|b| {
            m.block(*b)
                .insts
                .iter()
                .any(|i| matches!(i, TargetInst::Call(_)))
        })
        .unwrap()
}

#[test]
fn memoized_values_and_constants() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.memo", CallConv::Managed);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let x = b.var(Kind::Int);
    let y = b.var(Kind::Int);
    b.assign(x, Constant::int(Kind::Int, 42));
    b.assign(y, Constant::int(Kind::Int, 42));
    b.assign(y, x);
    b.assign(x, y);
    b.ret(None);

    let out = compiler().lower_method(&m, &actors).unwrap();
    let body = &out.block(entry_of(&out)).insts;
    let assigns: Vec<_> = body
        .iter()
        .filter_map(|i| match i {
            TargetInst::Assign { dst, src, .. } => Some((*dst, *src)),
            _ => None,
        })
        .take(4)
        .collect();
    let (x0, c0) = assigns[0];
    let (y0, c1) = assigns[1];
    assert_eq!(c0, c1);
    assert!(matches!(c0, TargetValue::Constant(_)));
    assert_eq!(assigns[2], (y0, TargetValue::Variable(x0)));
    assert_eq!(assigns[3], (x0, TargetValue::Variable(y0)));
    assert_eq!(out.constants.len(), 1);
}

#[test]
fn wide_zeros_are_materialized_fresh() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.zero", CallConv::Managed);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let x = b.var(Kind::Long);
    let y = b.var(Kind::Double);
    b.assign(x, Constant::long(0));
    b.assign(x, Constant::long(0));
    b.assign(y, Constant::double(0.0));
    b.ret(None);

    let out = compiler().lower_method(&m, &actors).unwrap();
    let zeros: Vec<_> = out
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|i| match i {
            TargetInst::MaterializeZero { dst, kind, idiom } => Some((*dst, *kind, *idiom)),
            _ => None,
        })
        .collect();
    assert_eq!(zeros.len(), 3);
    assert_ne!(zeros[0].0, zeros[1].0);
    assert_eq!(zeros[2].1, Kind::Double);
    assert!(zeros.iter().all(|z| z.2 == ZeroIdiom::XorSelf));
    assert!(out.constants.is_empty());
}

fn throwing_call_method(actors: &mut ActorTable, callee_name: &str) -> Method {
    let id = actors.intern("T.try", CallConv::Managed);
    let callee = actors.intern(callee_name, CallConv::Managed);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    let (handler, exc) = b.create_handler_block();
    b.switch_to_block(entry);
    let r = b.var(Kind::Int);
    let frame = FrameState::new(id, 3).with_locals(vec![r.into()]);
    b.call(
        CallSite::new(callee, vec![])
            .returning(r)
            .catching(handler)
            .with_frame(frame),
    );
    b.ret(None);
    b.switch_to_block(handler);
    b.throw(exc);
    m
}

#[test]
fn throwing_call_splits_block() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, "T.callee");
    let out = compiler().lower_method(&m, &actors).unwrap();

    let call_block = block_of_call(&out);
    let insts = &out.block(call_block).insts;
    let n = insts.len();
    let TargetInst::Try { catch: Some(handler) } = insts[n - 3] else {
        panic!("call not preceded by a try: {}", insts[n - 3]);
    };
    assert!(matches!(&insts[n - 2], TargetInst::Call(c) if c.descriptor.is_some()));
    let TargetInst::Jump { target: next } = insts[n - 1] else {
        panic!("call block does not end in a jump");
    };
    assert_ne!(next, call_block);
    assert_eq!(out.block(next).preds, vec![call_block]);
    // continuation holds only what follows the call: the return
    assert!(matches!(out.block(next).insts[0], TargetInst::Assign { .. }));
    assert!(out.block(next).insts.iter().any(|i| matches!(i, TargetInst::Epilogue { .. })));
    assert!(out.block(handler).preds.contains(&call_block));
    assert_eq!(out.block(handler).role, TargetBlockRole::ExceptionDispatch);
    assert!(matches!(
        out.block(handler).insts[0],
        TargetInst::Catch { location, .. } if location == Location::Register(Gpr::Rax.to_preg())
    ));
}

#[test]
fn raise_with_handler_does_not_split() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, ActorTable::RAISE);
    let before = m.blocks.len();
    let out = compiler().lower_method(&m, &actors).unwrap();
    // prologue plus one block per source block
    assert_eq!(out.blocks.len(), before + 1);
}

#[test]
fn throw_unwinds_through_raise_without_descriptor() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, "T.callee");
    let out = compiler().lower_method(&m, &actors).unwrap();
    let dispatch = out
        .block_ids()
        .find(|b| out.block(*b).role == TargetBlockRole::ExceptionDispatch)
        .unwrap();
    let insts = &out.block(dispatch).insts;
    assert!(matches!(insts[1], TargetInst::Try { catch: None }));
    let TargetInst::Call(call) = &insts[2] else {
        panic!("expected raise call");
    };
    assert_eq!(call.callee, TargetValue::Method(actors.raise()));
    assert_eq!(call.kind, CallKind::Managed);
    assert_eq!(call.descriptor, None);
    assert_eq!(call.args.len(), 1);
    assert_eq!(call.arg_locations, vec![Location::Register(Gpr::Rdi.to_preg())]);
}

#[test]
fn callee_save_repositories_match_platform_table() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, "T.callee");
    let out = compiler().translate_method(&m, &actors).unwrap();
    let abi = keel_target_amd64::managed_abi();

    let repositories: Vec<i32> = out
        .vars
        .iter()
        .filter_map(|v| match v.fixed {
            Some(Location::Stack(StackSlot {
                purpose: SlotPurpose::Spill,
                offset,
            })) => Some(offset),
            _ => None,
        })
        .collect();
    assert_eq!(repositories.len(), abi.callee_saved().len());
    let expected: Vec<i32> = abi
        .callee_saved()
        .iter()
        .map(|r| abi.callee_save_slot_offset(*r).unwrap())
        .collect();
    assert_eq!(repositories, expected);
}

#[test]
fn stack_reference_parameter_is_rehomed() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.many", CallConv::Managed);
    let mut m = Method::new(id, Kind::Reference);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let params: Vec<_> = (0..7).map(|_| b.param(Kind::Reference)).collect();
    b.ret(Some(params[6].into()));

    let out = compiler().lower_method(&m, &actors).unwrap();
    let incoming = Location::Stack(StackSlot::new(SlotPurpose::Parameter, 16));
    let raw = out
        .var_ids()
        .find(|v| out.var(*v).fixed == Some(incoming))
        .unwrap();

    let copies: Vec<_> = out
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|i| match i {
            TargetInst::Assign { dst, src, .. } if *src == TargetValue::Variable(raw) => Some(*dst),
            _ => None,
        })
        .collect();
    assert_eq!(copies.len(), 1);
    let local = copies[0];
    assert_ne!(local, raw);
    assert_eq!(out.var(local).fixed, None);
    assert_eq!(out.var(local).kind, Kind::Reference);

    let prologue = out.block(out.prologue());
    assert!(prologue.insts.iter().any(
        |i| matches!(i, TargetInst::Assign { dst, .. } if *dst == local)
    ));
    // the return uses the rehomed copy, never the raw slot
    let ret = out
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .find_map(|i| match i {
            TargetInst::Epilogue { result, .. } => *result,
            _ => None,
        })
        .unwrap();
    assert_eq!(ret, TargetValue::Variable(local));
}

#[test]
fn stack_word_parameter_stays_in_its_incoming_slot() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.longs", CallConv::Managed);
    let mut m = Method::new(id, Kind::Long);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let params: Vec<_> = (0..7).map(|_| b.param(Kind::Long)).collect();
    b.ret(Some(params[6].into()));

    let out = compiler().translate_method(&m, &actors).unwrap();
    let incoming = Location::Stack(StackSlot::new(SlotPurpose::Parameter, 16));
    let seventh = out
        .var_ids()
        .find(|v| out.var(*v).fixed == Some(incoming))
        .unwrap();
    assert_eq!(out.var(seventh).kind, Kind::Long);
    assert_eq!(out.var(seventh).location, Some(incoming));

    // bound directly: nothing copies it out of the caller's area
    let copied = out.blocks.iter().flat_map(|b| &b.insts).any(|i| {
        matches!(i, TargetInst::Assign { src, .. } if *src == TargetValue::Variable(seventh))
    });
    assert!(!copied);
    let ret = out
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .find_map(|i| match i {
            TargetInst::Epilogue { result, .. } => *result,
            _ => None,
        })
        .unwrap();
    assert_eq!(ret, TargetValue::Variable(seventh));
}

fn keep_across_call(actors: &mut ActorTable) -> Method {
    let id = actors.intern("T.keep", CallConv::Managed);
    let foo = actors.intern("T.foo", CallConv::Managed);
    let mut m = Method::new(id, Kind::Reference);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let a = b.param(Kind::Reference);
    let frame = FrameState::new(id, 1).with_locals(vec![a.into()]);
    b.call(CallSite::new(foo, vec![]).with_frame(frame));
    b.ret(Some(a.into()));
    m
}

#[test]
fn reference_live_across_call_leaves_its_argument_register() {
    let mut actors = ActorTable::new();
    let m = keep_across_call(&mut actors);
    let out = compiler().translate_method(&m, &actors).unwrap();
    let abi = keel_target_amd64::managed_abi();
    let rdi = out
        .var_ids()
        .find(|v| out.var(*v).fixed == Some(Location::Register(Gpr::Rdi.to_preg())))
        .unwrap();

    let mut recorded = Vec::new();
    out.descriptor_vars(calls(&out)[0].descriptor.unwrap(), &mut recorded);
    assert_eq!(recorded.len(), 1);
    let kept = recorded[0];
    assert_ne!(kept, rdi);
    assert_eq!(out.var(kept).kind, Kind::Reference);
    // somewhere the collector can find it while the callee runs
    match out.var(kept).location.unwrap() {
        Location::Register(r) => assert!(!abi.caller_saved().contains(&r)),
        Location::Stack(slot) => assert_eq!(slot.purpose, SlotPurpose::Spill),
    }

    // copied out of rdi before anything can clobber it
    let prologue = &out.block(out.prologue()).insts;
    let copy = TargetInst::Assign {
        kind: Kind::Reference,
        dst: kept,
        src: TargetValue::Variable(rdi),
    };
    let at = prologue.iter().position(|i| *i == copy).unwrap();
    assert!(matches!(prologue[at - 1], TargetInst::Prologue { .. }));

    let ret = out
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .find_map(|i| match i {
            TargetInst::Epilogue { result, .. } => *result,
            _ => None,
        })
        .unwrap();
    assert_eq!(ret, TargetValue::Variable(kept));
}

#[test]
fn parameter_dead_before_the_call_keeps_its_register() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.early", CallConv::Managed);
    let foo = actors.intern("T.foo", CallConv::Managed);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let a = b.param(Kind::Reference);
    let x = b.var(Kind::Reference);
    b.assign(x, a);
    b.call(CallSite::new(foo, vec![]).with_frame(FrameState::new(id, 1)));
    b.ret(None);

    let out = compiler().translate_method(&m, &actors).unwrap();
    let before = compiler().lower_method(&m, &actors).unwrap();
    assert_eq!(out.vars.len(), before.vars.len());
}

#[test]
fn translation_is_deterministic() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, "T.callee");
    let c = compiler();
    let a = c.translate_method(&m, &actors).unwrap();
    let b = c.translate_method(&m, &actors).unwrap();
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(a, b);
}

fn builtin_method(actors: &mut ActorTable, arity: usize) -> Method {
    let id = actors.intern(&format!("T.builtin{arity}"), CallConv::Managed);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let address = b.param(Kind::Word);
    let receiver = b.param(Kind::Reference);
    let args: Vec<SourceValue> = match arity {
        0 => vec![],
        1 => vec![address.into()],
        2 => vec![address.into(), receiver.into()],
        n => (0..n).map(|_| receiver.into()).collect(),
    };
    b.builtin_call(CallSite::new(SourceValue::Undefined(Kind::Word), args));
    b.ret(None);
    m
}

#[test]
fn builtin_arities() {
    let mut actors = ActorTable::new();
    let c = compiler();

    let out = c.lower_method(&builtin_method(&mut actors, 0), &actors).unwrap();
    let call = calls(&out)[0].clone();
    assert_eq!(call.callee, TargetValue::Method(actors.unlinked()));
    assert!(call.args.is_empty());

    let out = c.lower_method(&builtin_method(&mut actors, 1), &actors).unwrap();
    let call = calls(&out)[0].clone();
    let address = out
        .var_ids()
        .find(|v| out.var(*v).fixed == Some(Location::Register(Gpr::Rdi.to_preg())))
        .unwrap();
    assert_eq!(call.callee, TargetValue::Variable(address));
    assert!(call.args.is_empty());

    let out = c.lower_method(&builtin_method(&mut actors, 2), &actors).unwrap();
    let call = calls(&out)[0].clone();
    let receiver = out
        .var_ids()
        .find(|v| out.var(*v).fixed == Some(Location::Register(Gpr::Rsi.to_preg())))
        .unwrap();
    assert_eq!(call.args, vec![TargetValue::Variable(receiver)]);
    assert_eq!(call.arg_locations, vec![Location::Register(Gpr::Rdi.to_preg())]);

    assert!(matches!(
        c.lower_method(&builtin_method(&mut actors, 3), &actors),
        Err(LoweringError::BuiltinArity(3))
    ));
}

#[test]
fn bad_method_does_not_stop_the_batch() {
    let mut actors = ActorTable::new();
    let methods = vec![
        builtin_method(&mut actors, 2),
        builtin_method(&mut actors, 3),
        builtin_method(&mut actors, 0),
    ];
    let results = compiler().translate_all(&methods, &actors);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(LoweringError::BuiltinArity(3))));
    assert!(results[2].is_ok());
}

fn managed_table(callee_save_area: &[u32]) -> RegisterConfig {
    let text = serde_json::json!({
        "name": "amd64-managed-lean",
        "integer_args": [7, 6],
        "float_args": [16, 17],
        "integer_result": 0,
        "float_result": 16,
        "callee_saved": [3, 12, 13, 14, 15],
        "caller_saved": [0, 1, 2, 6, 7, 8, 9, 10, 11, 16, 17],
        "safepoint_latch": 14,
        "frame_pointer": 5,
        "catch_parameter": 0,
        "callee_save_area": callee_save_area,
        "slot_size": 8,
        "frame_alignment": 16,
        "stack_arg_offset": 16
    })
    .to_string();
    RegisterConfig::from_json(&text).unwrap()
}

fn three_words(actors: &mut ActorTable) -> Method {
    let id = actors.intern("T.words", CallConv::Managed);
    let mut m = Method::new(id, Kind::Word);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let params: Vec<_> = (0..3).map(|_| b.param(Kind::Word)).collect();
    let zero = b.var(Kind::Long);
    b.assign(zero, Constant::long(0));
    b.ret(Some(params[2].into()));
    m
}

#[test]
fn register_table_loaded_from_json_drives_lowering() {
    let mut actors = ActorTable::new();
    let m = three_words(&mut actors);
    let mut platform = keel_target_amd64::platform();
    platform.managed = managed_table(&[3, 12, 13, 14, 15]);
    let out = Compiler::new(platform).translate_method(&m, &actors).unwrap();

    // two argument registers, so the third word arrives on the stack
    let incoming = Location::Stack(StackSlot::new(SlotPurpose::Parameter, 16));
    assert!(out.vars.iter().any(|v| v.fixed == Some(incoming)));
    // the table leaves the zero idiom at its default
    assert!(out.blocks.iter().flat_map(|b| &b.insts).any(|i| matches!(
        i,
        TargetInst::MaterializeZero {
            idiom: ZeroIdiom::LoadImmediate,
            ..
        }
    )));
}

#[test]
fn reordered_save_area_in_json_table_is_abi_drift() {
    let mut actors = ActorTable::new();
    let methods = vec![three_words(&mut actors)];
    let mut platform = keel_target_amd64::platform();
    platform.managed = managed_table(&[12, 3, 13, 14, 15]);
    let results = Compiler::new(platform).translate_all(&methods, &actors);
    let err = results[0].as_ref().unwrap_err();
    assert!(matches!(err, LoweringError::CalleeSaveOffsetMismatch { .. }));
    assert!(err.is_abi_drift());
}

fn two_returns(actors: &mut ActorTable, kind: Kind) -> Method {
    let id = actors.intern(&format!("T.ret_{kind}"), CallConv::Managed);
    let mut m = Method::new(id, kind);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    let other = b.create_block();
    let value = |n| (!kind.is_void()).then(|| Constant::int(Kind::Int, n).into());
    b.switch_to_block(entry);
    b.ret(value(1));
    b.switch_to_block(other);
    b.ret(value(2));
    m
}

fn jumps_into(m: &TargetMethod, target: BlockId) -> Vec<(BlockId, usize)> {
    let mut out = Vec::new();
    for b in m.block_ids() {
        for (i, inst) in m.block(b).insts.iter().enumerate() {
            if matches!(inst, TargetInst::Jump { target: t } if *t == target) {
                out.push((b, i));
            }
        }
    }
    out
}

#[test]
fn shared_epilogue_is_reached_by_every_return() {
    let mut actors = ActorTable::new();
    let m = two_returns(&mut actors, Kind::Int);
    let c = compiler().with_options(LoweringOptions {
        shared_epilogue: true,
        ..LoweringOptions::default()
    });
    let out = c.lower_method(&m, &actors).unwrap();

    let epilogues: Vec<_> = out
        .block_ids()
        .filter(|b| out.block(*b).role == TargetBlockRole::Epilogue)
        .collect();
    assert_eq!(epilogues.len(), 1);
    let epilogue = epilogues[0];
    let TargetInst::Epilogue {
        result: Some(TargetValue::Variable(shared)),
        result_location,
        ..
    } = out
        .block(epilogue)
        .insts
        .iter()
        .find(|i| matches!(i, TargetInst::Epilogue { .. }))
        .unwrap()
    else {
        panic!("epilogue without shared result");
    };
    assert_eq!(*result_location, Some(Location::Register(Gpr::Rax.to_preg())));
    assert!(matches!(out.block(epilogue).insts.last(), Some(TargetInst::Return)));

    let jumps = jumps_into(&out, epilogue);
    assert_eq!(jumps.len(), 2);
    for (b, i) in jumps {
        assert!(matches!(
            out.block(b).insts[i - 1],
            TargetInst::Assign { dst, .. } if dst == *shared
        ));
    }
    assert_eq!(out.block(epilogue).preds.len(), 2);
}

#[test]
fn shared_epilogue_tail_pulls_in_a_return_feeder() {
    let mut actors = ActorTable::new();
    let m = two_returns(&mut actors, Kind::Int);
    let c = compiler().with_options(LoweringOptions {
        shared_epilogue: true,
        ..LoweringOptions::default()
    });
    let out = c.translate_method(&m, &actors).unwrap();
    let n = out.order.len();
    let epilogue = out.order[n - 1];
    assert_eq!(out.block(epilogue).role, TargetBlockRole::Epilogue);
    let feeders: Vec<BlockId> = jumps_into(&out, epilogue).iter().map(|(b, _)| *b).collect();
    assert_eq!(feeders.len(), 2);
    // the feeder right before the epilogue falls into it
    assert!(feeders.contains(&out.order[n - 2]));
}

#[test]
fn void_shared_epilogue_has_no_result() {
    let mut actors = ActorTable::new();
    let m = two_returns(&mut actors, Kind::Void);
    let c = compiler().with_options(LoweringOptions {
        shared_epilogue: true,
        ..LoweringOptions::default()
    });
    let out = c.lower_method(&m, &actors).unwrap();
    let epilogue = out
        .block_ids()
        .find(|b| out.block(*b).role == TargetBlockRole::Epilogue)
        .unwrap();
    let jumps = jumps_into(&out, epilogue);
    assert_eq!(jumps.len(), 2);
    for (b, i) in jumps {
        assert!(i == 0 || !matches!(out.block(b).insts[i - 1], TargetInst::Assign { .. }));
    }
}

#[test]
fn unshared_returns_carry_their_own_epilogue() {
    let mut actors = ActorTable::new();
    let m = two_returns(&mut actors, Kind::Int);
    let out = compiler().lower_method(&m, &actors).unwrap();
    assert!(out.blocks.iter().all(|b| b.role != TargetBlockRole::Epilogue));
    let results: Vec<_> = out
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|i| match i {
            TargetInst::Epilogue { result, .. } => *result,
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    // returned directly, no move into a shared variable
    assert!(results.iter().all(|r| matches!(r, TargetValue::Constant(_))));
}

#[test]
fn epilogue_restores_before_teardown() {
    let mut actors = ActorTable::new();
    let m = two_returns(&mut actors, Kind::Void);
    let out = compiler().lower_method(&m, &actors).unwrap();
    let entry = out.block(entry_of(&out));
    let n = entry.insts.len();
    let restores = &entry.insts[..n - 2];
    assert_eq!(restores.len(), 5);
    for inst in restores {
        let TargetInst::Assign { dst, src: TargetValue::Variable(repo), .. } = inst else {
            panic!("expected a restore, got {inst}");
        };
        assert!(out.var(*dst).fixed.is_some_and(|l| l.register().is_some()));
        assert!(out.var(*repo).fixed.is_some_and(Location::is_stack));
    }
    assert!(matches!(entry.insts[n - 2], TargetInst::Epilogue { .. }));
    assert!(matches!(entry.insts[n - 1], TargetInst::Return));
}

#[test]
fn stencil_calls_have_no_descriptor_and_no_return() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, "T.callee");
    let c = compiler().with_options(LoweringOptions {
        stencil: true,
        ..LoweringOptions::default()
    });
    let out = c.lower_method(&m, &actors).unwrap();
    for call in calls(&out) {
        assert_eq!(call.kind, CallKind::RuntimeStencil);
        assert_eq!(call.descriptor, None);
    }
    assert!(
        out.blocks
            .iter()
            .flat_map(|b| &b.insts)
            .all(|i| !matches!(i, TargetInst::Return))
    );
}

#[test]
fn native_calls_use_native_convention() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.native", CallConv::Managed);
    let libc = actors.intern("write", CallConv::Native);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let fd = b.param(Kind::Int);
    b.call(CallSite::new(libc, vec![fd.into()]));
    b.call(CallSite::new(SourceValue::Undefined(Kind::Word), vec![fd.into()]).native());
    b.call(CallSite::new(SourceValue::Undefined(Kind::Word), vec![fd.into()]));
    b.ret(None);

    let out = compiler().lower_method(&m, &actors).unwrap();
    let kinds: Vec<_> = calls(&out).iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CallKind::Native, CallKind::Native, CallKind::Managed]);
}

#[test]
fn infopoints_capture_location_and_frames() {
    let mut actors = ActorTable::new();
    let id = actors.intern("T.info", CallConv::Managed);
    let inlined = actors.intern("T.inlined", CallConv::Managed);
    let mut m = Method::new(id, Kind::Void);
    let mut b = Builder::new(&mut m);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let pc = b.var(Kind::Word);
    let live = b.var(Kind::Reference);
    let outer = FrameState::new(id, 7).with_locals(vec![live.into()]);
    let inner = FrameState::new(inlined, 2)
        .with_stack(vec![live.into()])
        .with_parent(outer.clone());
    b.infopoint(InfopointOpcode::Here, Some(pc), inner);
    b.infopoint(InfopointOpcode::Safepoint, None, outer);
    b.ret(None);

    let out = compiler().lower_method(&m, &actors).unwrap();
    let body = &out.block(entry_of(&out)).insts;
    let TargetInst::Infopoint {
        opcode: InfopointOpcode::Here,
        dst: Some(captured),
        descriptor,
    } = body[0]
    else {
        panic!("expected a capturing infopoint, got {}", body[0]);
    };
    let TargetInst::Assign { dst, src, kind } = body[1] else {
        panic!("captured value not propagated");
    };
    assert_eq!(src, TargetValue::Variable(captured));
    assert_ne!(dst, captured);
    assert_eq!(kind, Kind::Word);
    let desc = out.descriptor(descriptor);
    assert_eq!(desc.method, inlined);
    let parent = out.descriptor(desc.parent.unwrap());
    assert_eq!(parent.bci, 7);
    assert_eq!(parent.locals, desc.stack);

    assert!(matches!(
        body[2],
        TargetInst::Infopoint {
            opcode: InfopointOpcode::Safepoint,
            dst: None,
            ..
        }
    ));
}

#[test]
fn full_pipeline_locates_everything() {
    let mut actors = ActorTable::new();
    let m = throwing_call_method(&mut actors, "T.callee");
    let c = compiler().with_options(LoweringOptions {
        shared_epilogue: true,
        ..LoweringOptions::default()
    });
    let out = c.translate_method(&m, &actors).unwrap();
    assert!(out.vars.iter().all(|v| v.location.is_some()));
    assert_eq!(out.order.len(), out.blocks.len());
    assert_eq!(out.order[0], out.prologue());
    let last = *out.order.last().unwrap();
    assert_eq!(out.block(last).role, TargetBlockRole::Epilogue);
    assert_eq!(out.frame_size(16) % 16, 0);

    // the call result lives across no call, so it stays out of the
    // callee-saved registers the method has reserved
    let abi = keel_target_amd64::managed_abi();
    let result = calls(&out)[0].result.unwrap();
    let loc = out.var(result).location.unwrap();
    if let Location::Register(r) = loc {
        assert!(!abi.callee_saved().contains(&r));
    }
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<(Phase, Stage)>>>);

impl Observer for Recorder {
    fn notify(&self, phase: Phase, stage: Stage, _method: &TargetMethod) {
        self.0.borrow_mut().push((phase, stage));
    }
}

#[test]
fn observers_see_every_phase_in_order() {
    let mut actors = ActorTable::new();
    let m = two_returns(&mut actors, Kind::Void);
    let recorder = Recorder::default();
    let c = compiler().add_observer(recorder.clone());
    c.translate_method(&m, &actors).unwrap();
    assert_eq!(
        *recorder.0.borrow(),
        vec![
            (Phase::Lowering, Stage::Before),
            (Phase::Lowering, Stage::After),
            (Phase::Allocation, Stage::Before),
            (Phase::Allocation, Stage::After),
            (Phase::Layout, Stage::Before),
            (Phase::Layout, Stage::After),
        ]
    );
}
