#![doc = include_str!("../../../README.md")]
#![expect(clippy::too_many_lines, reason = "the Object protocol installer reads better unsplit")]
#![expect(clippy::too_many_arguments, reason = "the activation protocol threads vm/target/locals/cursor uniformly")]
#![expect(clippy::type_complexity, reason = "tagged payload accessors are intentionally rich")]

mod activation;
mod builtins;
mod coroutine;
mod error;
mod eval;
mod exception;
mod future;
mod identity;
mod lexer;
mod message;
mod object;
mod parser;
mod primitives;
pub mod repl;
mod shuffle;
mod stop;
pub mod tracer;
mod value;
mod vm;

pub use crate::{
    error::LoomError,
    eval::{raise, raise_argument_error, raise_does_not_respond, raise_type_mismatch},
    exception::{ExcType, ExceptionData, StackFrame},
    future::FutureState,
    identity::ObjectId,
    lexer::{LexError, Token},
    message::{MessageChain, MessageCursor, MessageNode},
    object::{Object, ObjectRef, Symbol, get_slot, is_kind_of},
    parser::{ParseError, parse},
    repl::ReplSession,
    shuffle::OperatorTable,
    stop::Stop,
    tracer::{NoopTracer, ProfilingReport, ProfilingTracer, StderrTracer, VmTracer},
    value::{Block, CFunction, CallRecord, Tag},
    vm::{Scheduler, Vm},
};
