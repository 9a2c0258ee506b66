//! The [`Call`] record a decoder produces for each intercepted API call.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::flags::CallFlags;
use crate::id::{CallNo, ThreadId};
use crate::signature::{FunctionSig, StackFrame};
use crate::value::Value;

/// Ordered stack frames captured with a call, innermost first.
pub type Backtrace = Vec<Arc<StackFrame>>;

/// One intercepted call: signature, arguments, result, and flags.
///
/// Arguments are stored positionally. Slots the stream never filled
/// hold [`Value::Null`]; names come from the function signature.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// Sequential call number.
    pub no: CallNo,
    /// Thread the call was made on.
    pub thread_id: ThreadId,
    /// The called function.
    pub sig: Arc<FunctionSig>,
    /// Argument values by position.
    pub args: SmallVec<[Value; 4]>,
    /// Return value, if recorded.
    pub ret: Option<Value>,
    /// Backtrace, if recorded.
    pub backtrace: Option<Backtrace>,
    /// Static flags from the signature plus any dynamic adjustments.
    pub flags: CallFlags,
}

impl Call {
    /// Start a call with no arguments, carrying the signature's flags.
    pub fn new(no: CallNo, thread_id: ThreadId, sig: Arc<FunctionSig>) -> Self {
        let flags = sig.flags;
        Self {
            no,
            thread_id,
            sig,
            args: SmallVec::new(),
            ret: None,
            backtrace: None,
            flags,
        }
    }

    /// The called function's name.
    pub fn name(&self) -> &str {
        &self.sig.name
    }

    /// Argument at `index`, if the slot exists.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Declared name of argument `index`, if the signature has one.
    pub fn arg_name(&self, index: usize) -> Option<&str> {
        self.sig.arg_names.get(index).map(String::as_str)
    }

    /// Store an argument, growing the slot list with nulls as needed.
    pub fn set_arg(&mut self, index: usize, value: Value) {
        if index >= self.args.len() {
            self.args.resize(index + 1, Value::Null);
        }
        self.args[index] = value;
    }

    /// Iterate `(name, value)` pairs. Unnamed slots get `"argN"`.
    pub fn args_named(&self) -> impl Iterator<Item = (String, &Value)> + '_ {
        self.args.iter().enumerate().map(|(i, v)| {
            let name = self
                .arg_name(i)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("arg{i}"));
            (name, v)
        })
    }

    /// True if this call ends a frame for replay accounting.
    pub fn ends_frame(&self) -> bool {
        self.flags.ends_frame()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.no, self.name())?;
        for (i, (name, value)) in self.args_named().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        f.write_str(")")?;
        if let Some(ret) = &self.ret {
            write!(f, " = {ret}")?;
        }
        if self.flags.contains(CallFlags::INCOMPLETE) {
            f.write_str(" // incomplete")?;
        }
        Ok(())
    }
}
