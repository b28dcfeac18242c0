//! The code generation backend seam.
//!
//! [`Codegen`](crate::codegen::Codegen) only talks to the target through this
//! trait. Every value has the single numeric type (a double), so the trait
//! never asks for types.

pub mod ir;
#[cfg(feature = "llvm")]
pub mod llvm;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("backend failure: {0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl ArithOp {
    /// name given to the instruction result
    pub fn value_name(self) -> &'static str {
        match self {
            ArithOp::Add => "addtmp",
            ArithOp::Sub => "subtmp",
            ArithOp::Mul => "multmp",
        }
    }
}

pub trait Backend {
    /// handle to a generated value
    type Value: Copy;
    /// handle to a function in the module
    type Function: Copy;
    /// saved module state, see [`Backend::snapshot`]
    type Snapshot;

    fn get_function(&self, name: &str) -> Option<Self::Function>;

    /// Adds a function taking one double per entry of `params` and returning
    /// a double, naming the parameters in order.
    fn declare_function(&mut self, name: &str, params: &[String]) -> BackendResult<Self::Function>;

    fn param_count(&self, function: Self::Function) -> usize;

    fn params(&self, function: Self::Function) -> Vec<Self::Value>;

    fn set_param_names(&mut self, function: Self::Function, names: &[String]);

    fn has_body(&self, function: Self::Function) -> bool;

    /// Drops every block of `function`, leaving a declaration.
    fn clear_body(&mut self, function: Self::Function) -> BackendResult<()>;

    /// Appends a block named `block` to `function` and moves the insertion
    /// point to its end.
    fn position_at_entry(&mut self, function: Self::Function, block: &str);

    fn const_number(&mut self, value: f64) -> Self::Value;

    fn build_arith(
        &mut self,
        op: ArithOp,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> BackendResult<Self::Value>;

    /// Unordered-or-less-than comparison widened back to a double (0.0 or 1.0).
    fn build_unsigned_less_than(
        &mut self,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> BackendResult<Self::Value>;

    fn build_call(
        &mut self,
        function: Self::Function,
        args: &[Self::Value],
    ) -> BackendResult<Self::Value>;

    fn build_return(&mut self, value: Self::Value) -> BackendResult<()>;

    /// structural soundness of a completed function
    fn verify(&self, function: Self::Function) -> bool;

    fn delete_function(&mut self, function: Self::Function);

    /// Captures every function of the module. Handles taken before a
    /// [`Backend::restore`] must be looked up again afterwards.
    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);

    fn print_function(&self, function: Self::Function) -> String;

    fn print_module(&self) -> String;
}
