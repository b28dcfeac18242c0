use inkwell::{
    builder::Builder,
    context::Context,
    module::Module,
    types::BasicMetadataTypeEnum,
    values::{BasicMetadataValueEnum, FloatValue, FunctionValue},
    FloatPredicate,
};

use super::{ArithOp, Backend, BackendError, BackendResult};

fn builder_error(err: inkwell::builder::BuilderError) -> BackendError {
    BackendError::new(err.to_string())
}

/// LLVM IR through inkwell.
pub struct LlvmBackend<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
}

impl<'ctx> LlvmBackend<'ctx> {
    pub fn new(context: &'ctx Context, name: &str) -> Self {
        let module = context.create_module(name);
        let builder = context.create_builder();

        LlvmBackend {
            context,
            module,
            builder,
        }
    }
}

impl<'ctx> Backend for LlvmBackend<'ctx> {
    type Value = FloatValue<'ctx>;
    type Function = FunctionValue<'ctx>;
    type Snapshot = Module<'ctx>;

    fn get_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.module.get_function(name)
    }

    fn declare_function(
        &mut self,
        name: &str,
        params: &[String],
    ) -> BackendResult<FunctionValue<'ctx>> {
        let args_types = std::iter::repeat(self.context.f64_type())
            .take(params.len())
            .map(|f| f.into())
            .collect::<Vec<BasicMetadataTypeEnum>>();

        let fn_type = self.context.f64_type().fn_type(&args_types, false);
        let fn_val = self.module.add_function(name, fn_type, None);
        self.set_param_names(fn_val, params);

        Ok(fn_val)
    }

    fn param_count(&self, function: FunctionValue<'ctx>) -> usize {
        function.count_params() as usize
    }

    fn params(&self, function: FunctionValue<'ctx>) -> Vec<FloatValue<'ctx>> {
        function
            .get_param_iter()
            .map(|arg| arg.into_float_value())
            .collect()
    }

    fn set_param_names(&mut self, function: FunctionValue<'ctx>, names: &[String]) {
        for (arg, name) in function.get_param_iter().zip(names) {
            arg.into_float_value().set_name(name);
        }
    }

    fn has_body(&self, function: FunctionValue<'ctx>) -> bool {
        function.count_basic_blocks() > 0
    }

    fn clear_body(&mut self, function: FunctionValue<'ctx>) -> BackendResult<()> {
        for block in function.get_basic_blocks() {
            unsafe { block.delete() }
                .map_err(|_| BackendError::new("failed to delete basic block"))?;
        }
        Ok(())
    }

    fn position_at_entry(&mut self, function: FunctionValue<'ctx>, block: &str) {
        let entry = self.context.append_basic_block(function, block);
        self.builder.position_at_end(entry);
    }

    fn const_number(&mut self, value: f64) -> FloatValue<'ctx> {
        self.context.f64_type().const_float(value)
    }

    fn build_arith(
        &mut self,
        op: ArithOp,
        lhs: FloatValue<'ctx>,
        rhs: FloatValue<'ctx>,
    ) -> BackendResult<FloatValue<'ctx>> {
        let name = op.value_name();
        match op {
            ArithOp::Add => self.builder.build_float_add(lhs, rhs, name),
            ArithOp::Sub => self.builder.build_float_sub(lhs, rhs, name),
            ArithOp::Mul => self.builder.build_float_mul(lhs, rhs, name),
        }
        .map_err(builder_error)
    }

    fn build_unsigned_less_than(
        &mut self,
        lhs: FloatValue<'ctx>,
        rhs: FloatValue<'ctx>,
    ) -> BackendResult<FloatValue<'ctx>> {
        let cmp = self
            .builder
            .build_float_compare(FloatPredicate::ULT, lhs, rhs, "cmptmp")
            .map_err(builder_error)?;
        self.builder
            .build_unsigned_int_to_float(cmp, self.context.f64_type(), "booltmp")
            .map_err(builder_error)
    }

    fn build_call(
        &mut self,
        function: FunctionValue<'ctx>,
        args: &[FloatValue<'ctx>],
    ) -> BackendResult<FloatValue<'ctx>> {
        let argsv: Vec<BasicMetadataValueEnum> = args.iter().map(|&val| val.into()).collect();

        self.builder
            .build_call(function, &argsv, "calltmp")
            .map_err(builder_error)?
            .try_as_basic_value()
            .left()
            .map(|value| value.into_float_value())
            .ok_or_else(|| BackendError::new("call produced no value"))
    }

    fn build_return(&mut self, value: FloatValue<'ctx>) -> BackendResult<()> {
        self.builder
            .build_return(Some(&value))
            .map(|_| ())
            .map_err(builder_error)
    }

    fn verify(&self, function: FunctionValue<'ctx>) -> bool {
        function.verify(true)
    }

    fn delete_function(&mut self, function: FunctionValue<'ctx>) {
        unsafe {
            function.delete();
        }
    }

    fn snapshot(&self) -> Module<'ctx> {
        self.module.clone()
    }

    fn restore(&mut self, snapshot: Module<'ctx>) {
        self.builder.clear_insertion_position();
        self.module = snapshot;
    }

    fn print_function(&self, function: FunctionValue<'ctx>) -> String {
        function.print_to_string().to_string()
    }

    fn print_module(&self) -> String {
        self.module.print_to_string().to_string()
    }
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;

    use super::LlvmBackend;
    use crate::backend::Backend;
    use crate::codegen::{Codegen, CodegenError};
    use crate::lexer::Token;
    use crate::parser::Parser;

    /// generates every form of `source`, keeping going past failures
    fn compile<'ctx>(
        context: &'ctx Context,
        source: &str,
    ) -> (Codegen<LlvmBackend<'ctx>>, Vec<Result<String, CodegenError>>) {
        let mut codegen = Codegen::new(LlvmBackend::new(context, "test"));
        let mut parser = Parser::from_source(source);
        let mut results = Vec::new();
        loop {
            match parser.parse_top_level() {
                Some(node) => {
                    let node = node.unwrap();
                    results.push(
                        codegen
                            .codegen(&node)
                            .map(|func| codegen.backend.print_function(func)),
                    );
                }
                None if *parser.current() == Token::Eof => break,
                None => {
                    parser.advance();
                }
            }
        }
        (codegen, results)
    }

    #[test]
    fn codegen_works() {
        let context = Context::create();
        let (codegen, results) = compile(&context, "def add(a b) a+b; add(1,2);");
        assert!(results.iter().all(Result::is_ok));

        assert!(results[0]
            .as_ref()
            .unwrap()
            .contains("%addtmp = fadd double %a, %b"));
        assert!(results[1]
            .as_ref()
            .unwrap()
            .contains("%calltmp = call double @add(double 1.000000e+00, double 2.000000e+00)"));
        assert!(codegen.backend.module.verify().is_ok());
    }

    #[test]
    fn extern_is_only_declared() {
        let context = Context::create();
        let (codegen, results) = compile(&context, "extern sin(x);");
        assert!(results[0].as_ref().unwrap().contains("declare double @sin(double"));

        let sin = codegen.backend.get_function("sin").unwrap();
        assert!(!codegen.backend.has_body(sin));
        assert_eq!(codegen.backend.param_count(sin), 1);
    }

    #[test]
    fn redefinition_replaces_the_body() {
        let context = Context::create();
        let (codegen, results) = compile(&context, "def foo(a) a+1; def foo(b) b*2;");
        assert!(results.iter().all(Result::is_ok));

        let foo = codegen.backend.get_function("foo").unwrap();
        let text = codegen.backend.print_function(foo);
        assert!(text.contains("%multmp = fmul double %b, 2.000000e+00"));
        assert!(!text.contains("fadd"));
        assert!(codegen.backend.verify(foo));
    }

    #[test]
    fn failed_body_removes_new_function() {
        let context = Context::create();
        let (codegen, results) = compile(&context, "def f(x) y; g(2);");
        assert_eq!(results[0], Err(CodegenError::UnknownVariable("y".to_string())));
        assert_eq!(results[1], Err(CodegenError::UnknownFunction("g".to_string())));

        assert!(codegen.backend.get_function("f").is_none());
        assert!(codegen.backend.get_function("__anon_expr").is_none());
    }

    #[test]
    fn failed_redefinition_keeps_previous_body() {
        let context = Context::create();
        let (codegen, results) = compile(&context, "def foo(a) a+1; def foo(b) c;");
        assert_eq!(results[1], Err(CodegenError::UnknownVariable("c".to_string())));

        let foo = codegen.backend.get_function("foo").unwrap();
        assert!(codegen.backend.has_body(foo));
        assert!(codegen
            .backend
            .print_function(foo)
            .contains("%addtmp = fadd double %a, 1.000000e+00"));
    }
}
