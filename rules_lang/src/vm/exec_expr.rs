//! Expression evaluation
//!
//! Every evaluation leaves exactly one value on the stack, sized by the
//! node's type. Scalars are normalized to 64-bit storage between pop and
//! push (signed values sign-extended); references are heap addresses.

use crate::error::{SourceError, SourceResult};
use crate::ir::core::{BinOp, ExprKind, LogicalOp, Program, TypedExpr, UnaryOp};
use crate::types::identity::{self, value_size, IdentityKind};
use crate::types::RuleType;
use rules_lang_parser::span::Span;

use super::flow::Flow;
use super::strings;
use super::Vm;

impl Vm {
    /// Evaluate an expression, leaving its value on top of the stack
    pub(crate) fn eval_expr(&mut self, program: &Program, expr: &TypedExpr) -> SourceResult<()> {
        match &expr.kind {
            ExprKind::Bool(v) => {
                self.stack.push_scalar(&expr.ty, *v as u64);
                Ok(())
            }
            ExprKind::Sint(v) => {
                self.push_int(&expr.ty, *v as u64);
                Ok(())
            }
            ExprKind::Uint(v) => {
                self.push_int(&expr.ty, *v);
                Ok(())
            }
            ExprKind::Float(v) => {
                self.push_float(&expr.ty, *v);
                Ok(())
            }
            ExprKind::Str { encoding, value } => {
                let addr = strings::alloc_string(&mut self.heap, *encoding, value);
                self.stack.push_scalar(&expr.ty, addr);
                Ok(())
            }
            ExprKind::Null => {
                self.stack.push_scalar(&expr.ty, 0);
                Ok(())
            }
            ExprKind::ReadLocal { slot } => {
                let bits = self.local(*slot);
                self.stack.push_scalar(&expr.ty, bits);
                Ok(())
            }
            ExprKind::ContextField { name, .. } => {
                self.null_check(self.context_addr, expr.span)?;
                let record = identity::lookup(self.heap.identity_at(self.context_addr));
                let (offset, _) = record
                    .offset_by_name(name)
                    .expect("input member resolved during analysis");
                let addr = self.heap.data_addr(self.context_addr) + offset as u64;
                let bits = self.heap_read_value(&expr.ty, addr);
                self.stack.push_scalar(&expr.ty, bits);
                Ok(())
            }
            ExprKind::FieldAccess { value, name, index } => {
                self.eval_expr(program, value)?;
                let addr = self.stack.pop_scalar(&value.ty);
                self.null_check(addr, expr.span)?;
                let record = identity::lookup(self.heap.identity_at(addr));
                let offset = match record.kind {
                    IdentityKind::Struct if !name.is_empty() => {
                        record
                            .offset_by_name(name)
                            .expect("member resolved during analysis")
                            .0
                    }
                    _ => record.member_offsets[*index],
                };
                let member_addr = self.heap.data_addr(addr) + offset as u64;
                let bits = self.heap_read_value(&expr.ty, member_addr);
                self.stack.push_scalar(&expr.ty, bits);
                Ok(())
            }
            ExprKind::IndexAccess { value, index } => {
                self.eval_expr(program, value)?;
                let addr = self.stack.pop_scalar(&value.ty);
                self.null_check(addr, expr.span)?;
                self.eval_expr(program, index)?;
                let position = self.stack.pop_scalar(&index.ty) as i64;
                let element = self.element_addr(addr, position, expr.span)?;
                let bits = self.heap_read_value(&expr.ty, element);
                self.stack.push_scalar(&expr.ty, bits);
                Ok(())
            }
            ExprKind::TupleLiteral { values } | ExprKind::StructLiteral { values } => {
                let id = identity::intern(&expr.ty);
                let record = identity::lookup(id);
                let addr = self.heap.alloc(id, record.data_size);
                let data = self.heap.data_addr(addr);
                for (i, value) in values.iter().enumerate() {
                    let Some(value) = value else { continue };
                    self.eval_expr(program, value)?;
                    let bits = self.stack.pop_scalar(&value.ty);
                    let member_addr = data + record.member_offsets[i] as u64;
                    self.heap_write_value(&value.ty, member_addr, bits);
                }
                self.stack.push_scalar(&expr.ty, addr);
                Ok(())
            }
            ExprKind::ArrayLiteral { values, other } => {
                self.eval_array_literal(program, expr, values, other.as_deref())
            }
            ExprKind::Call { function, args } => {
                self.call_function(program, *function, args, expr.span)
            }
            ExprKind::Unary { op, operand } => {
                self.eval_expr(program, operand)?;
                let bits = self.stack.pop_scalar(&operand.ty);
                let result = self.eval_unary(*op, &operand.ty, bits);
                self.stack.push_scalar(&expr.ty, result);
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.eval_expr(program, lhs)?;
                self.eval_expr(program, rhs)?;
                let b = self.stack.pop_scalar(&rhs.ty);
                let a = self.stack.pop_scalar(&lhs.ty);
                let result = self.eval_binary(*op, &lhs.ty, a, &rhs.ty, b, expr.span)?;
                self.stack.push_scalar(&expr.ty, result);
                Ok(())
            }
            ExprKind::Logical { op, lhs, rhs } => {
                self.eval_expr(program, lhs)?;
                let a = self.stack.pop_scalar(&lhs.ty) != 0;
                match op {
                    LogicalOp::And if !a => {
                        self.stack.push_scalar(&expr.ty, 0);
                        Ok(())
                    }
                    LogicalOp::Or if a => {
                        self.stack.push_scalar(&expr.ty, 1);
                        Ok(())
                    }
                    LogicalOp::And | LogicalOp::Or => {
                        self.eval_expr(program, rhs)?;
                        let b = self.stack.pop_scalar(&rhs.ty) != 0;
                        self.stack.push_scalar(&expr.ty, b as u64);
                        Ok(())
                    }
                    LogicalOp::Xor => {
                        self.eval_expr(program, rhs)?;
                        let b = self.stack.pop_scalar(&rhs.ty) != 0;
                        self.stack.push_scalar(&expr.ty, (a != b) as u64);
                        Ok(())
                    }
                }
            }
            ExprKind::Concat { lhs, rhs } => {
                self.eval_expr(program, lhs)?;
                let a = self.stack.pop_scalar(&lhs.ty);
                self.null_check(a, lhs.span)?;
                self.eval_expr(program, rhs)?;
                let b = self.stack.pop_scalar(&rhs.ty);
                self.null_check(b, rhs.span)?;
                let addr = self.concat(&expr.ty, a, b);
                self.stack.push_scalar(&expr.ty, addr);
                Ok(())
            }
            ExprKind::RangeArray { lo, hi } => {
                self.eval_expr(program, lo)?;
                self.eval_expr(program, hi)?;
                let hi_bits = self.stack.pop_scalar(&hi.ty);
                let lo_bits = self.stack.pop_scalar(&lo.ty);
                let addr = self.build_range(&expr.ty, lo_bits, hi_bits);
                self.stack.push_scalar(&expr.ty, addr);
                Ok(())
            }
            ExprKind::Convert { value } => {
                // String-literal-to-array conversions encode the literal
                // directly, without a string object in between.
                if let (
                    RuleType::StrLit {
                        value: literal, ..
                    },
                    RuleType::Array { component, .. },
                ) = (&value.ty, &expr.ty)
                {
                    if let ExprKind::Str { .. } = value.kind {
                        let addr = self.alloc_units(component, literal);
                        self.stack.push_scalar(&expr.ty, addr);
                        return Ok(());
                    }
                }
                self.eval_expr(program, value)?;
                let bits = self.stack.pop_scalar(&value.ty);
                let converted = self.convert_value(&value.ty, &expr.ty, bits, expr.span)?;
                self.stack.push_scalar(&expr.ty, converted);
                Ok(())
            }
            ExprKind::Conditional {
                condition,
                truthy,
                falsy,
            } => {
                self.eval_expr(program, condition)?;
                let c = self.stack.pop_scalar(&condition.ty) != 0;
                if c {
                    self.eval_expr(program, truthy)
                } else {
                    self.eval_expr(program, falsy)
                }
            }
            ExprKind::StaticField { type_name, name } => Err(SourceError::not_implemented(
                format!("Static member access '{}.{}'", type_name, name),
                expr.span,
            )),
        }
    }

    fn eval_array_literal(
        &mut self,
        program: &Program,
        expr: &TypedExpr,
        values: &[Option<TypedExpr>],
        other: Option<&TypedExpr>,
    ) -> SourceResult<()> {
        let RuleType::Array { component, .. } = &expr.ty else {
            unreachable!("array literal typed as {}", expr.ty);
        };
        let component_size = value_size(component);
        let length = values.len();
        let id = identity::intern(&expr.ty);
        let addr = self.heap.alloc(id, 8 + component_size * length);
        let data = self.heap.data_addr(addr);
        self.heap.write_scalar(data, 8, length as u64);

        // The catch-all value is evaluated at most once; its bits are
        // cached and copied into every later unfilled slot.
        let mut other_cache: Option<u64> = None;
        for (i, value) in values.iter().enumerate() {
            let element = data + 8 + (component_size * i) as u64;
            match value {
                Some(value) => {
                    self.eval_expr(program, value)?;
                    let bits = self.stack.pop_scalar(&value.ty);
                    self.heap_write_value(&value.ty, element, bits);
                }
                None => match other {
                    Some(other_expr) => {
                        let bits = match other_cache {
                            Some(bits) => bits,
                            None => {
                                self.eval_expr(program, other_expr)?;
                                let bits = self.stack.pop_scalar(&other_expr.ty);
                                other_cache = Some(bits);
                                bits
                            }
                        };
                        self.heap_write_value(component, element, bits);
                    }
                    // No value, no catch-all: the slot stays zeroed.
                    None => {}
                },
            }
        }
        self.stack.push_scalar(&expr.ty, addr);
        Ok(())
    }

    /// Call a function: arguments are evaluated in reverse declaration
    /// order, so the first argument ends up on top of the stack and pops
    /// straight into parameter slot order
    fn call_function(
        &mut self,
        program: &Program,
        function: usize,
        args: &[TypedExpr],
        span: Span,
    ) -> SourceResult<()> {
        for arg in args.iter().rev() {
            self.eval_expr(program, arg)?;
        }
        let callee = &program.functions[function];
        let mut frame = vec![0u64; callee.slot_count];
        for param in &callee.params {
            let bits = self.stack.pop_scalar(&param.ty);
            frame[param.slot] = bits;
        }
        self.frames.push(frame);
        let flow = self.run_block(program, &callee.body);
        self.frames.pop();
        match flow? {
            Flow::Return | Flow::Proceed => Ok(()),
            other => Err(SourceError::runtime(
                format!("Control flow escaped a function call: {:?}", other),
                span,
            )),
        }
    }

    fn eval_unary(&self, op: UnaryOp, ty: &RuleType, bits: u64) -> u64 {
        match op {
            UnaryOp::Not => (bits == 0) as u64,
            UnaryOp::BitNot => !bits,
            UnaryOp::Negate => {
                if ty.is_float() {
                    if value_size(ty) == 4 {
                        (-f32::from_bits(bits as u32)).to_bits() as u64
                    } else {
                        (-f64::from_bits(bits)).to_bits()
                    }
                } else {
                    (bits as i64).wrapping_neg() as u64
                }
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinOp,
        lhs_ty: &RuleType,
        a: u64,
        rhs_ty: &RuleType,
        b: u64,
        span: Span,
    ) -> SourceResult<u64> {
        match op {
            BinOp::AddrEq => return Ok((a == b) as u64),
            BinOp::AddrNe => return Ok((a != b) as u64),
            BinOp::Shl | BinOp::Shr | BinOp::Ushr => {
                return self.eval_shift(op, lhs_ty, a, rhs_ty, b, span)
            }
            _ => {}
        }

        if lhs_ty.is_float() || matches!(lhs_ty, RuleType::FloatLit(_)) {
            return Ok(self.eval_float_binary(op, lhs_ty, a, b));
        }

        let signed = lhs_ty.is_signed_int()
            || matches!(lhs_ty, RuleType::SintLit(_))
            || matches!(lhs_ty, RuleType::Bool | RuleType::BoolLit(_));
        let result = if signed {
            let (a, b) = (a as i64, b as i64);
            match op {
                BinOp::Add => a.wrapping_add(b) as u64,
                BinOp::Sub => a.wrapping_sub(b) as u64,
                BinOp::Mul => a.wrapping_mul(b) as u64,
                BinOp::Div => {
                    self.zero_check(b == 0, span)?;
                    a.wrapping_div(b) as u64
                }
                BinOp::Rem => {
                    self.zero_check(b == 0, span)?;
                    a.wrapping_rem(b) as u64
                }
                BinOp::Pow => self.int_pow(a as u64, b, true, span)?,
                BinOp::BitAnd => (a & b) as u64,
                BinOp::BitOr => (a | b) as u64,
                BinOp::BitXor => (a ^ b) as u64,
                BinOp::Eq => (a == b) as u64,
                BinOp::Ne => (a != b) as u64,
                BinOp::Lt => (a < b) as u64,
                BinOp::Le => (a <= b) as u64,
                BinOp::Gt => (a > b) as u64,
                BinOp::Ge => (a >= b) as u64,
                _ => unreachable!("handled above"),
            }
        } else {
            match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div => {
                    self.zero_check(b == 0, span)?;
                    a.wrapping_div(b)
                }
                BinOp::Rem => {
                    self.zero_check(b == 0, span)?;
                    a.wrapping_rem(b)
                }
                BinOp::Pow => self.int_pow(a, b as i64, false, span)?,
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                BinOp::BitXor => a ^ b,
                BinOp::Eq => (a == b) as u64,
                BinOp::Ne => (a != b) as u64,
                BinOp::Lt => (a < b) as u64,
                BinOp::Le => (a <= b) as u64,
                BinOp::Gt => (a > b) as u64,
                BinOp::Ge => (a >= b) as u64,
                _ => unreachable!("handled above"),
            }
        };
        Ok(result)
    }

    fn eval_float_binary(&self, op: BinOp, ty: &RuleType, a: u64, b: u64) -> u64 {
        if value_size(ty) == 4 {
            let (x, y) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
            match op {
                BinOp::Add => (x + y).to_bits() as u64,
                BinOp::Sub => (x - y).to_bits() as u64,
                BinOp::Mul => (x * y).to_bits() as u64,
                BinOp::Div => (x / y).to_bits() as u64,
                BinOp::Rem => (x % y).to_bits() as u64,
                BinOp::Pow => x.powf(y).to_bits() as u64,
                BinOp::Eq => (x == y) as u64,
                BinOp::Ne => (x != y) as u64,
                BinOp::Lt => (x < y) as u64,
                BinOp::Le => (x <= y) as u64,
                BinOp::Gt => (x > y) as u64,
                BinOp::Ge => (x >= y) as u64,
                other => unreachable!("float operator {:?}", other),
            }
        } else {
            let (x, y) = (f64::from_bits(a), f64::from_bits(b));
            match op {
                BinOp::Add => (x + y).to_bits(),
                BinOp::Sub => (x - y).to_bits(),
                BinOp::Mul => (x * y).to_bits(),
                BinOp::Div => (x / y).to_bits(),
                BinOp::Rem => (x % y).to_bits(),
                BinOp::Pow => x.powf(y).to_bits(),
                BinOp::Eq => (x == y) as u64,
                BinOp::Ne => (x != y) as u64,
                BinOp::Lt => (x < y) as u64,
                BinOp::Le => (x <= y) as u64,
                BinOp::Gt => (x > y) as u64,
                BinOp::Ge => (x >= y) as u64,
                other => unreachable!("float operator {:?}", other),
            }
        }
    }

    fn eval_shift(
        &self,
        op: BinOp,
        lhs_ty: &RuleType,
        a: u64,
        _rhs_ty: &RuleType,
        b: u64,
        span: Span,
    ) -> SourceResult<u64> {
        let width = (value_size(lhs_ty) * 8) as i64;
        let amount = b as i64;
        if !(0..width).contains(&amount) {
            return Err(SourceError::runtime("Invalid shift amount", span));
        }
        let mask = u64::MAX >> (64 - width as u32);
        Ok(match op {
            BinOp::Shl => (a << amount) & mask,
            // Signed values arrive sign-extended, so an arithmetic shift
            // on the 64-bit storage is exact for any width.
            BinOp::Shr => {
                if lhs_ty.is_signed_int() || matches!(lhs_ty, RuleType::SintLit(_)) {
                    ((a as i64) >> amount) as u64
                } else {
                    (a & mask) >> amount
                }
            }
            BinOp::Ushr => (a & mask) >> amount,
            other => unreachable!("shift operator {:?}", other),
        })
    }

    fn int_pow(&self, base: u64, exp: i64, signed: bool, span: Span) -> SourceResult<u64> {
        if exp < 0 {
            return Err(SourceError::runtime("Negative exponent", span));
        }
        let exp = (exp as u64).min(u32::MAX as u64) as u32;
        Ok(if signed {
            (base as i64).wrapping_pow(exp) as u64
        } else {
            base.wrapping_pow(exp)
        })
    }

    fn zero_check(&self, is_zero: bool, span: Span) -> SourceResult<()> {
        if is_zero {
            return Err(SourceError::runtime("Division by zero", span));
        }
        Ok(())
    }

    /// Address of an array/string element after the bounds check
    pub(crate) fn element_addr(
        &self,
        addr: u64,
        index: i64,
        span: Span,
    ) -> SourceResult<u64> {
        let record = identity::lookup(self.heap.identity_at(addr));
        let length = self.heap.length_at(addr);
        if index < 0 || index as u64 >= length {
            return Err(SourceError::runtime(
                format!("Index {} is out of bounds for length {}", index, length),
                span,
            ));
        }
        let data = self.heap.data_addr(addr);
        Ok(data + 8 + record.component_size as u64 * index as u64)
    }

    fn push_int(&mut self, ty: &RuleType, bits: u64) {
        self.stack.push_scalar(ty, bits);
    }

    fn push_float(&mut self, ty: &RuleType, value: f64) {
        if value_size(ty) == 4 {
            self.stack.push_scalar(ty, (value as f32).to_bits() as u64);
        } else {
            self.stack.push_scalar(ty, value.to_bits());
        }
    }

    /// Read a value of a type out of the heap into normalized storage
    pub(crate) fn heap_read_value(&self, ty: &RuleType, addr: u64) -> u64 {
        let size = value_size(ty);
        let raw = self.heap.read_scalar(addr, size);
        if ty.is_signed_int() || matches!(ty, RuleType::SintLit(_)) {
            match size {
                1 => raw as u8 as i8 as i64 as u64,
                2 => raw as u16 as i16 as i64 as u64,
                4 => raw as u32 as i32 as i64 as u64,
                _ => raw,
            }
        } else {
            raw
        }
    }

    /// Write a normalized value of a type into the heap
    pub(crate) fn heap_write_value(&mut self, ty: &RuleType, addr: u64, bits: u64) {
        self.heap.write_scalar(addr, value_size(ty), bits);
    }

    fn concat(&mut self, result_ty: &RuleType, a: u64, b: u64) -> u64 {
        let RuleType::Array { component, .. } = result_ty else {
            unreachable!("concat typed as {}", result_ty);
        };
        let component_size = value_size(component);
        let len_a = self.heap.length_at(a);
        let len_b = self.heap.length_at(b);
        let length = len_a + len_b;
        let id = identity::intern(result_ty);
        let addr = self.heap.alloc(id, 8 + component_size * length as usize);
        let data = self.heap.data_addr(addr);
        self.heap.write_scalar(data, 8, length);
        let bytes_a = self
            .heap
            .read(self.heap.data_addr(a) + 8, component_size * len_a as usize)
            .to_vec();
        let bytes_b = self
            .heap
            .read(self.heap.data_addr(b) + 8, component_size * len_b as usize)
            .to_vec();
        self.heap.write(data + 8, &bytes_a);
        self.heap.write(data + 8 + bytes_a.len() as u64, &bytes_b);
        addr
    }

    fn build_range(&mut self, result_ty: &RuleType, lo: u64, hi: u64) -> u64 {
        let RuleType::Array { component, .. } = result_ty else {
            unreachable!("range typed as {}", result_ty);
        };
        let component_size = value_size(component);
        let signed = component.is_signed_int() || matches!(**component, RuleType::SintLit(_));
        let length = if signed {
            ((hi as i64).saturating_sub(lo as i64)).max(0) as u64
        } else {
            hi.saturating_sub(lo)
        };
        let id = identity::intern(result_ty);
        let addr = self.heap.alloc(id, 8 + component_size * length as usize);
        let data = self.heap.data_addr(addr);
        self.heap.write_scalar(data, 8, length);
        for i in 0..length {
            let value = lo.wrapping_add(i);
            self.heap
                .write_scalar(data + 8 + component_size as u64 * i, component_size, value);
        }
        addr
    }

    fn alloc_units(&mut self, component: &RuleType, literal: &str) -> u64 {
        let encoding = crate::types::encoding_of_component(component)
            .expect("checked during conversion analysis");
        let units = strings::encode(encoding, literal);
        let length = (units.len() / encoding.unit_size()) as u64;
        let ty = RuleType::Array {
            component: Box::new(component.clone()),
            size: Some(length),
        };
        let id = identity::intern(&ty);
        let addr = self.heap.alloc(id, 8 + units.len());
        let data = self.heap.data_addr(addr);
        self.heap.write_scalar(data, 8, length);
        self.heap.write(data + 8, &units);
        addr
    }

    /// Convert a runtime value between types; scalars travel as normalized
    /// bits, references as addresses (composites are rebuilt on the heap)
    pub(crate) fn convert_value(
        &mut self,
        from: &RuleType,
        to: &RuleType,
        bits: u64,
        span: Span,
    ) -> SourceResult<u64> {
        if from == to {
            return Ok(bits);
        }
        match (from, to) {
            // Widening between atomics: normalized storage already holds
            // the extended value. Literal-typed sources (a `let`-bound
            // variable read) convert the same way their lifted atomic does.
            (a, b) if integer_like(a) && integer_like(b) => Ok(bits),
            (RuleType::Fp32, RuleType::Fp64) => {
                Ok((f32::from_bits(bits as u32) as f64).to_bits())
            }
            (RuleType::FloatLit(_), RuleType::Fp32) => {
                Ok((f64::from_bits(bits) as f32).to_bits() as u64)
            }
            (RuleType::FloatLit(_), RuleType::Fp64) => Ok(bits),
            (RuleType::SintLit(_), b) if b.is_float() => {
                let value = bits as i64 as f64;
                Ok(if value_size(b) == 4 {
                    (value as f32).to_bits() as u64
                } else {
                    value.to_bits()
                })
            }
            (RuleType::UintLit(_), b) if b.is_float() => {
                let value = bits as f64;
                Ok(if value_size(b) == 4 {
                    (value as f32).to_bits() as u64
                } else {
                    value.to_bits()
                })
            }
            (RuleType::NullLit, _) => Ok(0),
            (_, RuleType::Any) => Ok(bits),
            (RuleType::StrLit { encoding, .. }, RuleType::Array { component, .. }) => {
                if bits == 0 {
                    return Ok(0);
                }
                let value = strings::read_string(&self.heap, *encoding, bits);
                Ok(self.alloc_units(component, &value))
            }
            (RuleType::StrLit { .. }, RuleType::StrLit { .. }) => Ok(bits),
            (
                RuleType::Array {
                    component: from_comp,
                    ..
                },
                RuleType::Array {
                    component: to_comp, ..
                },
            ) => {
                if bits == 0 {
                    return Ok(0);
                }
                if from_comp == to_comp {
                    return Ok(bits);
                }
                let length = self.heap.length_at(bits);
                let from_size = value_size(from_comp);
                let to_size = value_size(to_comp);
                let id = identity::intern(to);
                let addr = self.heap.alloc(id, 8 + to_size * length as usize);
                let data = self.heap.data_addr(addr);
                self.heap.write_scalar(data, 8, length);
                let source_data = self.heap.data_addr(bits);
                for i in 0..length {
                    let element = self.heap_read_value(from_comp, source_data + 8 + from_size as u64 * i);
                    let converted = self.convert_value(from_comp, to_comp, element, span)?;
                    self.heap_write_value(to_comp, data + 8 + to_size as u64 * i, converted);
                }
                Ok(addr)
            }
            (RuleType::Tuple(from_members), RuleType::Tuple(to_members)) => {
                if bits == 0 {
                    return Ok(0);
                }
                let from_record = identity::lookup(identity::intern(from));
                let id = identity::intern(to);
                let to_record = identity::lookup(id);
                let addr = self.heap.alloc(id, to_record.data_size);
                let source_data = self.heap.data_addr(bits);
                let data = self.heap.data_addr(addr);
                for (i, (from_ty, to_ty)) in from_members.iter().zip(to_members).enumerate() {
                    let element =
                        self.heap_read_value(from_ty, source_data + from_record.member_offsets[i] as u64);
                    let converted = self.convert_value(from_ty, to_ty, element, span)?;
                    self.heap_write_value(to_ty, data + to_record.member_offsets[i] as u64, converted);
                }
                Ok(addr)
            }
            (
                RuleType::Structure {
                    members: from_members,
                },
                RuleType::Structure { members: to_members },
            ) => {
                if bits == 0 {
                    return Ok(0);
                }
                // The source object's identity carries its own layout; the
                // target keeps only the members the target type names.
                let source_record = identity::lookup(self.heap.identity_at(bits));
                let id = identity::intern(to);
                let to_record = identity::lookup(id);
                let addr = self.heap.alloc(id, to_record.data_size);
                let source_data = self.heap.data_addr(bits);
                let data = self.heap.data_addr(addr);
                for (i, (name, to_ty)) in to_members.iter().enumerate() {
                    let (offset, _) = source_record
                        .offset_by_name(name)
                        .expect("member checked during conversion analysis");
                    let from_ty = &from_members
                        .iter()
                        .find(|(n, _)| n == name)
                        .expect("member checked during conversion analysis")
                        .1;
                    let element = self.heap_read_value(from_ty, source_data + offset as u64);
                    let converted = self.convert_value(from_ty, to_ty, element, span)?;
                    self.heap_write_value(to_ty, data + to_record.member_offsets[i] as u64, converted);
                }
                Ok(addr)
            }
            // Remaining pairs are value-preserving at the bit level.
            _ => Ok(bits),
        }
    }
}

/// Atomic integers, bool, and their literal types share normalized storage
fn integer_like(ty: &RuleType) -> bool {
    ty.is_integer()
        || matches!(
            ty,
            RuleType::SintLit(_)
                | RuleType::UintLit(_)
                | RuleType::Bool
                | RuleType::BoolLit(_)
        )
}
