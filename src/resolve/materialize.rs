//! Conversion of abstract numeric values to the concrete types required by their context.

use crate::ast::ExprId;

use super::constant::{self, ConstantValue, EvalResult};
use super::sem::{EvaluationStage, ExprInfo};
use super::types::{TypeId, Types};
use super::{Context, Fallible};

impl Context<'_> {
    /// Loads the value of a reference and materializes it, see [`Context::materialize`].
    pub(super) fn value(
        &mut self,
        expr: ExprId,
        info: ExprInfo,
        target: Option<TypeId>,
    ) -> Fallible<ExprInfo> {
        let info = self.load(info);
        self.materialize(expr, info, target)
    }

    /// The value stored in a reference.
    pub(super) fn load(&self, mut info: ExprInfo) -> ExprInfo {
        info.ty = self.types.unwrap_ref(info.ty);
        info
    }

    /// Converts an abstract value to `target`, or to its default concrete type if there is no
    /// target or the value cannot be converted to it. Concrete values are left unchanged.
    ///
    /// The side-table entry of `expr` is updated to the converted type and value.
    pub(super) fn materialize(
        &mut self,
        expr: ExprId,
        mut info: ExprInfo,
        target: Option<TypeId>,
    ) -> Fallible<ExprInfo> {
        if !self.types.is_abstract(info.ty) {
            return Ok(info);
        }

        let target = match target {
            Some(target) if self.types.can_convert(info.ty, target) => target,
            _ => self.types.concretize(info.ty),
        };
        if target == info.ty {
            return Ok(info);
        }

        if let Some(value) = &info.value {
            match convert_value(&mut self.types, value, target) {
                Ok(converted) => info.value = Some(converted),
                Err(message) => {
                    let span = self.expr_span(expr);
                    return Err(self.error(span, message));
                },
            }
        }
        info.ty = target;

        if let Some(entry) = self.sem.exprs.get_mut(expr) {
            entry.ty = target;
            entry.value.clone_from(&info.value);
        }
        Ok(info)
    }

    /// Reports an expression evaluated later than a context allows.
    pub(super) fn require_stage(
        &mut self,
        expr: ExprId,
        info: &ExprInfo,
        what: &str,
        latest: EvaluationStage,
    ) -> Fallible<()> {
        if info.stage <= latest {
            return Ok(());
        }
        let span = self.expr_span(expr);
        Err(self.error(
            span,
            format!(
                "{what} requires {}, but expression is {}",
                latest.with_article(),
                info.stage.with_article()
            ),
        ))
    }
}

/// Converts every scalar of a constant to the scalar type of `target`.
pub fn convert_value(types: &mut Types, value: &ConstantValue, target: TypeId) -> EvalResult {
    match value {
        ConstantValue::Composite { elements, .. } => {
            let element_type = constant::element_type(types, target);
            let mut converted = Vec::with_capacity(elements.len());
            for element in elements {
                converted.push(convert_value(types, element, element_type)?);
            }
            Ok(ConstantValue::Composite { ty: target, elements: converted })
        },
        scalar => match types.scalar(target) {
            Some(target) => scalar.convert_scalar(target),
            None => panic!("cannot convert scalar to '{}'", types.display(target)),
        },
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use indoc::indoc;

    use super::*;

    fn check(source: &str, expected: expect_test::Expect) {
        let module = crate::parse::parse(source).unwrap_or_else(|error| panic!("{error}"));
        let resolved = super::super::resolve(&module);
        expected.assert_eq(&resolved.diagnostics().to_string());
    }

    #[test]
    fn converts_elementwise() {
        let mut types = Types::new();
        let abstract_vector = types.vector(TypeId::ABSTRACT_INT, 2);
        let vector = types.vector(TypeId::U32, 2);
        let value = ConstantValue::Composite {
            ty: abstract_vector,
            elements: vec![ConstantValue::AbstractInt(1), ConstantValue::AbstractInt(3000000000)],
        };
        assert_eq!(
            convert_value(&mut types, &value, vector),
            Ok(ConstantValue::Composite {
                ty: vector,
                elements: vec![ConstantValue::U32(1), ConstantValue::U32(3000000000)],
            })
        );
        let signed = types.vector(TypeId::I32, 2);
        assert_eq!(
            convert_value(&mut types, &value, signed),
            Err("value 3000000000 cannot be represented as 'i32'".to_string())
        );
    }

    #[test]
    fn range_limits() {
        check(
            indoc! {"
                const a: i32 = -2147483648;
                const b: u32 = 4294967295;
                const c: f32 = 3.4028234e38;
                const d = vec2<u32>(1, 4294967296);
                const e: f32 = 1e39;
            "},
            expect![[r#"
                4:24 error: value 4294967296 cannot be represented as 'u32'
                5:16 error: value 1e+39 cannot be represented as 'f32'"#]],
        );
    }

    #[test]
    fn target_from_context() {
        let module = crate::parse::parse(indoc! {"
            const a = 1;
            const b: f32 = a;
            const c = a + 2u;
            const d = a + 0.5;
        "})
        .unwrap();
        let resolved = super::super::resolve(&module);
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let types: Vec<_> = module
            .vars
            .iter()
            .map(|(var, _)| resolved.types().display(resolved.variable(var).unwrap().ty))
            .collect();
        assert_eq!(types, ["abstract-int", "f32", "u32", "abstract-float"]);
    }
}
