//! `where` tree validation and name resolution.

use neuronek_db_types::{FieldDef, RelationDef, ScalarType};

use super::predicate::{CompareOp, Predicate, Quantifier, RelationLink, TextOp};
use super::{Filter, RelationFilter, ScalarFilter, ScalarOp};
use crate::error::{QueryError, Result};
use crate::registry::SchemaRegistry;
use crate::value::Value;

/// A compiled `where` tree
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledFilter {
    pub predicate: Predicate,
    /// Dotted relation paths the filter traverses, in first-seen order
    pub relation_paths: Vec<String>,
}

/// Validates `filter` against `model` and resolves it into a [`Predicate`].
///
/// Every field and relation name is checked, operand values are coerced to
/// the field's scalar type, and relation filters become semi-joins.
pub fn compile_filter(
    registry: &SchemaRegistry,
    model: &str,
    filter: &Filter,
) -> Result<CompiledFilter> {
    registry.describe(model)?;
    let mut compiler = Compiler {
        registry,
        relation_paths: Vec::new(),
    };
    let predicate = compiler.tree(model, "", filter)?;
    Ok(CompiledFilter {
        predicate,
        relation_paths: compiler.relation_paths,
    })
}

struct Compiler<'r> {
    registry: &'r SchemaRegistry,
    relation_paths: Vec<String>,
}

impl Compiler<'_> {
    fn tree(&mut self, model: &str, path: &str, filter: &Filter) -> Result<Predicate> {
        match filter {
            Filter::And(list) => Ok(Predicate::and(self.list(model, path, list)?)),
            Filter::Or(list) => Ok(Predicate::or(self.list(model, path, list)?)),
            Filter::Not(list) => Ok(Predicate::and(
                self.list(model, path, list)?
                    .into_iter()
                    .map(Predicate::negate)
                    .collect(),
            )),
            Filter::Field { field, condition } => {
                let def = self.registry.field(model, field)?;
                scalar(def.into(), condition)
            }
            Filter::Relation {
                relation,
                condition,
            } => {
                let def = self.registry.relation(model, relation)?;
                let nested_path = if path.is_empty() {
                    relation.clone()
                } else {
                    format!("{path}.{relation}")
                };
                if !self.relation_paths.contains(&nested_path) {
                    self.relation_paths.push(nested_path.clone());
                }
                self.relation(model, &nested_path, def, condition)
            }
        }
    }

    fn list(&mut self, model: &str, path: &str, list: &[Filter]) -> Result<Vec<Predicate>> {
        list.iter().map(|f| self.tree(model, path, f)).collect()
    }

    fn relation(
        &mut self,
        model: &str,
        path: &str,
        def: &'static RelationDef,
        condition: &RelationFilter,
    ) -> Result<Predicate> {
        let to_many = def.is_to_many();
        let (quantifier, nested) = match condition {
            RelationFilter::Some(f) if to_many => (Quantifier::Some, Some(f.as_ref())),
            RelationFilter::Every(f) if to_many => (Quantifier::Every, Some(f.as_ref())),
            RelationFilter::None(f) if to_many => (Quantifier::None, Some(f.as_ref())),
            RelationFilter::Is(f) if !to_many => match f {
                Some(f) => (Quantifier::Some, Some(f.as_ref())),
                None => (Quantifier::None, None),
            },
            RelationFilter::IsNot(f) if !to_many => match f {
                Some(f) => (Quantifier::None, Some(f.as_ref())),
                None => (Quantifier::Some, None),
            },
            _ => {
                let expected = if to_many {
                    "`some`, `every` or `none`"
                } else {
                    "`is` or `isNot`"
                };
                return Err(QueryError::validation(format!(
                    "Relation `{}` on {model} only accepts {expected}",
                    def.name
                )));
            }
        };
        let filter = match nested {
            Some(f) => self.tree(def.target, path, f)?,
            None => Predicate::Const(true),
        };
        Ok(Predicate::Related {
            link: RelationLink::of(def),
            quantifier,
            filter: Box::new(filter),
        })
    }
}

/// The scalar column a condition applies to
#[derive(Clone, Copy, Debug)]
struct Column<'a> {
    name: &'a str,
    ty: ScalarType,
    nullable: bool,
}

impl<'a> From<&'a FieldDef> for Column<'a> {
    fn from(def: &'a FieldDef) -> Self {
        Self {
            name: def.name,
            ty: def.ty,
            nullable: def.nullable,
        }
    }
}

/// Compiles a scalar condition against a column that is not a schema field,
/// such as a per-group aggregate value
pub fn compile_scalar(
    name: &str,
    ty: ScalarType,
    nullable: bool,
    condition: &ScalarFilter,
) -> Result<Predicate> {
    scalar(
        Column {
            name,
            ty,
            nullable,
        },
        condition,
    )
}

fn scalar(column: Column<'_>, condition: &ScalarFilter) -> Result<Predicate> {
    let parts = condition
        .ops
        .iter()
        .map(|op| scalar_op(column, op))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::and(parts))
}

fn scalar_op(column: Column<'_>, op: &ScalarOp) -> Result<Predicate> {
    let field = column.name.to_owned();
    let operand = |v: &Value| v.clone().coerce(column.ty, column.nullable, column.name);
    let list = |values: &[Value]| values.iter().map(operand).collect::<Result<Vec<_>>>();

    let predicate = match op {
        ScalarOp::Equals(v) => Predicate::Compare {
            field,
            op: CompareOp::Eq,
            value: operand(v)?,
        },
        ScalarOp::In(values) => Predicate::In {
            field,
            values: list(values)?,
        },
        ScalarOp::NotIn(values) => {
            let values = list(values)?;
            exclude_null(
                column,
                values.iter().any(Value::is_null),
                Predicate::In { field, values }.negate(),
            )
        }
        ScalarOp::Lt(v) => range(column, CompareOp::Lt, v)?,
        ScalarOp::Lte(v) => range(column, CompareOp::Lte, v)?,
        ScalarOp::Gt(v) => range(column, CompareOp::Gt, v)?,
        ScalarOp::Gte(v) => range(column, CompareOp::Gte, v)?,
        ScalarOp::Contains(s) => text(column, TextOp::Contains, s)?,
        ScalarOp::StartsWith(s) => text(column, TextOp::StartsWith, s)?,
        ScalarOp::EndsWith(s) => text(column, TextOp::EndsWith, s)?,
        ScalarOp::Not(inner) => {
            let tests_null = inner.ops.iter().any(|op| match op {
                ScalarOp::Equals(v) => v.is_null(),
                ScalarOp::In(values) | ScalarOp::NotIn(values) => values.iter().any(Value::is_null),
                _ => false,
            });
            exclude_null(column, tests_null, scalar(column, inner)?.negate())
        }
    };
    Ok(predicate)
}

// Negated comparisons leave null rows out unless the condition itself tests for null.
fn exclude_null(column: Column<'_>, tests_null: bool, negated: Predicate) -> Predicate {
    if tests_null || !column.nullable {
        return negated;
    }
    Predicate::and(vec![negated, Predicate::is_null(column.name).negate()])
}

fn range(column: Column<'_>, op: CompareOp, value: &Value) -> Result<Predicate> {
    if !column.ty.is_orderable() {
        return Err(QueryError::validation(format!(
            "Operator `{}` is not supported on {} field `{}`",
            op.as_str(),
            column.ty,
            column.name
        )));
    }
    Ok(Predicate::Compare {
        field: column.name.to_owned(),
        op,
        value: value.clone().coerce(column.ty, false, column.name)?,
    })
}

fn text(column: Column<'_>, op: TextOp, needle: &str) -> Result<Predicate> {
    if !column.ty.is_text() {
        return Err(QueryError::validation(format!(
            "Text operators require a String field, `{}` is {}",
            column.name, column.ty
        )));
    }
    Ok(Predicate::Text {
        field: column.name.to_owned(),
        op,
        needle: needle.to_owned(),
    })
}
